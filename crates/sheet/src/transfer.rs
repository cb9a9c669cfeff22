//! Moving, copying, pasting and clearing blocks of cells.
//!
//! Source reads and clears skip rows hidden by a filter; destinations fill
//! the next visible rows. A move reads every source cell before writing, so
//! overlapping source and destination areas behave.

use gridcalc_formulas::{offset_references, qualify_references, StructuralEdit, Translation};
use gridcalc_primitives::{sheet_names_match, Area, CellAddress, MAX_COLUMN_COUNT, MAX_ROW_COUNT};
use serde::{Deserialize, Serialize};

use crate::book::Book;
use crate::cell::CellContent;
use crate::error::{Result, SheetError};
use crate::sheet::Sheet;

/// Cells captured by a copy or cut, ready to be pasted elsewhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clipboard {
    sheet: String,
    origin: CellAddress,
    width: u32,
    /// Source row and the row's contents, left to right
    rows: Vec<(u32, Vec<Option<CellContent>>)>,
}

impl Clipboard {
    /// Get the name of the sheet the cells came from
    #[must_use]
    pub fn sheet(&self) -> &str {
        &self.sheet
    }

    /// Top-left source address
    #[must_use]
    pub fn origin(&self) -> CellAddress {
        self.origin
    }

    /// Get the number of copied rows
    #[must_use]
    pub fn height(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Copied contents in row-major order; `None` is a blank.
    pub fn rows(&self) -> impl Iterator<Item = &[Option<CellContent>]> {
        self.rows.iter().map(|(_, cells)| cells.as_slice())
    }
}

/// `area` restricted to the sheet's current grid.
fn clip_to_grid(sheet: &Sheet, area: Area) -> Result<Area> {
    let grid = Area::from_bounds(1, 1, sheet.row_count(), sheet.col_count());
    area.intersection(&grid).ok_or(SheetError::EmptySelection)
}

/// Rows of `area` that a bulk operation touches.
fn source_rows(sheet: &Sheet, area: Area) -> Result<Vec<u32>> {
    let rows = sheet.visible_rows(area.top, area.bottom);
    if rows.is_empty() {
        return Err(SheetError::EmptySelection);
    }
    Ok(rows)
}

/// Visible destination rows for `count` source rows, checked against the grid.
fn destination_rows(sheet: &Sheet, dst: CellAddress, count: usize, width: u32) -> Result<Vec<u32>> {
    let rows = sheet.next_visible_rows(dst.row, count);
    let last_row = rows.last().copied().unwrap_or(dst.row);
    let last_col = dst.col.checked_add(width - 1);
    if last_row > MAX_ROW_COUNT || !matches!(last_col, Some(col) if col <= MAX_COLUMN_COUNT) {
        return Err(SheetError::OutOfGrid(format!(
            "{count} rows by {width} columns do not fit at {dst}"
        )));
    }
    Ok(rows)
}

/// Visible cell addresses of `area`, row-major.
pub(crate) fn select(book: &Book, sheet: &str, area: Area) -> Result<Vec<CellAddress>> {
    let sheet = book.get_sheet(sheet)?;
    let area = clip_to_grid(sheet, area)?;
    Ok(sheet
        .visible_rows(area.top, area.bottom)
        .into_iter()
        .flat_map(|row| (area.left..=area.right).map(move |col| CellAddress::new(row, col)))
        .collect())
}

/// Capture the visible cells of `area`.
pub(crate) fn copy_range(book: &Book, sheet: &str, area: Area) -> Result<Clipboard> {
    let source = book.get_sheet(sheet)?;
    let area = clip_to_grid(source, area)?;
    let rows = source_rows(source, area)?
        .into_iter()
        .map(|row| {
            let cells = (area.left..=area.right)
                .map(|col| source.cell(CellAddress::new(row, col)).cloned())
                .collect();
            (row, cells)
        })
        .collect();
    Ok(Clipboard {
        sheet: source.name().to_string(),
        origin: area.top_left(),
        width: area.cols(),
        rows,
    })
}

/// Blank out the visible cells of `area`.
pub(crate) fn clear_range(book: &mut Book, sheet: &str, area: Area) -> Result<()> {
    let target = book.get_sheet(sheet)?;
    let area = clip_to_grid(target, area)?;
    let rows = target.visible_rows(area.top, area.bottom);
    let name = target.name().to_string();
    let target = book.sheet_mut(&name)?;
    for row in rows {
        for col in area.left..=area.right {
            target.remove_cell(CellAddress::new(row, col));
        }
    }
    Ok(())
}

/// Write `clipboard` with its top-left cell at `dst`. Relative references in
/// formulas shift by the distance each cell travelled.
pub(crate) fn paste(book: &mut Book, sheet: &str, dst: CellAddress, clipboard: &Clipboard) -> Result<()> {
    if clipboard.rows.is_empty() {
        return Err(SheetError::EmptySelection);
    }
    let target = book.get_sheet(sheet)?;
    let rows = destination_rows(target, dst, clipboard.rows.len(), clipboard.width)?;
    let name = target.name().to_string();
    let d_col = i64::from(dst.col) - i64::from(clipboard.origin.col);

    let target = book.sheet_mut(&name)?;
    for ((src_row, cells), dst_row) in clipboard.rows.iter().zip(rows) {
        let d_row = i64::from(dst_row) - i64::from(*src_row);
        for (offset, content) in (0u32..).zip(cells) {
            let addr = CellAddress::new(dst_row, dst.col + offset);
            match content {
                Some(CellContent::Formula(source)) => {
                    target.set_cell(
                        addr,
                        CellContent::Formula(offset_references(source, d_row, d_col)),
                    );
                }
                Some(content) => {
                    target.set_cell(addr, content.clone());
                }
                None => {
                    target.remove_cell(addr);
                }
            }
        }
    }
    tracing::debug!(sheet = %name, at = %dst, rows = clipboard.rows.len(), "pasted");
    Ok(())
}

/// Relocate the visible cells of `area` on `src_sheet` to `dst` on
/// `dst_sheet`.
///
/// Every formula in the book that refers to cells wholly inside the moved
/// block follows it. References that only partially overlap the block keep
/// pointing where they did.
pub(crate) fn move_range(
    book: &mut Book,
    src_sheet: &str,
    area: Area,
    dst_sheet: &str,
    dst: CellAddress,
) -> Result<()> {
    let source = book.get_sheet(src_sheet)?;
    let target = book.get_sheet(dst_sheet)?;
    let area = clip_to_grid(source, area)?;
    let src_rows = source_rows(source, area)?;
    let dst_rows = destination_rows(target, dst, src_rows.len(), area.cols())?;
    let from = source.name().to_string();
    let to = target.name().to_string();
    let d_col = i64::from(dst.col) - i64::from(area.left);

    let pairs: Vec<(u32, u32)> = src_rows.into_iter().zip(dst_rows).collect();
    let translations = translations(&pairs, area, d_col);
    book.rewrite_formulas(&StructuralEdit::Relocate {
        from: from.clone(),
        to: to.clone(),
        translations,
    });

    // Read everything from the rewritten source before writing anything.
    let source = book.get_sheet(&from)?;
    let crossing = !sheet_names_match(&from, &to);
    let mut moved = Vec::with_capacity(pairs.len() * area.cols() as usize);
    for (src_row, dst_row) in &pairs {
        for col in area.left..=area.right {
            let content = source.cell(CellAddress::new(*src_row, col)).map(|content| match content {
                CellContent::Formula(text) if crossing => {
                    CellContent::Formula(qualify_references(text, &from))
                }
                other => other.clone(),
            });
            let col_dst = (i64::from(col) + d_col) as u32;
            moved.push((CellAddress::new(*dst_row, col_dst), content));
        }
    }

    let source = book.sheet_mut(&from)?;
    for (src_row, _) in &pairs {
        for col in area.left..=area.right {
            source.remove_cell(CellAddress::new(*src_row, col));
        }
    }
    let target = book.sheet_mut(&to)?;
    for (addr, content) in moved {
        match content {
            Some(content) => {
                target.set_cell(addr, content);
            }
            None => {
                target.remove_cell(addr);
            }
        }
    }
    tracing::debug!(from = %from, to = %to, %area, at = %dst, "moved");
    Ok(())
}

/// Group row pairs into contiguous blocks that travel by the same offset.
fn translations(pairs: &[(u32, u32)], area: Area, d_col: i64) -> Vec<Translation> {
    let mut out: Vec<Translation> = Vec::new();
    for (src, dst) in pairs {
        let d_row = i64::from(*dst) - i64::from(*src);
        if let Some(last) = out.last_mut() {
            if last.d_row == d_row && last.area.bottom + 1 == *src {
                last.area.bottom = *src;
                continue;
            }
        }
        out.push(Translation {
            area: Area::from_bounds(*src, area.left, *src, area.right),
            d_row,
            d_col,
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheet::SheetLayout;

    fn a1(s: &str) -> CellAddress {
        CellAddress::from_a1(s).unwrap()
    }

    fn area(s: &str) -> Area {
        Area::parse(s).unwrap()
    }

    fn book(cells: &[(&str, &str)]) -> Book {
        let mut book = Book::new();
        book.add_sheet("Sheet1", SheetLayout::default()).unwrap();
        book.add_sheet("Sheet2", SheetLayout::default()).unwrap();
        let sheet = book.sheet_mut("Sheet1").unwrap();
        for (addr, input) in cells {
            sheet.set_cell(a1(addr), CellContent::parse(input));
        }
        book
    }

    fn raw(book: &Book, sheet: &str, addr: &str) -> Option<String> {
        book.sheet(sheet)
            .unwrap()
            .cell(a1(addr))
            .map(CellContent::to_raw_string)
    }

    #[test]
    fn test_move_rewrites_contained_references_only() {
        let mut book = book(&[
            ("A1", "1"),
            ("A2", "2"),
            ("A3", "3"),
            ("C1", "=A1"),
            ("C2", "=SUM(A1:A2)"),
            ("C3", "=SUM(A1:A3)"),
        ]);
        move_range(&mut book, "Sheet1", area("A1:A2"), "Sheet1", a1("B5")).unwrap();
        assert_eq!(raw(&book, "Sheet1", "A1"), None);
        assert_eq!(raw(&book, "Sheet1", "B5").as_deref(), Some("1"));
        assert_eq!(raw(&book, "Sheet1", "C1").as_deref(), Some("=B5"));
        assert_eq!(raw(&book, "Sheet1", "C2").as_deref(), Some("=SUM(B5:B6)"));
        assert_eq!(raw(&book, "Sheet1", "C3").as_deref(), Some("=SUM(A1:A3)"));
    }

    #[test]
    fn test_move_overlapping_reads_before_writing() {
        let mut book = book(&[("A1", "1"), ("A2", "2"), ("A3", "3")]);
        move_range(&mut book, "Sheet1", area("A1:A3"), "Sheet1", a1("A2")).unwrap();
        assert_eq!(raw(&book, "Sheet1", "A1"), None);
        assert_eq!(raw(&book, "Sheet1", "A2").as_deref(), Some("1"));
        assert_eq!(raw(&book, "Sheet1", "A3").as_deref(), Some("2"));
        assert_eq!(raw(&book, "Sheet1", "A4").as_deref(), Some("3"));
    }

    #[test]
    fn test_move_across_sheets_qualifies_outside_references() {
        let mut book = book(&[("A1", "10"), ("B1", "=A1*2"), ("C1", "=B1")]);
        move_range(&mut book, "Sheet1", area("B1"), "Sheet2", a1("A1")).unwrap();
        assert_eq!(raw(&book, "Sheet2", "A1").as_deref(), Some("=Sheet1!A1*2"));
        assert_eq!(raw(&book, "Sheet1", "C1").as_deref(), Some("=Sheet2!A1"));
        assert_eq!(raw(&book, "Sheet1", "B1"), None);
    }

    #[test]
    fn test_copy_paste_offsets_relative_references() {
        let mut book = book(&[("A1", "1"), ("B1", "=A1+$A$1"), ("C1", "text")]);
        let clipboard = copy_range(&book, "Sheet1", area("B1:C1")).unwrap();
        assert_eq!(clipboard.width(), 2);
        assert_eq!(clipboard.height(), 1);
        paste(&mut book, "Sheet1", a1("B3"), &clipboard).unwrap();
        assert_eq!(raw(&book, "Sheet1", "B3").as_deref(), Some("=A3+$A$1"));
        assert_eq!(raw(&book, "Sheet1", "C3").as_deref(), Some("text"));
    }

    #[test]
    fn test_hidden_rows_are_skipped() {
        let mut book = book(&[("A1", "1"), ("A2", "2"), ("A3", "3"), ("B2", "x")]);
        book.sheet_mut("Sheet1")
            .unwrap()
            .layout_mut()
            .hidden_rows
            .insert(2);

        let clipboard = copy_range(&book, "Sheet1", area("A1:A3")).unwrap();
        assert_eq!(clipboard.height(), 2);

        clear_range(&mut book, "Sheet1", area("A1:B3")).unwrap();
        assert_eq!(raw(&book, "Sheet1", "A1"), None);
        assert_eq!(raw(&book, "Sheet1", "A2").as_deref(), Some("2"));
        assert_eq!(raw(&book, "Sheet1", "B2").as_deref(), Some("x"));

        paste(&mut book, "Sheet1", a1("C1"), &clipboard).unwrap();
        assert_eq!(raw(&book, "Sheet1", "C1").as_deref(), Some("1"));
        assert_eq!(raw(&book, "Sheet1", "C2"), None);
        assert_eq!(raw(&book, "Sheet1", "C3").as_deref(), Some("3"));

        let selected = select(&book, "Sheet1", area("A1:A3")).unwrap();
        assert_eq!(selected, vec![a1("A1"), a1("A3")]);
    }

    #[test]
    fn test_paste_off_grid_rejected() {
        let mut book = book(&[("A1", "1"), ("B1", "2")]);
        let clipboard = copy_range(&book, "Sheet1", area("A1:B1")).unwrap();
        let edge = CellAddress::new(1, MAX_COLUMN_COUNT);
        let before = book.clone();
        assert!(matches!(
            paste(&mut book, "Sheet1", edge, &clipboard),
            Err(SheetError::OutOfGrid(_))
        ));
        assert_eq!(book, before);
    }

    #[test]
    fn test_translations_group_runs() {
        let pairs = [(1, 5), (2, 6), (4, 7), (5, 8)];
        let runs = translations(&pairs, area("A1:B1"), 0);
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].area, area("A1:B2"));
        assert_eq!(runs[1].area, area("A4:B5"));
        assert_eq!(runs[1].d_row, 3);
    }
}
