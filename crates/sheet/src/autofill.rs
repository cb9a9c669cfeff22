//! Autofill: extend a source block into an adjacent target.
//!
//! Numbers and dates in a line of two or more cells with a constant step
//! continue the progression. Anything else repeats the source pattern, with
//! formulas shifted like a relative copy.

use gridcalc_formulas::offset_references;
use gridcalc_primitives::value::{days_to_duration, serial_to_datetime};
use gridcalc_primitives::{Area, CellAddress, Value};

use crate::book::Book;
use crate::cell::CellContent;
use crate::error::{Result, SheetError};

const STEP_TOLERANCE: f64 = 1e-9;

/// Direction the fill grows in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FillDirection {
    Down,
    Up,
    Right,
    Left,
}

impl FillDirection {
    fn is_vertical(self) -> bool {
        matches!(self, FillDirection::Down | FillDirection::Up)
    }
}

/// Work out the direction and the cells to write. `target` is either the
/// block adjacent to `source` or a block that contains it and extends it on
/// one side.
fn plan(source: Area, target: Area) -> Result<(FillDirection, Area)> {
    let same_cols = source.left == target.left && source.right == target.right;
    let same_rows = source.top == target.top && source.bottom == target.bottom;
    let invalid = || {
        SheetError::InvalidAutofill(format!(
            "{target} does not extend {source} in one direction"
        ))
    };

    if target.contains_area(&source) {
        if same_cols && target.top == source.top && target.bottom > source.bottom {
            return Ok((
                FillDirection::Down,
                Area::from_bounds(source.bottom + 1, source.left, target.bottom, source.right),
            ));
        }
        if same_cols && target.bottom == source.bottom && target.top < source.top {
            return Ok((
                FillDirection::Up,
                Area::from_bounds(target.top, source.left, source.top - 1, source.right),
            ));
        }
        if same_rows && target.left == source.left && target.right > source.right {
            return Ok((
                FillDirection::Right,
                Area::from_bounds(source.top, source.right + 1, source.bottom, target.right),
            ));
        }
        if same_rows && target.right == source.right && target.left < source.left {
            return Ok((
                FillDirection::Left,
                Area::from_bounds(source.top, target.left, source.bottom, source.left - 1),
            ));
        }
        return Err(invalid());
    }

    if same_cols && target.top == source.bottom + 1 {
        return Ok((FillDirection::Down, target));
    }
    if same_cols && target.bottom + 1 == source.top {
        return Ok((FillDirection::Up, target));
    }
    if same_rows && target.left == source.right + 1 {
        return Ok((FillDirection::Right, target));
    }
    if same_rows && target.right + 1 == source.left {
        return Ok((FillDirection::Left, target));
    }
    Err(invalid())
}

/// A constant step between consecutive values of one line.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Progression {
    Number { last: f64, step: f64 },
    Date { last: f64, step: f64 },
}

impl Progression {
    fn detect(values: &[Option<&CellContent>]) -> Option<Progression> {
        if values.len() < 2 {
            return None;
        }
        let mut numbers = Vec::with_capacity(values.len());
        let mut dates = true;
        let mut plain = true;
        for value in values {
            match value {
                Some(CellContent::Value(Value::Number(n))) => {
                    dates = false;
                    numbers.push(*n);
                }
                Some(CellContent::Value(date @ Value::Date(_))) => {
                    plain = false;
                    numbers.push(date.to_number().ok()?);
                }
                _ => return None,
            }
        }
        if !plain && !dates {
            return None;
        }
        let step = numbers[1] - numbers[0];
        let constant = numbers
            .windows(2)
            .all(|pair| ((pair[1] - pair[0]) - step).abs() < STEP_TOLERANCE);
        if !constant {
            return None;
        }
        let last = numbers[numbers.len() - 1];
        Some(if plain {
            Progression::Number { last, step }
        } else {
            Progression::Date { last, step }
        })
    }

    /// The `n`th value past the end of the source, `n` starting at 1.
    fn nth(self, n: usize) -> Option<CellContent> {
        let k = n as f64;
        match self {
            Progression::Number { last, step } => Some(CellContent::from(last + step * k)),
            Progression::Date { last, step } => {
                let base = serial_to_datetime(last)?;
                let shifted = base.checked_add_signed(days_to_duration(step * k)?)?;
                Some(CellContent::from(Value::Date(shifted)))
            }
        }
    }
}

/// Fill `target` from `source` on `sheet`.
pub(crate) fn autofill(book: &mut Book, sheet: &str, source: Area, target: Area) -> Result<()> {
    let (direction, fill) = plan(source, target)?;
    let current = book.get_sheet(sheet)?;
    let name = current.name().to_string();

    let lines: Vec<u32> = if direction.is_vertical() {
        (source.left..=source.right).collect()
    } else {
        (source.top..=source.bottom).collect()
    };
    let mut writes: Vec<(CellAddress, Option<CellContent>)> = Vec::with_capacity(fill.size());

    for line in lines {
        // Source cells ordered in the direction of the fill.
        let mut cells: Vec<CellAddress> = if direction.is_vertical() {
            (source.top..=source.bottom)
                .map(|row| CellAddress::new(row, line))
                .collect()
        } else {
            (source.left..=source.right)
                .map(|col| CellAddress::new(line, col))
                .collect()
        };
        let mut targets: Vec<CellAddress> = if direction.is_vertical() {
            (fill.top..=fill.bottom)
                .map(|row| CellAddress::new(row, line))
                .collect()
        } else {
            (fill.left..=fill.right)
                .map(|col| CellAddress::new(line, col))
                .collect()
        };
        if matches!(direction, FillDirection::Up | FillDirection::Left) {
            cells.reverse();
            targets.reverse();
        }

        let contents: Vec<Option<&CellContent>> =
            cells.iter().map(|addr| current.cell(*addr)).collect();
        let progression = Progression::detect(&contents);

        for (i, addr) in targets.into_iter().enumerate() {
            let content = match progression {
                Some(progression) => progression.nth(i + 1),
                None => {
                    let from = cells[i % cells.len()];
                    contents[i % cells.len()].map(|content| match content {
                        CellContent::Formula(text) => CellContent::Formula(offset_references(
                            text,
                            i64::from(addr.row) - i64::from(from.row),
                            i64::from(addr.col) - i64::from(from.col),
                        )),
                        other => other.clone(),
                    })
                }
            };
            writes.push((addr, content));
        }
    }

    let current = book.sheet_mut(&name)?;
    for (addr, content) in writes {
        match content {
            Some(content) => {
                current.set_cell(addr, content);
            }
            None => {
                current.remove_cell(addr);
            }
        }
    }
    tracing::debug!(sheet = %name, %source, %fill, ?direction, "autofilled");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheet::SheetLayout;
    use chrono::NaiveDate;

    fn a1(s: &str) -> CellAddress {
        CellAddress::from_a1(s).unwrap()
    }

    fn area(s: &str) -> Area {
        Area::parse(s).unwrap()
    }

    fn book(cells: &[(&str, &str)]) -> Book {
        let mut book = Book::new();
        book.add_sheet("Sheet1", SheetLayout::default()).unwrap();
        let sheet = book.sheet_mut("Sheet1").unwrap();
        for (addr, input) in cells {
            sheet.set_cell(a1(addr), CellContent::parse(input));
        }
        book
    }

    fn raw(book: &Book, addr: &str) -> Option<String> {
        book.sheet("Sheet1")
            .unwrap()
            .cell(a1(addr))
            .map(CellContent::to_raw_string)
    }

    #[test]
    fn test_numeric_progression_down() {
        let mut book = book(&[("A1", "1"), ("A2", "3")]);
        autofill(&mut book, "Sheet1", area("A1:A2"), area("A3:A5")).unwrap();
        assert_eq!(raw(&book, "A3").as_deref(), Some("5"));
        assert_eq!(raw(&book, "A5").as_deref(), Some("9"));
    }

    #[test]
    fn test_target_containing_source() {
        let mut book = book(&[("A1", "10"), ("B1", "20")]);
        autofill(&mut book, "Sheet1", area("A1:B1"), area("A1:D1")).unwrap();
        assert_eq!(raw(&book, "C1").as_deref(), Some("30"));
        assert_eq!(raw(&book, "D1").as_deref(), Some("40"));
    }

    #[test]
    fn test_fill_up_continues_backwards() {
        let mut book = book(&[("A3", "3"), ("A4", "4")]);
        autofill(&mut book, "Sheet1", area("A3:A4"), area("A1:A2")).unwrap();
        assert_eq!(raw(&book, "A2").as_deref(), Some("2"));
        assert_eq!(raw(&book, "A1").as_deref(), Some("1"));
    }

    #[test]
    fn test_single_cell_and_text_repeat() {
        let mut book = book(&[("A1", "7"), ("B1", "x"), ("B2", "y")]);
        autofill(&mut book, "Sheet1", area("A1"), area("A2:A3")).unwrap();
        assert_eq!(raw(&book, "A3").as_deref(), Some("7"));

        autofill(&mut book, "Sheet1", area("B1:B2"), area("B3:B5")).unwrap();
        assert_eq!(raw(&book, "B3").as_deref(), Some("x"));
        assert_eq!(raw(&book, "B4").as_deref(), Some("y"));
        assert_eq!(raw(&book, "B5").as_deref(), Some("x"));
    }

    #[test]
    fn test_formulas_shift_like_copies() {
        let mut book = book(&[("A1", "1"), ("B1", "=A1*2")]);
        autofill(&mut book, "Sheet1", area("B1"), area("B2:B3")).unwrap();
        assert_eq!(raw(&book, "B2").as_deref(), Some("=A2*2"));
        assert_eq!(raw(&book, "B3").as_deref(), Some("=A3*2"));
    }

    #[test]
    fn test_date_progression() {
        let mut book = book(&[("A1", "2024-01-01"), ("A2", "2024-01-08")]);
        autofill(&mut book, "Sheet1", area("A1:A2"), area("A3")).unwrap();
        let expected = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        assert_eq!(
            book.sheet("Sheet1").unwrap().cell(a1("A3")),
            Some(&CellContent::from(Value::from(expected)))
        );
    }

    #[test]
    fn test_mixed_lines_repeat() {
        let mut book = book(&[("A1", "1"), ("A2", "2"), ("A3", "4")]);
        autofill(&mut book, "Sheet1", area("A1:A3"), area("A4:A5")).unwrap();
        assert_eq!(raw(&book, "A4").as_deref(), Some("1"));
        assert_eq!(raw(&book, "A5").as_deref(), Some("2"));
    }

    #[test]
    fn test_rejects_disjoint_target() {
        let mut book = book(&[("A1", "1")]);
        assert!(matches!(
            autofill(&mut book, "Sheet1", area("A1"), area("C3:C4")),
            Err(SheetError::InvalidAutofill(_))
        ));
    }
}
