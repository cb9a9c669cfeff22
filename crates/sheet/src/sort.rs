//! Sorting rows by the evaluated values of one column.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::str::FromStr;

use gridcalc_formulas::FormulaEngine;
use gridcalc_primitives::{CellAddress, Value};
use serde::{Deserialize, Serialize};

use crate::book::Book;
use crate::error::{Result, SheetError};
use crate::eval::Evaluator;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl FromStr for SortDirection {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Ok(SortDirection::Ascending),
            "desc" | "descending" => Ok(SortDirection::Descending),
            other => Err(format!("unknown sort direction '{other}'")),
        }
    }
}

/// Order two sort keys. Blanks go last whatever the direction; everything
/// else follows [`Value::sort_cmp`].
fn compare_keys(a: &Value, b: &Value, direction: SortDirection) -> Ordering {
    match (a.is_blank(), b.is_blank()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => match direction {
            SortDirection::Ascending => a.sort_cmp(b),
            SortDirection::Descending => b.sort_cmp(a),
        },
    }
}

/// Reorder rows `top..=bottom` of `sheet` by column `col`.
///
/// Whole rows travel together with their height and hidden flag. Formula
/// text is left as written, so a formula that pointed at its own row now
/// points at whatever row landed there.
pub(crate) fn sort_rows(
    book: &mut Book,
    engine: &FormulaEngine,
    sheet: &str,
    col: u32,
    direction: SortDirection,
    top: u32,
    bottom: u32,
) -> Result<()> {
    let current = book.get_sheet(sheet)?;
    let name = current.name().to_string();
    if col == 0 || col > current.col_count() {
        return Err(SheetError::ColumnIndexOutOfBounds {
            index: col,
            count: current.col_count(),
        });
    }
    if top == 0 || top > bottom {
        return Err(SheetError::RowIndexOutOfBounds {
            index: top,
            count: current.row_count(),
        });
    }

    let order: Vec<u32> = {
        let evaluator = Evaluator::new(book, engine);
        let mut keyed: Vec<(u32, Value)> = (top..=bottom)
            .map(|row| (row, evaluator.value(current, CellAddress::new(row, col))))
            .collect();
        keyed.sort_by(|(_, a), (_, b)| compare_keys(a, b, direction));
        keyed.into_iter().map(|(row, _)| row).collect()
    };
    // old row -> new row
    let moves: BTreeMap<u32, u32> = order
        .iter()
        .zip(top..=bottom)
        .filter(|(old, new)| *old != new)
        .map(|(old, new)| (*old, new))
        .collect();
    if moves.is_empty() {
        return Ok(());
    }
    let relocate = |row: u32| moves.get(&row).copied().unwrap_or(row);

    let target = book.sheet_mut(&name)?;
    let cells = target
        .take_cells()
        .into_iter()
        .map(|(addr, content)| (CellAddress::new(relocate(addr.row), addr.col), content))
        .collect();
    target.replace_cells(cells);

    let layout = target.layout_mut();
    layout.row_sizes = layout
        .row_sizes
        .iter()
        .map(|(row, size)| (relocate(*row), *size))
        .collect();
    layout.hidden_rows = layout.hidden_rows.iter().map(|row| relocate(*row)).collect();
    tracing::debug!(sheet = %name, col, ?direction, rows = moves.len(), "sorted");
    Ok(())
}

/// Sort every used row of `sheet` by column `col`.
pub(crate) fn sort_by(
    book: &mut Book,
    engine: &FormulaEngine,
    sheet: &str,
    col: u32,
    direction: SortDirection,
) -> Result<()> {
    let (last_row, _) = book.get_sheet(sheet)?.used_extent();
    if last_row == 0 {
        return Ok(());
    }
    sort_rows(book, engine, sheet, col, direction, 1, last_row)
}
