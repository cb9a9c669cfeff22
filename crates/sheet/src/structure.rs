//! Row and column insertion and removal.
//!
//! Each edit first rewrites formulas in every sheet, then shifts the edited
//! sheet's cells, sizes, visibility and filters. All validation happens
//! before the book is touched.

use std::collections::{BTreeMap, BTreeSet};

use gridcalc_formulas::StructuralEdit;
use gridcalc_primitives::{CellAddress, MAX_COLUMN_COUNT, MAX_ROW_COUNT};

use crate::book::Book;
use crate::error::{Result, SheetError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Row,
    Column,
}

impl Axis {
    fn index(self, addr: CellAddress) -> u32 {
        match self {
            Axis::Row => addr.row,
            Axis::Column => addr.col,
        }
    }

    fn with_index(self, addr: CellAddress, index: u32) -> CellAddress {
        match self {
            Axis::Row => CellAddress::new(index, addr.col),
            Axis::Column => CellAddress::new(addr.row, index),
        }
    }

    fn out_of_bounds(self, index: u32, count: u32) -> SheetError {
        match self {
            Axis::Row => SheetError::RowIndexOutOfBounds { index, count },
            Axis::Column => SheetError::ColumnIndexOutOfBounds { index, count },
        }
    }
}

/// Insert `count` blank rows before row `at`.
pub(crate) fn insert_rows(book: &mut Book, sheet: &str, at: u32, count: u32) -> Result<()> {
    insert(book, sheet, Axis::Row, at, count)
}

/// Insert `count` blank columns before column `at`.
pub(crate) fn insert_cols(book: &mut Book, sheet: &str, at: u32, count: u32) -> Result<()> {
    insert(book, sheet, Axis::Column, at, count)
}

/// Remove the given rows; duplicates are ignored.
pub(crate) fn remove_rows(book: &mut Book, sheet: &str, indices: &[u32]) -> Result<()> {
    remove(book, sheet, Axis::Row, indices)
}

/// Remove the given columns; duplicates are ignored.
pub(crate) fn remove_cols(book: &mut Book, sheet: &str, indices: &[u32]) -> Result<()> {
    remove(book, sheet, Axis::Column, indices)
}

fn insert(book: &mut Book, sheet: &str, axis: Axis, at: u32, count: u32) -> Result<()> {
    let target = book.get_sheet(sheet)?;
    let name = target.name().to_string();
    if count == 0 {
        return Err(SheetError::InvalidCount);
    }
    let (size, max, used) = match axis {
        Axis::Row => (target.row_count(), MAX_ROW_COUNT, target.used_extent().0),
        Axis::Column => (target.col_count(), MAX_COLUMN_COUNT, target.used_extent().1),
    };
    if at == 0 || at > size.saturating_add(1) {
        tracing::warn!(sheet = %name, at, "insert rejected");
        return Err(axis.out_of_bounds(at, size));
    }
    let grown = size.checked_add(count).filter(|n| *n <= max);
    let shifted = used.checked_add(count).filter(|n| *n <= max);
    if grown.is_none() || (used >= at && shifted.is_none()) {
        return Err(SheetError::OutOfGrid(format!(
            "inserting {count} at {at} exceeds the maximum of {max}"
        )));
    }

    let edit = match axis {
        Axis::Row => StructuralEdit::InsertRows {
            sheet: name.clone(),
            at,
            count,
        },
        Axis::Column => StructuralEdit::InsertColumns {
            sheet: name.clone(),
            at,
            count,
        },
    };
    book.rewrite_formulas(&edit);

    let shift = |index: u32| if index >= at { index + count } else { index };
    let target = book.sheet_mut(&name)?;
    let cells = target
        .take_cells()
        .into_iter()
        .map(|(addr, content)| (axis.with_index(addr, shift(axis.index(addr))), content))
        .collect();
    target.replace_cells(cells);

    let layout = target.layout_mut();
    match axis {
        Axis::Row => {
            layout.rows += count;
            layout.row_sizes = remap_keys(&layout.row_sizes, |i| Some(shift(i)));
            layout.hidden_rows = layout.hidden_rows.iter().map(|i| shift(*i)).collect();
        }
        Axis::Column => {
            layout.cols += count;
            layout.col_sizes = remap_keys(&layout.col_sizes, |i| Some(shift(i)));
            layout.filters = remap_keys(&layout.filters, |i| Some(shift(i)));
        }
    }
    tracing::debug!(sheet = %name, ?axis, at, count, "inserted");
    Ok(())
}

fn remove(book: &mut Book, sheet: &str, axis: Axis, indices: &[u32]) -> Result<()> {
    let target = book.get_sheet(sheet)?;
    let name = target.name().to_string();
    let removed: Vec<u32> = indices
        .iter()
        .copied()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    if removed.is_empty() {
        return Err(SheetError::InvalidCount);
    }
    let size = match axis {
        Axis::Row => target.row_count(),
        Axis::Column => target.col_count(),
    };
    if let Some(bad) = removed.iter().find(|i| **i == 0 || **i > size) {
        tracing::warn!(sheet = %name, index = *bad, "remove rejected");
        return Err(axis.out_of_bounds(*bad, size));
    }

    let edit = match axis {
        Axis::Row => StructuralEdit::RemoveRows {
            sheet: name.clone(),
            indices: removed.clone(),
        },
        Axis::Column => StructuralEdit::RemoveColumns {
            sheet: name.clone(),
            indices: removed.clone(),
        },
    };
    book.rewrite_formulas(&edit);

    let survive = |index: u32| surviving_index(index, &removed);
    let target = book.sheet_mut(&name)?;
    let cells = target
        .take_cells()
        .into_iter()
        .filter_map(|(addr, content)| {
            survive(axis.index(addr)).map(|i| (axis.with_index(addr, i), content))
        })
        .collect();
    target.replace_cells(cells);

    let remaining = (size - removed.len() as u32).max(1);
    let layout = target.layout_mut();
    match axis {
        Axis::Row => {
            layout.rows = remaining;
            layout.row_sizes = remap_keys(&layout.row_sizes, survive);
            layout.hidden_rows = layout.hidden_rows.iter().filter_map(|i| survive(*i)).collect();
        }
        Axis::Column => {
            layout.cols = remaining;
            layout.col_sizes = remap_keys(&layout.col_sizes, survive);
            layout.filters = remap_keys(&layout.filters, survive);
        }
    }
    tracing::debug!(sheet = %name, ?axis, count = removed.len(), "removed");
    Ok(())
}

/// New position of `index` once the sorted `removed` indices are gone.
fn surviving_index(index: u32, removed: &[u32]) -> Option<u32> {
    match removed.binary_search(&index) {
        Ok(_) => None,
        Err(below) => Some(index - below as u32),
    }
}

fn remap_keys<V: Clone>(map: &BTreeMap<u32, V>, f: impl Fn(u32) -> Option<u32>) -> BTreeMap<u32, V> {
    map.iter()
        .filter_map(|(k, v)| f(*k).map(|k| (k, v.clone())))
        .collect()
}
