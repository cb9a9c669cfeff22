//! Reference rewriting for structural edits, moves and relative copies.
//!
//! Rewrites work on the reference spans recorded by the parser, so everything
//! between references (spacing, literals, function casing) is preserved.

use gridcalc_primitives::address::{MAX_COLUMN_COUNT, MAX_ROW_COUNT};
use gridcalc_primitives::{
    quote_sheet_name, sheet_names_match, Area, CellRef, ColRef, RefTarget, Reference, RowRef,
};

use crate::parser::parse_formula_with_refs;

const REF_ERROR: &str = "#REF!";

/// A block of cells moving by a fixed offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Translation {
    pub area: Area,
    pub d_row: i64,
    pub d_col: i64,
}

/// A change to sheet geometry that references must follow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructuralEdit {
    InsertRows { sheet: String, at: u32, count: u32 },
    InsertColumns { sheet: String, at: u32, count: u32 },
    /// `indices` must be sorted and unique.
    RemoveRows { sheet: String, indices: Vec<u32> },
    RemoveColumns { sheet: String, indices: Vec<u32> },
    /// References wholly inside a translated area follow it, possibly onto
    /// another sheet.
    Relocate {
        from: String,
        to: String,
        translations: Vec<Translation>,
    },
}

impl StructuralEdit {
    fn sheet(&self) -> &str {
        match self {
            StructuralEdit::InsertRows { sheet, .. }
            | StructuralEdit::InsertColumns { sheet, .. }
            | StructuralEdit::RemoveRows { sheet, .. }
            | StructuralEdit::RemoveColumns { sheet, .. } => sheet,
            StructuralEdit::Relocate { from, .. } => from,
        }
    }
}

/// Replace the reference spans of `formula` for which `f` returns new text.
/// `None` when the formula does not parse or nothing changed.
fn splice(formula: &str, mut f: impl FnMut(&Reference) -> Option<String>) -> Option<String> {
    let parsed = parse_formula_with_refs(formula).ok()?;
    let mut out = String::with_capacity(formula.len());
    let mut last = 0;
    let mut changed = false;
    for r in &parsed.references {
        let Some(replacement) = f(&r.reference) else {
            continue;
        };
        if replacement == formula[r.span.clone()] {
            continue;
        }
        out.push_str(&formula[last..r.span.start]);
        out.push_str(&replacement);
        last = r.span.end;
        changed = true;
    }
    if !changed {
        return None;
    }
    out.push_str(&formula[last..]);
    Some(out)
}

/// Rewrite `formula`, which lives on `home_sheet`, to follow `edit`.
pub fn rewrite_references(formula: &str, home_sheet: &str, edit: &StructuralEdit) -> Option<String> {
    let edited = edit.sheet();
    splice(formula, |reference| {
        if !reference.targets_sheet(home_sheet, edited) {
            return None;
        }
        let rewritten = match edit {
            StructuralEdit::InsertRows { at, count, .. } => {
                map_rows(reference, |row| insert_index(row, *at, *count, MAX_ROW_COUNT))
            }
            StructuralEdit::InsertColumns { at, count, .. } => {
                map_cols(reference, |col| insert_index(col, *at, *count, MAX_COLUMN_COUNT))
            }
            StructuralEdit::RemoveRows { indices, .. } => remove_rows(reference, indices),
            StructuralEdit::RemoveColumns { indices, .. } => remove_cols(reference, indices),
            StructuralEdit::Relocate {
                from,
                to,
                translations,
            } => relocate(reference, from, to, translations),
        };
        Some(match rewritten {
            Some(r) => r.to_string(),
            None => REF_ERROR.to_string(),
        })
    })
}

fn insert_index(index: u32, at: u32, count: u32, max: u32) -> Option<u32> {
    if index < at {
        return Some(index);
    }
    index.checked_add(count).filter(|shifted| *shifted <= max)
}

/// Apply `f` to every row coordinate; whole-column references have none.
fn map_rows(reference: &Reference, f: impl Fn(u32) -> Option<u32>) -> Option<Reference> {
    let target = match reference.target {
        RefTarget::Cell(c) => RefTarget::Cell(CellRef { row: f(c.row)?, ..c }),
        RefTarget::Range(a, b) => RefTarget::Range(
            CellRef { row: f(a.row)?, ..a },
            CellRef { row: f(b.row)?, ..b },
        ),
        RefTarget::Rows(a, b) => RefTarget::Rows(
            RowRef { row: f(a.row)?, ..a },
            RowRef { row: f(b.row)?, ..b },
        ),
        RefTarget::Columns(..) => reference.target,
    };
    Some(Reference {
        sheet: reference.sheet.clone(),
        target,
    })
}

fn map_cols(reference: &Reference, f: impl Fn(u32) -> Option<u32>) -> Option<Reference> {
    let target = match reference.target {
        RefTarget::Cell(c) => RefTarget::Cell(CellRef { col: f(c.col)?, ..c }),
        RefTarget::Range(a, b) => RefTarget::Range(
            CellRef { col: f(a.col)?, ..a },
            CellRef { col: f(b.col)?, ..b },
        ),
        RefTarget::Columns(a, b) => RefTarget::Columns(
            ColRef { col: f(a.col)?, ..a },
            ColRef { col: f(b.col)?, ..b },
        ),
        RefTarget::Rows(..) => reference.target,
    };
    Some(Reference {
        sheet: reference.sheet.clone(),
        target,
    })
}

/// New position of a surviving index, `None` if it was removed.
fn surviving(index: u32, removed: &[u32]) -> Option<u32> {
    match removed.binary_search(&index) {
        Ok(_) => None,
        Err(before) => Some(index - before as u32),
    }
}

/// Shrink the span `[lo, hi]` to what survives the removal. `None` when the
/// whole span is gone.
fn shrink_span(lo: u32, hi: u32, removed: &[u32]) -> Option<(u32, u32)> {
    let first = (lo..=hi).find(|i| removed.binary_search(i).is_err())?;
    let last = (lo..=hi).rev().find(|i| removed.binary_search(i).is_err())?;
    Some((surviving(first, removed)?, surviving(last, removed)?))
}

/// Remap an ordered pair of coordinates, keeping which corner held the
/// smaller one.
fn shrink_pair(a: u32, b: u32, removed: &[u32]) -> Option<(u32, u32)> {
    let (lo, hi) = shrink_span(a.min(b), a.max(b), removed)?;
    Some(if a <= b { (lo, hi) } else { (hi, lo) })
}

fn remove_rows(reference: &Reference, removed: &[u32]) -> Option<Reference> {
    let target = match reference.target {
        RefTarget::Cell(c) => RefTarget::Cell(CellRef {
            row: surviving(c.row, removed)?,
            ..c
        }),
        RefTarget::Range(a, b) => {
            let (ra, rb) = shrink_pair(a.row, b.row, removed)?;
            RefTarget::Range(CellRef { row: ra, ..a }, CellRef { row: rb, ..b })
        }
        RefTarget::Rows(a, b) => {
            let (ra, rb) = shrink_pair(a.row, b.row, removed)?;
            RefTarget::Rows(RowRef { row: ra, ..a }, RowRef { row: rb, ..b })
        }
        RefTarget::Columns(..) => reference.target,
    };
    Some(Reference {
        sheet: reference.sheet.clone(),
        target,
    })
}

fn remove_cols(reference: &Reference, removed: &[u32]) -> Option<Reference> {
    let target = match reference.target {
        RefTarget::Cell(c) => RefTarget::Cell(CellRef {
            col: surviving(c.col, removed)?,
            ..c
        }),
        RefTarget::Range(a, b) => {
            let (ca, cb) = shrink_pair(a.col, b.col, removed)?;
            RefTarget::Range(CellRef { col: ca, ..a }, CellRef { col: cb, ..b })
        }
        RefTarget::Columns(a, b) => {
            let (ca, cb) = shrink_pair(a.col, b.col, removed)?;
            RefTarget::Columns(ColRef { col: ca, ..a }, ColRef { col: cb, ..b })
        }
        RefTarget::Rows(..) => reference.target,
    };
    Some(Reference {
        sheet: reference.sheet.clone(),
        target,
    })
}

fn relocate(
    reference: &Reference,
    from: &str,
    to: &str,
    translations: &[Translation],
) -> Option<Reference> {
    let area = reference.area();
    let Some(t) = translations.iter().find(|t| t.area.contains_area(&area)) else {
        return Some(reference.clone());
    };
    let moved = shift(reference, t.d_row, t.d_col, true)?;
    let sheet = if sheet_names_match(from, to) {
        reference.sheet.clone()
    } else {
        Some(to.to_string())
    };
    Some(Reference { sheet, ..moved })
}

fn shift_coord(value: u32, delta: i64, max: u32) -> Option<u32> {
    let shifted = i64::from(value) + delta;
    (1..=i64::from(max))
        .contains(&shifted)
        .then_some(shifted as u32)
}

/// Move a reference by an offset. With `all_axes` absolute flags are ignored,
/// otherwise only relative axes move.
fn shift(reference: &Reference, d_row: i64, d_col: i64, all_axes: bool) -> Option<Reference> {
    let row = |value: u32, abs: bool| {
        if abs && !all_axes {
            Some(value)
        } else {
            shift_coord(value, d_row, MAX_ROW_COUNT)
        }
    };
    let col = |value: u32, abs: bool| {
        if abs && !all_axes {
            Some(value)
        } else {
            shift_coord(value, d_col, MAX_COLUMN_COUNT)
        }
    };
    let cell = |c: CellRef| -> Option<CellRef> {
        Some(CellRef {
            row: row(c.row, c.row_abs)?,
            col: col(c.col, c.col_abs)?,
            ..c
        })
    };
    let target = match reference.target {
        RefTarget::Cell(c) => RefTarget::Cell(cell(c)?),
        RefTarget::Range(a, b) => RefTarget::Range(cell(a)?, cell(b)?),
        RefTarget::Columns(a, b) => RefTarget::Columns(
            ColRef { col: col(a.col, a.abs)?, ..a },
            ColRef { col: col(b.col, b.abs)?, ..b },
        ),
        RefTarget::Rows(a, b) => RefTarget::Rows(
            RowRef { row: row(a.row, a.abs)?, ..a },
            RowRef { row: row(b.row, b.abs)?, ..b },
        ),
    };
    Some(Reference {
        sheet: reference.sheet.clone(),
        target,
    })
}

/// Adjust the relative parts of every reference by `(d_row, d_col)`, as when a
/// formula is copied or filled. References pushed off the grid become `#REF!`.
pub fn offset_references(formula: &str, d_row: i64, d_col: i64) -> String {
    if d_row == 0 && d_col == 0 {
        return formula.to_string();
    }
    splice(formula, |reference| {
        Some(match shift(reference, d_row, d_col, false) {
            Some(r) => r.to_string(),
            None => REF_ERROR.to_string(),
        })
    })
    .unwrap_or_else(|| formula.to_string())
}

/// Pin unqualified references to `sheet`.
pub fn qualify_references(formula: &str, sheet: &str) -> String {
    let prefix = quote_sheet_name(sheet);
    splice(formula, |reference| {
        if reference.sheet.is_some() {
            return None;
        }
        Some(format!("{}!{}", prefix, reference))
    })
    .unwrap_or_else(|| formula.to_string())
}
