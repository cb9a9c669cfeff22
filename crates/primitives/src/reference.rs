//! Parsed reference tokens: cells, ranges, whole rows and whole columns with
//! per-axis absolute flags and an optional sheet qualifier.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::address::{
    column_index_to_letters, quote_sheet_name, sheet_names_match, Area, CellAddress,
    MAX_COLUMN_COUNT, MAX_ROW_COUNT,
};
use crate::value::Value;

/// One corner of a cell or range reference (`$A1`, `B$2`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellRef {
    pub row: u32,
    pub col: u32,
    pub row_abs: bool,
    pub col_abs: bool,
}

impl CellRef {
    pub fn relative(addr: CellAddress) -> Self {
        Self {
            row: addr.row,
            col: addr.col,
            row_abs: false,
            col_abs: false,
        }
    }

    pub fn absolute(addr: CellAddress) -> Self {
        Self {
            row: addr.row,
            col: addr.col,
            row_abs: true,
            col_abs: true,
        }
    }

    pub fn address(&self) -> CellAddress {
        CellAddress::new(self.row, self.col)
    }

    /// Same flags, new coordinates.
    pub fn with_address(&self, addr: CellAddress) -> Self {
        Self {
            row: addr.row,
            col: addr.col,
            ..*self
        }
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}{}",
            if self.col_abs { "$" } else { "" },
            column_index_to_letters(self.col),
            if self.row_abs { "$" } else { "" },
            self.row
        )
    }
}

/// A column bound of a whole-column reference (`$C` in `$C:D`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColRef {
    pub col: u32,
    pub abs: bool,
}

impl fmt::Display for ColRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.abs {
            f.write_str("$")?;
        }
        f.write_str(&column_index_to_letters(self.col))
    }
}

/// A row bound of a whole-row reference (`$2` in `$2:5`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RowRef {
    pub row: u32,
    pub abs: bool,
}

impl fmt::Display for RowRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.abs {
            f.write_str("$")?;
        }
        write!(f, "{}", self.row)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RefTarget {
    Cell(CellRef),
    /// Corners as written; use [`Reference::area`] for the normalized rectangle.
    Range(CellRef, CellRef),
    Columns(ColRef, ColRef),
    Rows(RowRef, RowRef),
}

/// A reference as it appears in formula text.
///
/// Without a sheet qualifier the reference resolves against the sheet the
/// formula lives in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reference {
    pub sheet: Option<String>,
    pub target: RefTarget,
}

impl Reference {
    pub fn cell(addr: CellAddress) -> Self {
        Self {
            sheet: None,
            target: RefTarget::Cell(CellRef::relative(addr)),
        }
    }

    pub fn range(start: CellAddress, end: CellAddress) -> Self {
        Self {
            sheet: None,
            target: RefTarget::Range(CellRef::relative(start), CellRef::relative(end)),
        }
    }

    pub fn on_sheet(mut self, sheet: impl Into<String>) -> Self {
        self.sheet = Some(sheet.into());
        self
    }

    /// The rectangle this reference covers.
    pub fn area(&self) -> Area {
        match self.target {
            RefTarget::Cell(c) => Area::cell(c.address()),
            RefTarget::Range(a, b) => Area::new(a.address(), b.address()),
            RefTarget::Columns(a, b) => Area::whole_columns(a.col, b.col),
            RefTarget::Rows(a, b) => Area::whole_rows(a.row, b.row),
        }
    }

    pub fn is_single_cell(&self) -> bool {
        matches!(self.target, RefTarget::Cell(_))
    }

    /// Sheet this reference reads from, given the formula's own sheet.
    pub fn sheet_or<'a>(&'a self, home: &'a str) -> &'a str {
        self.sheet.as_deref().unwrap_or(home)
    }

    /// Whether the reference targets `sheet` when evaluated from `home`.
    pub fn targets_sheet(&self, home: &str, sheet: &str) -> bool {
        sheet_names_match(self.sheet_or(home), sheet)
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(sheet) = &self.sheet {
            write!(f, "{}!", quote_sheet_name(sheet))?;
        }
        match &self.target {
            RefTarget::Cell(c) => write!(f, "{c}"),
            RefTarget::Range(a, b) => write!(f, "{a}:{b}"),
            RefTarget::Columns(a, b) => write!(f, "{a}:{b}"),
            RefTarget::Rows(a, b) => write!(f, "{a}:{b}"),
        }
    }
}

/// Clamp a whole-row/whole-column area to a used extent so iteration stays
/// proportional to stored data.
pub fn clip_area(area: Area, max_row: u32, max_col: u32) -> Option<Area> {
    let bottom = if area.bottom == MAX_ROW_COUNT {
        area.bottom.min(max_row.max(area.top))
    } else {
        area.bottom
    };
    let right = if area.right == MAX_COLUMN_COUNT {
        area.right.min(max_col.max(area.left))
    } else {
        area.right
    };
    if area.top > bottom || area.left > right {
        return None;
    }
    Some(Area::from_bounds(area.top, area.left, bottom, right))
}

/// Read `area`, clipped to a used extent, as a row-major block. An empty
/// clip reads as a single blank so every resolver hands functions the same
/// shape.
pub fn read_area(area: Area, max_row: u32, max_col: u32, read: impl Fn(CellAddress) -> Value) -> Value {
    let Some(area) = clip_area(area, max_row, max_col) else {
        return Value::Array(vec![vec![Value::Blank]]);
    };
    let rows = (area.top..=area.bottom)
        .map(|row| {
            (area.left..=area.right)
                .map(|col| read(CellAddress::new(row, col)))
                .collect()
        })
        .collect();
    Value::Array(rows)
}
