//! Cell addresses, rectangular areas and A1 helpers.
//!
//! Rows and columns are 1-based. Index 0 is reserved for headers and is never
//! a valid data coordinate.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::AddressError;

pub const MAX_ROW_COUNT: u32 = 1_048_576;
pub const MAX_COLUMN_COUNT: u32 = 16_384;

/// A cell address within one sheet (e.g. `B7` is row 7, col 2).
///
/// Ordering is row-major, so a `BTreeMap<CellAddress, _>` iterates cells the
/// way a reader scans the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellAddress {
    pub row: u32,
    pub col: u32,
}

impl CellAddress {
    pub const fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }

    /// Parse from A1 notation. `$` markers are accepted and ignored.
    pub fn from_a1(s: &str) -> Result<Self, AddressError> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(AddressError::InvalidRange("Empty A1 reference".to_string()));
        }

        let body = trimmed.strip_prefix('$').unwrap_or(trimmed);
        let split = body
            .find(|c: char| !c.is_ascii_alphabetic())
            .unwrap_or(body.len());
        let (letters, rest) = body.split_at(split);
        if letters.is_empty() {
            return Err(AddressError::InvalidColumn(trimmed.to_string()));
        }
        let digits = rest.strip_prefix('$').unwrap_or(rest);
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(AddressError::InvalidRow(trimmed.to_string()));
        }

        let row = parse_row_number(digits)?;
        let col = column_letters_to_index(letters)?;
        Ok(Self { row, col })
    }

    pub fn to_a1(&self) -> String {
        format!("{}{}", column_index_to_letters(self.col), self.row)
    }

    /// Shift by a signed offset, `None` when the result leaves the grid.
    pub fn offset(&self, d_row: i64, d_col: i64) -> Option<Self> {
        let row = shift_axis(self.row, d_row, MAX_ROW_COUNT)?;
        let col = shift_axis(self.col, d_col, MAX_COLUMN_COUNT)?;
        Some(Self { row, col })
    }

    pub fn is_valid(&self) -> bool {
        (1..=MAX_ROW_COUNT).contains(&self.row) && (1..=MAX_COLUMN_COUNT).contains(&self.col)
    }
}

impl fmt::Display for CellAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_a1())
    }
}

// Addresses serialize as A1 strings so cell maps become JSON objects.
impl Serialize for CellAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_a1())
    }
}

impl<'de> Deserialize<'de> for CellAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        CellAddress::from_a1(&text).map_err(serde::de::Error::custom)
    }
}

/// A normalized rectangle of cells: `top <= bottom` and `left <= right`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Area {
    pub top: u32,
    pub left: u32,
    pub bottom: u32,
    pub right: u32,
}

impl Area {
    /// Build an area from two opposite corners in any order.
    pub fn new(a: CellAddress, b: CellAddress) -> Self {
        Self::from_bounds(a.row, a.col, b.row, b.col)
    }

    pub fn from_bounds(top: u32, left: u32, bottom: u32, right: u32) -> Self {
        Self {
            top: top.min(bottom),
            left: left.min(right),
            bottom: top.max(bottom),
            right: left.max(right),
        }
    }

    pub fn cell(addr: CellAddress) -> Self {
        Self::new(addr, addr)
    }

    /// Full-width rows `top..=bottom`.
    pub fn whole_rows(top: u32, bottom: u32) -> Self {
        Self::from_bounds(top, 1, bottom, MAX_COLUMN_COUNT)
    }

    /// Full-height columns `left..=right`.
    pub fn whole_columns(left: u32, right: u32) -> Self {
        Self::from_bounds(1, left, MAX_ROW_COUNT, right)
    }

    /// Parse `A1`, `A1:C3`, `A:C` or `2:5`. Sheet prefixes are not accepted here.
    pub fn parse(s: &str) -> Result<Self, AddressError> {
        let trimmed = s.trim();
        let Some((start, end)) = trimmed.split_once(':') else {
            return CellAddress::from_a1(trimmed).map(Self::cell);
        };
        let (start, end) = (start.trim(), end.trim());
        let strip = |t: &str| t.replace('$', "");
        let (start_s, end_s) = (strip(start), strip(end));

        if start_s.chars().all(|c| c.is_ascii_alphabetic())
            && end_s.chars().all(|c| c.is_ascii_alphabetic())
            && !start_s.is_empty()
            && !end_s.is_empty()
        {
            let left = column_letters_to_index(&start_s)?;
            let right = column_letters_to_index(&end_s)?;
            return Ok(Self::whole_columns(left, right));
        }
        if start_s.chars().all(|c| c.is_ascii_digit())
            && end_s.chars().all(|c| c.is_ascii_digit())
            && !start_s.is_empty()
            && !end_s.is_empty()
        {
            let top = parse_row_number(&start_s)?;
            let bottom = parse_row_number(&end_s)?;
            return Ok(Self::whole_rows(top, bottom));
        }

        let a = CellAddress::from_a1(start)?;
        let b = CellAddress::from_a1(end)?;
        Ok(Self::new(a, b))
    }

    pub fn top_left(&self) -> CellAddress {
        CellAddress::new(self.top, self.left)
    }

    pub fn bottom_right(&self) -> CellAddress {
        CellAddress::new(self.bottom, self.right)
    }

    pub fn rows(&self) -> u32 {
        self.bottom - self.top + 1
    }

    pub fn cols(&self) -> u32 {
        self.right - self.left + 1
    }

    pub fn size(&self) -> usize {
        self.rows() as usize * self.cols() as usize
    }

    pub fn is_whole_rows(&self) -> bool {
        self.left == 1 && self.right == MAX_COLUMN_COUNT
    }

    pub fn is_whole_columns(&self) -> bool {
        self.top == 1 && self.bottom == MAX_ROW_COUNT
    }

    pub fn contains(&self, addr: &CellAddress) -> bool {
        (self.top..=self.bottom).contains(&addr.row) && (self.left..=self.right).contains(&addr.col)
    }

    pub fn contains_area(&self, other: &Area) -> bool {
        self.top <= other.top
            && self.left <= other.left
            && self.bottom >= other.bottom
            && self.right >= other.right
    }

    pub fn intersects(&self, other: &Area) -> bool {
        self.intersection(other).is_some()
    }

    pub fn intersection(&self, other: &Area) -> Option<Area> {
        let top = self.top.max(other.top);
        let left = self.left.max(other.left);
        let bottom = self.bottom.min(other.bottom);
        let right = self.right.min(other.right);
        (top <= bottom && left <= right).then_some(Area {
            top,
            left,
            bottom,
            right,
        })
    }

    /// Translate the whole area, `None` if any corner leaves the grid.
    pub fn offset(&self, d_row: i64, d_col: i64) -> Option<Area> {
        let a = self.top_left().offset(d_row, d_col)?;
        let b = self.bottom_right().offset(d_row, d_col)?;
        Some(Area::new(a, b))
    }

    /// Same shape anchored at `origin`.
    pub fn moved_to(&self, origin: CellAddress) -> Option<Area> {
        self.offset(
            i64::from(origin.row) - i64::from(self.top),
            i64::from(origin.col) - i64::from(self.left),
        )
    }

    /// Iterate addresses in row-major order.
    pub fn iter(&self) -> AreaIter {
        AreaIter {
            area: *self,
            next: Some(self.top_left()),
        }
    }
}

impl fmt::Display for Area {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_whole_columns() && !self.is_whole_rows() {
            return write!(
                f,
                "{}:{}",
                column_index_to_letters(self.left),
                column_index_to_letters(self.right)
            );
        }
        if self.is_whole_rows() && !self.is_whole_columns() {
            return write!(f, "{}:{}", self.top, self.bottom);
        }
        if self.top == self.bottom && self.left == self.right {
            return write!(f, "{}", self.top_left());
        }
        write!(f, "{}:{}", self.top_left(), self.bottom_right())
    }
}

impl From<CellAddress> for Area {
    fn from(addr: CellAddress) -> Self {
        Area::cell(addr)
    }
}

pub struct AreaIter {
    area: Area,
    next: Option<CellAddress>,
}

impl Iterator for AreaIter {
    type Item = CellAddress;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = if current.col < self.area.right {
            Some(CellAddress::new(current.row, current.col + 1))
        } else if current.row < self.area.bottom {
            Some(CellAddress::new(current.row + 1, self.area.left))
        } else {
            None
        };
        Some(current)
    }
}

/// `1` -> `A`, `27` -> `AA`.
pub fn column_index_to_letters(index: u32) -> String {
    let mut letters = Vec::new();
    let mut n = index;
    while n > 0 {
        let rem = ((n - 1) % 26) as u8;
        letters.push((b'A' + rem) as char);
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// `A` -> `1`, `aa` -> `27`.
pub fn column_letters_to_index(letters: &str) -> Result<u32, AddressError> {
    if letters.is_empty() {
        return Err(AddressError::InvalidColumn(letters.to_string()));
    }
    let mut result: u32 = 0;
    for ch in letters.chars() {
        let upper = ch.to_ascii_uppercase();
        if !upper.is_ascii_uppercase() {
            return Err(AddressError::InvalidColumn(letters.to_string()));
        }
        let value = u32::from(upper as u8 - b'A' + 1);
        result = result
            .checked_mul(26)
            .and_then(|v| v.checked_add(value))
            .ok_or_else(|| AddressError::InvalidColumn(letters.to_string()))?;
    }
    if result > MAX_COLUMN_COUNT {
        return Err(AddressError::InvalidColumn(letters.to_string()));
    }
    Ok(result)
}

fn parse_row_number(digits: &str) -> Result<u32, AddressError> {
    let row: u32 = digits
        .parse()
        .map_err(|_| AddressError::InvalidRow(digits.to_string()))?;
    if row == 0 || row > MAX_ROW_COUNT {
        return Err(AddressError::InvalidRow(digits.to_string()));
    }
    Ok(row)
}

fn shift_axis(value: u32, delta: i64, max: u32) -> Option<u32> {
    let shifted = i64::from(value) + delta;
    if shifted < 1 || shifted > i64::from(max) {
        return None;
    }
    u32::try_from(shifted).ok()
}

/// Sheet names are case-insensitive under full Unicode lowercasing, the same
/// folding the workbook uses to key its sheets.
pub fn sheet_names_match(a: &str, b: &str) -> bool {
    a == b || a.to_lowercase() == b.to_lowercase()
}

/// Whether a sheet name must be wrapped in single quotes inside a formula.
pub fn sheet_name_needs_quotes(name: &str) -> bool {
    if name.is_empty() {
        return true;
    }
    if name.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        return true;
    }
    if name
        .chars()
        .any(|c| !(c.is_ascii_alphanumeric() || c == '_'))
    {
        return true;
    }
    // A bare `AB12` would read as a cell reference.
    CellAddress::from_a1(name).is_ok()
}

/// Render a sheet name for use as a reference prefix (without the `!`).
pub fn quote_sheet_name(name: &str) -> String {
    if sheet_name_needs_quotes(name) {
        format!("'{}'", name.replace('\'', "''"))
    } else {
        name.to_string()
    }
}
