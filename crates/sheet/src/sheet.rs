use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use gridcalc_primitives::address::MAX_COLUMN_COUNT;
use gridcalc_primitives::{Area, CellAddress};
use serde::{Deserialize, Serialize};

use crate::cell::CellContent;
use crate::filter::ColumnFilter;

/// Stable sheet identity; survives renames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SheetId(pub u32);

impl fmt::Display for SheetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Row/column geometry and visibility of a sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetLayout {
    pub rows: u32,
    pub cols: u32,
    pub default_row_height: f64,
    pub default_col_width: f64,
    /// Explicit heights; rows not listed use the default.
    pub row_sizes: BTreeMap<u32, f64>,
    pub col_sizes: BTreeMap<u32, f64>,
    /// Rows hidden by the active filters
    pub hidden_rows: BTreeSet<u32>,
    /// Active filter per column
    pub filters: BTreeMap<u32, ColumnFilter>,
}

impl SheetLayout {
    pub fn new(rows: u32, cols: u32, row_height: f64, col_width: f64) -> Self {
        SheetLayout {
            rows,
            cols,
            default_row_height: row_height,
            default_col_width: col_width,
            row_sizes: BTreeMap::new(),
            col_sizes: BTreeMap::new(),
            hidden_rows: BTreeSet::new(),
            filters: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn row_height(&self, row: u32) -> f64 {
        self.row_sizes
            .get(&row)
            .copied()
            .unwrap_or(self.default_row_height)
    }

    #[must_use]
    pub fn col_width(&self, col: u32) -> f64 {
        self.col_sizes
            .get(&col)
            .copied()
            .unwrap_or(self.default_col_width)
    }

    #[must_use]
    pub fn is_row_hidden(&self, row: u32) -> bool {
        self.hidden_rows.contains(&row)
    }
}

impl Default for SheetLayout {
    fn default() -> Self {
        SheetLayout::new(100, 26, 20.0, 64.0)
    }
}

/// A named grid of cells with its layout.
///
/// Cells are stored sparsely; a missing entry is blank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sheet {
    id: SheetId,
    name: String,
    layout: SheetLayout,
    cells: BTreeMap<CellAddress, CellContent>,
}

impl Sheet {
    pub fn new(id: SheetId, name: &str, layout: SheetLayout) -> Self {
        Sheet {
            id,
            name: name.to_string(),
            layout,
            cells: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> SheetId {
        self.id
    }

    /// Get the sheet name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    #[must_use]
    pub fn layout(&self) -> &SheetLayout {
        &self.layout
    }

    pub(crate) fn layout_mut(&mut self) -> &mut SheetLayout {
        &mut self.layout
    }

    /// Get the number of rows
    #[must_use]
    pub fn row_count(&self) -> u32 {
        self.layout.rows
    }

    /// Get the number of columns
    #[must_use]
    pub fn col_count(&self) -> u32 {
        self.layout.cols
    }

    #[must_use]
    pub fn cell(&self, addr: CellAddress) -> Option<&CellContent> {
        self.cells.get(&addr)
    }

    /// Non-blank cells in row-major order
    pub fn cells(&self) -> impl Iterator<Item = (CellAddress, &CellContent)> {
        self.cells.iter().map(|(addr, content)| (*addr, content))
    }

    /// Non-blank cells inside `area`, row-major.
    pub fn cells_in(&self, area: Area) -> impl Iterator<Item = (CellAddress, &CellContent)> {
        let start = CellAddress::new(area.top, 1);
        let end = CellAddress::new(area.bottom, MAX_COLUMN_COUNT);
        self.cells
            .range(start..=end)
            .filter(move |(addr, _)| addr.col >= area.left && addr.col <= area.right)
            .map(|(addr, content)| (*addr, content))
    }

    #[must_use]
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Formula cells and their source text
    pub fn formulas(&self) -> impl Iterator<Item = (CellAddress, &str)> {
        self.cells.iter().filter_map(|(addr, content)| match content {
            CellContent::Formula(source) => Some((*addr, source.as_str())),
            CellContent::Value(_) => None,
        })
    }

    /// Store `content` at `addr`; a blank removes the entry. The sheet grows
    /// to include `addr`. Returns the previous content.
    pub(crate) fn set_cell(&mut self, addr: CellAddress, content: CellContent) -> Option<CellContent> {
        if content.is_blank() {
            return self.cells.remove(&addr);
        }
        self.layout.rows = self.layout.rows.max(addr.row);
        self.layout.cols = self.layout.cols.max(addr.col);
        self.cells.insert(addr, content)
    }

    pub(crate) fn remove_cell(&mut self, addr: CellAddress) -> Option<CellContent> {
        self.cells.remove(&addr)
    }

    /// Replace all cells at once; used by edits that move many cells.
    pub(crate) fn replace_cells(&mut self, cells: BTreeMap<CellAddress, CellContent>) {
        self.cells = cells;
    }

    pub(crate) fn take_cells(&mut self) -> BTreeMap<CellAddress, CellContent> {
        std::mem::take(&mut self.cells)
    }

    /// Last row and column holding content, `(0, 0)` when empty.
    #[must_use]
    pub fn used_extent(&self) -> (u32, u32) {
        let max_row = self.cells.keys().next_back().map_or(0, |addr| addr.row);
        let max_col = self.cells.keys().map(|addr| addr.col).max().unwrap_or(0);
        (max_row, max_col)
    }

    #[must_use]
    pub fn is_row_hidden(&self, row: u32) -> bool {
        self.layout.is_row_hidden(row)
    }

    /// Visible rows in `top..=bottom`, ascending.
    #[must_use]
    pub fn visible_rows(&self, top: u32, bottom: u32) -> Vec<u32> {
        (top..=bottom).filter(|row| !self.is_row_hidden(*row)).collect()
    }

    /// The first `count` visible rows at or after `start`.
    #[must_use]
    pub fn next_visible_rows(&self, start: u32, count: usize) -> Vec<u32> {
        (start..)
            .filter(|row| !self.is_row_hidden(*row))
            .take(count)
            .collect()
    }
}
