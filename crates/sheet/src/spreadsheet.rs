//! The editing facade: a current snapshot, a formula engine and history.
//!
//! Every mutating call works on a copy of the current [`Book`], diffs it
//! against the original and, when something changed, records exactly one
//! history entry. Errors are raised before the copy replaces the current
//! snapshot, so a failed call changes nothing.

use std::collections::BTreeMap;
use std::io::{Read, Write};

use gridcalc_formulas::{FormulaEngine, FormulaError, FunctionDefinition};
use gridcalc_primitives::{Area, CellAddress, Value};

use crate::autofill;
use crate::book::Book;
use crate::cell::CellContent;
use crate::csv::{read_cells, write_delimited, CsvOptions};
use crate::error::{Result, SheetError};
use crate::eval::Evaluator;
use crate::filter::{self, ColumnFilter, FilterMode, Predicate};
use crate::history::{History, HistoryEntry, Patch};
use crate::options::EngineOptions;
use crate::sheet::{Sheet, SheetId};
use crate::sort::{self, SortDirection};
use crate::structure;
use crate::transfer::{self, Clipboard};

/// What an operation touched.
#[derive(Debug, Clone, PartialEq)]
pub struct Changes {
    /// Sheet the operation was issued against
    pub affected_sheet: SheetId,
    /// Changed cells of the affected sheet, row-major
    pub cells: Vec<CellAddress>,
    /// Sizes, visibility or filters of the affected sheet changed
    pub layout_changed: bool,
    /// Other sheets whose cells changed, e.g. through rewritten formulas
    pub other_sheets: Vec<SheetId>,
}

impl Changes {
    fn from_patch(affected_sheet: SheetId, patch: &Patch) -> Self {
        let own = patch.sheet(affected_sheet);
        Changes {
            affected_sheet,
            cells: own
                .map(|sheet| sheet.cells.keys().copied().collect())
                .unwrap_or_default(),
            layout_changed: own.is_some_and(|sheet| sheet.layout.is_some()),
            other_sheets: patch
                .sheet_ids()
                .filter(|id| *id != affected_sheet)
                .collect(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty() && !self.layout_changed && self.other_sheets.is_empty()
    }
}

/// Result of a mutating call: the new snapshot and what changed.
#[derive(Debug, Clone)]
pub struct Update {
    pub snapshot: Book,
    pub changes: Changes,
}

/// A workbook under edit.
#[derive(Clone)]
pub struct Spreadsheet {
    book: Book,
    engine: FormulaEngine,
    options: EngineOptions,
    history: History,
}

impl Default for Spreadsheet {
    fn default() -> Self {
        Self::new(EngineOptions::default())
    }
}

impl Spreadsheet {
    /// Create a workbook with one empty sheet named `Sheet1`
    pub fn new(options: EngineOptions) -> Self {
        Self::with_engine(FormulaEngine::new(), options)
    }

    /// Create a workbook evaluating with `engine` and its function registry
    pub fn with_engine(engine: FormulaEngine, options: EngineOptions) -> Self {
        let mut book = Book::new();
        if let Err(err) = book.add_sheet("Sheet1", options.layout()) {
            tracing::error!(%err, "could not create the initial sheet");
        }
        Spreadsheet {
            book,
            engine,
            history: History::new(options.history_limit),
            options,
        }
    }

    /// Get the current snapshot
    #[must_use]
    pub fn snapshot(&self) -> &Book {
        &self.book
    }

    #[must_use]
    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    #[must_use]
    pub fn engine(&self) -> &FormulaEngine {
        &self.engine
    }

    #[must_use]
    pub fn history(&self) -> &History {
        &self.history
    }

    /// Register a user function; built-ins cannot be replaced.
    pub fn register_function(
        &mut self,
        name: &str,
        def: FunctionDefinition,
    ) -> std::result::Result<(), FormulaError> {
        self.engine.register_function(name, def)
    }

    // ===== Sheet Management =====

    pub fn sheet(&self, name: &str) -> Result<&Sheet> {
        self.book.get_sheet(name)
    }

    /// Get all sheet names in order
    #[must_use]
    pub fn sheet_names(&self) -> Vec<&str> {
        self.book.sheet_names()
    }

    /// Add an empty sheet sized by the engine options.
    pub fn add_sheet(&mut self, name: &str) -> Result<SheetId> {
        self.book.add_sheet(name, self.options.layout())
    }

    /// Remove a sheet. History is cleared because its patches may refer to
    /// the removed sheet.
    pub fn remove_sheet(&mut self, name: &str) -> Result<()> {
        self.book.remove_sheet(name)?;
        self.history.clear();
        Ok(())
    }

    /// Rename a sheet. Formulas naming the old sheet are not rewritten and
    /// resolve to `#REF!` until a sheet of that name exists again.
    pub fn rename_sheet(&mut self, old_name: &str, new_name: &str) -> Result<()> {
        self.book.rename_sheet(old_name, new_name)?;
        self.history.clear();
        Ok(())
    }

    // ===== Reads =====

    /// Evaluated value of a cell
    pub fn value(&self, sheet: &str, addr: CellAddress) -> Result<Value> {
        let target = self.book.get_sheet(sheet)?;
        Ok(Evaluator::new(&self.book, &self.engine).value(target, addr))
    }

    /// Evaluated value of a cell given in A1 notation
    pub fn value_a1(&self, sheet: &str, a1: &str) -> Result<Value> {
        self.value(sheet, CellAddress::from_a1(a1)?)
    }

    /// Stored content of a cell; `None` when blank.
    pub fn raw(&self, sheet: &str, addr: CellAddress) -> Result<Option<&CellContent>> {
        Ok(self.book.get_sheet(sheet)?.cell(addr))
    }

    /// Text of a cell, either evaluated or as stored.
    pub fn cell_text(&self, sheet: &str, addr: CellAddress, evaluated: bool) -> Result<String> {
        if evaluated {
            return Ok(self.value(sheet, addr)?.to_text());
        }
        Ok(self
            .raw(sheet, addr)?
            .map(CellContent::to_raw_string)
            .unwrap_or_default())
    }

    /// Evaluated text of a cell
    pub fn display(&self, sheet: &str, addr: CellAddress) -> Result<String> {
        self.cell_text(sheet, addr, true)
    }

    /// Evaluated values of every non-blank cell of a sheet
    pub fn evaluate_sheet(&self, sheet: &str) -> Result<BTreeMap<CellAddress, Value>> {
        let target = self.book.get_sheet(sheet)?;
        Ok(Evaluator::new(&self.book, &self.engine).evaluate_sheet(target))
    }

    /// Visible cells of `area`; rows hidden by a filter are left out.
    pub fn select(&self, sheet: &str, area: Area) -> Result<Vec<CellAddress>> {
        transfer::select(&self.book, sheet, area)
    }

    /// Capture the visible cells of `area` for a later [`Spreadsheet::paste`].
    pub fn copy_range(&self, sheet: &str, area: Area) -> Result<Clipboard> {
        transfer::copy_range(&self.book, sheet, area)
    }

    /// Write a sheet as delimited text to `writer`.
    pub fn write_csv<W: Write>(
        &self,
        sheet: &str,
        writer: W,
        evaluated: bool,
        options: &CsvOptions,
    ) -> Result<()> {
        let target = self.book.get_sheet(sheet)?;
        if evaluated {
            let evaluator = Evaluator::new(&self.book, &self.engine);
            write_delimited(target, Some(&evaluator), writer, options)
        } else {
            write_delimited(target, None, writer, options)
        }
    }

    /// Delimited text of a sheet, raw or evaluated.
    pub fn to_delimited(&self, sheet: &str, evaluated: bool, options: &CsvOptions) -> Result<String> {
        let mut buffer = Vec::new();
        self.write_csv(sheet, &mut buffer, evaluated, options)?;
        Ok(String::from_utf8_lossy(&buffer).to_string())
    }

    // ===== Edits =====

    /// Run `op` against a copy of the current snapshot and commit the result.
    fn commit<F>(&mut self, label: &str, sheet: &str, op: F) -> Result<Update>
    where
        F: FnOnce(&mut Book, &FormulaEngine) -> Result<()>,
    {
        let id = self.book.get_sheet(sheet)?.id();
        let mut next = self.book.clone();
        if let Err(err) = op(&mut next, &self.engine) {
            tracing::warn!(op = label, sheet, %err, "operation rejected");
            return Err(err);
        }
        let patch = Patch::between(&self.book, &next);
        let changes = Changes::from_patch(id, &patch);
        self.book = next;
        if patch.is_empty() {
            tracing::debug!(op = label, sheet, "no changes");
        } else {
            tracing::debug!(op = label, sheet, cells = patch.cell_count(), "committed");
            self.history.push(HistoryEntry::new(label, id, patch));
        }
        Ok(Update {
            snapshot: self.book.clone(),
            changes,
        })
    }

    /// Write several cells as one operation. Blank contents clear.
    pub fn write_cells<I>(&mut self, sheet: &str, cells: I) -> Result<Update>
    where
        I: IntoIterator<Item = (CellAddress, CellContent)>,
    {
        let cells: Vec<(CellAddress, CellContent)> = cells.into_iter().collect();
        if let Some((addr, _)) = cells.iter().find(|(addr, _)| !addr.is_valid()) {
            return Err(SheetError::OutOfGrid(format!(
                "row {} column {} is not a cell",
                addr.row, addr.col
            )));
        }
        self.commit("write", sheet, move |book, _| {
            let target = book.sheet_mut(sheet)?;
            for (addr, content) in cells {
                target.set_cell(addr, content);
            }
            Ok(())
        })
    }

    /// Write typed input (`42`, `'0123`, `=A1*2`) to one cell.
    pub fn write(&mut self, sheet: &str, a1: &str, input: &str) -> Result<Update> {
        let addr = CellAddress::from_a1(a1)?;
        self.write_cells(sheet, [(addr, CellContent::parse(input))])
    }

    /// Load delimited text into `sheet` starting at `A1`, as one operation.
    pub fn import_csv<R: Read>(&mut self, sheet: &str, reader: R, options: &CsvOptions) -> Result<Update> {
        let cells = read_cells(reader, options)?;
        self.write_cells(sheet, cells)
    }

    /// Blank out the visible cells of `area`.
    pub fn clear_range(&mut self, sheet: &str, area: Area) -> Result<Update> {
        self.commit("clear", sheet, |book, _| transfer::clear_range(book, sheet, area))
    }

    pub fn insert_rows(&mut self, sheet: &str, at: u32, count: u32) -> Result<Update> {
        self.commit("insert rows", sheet, |book, _| {
            structure::insert_rows(book, sheet, at, count)
        })
    }

    pub fn insert_cols(&mut self, sheet: &str, at: u32, count: u32) -> Result<Update> {
        self.commit("insert columns", sheet, |book, _| {
            structure::insert_cols(book, sheet, at, count)
        })
    }

    pub fn remove_rows(&mut self, sheet: &str, indices: &[u32]) -> Result<Update> {
        self.commit("remove rows", sheet, |book, _| {
            structure::remove_rows(book, sheet, indices)
        })
    }

    pub fn remove_cols(&mut self, sheet: &str, indices: &[u32]) -> Result<Update> {
        self.commit("remove columns", sheet, |book, _| {
            structure::remove_cols(book, sheet, indices)
        })
    }

    /// Move the visible cells of `area` so its top-left lands on `dst` in
    /// `dst_sheet`. Formulas anywhere that point into the block follow it.
    pub fn move_range(&mut self, sheet: &str, area: Area, dst_sheet: &str, dst: CellAddress) -> Result<Update> {
        self.commit("move", sheet, |book, _| {
            transfer::move_range(book, sheet, area, dst_sheet, dst)
        })
    }

    /// Copy the visible cells of `area` and clear them, as one operation.
    pub fn cut_range(&mut self, sheet: &str, area: Area) -> Result<(Clipboard, Update)> {
        let clipboard = transfer::copy_range(&self.book, sheet, area)?;
        let update = self.commit("cut", sheet, |book, _| transfer::clear_range(book, sheet, area))?;
        Ok((clipboard, update))
    }

    /// Paste into visible rows from `dst` downward.
    pub fn paste(&mut self, sheet: &str, dst: CellAddress, clipboard: &Clipboard) -> Result<Update> {
        self.commit("paste", sheet, |book, _| transfer::paste(book, sheet, dst, clipboard))
    }

    /// Extend `source` into `target`.
    pub fn autofill(&mut self, sheet: &str, source: Area, target: Area) -> Result<Update> {
        self.commit("autofill", sheet, |book, _| {
            autofill::autofill(book, sheet, source, target)
        })
    }

    /// Sort all used rows by column `col`.
    pub fn sort_by(&mut self, sheet: &str, col: u32, direction: SortDirection) -> Result<Update> {
        self.commit("sort", sheet, |book, engine| {
            sort::sort_by(book, engine, sheet, col, direction)
        })
    }

    /// Sort rows `top..=bottom` by column `col`, e.g. to keep a header row.
    pub fn sort_rows(
        &mut self,
        sheet: &str,
        col: u32,
        direction: SortDirection,
        top: u32,
        bottom: u32,
    ) -> Result<Update> {
        self.commit("sort", sheet, |book, engine| {
            sort::sort_rows(book, engine, sheet, col, direction, top, bottom)
        })
    }

    /// Attach a filter to column `col`, replacing any previous one, and hide
    /// the rows that fail it.
    pub fn apply_filter(
        &mut self,
        sheet: &str,
        col: u32,
        predicates: Vec<Predicate>,
        mode: FilterMode,
    ) -> Result<Update> {
        let column_filter = ColumnFilter::new(predicates, mode);
        column_filter.validate()?;
        self.commit("filter", sheet, |book, engine| {
            let target = book.sheet_mut(sheet)?;
            if col == 0 || col > target.col_count() {
                return Err(SheetError::ColumnIndexOutOfBounds {
                    index: col,
                    count: target.col_count(),
                });
            }
            target.layout_mut().filters.insert(col, column_filter);
            filter::refresh(book, engine, sheet)
        })
    }

    /// Drop the filter of one column, or of every column with `None`.
    pub fn reset_filter(&mut self, sheet: &str, col: Option<u32>) -> Result<Update> {
        self.commit("reset filter", sheet, |book, engine| {
            let filters = &mut book.sheet_mut(sheet)?.layout_mut().filters;
            match col {
                Some(col) => {
                    filters.remove(&col);
                }
                None => filters.clear(),
            }
            filter::refresh(book, engine, sheet)
        })
    }

    pub fn set_row_height(&mut self, sheet: &str, row: u32, height: f64) -> Result<Update> {
        if !height.is_finite() || height < 0.0 {
            return Err(SheetError::InvalidSize(height));
        }
        self.commit("row height", sheet, |book, _| {
            let target = book.sheet_mut(sheet)?;
            if row == 0 || row > target.row_count() {
                return Err(SheetError::RowIndexOutOfBounds {
                    index: row,
                    count: target.row_count(),
                });
            }
            target.layout_mut().row_sizes.insert(row, height);
            Ok(())
        })
    }

    pub fn set_column_width(&mut self, sheet: &str, col: u32, width: f64) -> Result<Update> {
        if !width.is_finite() || width < 0.0 {
            return Err(SheetError::InvalidSize(width));
        }
        self.commit("column width", sheet, |book, _| {
            let target = book.sheet_mut(sheet)?;
            if col == 0 || col > target.col_count() {
                return Err(SheetError::ColumnIndexOutOfBounds {
                    index: col,
                    count: target.col_count(),
                });
            }
            target.layout_mut().col_sizes.insert(col, width);
            Ok(())
        })
    }

    // ===== History =====

    /// Revert the newest operation; `None` when there is nothing to undo.
    pub fn undo(&mut self) -> Option<Update> {
        let entry = self.history.undo()?;
        entry.reverse().apply(&mut self.book);
        let changes = Changes::from_patch(entry.sheet, entry.reverse());
        tracing::debug!(op = %entry.label, "undone");
        Some(Update {
            snapshot: self.book.clone(),
            changes,
        })
    }

    /// Reapply the newest undone operation; `None` when there is nothing to
    /// redo.
    pub fn redo(&mut self) -> Option<Update> {
        let entry = self.history.redo()?;
        entry.forward().apply(&mut self.book);
        let changes = Changes::from_patch(entry.sheet, entry.forward());
        tracing::debug!(op = %entry.label, "redone");
        Some(Update {
            snapshot: self.book.clone(),
            changes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn a1(s: &str) -> CellAddress {
        CellAddress::from_a1(s).unwrap()
    }

    #[test]
    fn test_new_has_one_sheet() {
        let sheet = Spreadsheet::default();
        assert_eq!(sheet.sheet_names(), vec!["Sheet1"]);
        assert!(!sheet.history().can_undo());
    }

    #[test]
    fn test_write_then_read_is_never_stale() {
        let mut sheet = Spreadsheet::default();
        sheet.write("Sheet1", "A1", "2").unwrap();
        sheet.write("Sheet1", "B1", "=A1*10").unwrap();
        assert_eq!(sheet.value_a1("Sheet1", "B1").unwrap(), Value::Number(20.0));
        sheet.write("Sheet1", "A1", "3").unwrap();
        assert_eq!(sheet.value_a1("Sheet1", "B1").unwrap(), Value::Number(30.0));
        assert_eq!(sheet.cell_text("Sheet1", a1("B1"), false).unwrap(), "=A1*10");
    }

    #[test]
    fn test_failed_operation_changes_nothing() {
        let mut sheet = Spreadsheet::default();
        sheet.write("Sheet1", "A1", "1").unwrap();
        let before = sheet.snapshot().clone();
        assert!(sheet.insert_rows("Sheet1", 0, 1).is_err());
        assert!(sheet.set_row_height("Sheet1", 1, f64::NAN).is_err());
        assert_eq!(sheet.snapshot(), &before);
        assert_eq!(sheet.history().len(), 1);
    }

    #[test]
    fn test_noop_records_no_history() {
        let mut sheet = Spreadsheet::default();
        sheet.write("Sheet1", "A1", "1").unwrap();
        let update = sheet.write("Sheet1", "A1", "1").unwrap();
        assert!(update.changes.is_empty());
        assert_eq!(sheet.history().len(), 1);
    }

    #[test]
    fn test_changes_report_cells() {
        let mut sheet = Spreadsheet::default();
        let update = sheet
            .write_cells("Sheet1", [(a1("B2"), CellContent::from(1)), (a1("A1"), CellContent::from(2))])
            .unwrap();
        assert_eq!(update.changes.cells, vec![a1("A1"), a1("B2")]);
        assert!(!update.changes.layout_changed);
    }

    #[test]
    fn test_layout_operations_are_undoable() {
        let mut sheet = Spreadsheet::default();
        let update = sheet.set_column_width("Sheet1", 2, 120.0).unwrap();
        assert!(update.changes.layout_changed);
        assert_eq!(sheet.sheet("Sheet1").unwrap().layout().col_width(2), 120.0);
        sheet.undo().unwrap();
        assert_eq!(sheet.sheet("Sheet1").unwrap().layout().col_width(2), 64.0);
    }

    #[test]
    fn test_remove_sheet_clears_history() {
        let mut sheet = Spreadsheet::default();
        sheet.add_sheet("Data").unwrap();
        sheet.write("Data", "A1", "1").unwrap();
        sheet.remove_sheet("Data").unwrap();
        assert!(!sheet.history().can_undo());
        assert!(sheet.undo().is_none());
    }

    #[test]
    fn test_user_function() {
        use gridcalc_formulas::{ParamType, ReturnType};

        let mut sheet = Spreadsheet::default();
        sheet
            .register_function(
                "DOUBLE",
                FunctionDefinition::fixed(vec![ParamType::Number], ReturnType::Number, |args| {
                    match args[0].to_number() {
                        Ok(n) => Value::Number(n * 2.0),
                        Err(err) => Value::Error(err),
                    }
                }),
            )
            .unwrap();
        sheet.write("Sheet1", "A1", "=DOUBLE(21)").unwrap();
        assert_eq!(sheet.value_a1("Sheet1", "A1").unwrap(), Value::Number(42.0));
    }
}
