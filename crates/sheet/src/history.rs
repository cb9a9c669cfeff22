//! Reversible patches and the undo/redo stacks.
//!
//! A [`Patch`] is the difference between two snapshots. Every committed
//! operation stores its forward and reverse patch, so undo and redo replay
//! exact cell contents and layouts rather than re-running the operation.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use gridcalc_primitives::CellAddress;

use crate::book::Book;
use crate::cell::CellContent;
use crate::sheet::{SheetId, SheetLayout};

/// Content of one slot before and after an operation; `None` is blank.
#[derive(Debug, Clone, PartialEq)]
pub struct CellChange {
    pub old: Option<CellContent>,
    pub new: Option<CellContent>,
}

/// Changes to a single sheet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SheetPatch {
    pub cells: BTreeMap<CellAddress, CellChange>,
    /// `(old, new)` when sizes, visibility or filters changed
    pub layout: Option<(SheetLayout, SheetLayout)>,
}

impl SheetPatch {
    fn is_empty(&self) -> bool {
        self.cells.is_empty() && self.layout.is_none()
    }

    fn inverse(&self) -> SheetPatch {
        SheetPatch {
            cells: self
                .cells
                .iter()
                .map(|(addr, change)| {
                    (
                        *addr,
                        CellChange {
                            old: change.new.clone(),
                            new: change.old.clone(),
                        },
                    )
                })
                .collect(),
            layout: self
                .layout
                .as_ref()
                .map(|(old, new)| (new.clone(), old.clone())),
        }
    }
}

/// A set of per-sheet changes that turns one snapshot into another.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Patch {
    sheets: BTreeMap<SheetId, SheetPatch>,
}

impl Patch {
    /// Diff two snapshots of the same workbook. Sheets still shared between
    /// them are skipped without looking at their cells.
    pub fn between(before: &Book, after: &Book) -> Patch {
        let mut sheets = BTreeMap::new();
        for sheet in after.sheets() {
            let id = sheet.id();
            let Some(old) = before.sheet_arc(id) else {
                continue;
            };
            if after
                .sheet_arc(id)
                .is_some_and(|new| Arc::ptr_eq(old, new))
            {
                continue;
            }
            let mut patch = SheetPatch::default();
            for (addr, content) in old.cells() {
                let new = sheet.cell(addr);
                if new != Some(content) {
                    patch.cells.insert(
                        addr,
                        CellChange {
                            old: Some(content.clone()),
                            new: new.cloned(),
                        },
                    );
                }
            }
            for (addr, content) in sheet.cells() {
                if old.cell(addr).is_none() {
                    patch.cells.insert(
                        addr,
                        CellChange {
                            old: None,
                            new: Some(content.clone()),
                        },
                    );
                }
            }
            if old.layout() != sheet.layout() {
                patch.layout = Some((old.layout().clone(), sheet.layout().clone()));
            }
            if !patch.is_empty() {
                sheets.insert(id, patch);
            }
        }
        Patch { sheets }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sheets.is_empty()
    }

    /// Sheets touched by this patch
    pub fn sheet_ids(&self) -> impl Iterator<Item = SheetId> + '_ {
        self.sheets.keys().copied()
    }

    #[must_use]
    pub fn sheet(&self, id: SheetId) -> Option<&SheetPatch> {
        self.sheets.get(&id)
    }

    /// Number of changed cells across all sheets
    #[must_use]
    pub fn cell_count(&self) -> usize {
        self.sheets.values().map(|patch| patch.cells.len()).sum()
    }

    /// Swap old and new everywhere.
    #[must_use]
    pub fn inverse(&self) -> Patch {
        Patch {
            sheets: self
                .sheets
                .iter()
                .map(|(id, patch)| (*id, patch.inverse()))
                .collect(),
        }
    }

    /// Write the `new` side of every change into `book`. Sheets that no
    /// longer exist are skipped.
    pub fn apply(&self, book: &mut Book) {
        for (id, patch) in &self.sheets {
            let Some(sheet) = book.sheet_by_id_mut(*id) else {
                tracing::warn!(sheet = %id, "patch targets a missing sheet");
                continue;
            };
            for (addr, change) in &patch.cells {
                match &change.new {
                    Some(content) => {
                        sheet.set_cell(*addr, content.clone());
                    }
                    None => {
                        sheet.remove_cell(*addr);
                    }
                }
            }
            if let Some((_, layout)) = &patch.layout {
                *sheet.layout_mut() = layout.clone();
            }
        }
    }
}

/// One logical user operation.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub label: String,
    /// Sheet the operation was issued against
    pub sheet: SheetId,
    pub timestamp: DateTime<Utc>,
    forward: Patch,
    reverse: Patch,
}

impl HistoryEntry {
    pub fn new(label: impl Into<String>, sheet: SheetId, forward: Patch) -> Self {
        let reverse = forward.inverse();
        HistoryEntry {
            label: label.into(),
            sheet,
            timestamp: Utc::now(),
            forward,
            reverse,
        }
    }

    #[must_use]
    pub fn forward(&self) -> &Patch {
        &self.forward
    }

    #[must_use]
    pub fn reverse(&self) -> &Patch {
        &self.reverse
    }
}

/// Bounded undo stack plus redo stack.
#[derive(Debug, Clone)]
pub struct History {
    undo: VecDeque<HistoryEntry>,
    redo: Vec<HistoryEntry>,
    limit: usize,
}

impl History {
    pub fn new(limit: usize) -> Self {
        History {
            undo: VecDeque::new(),
            redo: Vec::new(),
            limit,
        }
    }

    /// Record a new operation; clears the redo stack.
    pub fn push(&mut self, entry: HistoryEntry) {
        self.redo.clear();
        if self.limit == 0 {
            return;
        }
        self.undo.push_back(entry);
        while self.undo.len() > self.limit {
            self.undo.pop_front();
        }
    }

    /// Move the newest entry to the redo stack and return it.
    pub fn undo(&mut self) -> Option<&HistoryEntry> {
        let entry = self.undo.pop_back()?;
        self.redo.push(entry);
        self.redo.last()
    }

    /// Move the newest undone entry back to the undo stack and return it.
    pub fn redo(&mut self) -> Option<&HistoryEntry> {
        let entry = self.redo.pop()?;
        self.undo.push_back(entry);
        self.undo.back()
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    /// Get the number of undoable entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.undo.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.undo.is_empty()
    }

    /// Undoable entries, oldest first
    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.undo.iter()
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book() -> Book {
        let mut book = Book::new();
        book.add_sheet("Sheet1", SheetLayout::default()).unwrap();
        book.add_sheet("Sheet2", SheetLayout::default()).unwrap();
        book
    }

    fn a1(s: &str) -> CellAddress {
        CellAddress::from_a1(s).unwrap()
    }

    #[test]
    fn test_patch_between_and_inverse() {
        let mut before = book();
        before
            .sheet_mut("Sheet1")
            .unwrap()
            .set_cell(a1("A1"), CellContent::from(1));
        let mut after = before.clone();
        {
            let sheet = after.sheet_mut("Sheet1").unwrap();
            sheet.set_cell(a1("A1"), CellContent::from(2));
            sheet.set_cell(a1("B1"), CellContent::formula("=A1*2"));
        }

        let patch = Patch::between(&before, &after);
        assert_eq!(patch.cell_count(), 2);
        assert_eq!(patch.sheet_ids().count(), 1);

        let mut replay = before.clone();
        patch.apply(&mut replay);
        assert_eq!(replay, after);

        patch.inverse().apply(&mut replay);
        assert_eq!(replay, before);
    }

    #[test]
    fn test_unchanged_book_gives_empty_patch() {
        let before = book();
        let after = before.clone();
        assert!(Patch::between(&before, &after).is_empty());
    }

    #[test]
    fn test_layout_change_recorded() {
        let before = book();
        let mut after = before.clone();
        after
            .sheet_mut("Sheet2")
            .unwrap()
            .layout_mut()
            .row_sizes
            .insert(4, 30.0);
        let patch = Patch::between(&before, &after);
        let id = after.sheet("Sheet2").unwrap().id();
        assert!(patch.sheet(id).unwrap().layout.is_some());

        let mut undone = after.clone();
        patch.inverse().apply(&mut undone);
        assert_eq!(undone, before);
    }

    #[test]
    fn test_history_limit_and_redo() {
        let mut history = History::new(2);
        for label in ["one", "two", "three"] {
            history.push(HistoryEntry::new(label, SheetId(1), Patch::default()));
        }
        assert_eq!(history.len(), 2);
        let labels: Vec<&str> = history.entries().map(|e| e.label.as_str()).collect();
        assert_eq!(labels, vec!["two", "three"]);

        assert_eq!(history.undo().map(|e| e.label.clone()), Some("three".into()));
        assert!(history.can_redo());
        history.push(HistoryEntry::new("four", SheetId(1), Patch::default()));
        assert!(!history.can_redo());
        assert!(history.redo().is_none());
    }

    #[test]
    fn test_undo_on_empty_is_none() {
        let mut history = History::new(10);
        assert!(history.undo().is_none());
        assert!(history.redo().is_none());
    }
}
