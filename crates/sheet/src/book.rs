use std::sync::Arc;

use gridcalc_formulas::{rewrite_references, StructuralEdit};
use gridcalc_primitives::CellAddress;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::cell::CellContent;
use crate::error::{Result, SheetError};
use crate::sheet::{Sheet, SheetId, SheetLayout};

/// An immutable workbook snapshot (preserves sheet order).
///
/// Sheets are shared between snapshots; mutating a sheet through a cloned
/// book copies only that sheet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Book {
    /// Keyed by lowercase name
    sheets: IndexMap<String, Arc<Sheet>>,
    next_id: u32,
}

/// Same folding as [`gridcalc_primitives::sheet_names_match`].
fn key(name: &str) -> String {
    name.to_lowercase()
}

fn validate_name(name: &str) -> Result<()> {
    let invalid = name.trim().is_empty()
        || name.len() > 64
        || name.chars().any(|c| matches!(c, '[' | ']' | '*' | '?' | '/' | '\\' | ':' | '!'));
    if invalid {
        return Err(SheetError::InvalidSheetName {
            name: name.to_string(),
        });
    }
    Ok(())
}

impl Book {
    /// Create a new empty book
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of sheets
    #[must_use]
    pub fn sheet_count(&self) -> usize {
        self.sheets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sheets.is_empty()
    }

    /// Get all sheet names in order
    #[must_use]
    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.values().map(|sheet| sheet.name()).collect()
    }

    /// Check if a sheet exists (case-insensitive)
    #[must_use]
    pub fn has_sheet(&self, name: &str) -> bool {
        self.sheets.contains_key(&key(name))
    }

    pub fn sheets(&self) -> impl Iterator<Item = &Sheet> {
        self.sheets.values().map(AsRef::as_ref)
    }

    // ===== Sheet Access =====

    /// Get a sheet by name (case-insensitive)
    #[must_use]
    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.get(&key(name)).map(AsRef::as_ref)
    }

    /// Get a sheet by name or fail with [`SheetError::SheetNotFound`]
    pub fn get_sheet(&self, name: &str) -> Result<&Sheet> {
        self.sheet(name).ok_or_else(|| SheetError::SheetNotFound {
            name: name.to_string(),
        })
    }

    #[must_use]
    pub fn sheet_by_id(&self, id: SheetId) -> Option<&Sheet> {
        self.sheets().find(|sheet| sheet.id() == id)
    }

    /// Shared handle, used to detect untouched sheets between snapshots.
    pub(crate) fn sheet_arc(&self, id: SheetId) -> Option<&Arc<Sheet>> {
        self.sheets.values().find(|sheet| sheet.id() == id)
    }

    /// Copy-on-write access to a sheet.
    pub(crate) fn sheet_mut(&mut self, name: &str) -> Result<&mut Sheet> {
        self.sheets
            .get_mut(&key(name))
            .map(Arc::make_mut)
            .ok_or_else(|| SheetError::SheetNotFound {
                name: name.to_string(),
            })
    }

    pub(crate) fn sheet_by_id_mut(&mut self, id: SheetId) -> Option<&mut Sheet> {
        self.sheets
            .values_mut()
            .find(|sheet| sheet.id() == id)
            .map(Arc::make_mut)
    }

    // ===== Sheet Management =====

    /// Add an empty sheet at the end
    pub fn add_sheet(&mut self, name: &str, layout: SheetLayout) -> Result<SheetId> {
        validate_name(name)?;
        if self.has_sheet(name) {
            return Err(SheetError::SheetAlreadyExists {
                name: name.to_string(),
            });
        }
        self.next_id += 1;
        let id = SheetId(self.next_id);
        self.sheets
            .insert(key(name), Arc::new(Sheet::new(id, name, layout)));
        tracing::debug!(sheet = name, %id, "added sheet");
        Ok(id)
    }

    /// Remove a sheet by name. The last remaining sheet cannot be removed.
    pub fn remove_sheet(&mut self, name: &str) -> Result<Arc<Sheet>> {
        if !self.has_sheet(name) {
            return Err(SheetError::SheetNotFound {
                name: name.to_string(),
            });
        }
        if self.sheets.len() == 1 {
            return Err(SheetError::LastSheet);
        }
        let sheet = self
            .sheets
            .shift_remove(&key(name))
            .ok_or_else(|| SheetError::SheetNotFound {
                name: name.to_string(),
            })?;
        tracing::debug!(sheet = name, "removed sheet");
        Ok(sheet)
    }

    /// Rename a sheet (preserves position in sheet order). Formulas that name
    /// the old sheet are left as written.
    pub fn rename_sheet(&mut self, old_name: &str, new_name: &str) -> Result<()> {
        validate_name(new_name)?;
        let Some(index) = self.sheets.get_index_of(&key(old_name)) else {
            return Err(SheetError::SheetNotFound {
                name: old_name.to_string(),
            });
        };
        if key(old_name) != key(new_name) && self.has_sheet(new_name) {
            return Err(SheetError::SheetAlreadyExists {
                name: new_name.to_string(),
            });
        }
        let Some((_, mut sheet)) = self.sheets.shift_remove_index(index) else {
            return Ok(());
        };
        Arc::make_mut(&mut sheet).set_name(new_name);
        self.sheets.shift_insert(index, key(new_name), sheet);
        Ok(())
    }

    /// Rewrite every formula in every sheet to follow `edit`. Sheets with no
    /// affected formula keep sharing their storage.
    pub(crate) fn rewrite_formulas(&mut self, edit: &StructuralEdit) {
        for sheet in self.sheets.values_mut() {
            let updates: Vec<(CellAddress, String)> = sheet
                .formulas()
                .filter_map(|(addr, source)| {
                    rewrite_references(source, sheet.name(), edit).map(|text| (addr, text))
                })
                .collect();
            if updates.is_empty() {
                continue;
            }
            tracing::trace!(sheet = sheet.name(), count = updates.len(), "rewrote formulas");
            let sheet = Arc::make_mut(sheet);
            for (addr, text) in updates {
                sheet.set_cell(addr, CellContent::Formula(text));
            }
        }
    }

    /// Serialize the snapshot as JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book() -> Book {
        let mut book = Book::new();
        book.add_sheet("Data", SheetLayout::default()).unwrap();
        book.add_sheet("Summary", SheetLayout::default()).unwrap();
        book
    }

    #[test]
    fn test_add_sheet() {
        let mut book = book();
        assert_eq!(book.sheet_names(), vec!["Data", "Summary"]);
        assert!(book.has_sheet("data"));
        assert!(matches!(
            book.add_sheet("DATA", SheetLayout::default()),
            Err(SheetError::SheetAlreadyExists { .. })
        ));
        assert!(matches!(
            book.add_sheet("a:b", SheetLayout::default()),
            Err(SheetError::InvalidSheetName { .. })
        ));
    }

    #[test]
    fn test_ids_are_stable() {
        let mut book = book();
        let id = book.sheet("Summary").unwrap().id();
        book.rename_sheet("Summary", "Totals").unwrap();
        assert_eq!(book.sheet_by_id(id).unwrap().name(), "Totals");
        assert_eq!(book.sheet_names(), vec!["Data", "Totals"]);
        book.remove_sheet("Data").unwrap();
        let next = book.add_sheet("Data", SheetLayout::default()).unwrap();
        assert_ne!(next, id);
    }

    #[test]
    fn test_rename_case_only() {
        let mut book = book();
        book.rename_sheet("data", "DATA").unwrap();
        assert_eq!(book.sheet_names(), vec!["DATA", "Summary"]);
    }

    #[test]
    fn test_remove_last_sheet_rejected() {
        let mut book = book();
        book.remove_sheet("Data").unwrap();
        assert!(matches!(book.remove_sheet("Summary"), Err(SheetError::LastSheet)));
        assert!(matches!(
            book.remove_sheet("Nope"),
            Err(SheetError::SheetNotFound { .. })
        ));
    }

    #[test]
    fn test_clone_shares_untouched_sheets() {
        let original = book();
        let mut edited = original.clone();
        edited
            .sheet_mut("Data")
            .unwrap()
            .set_cell(CellAddress::new(1, 1), CellContent::from(1));

        let data = original.sheet("Data").unwrap().id();
        let summary = original.sheet("Summary").unwrap().id();
        assert!(!Arc::ptr_eq(
            original.sheet_arc(data).unwrap(),
            edited.sheet_arc(data).unwrap()
        ));
        assert!(Arc::ptr_eq(
            original.sheet_arc(summary).unwrap(),
            edited.sheet_arc(summary).unwrap()
        ));
        assert!(original.sheet("Data").unwrap().is_empty());
    }

    #[test]
    fn test_rewrite_formulas_across_sheets() {
        let mut book = book();
        book.sheet_mut("Summary")
            .unwrap()
            .set_cell(CellAddress::new(1, 1), CellContent::formula("=SUM(Data!A1:A3)"));
        book.sheet_mut("Data")
            .unwrap()
            .set_cell(CellAddress::new(5, 1), CellContent::formula("=A2"));

        book.rewrite_formulas(&StructuralEdit::InsertRows {
            sheet: "Data".to_string(),
            at: 2,
            count: 1,
        });

        let summary = book.sheet("Summary").unwrap();
        assert_eq!(
            summary.cell(CellAddress::new(1, 1)),
            Some(&CellContent::formula("=SUM(Data!A1:A4)"))
        );
        let data = book.sheet("Data").unwrap();
        assert_eq!(
            data.cell(CellAddress::new(5, 1)),
            Some(&CellContent::formula("=A3"))
        );
    }

    #[test]
    fn test_json_roundtrip() {
        let mut book = book();
        book.sheet_mut("Data")
            .unwrap()
            .set_cell(CellAddress::new(2, 3), CellContent::formula("=1+1"));
        let json = book.to_json().unwrap();
        assert!(json.contains("\"C2\""));
        assert_eq!(Book::from_json(&json).unwrap(), book);
    }
}
