//! Workbook model for gridcalc
//!
//! Sheets hold sparse cells (literals or formula text) plus row/column
//! layout. A [`Spreadsheet`] owns the current immutable [`Book`] snapshot and
//! the undo history; every edit produces a new snapshot and at most one
//! history entry.
//!
//! # Examples
//!
//! ## Writing and reading cells
//!
//! ```
//! use gridcalc_sheet::Spreadsheet;
//! use gridcalc_primitives::Value;
//!
//! let mut book = Spreadsheet::default();
//! book.write("Sheet1", "A1", "10").unwrap();
//! book.write("Sheet1", "A2", "32").unwrap();
//! book.write("Sheet1", "A3", "=SUM(A1:A2)").unwrap();
//!
//! assert_eq!(book.value_a1("Sheet1", "A3").unwrap(), Value::Number(42.0));
//! ```
//!
//! ## Structural edits follow references
//!
//! ```
//! use gridcalc_sheet::Spreadsheet;
//! use gridcalc_primitives::CellAddress;
//!
//! let mut book = Spreadsheet::default();
//! book.write("Sheet1", "B1", "=A1*2").unwrap();
//! book.insert_rows("Sheet1", 1, 1).unwrap();
//!
//! let moved = CellAddress::from_a1("B2").unwrap();
//! assert_eq!(book.cell_text("Sheet1", moved, false).unwrap(), "=A2*2");
//!
//! book.undo();
//! let original = CellAddress::from_a1("B1").unwrap();
//! assert_eq!(book.cell_text("Sheet1", original, false).unwrap(), "=A1*2");
//! ```
//!
//! ## Filtering
//!
//! ```
//! use gridcalc_sheet::{FilterMode, Predicate, Spreadsheet};
//! use gridcalc_primitives::{Area, Value};
//!
//! let mut book = Spreadsheet::default();
//! for (i, score) in ["92", "67", "75"].iter().enumerate() {
//!     book.write("Sheet1", &format!("A{}", i + 1), score).unwrap();
//! }
//! book.apply_filter("Sheet1", 1, vec![Predicate::Gte(Value::Number(75.0))], FilterMode::And)
//!     .unwrap();
//!
//! let visible = book.select("Sheet1", Area::parse("A1:A3").unwrap()).unwrap();
//! assert_eq!(visible.len(), 2);
//! ```

mod autofill;
pub mod book;
pub mod cell;
pub mod csv;
pub mod error;
pub mod eval;
pub mod filter;
pub mod history;
pub mod options;
pub mod sheet;
pub mod sort;
pub mod spreadsheet;
mod structure;
pub mod transfer;

pub use book::Book;
pub use cell::CellContent;
pub use csv::CsvOptions;
pub use error::{Result, SheetError};
pub use eval::Evaluator;
pub use filter::{ColumnFilter, FilterMode, Predicate};
pub use history::{CellChange, History, HistoryEntry, Patch, SheetPatch};
pub use options::EngineOptions;
pub use sheet::{Sheet, SheetId, SheetLayout};
pub use sort::SortDirection;
pub use spreadsheet::{Changes, Spreadsheet, Update};
pub use transfer::Clipboard;
