//! # gridcalc primitives
//!
//! Core types shared by the formula engine and the workbook model: 1-based
//! cell addresses, normalized areas, parsed reference tokens and the closed
//! [`Value`] union with its error codes.
//!
//! ```
//! use gridcalc_primitives::{Area, CellAddress};
//!
//! let area = Area::parse("B2:C3").unwrap();
//! assert!(area.contains(&CellAddress::from_a1("C2").unwrap()));
//! ```

pub mod address;
pub mod reference;
pub mod value;

pub use address::{
    column_index_to_letters, column_letters_to_index, quote_sheet_name, sheet_names_match, Area,
    AreaIter, CellAddress, MAX_COLUMN_COUNT, MAX_ROW_COUNT,
};
pub use reference::{CellRef, ColRef, RefTarget, Reference, RowRef};
pub use value::{CellError, ErrorValue, Value};

/// Errors that can occur when parsing addresses
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("Invalid column: {0}")]
    InvalidColumn(String),
    #[error("Invalid row: {0}")]
    InvalidRow(String),
    #[error("Invalid range: {0}")]
    InvalidRange(String),
}
