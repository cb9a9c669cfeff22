use gridcalc_primitives::AddressError;
use thiserror::Error;

/// Errors that can occur during sheet operations
///
/// Every variant is raised before anything is written, so a failed operation
/// leaves the current snapshot untouched.
#[derive(Error, Debug)]
pub enum SheetError {
    #[error("Sheet not found: {name}")]
    SheetNotFound { name: String },

    #[error("Sheet already exists: {name}")]
    SheetAlreadyExists { name: String },

    #[error("Invalid sheet name: '{name}'")]
    InvalidSheetName { name: String },

    #[error("Cannot remove the last sheet")]
    LastSheet,

    #[error("Row index out of bounds: {index} (sheet has {count} rows)")]
    RowIndexOutOfBounds { index: u32, count: u32 },

    #[error("Column index out of bounds: {index} (sheet has {count} columns)")]
    ColumnIndexOutOfBounds { index: u32, count: u32 },

    #[error("Count must be at least 1")]
    InvalidCount,

    #[error("Operation would move cells outside the grid: {0}")]
    OutOfGrid(String),

    #[error("Selection has no visible cells")]
    EmptySelection,

    #[error("Invalid autofill: {0}")]
    InvalidAutofill(String),

    #[error("Invalid filter pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("Invalid size: {0}")]
    InvalidSize(f64),

    #[error("Address error: {0}")]
    Address(#[from] AddressError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SheetError>;
