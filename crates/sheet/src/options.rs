use serde::{Deserialize, Serialize};

use crate::sheet::SheetLayout;

/// Engine-wide settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    /// Maximum number of undo entries kept; oldest entries are dropped first.
    pub history_limit: usize,
    /// Initial row count of new sheets
    pub default_rows: u32,
    /// Initial column count of new sheets
    pub default_cols: u32,
    pub default_row_height: f64,
    pub default_col_width: f64,
}

impl Default for EngineOptions {
    fn default() -> Self {
        EngineOptions {
            history_limit: 100,
            default_rows: 100,
            default_cols: 26,
            default_row_height: 20.0,
            default_col_width: 64.0,
        }
    }
}

impl EngineOptions {
    #[must_use]
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// Set the initial size of new sheets
    #[must_use]
    pub fn with_dimensions(mut self, rows: u32, cols: u32) -> Self {
        self.default_rows = rows.max(1);
        self.default_cols = cols.max(1);
        self
    }

    #[must_use]
    pub fn with_row_height(mut self, height: f64) -> Self {
        self.default_row_height = height;
        self
    }

    #[must_use]
    pub fn with_col_width(mut self, width: f64) -> Self {
        self.default_col_width = width;
        self
    }

    /// Layout for a freshly created sheet.
    pub fn layout(&self) -> SheetLayout {
        SheetLayout::new(
            self.default_rows,
            self.default_cols,
            self.default_row_height,
            self.default_col_width,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = EngineOptions::default();
        assert_eq!(options.history_limit, 100);
        assert_eq!(options.layout().rows, 100);
        assert_eq!(options.layout().cols, 26);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let options: EngineOptions = serde_json::from_str(r#"{"history_limit": 5}"#).unwrap();
        assert_eq!(options.history_limit, 5);
        assert_eq!(options.default_col_width, 64.0);
    }

    #[test]
    fn test_builder() {
        let options = EngineOptions::default()
            .with_dimensions(0, 10)
            .with_row_height(15.0);
        assert_eq!(options.default_rows, 1);
        assert_eq!(options.default_cols, 10);
        assert_eq!(options.layout().row_height(3), 15.0);
    }
}
