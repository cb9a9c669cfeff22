use std::fmt;

use gridcalc_primitives::Value;
use gridcalc_utils::parse_value;
use serde::{Deserialize, Serialize};

/// What a cell stores: a literal value or formula source text.
///
/// Formula results are never stored; they are derived from the snapshot on
/// every read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CellContent {
    Value(Value),
    /// Source text including the leading `=`
    Formula(String),
}

impl CellContent {
    pub fn formula<S: Into<String>>(source: S) -> Self {
        CellContent::Formula(source.into())
    }

    /// Interpret user input the way a cell editor does.
    ///
    /// `=...` is a formula, a leading `'` forces text, anything else goes
    /// through literal type inference. Empty input yields a blank.
    pub fn parse(input: &str) -> CellContent {
        if let Some(text) = input.strip_prefix('\'') {
            return CellContent::Value(Value::Text(text.to_string()));
        }
        if input.starts_with('=') && input.len() > 1 {
            return CellContent::Formula(input.to_string());
        }
        CellContent::Value(parse_value(input))
    }

    pub fn is_blank(&self) -> bool {
        matches!(self, CellContent::Value(Value::Blank))
    }

    pub fn is_formula(&self) -> bool {
        matches!(self, CellContent::Formula(_))
    }

    /// Text that [`CellContent::parse`] turns back into this content.
    pub fn to_raw_string(&self) -> String {
        match self {
            CellContent::Formula(source) => source.clone(),
            CellContent::Value(Value::Text(text)) => {
                let ambiguous = text.starts_with('\'')
                    || (text.starts_with('=') && text.len() > 1)
                    || parse_value(text) != Value::Text(text.clone());
                if ambiguous {
                    format!("'{text}")
                } else {
                    text.clone()
                }
            }
            CellContent::Value(value) => value.to_text(),
        }
    }
}

impl Default for CellContent {
    fn default() -> Self {
        CellContent::Value(Value::Blank)
    }
}

impl fmt::Display for CellContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_raw_string())
    }
}

impl From<Value> for CellContent {
    fn from(value: Value) -> Self {
        CellContent::Value(value)
    }
}

impl From<f64> for CellContent {
    fn from(n: f64) -> Self {
        CellContent::Value(Value::Number(n))
    }
}

impl From<i32> for CellContent {
    fn from(n: i32) -> Self {
        CellContent::Value(Value::Number(f64::from(n)))
    }
}

impl From<bool> for CellContent {
    fn from(b: bool) -> Self {
        CellContent::Value(Value::Bool(b))
    }
}

impl From<&str> for CellContent {
    fn from(s: &str) -> Self {
        CellContent::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_parse_infers_types() {
        assert_eq!(CellContent::parse("42"), CellContent::from(42));
        assert_eq!(CellContent::parse("TRUE"), CellContent::from(true));
        assert_eq!(CellContent::parse("=A1+1"), CellContent::formula("=A1+1"));
        assert_eq!(CellContent::parse(""), CellContent::default());
        assert_eq!(
            CellContent::parse("2024-03-01"),
            CellContent::Value(Value::from(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()))
        );
    }

    #[test]
    fn test_apostrophe_forces_text() {
        assert_eq!(
            CellContent::parse("'0123"),
            CellContent::Value(Value::Text("0123".to_string()))
        );
        assert_eq!(
            CellContent::parse("'=A1"),
            CellContent::Value(Value::Text("=A1".to_string()))
        );
    }

    #[test]
    fn test_raw_string_reparses() {
        for input in ["'0123", "hello", "=SUM(A1:A3)", "12.5", "FALSE", "'=x", "''quoted"] {
            let content = CellContent::parse(input);
            assert_eq!(CellContent::parse(&content.to_raw_string()), content, "{input}");
        }
    }

    #[test]
    fn test_lone_equals_is_text() {
        assert_eq!(
            CellContent::parse("="),
            CellContent::Value(Value::Text("=".to_string()))
        );
    }
}
