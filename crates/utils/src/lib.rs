//! # gridcalc utils
//!
//! Helpers for turning raw user input into typed values: numbers, booleans,
//! dates, durations and error literals.

use gridcalc_primitives::{ErrorValue, Value};

pub mod datetime;

pub use datetime::{date_from_parts, parse_datetime, parse_duration};

/// Infer a value from literal cell input.
///
/// Formula detection (`=`) and the `'` text escape are handled by the caller;
/// this only classifies plain literals.
pub fn parse_value(s: &str) -> Value {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Value::Blank;
    }

    if trimmed.eq_ignore_ascii_case("true") {
        return Value::Bool(true);
    }
    if trimmed.eq_ignore_ascii_case("false") {
        return Value::Bool(false);
    }

    if let Some(n) = parse_number(trimmed) {
        return Value::Number(n);
    }

    if let Some(kind) = ErrorValue::from_label(trimmed) {
        return Value::Error(kind.into());
    }

    if let Some(dt) = parse_datetime(trimmed) {
        return Value::Date(dt);
    }
    if let Some(d) = parse_duration(trimmed) {
        return Value::Duration(d);
    }

    Value::Text(s.to_string())
}

/// Plain decimal numbers with an optional exponent or trailing `%`.
///
/// `f64::from_str` also accepts `inf` and `NaN`; those stay text.
pub fn parse_number(s: &str) -> Option<f64> {
    let (body, scale) = match s.strip_suffix('%') {
        Some(rest) => (rest.trim_end(), 100.0),
        None => (s, 1.0),
    };
    if !body.chars().any(|c| c.is_ascii_digit())
        || !body
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E'))
    {
        return None;
    }
    body.parse::<f64>().ok().map(|n| n / scale)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value(""), Value::Blank);
        assert_eq!(parse_value("true"), Value::Bool(true));
        assert_eq!(parse_value("FALSE"), Value::Bool(false));
        assert_eq!(parse_value("123"), Value::Number(123.0));
        assert_eq!(parse_value("-4.5e1"), Value::Number(-45.0));
        assert_eq!(parse_value("15%"), Value::Number(0.15));
        assert_eq!(parse_value("hello"), Value::from("hello"));
        assert_eq!(parse_value("inf"), Value::from("inf"));
        assert_eq!(parse_value("0:30"), Value::Duration(TimeDelta::try_minutes(30).unwrap()));
        assert!(matches!(parse_value("2024-01-31"), Value::Date(_)));
        assert!(matches!(parse_value("#N/A"), Value::Error(_)));
    }
}
