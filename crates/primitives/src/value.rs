//! The closed set of values a cell can hold or a formula can produce.

use std::cmp::Ordering;
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Timelike};
use serde::{Deserialize, Serialize};

/// Serial number of 1970-01-01 in the 1900 date system.
pub const UNIX_EPOCH_SERIAL: f64 = 25569.0;
const SECONDS_PER_DAY: f64 = 86_400.0;

/// Error codes. Only the code is stable; messages are informational.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorValue {
    Div0,
    Name,
    Value,
    Ref,
    Num,
    NA,
    /// The formula text could not be parsed.
    Error,
}

impl ErrorValue {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Div0 => "#DIV/0!",
            Self::Name => "#NAME?",
            Self::Value => "#VALUE!",
            Self::Ref => "#REF!",
            Self::Num => "#NUM!",
            Self::NA => "#N/A",
            Self::Error => "#ERROR!",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Div0 => "Division by zero",
            Self::Name => "Unknown function name",
            Self::Value => "Wrong type of argument",
            Self::Ref => "Invalid cell reference",
            Self::Num => "Invalid numeric value",
            Self::NA => "Value not available",
            Self::Error => "Formula could not be parsed",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        let upper = label.trim().to_ascii_uppercase();
        Some(match upper.as_str() {
            "#DIV/0!" => Self::Div0,
            "#NAME?" => Self::Name,
            "#VALUE!" => Self::Value,
            "#REF!" => Self::Ref,
            "#NUM!" => Self::Num,
            "#N/A" => Self::NA,
            "#ERROR!" => Self::Error,
            _ => return None,
        })
    }
}

impl fmt::Display for ErrorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// An error value with a human-readable message.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
pub struct CellError {
    pub kind: ErrorValue,
    pub message: String,
}

impl CellError {
    pub fn new(kind: ErrorValue, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<ErrorValue> for CellError {
    fn from(kind: ErrorValue) -> Self {
        Self::new(kind, kind.description())
    }
}

impl PartialEq for CellError {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

impl fmt::Display for CellError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind.label())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum Value {
    #[default]
    Blank,
    Bool(bool),
    Number(f64),
    Text(String),
    Date(NaiveDateTime),
    Duration(#[serde(with = "duration_millis")] TimeDelta),
    Error(CellError),
    /// Row-major 2-D block, produced by range references.
    Array(Vec<Vec<Value>>),
}

impl Value {
    pub fn error(kind: ErrorValue, message: impl Into<String>) -> Self {
        Value::Error(CellError::new(kind, message))
    }

    pub fn is_blank(&self) -> bool {
        matches!(self, Value::Blank)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }

    pub fn error_kind(&self) -> Option<ErrorValue> {
        match self {
            Value::Error(e) => Some(e.kind),
            _ => None,
        }
    }

    /// Arrays in scalar position collapse to their top-left element.
    pub fn top_left(self) -> Value {
        match self {
            Value::Array(rows) => rows
                .into_iter()
                .next()
                .and_then(|row| row.into_iter().next())
                .unwrap_or(Value::Blank),
            other => other,
        }
    }

    /// Arithmetic coercion.
    pub fn to_number(&self) -> Result<f64, CellError> {
        match self {
            Value::Blank => Ok(0.0),
            Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
            Value::Number(n) => Ok(*n),
            Value::Text(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return Ok(0.0);
                }
                trimmed.parse::<f64>().map_err(|_| {
                    CellError::new(ErrorValue::Value, format!("'{s}' is not a number"))
                })
            }
            Value::Date(dt) => Ok(datetime_to_serial(*dt)),
            Value::Duration(d) => Ok(duration_to_days(*d)),
            Value::Error(e) => Err(e.clone()),
            Value::Array(_) => self.clone().top_left().to_number(),
        }
    }

    pub fn to_bool(&self) -> Result<bool, CellError> {
        match self {
            Value::Blank => Ok(false),
            Value::Bool(b) => Ok(*b),
            Value::Number(n) => Ok(*n != 0.0),
            Value::Text(s) => match s.trim().to_ascii_uppercase().as_str() {
                "TRUE" => Ok(true),
                "FALSE" => Ok(false),
                _ => Err(CellError::new(
                    ErrorValue::Value,
                    format!("'{s}' is not a logical value"),
                )),
            },
            Value::Date(_) | Value::Duration(_) => Ok(self.to_number()? != 0.0),
            Value::Error(e) => Err(e.clone()),
            Value::Array(_) => self.clone().top_left().to_bool(),
        }
    }

    /// Text form used by concatenation and display.
    pub fn to_text(&self) -> String {
        match self {
            Value::Blank => String::new(),
            Value::Bool(true) => "TRUE".to_string(),
            Value::Bool(false) => "FALSE".to_string(),
            Value::Number(n) => format_number(*n),
            Value::Text(s) => s.clone(),
            Value::Date(dt) => format_datetime(*dt),
            Value::Duration(d) => format_duration(*d),
            Value::Error(e) => e.kind.label().to_string(),
            Value::Array(_) => self.clone().top_left().to_text(),
        }
    }

    /// Bucket used to order values of different types:
    /// numbers < text < booleans < errors < blanks.
    pub fn type_rank(&self) -> u8 {
        match self {
            Value::Number(_) | Value::Date(_) | Value::Duration(_) => 0,
            Value::Text(_) => 1,
            Value::Bool(_) => 2,
            Value::Error(_) => 3,
            Value::Blank => 4,
            Value::Array(_) => 5,
        }
    }

    /// Total order used by sorting: type rank first, then value. Text compares
    /// case-insensitively.
    pub fn sort_cmp(&self, other: &Value) -> Ordering {
        let rank = self.type_rank().cmp(&other.type_rank());
        if rank != Ordering::Equal {
            return rank;
        }
        match (self, other) {
            (Value::Text(a), Value::Text(b)) => a.to_lowercase().cmp(&b.to_lowercase()),
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Error(a), Value::Error(b)) => a.kind.label().cmp(b.kind.label()),
            (a, b) if a.type_rank() == 0 => {
                let x = a.to_number().unwrap_or(0.0);
                let y = b.to_number().unwrap_or(0.0);
                x.total_cmp(&y)
            }
            _ => Ordering::Equal,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(dt: NaiveDateTime) -> Self {
        Value::Date(dt)
    }
}

impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Value::Date(d.and_time(NaiveTime::MIN))
    }
}

impl From<TimeDelta> for Value {
    fn from(d: TimeDelta) -> Self {
        Value::Duration(d)
    }
}

impl From<CellError> for Value {
    fn from(e: CellError) -> Self {
        Value::Error(e)
    }
}

/// Integers print without a fraction; others are rounded to 15 significant
/// digits with trailing zeros removed.
pub fn format_number(n: f64) -> String {
    if !n.is_finite() {
        return ErrorValue::Num.label().to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }
    if n.fract() == 0.0 && n.abs() < 1e15 {
        return format!("{}", n as i64);
    }
    let magnitude = n.abs().log10().floor() as i32;
    if !(-5..15).contains(&magnitude) {
        return format!("{n:e}");
    }
    let decimals = (14 - magnitude).clamp(0, 15) as usize;
    let text = format!("{n:.decimals$}");
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        text
    }
}

pub fn format_datetime(dt: NaiveDateTime) -> String {
    if dt.time() == NaiveTime::MIN {
        dt.format("%Y-%m-%d").to_string()
    } else if dt.time().nanosecond() == 0 {
        dt.format("%Y-%m-%d %H:%M:%S").to_string()
    } else {
        dt.format("%Y-%m-%d %H:%M:%S%.3f").to_string()
    }
}

/// `[-]H:MM:SS`, hours are not wrapped at 24.
pub fn format_duration(d: TimeDelta) -> String {
    let total = d.num_seconds();
    let sign = if total < 0 { "-" } else { "" };
    let total = total.unsigned_abs();
    format!(
        "{sign}{}:{:02}:{:02}",
        total / 3600,
        (total % 3600) / 60,
        total % 60
    )
}

/// Days since 1899-12-30, fractional part is the time of day.
pub fn datetime_to_serial(dt: NaiveDateTime) -> f64 {
    let millis = dt.and_utc().timestamp_millis() as f64;
    millis / 1000.0 / SECONDS_PER_DAY + UNIX_EPOCH_SERIAL
}

pub fn serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() {
        return None;
    }
    let millis = ((serial - UNIX_EPOCH_SERIAL) * SECONDS_PER_DAY * 1000.0).round();
    chrono::DateTime::from_timestamp_millis(millis as i64).map(|dt| dt.naive_utc())
}

pub fn duration_to_days(d: TimeDelta) -> f64 {
    d.num_milliseconds() as f64 / 1000.0 / SECONDS_PER_DAY
}

pub fn days_to_duration(days: f64) -> Option<TimeDelta> {
    if !days.is_finite() {
        return None;
    }
    TimeDelta::try_milliseconds((days * SECONDS_PER_DAY * 1000.0).round() as i64)
}

mod duration_millis {
    use chrono::TimeDelta;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &TimeDelta, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(d.num_milliseconds())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<TimeDelta, D::Error> {
        let millis = i64::deserialize(deserializer)?;
        TimeDelta::try_milliseconds(millis)
            .ok_or_else(|| serde::de::Error::custom("duration out of range"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_coercion() {
        assert_eq!(Value::Bool(true).to_number().unwrap(), 1.0);
        assert_eq!(Value::Blank.to_number().unwrap(), 0.0);
        assert_eq!(Value::from(" 4.5 ").to_number().unwrap(), 4.5);
        let err = Value::from("abc").to_number().unwrap_err();
        assert_eq!(err.kind, ErrorValue::Value);
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(-12.0), "-12");
        assert_eq!(format_number(0.1 + 0.2), "0.3");
        assert_eq!(format_number(2.5), "2.5");
    }

    #[test]
    fn test_error_equality_ignores_message() {
        let a = Value::error(ErrorValue::Ref, "cycle");
        let b = Value::error(ErrorValue::Ref, "deleted");
        assert_eq!(a, b);
        assert_ne!(a, Value::error(ErrorValue::NA, "cycle"));
    }

    #[test]
    fn test_serial_round_trip_for_dates() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        let serial = datetime_to_serial(date);
        assert_eq!(serial, 45352.5);
        assert_eq!(serial_to_datetime(serial), Some(date));
    }

    #[test]
    fn test_duration_display() {
        let d = TimeDelta::try_seconds(3 * 3600 + 5 * 60 + 9).unwrap();
        assert_eq!(Value::Duration(d).to_text(), "3:05:09");
    }

    #[test]
    fn test_sort_order_across_types() {
        let mut values = vec![
            Value::from("b"),
            Value::Blank,
            Value::Bool(false),
            Value::Number(2.0),
            Value::from("A"),
            Value::Number(-1.0),
        ];
        values.sort_by(|a, b| a.sort_cmp(b));
        assert_eq!(
            values,
            vec![
                Value::Number(-1.0),
                Value::Number(2.0),
                Value::from("A"),
                Value::from("b"),
                Value::Bool(false),
                Value::Blank,
            ]
        );
    }

    #[test]
    fn test_value_serde_json() {
        let v = Value::Duration(TimeDelta::try_seconds(90).unwrap());
        let json = serde_json::to_string(&v).unwrap();
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(v, back);
    }
}
