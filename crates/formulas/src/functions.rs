//! Standard spreadsheet functions implementation

use std::cmp::Ordering;

use chrono::{Datelike, Local, NaiveDateTime, TimeDelta, Timelike};
use gridcalc_primitives::value::serial_to_datetime;
use gridcalc_primitives::{CellError, ErrorValue, Value};
use gridcalc_utils::{date_from_parts, parse_number};
use rand::Rng;
use regex::{Regex, RegexBuilder};

use crate::{
    compare_values, eval_binary, number_result, BinaryOperator, FunctionDefinition,
    FunctionRegistry, ParamType, ReturnType,
};

type FnResult = Result<Value, CellError>;

/// Longest text a cell can hold
const MAX_TEXT_LENGTH: usize = 32_767;
/// Largest n whose factorial is a finite f64
const MAX_FACTORIAL: f64 = 170.0;

fn eval_with(f: impl FnOnce() -> FnResult) -> Value {
    f().unwrap_or_else(Value::Error)
}

fn value_error(message: impl Into<String>) -> CellError {
    CellError::new(ErrorValue::Value, message)
}

fn num_error(message: impl Into<String>) -> CellError {
    CellError::new(ErrorValue::Num, message)
}

fn not_available(message: impl Into<String>) -> CellError {
    CellError::new(ErrorValue::NA, message)
}

fn ref_error(message: impl Into<String>) -> CellError {
    CellError::new(ErrorValue::Ref, message)
}

fn arg(values: &[Value], idx: usize) -> Value {
    values.get(idx).cloned().unwrap_or(Value::Blank).top_left()
}

fn number_arg(values: &[Value], idx: usize) -> Result<f64, CellError> {
    arg(values, idx).to_number()
}

fn optional_number(values: &[Value], idx: usize, default: f64) -> Result<f64, CellError> {
    match values.get(idx) {
        None => Ok(default),
        Some(_) => number_arg(values, idx),
    }
}

fn text_arg(values: &[Value], idx: usize) -> Result<String, CellError> {
    match arg(values, idx) {
        Value::Error(e) => Err(e),
        other => Ok(other.to_text()),
    }
}

fn is_numeric(value: &Value) -> bool {
    matches!(value, Value::Number(_) | Value::Date(_) | Value::Duration(_))
}

/// Numbers from the arguments. Scalars are coerced; inside ranges only
/// numeric cells count and text, booleans and blanks are skipped.
fn collect_numbers(values: &[Value]) -> Result<Vec<f64>, CellError> {
    let mut out = Vec::new();
    for value in values {
        match value {
            Value::Array(rows) => {
                for cell in rows.iter().flatten() {
                    match cell {
                        Value::Error(e) => return Err(e.clone()),
                        v if is_numeric(v) => out.push(v.to_number()?),
                        _ => {}
                    }
                }
            }
            Value::Blank => {}
            Value::Error(e) => return Err(e.clone()),
            other => out.push(other.to_number()?),
        }
    }
    Ok(out)
}

fn flatten(values: &[Value]) -> impl Iterator<Item = &Value> {
    values.iter().flat_map(|value| match value {
        Value::Array(rows) => rows.iter().flatten().collect::<Vec<_>>(),
        other => vec![other],
    })
}

fn rows_of(value: &Value) -> Result<&Vec<Vec<Value>>, CellError> {
    match value {
        Value::Array(rows) => Ok(rows),
        Value::Error(e) => Err(e.clone()),
        _ => Err(value_error("Expected a range")),
    }
}

/// SUM implementation.
pub fn sum(values: &[Value]) -> Value {
    eval_with(|| Ok(number_result(collect_numbers(values)?.iter().sum())))
}

/// PRODUCT implementation.
pub fn product(values: &[Value]) -> Value {
    eval_with(|| {
        let numbers = collect_numbers(values)?;
        if numbers.is_empty() {
            return Ok(Value::Number(0.0));
        }
        Ok(number_result(numbers.iter().product()))
    })
}

/// AVERAGE implementation.
pub fn average(values: &[Value]) -> Value {
    eval_with(|| {
        let numbers = collect_numbers(values)?;
        if numbers.is_empty() {
            return Err(CellError::new(ErrorValue::Div0, "AVERAGE of no numbers"));
        }
        Ok(number_result(
            numbers.iter().sum::<f64>() / numbers.len() as f64,
        ))
    })
}

/// MEDIAN implementation.
pub fn median(values: &[Value]) -> Value {
    eval_with(|| {
        let mut numbers = collect_numbers(values)?;
        if numbers.is_empty() {
            return Err(num_error("MEDIAN of no numbers"));
        }
        numbers.sort_by(f64::total_cmp);
        let mid = numbers.len() / 2;
        let median = if numbers.len() % 2 == 0 {
            (numbers[mid - 1] + numbers[mid]) / 2.0
        } else {
            numbers[mid]
        };
        Ok(Value::Number(median))
    })
}

/// MAX implementation. No numbers gives 0.
pub fn max(values: &[Value]) -> Value {
    eval_with(|| {
        let numbers = collect_numbers(values)?;
        Ok(Value::Number(
            numbers.into_iter().reduce(f64::max).unwrap_or(0.0),
        ))
    })
}

/// MIN implementation. No numbers gives 0.
pub fn min(values: &[Value]) -> Value {
    eval_with(|| {
        let numbers = collect_numbers(values)?;
        Ok(Value::Number(
            numbers.into_iter().reduce(f64::min).unwrap_or(0.0),
        ))
    })
}

/// COUNT: numeric entries only. Errors and text inside ranges are skipped.
pub fn count(values: &[Value]) -> Value {
    let mut n = 0usize;
    for value in values {
        match value {
            Value::Array(rows) => n += rows.iter().flatten().filter(|v| is_numeric(v)).count(),
            Value::Blank | Value::Error(_) => {}
            other => {
                if other.to_number().is_ok() {
                    n += 1;
                }
            }
        }
    }
    Value::Number(n as f64)
}

/// COUNTA: every non-empty entry, errors included.
pub fn counta(values: &[Value]) -> Value {
    let n = flatten(values).filter(|v| !v.is_blank()).count();
    Value::Number(n as f64)
}

/// COUNTBLANK: blank cells and empty strings.
pub fn countblank(values: &[Value]) -> Value {
    let n = flatten(values)
        .filter(|v| match v {
            Value::Blank => true,
            Value::Text(s) => s.is_empty(),
            _ => false,
        })
        .count();
    Value::Number(n as f64)
}

/// A COUNTIF-style condition such as `">=75"`, `"<>x"` or `"app*"`.
#[derive(Debug, Clone)]
pub struct Criteria {
    op: BinaryOperator,
    operand: Value,
    /// Compiled form of a non-empty text operand under `=` or `<>`
    wildcard: Option<Wildcard>,
}

impl Criteria {
    pub fn parse(criteria: &Value) -> Self {
        let Value::Text(text) = criteria else {
            return Self {
                op: BinaryOperator::Equal,
                operand: criteria.clone(),
                wildcard: None,
            };
        };
        let (op, rest) = [
            (">=", BinaryOperator::GreaterThanOrEqual),
            ("<=", BinaryOperator::LessThanOrEqual),
            ("<>", BinaryOperator::NotEqual),
            (">", BinaryOperator::GreaterThan),
            ("<", BinaryOperator::LessThan),
            ("=", BinaryOperator::Equal),
        ]
        .into_iter()
        .find_map(|(prefix, op)| text.strip_prefix(prefix).map(|rest| (op, rest)))
        .unwrap_or((BinaryOperator::Equal, text.as_str()));

        let operand = if let Some(n) = parse_number(rest.trim()) {
            Value::Number(n)
        } else if rest.eq_ignore_ascii_case("TRUE") {
            Value::Bool(true)
        } else if rest.eq_ignore_ascii_case("FALSE") {
            Value::Bool(false)
        } else {
            Value::Text(rest.to_string())
        };
        let wildcard = match (&operand, op) {
            (Value::Text(pattern), BinaryOperator::Equal | BinaryOperator::NotEqual)
                if !pattern.is_empty() =>
            {
                Some(Wildcard::new(pattern, true))
            }
            _ => None,
        };
        Self {
            op,
            operand,
            wildcard,
        }
    }

    pub fn matches(&self, value: &Value) -> bool {
        let is_empty = matches!(value, Value::Blank) || matches!(value, Value::Text(s) if s.is_empty());
        match (&self.operand, self.op, &self.wildcard) {
            (Value::Text(_), BinaryOperator::Equal, None) => is_empty,
            (Value::Text(_), BinaryOperator::NotEqual, None) => !is_empty,
            (_, BinaryOperator::Equal, Some(wildcard)) => {
                matches!(value, Value::Text(s) if wildcard.is_match(s))
            }
            (_, BinaryOperator::NotEqual, Some(wildcard)) => {
                !matches!(value, Value::Text(s) if wildcard.is_match(s))
            }
            (operand, op, _) => {
                // Only compare like with like; a text cell never satisfies `>5`.
                if value.is_blank() || value.type_rank() != operand.type_rank() {
                    return op == BinaryOperator::NotEqual;
                }
                eval_binary(op, value, operand) == Value::Bool(true)
            }
        }
    }
}

/// A `*`/`?`/`~` pattern compiled to an anchored regular expression.
///
/// `*` matches any run, `?` one character, `~` escapes the next character.
#[derive(Debug, Clone)]
pub struct Wildcard {
    regex: Option<Regex>,
    /// Fallback when the pattern is too large to compile
    literal: String,
    case_insensitive: bool,
}

impl Wildcard {
    pub fn new(pattern: &str, case_insensitive: bool) -> Self {
        let mut source = String::with_capacity(pattern.len() + 2);
        source.push('^');
        let mut buf = [0u8; 4];
        let mut chars = pattern.chars();
        while let Some(ch) = chars.next() {
            match ch {
                '~' => {
                    let escaped = chars.next().unwrap_or('~');
                    source.push_str(&regex::escape(escaped.encode_utf8(&mut buf)));
                }
                '*' => source.push_str(".*"),
                '?' => source.push('.'),
                _ => source.push_str(&regex::escape(ch.encode_utf8(&mut buf))),
            }
        }
        source.push('$');
        let regex = RegexBuilder::new(&source)
            .case_insensitive(case_insensitive)
            .dot_matches_new_line(true)
            .build()
            .map_err(|err| tracing::debug!(pattern, %err, "wildcard pattern not compiled"))
            .ok();
        Wildcard {
            regex,
            literal: pattern.to_string(),
            case_insensitive,
        }
    }

    pub fn is_match(&self, text: &str) -> bool {
        match &self.regex {
            Some(regex) => regex.is_match(text),
            None if self.case_insensitive => self.literal.to_lowercase() == text.to_lowercase(),
            None => self.literal == text,
        }
    }
}

pub fn wildcard_match(pattern: &str, text: &str, case_insensitive: bool) -> bool {
    Wildcard::new(pattern, case_insensitive).is_match(text)
}

/// COUNTIF(range, criteria)
pub fn countif(values: &[Value]) -> Value {
    eval_with(|| {
        let rows = rows_of(&values[0])?;
        let criteria = Criteria::parse(&arg(values, 1));
        let n = rows.iter().flatten().filter(|v| criteria.matches(v)).count();
        Ok(Value::Number(n as f64))
    })
}

fn conditional_numbers(values: &[Value]) -> Result<Vec<f64>, CellError> {
    let rows = rows_of(&values[0])?;
    let criteria = Criteria::parse(&arg(values, 1));
    let target = match values.get(2) {
        Some(v) => rows_of(v)?,
        None => rows,
    };
    let mut out = Vec::new();
    for (r, row) in rows.iter().enumerate() {
        for (c, cell) in row.iter().enumerate() {
            if !criteria.matches(cell) {
                continue;
            }
            match target.get(r).and_then(|row| row.get(c)) {
                Some(Value::Error(e)) => return Err(e.clone()),
                Some(v) if is_numeric(v) => out.push(v.to_number()?),
                _ => {}
            }
        }
    }
    Ok(out)
}

/// SUMIF(range, criteria, [sum_range])
pub fn sumif(values: &[Value]) -> Value {
    eval_with(|| Ok(number_result(conditional_numbers(values)?.iter().sum())))
}

/// AVERAGEIF(range, criteria, [average_range])
pub fn averageif(values: &[Value]) -> Value {
    eval_with(|| {
        let numbers = conditional_numbers(values)?;
        if numbers.is_empty() {
            return Err(CellError::new(ErrorValue::Div0, "No matching cells"));
        }
        Ok(Value::Number(
            numbers.iter().sum::<f64>() / numbers.len() as f64,
        ))
    })
}

/// IF implementation for direct calls; the engine evaluates IF lazily.
pub fn if_fn(values: &[Value]) -> Value {
    eval_with(|| {
        if arg(values, 0).to_bool()? {
            Ok(arg(values, 1))
        } else if values.len() > 2 {
            Ok(arg(values, 2))
        } else {
            Ok(Value::Bool(false))
        }
    })
}

/// IFERROR implementation for direct calls.
pub fn iferror(values: &[Value]) -> Value {
    let value = arg(values, 0);
    if value.is_error() {
        arg(values, 1)
    } else {
        value
    }
}

/// IFNA implementation for direct calls.
pub fn ifna(values: &[Value]) -> Value {
    let value = arg(values, 0);
    if value.error_kind() == Some(ErrorValue::NA) {
        arg(values, 1)
    } else {
        value
    }
}

fn logical_values(values: &[Value]) -> Result<Vec<bool>, CellError> {
    let mut out = Vec::new();
    for value in values {
        match value {
            Value::Array(rows) => {
                for cell in rows.iter().flatten() {
                    match cell {
                        Value::Error(e) => return Err(e.clone()),
                        Value::Bool(b) => out.push(*b),
                        Value::Number(n) => out.push(*n != 0.0),
                        _ => {}
                    }
                }
            }
            Value::Blank => {}
            other => out.push(other.to_bool()?),
        }
    }
    if out.is_empty() {
        return Err(value_error("No logical values"));
    }
    Ok(out)
}

/// AND implementation.
pub fn and_fn(values: &[Value]) -> Value {
    eval_with(|| Ok(Value::Bool(logical_values(values)?.into_iter().all(|b| b))))
}

/// OR implementation.
pub fn or_fn(values: &[Value]) -> Value {
    eval_with(|| Ok(Value::Bool(logical_values(values)?.into_iter().any(|b| b))))
}

/// NOT implementation.
pub fn not_fn(values: &[Value]) -> Value {
    eval_with(|| Ok(Value::Bool(!arg(values, 0).to_bool()?)))
}

pub fn isblank(values: &[Value]) -> Value {
    Value::Bool(arg(values, 0).is_blank())
}

pub fn iserror(values: &[Value]) -> Value {
    Value::Bool(arg(values, 0).is_error())
}

pub fn isna(values: &[Value]) -> Value {
    Value::Bool(arg(values, 0).error_kind() == Some(ErrorValue::NA))
}

pub fn isnumber(values: &[Value]) -> Value {
    Value::Bool(is_numeric(&arg(values, 0)))
}

pub fn istext(values: &[Value]) -> Value {
    Value::Bool(matches!(arg(values, 0), Value::Text(_)))
}

pub fn na(_: &[Value]) -> Value {
    Value::error(ErrorValue::NA, "Value not available")
}

/// CONCAT / CONCATENATE: every argument and range cell joined as text.
pub fn concat(values: &[Value]) -> Value {
    let mut result = String::new();
    for value in flatten(values) {
        if let Value::Error(e) = value {
            return Value::Error(e.clone());
        }
        result.push_str(&value.to_text());
    }
    Value::Text(result)
}

pub fn len(values: &[Value]) -> Value {
    eval_with(|| Ok(Value::Number(text_arg(values, 0)?.chars().count() as f64)))
}

fn count_arg(values: &[Value], idx: usize) -> Result<usize, CellError> {
    let n = optional_number(values, idx, 1.0)?;
    if n < 0.0 {
        return Err(value_error("Count must not be negative"));
    }
    Ok(n.floor() as usize)
}

/// LEFT(text, [count])
pub fn left(values: &[Value]) -> Value {
    eval_with(|| {
        let text = text_arg(values, 0)?;
        let count = count_arg(values, 1)?;
        Ok(Value::Text(text.chars().take(count).collect()))
    })
}

/// RIGHT(text, [count])
pub fn right(values: &[Value]) -> Value {
    eval_with(|| {
        let text = text_arg(values, 0)?;
        let count = count_arg(values, 1)?;
        let skip = text.chars().count().saturating_sub(count);
        Ok(Value::Text(text.chars().skip(skip).collect()))
    })
}

/// MID(text, start, count)
pub fn mid(values: &[Value]) -> Value {
    eval_with(|| {
        let text = text_arg(values, 0)?;
        let start = number_arg(values, 1)?;
        let count = number_arg(values, 2)?;
        if start < 1.0 || count < 0.0 {
            return Err(value_error("MID start must be >= 1 and count >= 0"));
        }
        Ok(Value::Text(
            text.chars()
                .skip(start as usize - 1)
                .take(count as usize)
                .collect(),
        ))
    })
}

pub fn upper(values: &[Value]) -> Value {
    eval_with(|| Ok(Value::Text(text_arg(values, 0)?.to_uppercase())))
}

pub fn lower(values: &[Value]) -> Value {
    eval_with(|| Ok(Value::Text(text_arg(values, 0)?.to_lowercase())))
}

/// TRIM: strip ends and collapse inner runs of spaces.
pub fn trim(values: &[Value]) -> Value {
    eval_with(|| {
        let text = text_arg(values, 0)?;
        Ok(Value::Text(
            text.split(' ')
                .filter(|part| !part.is_empty())
                .collect::<Vec<_>>()
                .join(" "),
        ))
    })
}

pub fn proper(values: &[Value]) -> Value {
    eval_with(|| {
        let text = text_arg(values, 0)?;
        let mut out = String::with_capacity(text.len());
        let mut start_of_word = true;
        for ch in text.chars() {
            if ch.is_alphabetic() {
                if start_of_word {
                    out.extend(ch.to_uppercase());
                } else {
                    out.extend(ch.to_lowercase());
                }
                start_of_word = false;
            } else {
                out.push(ch);
                start_of_word = true;
            }
        }
        Ok(Value::Text(out))
    })
}

/// FIND(needle, haystack, [start]): case-sensitive, 1-based.
pub fn find(values: &[Value]) -> Value {
    eval_with(|| {
        let needle = text_arg(values, 0)?;
        let haystack = text_arg(values, 1)?;
        let start = optional_number(values, 2, 1.0)?;
        let len = haystack.chars().count();
        if start < 1.0 || start as usize > len + 1 {
            return Err(value_error("FIND start out of range"));
        }
        let skip = start as usize - 1;
        let tail: String = haystack.chars().skip(skip).collect();
        match tail.find(&needle) {
            Some(byte_idx) => {
                let pos = tail[..byte_idx].chars().count() + skip + 1;
                Ok(Value::Number(pos as f64))
            }
            None => Err(value_error(format!("'{}' not found", needle))),
        }
    })
}

/// SUBSTITUTE(text, old, new, [instance])
pub fn substitute(values: &[Value]) -> Value {
    eval_with(|| {
        let text = text_arg(values, 0)?;
        let old = text_arg(values, 1)?;
        let new = text_arg(values, 2)?;
        if old.is_empty() {
            return Ok(Value::Text(text));
        }
        let Some(instance) = values.get(3) else {
            return Ok(Value::Text(text.replace(&old, &new)));
        };
        let instance = instance.to_number()?;
        if instance < 1.0 {
            return Err(value_error("Instance must be >= 1"));
        }
        match text.match_indices(&old).nth(instance as usize - 1) {
            Some((idx, _)) => {
                let mut out = String::with_capacity(text.len());
                out.push_str(&text[..idx]);
                out.push_str(&new);
                out.push_str(&text[idx + old.len()..]);
                Ok(Value::Text(out))
            }
            None => Ok(Value::Text(text)),
        }
    })
}

/// REPT(text, times)
pub fn rept(values: &[Value]) -> Value {
    eval_with(|| {
        let text = text_arg(values, 0)?;
        let times = number_arg(values, 1)?;
        if !times.is_finite() || times < 0.0 {
            return Err(value_error("REPT count must be a non-negative number"));
        }
        let times = times.floor();
        if text.is_empty() {
            return Ok(Value::Text(text));
        }
        if text.chars().count() as f64 * times > MAX_TEXT_LENGTH as f64 {
            return Err(value_error(format!(
                "REPT result would exceed {MAX_TEXT_LENGTH} characters"
            )));
        }
        Ok(Value::Text(text.repeat(times as usize)))
    })
}

/// VALUE(text): numeric text to a number.
pub fn value(values: &[Value]) -> Value {
    eval_with(|| match arg(values, 0) {
        Value::Text(s) => parse_number(s.trim())
            .map(Value::Number)
            .ok_or_else(|| value_error(format!("'{}' is not a number", s))),
        other => Ok(Value::Number(other.to_number()?)),
    })
}

fn round_to(n: f64, digits: f64, mode: fn(f64) -> f64) -> f64 {
    let digits = digits.trunc() as i32;
    if digits >= 0 {
        let factor = 10f64.powi(digits);
        mode(n * factor) / factor
    } else {
        let factor = 10f64.powi(-digits);
        mode(n / factor) * factor
    }
}

pub fn abs(values: &[Value]) -> Value {
    eval_with(|| Ok(Value::Number(number_arg(values, 0)?.abs())))
}

/// ROUND(number, [digits]); halves round away from zero.
pub fn round(values: &[Value]) -> Value {
    eval_with(|| {
        let n = number_arg(values, 0)?;
        let digits = optional_number(values, 1, 0.0)?;
        Ok(number_result(round_to(n, digits, f64::round)))
    })
}

/// ROUNDUP(number, [digits]); away from zero.
pub fn roundup(values: &[Value]) -> Value {
    eval_with(|| {
        let n = number_arg(values, 0)?;
        let digits = optional_number(values, 1, 0.0)?;
        Ok(number_result(round_to(n, digits, |x| {
            if x >= 0.0 {
                x.ceil()
            } else {
                x.floor()
            }
        })))
    })
}

/// ROUNDDOWN(number, [digits]); toward zero.
pub fn rounddown(values: &[Value]) -> Value {
    eval_with(|| {
        let n = number_arg(values, 0)?;
        let digits = optional_number(values, 1, 0.0)?;
        Ok(number_result(round_to(n, digits, f64::trunc)))
    })
}

pub fn int(values: &[Value]) -> Value {
    eval_with(|| Ok(Value::Number(number_arg(values, 0)?.floor())))
}

pub fn trunc(values: &[Value]) -> Value {
    rounddown(values)
}

/// MOD(n, d); the result takes the sign of the divisor.
pub fn mod_fn(values: &[Value]) -> Value {
    eval_with(|| {
        let n = number_arg(values, 0)?;
        let d = number_arg(values, 1)?;
        if d == 0.0 {
            return Err(CellError::new(ErrorValue::Div0, "MOD by zero"));
        }
        Ok(number_result(n - d * (n / d).floor()))
    })
}

pub fn power(values: &[Value]) -> Value {
    eval_binary(BinaryOperator::Power, &arg(values, 0), &arg(values, 1))
}

pub fn sqrt(values: &[Value]) -> Value {
    eval_with(|| {
        let n = number_arg(values, 0)?;
        if n < 0.0 {
            return Err(num_error("SQRT of a negative number"));
        }
        Ok(Value::Number(n.sqrt()))
    })
}

pub fn sign(values: &[Value]) -> Value {
    eval_with(|| {
        let n = number_arg(values, 0)?;
        Ok(Value::Number(match n.partial_cmp(&0.0) {
            Some(Ordering::Greater) => 1.0,
            Some(Ordering::Less) => -1.0,
            _ => 0.0,
        }))
    })
}

pub fn exp(values: &[Value]) -> Value {
    eval_with(|| Ok(number_result(number_arg(values, 0)?.exp())))
}

pub fn ln(values: &[Value]) -> Value {
    eval_with(|| {
        let n = number_arg(values, 0)?;
        if n <= 0.0 {
            return Err(num_error("LN of a non-positive number"));
        }
        Ok(Value::Number(n.ln()))
    })
}

/// LOG(number, [base=10])
pub fn log(values: &[Value]) -> Value {
    eval_with(|| {
        let n = number_arg(values, 0)?;
        let base = optional_number(values, 1, 10.0)?;
        if n <= 0.0 || base <= 0.0 {
            return Err(num_error("LOG of a non-positive number"));
        }
        if base == 1.0 {
            return Err(CellError::new(ErrorValue::Div0, "LOG base 1"));
        }
        Ok(number_result(n.log(base)))
    })
}

pub fn log10(values: &[Value]) -> Value {
    eval_with(|| {
        let n = number_arg(values, 0)?;
        if n <= 0.0 {
            return Err(num_error("LOG10 of a non-positive number"));
        }
        Ok(Value::Number(n.log10()))
    })
}

pub fn pi(_: &[Value]) -> Value {
    Value::Number(std::f64::consts::PI)
}

pub fn fact(values: &[Value]) -> Value {
    eval_with(|| {
        let n = number_arg(values, 0)?.floor();
        if !n.is_finite() || n < 0.0 {
            return Err(num_error("FACT of a negative number"));
        }
        if n > MAX_FACTORIAL {
            return Err(num_error(format!("FACT overflows above {MAX_FACTORIAL}")));
        }
        let result = (1..=n as u64).fold(1.0, |acc, k| acc * k as f64);
        Ok(number_result(result))
    })
}

pub fn rand(_: &[Value]) -> Value {
    Value::Number(rand::random::<f64>())
}

/// RANDBETWEEN(low, high), inclusive.
pub fn randbetween(values: &[Value]) -> Value {
    eval_with(|| {
        let low = number_arg(values, 0)?.ceil() as i64;
        let high = number_arg(values, 1)?.floor() as i64;
        if low > high {
            return Err(num_error("RANDBETWEEN low is greater than high"));
        }
        Ok(Value::Number(
            rand::thread_rng().gen_range(low..=high) as f64,
        ))
    })
}

fn datetime_arg(values: &[Value], idx: usize) -> Result<NaiveDateTime, CellError> {
    match arg(values, idx) {
        Value::Date(dt) => Ok(dt),
        Value::Text(s) => gridcalc_utils::parse_datetime(&s)
            .ok_or_else(|| value_error(format!("'{}' is not a date", s))),
        other => {
            let serial = other.to_number()?;
            serial_to_datetime(serial).ok_or_else(|| num_error("Date out of range"))
        }
    }
}

pub fn today(_: &[Value]) -> Value {
    Value::from(Local::now().date_naive())
}

pub fn now(_: &[Value]) -> Value {
    let now = Local::now().naive_local();
    Value::Date(now.with_nanosecond(0).unwrap_or(now))
}

/// DATE(year, month, day); out-of-range months and days roll over.
pub fn date(values: &[Value]) -> Value {
    eval_with(|| {
        let year = number_arg(values, 0)?.floor() as i64;
        let month = number_arg(values, 1)?.floor() as i64;
        let day = number_arg(values, 2)?.floor() as i64;
        date_from_parts(year, month, day)
            .map(Value::from)
            .ok_or_else(|| num_error("Invalid date"))
    })
}

/// TIME(hour, minute, second) as a duration.
pub fn time(values: &[Value]) -> Value {
    eval_with(|| {
        let h = number_arg(values, 0)?;
        let m = number_arg(values, 1)?;
        let s = number_arg(values, 2)?;
        let total = (h * 3600.0 + m * 60.0 + s).floor();
        if total < 0.0 {
            return Err(num_error("Negative time"));
        }
        TimeDelta::try_seconds(total as i64)
            .map(Value::Duration)
            .ok_or_else(|| num_error("Time out of range"))
    })
}

pub fn year(values: &[Value]) -> Value {
    eval_with(|| Ok(Value::Number(f64::from(datetime_arg(values, 0)?.year()))))
}

pub fn month(values: &[Value]) -> Value {
    eval_with(|| Ok(Value::Number(f64::from(datetime_arg(values, 0)?.month()))))
}

pub fn day(values: &[Value]) -> Value {
    eval_with(|| Ok(Value::Number(f64::from(datetime_arg(values, 0)?.day()))))
}

/// DAYS(end, start): whole days between two dates.
pub fn days(values: &[Value]) -> Value {
    eval_with(|| {
        let end = datetime_arg(values, 0)?.date();
        let start = datetime_arg(values, 1)?.date();
        Ok(Value::Number((end - start).num_days() as f64))
    })
}

fn index_arg(values: &[Value], idx: usize) -> Result<usize, CellError> {
    let n = number_arg(values, idx)?;
    if n < 1.0 {
        return Err(value_error("Index must be >= 1"));
    }
    Ok(n as usize)
}

/// Exact-match test for lookups; a text key is a case-insensitive wildcard.
fn lookup_matcher(lookup: &Value) -> impl Fn(&Value) -> bool + '_ {
    let wildcard = match lookup {
        Value::Text(pattern) => Some(Wildcard::new(pattern, true)),
        _ => None,
    };
    move |candidate| match (lookup, candidate) {
        (Value::Text(_), Value::Text(text)) => wildcard.as_ref().is_some_and(|w| w.is_match(text)),
        (Value::Text(_), _) | (_, Value::Text(_)) => false,
        (Value::Blank, _) | (_, Value::Blank) => false,
        _ => {
            lookup.type_rank() == candidate.type_rank()
                && compare_values(lookup, candidate) == Ordering::Equal
        }
    }
}

/// Position of the last entry `<= lookup` in an ascending list, stopping at
/// the first larger entry.
fn approximate_position<'a>(
    lookup: &Value,
    items: impl Iterator<Item = &'a Value>,
) -> Option<usize> {
    let mut found = None;
    for (idx, item) in items.enumerate() {
        if item.is_blank() || item.type_rank() != lookup.type_rank() {
            continue;
        }
        if compare_values(item, lookup) == Ordering::Greater {
            break;
        }
        found = Some(idx);
    }
    found
}

/// VLOOKUP(lookup, table, col_index, [approximate=TRUE])
pub fn vlookup(values: &[Value]) -> Value {
    eval_with(|| {
        let lookup = arg(values, 0);
        let rows = rows_of(&values[1])?;
        let col = index_arg(values, 2)?;
        let approximate = match values.get(3) {
            Some(v) => v.to_bool()?,
            None => true,
        };
        let width = rows.first().map_or(0, Vec::len);
        if col > width {
            return Err(ref_error("Column index outside the table"));
        }
        let first_col = rows.iter().filter_map(|row| row.first());
        let position = if approximate {
            approximate_position(&lookup, first_col)
        } else {
            first_col.into_iter().position(lookup_matcher(&lookup))
        };
        position
            .map(|r| rows[r][col - 1].clone())
            .ok_or_else(|| not_available(format!("{} not found", lookup)))
    })
}

/// HLOOKUP(lookup, table, row_index, [approximate=TRUE])
pub fn hlookup(values: &[Value]) -> Value {
    eval_with(|| {
        let lookup = arg(values, 0);
        let rows = rows_of(&values[1])?;
        let row = index_arg(values, 2)?;
        let approximate = match values.get(3) {
            Some(v) => v.to_bool()?,
            None => true,
        };
        if row > rows.len() {
            return Err(ref_error("Row index outside the table"));
        }
        let header = rows.first().map(Vec::as_slice).unwrap_or_default();
        let position = if approximate {
            approximate_position(&lookup, header.iter())
        } else {
            header.iter().position(lookup_matcher(&lookup))
        };
        position
            .and_then(|c| rows[row - 1].get(c).cloned())
            .ok_or_else(|| not_available(format!("{} not found", lookup)))
    })
}

/// INDEX(array, row, [col]). A single-row array accepts the column as the
/// second argument.
pub fn index(values: &[Value]) -> Value {
    eval_with(|| {
        let rows = rows_of(&values[0])?;
        let first = index_arg(values, 1)?;
        let (r, c) = match values.get(2) {
            Some(_) => (first, index_arg(values, 2)?),
            None if rows.len() == 1 => (1, first),
            None => (first, 1),
        };
        rows.get(r - 1)
            .and_then(|row| row.get(c - 1))
            .cloned()
            .ok_or_else(|| ref_error("INDEX outside the array"))
    })
}

/// MATCH(lookup, list, [type=1]); 0 exact, 1 largest <=, -1 smallest >=.
pub fn match_fn(values: &[Value]) -> Value {
    eval_with(|| {
        let lookup = arg(values, 0);
        let rows = rows_of(&values[1])?;
        let match_type = optional_number(values, 2, 1.0)?;
        let items: Vec<&Value> = if rows.len() == 1 {
            rows[0].iter().collect()
        } else if rows.iter().all(|row| row.len() == 1) {
            rows.iter().flatten().collect()
        } else {
            return Err(not_available("MATCH needs a single row or column"));
        };

        let position = if match_type == 0.0 {
            let is_match = lookup_matcher(&lookup);
            items.iter().position(|v| is_match(*v))
        } else if match_type > 0.0 {
            approximate_position(&lookup, items.iter().copied())
        } else {
            let mut found = None;
            for (idx, item) in items.iter().enumerate() {
                if item.is_blank() || item.type_rank() != lookup.type_rank() {
                    continue;
                }
                if compare_values(item, &lookup) == Ordering::Less {
                    break;
                }
                found = Some(idx);
            }
            found
        };
        position
            .map(|p| Value::Number((p + 1) as f64))
            .ok_or_else(|| not_available(format!("{} not found", lookup)))
    })
}

pub fn rows(values: &[Value]) -> Value {
    eval_with(|| Ok(Value::Number(rows_of(&values[0])?.len() as f64)))
}

pub fn columns(values: &[Value]) -> Value {
    eval_with(|| {
        let rows = rows_of(&values[0])?;
        Ok(Value::Number(rows.first().map_or(0, Vec::len) as f64))
    })
}

/// Register the built-in library.
pub(crate) fn register_standard_functions(registry: &mut FunctionRegistry) {
    use ParamType::{Any, Logical, Number, Range, Text};

    let num = ReturnType::Number;

    // Aggregates
    for (name, f) in [
        ("SUM", sum as fn(&[Value]) -> Value),
        ("PRODUCT", product),
        ("AVERAGE", average),
        ("AVG", average),
        ("MEDIAN", median),
        ("MAX", max),
        ("MIN", min),
    ] {
        registry.register_builtin(name, FunctionDefinition::variadic(1, Number, num, f));
    }
    registry.register_builtin(
        "COUNT",
        FunctionDefinition::variadic(1, Any, num, count).accepting_errors(),
    );
    registry.register_builtin(
        "COUNTA",
        FunctionDefinition::variadic(1, Any, num, counta).accepting_errors(),
    );
    registry.register_builtin(
        "COUNTBLANK",
        FunctionDefinition::fixed(vec![Range], num, countblank),
    );
    registry.register_builtin(
        "COUNTIF",
        FunctionDefinition::fixed(vec![Range, Any], num, countif),
    );
    registry.register_builtin(
        "SUMIF",
        FunctionDefinition::range(2, 3, vec![Range, Any, Range], num, sumif),
    );
    registry.register_builtin(
        "AVERAGEIF",
        FunctionDefinition::range(2, 3, vec![Range, Any, Range], num, averageif),
    );

    // Math
    for (name, f) in [
        ("ABS", abs as fn(&[Value]) -> Value),
        ("INT", int),
        ("SQRT", sqrt),
        ("SIGN", sign),
        ("EXP", exp),
        ("LN", ln),
        ("LOG10", log10),
        ("FACT", fact),
    ] {
        registry.register_builtin(name, FunctionDefinition::fixed(vec![Number], num, f));
    }
    for (name, f) in [
        ("ROUND", round as fn(&[Value]) -> Value),
        ("ROUNDUP", roundup),
        ("ROUNDDOWN", rounddown),
        ("TRUNC", trunc),
        ("LOG", log),
    ] {
        registry.register_builtin(
            name,
            FunctionDefinition::range(1, 2, vec![Number, Number], num, f),
        );
    }
    for (name, f) in [
        ("MOD", mod_fn as fn(&[Value]) -> Value),
        ("POWER", power),
        ("RANDBETWEEN", randbetween),
    ] {
        registry.register_builtin(
            name,
            FunctionDefinition::fixed(vec![Number, Number], num, f),
        );
    }
    registry.register_builtin("PI", FunctionDefinition::fixed(vec![], num, pi));
    registry.register_builtin("RAND", FunctionDefinition::fixed(vec![], num, rand));

    // Logical
    registry.register_builtin(
        "IF",
        FunctionDefinition::range(2, 3, vec![Logical, Any, Any], ReturnType::Any, if_fn),
    );
    registry.register_builtin(
        "IFERROR",
        FunctionDefinition::fixed(vec![Any, Any], ReturnType::Any, iferror).accepting_errors(),
    );
    registry.register_builtin(
        "IFNA",
        FunctionDefinition::fixed(vec![Any, Any], ReturnType::Any, ifna).accepting_errors(),
    );
    registry.register_builtin(
        "AND",
        FunctionDefinition::variadic(1, Logical, ReturnType::Logical, and_fn),
    );
    registry.register_builtin(
        "OR",
        FunctionDefinition::variadic(1, Logical, ReturnType::Logical, or_fn),
    );
    registry.register_builtin(
        "NOT",
        FunctionDefinition::fixed(vec![Logical], ReturnType::Logical, not_fn),
    );

    // Information
    for (name, f) in [
        ("ISBLANK", isblank as fn(&[Value]) -> Value),
        ("ISERROR", iserror),
        ("ISNA", isna),
        ("ISNUMBER", isnumber),
        ("ISTEXT", istext),
    ] {
        registry.register_builtin(
            name,
            FunctionDefinition::fixed(vec![Any], ReturnType::Logical, f).accepting_errors(),
        );
    }
    registry.register_builtin("NA", FunctionDefinition::fixed(vec![], ReturnType::Any, na));

    // Text
    registry.register_builtin(
        "CONCAT",
        FunctionDefinition::variadic(1, Any, ReturnType::Text, concat),
    );
    registry.register_builtin(
        "CONCATENATE",
        FunctionDefinition::variadic(1, Any, ReturnType::Text, concat),
    );
    for (name, f) in [
        ("UPPER", upper as fn(&[Value]) -> Value),
        ("LOWER", lower),
        ("TRIM", trim),
        ("PROPER", proper),
    ] {
        registry.register_builtin(name, FunctionDefinition::fixed(vec![Text], ReturnType::Text, f));
    }
    registry.register_builtin("LEN", FunctionDefinition::fixed(vec![Text], num, len));
    registry.register_builtin("VALUE", FunctionDefinition::fixed(vec![Any], num, value));
    for (name, f) in [("LEFT", left as fn(&[Value]) -> Value), ("RIGHT", right)] {
        registry.register_builtin(
            name,
            FunctionDefinition::range(1, 2, vec![Text, Number], ReturnType::Text, f),
        );
    }
    registry.register_builtin(
        "MID",
        FunctionDefinition::fixed(vec![Text, Number, Number], ReturnType::Text, mid),
    );
    registry.register_builtin(
        "FIND",
        FunctionDefinition::range(2, 3, vec![Text, Text, Number], num, find),
    );
    registry.register_builtin(
        "SUBSTITUTE",
        FunctionDefinition::range(3, 4, vec![Text, Text, Text, Number], ReturnType::Text, substitute),
    );
    registry.register_builtin(
        "REPT",
        FunctionDefinition::fixed(vec![Text, Number], ReturnType::Text, rept),
    );

    // Date
    registry.register_builtin("TODAY", FunctionDefinition::fixed(vec![], ReturnType::Date, today));
    registry.register_builtin("NOW", FunctionDefinition::fixed(vec![], ReturnType::Date, now));
    registry.register_builtin(
        "DATE",
        FunctionDefinition::fixed(vec![Number, Number, Number], ReturnType::Date, date),
    );
    registry.register_builtin(
        "TIME",
        FunctionDefinition::fixed(vec![Number, Number, Number], ReturnType::Any, time),
    );
    for (name, f) in [
        ("YEAR", year as fn(&[Value]) -> Value),
        ("MONTH", month),
        ("DAY", day),
    ] {
        registry.register_builtin(name, FunctionDefinition::fixed(vec![Any], num, f));
    }
    registry.register_builtin("DAYS", FunctionDefinition::fixed(vec![Any, Any], num, days));

    // Lookup
    registry.register_builtin(
        "VLOOKUP",
        FunctionDefinition::range(3, 4, vec![Any, Range, Number, Logical], ReturnType::Any, vlookup),
    );
    registry.register_builtin(
        "HLOOKUP",
        FunctionDefinition::range(3, 4, vec![Any, Range, Number, Logical], ReturnType::Any, hlookup),
    );
    registry.register_builtin(
        "INDEX",
        FunctionDefinition::range(2, 3, vec![Range, Number, Number], ReturnType::Any, index),
    );
    registry.register_builtin(
        "MATCH",
        FunctionDefinition::range(2, 3, vec![Any, Range, Number], num, match_fn),
    );
    registry.register_builtin("ROWS", FunctionDefinition::fixed(vec![Range], num, rows));
    registry.register_builtin("COLUMNS", FunctionDefinition::fixed(vec![Range], num, columns));
}
