//! Row filtering by column predicates.
//!
//! Filters never delete anything: they compute the set of hidden rows that
//! selection, copy, cut, clear and paste skip.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use gridcalc_formulas::{compare_values, FormulaEngine};
use gridcalc_primitives::{CellAddress, Value};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::book::Book;
use crate::error::{Result, SheetError};
use crate::eval::Evaluator;
use crate::sheet::Sheet;

/// A test applied to a cell's evaluated value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Predicate {
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    /// Case-insensitive substring
    Includes(String),
    /// Case-insensitive prefix
    StartsWith(String),
    Blank,
    NotBlank,
    /// Case-insensitive regular expression
    Regex(String),
}

/// How the predicates of one column combine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterMode {
    #[default]
    And,
    Or,
}

/// The filter attached to a column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnFilter {
    pub predicates: Vec<Predicate>,
    pub mode: FilterMode,
}

impl ColumnFilter {
    pub fn new(predicates: Vec<Predicate>, mode: FilterMode) -> Self {
        ColumnFilter { predicates, mode }
    }

    /// Compile once per recompute; fails on an invalid regular expression.
    fn compile(&self) -> Result<CompiledFilter<'_>> {
        let patterns = self
            .predicates
            .iter()
            .map(|predicate| match predicate {
                Predicate::Regex(pattern) => RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .map(Some)
                    .map_err(|err| SheetError::InvalidPattern {
                        pattern: pattern.clone(),
                        message: err.to_string(),
                    }),
                _ => Ok(None),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(CompiledFilter {
            filter: self,
            patterns,
        })
    }

    /// Reject filters that cannot be evaluated.
    pub fn validate(&self) -> Result<()> {
        self.compile().map(|_| ())
    }
}

struct CompiledFilter<'a> {
    filter: &'a ColumnFilter,
    patterns: Vec<Option<Regex>>,
}

impl CompiledFilter<'_> {
    fn matches(&self, value: &Value) -> bool {
        let mut results = self
            .filter
            .predicates
            .iter()
            .zip(&self.patterns)
            .map(|(predicate, pattern)| predicate_matches(predicate, pattern.as_ref(), value));
        match self.filter.mode {
            FilterMode::And => results.all(|b| b),
            FilterMode::Or => results.any(|b| b),
        }
    }
}

/// Ordering comparison between like types only; a text cell never passes
/// `Gte(75)` and a blank never passes an ordering test.
fn ordered(value: &Value, operand: &Value) -> Option<Ordering> {
    if value.is_blank() || value.is_error() || value.type_rank() != operand.type_rank() {
        return None;
    }
    Some(compare_values(value, operand))
}

fn predicate_matches(predicate: &Predicate, pattern: Option<&Regex>, value: &Value) -> bool {
    match predicate {
        Predicate::Eq(operand) => ordered(value, operand) == Some(Ordering::Equal),
        Predicate::Ne(operand) => ordered(value, operand) != Some(Ordering::Equal),
        Predicate::Gt(operand) => ordered(value, operand) == Some(Ordering::Greater),
        Predicate::Gte(operand) => matches!(
            ordered(value, operand),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        Predicate::Lt(operand) => ordered(value, operand) == Some(Ordering::Less),
        Predicate::Lte(operand) => {
            matches!(ordered(value, operand), Some(Ordering::Less | Ordering::Equal))
        }
        Predicate::Includes(needle) => value
            .to_text()
            .to_lowercase()
            .contains(&needle.to_lowercase()),
        Predicate::StartsWith(prefix) => value
            .to_text()
            .to_lowercase()
            .starts_with(&prefix.to_lowercase()),
        Predicate::Blank => value.is_blank() || matches!(value, Value::Text(s) if s.is_empty()),
        Predicate::NotBlank => !(value.is_blank() || matches!(value, Value::Text(s) if s.is_empty())),
        Predicate::Regex(_) => pattern.is_some_and(|re| re.is_match(&value.to_text())),
    }
}

/// Rows of `sheet` that fail at least one column filter, over rows
/// `1..=last used row`.
pub fn hidden_rows(sheet: &Sheet, evaluator: &Evaluator<'_>) -> Result<BTreeSet<u32>> {
    let filters = sheet
        .layout()
        .filters
        .iter()
        .map(|(col, filter)| filter.compile().map(|compiled| (*col, compiled)))
        .collect::<Result<Vec<_>>>()?;
    if filters.is_empty() {
        return Ok(BTreeSet::new());
    }
    let (last_row, _) = sheet.used_extent();
    let hidden = (1..=last_row)
        .filter(|row| {
            !filters.iter().all(|(col, filter)| {
                filter.matches(&evaluator.value(sheet, CellAddress::new(*row, *col)))
            })
        })
        .collect();
    Ok(hidden)
}

/// Recompute and store the hidden-row mask of `sheet` from its filters.
pub(crate) fn refresh(book: &mut Book, engine: &FormulaEngine, sheet: &str) -> Result<()> {
    let hidden = {
        let evaluator = Evaluator::new(book, engine);
        hidden_rows(book.get_sheet(sheet)?, &evaluator)?
    };
    tracing::debug!(sheet, hidden = hidden.len(), "refreshed filter mask");
    book.sheet_mut(sheet)?.layout_mut().hidden_rows = hidden;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(predicate: Predicate, value: Value) -> bool {
        let filter = ColumnFilter::new(vec![predicate], FilterMode::And);
        filter.compile().unwrap().matches(&value)
    }

    #[test]
    fn test_ordering_predicates() {
        assert!(check(Predicate::Gte(Value::Number(75.0)), Value::Number(75.0)));
        assert!(!check(Predicate::Gte(Value::Number(75.0)), Value::Number(74.0)));
        assert!(!check(Predicate::Gte(Value::Number(75.0)), Value::from("Score")));
        assert!(!check(Predicate::Lt(Value::Number(75.0)), Value::Blank));
        assert!(check(Predicate::Eq(Value::from("apple")), Value::from("APPLE")));
        assert!(check(Predicate::Ne(Value::from("apple")), Value::Blank));
    }

    #[test]
    fn test_text_predicates() {
        assert!(check(Predicate::Includes("an".into()), Value::from("Banana")));
        assert!(check(Predicate::StartsWith("ba".into()), Value::from("Banana")));
        assert!(!check(Predicate::StartsWith("an".into()), Value::from("Banana")));
        assert!(check(Predicate::Regex("^b.n".into()), Value::from("BANANA")));
        assert!(check(Predicate::Blank, Value::Blank));
        assert!(check(Predicate::NotBlank, Value::Number(0.0)));
    }

    #[test]
    fn test_modes() {
        let range = ColumnFilter::new(
            vec![
                Predicate::Gte(Value::Number(10.0)),
                Predicate::Lte(Value::Number(20.0)),
            ],
            FilterMode::And,
        );
        let compiled = range.compile().unwrap();
        assert!(compiled.matches(&Value::Number(15.0)));
        assert!(!compiled.matches(&Value::Number(25.0)));

        let either = ColumnFilter::new(
            vec![
                Predicate::Eq(Value::from("a")),
                Predicate::Eq(Value::from("b")),
            ],
            FilterMode::Or,
        );
        let compiled = either.compile().unwrap();
        assert!(compiled.matches(&Value::from("b")));
        assert!(!compiled.matches(&Value::from("c")));
    }

    #[test]
    fn test_invalid_regex_rejected() {
        let filter = ColumnFilter::new(vec![Predicate::Regex("(".into())], FilterMode::And);
        assert!(matches!(
            filter.validate(),
            Err(SheetError::InvalidPattern { .. })
        ));
    }
}
