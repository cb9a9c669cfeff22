//! # gridcalc formulas
//!
//! Formula parsing, compilation, and evaluation.
//!
//! The engine is stateless with respect to cells: every reference is answered
//! by a [`ValueResolver`], so the same compiled tree can be evaluated against
//! any snapshot. Errors are values ([`Value::Error`]) and propagate as data;
//! only parsing and registry misuse produce a [`FormulaError`].

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::TimeDelta;
use gridcalc_primitives::reference::read_area;
use gridcalc_primitives::value::{days_to_duration, duration_to_days};
use gridcalc_primitives::{Area, CellAddress, CellError, ErrorValue, Reference, Value};
use serde::{Deserialize, Serialize};

pub mod functions;
pub mod parser;
pub mod refs;
pub mod utils;

pub use parser::{parse_formula, parse_formula_with_refs, ParsedFormula, RefSpan};
pub use refs::{
    offset_references, qualify_references, rewrite_references, StructuralEdit, Translation,
};
pub use utils::{balance_formula, is_a_formula, is_valid_formula, validate_formula};

/// Compiled formula ready for evaluation
#[derive(Debug, Clone)]
pub struct CompiledFormula {
    /// The original formula text
    pub source: String,
    pub ast: FormulaExpr,
    pub references: Vec<RefSpan>,
}

/// Formula expression AST
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FormulaExpr {
    Literal(Value),
    /// Cell, range, whole-row or whole-column reference, optionally sheet-qualified.
    Reference(Reference),
    FunctionCall {
        name: String,
        args: Vec<FormulaExpr>,
    },
    BinaryOp {
        op: BinaryOperator,
        left: Box<FormulaExpr>,
        right: Box<FormulaExpr>,
    },
    UnaryOp {
        op: UnaryOperator,
        expr: Box<FormulaExpr>,
    },
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Power,
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    Concat,
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOperator {
    Negate,
    Percent,
}

/// Formula evaluation engine. Holds the function registry.
#[derive(Clone, Default)]
pub struct FormulaEngine {
    functions: FunctionRegistry,
}

impl FormulaEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_registry(functions: FunctionRegistry) -> Self {
        Self { functions }
    }

    /// Compile a formula string
    pub fn compile(&self, formula: &str) -> Result<CompiledFormula, FormulaError> {
        let parsed = parser::parse_formula_with_refs(formula)?;
        Ok(CompiledFormula {
            source: formula.to_string(),
            ast: parsed.expr,
            references: parsed.references,
        })
    }

    /// Access registered functions
    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    /// Register a user function. Built-in and previously registered names are
    /// rejected.
    pub fn register_function(
        &mut self,
        name: &str,
        def: FunctionDefinition,
    ) -> Result<(), FormulaError> {
        self.functions.register_user(name, def)
    }

    /// Evaluate a compiled formula against a context
    pub fn evaluate(&self, compiled: &CompiledFormula, context: &impl ValueResolver) -> Value {
        self.eval_expr(&compiled.ast, context)
    }

    /// Parse and evaluate in one step; unparseable text yields `#ERROR!`.
    pub fn evaluate_text(&self, formula: &str, context: &impl ValueResolver) -> Value {
        match parser::parse_formula(formula) {
            Ok(ast) => self.eval_expr(&ast, context),
            Err(err) => Value::error(ErrorValue::Error, err.to_string()),
        }
    }

    pub fn eval_expr(&self, expr: &FormulaExpr, context: &impl ValueResolver) -> Value {
        match expr {
            FormulaExpr::Literal(value) => value.clone(),
            FormulaExpr::Reference(reference) => {
                let sheet = reference.sheet.as_deref();
                if reference.is_single_cell() {
                    context.get_cell(sheet, &reference.area().top_left())
                } else {
                    context.get_range(sheet, &reference.area())
                }
            }
            FormulaExpr::UnaryOp { op, expr } => {
                let value = self.eval_expr(expr, context).top_left();
                if value.is_error() {
                    return value;
                }
                eval_unary(*op, &value)
            }
            FormulaExpr::BinaryOp { op, left, right } => {
                let left_val = self.eval_expr(left, context).top_left();
                if left_val.is_error() {
                    return left_val;
                }
                let right_val = self.eval_expr(right, context).top_left();
                if right_val.is_error() {
                    return right_val;
                }
                eval_binary(*op, &left_val, &right_val)
            }
            FormulaExpr::FunctionCall { name, args } => self.eval_call(name, args, context),
        }
    }

    fn eval_call(&self, name: &str, args: &[FormulaExpr], context: &impl ValueResolver) -> Value {
        let def = match self.functions.resolve(name, args.len()) {
            Ok(def) => def,
            Err(err @ FormulaError::UnknownFunction(_)) => {
                return Value::error(ErrorValue::Name, err.to_string());
            }
            Err(err) => return Value::error(ErrorValue::NA, err.to_string()),
        };

        // Branches of the conditional functions are evaluated lazily.
        if def.builtin {
            match name.to_uppercase().as_str() {
                "IF" => return self.eval_if(args, context),
                "IFERROR" | "IFNA" => {
                    let only_na = name.eq_ignore_ascii_case("IFNA");
                    let value = self.eval_expr(&args[0], context).top_left();
                    return match value.error_kind() {
                        Some(ErrorValue::NA) => self.eval_expr(&args[1], context),
                        Some(_) if !only_na => self.eval_expr(&args[1], context),
                        _ => value,
                    };
                }
                _ => {}
            }
        }

        let mut evaled_args = Vec::with_capacity(args.len());
        for (idx, arg) in args.iter().enumerate() {
            let param = def.metadata.param(idx);
            let value = match (param, arg) {
                // A range parameter wants the block even for a single cell.
                (ParamType::Range, FormulaExpr::Reference(r)) => {
                    context.get_range(r.sheet.as_deref(), &r.area())
                }
                // Aggregates read referenced cells as a block so text in them is skipped.
                (ParamType::Number | ParamType::Logical, FormulaExpr::Reference(r))
                    if def.metadata.variadic.is_some() =>
                {
                    context.get_range(r.sheet.as_deref(), &r.area())
                }
                _ => self.eval_expr(arg, context),
            };
            let value = match coerce_param(param, value) {
                Ok(value) => value,
                Err(err) => return Value::Error(err),
            };
            if !def.accepts_errors && value.is_error() {
                return value;
            }
            evaled_args.push(value);
        }

        (def.eval)(&evaled_args)
    }

    fn eval_if(&self, args: &[FormulaExpr], context: &impl ValueResolver) -> Value {
        let condition = self.eval_expr(&args[0], context).top_left();
        let truthy = match condition.to_bool() {
            Ok(b) => b,
            Err(err) => return Value::Error(err),
        };
        if truthy {
            self.eval_expr(&args[1], context)
        } else if let Some(otherwise) = args.get(2) {
            self.eval_expr(otherwise, context)
        } else {
            Value::Bool(false)
        }
    }
}

impl fmt::Debug for FormulaEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormulaEngine")
            .field("functions", &self.functions.len())
            .finish()
    }
}

/// Check a scalar argument against its declared parameter type.
fn coerce_param(param: ParamType, value: Value) -> Result<Value, CellError> {
    match (param, value) {
        (_, value @ Value::Error(_)) => Ok(value),
        (ParamType::Range, value @ Value::Array(_)) => Ok(value),
        (ParamType::Range, scalar) => Ok(Value::Array(vec![vec![scalar]])),
        (_, value @ Value::Array(_)) => Ok(value),
        (ParamType::Number, value) => {
            value.to_number()?;
            Ok(value)
        }
        (ParamType::Logical, value) => {
            value.to_bool()?;
            Ok(value)
        }
        (ParamType::Text | ParamType::Any, value) => Ok(value),
    }
}

/// Registry of available functions
#[derive(Clone)]
pub struct FunctionRegistry {
    functions: HashMap<String, FunctionDefinition>,
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        let mut registry = Self {
            functions: HashMap::new(),
        };
        functions::register_standard_functions(&mut registry);
        registry
    }
}

impl FunctionRegistry {
    /// A registry with no functions at all.
    pub fn empty() -> Self {
        Self {
            functions: HashMap::new(),
        }
    }

    pub(crate) fn register_builtin(&mut self, name: &str, mut def: FunctionDefinition) {
        def.builtin = true;
        self.functions.insert(name.to_uppercase(), def);
    }

    /// Add a user function under `name`.
    pub fn register_user(&mut self, name: &str, def: FunctionDefinition) -> Result<(), FormulaError> {
        let key = name.trim().to_uppercase();
        let valid = key
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
        if !valid {
            return Err(FormulaError::InvalidFunctionName(name.to_string()));
        }
        if self.functions.contains_key(&key) {
            return Err(FormulaError::DuplicateFunction(key));
        }
        let mut def = def;
        def.builtin = false;
        tracing::debug!(name = %key, "registered user function");
        self.functions.insert(key, def);
        Ok(())
    }

    /// Check if a function exists
    pub fn has_function(&self, name: &str) -> bool {
        self.functions.contains_key(&name.to_uppercase())
    }

    /// Get a function definition by name
    pub fn get(&self, name: &str) -> Option<&FunctionDefinition> {
        self.functions.get(&name.to_uppercase())
    }

    /// Look up `name` and check that it accepts `provided` arguments.
    pub fn resolve(&self, name: &str, provided: usize) -> Result<&FunctionDefinition, FormulaError> {
        let def = self
            .get(name)
            .ok_or_else(|| FormulaError::UnknownFunction(name.to_uppercase()))?;
        def.validate_arg_count(provided).map_err(|expected| {
            FormulaError::InvalidArgCount(name.to_uppercase(), expected, provided)
        })?;
        Ok(def)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

pub type FunctionImpl = Arc<dyn Fn(&[Value]) -> Value + Send + Sync>;

/// Function definition
#[derive(Clone)]
pub struct FunctionDefinition {
    pub min_args: usize,
    pub max_args: Option<usize>,
    pub metadata: FunctionMetadata,
    /// Receive error arguments instead of short-circuiting on them.
    pub accepts_errors: bool,
    pub eval: FunctionImpl,
    builtin: bool,
}

impl FunctionDefinition {
    /// Fixed number of arguments
    pub fn fixed<F>(params: Vec<ParamType>, return_type: ReturnType, eval: F) -> Self
    where
        F: Fn(&[Value]) -> Value + Send + Sync + 'static,
    {
        let args = params.len();
        Self::build(args, Some(args), params, None, return_type, eval)
    }

    /// Variable number of arguments
    pub fn variadic<F>(min: usize, variadic: ParamType, return_type: ReturnType, eval: F) -> Self
    where
        F: Fn(&[Value]) -> Value + Send + Sync + 'static,
    {
        Self::build(min, None, Vec::new(), Some(variadic), return_type, eval)
    }

    /// Range of arguments
    pub fn range<F>(
        min: usize,
        max: usize,
        params: Vec<ParamType>,
        return_type: ReturnType,
        eval: F,
    ) -> Self
    where
        F: Fn(&[Value]) -> Value + Send + Sync + 'static,
    {
        Self::build(min, Some(max), params, None, return_type, eval)
    }

    fn build<F>(
        min_args: usize,
        max_args: Option<usize>,
        params: Vec<ParamType>,
        variadic: Option<ParamType>,
        return_type: ReturnType,
        eval: F,
    ) -> Self
    where
        F: Fn(&[Value]) -> Value + Send + Sync + 'static,
    {
        Self {
            min_args,
            max_args,
            metadata: FunctionMetadata {
                params,
                variadic,
                return_type,
            },
            accepts_errors: false,
            eval: Arc::new(eval),
            builtin: false,
        }
    }

    /// Let error values through to the implementation (ISERROR, COUNTA, ...).
    pub fn accepting_errors(mut self) -> Self {
        self.accepts_errors = true;
        self
    }

    pub fn is_builtin(&self) -> bool {
        self.builtin
    }

    fn validate_arg_count(&self, provided: usize) -> Result<(), String> {
        if provided < self.min_args {
            return Err(self.expected_args_label());
        }
        if let Some(max) = self.max_args {
            if provided > max {
                return Err(self.expected_args_label());
            }
        }
        Ok(())
    }

    fn expected_args_label(&self) -> String {
        match self.max_args {
            Some(max) if max == self.min_args => format!("{}", self.min_args),
            Some(max) => format!("{}..{}", self.min_args, max),
            None => format!("{}+", self.min_args),
        }
    }
}

impl fmt::Debug for FunctionDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionDefinition")
            .field("min_args", &self.min_args)
            .field("max_args", &self.max_args)
            .field("metadata", &self.metadata)
            .field("accepts_errors", &self.accepts_errors)
            .finish_non_exhaustive()
    }
}

/// Formula errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormulaError {
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Unknown function: {0}")]
    UnknownFunction(String),
    #[error("Invalid argument count for {0}: expected {1}, got {2}")]
    InvalidArgCount(String, String, usize),
    #[error("Function {0} is already registered")]
    DuplicateFunction(String),
    #[error("Invalid function name: {0:?}")]
    InvalidFunctionName(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamType {
    Any,
    Number,
    Logical,
    Text,
    Range,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReturnType {
    Any,
    Number,
    Logical,
    Text,
    Date,
    Range,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionMetadata {
    pub params: Vec<ParamType>,
    pub variadic: Option<ParamType>,
    pub return_type: ReturnType,
}

impl FunctionMetadata {
    /// Declared type of the argument at `idx`.
    pub fn param(&self, idx: usize) -> ParamType {
        self.params
            .get(idx)
            .copied()
            .or(self.variadic)
            .unwrap_or(ParamType::Any)
    }
}

/// Answers reference lookups during evaluation.
///
/// `sheet` is the qualifier as written; `None` means the sheet the formula
/// lives in. Unknown sheets should answer `#REF!`.
pub trait ValueResolver {
    fn get_cell(&self, sheet: Option<&str>, addr: &CellAddress) -> Value;
    /// A [`Value::Array`] of rows, or an error value.
    fn get_range(&self, sheet: Option<&str>, area: &Area) -> Value;
    fn current_cell(&self) -> Option<CellAddress> {
        None
    }
}

/// Map-backed resolver for tests and one-off evaluation. Sheet qualifiers are
/// ignored.
#[derive(Debug, Default)]
pub struct EvalContext {
    cells: HashMap<CellAddress, Value>,
}

impl EvalContext {
    pub fn with_cells(cells: HashMap<CellAddress, Value>) -> Self {
        Self { cells }
    }

    pub fn set(&mut self, a1: &str, value: impl Into<Value>) -> &mut Self {
        if let Ok(addr) = CellAddress::from_a1(a1) {
            self.cells.insert(addr, value.into());
        }
        self
    }
}

impl ValueResolver for EvalContext {
    fn get_cell(&self, _sheet: Option<&str>, addr: &CellAddress) -> Value {
        self.cells.get(addr).cloned().unwrap_or(Value::Blank)
    }

    fn get_range(&self, sheet: Option<&str>, area: &Area) -> Value {
        let max_row = self.cells.keys().map(|a| a.row).max().unwrap_or(0);
        let max_col = self.cells.keys().map(|a| a.col).max().unwrap_or(0);
        read_area(*area, max_row, max_col, |addr| self.get_cell(sheet, &addr))
    }
}

fn eval_unary(op: UnaryOperator, value: &Value) -> Value {
    match (op, value) {
        (UnaryOperator::Negate, Value::Duration(d)) => Value::Duration(-*d),
        (UnaryOperator::Negate, v) => match v.to_number() {
            Ok(n) => Value::Number(-n),
            Err(err) => Value::Error(err),
        },
        (UnaryOperator::Percent, v) => match v.to_number() {
            Ok(n) => Value::Number(n / 100.0),
            Err(err) => Value::Error(err),
        },
    }
}

pub(crate) fn eval_binary(op: BinaryOperator, left: &Value, right: &Value) -> Value {
    match op {
        BinaryOperator::Add => add_values(left, right),
        BinaryOperator::Subtract => subtract_values(left, right),
        BinaryOperator::Multiply => numeric_op(left, right, |l, r| Ok(l * r)),
        BinaryOperator::Divide => numeric_op(left, right, |l, r| {
            if r == 0.0 {
                Err(CellError::new(ErrorValue::Div0, "Division by zero"))
            } else {
                Ok(l / r)
            }
        }),
        BinaryOperator::Power => numeric_op(left, right, |l, r| {
            if l == 0.0 && r < 0.0 {
                Err(CellError::new(ErrorValue::Div0, "Zero raised to a negative power"))
            } else {
                Ok(l.powf(r))
            }
        }),
        BinaryOperator::Equal => Value::Bool(compare_values(left, right) == Ordering::Equal),
        BinaryOperator::NotEqual => Value::Bool(compare_values(left, right) != Ordering::Equal),
        BinaryOperator::LessThan => Value::Bool(compare_values(left, right) == Ordering::Less),
        BinaryOperator::LessThanOrEqual => {
            Value::Bool(compare_values(left, right) != Ordering::Greater)
        }
        BinaryOperator::GreaterThan => {
            Value::Bool(compare_values(left, right) == Ordering::Greater)
        }
        BinaryOperator::GreaterThanOrEqual => {
            Value::Bool(compare_values(left, right) != Ordering::Less)
        }
        BinaryOperator::Concat => Value::Text(format!("{}{}", left.to_text(), right.to_text())),
    }
}

fn numeric_op(
    left: &Value,
    right: &Value,
    op: impl Fn(f64, f64) -> Result<f64, CellError>,
) -> Value {
    let l = match left.to_number() {
        Ok(n) => n,
        Err(err) => return Value::Error(err),
    };
    let r = match right.to_number() {
        Ok(n) => n,
        Err(err) => return Value::Error(err),
    };
    match op(l, r) {
        Ok(n) => number_result(n),
        Err(err) => Value::Error(err),
    }
}

pub(crate) fn number_result(n: f64) -> Value {
    if n.is_finite() {
        Value::Number(n)
    } else {
        Value::error(ErrorValue::Num, "Result is not a finite number")
    }
}

fn add_values(left: &Value, right: &Value) -> Value {
    match (left, right) {
        (Value::Date(dt), Value::Duration(d)) | (Value::Duration(d), Value::Date(dt)) => {
            shift_date(*dt, *d)
        }
        (Value::Duration(a), Value::Duration(b)) => match a.checked_add(b) {
            Some(d) => Value::Duration(d),
            None => Value::error(ErrorValue::Num, "Duration overflow"),
        },
        (Value::Date(dt), other) | (other, Value::Date(dt)) if !matches!(other, Value::Date(_)) => {
            match other.to_number().map(days_to_duration) {
                Ok(Some(d)) => shift_date(*dt, d),
                Ok(None) => Value::error(ErrorValue::Num, "Invalid day offset"),
                Err(err) => Value::Error(err),
            }
        }
        _ => numeric_op(left, right, |l, r| Ok(l + r)),
    }
}

fn subtract_values(left: &Value, right: &Value) -> Value {
    match (left, right) {
        (Value::Date(a), Value::Date(b)) => Value::Duration(*a - *b),
        (Value::Date(dt), Value::Duration(d)) => shift_date(*dt, -*d),
        (Value::Duration(a), Value::Duration(b)) => match a.checked_sub(b) {
            Some(d) => Value::Duration(d),
            None => Value::error(ErrorValue::Num, "Duration overflow"),
        },
        (Value::Date(dt), other) => match other.to_number().map(|n| days_to_duration(-n)) {
            Ok(Some(d)) => shift_date(*dt, d),
            Ok(None) => Value::error(ErrorValue::Num, "Invalid day offset"),
            Err(err) => Value::Error(err),
        },
        (Value::Duration(d), other) => match other.to_number() {
            Ok(n) => match days_to_duration(duration_to_days(*d) - n) {
                Some(d) => Value::Duration(d),
                None => Value::error(ErrorValue::Num, "Duration overflow"),
            },
            Err(err) => Value::Error(err),
        },
        _ => numeric_op(left, right, |l, r| Ok(l - r)),
    }
}

fn shift_date(dt: chrono::NaiveDateTime, delta: TimeDelta) -> Value {
    match dt.checked_add_signed(delta) {
        Some(shifted) => Value::Date(shifted),
        None => Value::error(ErrorValue::Num, "Date out of range"),
    }
}

/// Ordering used by comparison operators and lookups.
///
/// Blank compares as the zero of the other side's type. Mixed types order as
/// numbers < text < booleans; text compares case-insensitively.
pub fn compare_values(left: &Value, right: &Value) -> Ordering {
    match (left, right) {
        (Value::Blank, Value::Blank) => Ordering::Equal,
        (Value::Blank, other) => compare_values(&blank_like(other), other),
        (other, Value::Blank) => compare_values(other, &blank_like(other)),
        (Value::Text(a), Value::Text(b)) => a.to_lowercase().cmp(&b.to_lowercase()),
        _ => left.sort_cmp(right),
    }
}

fn blank_like(value: &Value) -> Value {
    match value {
        Value::Text(_) => Value::Text(String::new()),
        Value::Bool(_) => Value::Bool(false),
        _ => Value::Number(0.0),
    }
}
