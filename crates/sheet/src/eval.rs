//! Lazy evaluation of formula cells over a snapshot.
//!
//! Nothing is cached between calls: an [`Evaluator`] memoizes results for
//! its own lifetime only, so reads always reflect the snapshot it was built
//! from.
//!
//! Precedents are resolved with an explicit work stack before a formula is
//! evaluated, so long dependency chains never deepen the native stack. A
//! precedent that is already on the stack closes a cycle; every cell on that
//! path evaluates to `#REF!`.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::rc::Rc;

use gridcalc_formulas::{parse_formula, FormulaEngine, FormulaExpr, ValueResolver};
use gridcalc_primitives::reference::{clip_area, read_area};
use gridcalc_primitives::{Area, CellAddress, ErrorValue, Value};

use crate::book::Book;
use crate::cell::CellContent;
use crate::sheet::{Sheet, SheetId};

type CellKey = (SheetId, CellAddress);
type Parsed = Rc<Result<FormulaExpr, String>>;

#[derive(Default)]
struct EvalState {
    memo: HashMap<CellKey, Value>,
    /// Cells on the work stack, bottom first
    in_progress: Vec<CellKey>,
    pending: HashSet<CellKey>,
    cyclic: HashSet<CellKey>,
    parsed: HashMap<String, Parsed>,
}

impl EvalState {
    /// Mark every cell from `key` to the top of the stack as cyclic.
    fn close_cycle(&mut self, key: CellKey) {
        if let Some(start) = self.in_progress.iter().position(|k| *k == key) {
            let members = self.in_progress[start..].to_vec();
            tracing::trace!(sheet = %key.0, cell = %key.1, len = members.len(), "circular reference");
            self.cyclic.extend(members);
        }
    }
}

/// A formula cell waiting for its precedents.
struct Frame<'s> {
    sheet: &'s Sheet,
    addr: CellAddress,
    parsed: Parsed,
    precedents: Vec<(&'s Sheet, CellAddress)>,
    next: usize,
}

/// Evaluates cells of one snapshot with circular-reference detection.
pub struct Evaluator<'a> {
    book: &'a Book,
    engine: &'a FormulaEngine,
    state: RefCell<EvalState>,
}

impl<'a> Evaluator<'a> {
    pub fn new(book: &'a Book, engine: &'a FormulaEngine) -> Self {
        Evaluator {
            book,
            engine,
            state: RefCell::new(EvalState::default()),
        }
    }

    /// Evaluated value of a cell. Arrays collapse to their top-left value and
    /// every cell on a reference cycle evaluates to `#REF!`.
    pub fn value(&self, sheet: &Sheet, addr: CellAddress) -> Value {
        let key = (sheet.id(), addr);
        if let Some(value) = self.state.borrow().memo.get(&key) {
            return value.clone();
        }
        let source = match sheet.cell(addr) {
            None => return Value::Blank,
            Some(CellContent::Value(value)) => return value.clone(),
            Some(CellContent::Formula(source)) => source,
        };
        {
            let mut state = self.state.borrow_mut();
            if state.pending.contains(&key) {
                state.close_cycle(key);
                return circular();
            }
        }
        self.resolve(self.frame(sheet, addr, source));
        self.state
            .borrow()
            .memo
            .get(&key)
            .cloned()
            .unwrap_or_else(circular)
    }

    /// Value of a cell addressed by sheet name; unknown sheets are `#REF!`.
    pub fn value_at(&self, sheet: &str, addr: CellAddress) -> Value {
        match self.book.sheet(sheet) {
            Some(sheet) => self.value(sheet, addr),
            None => unknown_sheet(sheet),
        }
    }

    /// Evaluated values of every non-blank cell of `sheet`.
    pub fn evaluate_sheet(&self, sheet: &Sheet) -> BTreeMap<CellAddress, Value> {
        sheet
            .cells()
            .map(|(addr, _)| (addr, self.value(sheet, addr)))
            .collect()
    }

    /// Depth-first walk from `root`: a frame is evaluated once all of its
    /// formula precedents are memoized or known to be cyclic.
    fn resolve<'s>(&'s self, root: Frame<'s>) {
        let mut stack = vec![root];
        self.push_pending(&stack[0]);

        while let Some(top) = stack.last_mut() {
            if let Some(&(sheet, addr)) = top.precedents.get(top.next) {
                top.next += 1;
                let key = (sheet.id(), addr);
                {
                    let mut state = self.state.borrow_mut();
                    if state.memo.contains_key(&key) {
                        continue;
                    }
                    if state.pending.contains(&key) {
                        state.close_cycle(key);
                        continue;
                    }
                }
                if let Some(CellContent::Formula(source)) = sheet.cell(addr) {
                    let frame = self.frame(sheet, addr, source);
                    self.push_pending(&frame);
                    stack.push(frame);
                }
                continue;
            }

            let Some(frame) = stack.pop() else {
                break;
            };
            let key = (frame.sheet.id(), frame.addr);
            let cyclic = self.state.borrow().cyclic.contains(&key);
            let value = if cyclic {
                circular()
            } else {
                self.compute(frame.sheet, frame.addr, &frame.parsed)
            };
            let mut state = self.state.borrow_mut();
            state.in_progress.pop();
            state.pending.remove(&key);
            state.memo.insert(key, value);
        }
    }

    fn push_pending(&self, frame: &Frame<'_>) {
        let key = (frame.sheet.id(), frame.addr);
        let mut state = self.state.borrow_mut();
        state.in_progress.push(key);
        state.pending.insert(key);
    }

    fn frame<'s>(&'s self, sheet: &'s Sheet, addr: CellAddress, source: &str) -> Frame<'s> {
        let parsed = self.parse(source);
        let mut precedents = Vec::new();
        if let Ok(expr) = parsed.as_ref() {
            self.collect_precedents(sheet, expr, &mut precedents);
        }
        Frame {
            sheet,
            addr,
            parsed,
            precedents,
            next: 0,
        }
    }

    /// Formula cells `expr` may read. Literal cells need no evaluation and
    /// are left out.
    fn collect_precedents<'s>(
        &'s self,
        home: &'s Sheet,
        expr: &FormulaExpr,
        out: &mut Vec<(&'s Sheet, CellAddress)>,
    ) {
        match expr {
            FormulaExpr::Literal(_) => {}
            FormulaExpr::Reference(reference) => {
                let target = match reference.sheet.as_deref() {
                    None => home,
                    Some(name) => match self.book.sheet(name) {
                        Some(sheet) => sheet,
                        None => return,
                    },
                };
                let (max_row, max_col) = target.used_extent();
                let Some(area) = clip_area(reference.area(), max_row, max_col) else {
                    return;
                };
                out.extend(
                    target
                        .cells_in(area)
                        .filter(|(_, content)| content.is_formula())
                        .map(|(addr, _)| (target, addr)),
                );
            }
            FormulaExpr::FunctionCall { args, .. } => {
                for arg in args {
                    self.collect_precedents(home, arg, out);
                }
            }
            FormulaExpr::BinaryOp { left, right, .. } => {
                self.collect_precedents(home, left, out);
                self.collect_precedents(home, right, out);
            }
            FormulaExpr::UnaryOp { expr, .. } => self.collect_precedents(home, expr, out),
        }
    }

    fn compute(&self, sheet: &Sheet, addr: CellAddress, parsed: &Result<FormulaExpr, String>) -> Value {
        match parsed {
            Ok(expr) => {
                let scope = Scope {
                    evaluator: self,
                    sheet,
                    current: addr,
                };
                self.engine.eval_expr(expr, &scope).top_left()
            }
            Err(message) => Value::error(ErrorValue::Error, message.clone()),
        }
    }

    fn parse(&self, source: &str) -> Parsed {
        if let Some(parsed) = self.state.borrow().parsed.get(source) {
            return Rc::clone(parsed);
        }
        let parsed = Rc::new(parse_formula(source).map_err(|err| err.to_string()));
        self.state
            .borrow_mut()
            .parsed
            .insert(source.to_string(), Rc::clone(&parsed));
        parsed
    }
}

fn circular() -> Value {
    Value::error(ErrorValue::Ref, "Circular reference")
}

fn unknown_sheet(name: &str) -> Value {
    Value::error(ErrorValue::Ref, format!("Unknown sheet '{name}'"))
}

/// Resolver for one formula cell: unqualified references read `sheet`.
struct Scope<'e, 'a> {
    evaluator: &'e Evaluator<'a>,
    sheet: &'e Sheet,
    current: CellAddress,
}

impl Scope<'_, '_> {
    fn target(&self, sheet: Option<&str>) -> Result<&Sheet, Value> {
        match sheet {
            None => Ok(self.sheet),
            Some(name) => self
                .evaluator
                .book
                .sheet(name)
                .ok_or_else(|| unknown_sheet(name)),
        }
    }
}

impl ValueResolver for Scope<'_, '_> {
    fn get_cell(&self, sheet: Option<&str>, addr: &CellAddress) -> Value {
        match self.target(sheet) {
            Ok(target) => self.evaluator.value(target, *addr),
            Err(err) => err,
        }
    }

    fn get_range(&self, sheet: Option<&str>, area: &Area) -> Value {
        let target = match self.target(sheet) {
            Ok(target) => target,
            Err(err) => return err,
        };
        let (max_row, max_col) = target.used_extent();
        read_area(*area, max_row, max_col, |addr| self.evaluator.value(target, addr))
    }

    fn current_cell(&self) -> Option<CellAddress> {
        Some(self.current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheet::SheetLayout;

    fn book_with(cells: &[(&str, &str, &str)]) -> Book {
        let mut book = Book::new();
        book.add_sheet("Sheet1", SheetLayout::default()).unwrap();
        book.add_sheet("Other Sheet", SheetLayout::default()).unwrap();
        for (sheet, a1, input) in cells {
            book.sheet_mut(sheet)
                .unwrap()
                .set_cell(CellAddress::from_a1(a1).unwrap(), CellContent::parse(input));
        }
        book
    }

    fn eval(book: &Book, sheet: &str, a1: &str) -> Value {
        let engine = FormulaEngine::new();
        Evaluator::new(book, &engine).value_at(sheet, CellAddress::from_a1(a1).unwrap())
    }

    #[test]
    fn test_chained_formulas() {
        let book = book_with(&[
            ("Sheet1", "A1", "2"),
            ("Sheet1", "A2", "=A1*3"),
            ("Sheet1", "A3", "=A2+A1"),
        ]);
        assert_eq!(eval(&book, "Sheet1", "A3"), Value::Number(8.0));
    }

    #[test]
    fn test_cross_sheet_reference() {
        let book = book_with(&[
            ("Other Sheet", "B2", "5"),
            ("Sheet1", "A1", "='Other Sheet'!B2*2"),
            ("Sheet1", "A2", "=Missing!A1"),
        ]);
        assert_eq!(eval(&book, "Sheet1", "A1"), Value::Number(10.0));
        assert_eq!(eval(&book, "Sheet1", "A2").error_kind(), Some(ErrorValue::Ref));
    }

    #[test]
    fn test_cycles_are_ref_errors() {
        let book = book_with(&[
            ("Sheet1", "A1", "=A1"),
            ("Sheet1", "A2", "=A1"),
            ("Sheet1", "A3", "=A4"),
            ("Sheet1", "A4", "=A3"),
        ]);
        let engine = FormulaEngine::new();
        let evaluator = Evaluator::new(&book, &engine);
        let sheet = book.sheet("Sheet1").unwrap();
        for a1 in ["A1", "A2", "A3", "A4"] {
            let value = evaluator.value(sheet, CellAddress::from_a1(a1).unwrap());
            assert_eq!(value.error_kind(), Some(ErrorValue::Ref), "{a1}");
        }
    }

    #[test]
    fn test_cycle_through_range_spares_other_cells() {
        let book = book_with(&[
            ("Sheet1", "B1", "1"),
            ("Sheet1", "B2", "2"),
            ("Sheet1", "B3", "=SUM(B1:B2)"),
            ("Sheet1", "B4", "=SUM(B1:B4)"),
        ]);
        assert_eq!(eval(&book, "Sheet1", "B4").error_kind(), Some(ErrorValue::Ref));
        assert_eq!(eval(&book, "Sheet1", "B3"), Value::Number(3.0));

        let engine = FormulaEngine::new();
        let evaluator = Evaluator::new(&book, &engine);
        let values = evaluator.evaluate_sheet(book.sheet("Sheet1").unwrap());
        assert_eq!(values[&CellAddress::from_a1("B3").unwrap()], Value::Number(3.0));
        assert!(values[&CellAddress::from_a1("B4").unwrap()].is_error());
    }

    fn running_total(rows: u32) -> Book {
        let mut book = book_with(&[("Sheet1", "A1", "1")]);
        let sheet = book.sheet_mut("Sheet1").unwrap();
        for row in 2..=rows {
            sheet.set_cell(
                CellAddress::new(row, 1),
                CellContent::formula(format!("=A{}+1", row - 1)),
            );
        }
        book
    }

    #[test]
    fn test_long_chain_evaluates_without_recursion() {
        let book = running_total(10_000);
        assert_eq!(eval(&book, "Sheet1", "A10000"), Value::Number(10_000.0));
    }

    #[test]
    fn test_long_cycle_marks_every_member() {
        let mut book = running_total(10_000);
        book.sheet_mut("Sheet1")
            .unwrap()
            .set_cell(CellAddress::new(1, 1), CellContent::formula("=A10000"));
        let engine = FormulaEngine::new();
        let evaluator = Evaluator::new(&book, &engine);
        let sheet = book.sheet("Sheet1").unwrap();
        for row in [1, 5_000, 10_000] {
            let value = evaluator.value(sheet, CellAddress::new(row, 1));
            assert_eq!(value.error_kind(), Some(ErrorValue::Ref), "A{row}");
        }
    }

    #[test]
    fn test_parse_error_is_error_value() {
        let book = book_with(&[("Sheet1", "A1", "=SUM(")]);
        assert_eq!(eval(&book, "Sheet1", "A1").error_kind(), Some(ErrorValue::Error));
    }

    #[test]
    fn test_range_in_scalar_position_takes_top_left() {
        let book = book_with(&[
            ("Sheet1", "A1", "7"),
            ("Sheet1", "A2", "8"),
            ("Sheet1", "B1", "=A1:A2"),
        ]);
        assert_eq!(eval(&book, "Sheet1", "B1"), Value::Number(7.0));
    }
}
