//! Command language shared by `-e`, script files and the REPL.
//!
//! Every command works on the active sheet. Cells and areas use A1
//! notation; columns accept either letters (`C`) or 1-based numbers (`3`).

use anyhow::{anyhow, bail, Context, Result};
use gridcalc_formulas::balance_formula;
use gridcalc_primitives::{column_letters_to_index, Area, CellAddress, Value};
use gridcalc_sheet::{Clipboard, FilterMode, Predicate, SortDirection, Spreadsheet, Update};
use gridcalc_utils::parse_value;

/// A parsed command line.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Set { cell: CellAddress, input: String },
    Clear(Area),
    InsertRows { at: u32, count: u32 },
    InsertCols { at: u32, count: u32 },
    RemoveRows(Vec<u32>),
    RemoveCols(Vec<u32>),
    Move {
        area: Area,
        sheet: Option<String>,
        dst: CellAddress,
    },
    Copy(Area),
    Cut(Area),
    Paste(CellAddress),
    Fill { source: Area, target: Area },
    Sort {
        col: u32,
        direction: SortDirection,
        from: Option<u32>,
        to: Option<u32>,
    },
    Filter {
        col: u32,
        predicates: Vec<Predicate>,
        mode: FilterMode,
    },
    ResetFilter(Option<u32>),
    Width { col: u32, size: f64 },
    Height { row: u32, size: f64 },
    Undo,
    Redo,
    AddSheet(String),
    UseSheet(String),
    RenameSheet { from: String, to: String },
    RemoveSheet(String),
    ListSheets,
    Get(CellAddress),
    Print(Option<Area>),
}

impl Command {
    /// Parse one command line.
    pub fn parse(line: &str) -> Result<Command> {
        let (name, rest) = split_first_word(line.trim());
        let name = name.to_ascii_lowercase();

        // `set` keeps the remainder verbatim so formulas can contain spaces
        if name == "set" {
            let (cell, input) = split_first_word(rest);
            return Ok(Command::Set {
                cell: parse_cell(cell)?,
                input: input.to_string(),
            });
        }

        let args = split_args(rest)?;
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let command = match (name.as_str(), args.as_slice()) {
            ("clear", [area]) => Command::Clear(parse_area(area)?),
            ("insert-rows", [at]) => Command::InsertRows {
                at: parse_row(at)?,
                count: 1,
            },
            ("insert-rows", [at, count]) => Command::InsertRows {
                at: parse_row(at)?,
                count: parse_count(count)?,
            },
            ("insert-cols", [at]) => Command::InsertCols {
                at: parse_col(at)?,
                count: 1,
            },
            ("insert-cols", [at, count]) => Command::InsertCols {
                at: parse_col(at)?,
                count: parse_count(count)?,
            },
            ("remove-rows", items) if !items.is_empty() => {
                Command::RemoveRows(parse_index_list(items, parse_row)?)
            }
            ("remove-cols", items) if !items.is_empty() => {
                Command::RemoveCols(parse_index_list(items, parse_col)?)
            }
            ("move", [area, dst]) => {
                let (sheet, dst) = parse_destination(dst)?;
                Command::Move {
                    area: parse_area(area)?,
                    sheet,
                    dst,
                }
            }
            ("copy", [area]) => Command::Copy(parse_area(area)?),
            ("cut", [area]) => Command::Cut(parse_area(area)?),
            ("paste", [cell]) => Command::Paste(parse_cell(cell)?),
            ("fill", [source, target]) => Command::Fill {
                source: parse_area(source)?,
                target: parse_area(target)?,
            },
            ("sort", [col, options @ ..]) => parse_sort(col, options)?,
            ("filter", [col, conditions @ ..]) if !conditions.is_empty() => {
                let (predicates, mode) = parse_conditions(conditions)?;
                Command::Filter {
                    col: parse_col(col)?,
                    predicates,
                    mode,
                }
            }
            ("reset-filter", []) => Command::ResetFilter(None),
            ("reset-filter", [col]) => Command::ResetFilter(Some(parse_col(col)?)),
            ("width", [col, size]) => Command::Width {
                col: parse_col(col)?,
                size: parse_size(size)?,
            },
            ("height", [row, size]) => Command::Height {
                row: parse_row(row)?,
                size: parse_size(size)?,
            },
            ("undo", []) => Command::Undo,
            ("redo", []) => Command::Redo,
            ("sheet", ["add", name]) => Command::AddSheet((*name).to_string()),
            ("sheet", ["use", name]) => Command::UseSheet((*name).to_string()),
            ("sheet", ["rename", from, to]) => Command::RenameSheet {
                from: (*from).to_string(),
                to: (*to).to_string(),
            },
            ("sheet", ["remove", name]) => Command::RemoveSheet((*name).to_string()),
            ("sheet", ["list"]) | ("sheets", []) => Command::ListSheets,
            ("get", [cell]) => Command::Get(parse_cell(cell)?),
            ("print", []) => Command::Print(None),
            ("print", [area]) => Command::Print(Some(parse_area(area)?)),
            ("", _) => bail!("Empty command"),
            (other, _) if is_known(other) => bail!("Wrong arguments for '{other}'; try :help"),
            (other, _) => bail!("Unknown command '{other}'"),
        };
        Ok(command)
    }

    /// Whether the command prints something on its own.
    pub fn produces_output(&self) -> bool {
        matches!(
            self,
            Command::Get(_) | Command::Print(_) | Command::ListSheets
        )
    }
}

const COMMANDS: &[&str] = &[
    "set",
    "clear",
    "insert-rows",
    "insert-cols",
    "remove-rows",
    "remove-cols",
    "move",
    "copy",
    "cut",
    "paste",
    "fill",
    "sort",
    "filter",
    "reset-filter",
    "width",
    "height",
    "undo",
    "redo",
    "sheet",
    "sheets",
    "get",
    "print",
];

fn is_known(name: &str) -> bool {
    COMMANDS.contains(&name)
}

fn split_first_word(s: &str) -> (&str, &str) {
    let s = s.trim_start();
    match s.find(char::is_whitespace) {
        Some(pos) => (&s[..pos], s[pos..].trim_start()),
        None => (s, ""),
    }
}

/// Split on whitespace; single or double quotes group words and are removed.
fn split_args(s: &str) -> Result<Vec<String>> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;

    for ch in s.chars() {
        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), c) => current.push(c),
            (None, '\'' | '"') => {
                quote = Some(ch);
                in_token = true;
            }
            (None, c) if c.is_whitespace() => {
                if in_token {
                    args.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            (None, c) => {
                current.push(c);
                in_token = true;
            }
        }
    }
    if let Some(q) = quote {
        bail!("Unterminated {q} quote");
    }
    if in_token {
        args.push(current);
    }
    Ok(args)
}

fn parse_cell(s: &str) -> Result<CellAddress> {
    CellAddress::from_a1(s).with_context(|| format!("Invalid cell '{s}'"))
}

fn parse_area(s: &str) -> Result<Area> {
    Area::parse(s).with_context(|| format!("Invalid range '{s}'"))
}

fn parse_row(s: &str) -> Result<u32> {
    match s.parse::<u32>() {
        Ok(row) if row > 0 => Ok(row),
        _ => bail!("Invalid row '{s}'"),
    }
}

/// Column letters or a 1-based column number.
fn parse_col(s: &str) -> Result<u32> {
    if let Ok(col) = s.parse::<u32>() {
        if col > 0 {
            return Ok(col);
        }
        bail!("Invalid column '{s}'");
    }
    column_letters_to_index(s).with_context(|| format!("Invalid column '{s}'"))
}

fn parse_count(s: &str) -> Result<u32> {
    s.parse::<u32>()
        .with_context(|| format!("Invalid count '{s}'"))
}

fn parse_size(s: &str) -> Result<f64> {
    s.parse::<f64>()
        .with_context(|| format!("Invalid size '{s}'"))
}

/// `2,4-6 9` style lists of indices; `-` and `:` both mark a span.
fn parse_index_list(items: &[&str], parse: fn(&str) -> Result<u32>) -> Result<Vec<u32>> {
    let mut indices = Vec::new();
    for part in items.iter().flat_map(|item| item.split(',')) {
        if part.is_empty() {
            continue;
        }
        match part.split_once(['-', ':']) {
            Some((start, end)) => {
                let (start, end) = (parse(start)?, parse(end)?);
                if start > end {
                    bail!("Invalid span '{part}'");
                }
                indices.extend(start..=end);
            }
            None => indices.push(parse(part)?),
        }
    }
    Ok(indices)
}

/// `C5` or `Sheet2!C5`; quotes around the sheet name are already stripped.
fn parse_destination(s: &str) -> Result<(Option<String>, CellAddress)> {
    match s.rsplit_once('!') {
        Some((sheet, cell)) => Ok((Some(sheet.to_string()), parse_cell(cell)?)),
        None => Ok((None, parse_cell(s)?)),
    }
}

fn parse_sort(col: &str, options: &[&str]) -> Result<Command> {
    let mut direction = SortDirection::Ascending;
    let mut from = None;
    let mut to = None;
    let mut iter = options.iter();
    while let Some(option) = iter.next() {
        match *option {
            "--from" => {
                let value = iter.next().ok_or_else(|| anyhow!("--from needs a row"))?;
                from = Some(parse_row(value)?);
            }
            "--to" => {
                let value = iter.next().ok_or_else(|| anyhow!("--to needs a row"))?;
                to = Some(parse_row(value)?);
            }
            other => direction = other.parse().map_err(|e: String| anyhow!(e))?,
        }
    }
    Ok(Command::Sort {
        col: parse_col(col)?,
        direction,
        from,
        to,
    })
}

/// `gte 75 and lte 90`, `includes york`, `blank or eq 0`.
fn parse_conditions(tokens: &[&str]) -> Result<(Vec<Predicate>, FilterMode)> {
    let mut predicates = Vec::new();
    let mut mode: Option<FilterMode> = None;
    let mut iter = tokens.iter();

    loop {
        let op = iter.next().ok_or_else(|| anyhow!("Missing filter condition"))?;
        let op = op.to_ascii_lowercase();
        let mut operand = || {
            iter.next()
                .map(|s| (*s).to_string())
                .ok_or_else(|| anyhow!("'{op}' needs a value"))
        };
        let predicate = match op.as_str() {
            "eq" | "=" | "==" => Predicate::Eq(parse_value(&operand()?)),
            "ne" | "<>" | "!=" => Predicate::Ne(parse_value(&operand()?)),
            "gt" | ">" => Predicate::Gt(parse_value(&operand()?)),
            "gte" | ">=" => Predicate::Gte(parse_value(&operand()?)),
            "lt" | "<" => Predicate::Lt(parse_value(&operand()?)),
            "lte" | "<=" => Predicate::Lte(parse_value(&operand()?)),
            "includes" | "contains" => Predicate::Includes(operand()?),
            "starts-with" | "startswith" => Predicate::StartsWith(operand()?),
            "regex" | "matches" => Predicate::Regex(operand()?),
            "blank" | "empty" => Predicate::Blank,
            "not-blank" | "nonblank" => Predicate::NotBlank,
            other => bail!("Unknown filter condition '{other}'"),
        };
        predicates.push(predicate);

        let Some(connector) = iter.next() else {
            break;
        };
        let next = match connector.to_ascii_lowercase().as_str() {
            "and" => FilterMode::And,
            "or" => FilterMode::Or,
            other => bail!("Expected 'and' or 'or', found '{other}'"),
        };
        match mode {
            Some(current) if current != next => bail!("Cannot mix 'and' with 'or' in one filter"),
            _ => mode = Some(next),
        }
    }
    Ok((predicates, mode.unwrap_or_default()))
}

/// What a command produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// An edit or navigation with a short report
    Message(String),
    /// A single cell read by `get`
    Cell { value: Value, raw: String },
    /// A request to print the active sheet, optionally one area of it
    Print(Option<Area>),
    Sheets(Vec<String>),
}

/// A workbook plus the state the command language keeps between lines.
pub struct Session {
    book: Spreadsheet,
    active: String,
    clipboard: Option<Clipboard>,
}

impl Session {
    pub fn new(book: Spreadsheet) -> Self {
        let active = book
            .sheet_names()
            .first()
            .map(|name| (*name).to_string())
            .unwrap_or_default();
        Session {
            book,
            active,
            clipboard: None,
        }
    }

    /// Get the workbook
    #[must_use]
    pub fn book(&self) -> &Spreadsheet {
        &self.book
    }

    /// Get the workbook for direct edits such as CSV import
    pub fn book_mut(&mut self) -> &mut Spreadsheet {
        &mut self.book
    }

    /// Get the name of the active sheet
    #[must_use]
    pub fn active(&self) -> &str {
        &self.active
    }

    /// Parse and run one line.
    pub fn execute(&mut self, line: &str) -> Result<Outcome> {
        let command = Command::parse(line)?;
        tracing::debug!(?command, sheet = %self.active, "executing");
        self.run(command)
    }

    pub fn run(&mut self, command: Command) -> Result<Outcome> {
        let sheet = self.active.clone();
        let sheet = sheet.as_str();
        let update = match command {
            Command::Set { cell, input } => {
                let input = if input.starts_with('=') {
                    balance_formula(&input)
                } else {
                    input
                };
                self.book.write(sheet, &cell.to_a1(), &input)?
            }
            Command::Clear(area) => self.book.clear_range(sheet, area)?,
            Command::InsertRows { at, count } => self.book.insert_rows(sheet, at, count)?,
            Command::InsertCols { at, count } => self.book.insert_cols(sheet, at, count)?,
            Command::RemoveRows(rows) => self.book.remove_rows(sheet, &rows)?,
            Command::RemoveCols(cols) => self.book.remove_cols(sheet, &cols)?,
            Command::Move {
                area,
                sheet: dst_sheet,
                dst,
            } => {
                let dst_sheet = dst_sheet.as_deref().unwrap_or(sheet);
                self.book.move_range(sheet, area, dst_sheet, dst)?
            }
            Command::Copy(area) => {
                let clipboard = self.book.copy_range(sheet, area)?;
                let message = format!(
                    "Copied {} row(s) x {} column(s)",
                    clipboard.height(),
                    clipboard.width()
                );
                self.clipboard = Some(clipboard);
                return Ok(Outcome::Message(message));
            }
            Command::Cut(area) => {
                let (clipboard, update) = self.book.cut_range(sheet, area)?;
                self.clipboard = Some(clipboard);
                update
            }
            Command::Paste(dst) => {
                let clipboard = self
                    .clipboard
                    .as_ref()
                    .ok_or_else(|| anyhow!("Clipboard is empty; copy or cut first"))?;
                self.book.paste(sheet, dst, clipboard)?
            }
            Command::Fill { source, target } => self.book.autofill(sheet, source, target)?,
            Command::Sort {
                col,
                direction,
                from,
                to,
            } => match (from, to) {
                (None, None) => self.book.sort_by(sheet, col, direction)?,
                (from, to) => {
                    let top = from.unwrap_or(1);
                    let bottom = match to {
                        Some(row) => row,
                        None => self.book.sheet(sheet)?.used_extent().0.max(top),
                    };
                    self.book.sort_rows(sheet, col, direction, top, bottom)?
                }
            },
            Command::Filter {
                col,
                predicates,
                mode,
            } => self.book.apply_filter(sheet, col, predicates, mode)?,
            Command::ResetFilter(col) => self.book.reset_filter(sheet, col)?,
            Command::Width { col, size } => self.book.set_column_width(sheet, col, size)?,
            Command::Height { row, size } => self.book.set_row_height(sheet, row, size)?,
            Command::Undo => {
                return Ok(Outcome::Message(match self.book.undo() {
                    Some(update) => format!("Undone: {}", describe(&update)),
                    None => "Nothing to undo".to_string(),
                }));
            }
            Command::Redo => {
                return Ok(Outcome::Message(match self.book.redo() {
                    Some(update) => format!("Redone: {}", describe(&update)),
                    None => "Nothing to redo".to_string(),
                }));
            }
            Command::AddSheet(name) => {
                self.book.add_sheet(&name)?;
                return Ok(Outcome::Message(format!("Added sheet '{name}'")));
            }
            Command::UseSheet(name) => {
                self.active = self.book.sheet(&name)?.name().to_string();
                return Ok(Outcome::Message(format!("Using sheet '{}'", self.active)));
            }
            Command::RenameSheet { from, to } => {
                let renaming_active = self.book.sheet(&from)?.name() == self.active;
                self.book.rename_sheet(&from, &to)?;
                if renaming_active {
                    self.active.clone_from(&to);
                }
                return Ok(Outcome::Message(format!("Renamed '{from}' to '{to}'")));
            }
            Command::RemoveSheet(name) => {
                let removing_active = self.book.sheet(&name)?.name() == self.active;
                self.book.remove_sheet(&name)?;
                if removing_active {
                    self.active = self
                        .book
                        .sheet_names()
                        .first()
                        .map(|n| (*n).to_string())
                        .unwrap_or_default();
                }
                return Ok(Outcome::Message(format!("Removed sheet '{name}'")));
            }
            Command::ListSheets => {
                let names = self.book.sheet_names().iter().map(|n| (*n).to_string()).collect();
                return Ok(Outcome::Sheets(names));
            }
            Command::Get(cell) => {
                return Ok(Outcome::Cell {
                    value: self.book.value(sheet, cell)?,
                    raw: self.book.cell_text(sheet, cell, false)?,
                });
            }
            Command::Print(area) => return Ok(Outcome::Print(area)),
        };
        Ok(Outcome::Message(describe(&update)))
    }
}

fn describe(update: &Update) -> String {
    let changes = &update.changes;
    if changes.is_empty() {
        return "No changes".to_string();
    }
    let mut parts = vec![format!("{} cell(s) changed", changes.cells.len())];
    if changes.layout_changed {
        parts.push("layout updated".to_string());
    }
    if !changes.other_sheets.is_empty() {
        parts.push(format!("{} other sheet(s) updated", changes.other_sheets.len()));
    }
    parts.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn a1(s: &str) -> CellAddress {
        CellAddress::from_a1(s).unwrap()
    }

    fn session() -> Session {
        Session::new(Spreadsheet::default())
    }

    fn run_all(session: &mut Session, lines: &[&str]) {
        for line in lines {
            session
                .execute(line)
                .unwrap_or_else(|e| panic!("{line}: {e}"));
        }
    }

    fn get(session: &mut Session, cell: &str) -> Value {
        match session.execute(&format!("get {cell}")).unwrap() {
            Outcome::Cell { value, .. } => value,
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    // ===== Parsing =====

    #[test]
    fn test_parse_set_keeps_formula_text() {
        assert_eq!(
            Command::parse("set B2 =SUM(A1:A3) + 1").unwrap(),
            Command::Set {
                cell: a1("B2"),
                input: "=SUM(A1:A3) + 1".to_string()
            }
        );
    }

    #[test]
    fn test_parse_structural_commands() {
        assert_eq!(
            Command::parse("insert-rows 3").unwrap(),
            Command::InsertRows { at: 3, count: 1 }
        );
        assert_eq!(
            Command::parse("insert-cols C 2").unwrap(),
            Command::InsertCols { at: 3, count: 2 }
        );
        assert_eq!(
            Command::parse("remove-rows 2,4-6 9").unwrap(),
            Command::RemoveRows(vec![2, 4, 5, 6, 9])
        );
        assert_eq!(
            Command::parse("remove-cols b:c").unwrap(),
            Command::RemoveCols(vec![2, 3])
        );
    }

    #[test]
    fn test_parse_move_destination_sheet() {
        assert_eq!(
            Command::parse("move A1:B2 'Q1 Sales'!C5").unwrap(),
            Command::Move {
                area: Area::parse("A1:B2").unwrap(),
                sheet: Some("Q1 Sales".to_string()),
                dst: a1("C5"),
            }
        );
    }

    #[test]
    fn test_parse_sort_options() {
        assert_eq!(
            Command::parse("sort C desc --from 2").unwrap(),
            Command::Sort {
                col: 3,
                direction: SortDirection::Descending,
                from: Some(2),
                to: None,
            }
        );
        assert!(Command::parse("sort C sideways").is_err());
    }

    #[test]
    fn test_parse_filter_conditions() {
        assert_eq!(
            Command::parse("filter C gte 75 and lt 90").unwrap(),
            Command::Filter {
                col: 3,
                predicates: vec![
                    Predicate::Gte(Value::Number(75.0)),
                    Predicate::Lt(Value::Number(90.0)),
                ],
                mode: FilterMode::And,
            }
        );
        assert_eq!(
            Command::parse("filter A includes \"new york\" or blank").unwrap(),
            Command::Filter {
                col: 1,
                predicates: vec![Predicate::Includes("new york".to_string()), Predicate::Blank],
                mode: FilterMode::Or,
            }
        );
        assert!(Command::parse("filter A eq 1 and eq 2 or eq 3").is_err());
        assert!(Command::parse("filter A gte").is_err());
    }

    #[test]
    fn test_parse_errors() {
        assert!(Command::parse("frobnicate A1").is_err());
        assert!(Command::parse("clear").is_err());
        assert!(Command::parse("get A0").is_err());
        assert!(Command::parse("sheet add 'unterminated").is_err());
    }

    // ===== Execution =====

    #[test]
    fn test_set_balances_formulas() {
        let mut s = session();
        run_all(&mut s, &["set A1 4", "set A2 6", "set A3 =SUM(A1:A2"]);
        assert_eq!(get(&mut s, "A3"), Value::Number(10.0));
        match s.execute("get A3").unwrap() {
            Outcome::Cell { raw, .. } => assert_eq!(raw, "=SUM(A1:A2)"),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn test_copy_paste_and_undo() {
        let mut s = session();
        run_all(&mut s, &["set A1 1", "set B1 =A1*10", "copy A1:B1", "paste A2"]);
        assert_eq!(get(&mut s, "A2"), Value::Number(1.0));
        assert_eq!(get(&mut s, "B2"), Value::Number(10.0));

        run_all(&mut s, &["undo"]);
        assert_eq!(get(&mut s, "B2"), Value::Blank);
        assert_eq!(get(&mut s, "B1"), Value::Number(10.0));
    }

    #[test]
    fn test_paste_without_clipboard_fails() {
        let mut s = session();
        assert!(s.execute("paste A1").is_err());
    }

    #[test]
    fn test_filter_sort_and_reset() {
        let mut s = session();
        run_all(
            &mut s,
            &[
                "set A1 Name",
                "set B1 Score",
                "set A2 bob",
                "set B2 67",
                "set A3 alice",
                "set B3 92",
                "set A4 carol",
                "set B4 75",
                "sort B desc --from 2",
            ],
        );
        assert_eq!(get(&mut s, "A2"), Value::from("alice"));
        assert_eq!(get(&mut s, "A1"), Value::from("Name"));

        run_all(&mut s, &["filter B gte 75"]);
        let sheet = s.book().sheet("Sheet1").unwrap();
        assert!(sheet.is_row_hidden(1));
        assert!(sheet.is_row_hidden(4));
        assert!(!sheet.is_row_hidden(3));

        run_all(&mut s, &["reset-filter"]);
        assert!(!s.book().sheet("Sheet1").unwrap().is_row_hidden(4));
    }

    #[test]
    fn test_undo_redo_messages() {
        let mut s = session();
        assert_eq!(
            s.execute("undo").unwrap(),
            Outcome::Message("Nothing to undo".to_string())
        );
        run_all(&mut s, &["set A1 5"]);
        assert_eq!(
            s.execute("undo").unwrap(),
            Outcome::Message("Undone: 1 cell(s) changed".to_string())
        );
        assert_eq!(get(&mut s, "A1"), Value::Blank);
        run_all(&mut s, &["redo"]);
        assert_eq!(get(&mut s, "A1"), Value::Number(5.0));
    }

    #[test]
    fn test_sheet_commands_track_active_sheet() {
        let mut s = session();
        run_all(
            &mut s,
            &["sheet add Data", "sheet use data", "set A1 7", "sheet rename Data Inputs"],
        );
        assert_eq!(s.active(), "Inputs");

        run_all(&mut s, &["sheet use Sheet1", "set A1 =Inputs!A1*2"]);
        assert_eq!(get(&mut s, "A1"), Value::Number(14.0));

        run_all(&mut s, &["sheet use Inputs", "sheet remove Inputs"]);
        assert_eq!(s.active(), "Sheet1");
        assert_eq!(
            s.execute("sheets").unwrap(),
            Outcome::Sheets(vec!["Sheet1".to_string()])
        );
    }

    #[test]
    fn test_move_to_other_sheet() {
        let mut s = session();
        run_all(
            &mut s,
            &[
                "sheet add Archive",
                "set A1 10",
                "set A2 =A1*2",
                "move A2 Archive!C5",
            ],
        );
        assert_eq!(s.book().value_a1("Archive", "C5").unwrap(), Value::Number(20.0));
        assert_eq!(get(&mut s, "A2"), Value::Blank);
    }

    #[test]
    fn test_fill_and_layout() {
        let mut s = session();
        run_all(&mut s, &["set A1 1", "set A2 3", "fill A1:A2 A3:A4", "width A 120", "height 2 30"]);
        assert_eq!(get(&mut s, "A4"), Value::Number(7.0));
        let layout = s.book().sheet("Sheet1").unwrap().layout().clone();
        assert_eq!(layout.col_width(1), 120.0);
        assert_eq!(layout.row_height(2), 30.0);
        assert!(s.execute("width A -5").is_err());
    }

    #[test]
    fn test_print_is_deferred_to_caller() {
        let mut s = session();
        assert_eq!(s.execute("print").unwrap(), Outcome::Print(None));
        assert!(Command::parse("print").unwrap().produces_output());
        assert!(!Command::parse("set A1 1").unwrap().produces_output());
    }
}
