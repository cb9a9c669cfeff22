//! # gridcalc-cli
//!
//! Command-line front end for the gridcalc workbook engine.

mod commands;

use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use gridcalc_primitives::{column_index_to_letters, Area, CellAddress, Value};
use gridcalc_sheet::{CsvOptions, EngineOptions, Spreadsheet};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing_subscriber::EnvFilter;

use crate::commands::{Outcome, Session};

/// gridcalc - spreadsheet formulas and table edits from the terminal
#[derive(Parser)]
#[command(name = "gridcalc")]
#[command(author, version, about = "Spreadsheet engine with undoable table edits", long_about = None)]
struct Cli {
    /// CSV or TSV file loaded into Sheet1
    #[arg(value_name = "FILE")]
    file: Option<PathBuf>,

    /// Command to run; may be repeated
    #[arg(short = 'e', long = "execute", value_name = "CMD")]
    execute: Vec<String>,

    /// File of commands, one per line
    #[arg(short = 's', long = "script", value_name = "SCRIPT")]
    script: Option<PathBuf>,

    /// Start REPL mode
    #[arg(short = 'i', long = "interactive")]
    interactive: bool,

    /// Print stored cell text instead of evaluated values
    #[arg(long)]
    raw: bool,

    /// Treat the first row of FILE as header text
    #[arg(long)]
    headers: bool,

    /// Output format (json, csv, table)
    #[arg(short = 'f', long = "format", default_value = "table")]
    format: OutputFormat,

    /// Engine options as JSON
    #[arg(long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

/// Output format for results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    /// JSON output
    Json,
    /// CSV output
    Csv,
    /// Pretty table output (default)
    #[default]
    Table,
}

/// How results are printed.
#[derive(Debug, Clone, Copy, Default)]
struct Output {
    format: OutputFormat,
    raw: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .init();
    }

    let options = match &cli.config {
        Some(path) => load_config(path)?,
        None => EngineOptions::default(),
    };
    let mut session = Session::new(Spreadsheet::new(options));
    let output = Output {
        format: cli.format,
        raw: cli.raw,
    };

    if let Some(file) = &cli.file {
        load_csv(&mut session, file, cli.headers)?;
    }

    let mut printed = false;
    for (n, line) in cli.execute.iter().enumerate() {
        printed |= run_line(&mut session, line, output)
            .with_context(|| format!("Command {} failed: {line}", n + 1))?;
    }
    if let Some(script) = &cli.script {
        let source = std::fs::read_to_string(script)
            .with_context(|| format!("Failed to read file: {}", script.display()))?;
        printed |= run_script(&mut session, &source, output)?;
    }

    let batch = cli.file.is_some() || !cli.execute.is_empty() || cli.script.is_some();
    if cli.interactive || !batch {
        run_repl(&mut session, output)
    } else {
        if !printed {
            print_sheet(&session, None, output)?;
        }
        Ok(())
    }
}

/// Read engine options from a JSON file; missing fields keep their defaults.
fn load_config(path: &Path) -> Result<EngineOptions> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read file: {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid config: {}", path.display()))
}

/// Load delimited text into the active sheet; `.tsv` files split on tabs.
fn load_csv(session: &mut Session, path: &Path, headers: bool) -> Result<()> {
    let is_tsv = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("tsv"));
    let options = if is_tsv {
        CsvOptions::tsv()
    } else {
        CsvOptions::default()
    }
    .with_headers(headers);

    let file =
        File::open(path).with_context(|| format!("Failed to read file: {}", path.display()))?;
    let sheet = session.active().to_string();
    let update = session
        .book_mut()
        .import_csv(&sheet, file, &options)
        .with_context(|| format!("Failed to load {}", path.display()))?;
    tracing::info!(
        path = %path.display(),
        cells = update.changes.cells.len(),
        "loaded sheet"
    );
    Ok(())
}

/// Run one command and print what it produced. Returns whether it printed
/// sheet contents or a cell.
fn run_line(session: &mut Session, line: &str, output: Output) -> Result<bool> {
    let outcome = session.execute(line)?;
    let printed = !matches!(outcome, Outcome::Message(_));
    print_outcome(session, &outcome, output, false)?;
    Ok(printed)
}

/// Run a command file. Blank lines and `#` comments are skipped.
fn run_script(session: &mut Session, source: &str, output: Output) -> Result<bool> {
    let mut printed = false;
    for (n, line) in source.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        printed |= run_line(session, line, output)
            .with_context(|| format!("Line {}: {line}", n + 1))?;
    }
    Ok(printed)
}

/// Run the REPL.
fn run_repl(session: &mut Session, output: Output) -> Result<()> {
    println!(
        "{} {} - Interactive Mode",
        "gridcalc".cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!(
        "Type {} for help, {} to exit\n",
        ":help".yellow(),
        ":quit".yellow()
    );

    let mut rl = DefaultEditor::new()?;
    let history_path = dirs_history_path();

    if let Some(ref path) = history_path {
        let _ = rl.load_history(path);
    }

    loop {
        let prompt = format!("{}> ", session.active()).green().bold().to_string();

        match rl.readline(&prompt) {
            Ok(line) => {
                let line = line.trim();

                if line.is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(line);

                if line.starts_with(':') {
                    match line {
                        ":quit" | ":q" | ":exit" => break,
                        ":help" | ":h" | ":?" => print_help(),
                        ":clear" => print!("\x1B[2J\x1B[1;1H"),
                        ":history" => print_history(session),
                        _ => println!("{} Unknown command: {}", "Error:".red().bold(), line),
                    }
                    continue;
                }

                match session.execute(line) {
                    Ok(outcome) => {
                        if let Err(e) = print_outcome(session, &outcome, output, true) {
                            println!("{} {e}", "Error:".red().bold());
                        }
                    }
                    Err(e) => println!("{} {e:#}", "Error:".red().bold()),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("Goodbye!");
                break;
            }
            Err(e) => {
                println!("{} {e}", "Error:".red().bold());
                break;
            }
        }
    }

    if let Some(ref path) = history_path {
        let _ = rl.save_history(path);
    }

    Ok(())
}

/// Get the history file path.
fn dirs_history_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|mut p| {
        p.push("gridcalc");
        let _ = std::fs::create_dir_all(&p);
        p.push("history.txt");
        p
    })
}

/// Print a command outcome. Edit reports only show up in the REPL.
fn print_outcome(
    session: &Session,
    outcome: &Outcome,
    output: Output,
    interactive: bool,
) -> Result<()> {
    match outcome {
        Outcome::Message(message) => {
            if interactive {
                println!("{}", message.dimmed());
            }
        }
        Outcome::Cell { value, raw } => {
            if output.raw {
                println!("{raw}");
            } else if output.format == OutputFormat::Json {
                println!("{}", value_to_json(value));
            } else {
                println!("{}", format_value(value));
            }
        }
        Outcome::Sheets(names) => {
            for name in names {
                if name == session.active() {
                    println!("{} {}", "*".green().bold(), name.bold());
                } else {
                    println!("  {name}");
                }
            }
        }
        Outcome::Print(area) => print_sheet(session, *area, output)?,
    }
    Ok(())
}

/// The visible part of a sheet, ready for printing.
#[derive(Debug, Clone, PartialEq)]
struct Grid {
    cols: Vec<u32>,
    rows: Vec<(u32, Vec<Value>)>,
}

/// Collect the visible rows of `area`, or of the used part of the sheet.
/// Raw mode yields stored text in place of evaluated values.
fn build_grid(book: &Spreadsheet, sheet: &str, area: Option<Area>, raw: bool) -> Result<Grid> {
    let target = book.sheet(sheet)?;
    let (last_row, last_col) = target.used_extent();
    let area = match area {
        Some(mut area) => {
            if area.is_whole_columns() {
                area.bottom = last_row.max(area.top);
            }
            if area.is_whole_rows() {
                area.right = last_col.max(area.left);
            }
            area
        }
        None if last_row == 0 || last_col == 0 => {
            return Ok(Grid {
                cols: Vec::new(),
                rows: Vec::new(),
            })
        }
        None => Area::from_bounds(1, 1, last_row, last_col),
    };

    let evaluated: BTreeMap<CellAddress, Value> = if raw {
        BTreeMap::new()
    } else {
        book.evaluate_sheet(sheet)?
    };
    let cols: Vec<u32> = (area.left..=area.right).collect();
    let mut rows = Vec::new();
    for row in target.visible_rows(area.top, area.bottom) {
        let mut values = Vec::with_capacity(cols.len());
        for &col in &cols {
            let addr = CellAddress::new(row, col);
            let value = if raw {
                let text = book.cell_text(sheet, addr, false)?;
                if text.is_empty() {
                    Value::Blank
                } else {
                    Value::Text(text)
                }
            } else {
                evaluated.get(&addr).cloned().unwrap_or_default()
            };
            values.push(value);
        }
        rows.push((row, values));
    }
    Ok(Grid { cols, rows })
}

/// Print the active sheet in the chosen format.
fn print_sheet(session: &Session, area: Option<Area>, output: Output) -> Result<()> {
    let grid = build_grid(session.book(), session.active(), area, output.raw)?;
    match output.format {
        OutputFormat::Table => {
            if grid.rows.is_empty() {
                println!("{}", "(empty)".dimmed());
                return Ok(());
            }
            let lines = table_lines(&grid);
            if let Some((header, body)) = lines.split_first() {
                println!("{}", header.cyan().bold());
                for line in body {
                    println!("{line}");
                }
            }
        }
        OutputFormat::Csv => print!("{}", grid_to_csv(&grid)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&grid_to_json(&grid))?),
    }
    Ok(())
}

/// Plain table text: a header of column letters, then one line per row
/// prefixed with its row number.
fn table_lines(grid: &Grid) -> Vec<String> {
    let texts: Vec<Vec<String>> = grid
        .rows
        .iter()
        .map(|(_, values)| values.iter().map(format_value).collect())
        .collect();
    let headers: Vec<String> = grid
        .cols
        .iter()
        .map(|col| column_index_to_letters(*col))
        .collect();
    let gutter = grid
        .rows
        .last()
        .map_or(1, |(row, _)| row.to_string().len());
    let widths: Vec<usize> = headers
        .iter()
        .enumerate()
        .map(|(i, header)| {
            texts
                .iter()
                .map(|row| row[i].chars().count())
                .chain(std::iter::once(header.len()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let mut lines = Vec::with_capacity(grid.rows.len() + 1);
    let header: Vec<String> = headers
        .iter()
        .zip(&widths)
        .map(|(h, &w)| format!("{h:<w$}"))
        .collect();
    lines.push(format!("{:gutter$} | {}", "", header.join(" | ")).trim_end().to_string());
    for ((row, _), cells) in grid.rows.iter().zip(&texts) {
        let cells: Vec<String> = cells
            .iter()
            .zip(&widths)
            .map(|(text, &w)| format!("{text:<w$}"))
            .collect();
        lines.push(format!("{row:>gutter$} | {}", cells.join(" | ")).trim_end().to_string());
    }
    lines
}

/// Display text of a value.
fn format_value(value: &Value) -> String {
    value.to_text()
}

fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Blank => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Number(n) => serde_json::Number::from_f64(*n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        other => serde_json::Value::String(other.to_text()),
    }
}

/// Rows as objects keyed by column letter, plus their row number.
fn grid_to_json(grid: &Grid) -> serde_json::Value {
    let rows = grid
        .rows
        .iter()
        .map(|(row, values)| {
            let mut obj = serde_json::Map::new();
            obj.insert("row".to_string(), serde_json::Value::from(*row));
            for (col, value) in grid.cols.iter().zip(values) {
                obj.insert(column_index_to_letters(*col), value_to_json(value));
            }
            serde_json::Value::Object(obj)
        })
        .collect();
    serde_json::Value::Array(rows)
}

fn grid_to_csv(grid: &Grid) -> String {
    let mut out = String::new();
    for (_, values) in &grid.rows {
        let fields: Vec<String> = values.iter().map(csv_value).collect();
        out.push_str(&fields.join(","));
        out.push('\n');
    }
    out
}

/// Format a value for CSV output.
fn csv_value(value: &Value) -> String {
    let s = value.to_text();
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s
    }
}

fn print_history(session: &Session) {
    let history = session.book().history();
    if history.is_empty() {
        println!("{}", "(no history)".dimmed());
        return;
    }
    for entry in history.entries() {
        println!(
            "  {} {}",
            entry.timestamp.format("%H:%M:%S").to_string().dimmed(),
            entry.label
        );
    }
}

/// Print REPL help.
fn print_help() {
    println!("{}", "gridcalc REPL Commands:".cyan().bold());
    println!("  {}    Show this help", ":help, :h, :?".yellow());
    println!("  {}  Exit the REPL", ":quit, :q, :exit".yellow());
    println!("  {}       List undoable operations", ":history".yellow());
    println!("  {}         Clear screen", ":clear".yellow());
    println!();
    println!("{}", "Sheet commands:".cyan().bold());
    println!("  set CELL INPUT              write a value or =formula");
    println!("  clear AREA                  clear visible cells");
    println!("  insert-rows ROW [COUNT]     insert-cols COL [COUNT]");
    println!("  remove-rows 2,4-6           remove-cols B:C");
    println!("  move AREA [SHEET!]CELL      copy AREA | cut AREA | paste CELL");
    println!("  fill SOURCE TARGET          extend a series or pattern");
    println!("  sort COL [asc|desc] [--from ROW] [--to ROW]");
    println!("  filter COL gte 75 [and|or lt 90]   reset-filter [COL]");
    println!("  width COL SIZE              height ROW SIZE");
    println!("  undo | redo");
    println!("  sheet add|use|remove NAME   sheet rename OLD NEW   sheets");
    println!("  get CELL                    print [AREA]");
    println!();
    println!("{}", "Examples:".cyan().bold());
    println!("  set A1 10");
    println!("  set A2 =A1*2");
    println!("  filter B gte 75");
}
