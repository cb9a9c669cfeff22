//! Walkthrough of the workbook model: formulas, structural edits, filters,
//! sort and undo.
//!
//! Run with: cargo run --example sheet_demo -p gridcalc-sheet

use gridcalc_primitives::{Area, CellAddress, Value};
use gridcalc_sheet::{
    CellContent, CsvOptions, FilterMode, Predicate, SortDirection, Spreadsheet,
};

fn show(book: &Spreadsheet, title: &str) -> Result<(), Box<dyn std::error::Error>> {
    println!("--- {title} ---");
    print!(
        "{}",
        book.to_delimited("Sheet1", true, &CsvOptions::default())?
    );
    println!();
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== gridcalc sheet demo ===\n");

    let mut book = Spreadsheet::default();
    let data = "Name,Score,Bonus\nalice,92,=B2/2\nbob,67,=B3/2\ncarol,75,=B4/2\n";
    book.import_csv(
        "Sheet1",
        data.as_bytes(),
        &CsvOptions::default().with_headers(true),
    )?;
    book.write("Sheet1", "B6", "=SUM(B2:B4)")?;
    show(&book, "Loaded")?;

    // =========================================================================
    // Structural edits keep formulas pointing at the same data
    // =========================================================================
    book.insert_rows("Sheet1", 3, 1)?;
    book.write_cells(
        "Sheet1",
        [
            (CellAddress::new(3, 1), "dave".into()),
            (CellAddress::new(3, 2), CellContent::parse("81")),
        ],
    )?;
    println!(
        "B7 now reads {}\n",
        book.cell_text("Sheet1", CellAddress::new(7, 2), false)?
    );
    show(&book, "After inserting a row")?;

    // =========================================================================
    // Filter and sort
    // =========================================================================
    book.apply_filter(
        "Sheet1",
        2,
        vec![Predicate::Gte(Value::Number(75.0))],
        FilterMode::And,
    )?;
    let visible = book.select("Sheet1", Area::parse("A1:A5")?)?;
    println!("Visible names: {visible:?}\n");
    book.reset_filter("Sheet1", None)?;

    book.sort_rows("Sheet1", 2, SortDirection::Descending, 2, 5)?;
    show(&book, "Sorted by score")?;

    // =========================================================================
    // History
    // =========================================================================
    for entry in book.history().entries() {
        println!("history: {}", entry.label);
    }
    while book.undo().is_some() {}
    show(&book, "Everything undone")?;

    Ok(())
}
