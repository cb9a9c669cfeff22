use std::fs::File;

use gridcalc_primitives::{Area, CellAddress, ErrorValue, Value};
use gridcalc_sheet::{Book, CsvOptions, EngineOptions, SheetError, Spreadsheet};
use tempfile::tempdir;

fn a1(s: &str) -> CellAddress {
    CellAddress::from_a1(s).unwrap()
}

fn area(s: &str) -> Area {
    Area::parse(s).unwrap()
}

// ===== Sheets =====

#[test]
fn test_cross_sheet_formulas() {
    let mut book = Spreadsheet::default();
    book.add_sheet("Q1 Sales").unwrap();
    book.write("Q1 Sales", "B2", "250").unwrap();
    book.write("Sheet1", "A1", "='Q1 Sales'!B2/5").unwrap();
    assert_eq!(book.value_a1("Sheet1", "A1").unwrap(), Value::Number(50.0));

    book.insert_rows("Q1 Sales", 1, 1).unwrap();
    assert_eq!(
        book.cell_text("Sheet1", a1("A1"), false).unwrap(),
        "='Q1 Sales'!B3/5"
    );
    assert_eq!(book.value_a1("Sheet1", "A1").unwrap(), Value::Number(50.0));
}

#[test]
fn test_non_ascii_sheet_names_fold_case() {
    let mut book = Spreadsheet::default();
    book.add_sheet("Über").unwrap();
    book.write("Über", "A1", "5").unwrap();
    book.write("Sheet1", "A1", "=über!A1*2").unwrap();
    assert_eq!(book.value_a1("Sheet1", "A1").unwrap(), Value::Number(10.0));

    book.insert_rows("ÜBER", 1, 1).unwrap();
    assert_eq!(
        book.cell_text("Sheet1", a1("A1"), false).unwrap(),
        "='über'!A2*2"
    );
    assert_eq!(book.value_a1("Sheet1", "A1").unwrap(), Value::Number(10.0));
}

#[test]
fn test_rename_leaves_qualifiers_dangling() {
    let mut book = Spreadsheet::default();
    book.add_sheet("Data").unwrap();
    book.write("Data", "A1", "7").unwrap();
    book.write("Sheet1", "A1", "=Data!A1").unwrap();

    book.rename_sheet("Data", "Inputs").unwrap();
    assert_eq!(
        book.value_a1("Sheet1", "A1").unwrap().error_kind(),
        Some(ErrorValue::Ref)
    );
    assert!(!book.history().can_undo());

    book.add_sheet("Data").unwrap();
    book.write("Data", "A1", "9").unwrap();
    assert_eq!(book.value_a1("Sheet1", "A1").unwrap(), Value::Number(9.0));
}

#[test]
fn test_sheet_errors() {
    let mut book = Spreadsheet::default();
    assert!(matches!(
        book.write("Nope", "A1", "1"),
        Err(SheetError::SheetNotFound { .. })
    ));
    assert!(matches!(book.remove_sheet("Sheet1"), Err(SheetError::LastSheet)));
    assert!(matches!(
        book.write("Sheet1", "A0", "1"),
        Err(SheetError::Address(_))
    ));
}

#[test]
fn test_move_across_sheets_and_undo() {
    let mut book = Spreadsheet::default();
    book.add_sheet("Archive").unwrap();
    book.write("Sheet1", "A1", "10").unwrap();
    book.write("Sheet1", "A2", "=A1*2").unwrap();
    book.write("Sheet1", "B1", "=A2+1").unwrap();
    let before = book.snapshot().clone();

    let update = book
        .move_range("Sheet1", area("A2"), "Archive", a1("C5"))
        .unwrap();
    assert_eq!(update.changes.other_sheets.len(), 1);
    assert_eq!(
        book.cell_text("Archive", a1("C5"), false).unwrap(),
        "=Sheet1!A1*2"
    );
    assert_eq!(
        book.cell_text("Sheet1", a1("B1"), false).unwrap(),
        "=Archive!C5+1"
    );
    assert_eq!(book.value_a1("Sheet1", "B1").unwrap(), Value::Number(21.0));

    book.undo().unwrap();
    assert_eq!(book.snapshot(), &before);
}

// ===== Autofill =====

#[test]
fn test_autofill_series_and_formulas() {
    let mut book = Spreadsheet::default();
    book.write("Sheet1", "A1", "1").unwrap();
    book.write("Sheet1", "A2", "2").unwrap();
    book.write("Sheet1", "B1", "=A1*A1").unwrap();
    book.autofill("Sheet1", area("A1:A2"), area("A1:A5")).unwrap();
    book.autofill("Sheet1", area("B1"), area("B2:B5")).unwrap();

    assert_eq!(book.value_a1("Sheet1", "A5").unwrap(), Value::Number(5.0));
    assert_eq!(book.value_a1("Sheet1", "B5").unwrap(), Value::Number(25.0));
    assert_eq!(book.cell_text("Sheet1", a1("B4"), false).unwrap(), "=A4*A4");

    book.undo().unwrap();
    assert_eq!(book.cell_text("Sheet1", a1("B4"), false).unwrap(), "");
}

// ===== Layout =====

#[test]
fn test_sizes_follow_structural_edits() {
    let mut book = Spreadsheet::new(EngineOptions::default().with_row_height(18.0));
    book.set_row_height("Sheet1", 3, 40.0).unwrap();
    book.insert_rows("Sheet1", 1, 2).unwrap();
    let sheet = book.sheet("Sheet1").unwrap();
    assert_eq!(sheet.layout().row_height(5), 40.0);
    assert_eq!(sheet.layout().row_height(3), 18.0);

    assert!(matches!(
        book.set_column_width("Sheet1", 0, 10.0),
        Err(SheetError::ColumnIndexOutOfBounds { .. })
    ));
    assert!(matches!(
        book.set_row_height("Sheet1", 1, -1.0),
        Err(SheetError::InvalidSize(_))
    ));
}

#[test]
fn test_history_limit() {
    let mut book = Spreadsheet::new(EngineOptions::default().with_history_limit(2));
    for n in 1..=4 {
        book.write("Sheet1", "A1", &n.to_string()).unwrap();
    }
    assert!(book.undo().is_some());
    assert!(book.undo().is_some());
    assert!(book.undo().is_none());
    assert_eq!(book.value_a1("Sheet1", "A1").unwrap(), Value::Number(2.0));
}

// ===== CSV and JSON =====

#[test]
fn test_csv_import_and_export() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("scores.csv");
    std::fs::write(&path, "Name,Score,Bonus\nalice,92,=B2/2\nbob,67,=B3/2\n").unwrap();

    let mut book = Spreadsheet::default();
    let options = CsvOptions::default().with_headers(true);
    book.import_csv("Sheet1", File::open(&path).unwrap(), &options)
        .unwrap();
    assert_eq!(book.history().len(), 1);
    assert_eq!(book.value_a1("Sheet1", "C2").unwrap(), Value::Number(46.0));

    let raw = book
        .to_delimited("Sheet1", false, &CsvOptions::default())
        .unwrap();
    assert_eq!(raw, "Name,Score,Bonus\nalice,92,=B2/2\nbob,67,=B3/2\n");

    let out = dir.path().join("evaluated.tsv");
    book.write_csv("Sheet1", File::create(&out).unwrap(), true, &CsvOptions::tsv())
        .unwrap();
    let evaluated = std::fs::read_to_string(&out).unwrap();
    assert_eq!(evaluated, "Name\tScore\tBonus\nalice\t92\t46\nbob\t67\t33.5\n");
}

#[test]
fn test_snapshot_json_roundtrip() {
    let mut book = Spreadsheet::default();
    book.write("Sheet1", "A1", "2024-03-01").unwrap();
    book.write("Sheet1", "A2", "=A1+1").unwrap();
    book.set_column_width("Sheet1", 1, 100.0).unwrap();

    let json = book.snapshot().to_json().unwrap();
    let restored = Book::from_json(&json).unwrap();
    assert_eq!(&restored, book.snapshot());
}

#[test]
fn test_update_carries_snapshot() {
    let mut book = Spreadsheet::default();
    let first = book.write("Sheet1", "A1", "1").unwrap();
    let second = book.write("Sheet1", "A1", "2").unwrap();
    let cell = |b: &Book| b.sheet("Sheet1").unwrap().cell(a1("A1")).cloned();
    assert_ne!(cell(&first.snapshot), cell(&second.snapshot));
    assert_eq!(second.changes.cells, vec![a1("A1")]);
}
