use gridcalc_primitives::{Area, CellAddress, ErrorValue, Value};
use gridcalc_sheet::{CellContent, FilterMode, Predicate, SortDirection, Spreadsheet};

fn a1(s: &str) -> CellAddress {
    CellAddress::from_a1(s).unwrap()
}

fn area(s: &str) -> Area {
    Area::parse(s).unwrap()
}

fn fill(book: &mut Spreadsheet, cells: &[(&str, &str)]) {
    let cells: Vec<(CellAddress, CellContent)> = cells
        .iter()
        .map(|(addr, input)| (a1(addr), CellContent::parse(input)))
        .collect();
    book.write_cells("Sheet1", cells).unwrap();
}

fn value(book: &Spreadsheet, addr: &str) -> Value {
    book.value_a1("Sheet1", addr).unwrap()
}

fn raw(book: &Spreadsheet, addr: &str) -> String {
    book.cell_text("Sheet1", a1(addr), false).unwrap()
}

// ===== Reads =====

#[test]
fn test_write_then_read_reflects_latest_state() {
    let mut book = Spreadsheet::default();
    fill(&mut book, &[("A1", "5"), ("A2", "=A1+1"), ("A3", "'0123")]);
    assert_eq!(value(&book, "A2"), Value::Number(6.0));
    assert_eq!(value(&book, "A3"), Value::Text("0123".to_string()));

    book.write("Sheet1", "A1", "=10").unwrap();
    assert_eq!(value(&book, "A2"), Value::Number(11.0));
    book.write("Sheet1", "A1", "").unwrap();
    assert_eq!(value(&book, "A2"), Value::Number(1.0));
}

#[test]
fn test_circular_references_are_ref_errors() {
    let mut book = Spreadsheet::default();
    fill(
        &mut book,
        &[
            ("A1", "=A1"),
            ("A2", "=A1"),
            ("A3", "=A4"),
            ("A4", "=A3"),
            ("B1", "1"),
            ("B2", "2"),
            ("B3", "=SUM(B1:B2)"),
            ("B4", "=SUM(B1:B4)"),
        ],
    );
    for addr in ["A1", "A2", "A3", "A4", "B4"] {
        assert_eq!(value(&book, addr).error_kind(), Some(ErrorValue::Ref), "{addr}");
    }
    assert_eq!(value(&book, "B3"), Value::Number(3.0));

    let all = book.evaluate_sheet("Sheet1").unwrap();
    assert_eq!(all[&a1("B3")], Value::Number(3.0));
    assert!(all[&a1("A3")].is_error());
}

#[test]
fn test_running_total_over_ten_thousand_rows() {
    let mut book = Spreadsheet::default();
    let mut cells = vec![(a1("A1"), CellContent::from(1)), (a1("B1"), CellContent::formula("=A1"))];
    for row in 2..=10_000u32 {
        cells.push((CellAddress::new(row, 1), CellContent::from(1)));
        cells.push((
            CellAddress::new(row, 2),
            CellContent::formula(format!("=B{}+A{row}", row - 1)),
        ));
    }
    book.write_cells("Sheet1", cells).unwrap();
    assert_eq!(value(&book, "B10000"), Value::Number(10_000.0));

    book.write("Sheet1", "A1", "5001").unwrap();
    assert_eq!(value(&book, "B10000"), Value::Number(15_000.0));
}

// ===== Structural edits =====

#[test]
fn test_insert_row_then_undo_and_redo() {
    let mut book = Spreadsheet::default();
    fill(
        &mut book,
        &[
            ("A1", "1"),
            ("B1", "2"),
            ("C1", "=A1+B1"),
            ("A2", "4"),
            ("B2", "5"),
            ("C2", "=A2+B2"),
            ("A3", "5"),
            ("B3", "7"),
            ("C3", "=A3+B3"),
        ],
    );
    let before = book.snapshot().clone();

    book.insert_rows("Sheet1", 2, 1).unwrap();
    let after = book.snapshot().clone();
    for addr in ["A2", "B2", "C2"] {
        assert_eq!(raw(&book, addr), "", "{addr}");
    }
    assert_eq!(raw(&book, "C3"), "=A3+B3");
    assert_eq!(value(&book, "C3"), Value::Number(9.0));
    assert_eq!(value(&book, "C4"), Value::Number(12.0));
    assert_eq!(value(&book, "C1"), Value::Number(3.0));

    book.undo().unwrap();
    assert_eq!(book.snapshot(), &before);
    assert_eq!(value(&book, "C2"), Value::Number(9.0));

    book.redo().unwrap();
    assert_eq!(book.snapshot(), &after);
}

#[test]
fn test_remove_row_turns_references_into_errors() {
    let mut book = Spreadsheet::default();
    fill(&mut book, &[("A1", "1"), ("A2", "2"), ("A3", "3"), ("B1", "=A2*10"), ("B2", "=SUM(A1:A3)")]);
    book.remove_rows("Sheet1", &[2]).unwrap();
    assert_eq!(raw(&book, "B1"), "=#REF!*10");
    assert_eq!(value(&book, "B1").error_kind(), Some(ErrorValue::Ref));
    assert_eq!(raw(&book, "B2"), "=SUM(A1:A2)");
    assert_eq!(value(&book, "B2"), Value::Number(4.0));
}

#[test]
fn test_move_keeps_partially_overlapping_ranges() {
    let mut book = Spreadsheet::default();
    fill(
        &mut book,
        &[
            ("B9", "1"),
            ("C9", "2"),
            ("B10", "3"),
            ("C10", "4"),
            ("D9", "5"),
            ("E9", "6"),
            ("D10", "7"),
            ("E10", "8"),
            ("F9", "=SUM(B9:E9)"),
            ("F10", "=SUM(B10:E10)"),
        ],
    );
    assert_eq!(value(&book, "F9"), Value::Number(14.0));
    assert_eq!(value(&book, "F10"), Value::Number(22.0));

    book.move_range("Sheet1", area("B9:C10"), "Sheet1", a1("D9"))
        .unwrap();
    assert_eq!(raw(&book, "F9"), "=SUM(B9:E9)");
    assert_eq!(raw(&book, "F10"), "=SUM(B10:E10)");
    assert_eq!(raw(&book, "B9"), "");
    assert_eq!(value(&book, "F9"), Value::Number(3.0));
    assert_eq!(value(&book, "F10"), Value::Number(7.0));

    book.undo().unwrap();
    assert_eq!(value(&book, "F9"), Value::Number(14.0));
    assert_eq!(value(&book, "F10"), Value::Number(22.0));

    book.redo().unwrap();
    assert_eq!(value(&book, "F9"), Value::Number(3.0));
    assert_eq!(value(&book, "F10"), Value::Number(7.0));
}

// ===== Filter and sort =====

fn scores() -> Spreadsheet {
    let mut book = Spreadsheet::default();
    fill(
        &mut book,
        &[
            ("A1", "alice"),
            ("B1", "a"),
            ("C1", "92"),
            ("A2", "bob"),
            ("B2", "b"),
            ("C2", "67"),
            ("A3", "carol"),
            ("B3", "c"),
            ("C3", "75"),
            ("A4", "dan"),
            ("B4", "d"),
            ("C4", "50"),
        ],
    );
    book.apply_filter(
        "Sheet1",
        3,
        vec![Predicate::Gte(Value::Number(75.0))],
        FilterMode::And,
    )
    .unwrap();
    book
}

#[test]
fn test_filter_limits_select_and_copy() {
    let book = scores();
    let sheet = book.sheet("Sheet1").unwrap();
    assert!(sheet.is_row_hidden(2));
    assert!(sheet.is_row_hidden(4));

    let selected = book.select("Sheet1", area("B1:B4")).unwrap();
    assert_eq!(selected, vec![a1("B1"), a1("B3")]);

    let clipboard = book.copy_range("Sheet1", area("B1:B4")).unwrap();
    let copied: Vec<Option<CellContent>> = clipboard.rows().map(|row| row[0].clone()).collect();
    assert_eq!(copied, vec![Some(CellContent::from("a")), Some(CellContent::from("c"))]);
}

#[test]
fn test_filter_limits_cut_and_clear() {
    let mut book = scores();
    let (clipboard, _) = book.cut_range("Sheet1", area("B1:B4")).unwrap();
    assert_eq!(clipboard.height(), 2);
    assert_eq!(raw(&book, "B1"), "");
    assert_eq!(raw(&book, "B2"), "b");
    assert_eq!(raw(&book, "B3"), "");
    assert_eq!(raw(&book, "B4"), "d");

    book.undo().unwrap();
    assert_eq!(raw(&book, "B1"), "a");

    book.clear_range("Sheet1", area("B:B")).unwrap();
    assert_eq!(raw(&book, "B1"), "");
    assert_eq!(raw(&book, "B2"), "b");
    assert_eq!(raw(&book, "B4"), "d");
}

#[test]
fn test_paste_skips_hidden_destination_rows() {
    let mut book = scores();
    let clipboard = book.copy_range("Sheet1", area("A1:A4")).unwrap();
    book.paste("Sheet1", a1("E1"), &clipboard).unwrap();
    assert_eq!(raw(&book, "E1"), "alice");
    assert_eq!(raw(&book, "E2"), "");
    assert_eq!(raw(&book, "E3"), "carol");
}

#[test]
fn test_reset_filter_shows_all_rows() {
    let mut book = scores();
    book.reset_filter("Sheet1", Some(3)).unwrap();
    assert_eq!(book.select("Sheet1", area("A1:A4")).unwrap().len(), 4);
    book.undo().unwrap();
    assert_eq!(book.select("Sheet1", area("A1:A4")).unwrap().len(), 2);
}

#[test]
fn test_sort_moves_whole_rows_and_undoes_exactly() {
    let mut book = Spreadsheet::default();
    fill(
        &mut book,
        &[
            ("A1", "carol"),
            ("B1", "75"),
            ("A2", "alice"),
            ("B2", "92"),
            ("A3", "bob"),
            ("B3", "67"),
        ],
    );
    let before = book.snapshot().clone();
    book.sort_by("Sheet1", 2, SortDirection::Ascending).unwrap();
    let after = book.snapshot().clone();
    assert_eq!(raw(&book, "A1"), "bob");
    assert_eq!(raw(&book, "B1"), "67");
    assert_eq!(raw(&book, "A3"), "alice");

    book.undo().unwrap();
    assert_eq!(book.snapshot(), &before);
    book.redo().unwrap();
    assert_eq!(book.snapshot(), &after);
}

// ===== History =====

#[test]
fn test_one_action_one_history_entry() {
    let mut book = Spreadsheet::default();
    fill(&mut book, &[("A1", "1"), ("A2", "2"), ("B1", "=A1")]);
    assert_eq!(book.history().len(), 1);

    book.insert_rows("Sheet1", 1, 2).unwrap();
    assert_eq!(book.history().len(), 2);
    book.move_range("Sheet1", area("A3:A4"), "Sheet1", a1("C3"))
        .unwrap();
    assert_eq!(book.history().len(), 3);
    let clipboard = book.copy_range("Sheet1", area("C3:C4")).unwrap();
    book.paste("Sheet1", a1("D3"), &clipboard).unwrap();
    assert_eq!(book.history().len(), 4);
    book.autofill("Sheet1", area("C3:C4"), area("C5:C8")).unwrap();
    assert_eq!(book.history().len(), 5);
    book.sort_by("Sheet1", 3, SortDirection::Descending).unwrap();
    assert_eq!(book.history().len(), 6);

    let labels: Vec<&str> = book.history().entries().map(|e| e.label.as_str()).collect();
    assert_eq!(
        labels,
        vec!["write", "insert rows", "move", "paste", "autofill", "sort"]
    );
}

#[test]
fn test_undo_redo_on_empty_stacks() {
    let mut book = Spreadsheet::default();
    assert!(book.undo().is_none());
    assert!(book.redo().is_none());
    book.write("Sheet1", "A1", "1").unwrap();
    assert!(book.undo().is_some());
    assert!(book.undo().is_none());
    assert!(book.redo().is_some());
    assert!(book.redo().is_none());
}
