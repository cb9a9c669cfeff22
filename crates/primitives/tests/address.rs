use gridcalc_primitives::{
    column_index_to_letters, column_letters_to_index, Area, CellAddress, Reference,
    MAX_COLUMN_COUNT, MAX_ROW_COUNT,
};

#[test]
fn test_column_letters_round_trip_at_boundaries() {
    for (index, letters) in [(1, "A"), (26, "Z"), (27, "AA"), (702, "ZZ"), (703, "AAA")] {
        assert_eq!(column_index_to_letters(index), letters);
        assert_eq!(column_letters_to_index(letters).unwrap(), index);
    }
    assert_eq!(column_index_to_letters(MAX_COLUMN_COUNT), "XFD");
    assert!(column_letters_to_index("XFE").is_err());
}

#[test]
fn test_row_limits() {
    let last = format!("A{MAX_ROW_COUNT}");
    assert_eq!(CellAddress::from_a1(&last).unwrap().row, MAX_ROW_COUNT);
    assert!(CellAddress::from_a1(&format!("A{}", MAX_ROW_COUNT + 1)).is_err());
}

#[test]
fn test_address_ordering_is_row_major() {
    let mut cells = vec![
        CellAddress::from_a1("B1").unwrap(),
        CellAddress::from_a1("A2").unwrap(),
        CellAddress::from_a1("A1").unwrap(),
    ];
    cells.sort();
    let names: Vec<String> = cells.iter().map(CellAddress::to_a1).collect();
    assert_eq!(names, vec!["A1", "B1", "A2"]);
}

#[test]
fn test_area_intersection_and_containment() {
    let a = Area::parse("B2:D4").unwrap();
    let b = Area::parse("C3:F9").unwrap();
    assert_eq!(a.intersection(&b), Some(Area::parse("C3:D4").unwrap()));
    assert!(a.contains_area(&Area::parse("C3").unwrap()));
    assert!(!a.intersects(&Area::parse("E5").unwrap()));
    assert_eq!(
        a.moved_to(CellAddress::from_a1("D9").unwrap()),
        Some(Area::parse("D9:F11").unwrap())
    );
}

#[test]
fn test_whole_row_display() {
    assert_eq!(Area::whole_rows(2, 5).to_string(), "2:5");
    assert_eq!(Area::whole_columns(1, 1).to_string(), "A:A");
}

#[test]
fn test_cell_address_serde_as_a1() {
    let addr = CellAddress::from_a1("C12").unwrap();
    let json = serde_json::to_string(&addr).unwrap();
    assert_eq!(json, "\"C12\"");
    let back: CellAddress = serde_json::from_str(&json).unwrap();
    assert_eq!(back, addr);
}

#[test]
fn test_reference_display_round_trip_text() {
    let r = Reference::cell(CellAddress::new(4, 2)).on_sheet("Q1");
    assert_eq!(r.to_string(), "'Q1'!B4");
}
