use std::io::{Read, Write};

use gridcalc_primitives::{CellAddress, Value};

use crate::cell::CellContent;
use crate::error::Result;
use crate::eval::Evaluator;
use crate::sheet::Sheet;

/// CSV reader/writer options
#[derive(Debug, Clone)]
pub struct CsvOptions {
    /// Field delimiter (default: ',')
    pub delimiter: u8,
    /// Whether the first row contains headers; header fields are kept as text
    pub has_headers: bool,
    /// Quote character (default: '"')
    pub quote: u8,
    /// Whether to use type inference when reading
    pub infer_types: bool,
}

impl Default for CsvOptions {
    fn default() -> Self {
        CsvOptions {
            delimiter: b',',
            has_headers: false,
            quote: b'"',
            infer_types: true,
        }
    }
}

impl CsvOptions {
    /// Create options for TSV (tab-separated values)
    #[must_use]
    pub fn tsv() -> Self {
        CsvOptions {
            delimiter: b'\t',
            ..Default::default()
        }
    }

    /// Set the delimiter
    #[must_use]
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Set whether the first row contains headers
    #[must_use]
    pub fn with_headers(mut self, has_headers: bool) -> Self {
        self.has_headers = has_headers;
        self
    }

    /// Set whether to infer types
    #[must_use]
    pub fn with_type_inference(mut self, infer_types: bool) -> Self {
        self.infer_types = infer_types;
        self
    }
}

/// Read delimited text into cell contents, starting at `A1`.
///
/// Fields go through the same interpretation as typed input, so `=A1+1`
/// becomes a formula. Empty fields are skipped.
pub fn read_cells<R: Read>(reader: R, options: &CsvOptions) -> Result<Vec<(CellAddress, CellContent)>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .delimiter(options.delimiter)
        .quote(options.quote)
        .has_headers(false) // headers are kept as a text row
        .flexible(true)
        .from_reader(reader);

    let mut cells = Vec::new();
    for (row, result) in (1u32..).zip(csv_reader.records()) {
        let record = result?;
        for (col, field) in (1u32..).zip(record.iter()) {
            if field.is_empty() {
                continue;
            }
            let header = options.has_headers && row == 1;
            let content = if options.infer_types && !header {
                CellContent::parse(field)
            } else {
                CellContent::Value(Value::Text(field.to_string()))
            };
            cells.push((CellAddress::new(row, col), content));
        }
    }
    Ok(cells)
}

/// Write rows `1..=last used row` of `sheet` as delimited text.
///
/// With an evaluator, formula cells are written as their results; without
/// one every cell is written in its raw, re-importable form.
pub fn write_delimited<W: Write>(
    sheet: &Sheet,
    evaluator: Option<&Evaluator<'_>>,
    writer: W,
    options: &CsvOptions,
) -> Result<()> {
    let mut csv_writer = csv::WriterBuilder::new()
        .delimiter(options.delimiter)
        .quote(options.quote)
        .flexible(true)
        .from_writer(writer);

    let (rows, cols) = sheet.used_extent();
    for row in 1..=rows {
        let record: Vec<String> = (1..=cols)
            .map(|col| {
                let addr = CellAddress::new(row, col);
                match evaluator {
                    Some(evaluator) => evaluator.value(sheet, addr).to_text(),
                    None => sheet
                        .cell(addr)
                        .map(CellContent::to_raw_string)
                        .unwrap_or_default(),
                }
            })
            .collect();
        csv_writer.write_record(&record)?;
    }

    csv_writer.flush()?;
    Ok(())
}
