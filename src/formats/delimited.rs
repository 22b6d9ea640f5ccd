use std::fs::File;
use std::path::Path;

use crate::error::ImportResult;

use super::table::{CellValue, DataTable};

fn cell_from_field(field: &str) -> CellValue {
    if field.is_empty() {
        CellValue::Null
    } else {
        CellValue::Text(field.to_string())
    }
}

/// Read an entire delimited file into memory.
pub fn read_table(path: &Path) -> ImportResult<DataTable> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(cell_from_field).collect());
    }

    Ok(DataTable::from_rows(headers, rows))
}

/// Streaming delimited reader yielding row batches of a fixed maximum size.
///
/// Column order and names are stable across batches; each row is normalized
/// to the header width.
pub struct BatchedCsvReader {
    records: csv::StringRecordsIntoIter<File>,
    headers: Vec<String>,
}

impl BatchedCsvReader {
    pub fn open(path: &Path) -> ImportResult<Self> {
        let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
        let headers = reader.headers()?.iter().map(str::to_string).collect();
        Ok(Self {
            records: reader.into_records(),
            headers,
        })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Next batch of at most `size` rows, or `None` once the file is
    /// exhausted.
    pub fn next_batch(&mut self, size: usize) -> ImportResult<Option<Vec<Vec<CellValue>>>> {
        let width = self.headers.len();
        let mut rows: Vec<Vec<CellValue>> = Vec::new();

        for record in self.records.by_ref() {
            let record = record?;
            let mut row: Vec<CellValue> = record.iter().map(cell_from_field).collect();
            row.resize(width, CellValue::Null);
            rows.push(row);
            if rows.len() == size {
                break;
            }
        }

        if rows.is_empty() {
            Ok(None)
        } else {
            Ok(Some(rows))
        }
    }
}
