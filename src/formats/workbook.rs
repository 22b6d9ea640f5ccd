use std::path::Path;

use calamine::{open_workbook_auto, Data, Range, Reader};
use chrono::NaiveDateTime;
use tracing::warn;

use crate::error::ImportResult;

use super::table::{CellValue, DataTable};

/// A sheet successfully parsed from a workbook.
#[derive(Debug)]
pub struct SheetTable {
    pub name: String,
    pub table: DataTable,
}

/// Load every sheet of a workbook, in workbook order.
///
/// A sheet whose range cannot be read is skipped with a warning and returned
/// in the second list; it never aborts the workbook load. The first row of
/// each sheet is taken as the header row.
pub fn read_sheets(path: &Path) -> ImportResult<(Vec<SheetTable>, Vec<String>)> {
    let mut workbook = open_workbook_auto(path)?;
    let names = workbook.sheet_names().to_vec();

    let mut sheets = Vec::with_capacity(names.len());
    let mut unreadable = Vec::new();

    for name in names {
        match workbook.worksheet_range(&name) {
            Ok(range) => sheets.push(SheetTable {
                table: range_to_table(&range),
                name,
            }),
            Err(err) => {
                warn!(sheet = %name, error = %err, "skipping unreadable sheet");
                unreadable.push(name);
            }
        }
    }

    Ok((sheets, unreadable))
}

fn range_to_table(range: &Range<Data>) -> DataTable {
    let mut rows = range.rows();
    let headers: Vec<String> = match rows.next() {
        Some(header) => header.iter().map(header_label).collect(),
        None => Vec::new(),
    };
    let data: Vec<Vec<CellValue>> = rows
        .map(|row| row.iter().map(convert_cell).collect())
        .collect();

    DataTable::from_rows(headers, data)
}

/// Header cells are labels regardless of their cell type. Whole-number floats
/// print without the trailing `.0` so `2024` stays `2024`.
fn header_label(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(text) => text.clone(),
        Data::Float(value) if value.fract() == 0.0 => (*value as i64).to_string(),
        other => other.to_string(),
    }
}

fn convert_cell(cell: &Data) -> CellValue {
    match cell {
        Data::Empty => CellValue::Null,
        Data::String(text) => CellValue::Text(text.clone()),
        Data::Int(value) => CellValue::Int(*value),
        Data::Float(value) => CellValue::Float(*value),
        Data::Bool(value) => CellValue::Bool(*value),
        Data::DateTime(value) => value
            .as_datetime()
            .map(CellValue::DateTime)
            .unwrap_or(CellValue::Null),
        Data::DateTimeIso(text) => NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S")
            .map(CellValue::DateTime)
            .unwrap_or_else(|_| CellValue::Text(text.clone())),
        Data::DurationIso(text) => CellValue::Text(text.clone()),
        // Error cells (#N/A, #DIV/0!, ...) carry no usable value.
        Data::Error(_) => CellValue::Null,
    }
}
