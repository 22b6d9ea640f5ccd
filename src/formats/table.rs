use chrono::NaiveDateTime;

/// A single cell from a tabular source.
///
/// Workbook cells arrive already typed; delimited cells arrive as `Text` (or
/// `Null` for empty fields) and are interpreted later against the inferred
/// schema.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    DateTime(NaiveDateTime),
    Text(String),
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    /// Whether the cell counts as empty for validation purposes.
    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Null => true,
            CellValue::Text(text) => text.trim().is_empty(),
            _ => false,
        }
    }

    /// Stringified form used by the second inference pass.
    pub fn to_text(&self) -> String {
        match self {
            CellValue::Null => String::new(),
            CellValue::Bool(value) => value.to_string(),
            CellValue::Int(value) => value.to_string(),
            CellValue::Float(value) => value.to_string(),
            CellValue::DateTime(value) => value.format("%Y-%m-%d %H:%M:%S").to_string(),
            CellValue::Text(text) => text.clone(),
        }
    }
}

/// A named source column and its cells.
#[derive(Debug, Clone)]
pub struct SourceColumn {
    pub name: String,
    pub cells: Vec<CellValue>,
}

/// An in-memory table: ordered named columns of equal length.
///
/// The equal-length invariant is enforced by the constructor; ragged source
/// rows are padded with `Null` and over-long rows are truncated to the header
/// width.
#[derive(Debug, Clone)]
pub struct DataTable {
    columns: Vec<SourceColumn>,
    row_count: usize,
}

impl DataTable {
    /// Build a table from a header and row-major data.
    pub fn from_rows(names: Vec<String>, rows: Vec<Vec<CellValue>>) -> Self {
        let width = names.len();
        let row_count = rows.len();
        let mut columns: Vec<SourceColumn> = names
            .into_iter()
            .map(|name| SourceColumn {
                name,
                cells: Vec::with_capacity(row_count),
            })
            .collect();

        for mut row in rows {
            row.resize(width, CellValue::Null);
            for (idx, cell) in row.into_iter().enumerate() {
                columns[idx].cells.push(cell);
            }
        }

        Self { columns, row_count }
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[SourceColumn] {
        &self.columns
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|column| column.name.as_str())
    }

    /// Row-major view of the table.
    pub fn rows(&self) -> impl Iterator<Item = Vec<CellValue>> + '_ {
        (0..self.row_count).map(move |row| {
            self.columns
                .iter()
                .map(|column| column.cells[row].clone())
                .collect()
        })
    }
}
