use std::collections::BTreeSet;
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use tracing::warn;

use crate::config::INFERENCE_SAMPLE_SIZE;
use crate::error::{ImportError, ImportResult};
use crate::formats::table::{CellValue, DataTable, SourceColumn};

use super::destination::Destination;

/// Destination SQL type for a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TypeTag {
    BigInt,
    Float64,
    Bool,
    Timestamp,
    Text,
}

impl TypeTag {
    /// Returns the PostgreSQL type name
    pub fn sql_name(&self) -> &'static str {
        match self {
            TypeTag::BigInt => "BIGINT",
            TypeTag::Float64 => "DOUBLE PRECISION",
            TypeTag::Bool => "BOOLEAN",
            TypeTag::Timestamp => "TIMESTAMP",
            TypeTag::Text => "TEXT",
        }
    }
}

/// One column of an inferred destination schema.
#[derive(Debug, Clone, Serialize)]
pub struct ColumnSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub type_tag: TypeTag,
}

/// Inferred schema for one destination table. Immutable once built.
#[derive(Debug, Clone, Serialize)]
pub struct TableSchema {
    pub columns: Vec<ColumnSpec>,
}

impl TableSchema {
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|column| column.name.as_str())
    }

    /// Type of the column at `idx`; columns past the schema width read as
    /// `Text`.
    pub fn type_of(&self, idx: usize) -> TypeTag {
        self.columns
            .get(idx)
            .map(|column| column.type_tag)
            .unwrap_or(TypeTag::Text)
    }
}

impl fmt::Display for TableSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, column) in self.columns.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} {}", column.name, column.type_tag.sql_name())?;
        }
        Ok(())
    }
}

/// Quote an identifier for use in generated SQL.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Generate the CREATE TABLE statement for a schema.
pub fn create_table_ddl(table: &str, schema: &TableSchema, if_not_exists: bool) -> String {
    let column_defs: Vec<String> = schema
        .columns
        .iter()
        .map(|column| format!("{} {}", quote_ident(&column.name), column.type_tag.sql_name()))
        .collect();

    let clause = if if_not_exists { "IF NOT EXISTS " } else { "" };
    format!(
        "CREATE TABLE {}{} ({})",
        clause,
        quote_ident(table),
        column_defs.join(", ")
    )
}

/// Infer the destination type for a single column.
///
/// Two passes: columns whose cells are already typed map directly; otherwise
/// up to the first 100 non-missing values are stringified and tested as
/// integers, floats, then timestamps, falling back to `Text` with a warning
/// for the ambiguous column.
pub fn infer_column_type(column: &SourceColumn, warnings: &mut Vec<String>) -> TypeTag {
    if let Some(tag) = native_column_type(&column.cells) {
        return tag;
    }

    let sample: Vec<String> = column
        .cells
        .iter()
        .filter(|cell| !cell.is_null())
        .take(INFERENCE_SAMPLE_SIZE)
        .map(CellValue::to_text)
        .collect();

    if sample.is_empty() {
        return TypeTag::Text;
    }

    if sample.iter().all(|value| is_integer_literal(value)) {
        return TypeTag::BigInt;
    }
    if sample.iter().all(|value| value.trim().parse::<f64>().is_ok()) {
        return TypeTag::Float64;
    }
    if sample
        .iter()
        .all(|value| parse_timestamp(value.trim()).is_some())
    {
        return TypeTag::Timestamp;
    }

    warn!(column = %column.name, "column is mixed/ambiguous, using TEXT");
    warnings.push(format!(
        "column '{}' is mixed/ambiguous, using TEXT",
        column.name
    ));
    TypeTag::Text
}

/// Infer the full schema for a table, collecting warnings for ambiguous
/// columns.
pub fn infer_schema(table: &DataTable) -> (TableSchema, Vec<String>) {
    let mut warnings = Vec::new();
    let columns = table
        .columns()
        .iter()
        .map(|column| ColumnSpec {
            name: column.name.clone(),
            type_tag: infer_column_type(column, &mut warnings),
        })
        .collect();

    (TableSchema { columns }, warnings)
}

/// First pass: map a column whose non-null cells are already uniformly typed.
/// Numeric columns mixing integers and floats widen to `Float64`.
fn native_column_type(cells: &[CellValue]) -> Option<TypeTag> {
    let mut saw_int = false;
    let mut saw_float = false;
    let mut saw_bool = false;
    let mut saw_datetime = false;
    let mut saw_value = false;

    for cell in cells {
        match cell {
            CellValue::Null => continue,
            CellValue::Int(_) => saw_int = true,
            CellValue::Float(_) => saw_float = true,
            CellValue::Bool(_) => saw_bool = true,
            CellValue::DateTime(_) => saw_datetime = true,
            CellValue::Text(_) => return None,
        }
        saw_value = true;
    }

    if !saw_value {
        return None;
    }

    match (saw_int, saw_float, saw_bool, saw_datetime) {
        (_, true, false, false) => Some(TypeTag::Float64),
        (true, false, false, false) => Some(TypeTag::BigInt),
        (false, false, true, false) => Some(TypeTag::Bool),
        (false, false, false, true) => Some(TypeTag::Timestamp),
        _ => None,
    }
}

/// Optional-sign, all-digit, and within BIGINT range.
fn is_integer_literal(value: &str) -> bool {
    let trimmed = value.trim();
    let digits = trimmed.strip_prefix('-').unwrap_or(trimmed);
    !digits.is_empty()
        && digits.bytes().all(|byte| byte.is_ascii_digit())
        && trimmed.parse::<i64>().is_ok()
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",    // 2025-01-01 12:34:56
    "%Y-%m-%dT%H:%M:%S",    // 2025-01-01T12:34:56 (ISO 8601)
    "%Y-%m-%d %H:%M:%S%.f", // With fractional seconds
    "%Y-%m-%dT%H:%M:%S%.f", // ISO 8601 with fractional seconds
    "%Y-%m-%d %H:%M",       // Without seconds
    "%Y-%m-%dT%H:%M",       // ISO 8601 without seconds
    "%m/%d/%Y %H:%M:%S",    // US format with time
    "%d-%m-%Y %H:%M:%S",    // European format with time
    "%d/%m/%Y %H:%M:%S",    // European format with time
];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d", // ISO 8601
    "%m/%d/%Y", // US format
    "%d-%m-%Y", // European format with dashes
    "%d/%m/%Y", // European format with slashes
];

/// Parse a value as a datetime or bare date (midnight). Used both by
/// inference and by value binding for TIMESTAMP columns.
pub(crate) fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    for format in DATETIME_FORMATS {
        if let Ok(timestamp) = NaiveDateTime::parse_from_str(value, format) {
            return Some(timestamp);
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            return date.and_hms_opt(0, 0, 0);
        }
    }
    None
}

/// Compare an inferred schema's column set against the destination table's
/// current column set.
///
/// A table that does not exist yet is trivially compatible: its first
/// creation defines the schema. Column types are deliberately not compared,
/// only column-set identity.
pub async fn check_compatible(
    destination: &dyn Destination,
    table: &str,
    schema: &TableSchema,
) -> ImportResult<()> {
    let tables = destination.table_names().await?;
    if !tables.iter().any(|name| name == table) {
        return Ok(());
    }

    let existing: BTreeSet<String> = destination
        .table_columns(table)
        .await?
        .into_iter()
        .map(|column| column.name)
        .collect();
    let new_columns: BTreeSet<String> = schema.column_names().map(str::to_string).collect();

    let missing: Vec<String> = existing.difference(&new_columns).cloned().collect();
    let extra: Vec<String> = new_columns.difference(&existing).cloned().collect();

    if !missing.is_empty() || !extra.is_empty() {
        return Err(ImportError::SchemaMismatch {
            table: table.to_string(),
            missing,
            extra,
        });
    }

    Ok(())
}
