use thiserror::Error;

/// Convenience result type for import operations.
pub type ImportResult<T> = Result<T, ImportError>;

/// Error type returned by the importer.
///
/// Per-sheet failures inside a workbook are isolated by the importer and
/// reported in the run summary; a failure on a standalone table aborts the
/// whole run.
#[derive(Debug, Error)]
pub enum ImportError {
    /// The file extension maps to no known parser.
    #[error("unsupported file type '{extension}'. Only CSV and Excel formats are supported")]
    UnsupportedFormat { extension: String },

    /// The input is not a loadable table (empty, blank or corrupted column
    /// names).
    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    /// The inferred column set does not match the existing destination table.
    #[error(
        "schema mismatch for table '{table}': missing columns {missing:?}, extra columns {extra:?}"
    )]
    SchemaMismatch {
        table: String,
        missing: Vec<String>,
        extra: Vec<String>,
    },

    /// A destination write failed. The enclosing transaction has been rolled
    /// back and the destination is unchanged.
    #[error("import into '{table}' failed, transaction rolled back: {source}")]
    ImportFailed {
        table: String,
        #[source]
        source: DestinationError,
    },

    /// A destination catalog read failed outside the write path.
    #[error("destination error: {0}")]
    Destination(#[from] DestinationError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("workbook error: {0}")]
    Workbook(#[from] calamine::Error),
}

/// Error surfaced by a destination handle.
#[derive(Debug, Error)]
pub enum DestinationError {
    /// The target table already exists and the write mode forbids that.
    #[error("table '{0}' already exists")]
    TableExists(String),

    /// A value could not be converted to the column's destination type.
    #[error("cannot convert value '{value}' to {sql_type} for column '{column}'")]
    ValueConversion {
        column: String,
        sql_type: &'static str,
        value: String,
    },

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error("{0}")]
    Other(String),
}
