use async_trait::async_trait;

use crate::error::DestinationError;
use crate::formats::table::CellValue;

use super::schema::TableSchema;

/// How a batch write treats a pre-existing destination table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Drop any existing table, create it fresh, then insert.
    Replace,
    /// Create the table when missing, then insert.
    Append,
    /// Error when the table already exists; otherwise create and insert.
    FailIfExists,
}

/// One row of destination-bound values, ordered per the table schema.
pub type Row = Vec<CellValue>;

/// A column as reported by the destination catalog.
#[derive(Debug, Clone)]
pub struct ExistingColumn {
    pub name: String,
    pub sql_type: String,
}

/// Handle to the destination database.
///
/// Catalog reads must reflect the destination's current state on every call;
/// implementations never cache results across calls.
#[async_trait]
pub trait Destination: Send + Sync {
    async fn table_names(&self) -> Result<Vec<String>, DestinationError>;

    async fn table_columns(&self, table: &str) -> Result<Vec<ExistingColumn>, DestinationError>;

    /// Open a transaction scope. Dropping the returned handle without
    /// committing rolls back everything written through it.
    async fn begin(&self) -> Result<Box<dyn DestinationTx>, DestinationError>;
}

/// A destination transaction. All writes through one handle become visible
/// atomically on commit, or not at all.
#[async_trait]
pub trait DestinationTx: Send {
    /// Write one batch of rows, returning the number of rows written.
    async fn write_batch(
        &mut self,
        table: &str,
        schema: &TableSchema,
        rows: &[Row],
        mode: WriteMode,
    ) -> Result<u64, DestinationError>;

    async fn commit(self: Box<Self>) -> Result<(), DestinationError>;
}
