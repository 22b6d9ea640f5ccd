//! sqlx-backed destination: PostgreSQL in production, in-memory SQLite for
//! tests.
use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::postgres::{PgArguments, PgPoolOptions};
use sqlx::query::Query;
use sqlx::{PgPool, Postgres, Transaction};

use crate::config::{CONNECT_TIMEOUT, INSERT_BATCH_ROWS, PG_MAX_BIND_PARAMS};
use crate::error::DestinationError;
use crate::formats::table::CellValue;

use super::destination::{Destination, DestinationTx, ExistingColumn, Row, WriteMode};
use super::schema::{create_table_ddl, parse_timestamp, quote_ident, TableSchema, TypeTag};

/// Inner pool variants
#[derive(Debug, Clone)]
enum PoolInner {
    Postgres(PgPool),
    #[cfg(test)]
    Sqlite(sqlx::SqlitePool),
}

/// Destination database handle backed by a sqlx connection pool.
#[derive(Debug, Clone)]
pub struct SqlDestination {
    inner: PoolInner,
}

impl SqlDestination {
    /// Connect to a PostgreSQL destination.
    pub async fn connect(database_url: &str) -> Result<Self, DestinationError> {
        let pool = PgPoolOptions::new()
            .max_connections(4)
            .acquire_timeout(CONNECT_TIMEOUT)
            .connect(database_url)
            .await?;

        Ok(Self {
            inner: PoolInner::Postgres(pool),
        })
    }

    /// Create an in-memory SQLite destination for testing.
    ///
    /// A single connection keeps every query on the same in-memory database.
    #[cfg(test)]
    pub async fn sqlite_in_memory() -> Result<Self, DestinationError> {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        Ok(Self {
            inner: PoolInner::Sqlite(pool),
        })
    }

    /// Execute a raw statement outside any import transaction (test setup).
    #[cfg(test)]
    pub async fn execute_raw(&self, sql: &str) -> Result<(), DestinationError> {
        match &self.inner {
            PoolInner::Postgres(pool) => {
                sqlx::query(sql).execute(pool).await?;
            }
            PoolInner::Sqlite(pool) => {
                sqlx::query(sql).execute(pool).await?;
            }
        }
        Ok(())
    }

    /// Row count of a table (test verification).
    #[cfg(test)]
    pub async fn count_rows(&self, table: &str) -> Result<i64, DestinationError> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table));
        let (count,): (i64,) = match &self.inner {
            PoolInner::Postgres(pool) => sqlx::query_as(&sql).fetch_one(pool).await?,
            PoolInner::Sqlite(pool) => sqlx::query_as(&sql).fetch_one(pool).await?,
        };
        Ok(count)
    }
}

#[async_trait]
impl Destination for SqlDestination {
    async fn table_names(&self) -> Result<Vec<String>, DestinationError> {
        match &self.inner {
            PoolInner::Postgres(pool) => {
                let rows: Vec<(String,)> = sqlx::query_as(
                    "SELECT table_name FROM information_schema.tables \
                     WHERE table_schema = 'public' AND table_type = 'BASE TABLE'",
                )
                .fetch_all(pool)
                .await?;
                Ok(rows.into_iter().map(|(name,)| name).collect())
            }
            #[cfg(test)]
            PoolInner::Sqlite(pool) => {
                let rows: Vec<(String,)> = sqlx::query_as(
                    "SELECT name FROM sqlite_master \
                     WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
                )
                .fetch_all(pool)
                .await?;
                Ok(rows.into_iter().map(|(name,)| name).collect())
            }
        }
    }

    async fn table_columns(&self, table: &str) -> Result<Vec<ExistingColumn>, DestinationError> {
        match &self.inner {
            PoolInner::Postgres(pool) => {
                let rows: Vec<(String, String)> = sqlx::query_as(
                    "SELECT column_name, data_type FROM information_schema.columns \
                     WHERE table_name = $1 ORDER BY ordinal_position",
                )
                .bind(table)
                .fetch_all(pool)
                .await?;
                Ok(rows
                    .into_iter()
                    .map(|(name, sql_type)| ExistingColumn { name, sql_type })
                    .collect())
            }
            #[cfg(test)]
            PoolInner::Sqlite(pool) => {
                let sql = format!("PRAGMA table_info({})", quote_ident(table));
                let rows: Vec<(i32, String, String, i32, Option<String>, i32)> =
                    sqlx::query_as(&sql).fetch_all(pool).await?;
                Ok(rows
                    .into_iter()
                    .map(|row| ExistingColumn {
                        name: row.1,
                        sql_type: row.2,
                    })
                    .collect())
            }
        }
    }

    async fn begin(&self) -> Result<Box<dyn DestinationTx>, DestinationError> {
        match &self.inner {
            PoolInner::Postgres(pool) => Ok(Box::new(SqlTx::Postgres(pool.begin().await?))),
            #[cfg(test)]
            PoolInner::Sqlite(pool) => Ok(Box::new(SqlTx::Sqlite(pool.begin().await?))),
        }
    }
}

/// Open transaction against either backend. Rolls back on drop unless
/// committed (sqlx transaction semantics).
enum SqlTx {
    Postgres(Transaction<'static, Postgres>),
    #[cfg(test)]
    Sqlite(Transaction<'static, sqlx::Sqlite>),
}

#[async_trait]
impl DestinationTx for SqlTx {
    async fn write_batch(
        &mut self,
        table: &str,
        schema: &TableSchema,
        rows: &[Row],
        mode: WriteMode,
    ) -> Result<u64, DestinationError> {
        match self {
            SqlTx::Postgres(tx) => {
                ensure_table_pg(tx, table, schema, mode).await?;
                insert_rows_pg(tx, table, schema, rows).await
            }
            #[cfg(test)]
            SqlTx::Sqlite(tx) => {
                ensure_table_sqlite(tx, table, schema, mode).await?;
                insert_rows_sqlite(tx, table, schema, rows).await
            }
        }
    }

    async fn commit(self: Box<Self>) -> Result<(), DestinationError> {
        match *self {
            SqlTx::Postgres(tx) => tx.commit().await?,
            #[cfg(test)]
            SqlTx::Sqlite(tx) => tx.commit().await?,
        }
        Ok(())
    }
}

async fn ensure_table_pg(
    tx: &mut Transaction<'static, Postgres>,
    table: &str,
    schema: &TableSchema,
    mode: WriteMode,
) -> Result<(), DestinationError> {
    match mode {
        WriteMode::Replace => {
            let drop_sql = format!("DROP TABLE IF EXISTS {}", quote_ident(table));
            sqlx::query(&drop_sql).execute(&mut **tx).await?;
            sqlx::query(&create_table_ddl(table, schema, false))
                .execute(&mut **tx)
                .await?;
        }
        WriteMode::Append => {
            sqlx::query(&create_table_ddl(table, schema, true))
                .execute(&mut **tx)
                .await?;
        }
        WriteMode::FailIfExists => {
            let (exists,): (bool,) = sqlx::query_as(
                "SELECT EXISTS (SELECT 1 FROM information_schema.tables \
                 WHERE table_schema = 'public' AND table_name = $1)",
            )
            .bind(table)
            .fetch_one(&mut **tx)
            .await?;
            if exists {
                return Err(DestinationError::TableExists(table.to_string()));
            }
            sqlx::query(&create_table_ddl(table, schema, false))
                .execute(&mut **tx)
                .await?;
        }
    }
    Ok(())
}

async fn insert_rows_pg(
    tx: &mut Transaction<'static, Postgres>,
    table: &str,
    schema: &TableSchema,
    rows: &[Row],
) -> Result<u64, DestinationError> {
    let width = schema.columns.len();
    let rows_per_statement = statement_rows(width, PG_MAX_BIND_PARAMS);

    for group in rows.chunks(rows_per_statement) {
        let sql = insert_sql(table, schema, group.len(), true);
        let mut query = sqlx::query(&sql);
        for row in group {
            for (idx, cell) in row.iter().enumerate().take(width) {
                let value = convert_cell(cell, schema.type_of(idx), &schema.columns[idx].name)?;
                query = bind_pg(query, value);
            }
        }
        query.execute(&mut **tx).await?;
    }

    Ok(rows.len() as u64)
}

#[cfg(test)]
async fn ensure_table_sqlite(
    tx: &mut Transaction<'static, sqlx::Sqlite>,
    table: &str,
    schema: &TableSchema,
    mode: WriteMode,
) -> Result<(), DestinationError> {
    match mode {
        WriteMode::Replace => {
            let drop_sql = format!("DROP TABLE IF EXISTS {}", quote_ident(table));
            sqlx::query(&drop_sql).execute(&mut **tx).await?;
            sqlx::query(&create_table_ddl(table, schema, false))
                .execute(&mut **tx)
                .await?;
        }
        WriteMode::Append => {
            sqlx::query(&create_table_ddl(table, schema, true))
                .execute(&mut **tx)
                .await?;
        }
        WriteMode::FailIfExists => {
            let (count,): (i64,) = sqlx::query_as(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
            )
            .bind(table)
            .fetch_one(&mut **tx)
            .await?;
            if count > 0 {
                return Err(DestinationError::TableExists(table.to_string()));
            }
            sqlx::query(&create_table_ddl(table, schema, false))
                .execute(&mut **tx)
                .await?;
        }
    }
    Ok(())
}

#[cfg(test)]
async fn insert_rows_sqlite(
    tx: &mut Transaction<'static, sqlx::Sqlite>,
    table: &str,
    schema: &TableSchema,
    rows: &[Row],
) -> Result<u64, DestinationError> {
    use crate::config::SQLITE_MAX_BIND_PARAMS;

    let width = schema.columns.len();
    let rows_per_statement = statement_rows(width, SQLITE_MAX_BIND_PARAMS);

    for group in rows.chunks(rows_per_statement) {
        let sql = insert_sql(table, schema, group.len(), false);
        let mut query = sqlx::query(&sql);
        for row in group {
            for (idx, cell) in row.iter().enumerate().take(width) {
                let value = convert_cell(cell, schema.type_of(idx), &schema.columns[idx].name)?;
                query = bind_sqlite(query, value);
            }
        }
        query.execute(&mut **tx).await?;
    }

    Ok(rows.len() as u64)
}

/// Rows per INSERT statement so the bind-parameter limit is respected.
fn statement_rows(width: usize, max_params: usize) -> usize {
    let by_params = max_params / width.max(1);
    by_params.clamp(1, INSERT_BATCH_ROWS)
}

/// Multi-row INSERT statement with `$n` (PostgreSQL) or `?` (SQLite)
/// placeholders.
fn insert_sql(table: &str, schema: &TableSchema, row_count: usize, numbered: bool) -> String {
    let columns: Vec<String> = schema
        .columns
        .iter()
        .map(|column| quote_ident(&column.name))
        .collect();
    let width = columns.len();

    let mut groups = Vec::with_capacity(row_count);
    let mut param = 1usize;
    for _ in 0..row_count {
        let placeholders: Vec<String> = (0..width)
            .map(|_| {
                if numbered {
                    let placeholder = format!("${param}");
                    param += 1;
                    placeholder
                } else {
                    "?".to_string()
                }
            })
            .collect();
        groups.push(format!("({})", placeholders.join(", ")));
    }

    format!(
        "INSERT INTO {} ({}) VALUES {}",
        quote_ident(table),
        columns.join(", "),
        groups.join(", ")
    )
}

/// A cell converted to the destination type of its column, ready to bind.
#[derive(Debug)]
enum BoundValue {
    Null(TypeTag),
    BigInt(i64),
    Float(f64),
    Bool(bool),
    Timestamp(NaiveDateTime),
    Text(String),
}

/// Convert a cell to its column's destination type.
///
/// Inference is a heuristic over a sample, so individual values can still
/// fail here; the error aborts the batch and with it the whole transaction.
fn convert_cell(
    cell: &CellValue,
    tag: TypeTag,
    column: &str,
) -> Result<BoundValue, DestinationError> {
    let conversion_error = |value: &str| DestinationError::ValueConversion {
        column: column.to_string(),
        sql_type: tag.sql_name(),
        value: value.to_string(),
    };

    match tag {
        TypeTag::BigInt => match cell {
            CellValue::Null => Ok(BoundValue::Null(tag)),
            CellValue::Int(value) => Ok(BoundValue::BigInt(*value)),
            CellValue::Float(value) if value.fract() == 0.0 => Ok(BoundValue::BigInt(*value as i64)),
            CellValue::Text(text) => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    return Ok(BoundValue::Null(tag));
                }
                trimmed
                    .parse::<i64>()
                    .map(BoundValue::BigInt)
                    .map_err(|_| conversion_error(trimmed))
            }
            other => Err(conversion_error(&other.to_text())),
        },
        TypeTag::Float64 => match cell {
            CellValue::Null => Ok(BoundValue::Null(tag)),
            CellValue::Int(value) => Ok(BoundValue::Float(*value as f64)),
            CellValue::Float(value) => Ok(BoundValue::Float(*value)),
            CellValue::Text(text) => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    return Ok(BoundValue::Null(tag));
                }
                trimmed
                    .parse::<f64>()
                    .map(BoundValue::Float)
                    .map_err(|_| conversion_error(trimmed))
            }
            other => Err(conversion_error(&other.to_text())),
        },
        TypeTag::Bool => match cell {
            CellValue::Null => Ok(BoundValue::Null(tag)),
            CellValue::Bool(value) => Ok(BoundValue::Bool(*value)),
            CellValue::Int(value) => Ok(BoundValue::Bool(*value != 0)),
            CellValue::Text(text) => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    return Ok(BoundValue::Null(tag));
                }
                parse_bool(trimmed)
                    .map(BoundValue::Bool)
                    .ok_or_else(|| conversion_error(trimmed))
            }
            other => Err(conversion_error(&other.to_text())),
        },
        TypeTag::Timestamp => match cell {
            CellValue::Null => Ok(BoundValue::Null(tag)),
            CellValue::DateTime(value) => Ok(BoundValue::Timestamp(*value)),
            CellValue::Text(text) => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    return Ok(BoundValue::Null(tag));
                }
                parse_timestamp(trimmed)
                    .map(BoundValue::Timestamp)
                    .ok_or_else(|| conversion_error(trimmed))
            }
            other => Err(conversion_error(&other.to_text())),
        },
        TypeTag::Text => match cell {
            CellValue::Null => Ok(BoundValue::Null(tag)),
            other => Ok(BoundValue::Text(other.to_text())),
        },
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    if value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("t") || value == "1" {
        Some(true)
    } else if value.eq_ignore_ascii_case("false") || value.eq_ignore_ascii_case("f") || value == "0"
    {
        Some(false)
    } else {
        None
    }
}

fn bind_pg<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: BoundValue,
) -> Query<'q, Postgres, PgArguments> {
    match value {
        BoundValue::Null(tag) => match tag {
            TypeTag::BigInt => query.bind(None::<i64>),
            TypeTag::Float64 => query.bind(None::<f64>),
            TypeTag::Bool => query.bind(None::<bool>),
            TypeTag::Timestamp => query.bind(None::<NaiveDateTime>),
            TypeTag::Text => query.bind(None::<String>),
        },
        BoundValue::BigInt(value) => query.bind(value),
        BoundValue::Float(value) => query.bind(value),
        BoundValue::Bool(value) => query.bind(value),
        BoundValue::Timestamp(value) => query.bind(value),
        BoundValue::Text(value) => query.bind(value),
    }
}

#[cfg(test)]
fn bind_sqlite<'q>(
    query: Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    value: BoundValue,
) -> Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    match value {
        BoundValue::Null(tag) => match tag {
            TypeTag::BigInt => query.bind(None::<i64>),
            TypeTag::Float64 => query.bind(None::<f64>),
            TypeTag::Bool => query.bind(None::<bool>),
            TypeTag::Timestamp => query.bind(None::<NaiveDateTime>),
            TypeTag::Text => query.bind(None::<String>),
        },
        BoundValue::BigInt(value) => query.bind(value),
        BoundValue::Float(value) => query.bind(value),
        BoundValue::Bool(value) => query.bind(value),
        BoundValue::Timestamp(value) => query.bind(value),
        BoundValue::Text(value) => query.bind(value),
    }
}
