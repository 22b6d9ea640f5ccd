use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use crate::db::destination::{Destination, Row, WriteMode};
use crate::db::schema::TableSchema;
use crate::error::{DestinationError, ImportError, ImportResult};
use crate::formats::delimited::BatchedCsvReader;
use crate::formats::table::DataTable;

use super::{IfExistsPolicy, ImportPolicy};

fn write_mode(policy: IfExistsPolicy) -> WriteMode {
    match policy {
        IfExistsPolicy::Replace => WriteMode::Replace,
        IfExistsPolicy::Append => WriteMode::Append,
        IfExistsPolicy::Fail => WriteMode::FailIfExists,
    }
}

fn import_failed(table: &str, source: DestinationError) -> ImportError {
    ImportError::ImportFailed {
        table: table.to_string(),
        source,
    }
}

/// Single-shot transactional load of an in-memory table.
pub async fn load_table(
    destination: &dyn Destination,
    table: &str,
    data: &DataTable,
    schema: &TableSchema,
    policy: &ImportPolicy,
) -> ImportResult<u64> {
    let rows: Vec<Row> = data.rows().collect();

    let mut tx = destination
        .begin()
        .await
        .map_err(|source| import_failed(table, source))?;
    let written = tx
        .write_batch(table, schema, &rows, write_mode(policy.if_exists))
        .await
        .map_err(|source| import_failed(table, source))?;
    tx.commit()
        .await
        .map_err(|source| import_failed(table, source))?;

    info!(table, rows = written, "import committed");
    Ok(written)
}

/// Stream the remainder of a delimited file in fixed-size row batches inside
/// one transaction.
///
/// `first_chunk` is the already-read, already-validated first batch; it is
/// written with the caller's if-exists mode. Every later batch appends, so
/// only the first batch can replace existing data. A failure on any batch
/// drops the transaction and the destination is left exactly as it was
/// before the call.
pub async fn load_chunked(
    destination: &dyn Destination,
    table: &str,
    first_chunk: &DataTable,
    source: &mut BatchedCsvReader,
    schema: &TableSchema,
    policy: &ImportPolicy,
    quiet: bool,
) -> ImportResult<u64> {
    let progress = if quiet {
        ProgressBar::hidden()
    } else {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner} chunk {pos} | {msg} rows written")
                .unwrap(),
        );
        bar
    };

    let mut tx = destination
        .begin()
        .await
        .map_err(|source| import_failed(table, source))?;

    let batch: Vec<Row> = first_chunk.rows().collect();
    let mut total = tx
        .write_batch(table, schema, &batch, write_mode(policy.if_exists))
        .await
        .map_err(|source| import_failed(table, source))?;
    let mut chunks = 1u64;
    progress.inc(1);
    progress.set_message(total.to_string());

    while let Some(batch) = source.next_batch(policy.chunk_size)? {
        let written = tx
            .write_batch(table, schema, &batch, WriteMode::Append)
            .await
            .map_err(|source| import_failed(table, source))?;
        total += written;
        chunks += 1;
        progress.inc(1);
        progress.set_message(total.to_string());
    }

    tx.commit()
        .await
        .map_err(|source| import_failed(table, source))?;
    progress.finish_and_clear();

    info!(table, chunks, rows = total, "chunked import committed");
    Ok(total)
}
