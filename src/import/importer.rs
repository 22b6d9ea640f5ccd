use std::path::Path;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::db::destination::Destination;
use crate::db::schema::{check_compatible, infer_schema, TableSchema};
use crate::error::ImportResult;
use crate::formats::delimited::BatchedCsvReader;
use crate::formats::table::DataTable;
use crate::formats::{self, delimited, workbook, SourceFormat};

use super::identifier::sheet_table_name;
use super::validate::{is_valid_sheet, validate_table};
use super::{loader, ImportPolicy};

/// Outcome of importing one destination table.
#[derive(Debug, Serialize)]
pub struct TableImport {
    pub table: String,
    pub rows_imported: u64,
    pub schema: TableSchema,
    pub warnings: Vec<String>,
}

/// A workbook sheet that was skipped as non-tabular or unreadable.
#[derive(Debug, Serialize)]
pub struct SkippedSheet {
    pub sheet: String,
    pub reason: String,
}

/// A workbook sheet whose import failed. Other sheets are unaffected.
#[derive(Debug, Serialize)]
pub struct FailedSheet {
    pub sheet: String,
    pub table: String,
    pub error: String,
}

/// Structured result of one import run.
#[derive(Debug, Default, Serialize)]
pub struct ImportReport {
    pub imported: Vec<TableImport>,
    pub skipped: Vec<SkippedSheet>,
    pub failed: Vec<FailedSheet>,
}

/// The Importer orchestrates one import run: read, validate, infer, check
/// compatibility, then load.
///
/// One file is processed start to finish by one logical task. Workbook
/// sheets load strictly in workbook order, each in its own transaction, and
/// per-sheet failures are isolated. A standalone-table failure aborts the
/// run.
pub struct Importer<'a> {
    destination: &'a dyn Destination,
    policy: ImportPolicy,
    quiet: bool,
}

impl<'a> Importer<'a> {
    pub fn new(destination: &'a dyn Destination, policy: ImportPolicy, quiet: bool) -> Self {
        Self {
            destination,
            policy,
            quiet,
        }
    }

    /// Import one file into the destination.
    pub async fn import_file(&self, path: &Path, table: &str) -> ImportResult<ImportReport> {
        match SourceFormat::from_path(path)? {
            SourceFormat::Delimited => self.import_delimited(path, table).await,
            SourceFormat::Workbook => self.import_workbook(path, table).await,
        }
    }

    async fn import_delimited(&self, path: &Path, table: &str) -> ImportResult<ImportReport> {
        let size = formats::source_size_bytes(path)?;

        let import = if size > self.policy.chunk_threshold_bytes {
            info!(
                path = %path.display(),
                bytes = size,
                "large delimited file, streaming in chunks"
            );
            self.import_delimited_chunked(path, table).await?
        } else {
            let data = delimited::read_table(path)?;
            validate_table(&data)?;
            self.import_table(table, &data).await?
        };

        Ok(ImportReport {
            imported: vec![import],
            ..ImportReport::default()
        })
    }

    /// Chunked path. The first batch doubles as the validation and inference
    /// sample so the file is never fully materialized.
    async fn import_delimited_chunked(
        &self,
        path: &Path,
        table: &str,
    ) -> ImportResult<TableImport> {
        let mut source = BatchedCsvReader::open(path)?;
        let headers = source.headers().to_vec();
        let first = source
            .next_batch(self.policy.chunk_size)?
            .unwrap_or_default();

        let first_chunk = DataTable::from_rows(headers, first);
        validate_table(&first_chunk)?;

        let (schema, warnings) = infer_schema(&first_chunk);
        if self.policy.strict_schema {
            check_compatible(self.destination, table, &schema).await?;
        }

        let rows = loader::load_chunked(
            self.destination,
            table,
            &first_chunk,
            &mut source,
            &schema,
            &self.policy,
            self.quiet,
        )
        .await?;

        Ok(TableImport {
            table: table.to_string(),
            rows_imported: rows,
            schema,
            warnings,
        })
    }

    async fn import_workbook(&self, path: &Path, base_table: &str) -> ImportResult<ImportReport> {
        let (sheets, unreadable) = workbook::read_sheets(path)?;
        let mut report = ImportReport::default();

        for sheet in unreadable {
            report.skipped.push(SkippedSheet {
                sheet,
                reason: "sheet could not be parsed".to_string(),
            });
        }

        for sheet in sheets {
            if !is_valid_sheet(&sheet.table) {
                warn!(sheet = %sheet.name, "skipping non-tabular sheet");
                report.skipped.push(SkippedSheet {
                    sheet: sheet.name,
                    reason: "non-tabular sheet".to_string(),
                });
                continue;
            }

            let table = sheet_table_name(base_table, &sheet.name);
            match self.import_table(&table, &sheet.table).await {
                Ok(import) => report.imported.push(import),
                Err(err) => {
                    error!(sheet = %sheet.name, table = %table, error = %err, "sheet import failed");
                    report.failed.push(FailedSheet {
                        sheet: sheet.name,
                        table,
                        error: err.to_string(),
                    });
                }
            }
        }

        Ok(report)
    }

    /// Shared single-shot path for standalone tables and workbook sheets.
    async fn import_table(&self, table: &str, data: &DataTable) -> ImportResult<TableImport> {
        let (schema, warnings) = infer_schema(data);
        if self.policy.strict_schema {
            check_compatible(self.destination, table, &schema).await?;
        }

        let rows = loader::load_table(self.destination, table, data, &schema, &self.policy).await?;

        Ok(TableImport {
            table: table.to_string(),
            rows_imported: rows,
            schema,
            warnings,
        })
    }
}
