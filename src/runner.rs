//! High-level runner API for the importer.
//!
//! This module provides a simplified public interface that encapsulates all
//! the internal complexity of setting up connections, readers and the
//! importer.
//!
//! This is the primary API for external users and for the CLI.

use std::path::{Path, PathBuf};

use crate::db::SqlDestination;
use crate::error::{ImportError, ImportResult};
use crate::import::{analyze, Importer};

pub use crate::db::schema::{ColumnSpec, TableSchema, TypeTag};
pub use crate::import::{
    AnalysisReport, FailedSheet, IfExistsPolicy, ImportPolicy, ImportReport, SkippedSheet,
    TableAnalysis, TableImport,
};

/// Arguments for running an import.
pub struct ImportArgs {
    /// PostgreSQL connection string.
    pub database_url: String,

    /// Path to the CSV or Excel source file.
    pub file: PathBuf,

    /// Requested destination table name. Workbook sheets derive per-sheet
    /// names from it.
    pub table: String,

    pub policy: ImportPolicy,

    /// Quiet mode - suppress progress output.
    pub quiet: bool,

    // Test-only: inject a pre-created destination (for SQLite testing)
    #[cfg(test)]
    pub test_destination: Option<std::sync::Arc<dyn crate::db::Destination>>,
}

/// Run an import with the specified arguments.
///
/// Connects to the destination, then runs the import pipeline: read →
/// validate → infer → (compatibility check) → transactional load. Workbook
/// files import one destination table per valid sheet; per-sheet failures
/// are isolated in the returned report.
///
/// # Example
///
/// ```no_run
/// use tabular_loader::runner::{run_import, ImportArgs, ImportPolicy};
///
/// # async fn example() -> Result<(), tabular_loader::error::ImportError> {
/// let args = ImportArgs {
///     database_url: "postgres://localhost/warehouse".to_string(),
///     file: "sample_data/netflix_titles.csv".into(),
///     table: "netflix_titles".to_string(),
///     policy: ImportPolicy::default(),
///     quiet: true,
/// };
///
/// let report = run_import(args).await?;
/// println!("imported {} tables", report.imported.len());
/// # Ok(())
/// # }
/// ```
pub async fn run_import(args: ImportArgs) -> ImportResult<ImportReport> {
    #[cfg(test)]
    let destination: std::sync::Arc<dyn crate::db::Destination> = match args.test_destination {
        Some(destination) => destination,
        None => std::sync::Arc::new(
            SqlDestination::connect(&args.database_url)
                .await
                .map_err(ImportError::Destination)?,
        ),
    };

    #[cfg(not(test))]
    let destination = SqlDestination::connect(&args.database_url)
        .await
        .map_err(ImportError::Destination)?;

    #[cfg(test)]
    let importer = Importer::new(destination.as_ref(), args.policy, args.quiet);
    #[cfg(not(test))]
    let importer = Importer::new(&destination, args.policy, args.quiet);

    importer.import_file(&args.file, &args.table).await
}

/// Run the dry-run analyzer: the full read → validate → infer pipeline with
/// no destination connection at all.
pub fn run_analysis(file: &Path, table: &str, policy: &ImportPolicy) -> AnalysisReport {
    analyze(file, table, policy)
}
