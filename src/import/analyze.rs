use std::path::Path;

use serde::Serialize;

use crate::db::schema::{infer_schema, TableSchema};
use crate::error::ImportResult;
use crate::formats::{self, delimited, workbook, SourceFormat};

use super::identifier::sheet_table_name;
use super::validate::{is_valid_sheet, validate_table};
use super::ImportPolicy;

/// Analysis of one table or sheet.
#[derive(Debug, Serialize)]
pub struct TableAnalysis {
    /// File stem for standalone tables, sheet name for workbook sheets.
    pub source: String,
    /// Resolved destination table name.
    pub table: String,
    pub rows: usize,
    pub columns: usize,
    /// Whether the chunked loader would engage for this source.
    pub chunked: bool,
    pub schema: TableSchema,
    pub warnings: Vec<String>,
}

/// Report produced by a dry run.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum AnalysisReport {
    Success {
        tables: Vec<TableAnalysis>,
        skipped: Vec<SkippedAnalysis>,
    },
    Failure {
        reason: String,
    },
}

#[derive(Debug, Serialize)]
pub struct SkippedAnalysis {
    pub sheet: String,
    pub reason: String,
}

impl AnalysisReport {
    pub fn is_success(&self) -> bool {
        matches!(self, AnalysisReport::Success { .. })
    }
}

/// Run the full analysis pipeline without touching any destination.
///
/// Any failure is caught into a human-readable reason; the analyzer never
/// raises past its boundary. The caller turns the success flag into an exit
/// code.
pub fn analyze(path: &Path, table: &str, policy: &ImportPolicy) -> AnalysisReport {
    match analyze_inner(path, table, policy) {
        Ok(report) => report,
        Err(err) => AnalysisReport::Failure {
            reason: err.to_string(),
        },
    }
}

fn analyze_inner(path: &Path, table: &str, policy: &ImportPolicy) -> ImportResult<AnalysisReport> {
    match SourceFormat::from_path(path)? {
        SourceFormat::Delimited => {
            let data = delimited::read_table(path)?;
            validate_table(&data)?;
            let (schema, warnings) = infer_schema(&data);
            let chunked = formats::source_size_bytes(path)? > policy.chunk_threshold_bytes;

            Ok(AnalysisReport::Success {
                tables: vec![TableAnalysis {
                    source: path
                        .file_name()
                        .map(|name| name.to_string_lossy().into_owned())
                        .unwrap_or_default(),
                    table: table.to_string(),
                    rows: data.row_count(),
                    columns: data.column_count(),
                    chunked,
                    schema,
                    warnings,
                }],
                skipped: Vec::new(),
            })
        }
        SourceFormat::Workbook => {
            let (sheets, unreadable) = workbook::read_sheets(path)?;
            let mut tables = Vec::new();
            let mut skipped: Vec<SkippedAnalysis> = unreadable
                .into_iter()
                .map(|sheet| SkippedAnalysis {
                    sheet,
                    reason: "sheet could not be parsed".to_string(),
                })
                .collect();

            for sheet in sheets {
                if !is_valid_sheet(&sheet.table) {
                    skipped.push(SkippedAnalysis {
                        sheet: sheet.name,
                        reason: "non-tabular sheet".to_string(),
                    });
                    continue;
                }

                let (schema, warnings) = infer_schema(&sheet.table);
                tables.push(TableAnalysis {
                    table: sheet_table_name(table, &sheet.name),
                    source: sheet.name,
                    rows: sheet.table.row_count(),
                    columns: sheet.table.column_count(),
                    // Workbook sheets always load single-shot.
                    chunked: false,
                    schema,
                    warnings,
                });
            }

            Ok(AnalysisReport::Success { tables, skipped })
        }
    }
}
