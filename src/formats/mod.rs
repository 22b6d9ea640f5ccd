//! File format parsers and readers

pub mod delimited;
pub mod table;
pub mod workbook;

use std::path::Path;

use crate::error::{ImportError, ImportResult};

/// Source family selected from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Delimited,
    Workbook,
}

impl SourceFormat {
    /// Detect the format from the file extension (case-insensitive).
    pub fn from_path(path: &Path) -> ImportResult<Self> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();

        match extension.as_str() {
            "csv" => Ok(SourceFormat::Delimited),
            "xlsx" | "xls" => Ok(SourceFormat::Workbook),
            _ => Err(ImportError::UnsupportedFormat {
                extension: format!(".{extension}"),
            }),
        }
    }
}

/// Byte size of the source file, used for the chunk-threshold decision.
pub fn source_size_bytes(path: &Path) -> ImportResult<u64> {
    Ok(std::fs::metadata(path)?.len())
}
