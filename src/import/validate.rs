use crate::error::{ImportError, ImportResult};
use crate::formats::table::DataTable;

/// Control characters that corrupt exports sometimes leave in column names.
const FORBIDDEN_NAME_CHARS: [char; 4] = ['\0', '\n', '\r', '\t'];

/// Validate a standalone table before import. Failures abort the run.
pub fn validate_table(table: &DataTable) -> ImportResult<()> {
    if table.row_count() == 0 || table.column_count() == 0 {
        return Err(ImportError::InvalidInput {
            reason: "table is empty, nothing to import".to_string(),
        });
    }

    for name in table.column_names() {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(ImportError::InvalidInput {
                reason: "table contains blank column names".to_string(),
            });
        }
        if trimmed
            .chars()
            .any(|ch| FORBIDDEN_NAME_CHARS.contains(&ch))
        {
            return Err(ImportError::InvalidInput {
                reason: format!(
                    "column '{}' contains invalid control characters",
                    trimmed.escape_default()
                ),
            });
        }
    }

    Ok(())
}

/// Whether a workbook sheet looks like a real table.
///
/// Softer than [`validate_table`]: invalid sheets are skipped and logged, the
/// import continues with the remaining sheets.
pub fn is_valid_sheet(table: &DataTable) -> bool {
    if table.row_count() == 0 {
        return false;
    }
    if table.column_count() < 2 {
        return false;
    }
    if table.column_names().all(|name| name.trim().is_empty()) {
        return false;
    }
    // All cells empty after dropping fully-empty rows means no data at all.
    if table.rows().all(|row| row.iter().all(|cell| cell.is_blank())) {
        return false;
    }
    true
}
