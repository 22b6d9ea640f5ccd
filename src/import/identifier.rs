use crate::config::MAX_IDENTIFIER_LEN;

/// Convert an arbitrary sheet or table label into a safe destination
/// identifier: lowercase, at most 63 characters, matching
/// `[a-z_][a-z0-9_]*`.
///
/// Pure and deterministic, and a fixed point of itself: sanitizing an
/// already-sanitized name returns it unchanged.
pub fn sanitize_identifier(name: &str) -> String {
    let mut cleaned: String = name
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '_' {
                ch
            } else {
                '_'
            }
        })
        .collect();
    cleaned = cleaned.trim_matches('_').to_string();

    let starts_ok = cleaned
        .chars()
        .next()
        .is_some_and(|ch| ch.is_ascii_alphabetic() || ch == '_');
    if !starts_ok {
        cleaned = format!("sheet_{cleaned}");
    }

    cleaned.truncate(MAX_IDENTIFIER_LEN);
    // Truncation (or prefixing an empty name) can expose a trailing '_',
    // which would make repeated sanitization unstable.
    cleaned.trim_end_matches('_').to_ascii_lowercase()
}

/// Destination table name for a workbook sheet under a requested base table.
pub fn sheet_table_name(base: &str, sheet: &str) -> String {
    sanitize_identifier(&format!("{base}_{}", sanitize_identifier(sheet)))
}
