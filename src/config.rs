//! Configuration constants for the importer
//!
//! This module centralizes all tunable parameters and constants used throughout
//! the application.

use std::time::Duration;

// ============================================================================
// Chunking Configuration
// ============================================================================

/// Default number of rows per chunk when streaming a large delimited file.
pub const DEFAULT_CHUNK_SIZE: usize = 50_000;

/// Default byte threshold above which a delimited file is streamed in chunks
/// rather than loaded in one shot (200 MiB).
pub const DEFAULT_CHUNK_THRESHOLD_BYTES: u64 = 200 * 1024 * 1024;

// ============================================================================
// Schema Inference Configuration
// ============================================================================

/// Number of non-missing values sampled per column during string-based type
/// inference. Enough to classify a column reliably without scanning huge
/// inputs end to end.
pub const INFERENCE_SAMPLE_SIZE: usize = 100;

// ============================================================================
// Destination Configuration
// ============================================================================

/// PostgreSQL limits identifiers to 63 bytes (NAMEDATALEN - 1).
pub const MAX_IDENTIFIER_LEN: usize = 63;

/// Upper bound on rows per INSERT statement. One logical chunk is written as
/// several INSERT statements inside the same transaction.
pub const INSERT_BATCH_ROWS: usize = 1000;

/// PostgreSQL caps bind parameters per statement at u16::MAX.
pub const PG_MAX_BIND_PARAMS: usize = 65_535;

/// SQLite's default SQLITE_MAX_VARIABLE_NUMBER on older builds.
#[cfg(test)]
pub const SQLITE_MAX_BIND_PARAMS: usize = 999;

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
