// ❗ Typed errors for the resolution core
// File-level I/O stays on anyhow (with context); these are the failures the
// core itself can name.

use chrono::NaiveDate;

/// Fatal ingestion failures. Row-level skips are NOT errors (see `SkippedRow`).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum IngestError {
    /// A required header (date, time or total) is not present at all
    #[error("Input is missing required column: {0}")]
    MissingColumn(String),

    /// Execution date/time could not be parsed into an instant
    #[error("Malformed timestamp on line {line}: '{value}'")]
    MalformedTimestamp { line: usize, value: String },

    /// Full-timeline mode needs an earliest and a latest snapshot
    #[error("Not enough timestamps to compare: found {found}, need at least 2 distinct")]
    NotEnoughTimestamps { found: usize },

    #[error("Invalid window: start {start} is after end {end}")]
    InvalidWindow { start: NaiveDate, end: NaiveDate },
}

/// Problems with an externally supplied override table.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OverrideError {
    /// Target is itself a source key: normalize() would no longer be idempotent
    #[error("Override target '{target}' (from '{source_key}') is itself an override key")]
    Chained { source_key: String, target: String },

    /// Target is not already in canonical form (upper-case, no spaces)
    #[error("Override target '{0}' is not a canonical key")]
    NotCanonical(String),
}
