// Snapshot Delta - Core Library
// Exposes all modules for use in the CLI and tests

pub mod error;
pub mod normalizer;     // Name Normalizer - canonical entity keys
pub mod temporal;       // Timestamps, Timeline, date Window
pub mod parser;         // CSV → RawRow
pub mod ingest;         // Snapshot Ingestor - grid / per-entity windows
pub mod resolver;       // Boundary Resolver - nearest valid value
pub mod reconciliation; // Delta Reporter - differences + notes
pub mod output;         // DeltaRecord → CSV (atomic)
pub mod pipeline;       // One run, end to end

// Re-export commonly used types
pub use error::{IngestError, OverrideError};
pub use normalizer::{normalize, NameNormalizer};
pub use temporal::{parse_date, parse_timestamp, Timeline, Window};
pub use parser::{read_rows, read_rows_from_reader, RawRow};
pub use ingest::{
    ColumnLayout, ColumnMatcher, Count, EntityWindows, IngestStats, Observation,
    ObservationIndex, SkippedRow, SnapshotGrid, SnapshotIngestor,
};
pub use resolver::{Boundary, BoundaryResolver, GridResolver, Resolution, WindowResolver};
pub use reconciliation::{
    compute_change, DeltaRecord, DeltaReporter, Difference, PercentChange,
    ReconciliationReport,
};
pub use output::{write_records, write_report, write_summary};
pub use pipeline::{reconcile_rows, run, Reconciled, RunConfig, RunMode};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
