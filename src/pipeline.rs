// 🔗 Run Pipeline
// input file → rows → ingest → resolve (x2 per entity) → records → output file
//
// Batch, single-threaded, run-to-completion. The report is only written once
// every entity has been resolved.

use crate::error::IngestError;
use crate::ingest::{ColumnLayout, IngestStats, SnapshotIngestor};
use crate::normalizer::NameNormalizer;
use crate::output::{write_report, write_summary};
use crate::parser::{read_rows_from_reader, RawRow};
use crate::reconciliation::{DeltaRecord, DeltaReporter, ReconciliationReport};
use crate::resolver::{Boundary, GridResolver, WindowResolver};
use crate::temporal::{format_timestamp, Window, DATE_FORMAT};
use anyhow::{Context, Result};
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Earliest vs latest snapshot in the file
    FullTimeline,
    /// First vs last valid value inside the window, per entity
    Windowed(Window),
}

impl RunMode {
    pub fn label(&self) -> &'static str {
        match self {
            RunMode::FullTimeline => "full-timeline",
            RunMode::Windowed(_) => "windowed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    pub mode: RunMode,
    /// Header names of the input
    pub columns: ColumnLayout,
    /// Extra normalizer overrides (JSON)
    pub overrides: Option<PathBuf>,
    /// Where to write the JSON run summary, if anywhere
    pub summary: Option<PathBuf>,
}

/// In-memory result of reconciling a set of rows
#[derive(Debug, Clone)]
pub struct Reconciled {
    pub records: Vec<DeltaRecord>,
    pub stats: IngestStats,
    pub period_start: String,
    pub period_end: String,
}

/// Core of a run, no file I/O
pub fn reconcile_rows(
    rows: &[RawRow],
    mode: RunMode,
    ingestor: &SnapshotIngestor,
) -> Result<Reconciled, IngestError> {
    let reporter = DeltaReporter::new();

    match mode {
        RunMode::FullTimeline => {
            let grid = ingestor.ingest_grid(rows)?;
            let resolver = GridResolver::new(&grid)?;

            let period_start = format_timestamp(&resolver.boundary_timestamp(Boundary::Initial));
            let period_end = format_timestamp(&resolver.boundary_timestamp(Boundary::Final));
            info!("Comparing earliest ({}) with latest ({})", period_start, period_end);

            Ok(Reconciled {
                records: reporter.reconcile(&resolver),
                stats: grid.stats.clone(),
                period_start,
                period_end,
            })
        }
        RunMode::Windowed(window) => {
            let windows = ingestor.ingest_window(rows, window)?;
            let resolver = WindowResolver::new(&windows);

            let period_start = window.start.format(DATE_FORMAT).to_string();
            let period_end = window.end.format(DATE_FORMAT).to_string();
            info!(
                "Comparing window {} to {} ({} rows outside window)",
                period_start, period_end, windows.stats.rows_outside_window
            );

            Ok(Reconciled {
                records: reporter.reconcile(&resolver),
                stats: windows.stats.clone(),
                period_start,
                period_end,
            })
        }
    }
}

/// Full run: read input, reconcile, write report (and summary)
pub fn run(config: &RunConfig) -> Result<ReconciliationReport> {
    let normalizer = match &config.overrides {
        Some(path) => {
            let normalizer = NameNormalizer::from_file(path)?;
            info!(overrides = normalizer.override_count(), "Loaded name overrides");
            normalizer
        }
        None => NameNormalizer::new(),
    };

    let bytes = fs::read(&config.input)
        .with_context(|| format!("Failed to read input file: {}", config.input.display()))?;
    let input_sha256 = format!("{:x}", Sha256::digest(&bytes));

    let source = config.input.display().to_string();
    let rows = read_rows_from_reader(bytes.as_slice(), &source)?;
    info!(rows = rows.len(), input = %source, "Loaded snapshot rows");

    let ingestor = SnapshotIngestor::new(normalizer).with_columns(config.columns.clone());
    let reconciled = reconcile_rows(&rows, config.mode, &ingestor)
        .with_context(|| format!("Failed to reconcile {}", source))?;

    if reconciled.stats.rows_skipped > 0 {
        warn!(skipped = reconciled.stats.rows_skipped, "Some rows were skipped");
    }

    write_report(&config.output, &reconciled.records)?;
    info!(
        entities = reconciled.records.len(),
        output = %config.output.display(),
        "Report written"
    );

    let (computable_count, not_computable_count, substitution_count) =
        ReconciliationReport::tally(&reconciled.records);

    let report = ReconciliationReport {
        run_id: uuid::Uuid::new_v4().to_string(),
        mode: config.mode.label().to_string(),
        input_file: source,
        input_sha256,
        output_file: config.output.display().to_string(),
        period_start: reconciled.period_start,
        period_end: reconciled.period_end,
        ingest: reconciled.stats,
        entity_count: reconciled.records.len(),
        computable_count,
        not_computable_count,
        substitution_count,
        generated_at: Utc::now(),
    };

    if let Some(path) = &config.summary {
        write_summary(path, &report)?;
    }

    info!("{}", report.summary());
    Ok(report)
}

// ============================================================================
// TESTS
// ============================================================================
