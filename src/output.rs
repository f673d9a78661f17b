// 💾 Report Writer
// DeltaRecords → CSV with a fixed header.
//
// Written to a temp file next to the target and renamed into place, so a
// failed run never leaves a half-written report behind.

use crate::reconciliation::{DeltaRecord, ReconciliationReport, UNAVAILABLE};
use crate::temporal::format_timestamp;
use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

pub const HEADER: [&str; 8] = [
    "entity",
    "initial date",
    "final date",
    "initial count",
    "final count",
    "difference",
    "percent change",
    "notes",
];

/// One CSV row, in HEADER order
pub fn render_row(record: &DeltaRecord) -> [String; 8] {
    let count = |c: Option<u64>| c.map_or_else(|| UNAVAILABLE.to_string(), |n| n.to_string());

    [
        record.display_name.clone(),
        format_timestamp(&record.opening.timestamp),
        format_timestamp(&record.closing.timestamp),
        count(record.opening.count),
        count(record.closing.count),
        record.difference.to_string(),
        record.percent_change.to_string(),
        record.notes_text(),
    ]
}

/// Write header + one row per record
pub fn write_records<W: Write>(writer: W, records: &[DeltaRecord]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(writer);

    writer.write_record(HEADER).context("Failed to write CSV header")?;
    for record in records {
        writer
            .write_record(render_row(record))
            .with_context(|| format!("Failed to write row for {}", record.entity_key))?;
    }
    writer.flush().context("Failed to flush CSV output")?;

    Ok(())
}

/// Write the report CSV atomically
pub fn write_report(path: &Path, records: &[DeltaRecord]) -> Result<()> {
    persist_atomically(path, |file| write_records(file, records))
}

/// Write the run summary as pretty JSON, atomically
pub fn write_summary(path: &Path, report: &ReconciliationReport) -> Result<()> {
    persist_atomically(path, |file| {
        serde_json::to_writer_pretty(&mut *file, report).context("Failed to serialize summary")?;
        file.write_all(b"\n")?;
        Ok(())
    })
}

fn persist_atomically<F>(path: &Path, fill: F) -> Result<()>
where
    F: FnOnce(&mut NamedTempFile) -> Result<()>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut temp = NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;

    fill(&mut temp)?;
    temp.as_file()
        .sync_all()
        .with_context(|| format!("Failed to sync output for {}", path.display()))?;

    temp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to write output file: {}", path.display()))?;

    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
