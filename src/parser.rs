// 📂 Snapshot CSV Reader
// Thin collaborator: CSV text → ordered rows (header name → raw string).
// No interpretation happens here; see ingest.rs for that.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;

// ============================================================================
// RAW ROW
// ============================================================================

/// RawRow - one input record, fields kept in header order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRow {
    /// Line in the original file (1-indexed, header is line 1)
    pub line_number: usize,

    /// (column name, raw value) in header order
    pub fields: Vec<(String, String)>,
}

impl RawRow {
    pub fn new(line_number: usize, fields: Vec<(String, String)>) -> Self {
        RawRow {
            line_number,
            fields,
        }
    }

    /// Exact (case-sensitive) column lookup
    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value.as_str())
    }

    /// Column names in order
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }
}

// ============================================================================
// READERS
// ============================================================================

/// Read every row of a snapshot CSV file
pub fn read_rows(file_path: &Path) -> Result<Vec<RawRow>> {
    let file = File::open(file_path)
        .with_context(|| format!("Failed to open file: {}", file_path.display()))?;

    let source = file_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("input.csv")
        .to_string();

    read_rows_from_reader(file, &source)
}

/// Read rows from any reader (header row required)
pub fn read_rows_from_reader<R: Read>(reader: R, source: &str) -> Result<Vec<RawRow>> {
    use csv::ReaderBuilder;

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers: Vec<String> = reader
        .headers()
        .with_context(|| format!("Failed to read CSV header in {}", source))?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
        .collect();

    let mut rows = Vec::new();

    for (index, result) in reader.records().enumerate() {
        let line_number = index + 2; // +2 because: 1-indexed + header row
        let record = result.with_context(|| {
            format!("Failed to parse CSV line {} in {}", line_number, source)
        })?;

        // Short rows read as empty trailing values
        let fields = headers
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), record.get(i).unwrap_or("").to_string()))
            .collect();

        rows.push(RawRow::new(line_number, fields));
    }

    Ok(rows)
}

// ============================================================================
// TESTS
// ============================================================================
