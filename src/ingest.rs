// 📥 Snapshot Ingestor
// Raw rows → Observations, indexed two ways:
//
//   Full-timeline mode: timestamp → entity → Observation (+ shared Timeline)
//   Windowed mode:      entity → chronological Vec<Observation> (window-filtered)
//
// Counts that are "ERROR" or not all digits become Count::Invalid. They are
// data, not failures; the resolvers decide what to do with them.

use crate::error::IngestError;
use crate::normalizer::NameNormalizer;
use crate::parser::RawRow;
use crate::temporal::{parse_timestamp, Timeline, Window};
use anyhow::Context;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

// ============================================================================
// COUNT
// ============================================================================

/// A snapshot's record count: either a number or the invalid marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Count {
    Valid(u64),
    Invalid,
}

impl Count {
    pub const ERROR_TOKEN: &'static str = "ERROR";

    /// "ERROR", empty, anything with a non-digit, or overflow → Invalid
    pub fn parse(raw: &str) -> Self {
        if raw == Self::ERROR_TOKEN || raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit())
        {
            return Count::Invalid;
        }
        raw.parse::<u64>().map(Count::Valid).unwrap_or(Count::Invalid)
    }

    pub fn value(&self) -> Option<u64> {
        match self {
            Count::Valid(n) => Some(*n),
            Count::Invalid => None,
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Count::Valid(_))
    }
}

// ============================================================================
// OBSERVATION
// ============================================================================

/// One entity's count at one snapshot. Never mutated after ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub entity_key: String,
    pub timestamp: NaiveDateTime,
    /// Label exactly as it appeared in the input
    pub raw_label: String,
    pub count: Count,
    /// Free text, carried through untouched
    pub status: String,
}

// ============================================================================
// COLUMN LAYOUT
// ============================================================================

/// Predicate over a header name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColumnMatcher {
    Exact(String),
    ContainsIgnoreCase(String),
}

impl ColumnMatcher {
    pub fn matches(&self, column: &str) -> bool {
        match self {
            ColumnMatcher::Exact(name) => column == name,
            ColumnMatcher::ContainsIgnoreCase(needle) => {
                column.to_uppercase().contains(&needle.to_uppercase())
            }
        }
    }
}

/// Where each field lives in the input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnLayout {
    pub date: String,
    pub time: String,
    /// Tried in order; first matching column wins
    pub entity: Vec<ColumnMatcher>,
    pub total: String,
    /// Optional; empty status when absent
    pub status: String,
}

impl Default for ColumnLayout {
    fn default() -> Self {
        ColumnLayout {
            date: "FECHA_EJECUCION".to_string(),
            time: "HORA_EJECUCION".to_string(),
            entity: vec![
                ColumnMatcher::Exact("ENTE_PUBLICO".to_string()),
                ColumnMatcher::Exact("ENTE".to_string()),
                ColumnMatcher::ContainsIgnoreCase("ENTE".to_string()),
            ],
            total: "TOTAL_REGISTROS".to_string(),
            status: "ESTATUS".to_string(),
        }
    }
}

impl ColumnLayout {
    /// Load a layout from JSON; fields left out keep their defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read column layout: {:?}", path.as_ref()))?;

        serde_json::from_str(&content).context("Failed to parse column layout JSON")
    }

    /// Value of the entity column for this row, by matcher priority
    pub fn entity_value<'r>(&self, row: &'r RawRow) -> Option<&'r str> {
        self.entity.iter().find_map(|matcher| {
            row.fields
                .iter()
                .find(|(name, _)| matcher.matches(name))
                .map(|(_, value)| value.as_str())
        })
    }

    /// Date, time and total must exist as headers
    fn check_required(&self, row: &RawRow) -> Result<(), IngestError> {
        for column in [&self.date, &self.time, &self.total] {
            if row.get(column).is_none() {
                return Err(IngestError::MissingColumn(column.clone()));
            }
        }
        Ok(())
    }
}

// ============================================================================
// INGESTION RESULTS
// ============================================================================

/// A row excluded from processing (non-fatal)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedRow {
    pub line_number: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestStats {
    pub rows_read: usize,
    pub rows_indexed: usize,
    pub rows_skipped: usize,
    pub rows_outside_window: usize,
    /// Same (timestamp, entity) seen again; later row kept
    pub duplicates_replaced: usize,
}

/// timestamp → entity_key → Observation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObservationIndex {
    by_time: BTreeMap<NaiveDateTime, HashMap<String, Observation>>,
}

impl ObservationIndex {
    /// Last write wins; returns true when an earlier observation was replaced
    fn insert(&mut self, observation: Observation) -> bool {
        self.by_time
            .entry(observation.timestamp)
            .or_default()
            .insert(observation.entity_key.clone(), observation)
            .is_some()
    }

    pub fn get(&self, timestamp: &NaiveDateTime, entity_key: &str) -> Option<&Observation> {
        self.by_time.get(timestamp)?.get(entity_key)
    }

    /// Every entity seen at any timestamp, sorted
    pub fn entity_keys(&self) -> BTreeSet<&str> {
        self.by_time
            .values()
            .flat_map(|entities| entities.keys().map(String::as_str))
            .collect()
    }

    /// Number of timestamps at which the entity has an observation
    pub fn observation_count(&self, entity_key: &str) -> usize {
        self.by_time
            .values()
            .filter(|entities| entities.contains_key(entity_key))
            .count()
    }

    fn timestamps(&self) -> Vec<NaiveDateTime> {
        self.by_time.keys().copied().collect()
    }
}

/// Full-timeline ingestion output
#[derive(Debug, Clone)]
pub struct SnapshotGrid {
    pub timeline: Timeline,
    pub index: ObservationIndex,
    pub stats: IngestStats,
    pub skipped: Vec<SkippedRow>,
}

/// Windowed ingestion output
#[derive(Debug, Clone)]
pub struct EntityWindows {
    pub window: Window,
    /// entity_key → observations inside the window, chronological, non-empty
    pub series: BTreeMap<String, Vec<Observation>>,
    pub stats: IngestStats,
    pub skipped: Vec<SkippedRow>,
}

enum RowOutcome {
    Observed(Observation),
    Skipped(SkippedRow),
}

// ============================================================================
// SNAPSHOT INGESTOR
// ============================================================================

pub struct SnapshotIngestor {
    normalizer: NameNormalizer,
    columns: ColumnLayout,
}

impl SnapshotIngestor {
    pub fn new(normalizer: NameNormalizer) -> Self {
        SnapshotIngestor {
            normalizer,
            columns: ColumnLayout::default(),
        }
    }

    /// Read input files that use different header names
    pub fn with_columns(mut self, columns: ColumnLayout) -> Self {
        self.columns = columns;
        self
    }

    /// Full-timeline mode: index every row on the global grid.
    ///
    /// Fails when a required column is missing, a timestamp is malformed,
    /// or fewer than two distinct timestamps remain.
    pub fn ingest_grid(&self, rows: &[RawRow]) -> Result<SnapshotGrid, IngestError> {
        let mut index = ObservationIndex::default();
        let mut stats = IngestStats::default();
        let mut skipped = Vec::new();

        if let Some(first) = rows.first() {
            self.columns.check_required(first)?;
        }

        for row in rows {
            stats.rows_read += 1;
            match self.read_row(row)? {
                RowOutcome::Observed(observation) => {
                    stats.rows_indexed += 1;
                    if index.insert(observation) {
                        stats.duplicates_replaced += 1;
                    }
                }
                RowOutcome::Skipped(skip) => {
                    stats.rows_skipped += 1;
                    skipped.push(skip);
                }
            }
        }

        let timeline = Timeline::new(index.timestamps());
        if timeline.len() < 2 {
            return Err(IngestError::NotEnoughTimestamps {
                found: timeline.len(),
            });
        }

        debug!(
            timestamps = timeline.len(),
            entities = index.entity_keys().len(),
            "Grid ingested"
        );

        Ok(SnapshotGrid {
            timeline,
            index,
            stats,
            skipped,
        })
    }

    /// Windowed mode: keep rows inside `window`, grouped per entity.
    pub fn ingest_window(
        &self,
        rows: &[RawRow],
        window: Window,
    ) -> Result<EntityWindows, IngestError> {
        let mut grouped: BTreeMap<String, BTreeMap<NaiveDateTime, Observation>> = BTreeMap::new();
        let mut stats = IngestStats::default();
        let mut skipped = Vec::new();

        if let Some(first) = rows.first() {
            self.columns.check_required(first)?;
        }

        for row in rows {
            stats.rows_read += 1;
            match self.read_row(row)? {
                RowOutcome::Observed(observation) => {
                    if !window.contains(observation.timestamp) {
                        stats.rows_outside_window += 1;
                        continue;
                    }
                    stats.rows_indexed += 1;
                    let replaced = grouped
                        .entry(observation.entity_key.clone())
                        .or_default()
                        .insert(observation.timestamp, observation)
                        .is_some();
                    if replaced {
                        stats.duplicates_replaced += 1;
                    }
                }
                RowOutcome::Skipped(skip) => {
                    stats.rows_skipped += 1;
                    skipped.push(skip);
                }
            }
        }

        let series: BTreeMap<String, Vec<Observation>> = grouped
            .into_iter()
            .map(|(entity, by_time)| (entity, by_time.into_values().collect()))
            .collect();

        debug!(entities = series.len(), "Window ingested");

        Ok(EntityWindows {
            window,
            series,
            stats,
            skipped,
        })
    }

    /// One row → Observation, a skip, or a fatal timestamp error
    fn read_row(&self, row: &RawRow) -> Result<RowOutcome, IngestError> {
        // Timestamp first: a bad one aborts the run even on a row that would be skipped
        let date = row.get(&self.columns.date).unwrap_or("");
        let time = row.get(&self.columns.time).unwrap_or("");
        let timestamp =
            parse_timestamp(date, time).ok_or_else(|| IngestError::MalformedTimestamp {
                line: row.line_number,
                value: format!("{} {}", date, time),
            })?;

        let raw_label = match self.columns.entity_value(row) {
            Some(label) if !label.is_empty() => label,
            Some(_) => return Ok(self.skip(row, "empty entity value")),
            None => return Ok(self.skip(row, "no entity column found")),
        };

        let count = Count::parse(row.get(&self.columns.total).unwrap_or(""));
        let status = row.get(&self.columns.status).unwrap_or("").to_string();

        Ok(RowOutcome::Observed(Observation {
            entity_key: self.normalizer.normalize(raw_label),
            timestamp,
            raw_label: raw_label.to_string(),
            count,
            status,
        }))
    }

    fn skip(&self, row: &RawRow, reason: &str) -> RowOutcome {
        warn!(line = row.line_number, reason, "Skipping row");
        RowOutcome::Skipped(SkippedRow {
            line_number: row.line_number,
            reason: reason.to_string(),
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================
