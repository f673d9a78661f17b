// ⚖️ Reconciliation Engine - Opening vs closing record counts
// Pairs the two boundary resolutions of every entity into one DeltaRecord.
//
// Following the formula:
//   difference = closing_count - opening_count
//   percent    = difference / opening_count * 100   (2 decimals)
//
// opening_count == 0 → "∞%" if it grew, "0%" otherwise.
// Either side unavailable → "not computable", with a note saying which side.
//
// Every substitution the resolvers made ends up in the record's notes. Those
// notes are the audit trail of the report.

use crate::ingest::IngestStats;
use crate::resolver::{Boundary, BoundaryResolver, Resolution};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const NOT_COMPUTABLE: &str = "not computable";
pub const UNAVAILABLE: &str = "unavailable";
pub const NO_OBSERVATIONS: &str = "no observations";

// ============================================================================
// DIFFERENCE & PERCENT CHANGE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Difference {
    /// Wide enough for any pair of u64 counts
    Value(i128),
    NotComputable,
}

impl fmt::Display for Difference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Difference::Value(n) => write!(f, "{}", n),
            Difference::NotComputable => f.write_str(NOT_COMPUTABLE),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PercentChange {
    /// difference / opening * 100
    Ratio(f64),
    /// Opening was 0 and the count grew
    Infinite,
    /// Opening was 0 and stayed 0
    ZeroBase,
    NotComputable,
}

impl fmt::Display for PercentChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PercentChange::Ratio(pct) => write!(f, "{:.2}%", pct),
            PercentChange::Infinite => f.write_str("∞%"),
            PercentChange::ZeroBase => f.write_str("0%"),
            PercentChange::NotComputable => f.write_str(NOT_COMPUTABLE),
        }
    }
}

/// Difference and percent change for a pair of counts
pub fn compute_change(opening: Option<u64>, closing: Option<u64>) -> (Difference, PercentChange) {
    match (opening, closing) {
        (Some(opening), Some(closing)) => {
            let difference = i128::from(closing) - i128::from(opening);
            let percent = if opening == 0 {
                if difference > 0 {
                    PercentChange::Infinite
                } else {
                    PercentChange::ZeroBase
                }
            } else {
                PercentChange::Ratio(difference as f64 / opening as f64 * 100.0)
            };
            (Difference::Value(difference), percent)
        }
        _ => (Difference::NotComputable, PercentChange::NotComputable),
    }
}

// ============================================================================
// DELTA RECORD
// ============================================================================

/// One output row: an entity's opening and closing counts and what changed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeltaRecord {
    pub entity_key: String,
    pub display_name: String,
    pub opening: Resolution,
    pub closing: Resolution,
    pub difference: Difference,
    pub percent_change: PercentChange,
    /// In the order they were produced
    pub notes: Vec<String>,
}

impl DeltaRecord {
    pub fn is_computable(&self) -> bool {
        matches!(self.difference, Difference::Value(_))
    }

    /// Resolutions that landed on a substitute value
    pub fn substitution_count(&self) -> usize {
        [&self.opening, &self.closing]
            .iter()
            .filter(|r| r.is_available() && r.note.is_some())
            .count()
    }

    /// Notes joined with "; ", or "no observations"
    pub fn notes_text(&self) -> String {
        if self.notes.is_empty() {
            NO_OBSERVATIONS.to_string()
        } else {
            self.notes.join("; ")
        }
    }
}

// ============================================================================
// DELTA REPORTER
// ============================================================================

pub struct DeltaReporter;

impl DeltaReporter {
    pub fn new() -> Self {
        DeltaReporter
    }

    /// One record per entity the resolver knows about, in its order
    pub fn reconcile(&self, resolver: &dyn BoundaryResolver) -> Vec<DeltaRecord> {
        resolver
            .entity_keys()
            .iter()
            .map(|key| self.reconcile_entity(resolver, key))
            .collect()
    }

    pub fn reconcile_entity(&self, resolver: &dyn BoundaryResolver, entity_key: &str) -> DeltaRecord {
        let opening = resolver.resolve_boundary(entity_key, Boundary::Initial);
        let closing = resolver.resolve_boundary(entity_key, Boundary::Final);

        let mut notes: Vec<String> = [&opening.note, &closing.note]
            .into_iter()
            .flatten()
            .cloned()
            .collect();

        // Both sides on one observation: either other observations were
        // unusable, or both boundaries had to move onto the same snapshot
        let both_moved = opening.note.is_some() && closing.note.is_some();
        if opening.is_available()
            && closing.is_available()
            && opening.timestamp == closing.timestamp
            && (resolver.observation_count(entity_key) > 1 || both_moved)
        {
            notes.push(format!(
                "only one valid observation in the {}",
                resolver.scope()
            ));
        }

        let (difference, percent_change) = compute_change(opening.count, closing.count);

        if !opening.is_available() {
            notes.push("cannot compute change: no valid initial data".to_string());
        }
        if !closing.is_available() {
            notes.push("cannot compute change: no valid final data".to_string());
        }

        let display_name = closing
            .raw_label
            .clone()
            .or_else(|| opening.raw_label.clone())
            .unwrap_or_else(|| entity_key.to_string());

        DeltaRecord {
            entity_key: entity_key.to_string(),
            display_name,
            opening,
            closing,
            difference,
            percent_change,
            notes,
        }
    }
}

impl Default for DeltaReporter {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// RECONCILIATION REPORT (run summary)
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub run_id: String,
    pub mode: String,
    pub input_file: String,
    /// SHA-256 of the input bytes, hex
    pub input_sha256: String,
    pub output_file: String,
    /// Earliest snapshot / window start
    pub period_start: String,
    /// Latest snapshot / window end
    pub period_end: String,
    pub ingest: IngestStats,
    pub entity_count: usize,
    pub computable_count: usize,
    pub not_computable_count: usize,
    pub substitution_count: usize,
    pub generated_at: DateTime<Utc>,
}

impl ReconciliationReport {
    /// Tally counts from the records; identification fields come from the caller
    pub fn tally(records: &[DeltaRecord]) -> (usize, usize, usize) {
        let computable = records.iter().filter(|r| r.is_computable()).count();
        let substitutions = records.iter().map(DeltaRecord::substitution_count).sum();
        (computable, records.len() - computable, substitutions)
    }

    pub fn summary(&self) -> String {
        format!(
            "Reconciliation {} ({}): {} entities from {} to {}, {} computable, {} not computable, {} substitutions",
            self.run_id,
            self.mode,
            self.entity_count,
            self.period_start,
            self.period_end,
            self.computable_count,
            self.not_computable_count,
            self.substitution_count
        )
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{EntityWindows, SnapshotGrid, SnapshotIngestor};
    use crate::normalizer::NameNormalizer;
    use crate::parser::RawRow;
    use crate::resolver::{GridResolver, WindowResolver};
    use crate::temporal::{parse_date, Window};

    fn create_test_row(line: usize, day: u32, entity: &str, total: &str) -> RawRow {
        RawRow::new(
            line,
            vec![
                ("FECHA_EJECUCION".to_string(), format!("2025-01-{:02}", day)),
                ("HORA_EJECUCION".to_string(), "08:00:00".to_string()),
                ("ENTE_PUBLICO".to_string(), entity.to_string()),
                ("TOTAL_REGISTROS".to_string(), total.to_string()),
                ("ESTATUS".to_string(), "OK".to_string()),
            ],
        )
    }

    fn rows(data: &[(u32, &str, &str)]) -> Vec<RawRow> {
        data.iter()
            .enumerate()
            .map(|(i, (day, entity, total))| create_test_row(i + 2, *day, entity, total))
            .collect()
    }

    fn grid(data: &[(u32, &str, &str)]) -> SnapshotGrid {
        SnapshotIngestor::new(NameNormalizer::new())
            .ingest_grid(&rows(data))
            .unwrap()
    }

    fn windows(data: &[(u32, &str, &str)], start: &str, end: &str) -> EntityWindows {
        let window = Window::new(parse_date(start).unwrap(), parse_date(end).unwrap()).unwrap();
        SnapshotIngestor::new(NameNormalizer::new())
            .ingest_window(&rows(data), window)
            .unwrap()
    }

    fn record_for(records: &[DeltaRecord], key: &str) -> DeltaRecord {
        records
            .iter()
            .find(|r| r.entity_key == key)
            .cloned()
            .unwrap()
    }

    #[test]
    fn test_compute_change() {
        let (diff, pct) = compute_change(Some(100), Some(150));
        assert_eq!(diff, Difference::Value(50));
        assert_eq!(pct.to_string(), "50.00%");

        let (diff, pct) = compute_change(Some(80), Some(60));
        assert_eq!(diff.to_string(), "-20");
        assert_eq!(pct.to_string(), "-25.00%");

        let (_, pct) = compute_change(Some(3), Some(4));
        assert_eq!(pct.to_string(), "33.33%");
    }

    #[test]
    fn test_compute_change_counts_beyond_i64() {
        let (diff, pct) = compute_change(Some(1), Some(u64::MAX));
        assert_eq!(diff.to_string(), "18446744073709551614");
        assert!(matches!(pct, PercentChange::Ratio(p) if p > 1e21));

        let (diff, _) = compute_change(Some(1u64 << 63), Some(1));
        assert_eq!(diff, Difference::Value(1 - (1i128 << 63)));
        assert_eq!(diff.to_string(), "-9223372036854775807");

        let (diff, pct) = compute_change(Some(u64::MAX), Some(0));
        assert_eq!(diff.to_string(), "-18446744073709551615");
        assert_eq!(pct.to_string(), "-100.00%");
    }

    #[test]
    fn test_compute_change_zero_opening() {
        let (diff, pct) = compute_change(Some(0), Some(7));
        assert_eq!(diff, Difference::Value(7));
        assert_eq!(pct, PercentChange::Infinite);
        assert_eq!(pct.to_string(), "∞%");

        let (diff, pct) = compute_change(Some(0), Some(0));
        assert_eq!(diff, Difference::Value(0));
        assert_eq!(pct.to_string(), "0%");
    }

    #[test]
    fn test_compute_change_not_computable() {
        for (opening, closing) in [(None, Some(1)), (Some(1), None), (None, None)] {
            let (diff, pct) = compute_change(opening, closing);
            assert_eq!(diff.to_string(), "not computable");
            assert_eq!(pct.to_string(), "not computable");
        }
    }

    #[test]
    fn test_cdmx_valid_boundaries() {
        let grid = grid(&[(1, "CDMX", "100"), (2, "CDMX", "ERROR"), (3, "CDMX", "150")]);
        let resolver = GridResolver::new(&grid).unwrap();

        let records = DeltaReporter::new().reconcile(&resolver);
        let cdmx = record_for(&records, "CDMX");

        assert_eq!(cdmx.opening.count, Some(100));
        assert_eq!(cdmx.closing.count, Some(150));
        assert_eq!(cdmx.difference, Difference::Value(50));
        assert_eq!(cdmx.percent_change.to_string(), "50.00%");
        assert!(cdmx.notes.is_empty());
        assert_eq!(cdmx.notes_text(), "no observations");
        assert_eq!(cdmx.substitution_count(), 0);
    }

    #[test]
    fn test_edomex_single_valid_point() {
        let grid = grid(&[(1, "México", "ERROR"), (1, "CDMX", "1"), (2, "MEXICO", "80")]);
        let resolver = GridResolver::new(&grid).unwrap();

        let edomex = DeltaReporter::new().reconcile_entity(&resolver, "EDOMEX");

        assert_eq!(edomex.opening.count, Some(80));
        assert_eq!(edomex.closing.count, Some(80));
        assert_eq!(edomex.difference, Difference::Value(0));
        assert_eq!(edomex.percent_change.to_string(), "0.00%");
        assert_eq!(edomex.display_name, "MEXICO");
        assert_eq!(
            edomex.notes,
            vec![
                "used alternate timestamp for initial data: 2025-01-02 08:00:00".to_string(),
                "only one valid observation in the dataset".to_string(),
            ]
        );
        assert_eq!(edomex.substitution_count(), 1);
    }

    #[test]
    fn test_absent_at_first_snapshot() {
        let grid = grid(&[(1, "CDMX", "1"), (2, "Jalisco", "30"), (3, "Jalisco", "60")]);
        let resolver = GridResolver::new(&grid).unwrap();

        let jalisco = DeltaReporter::new().reconcile_entity(&resolver, "JALISCO");

        assert_eq!(jalisco.opening.count, Some(30));
        assert_eq!(jalisco.difference, Difference::Value(30));
        assert_eq!(jalisco.percent_change.to_string(), "100.00%");
        assert_eq!(
            jalisco.notes_text(),
            "entity absent at initial timestamp, used first occurrence: 2025-01-02 08:00:00"
        );
    }

    #[test]
    fn test_no_valid_data_anywhere() {
        let grid = grid(&[(1, "CDMX", "1"), (2, "Jalisco", "ERROR"), (3, "CDMX", "2")]);
        let resolver = GridResolver::new(&grid).unwrap();

        let jalisco = DeltaReporter::new().reconcile_entity(&resolver, "JALISCO");

        assert_eq!(jalisco.opening.count, None);
        assert_eq!(jalisco.closing.count, None);
        assert!(!jalisco.is_computable());
        assert_eq!(jalisco.percent_change, PercentChange::NotComputable);
        // No label at either boundary: canonical key stands in
        assert_eq!(jalisco.display_name, "JALISCO");
        assert_eq!(
            jalisco.notes,
            vec![
                "entity has no valid numeric data in the dataset".to_string(),
                "entity has no valid numeric data in the dataset".to_string(),
                "cannot compute change: no valid initial data".to_string(),
                "cannot compute change: no valid final data".to_string(),
            ]
        );
    }

    #[test]
    fn test_single_observation_between_boundaries() {
        let grid = grid(&[(1, "CDMX", "1"), (2, "Sonora", "40"), (3, "CDMX", "2")]);
        let resolver = GridResolver::new(&grid).unwrap();

        let sonora = DeltaReporter::new().reconcile_entity(&resolver, "SONORA");

        assert_eq!(sonora.difference, Difference::Value(0));
        assert_eq!(sonora.percent_change.to_string(), "0.00%");
        assert_eq!(
            sonora.notes,
            vec![
                "entity absent at initial timestamp, used first occurrence: 2025-01-02 08:00:00"
                    .to_string(),
                "entity absent at final timestamp, used last occurrence: 2025-01-02 08:00:00"
                    .to_string(),
                "only one valid observation in the dataset".to_string(),
            ]
        );
    }

    #[test]
    fn test_single_observation_on_a_boundary_gets_no_same_timestamp_note() {
        // Seen once, on the first snapshot: only the final side moved
        let grid = grid(&[(1, "CDMX", "1"), (1, "Sonora", "40"), (2, "CDMX", "2")]);
        let resolver = GridResolver::new(&grid).unwrap();

        let sonora = DeltaReporter::new().reconcile_entity(&resolver, "SONORA");

        assert_eq!(
            sonora.notes,
            vec!["entity absent at final timestamp, used last occurrence: 2025-01-01 08:00:00".to_string()]
        );
    }

    #[test]
    fn test_display_name_falls_back_to_opening_label() {
        // Final resolution finds nothing and the entity is absent at the last snapshot
        let grid = grid(&[(1, "Querétaro", "ERROR"), (2, "CDMX", "1")]);
        let resolver = GridResolver::new(&grid).unwrap();

        let record = DeltaReporter::new().reconcile_entity(&resolver, "QUERETARO");

        assert_eq!(record.closing.raw_label, None);
        assert_eq!(record.display_name, "Querétaro");
    }

    #[test]
    fn test_window_single_valid_observation() {
        let windows = windows(
            &[(2, "CDMX", "ERROR"), (3, "CDMX", "40"), (4, "CDMX", "ERROR")],
            "2025-01-01",
            "2025-01-31",
        );
        let resolver = WindowResolver::new(&windows);

        let cdmx = DeltaReporter::new().reconcile_entity(&resolver, "CDMX");

        assert_eq!(cdmx.difference, Difference::Value(0));
        assert_eq!(cdmx.percent_change.to_string(), "0.00%");
        assert_eq!(cdmx.notes, vec!["only one valid observation in the window".to_string()]);
    }

    #[test]
    fn test_window_single_entry_gets_no_note() {
        let windows = windows(&[(5, "CDMX", "40")], "2025-01-01", "2025-01-31");
        let resolver = WindowResolver::new(&windows);

        let cdmx = DeltaReporter::new().reconcile_entity(&resolver, "CDMX");

        assert!(cdmx.notes.is_empty());
        assert_eq!(cdmx.difference, Difference::Value(0));
    }

    #[test]
    fn test_window_no_valid_values() {
        let windows = windows(&[(5, "CDMX", "ERROR"), (6, "CDMX", "n/a")], "2025-01-01", "2025-01-31");
        let resolver = WindowResolver::new(&windows);

        let cdmx = DeltaReporter::new().reconcile_entity(&resolver, "CDMX");

        assert!(!cdmx.is_computable());
        assert_eq!(
            cdmx.notes_text(),
            "no valid initial value in window; no valid final value in window; \
             cannot compute change: no valid initial data; cannot compute change: no valid final data"
        );
    }

    #[test]
    fn test_report_tally() {
        let grid = grid(&[
            (1, "CDMX", "100"),
            (1, "Jalisco", "ERROR"),
            (2, "CDMX", "150"),
            (2, "Yucatán", "3"),
            (2, "Jalisco", "ERROR"),
        ]);
        let resolver = GridResolver::new(&grid).unwrap();
        let records = DeltaReporter::new().reconcile(&resolver);

        let (computable, not_computable, substitutions) = ReconciliationReport::tally(&records);

        assert_eq!(records.len(), 3);
        assert_eq!(computable, 2);
        assert_eq!(not_computable, 1);
        // Yucatán: absent at the first snapshot → one substitution
        assert_eq!(substitutions, 1);
    }
}
