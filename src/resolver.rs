// 🔎 Boundary Resolver - nearest valid value
//
// For one entity and one boundary (initial / final), pick the observation the
// report will use. If the boundary sample itself is unusable, substitute the
// nearest valid one and say so in a note.
//
// Two strategies behind one trait:
//   GridResolver   - full timeline, boundaries = earliest / latest snapshot
//   WindowResolver - per-entity chronological list inside a date window
//
// Both are pure over read-only ingestion output.

use crate::error::IngestError;
use crate::ingest::{EntityWindows, Observation, ObservationIndex, SnapshotGrid};
use crate::temporal::{format_timestamp, Timeline};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::debug;

// ============================================================================
// CORE TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Boundary {
    Initial,
    Final,
}

impl Boundary {
    pub fn label(&self) -> &'static str {
        match self {
            Boundary::Initial => "initial",
            Boundary::Final => "final",
        }
    }
}

/// Outcome of resolving one boundary for one entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    /// Timestamp actually used (the boundary itself when nothing was found)
    pub timestamp: NaiveDateTime,
    /// None = unavailable
    pub count: Option<u64>,
    /// Original label of the observation used, if there was one
    pub raw_label: Option<String>,
    /// Why a substitution/gap happened
    pub note: Option<String>,
}

impl Resolution {
    fn found(observation: &Observation, note: Option<String>) -> Self {
        Resolution {
            timestamp: observation.timestamp,
            count: observation.count.value(),
            raw_label: Some(observation.raw_label.clone()),
            note,
        }
    }

    fn unavailable(timestamp: NaiveDateTime, raw_label: Option<&str>, note: String) -> Self {
        Resolution {
            timestamp,
            count: None,
            raw_label: raw_label.map(str::to_string),
            note: Some(note),
        }
    }

    pub fn is_available(&self) -> bool {
        self.count.is_some()
    }
}

/// One interface, one strategy per ingestion mode
pub trait BoundaryResolver {
    /// "dataset" or "window", used in report notes
    fn scope(&self) -> &'static str;

    /// Entities to report on, in output order
    fn entity_keys(&self) -> Vec<String>;

    /// How many observations the entity has in scope
    fn observation_count(&self, entity_key: &str) -> usize;

    fn resolve_boundary(&self, entity_key: &str, boundary: Boundary) -> Resolution;
}

// ============================================================================
// GRID RESOLVER (full-timeline mode)
// ============================================================================

pub struct GridResolver<'a> {
    timeline: &'a Timeline,
    index: &'a ObservationIndex,
    earliest: NaiveDateTime,
    latest: NaiveDateTime,
}

impl<'a> GridResolver<'a> {
    pub fn new(grid: &'a SnapshotGrid) -> Result<Self, IngestError> {
        let not_enough = || IngestError::NotEnoughTimestamps {
            found: grid.timeline.len(),
        };
        let earliest = grid.timeline.earliest().ok_or_else(not_enough)?;
        let latest = grid.timeline.latest().ok_or_else(not_enough)?;
        if earliest == latest {
            return Err(not_enough());
        }

        Ok(GridResolver {
            timeline: &grid.timeline,
            index: &grid.index,
            earliest,
            latest,
        })
    }

    pub fn boundary_timestamp(&self, boundary: Boundary) -> NaiveDateTime {
        match boundary {
            Boundary::Initial => self.earliest,
            Boundary::Final => self.latest,
        }
    }

    /// First valid observation of `entity_key` along `instants`
    fn first_valid<'t, I>(&self, entity_key: &str, instants: I) -> Option<&'a Observation>
    where
        I: Iterator<Item = &'t NaiveDateTime>,
    {
        let index = self.index;
        instants
            .filter_map(|ts| index.get(ts, entity_key))
            .find(|obs| obs.count.is_valid())
    }

    /// Boundary sample exists but is invalid: search away from the boundary
    fn resolve_invalid(
        &self,
        entity_key: &str,
        boundary: Boundary,
        at_boundary: &Observation,
    ) -> Resolution {
        let t0 = at_boundary.timestamp;
        let nearest = match boundary {
            Boundary::Initial => self.first_valid(entity_key, self.timeline.after(t0)),
            Boundary::Final => self.first_valid(entity_key, self.timeline.before(t0)),
        };

        match nearest {
            Some(obs) => {
                debug!(
                    entity = entity_key,
                    boundary = boundary.label(),
                    used = %obs.timestamp,
                    "Alternate timestamp"
                );
                Resolution::found(
                    obs,
                    Some(format!(
                        "used alternate timestamp for {} data: {}",
                        boundary.label(),
                        format_timestamp(&obs.timestamp)
                    )),
                )
            }
            None => Resolution::unavailable(
                t0,
                Some(&at_boundary.raw_label),
                format!(
                    "no timestamp with valid data found for {} data",
                    boundary.label()
                ),
            ),
        }
    }

    /// Entity missing at the boundary: first/last valid occurrence overall
    fn resolve_absent(&self, entity_key: &str, boundary: Boundary) -> Resolution {
        let instants = self.timeline.as_slice();
        let (occurrence, found) = match boundary {
            Boundary::Initial => ("first", self.first_valid(entity_key, instants.iter())),
            Boundary::Final => ("last", self.first_valid(entity_key, instants.iter().rev())),
        };

        match found {
            Some(obs) => {
                debug!(
                    entity = entity_key,
                    boundary = boundary.label(),
                    used = %obs.timestamp,
                    "Absent at boundary"
                );
                Resolution::found(
                    obs,
                    Some(format!(
                        "entity absent at {} timestamp, used {} occurrence: {}",
                        boundary.label(),
                        occurrence,
                        format_timestamp(&obs.timestamp)
                    )),
                )
            }
            None => Resolution::unavailable(
                self.boundary_timestamp(boundary),
                None,
                "entity has no valid numeric data in the dataset".to_string(),
            ),
        }
    }
}

impl BoundaryResolver for GridResolver<'_> {
    fn scope(&self) -> &'static str {
        "dataset"
    }

    fn entity_keys(&self) -> Vec<String> {
        self.index
            .entity_keys()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    fn observation_count(&self, entity_key: &str) -> usize {
        self.index.observation_count(entity_key)
    }

    fn resolve_boundary(&self, entity_key: &str, boundary: Boundary) -> Resolution {
        let t0 = self.boundary_timestamp(boundary);
        match self.index.get(&t0, entity_key) {
            Some(obs) if obs.count.is_valid() => Resolution::found(obs, None),
            Some(obs) => self.resolve_invalid(entity_key, boundary, obs),
            None => self.resolve_absent(entity_key, boundary),
        }
    }
}

// ============================================================================
// WINDOW RESOLVER (windowed mode)
// ============================================================================

pub struct WindowResolver<'a> {
    windows: &'a EntityWindows,
}

impl<'a> WindowResolver<'a> {
    pub fn new(windows: &'a EntityWindows) -> Self {
        WindowResolver { windows }
    }
}

impl BoundaryResolver for WindowResolver<'_> {
    fn scope(&self) -> &'static str {
        "window"
    }

    fn entity_keys(&self) -> Vec<String> {
        self.windows
            .series
            .iter()
            .filter(|(_, observations)| !observations.is_empty())
            .map(|(key, _)| key.clone())
            .collect()
    }

    fn observation_count(&self, entity_key: &str) -> usize {
        self.windows.series.get(entity_key).map_or(0, Vec::len)
    }

    fn resolve_boundary(&self, entity_key: &str, boundary: Boundary) -> Resolution {
        let observations = match self.windows.series.get(entity_key) {
            Some(list) if !list.is_empty() => list,
            _ => {
                return Resolution::unavailable(
                    self.windows.window.opens_at(),
                    None,
                    "entity has no observation in the window".to_string(),
                )
            }
        };

        let (chosen, fallback) = match boundary {
            Boundary::Initial => (
                observations.iter().find(|obs| obs.count.is_valid()),
                observations.first(),
            ),
            Boundary::Final => (
                observations.iter().rev().find(|obs| obs.count.is_valid()),
                observations.last(),
            ),
        };

        match (chosen, fallback) {
            (Some(obs), _) => Resolution::found(obs, None),
            (None, Some(obs)) => Resolution::unavailable(
                obs.timestamp,
                Some(&obs.raw_label),
                format!("no valid {} value in window", boundary.label()),
            ),
            (None, None) => Resolution::unavailable(
                self.windows.window.opens_at(),
                None,
                "entity has no observation in the window".to_string(),
            ),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
