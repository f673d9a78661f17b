// ⏰ Temporal Model - Snapshot time made explicit
//
// Every snapshot row carries an execution date + execution time. Together they
// are the sort key AND the index key, so they are parsed into a real instant
// (never compared as text).
//
// Window semantics: [start 00:00:00, end + 1 day 00:00:00)

use crate::error::IngestError;
use chrono::{Days, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parse an execution date ("YYYY-MM-DD") and time ("HH:MM:SS" or "HH:MM")
pub fn parse_timestamp(date: &str, time: &str) -> Option<NaiveDateTime> {
    let date = NaiveDate::parse_from_str(date.trim(), DATE_FORMAT).ok()?;
    let time = time.trim();
    let time = NaiveTime::parse_from_str(time, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(time, "%H:%M"))
        .ok()?;
    Some(date.and_time(time))
}

/// Parse a user-supplied "YYYY-MM-DD" date
pub fn parse_date(date: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(date.trim(), DATE_FORMAT).ok()
}

/// Render a timestamp the way the report prints it
pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

// ============================================================================
// TIMELINE
// ============================================================================

/// Distinct snapshot timestamps, strictly ascending. Read-only once built.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    instants: Vec<NaiveDateTime>,
}

impl Timeline {
    /// Build from any set of instants (sorted + deduplicated here)
    pub fn new(mut instants: Vec<NaiveDateTime>) -> Self {
        instants.sort();
        instants.dedup();
        Timeline { instants }
    }

    pub fn len(&self) -> usize {
        self.instants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instants.is_empty()
    }

    pub fn earliest(&self) -> Option<NaiveDateTime> {
        self.instants.first().copied()
    }

    pub fn latest(&self) -> Option<NaiveDateTime> {
        self.instants.last().copied()
    }

    pub fn as_slice(&self) -> &[NaiveDateTime] {
        &self.instants
    }

    /// Instants strictly after `ts`, nearest first
    pub fn after(&self, ts: NaiveDateTime) -> impl Iterator<Item = &NaiveDateTime> + '_ {
        let start = self.instants.partition_point(|t| *t <= ts);
        self.instants[start..].iter()
    }

    /// Instants strictly before `ts`, nearest first
    pub fn before(&self, ts: NaiveDateTime) -> impl Iterator<Item = &NaiveDateTime> + '_ {
        let end = self.instants.partition_point(|t| *t < ts);
        self.instants[..end].iter().rev()
    }
}

// ============================================================================
// WINDOW
// ============================================================================

/// Inclusive date range; the end date covers its whole day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Window {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, IngestError> {
        if start > end {
            return Err(IngestError::InvalidWindow { start, end });
        }
        Ok(Window { start, end })
    }

    /// First instant inside the window
    pub fn opens_at(&self) -> NaiveDateTime {
        self.start.and_time(NaiveTime::MIN)
    }

    /// First instant after the window (midnight following `end`), if representable
    pub fn closes_at(&self) -> Option<NaiveDateTime> {
        self.end
            .checked_add_days(Days::new(1))
            .map(|next| next.and_time(NaiveTime::MIN))
    }

    pub fn contains(&self, ts: NaiveDateTime) -> bool {
        if ts < self.opens_at() {
            return false;
        }
        match self.closes_at() {
            Some(close) => ts < close,
            None => true,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
