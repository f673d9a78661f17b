// 🏷️ Name Normalizer - Overrides as Data
// Raw entity labels → stable canonical keys
//
// "México", "MEXICO", "mexico" → EDOMEX
// "Querétaro"                 → QUERETARO
// "sabg"                      → SECRETARIA_ANTICORRUPCION
//
// Pipeline: upper-case → spaces to underscores → override table lookup.
// Pure and total: unknown input passes through folded.

use crate::error::OverrideError;
use anyhow::{Context as AnyhowContext, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

/// Built-in overrides. Keys are already folded (see `fold`).
const DEFAULT_OVERRIDES: &[(&str, &str)] = &[
    ("MÉXICO", "EDOMEX"),
    ("MEXICO", "EDOMEX"),
    ("SABG", "SECRETARIA_ANTICORRUPCION"),
    ("QUERÉTARO", "QUERETARO"),
    ("MICHOACÁN", "MICHOACAN"),
    ("YUCATÁN", "YUCATAN"),
];

/// Case-fold and underscore a raw label
pub fn fold(raw: &str) -> String {
    raw.to_uppercase().replace(' ', "_")
}

/// Normalize with the built-in override table
pub fn normalize(raw: &str) -> String {
    static DEFAULT: OnceLock<NameNormalizer> = OnceLock::new();
    DEFAULT.get_or_init(NameNormalizer::new).normalize(raw)
}

// ============================================================================
// NAME NORMALIZER
// ============================================================================

#[derive(Debug, Clone)]
pub struct NameNormalizer {
    /// folded raw key → canonical key
    overrides: BTreeMap<String, String>,
}

impl NameNormalizer {
    /// Normalizer with the built-in table
    pub fn new() -> Self {
        NameNormalizer {
            overrides: DEFAULT_OVERRIDES
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    /// Built-in table extended (and, on key clash, replaced) by `extra`.
    ///
    /// Keys of `extra` are folded before use. Targets must already be
    /// canonical and must not themselves be keys, otherwise `normalize`
    /// would stop being idempotent.
    pub fn with_overrides<I, K, V>(extra: I) -> std::result::Result<Self, OverrideError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut normalizer = NameNormalizer::new();
        for (key, target) in extra {
            normalizer.overrides.insert(fold(key.as_ref()), target.into());
        }
        normalizer.validate()?;
        Ok(normalizer)
    }

    /// Load extra overrides from a JSON object file: `{ "RAW": "CANONICAL" }`
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read overrides file: {:?}", path.as_ref()))?;

        let extra: BTreeMap<String, String> = serde_json::from_str(&content)
            .context("Failed to parse overrides JSON")?;

        let normalizer = NameNormalizer::with_overrides(extra)
            .with_context(|| format!("Rejected overrides file: {:?}", path.as_ref()))?;
        Ok(normalizer)
    }

    fn validate(&self) -> std::result::Result<(), OverrideError> {
        for (key, target) in &self.overrides {
            if target.is_empty() || fold(target) != *target {
                return Err(OverrideError::NotCanonical(target.clone()));
            }
            if self.overrides.contains_key(target) {
                return Err(OverrideError::Chained {
                    source_key: key.clone(),
                    target: target.clone(),
                });
            }
        }
        Ok(())
    }

    /// Canonical key for a raw label. Never fails.
    pub fn normalize(&self, raw: &str) -> String {
        let folded = fold(raw);
        match self.overrides.get(&folded) {
            Some(canonical) => canonical.clone(),
            None => folded,
        }
    }

    /// Get number of overrides loaded
    pub fn override_count(&self) -> usize {
        self.overrides.len()
    }
}

impl Default for NameNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================
