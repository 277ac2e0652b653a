//! Country presence ledger.
//!
//! A persisted, monotonically growing record of which countries have ever
//! been observed for each period. It only ever grows (set union), so it is
//! an optimistic "expected superset" used to decide whether an existing
//! dataset is complete: a hint, not an authority. When a live country list
//! is available it takes precedence.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::Period;

#[derive(Debug, Serialize, Deserialize)]
struct LedgerEntry {
    countries: BTreeSet<String>,
    count: usize,
}

/// Load-at-start / flush-after-run lifecycle; passed explicitly to the
/// fetcher rather than held as ambient global state.
#[derive(Debug)]
pub struct PresenceLedger {
    path: PathBuf,
    entries: BTreeMap<String, LedgerEntry>,
}

impl PresenceLedger {
    /// Loads the ledger, treating a missing or corrupt file as empty.
    pub fn load(path: &Path) -> Self {
        let entries = std::fs::read_to_string(path)
            .ok()
            .and_then(|data| serde_json::from_str(&data).ok())
            .unwrap_or_default();
        Self { path: path.to_path_buf(), entries }
    }

    /// Countries ever observed for `period`, if the period has been seen.
    pub fn expected(&self, period: Period) -> Option<&BTreeSet<String>> {
        self.entries.get(&period.key()).map(|e| &e.countries)
    }

    /// Unions `countries` into the period's entry. Append-only: the
    /// recorded set never shrinks.
    pub fn record(&mut self, period: Period, countries: &BTreeSet<String>) {
        let entry = self
            .entries
            .entry(period.key())
            .or_insert_with(|| LedgerEntry { countries: BTreeSet::new(), count: 0 });
        entry.countries.extend(countries.iter().cloned());
        entry.count = entry.countries.len();
        debug!(period = %period, count = entry.count, "Presence ledger updated");
    }

    pub fn periods_tracked(&self) -> usize {
        self.entries.len()
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(&self.entries)?;
        std::fs::write(&self.path, data)
            .map_err(|e| Error::Io(format!("Cannot write presence ledger: {}", e)))?;
        Ok(())
    }
}
