//! Period dataset persistence.
//!
//! One CSV per month under the data directory, named
//! `exchange_rates_YYYY_MM.csv`. The store owns every read, write, backup
//! and discovery of these files; nothing else parses dataset filenames.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::models::{sort_records, ExchangeRateRecord, Period};

pub struct RateStore {
    data_dir: PathBuf,
}

impl RateStore {
    pub fn new(data_dir: &Path) -> Self {
        Self { data_dir: data_dir.to_path_buf() }
    }

    pub fn dataset_path(&self, period: Period) -> PathBuf {
        self.data_dir
            .join(format!("exchange_rates_{}.csv", period.file_key()))
    }

    pub fn exists(&self, period: Period) -> bool {
        self.dataset_path(period).exists()
    }

    /// Persists a period dataset, sorted by `(Country, Date)` for
    /// deterministic output across runs.
    pub fn save(&self, period: Period, mut records: Vec<ExchangeRateRecord>) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.data_dir)?;
        sort_records(&mut records);

        let path = self.dataset_path(period);
        let mut writer = csv::Writer::from_path(&path)
            .map_err(|e| Error::Io(format!("Cannot create {}: {}", path.display(), e)))?;
        for record in &records {
            writer.serialize(record)?;
        }
        writer
            .flush()
            .map_err(|e| Error::Io(format!("Cannot flush {}: {}", path.display(), e)))?;

        debug!(period = %period, rows = records.len(), "Dataset saved");
        Ok(path)
    }

    /// Loads a period dataset. A missing file is `NotFound`; a file whose
    /// columns do not match the schema is a structural `Parse` error, not a
    /// degraded result.
    pub fn load(&self, period: Period) -> Result<Vec<ExchangeRateRecord>> {
        let path = self.dataset_path(period);
        load_records(&path)
    }

    /// Renames the existing dataset to `.csv.bak` before a re-fetch
    /// overwrites it. The old data is never deleted.
    pub fn backup(&self, period: Period) -> Result<PathBuf> {
        let path = self.dataset_path(period);
        let backup_path = path.with_extension("csv.bak");
        std::fs::rename(&path, &backup_path)
            .map_err(|e| Error::Io(format!("Cannot back up {}: {}", path.display(), e)))?;
        info!(period = %period, backup = %backup_path.display(), "Existing dataset backed up");
        Ok(backup_path)
    }

    /// The distinct country set of a persisted dataset.
    pub fn countries(&self, period: Period) -> Result<BTreeSet<String>> {
        Ok(self
            .load(period)?
            .into_iter()
            .map(|r| r.country)
            .collect())
    }

    /// Scans the data directory once and returns every persisted period in
    /// order. Built at run start; call sites index by `Period` instead of
    /// re-parsing filenames.
    pub fn catalog(&self) -> Result<BTreeMap<Period, PathBuf>> {
        let mut catalog = BTreeMap::new();
        let entries = match std::fs::read_dir(&self.data_dir) {
            Ok(e) => e,
            Err(_) => return Ok(catalog), // no data yet
        };

        for entry in entries {
            let path = entry?.path();
            let name = match path.file_name().and_then(|n| n.to_str()) {
                Some(n) => n,
                None => continue,
            };
            if let Some(period) = parse_dataset_filename(name) {
                catalog.insert(period, path);
            }
        }
        Ok(catalog)
    }

    /// Most recently modified dataset file; the manifest builder's primary
    /// input.
    pub fn latest(&self) -> Result<Option<(Period, PathBuf)>> {
        let mut newest: Option<(Period, PathBuf, std::time::SystemTime)> = None;
        for (period, path) in self.catalog()? {
            let mtime = std::fs::metadata(&path)?.modified()?;
            match &newest {
                Some((_, _, best)) if *best >= mtime => {}
                _ => newest = Some((period, path, mtime)),
            }
        }
        Ok(newest.map(|(p, path, _)| (p, path)))
    }

    /// Concatenates every persisted period into one combined CSV, sorted by
    /// `(Country, Date)`.
    pub fn write_combined(&self, dest: &Path) -> Result<usize> {
        let mut all_records = Vec::new();
        for period in self.catalog()?.keys() {
            all_records.extend(self.load(*period)?);
        }
        sort_records(&mut all_records);

        let mut writer = csv::Writer::from_path(dest)
            .map_err(|e| Error::Io(format!("Cannot create {}: {}", dest.display(), e)))?;
        for record in &all_records {
            writer.serialize(record)?;
        }
        writer
            .flush()
            .map_err(|e| Error::Io(format!("Cannot flush {}: {}", dest.display(), e)))?;

        info!(rows = all_records.len(), dest = %dest.display(), "Combined dataset written");
        Ok(all_records.len())
    }
}

/// Loads records from a dataset-shaped CSV.
pub fn load_records(path: &Path) -> Result<Vec<ExchangeRateRecord>> {
    if !path.exists() {
        return Err(Error::NotFound(format!("Dataset not found: {}", path.display())));
    }
    let mut reader = csv::Reader::from_path(path)
        .map_err(|e| Error::Io(format!("Cannot open {}: {}", path.display(), e)))?;

    let mut records = Vec::new();
    for row in reader.deserialize() {
        let record: ExchangeRateRecord = row.map_err(|e| {
            Error::Parse(format!("Structurally invalid dataset {}: {}", path.display(), e))
        })?;
        records.push(record);
    }
    Ok(records)
}

fn parse_dataset_filename(name: &str) -> Option<Period> {
    let stem = name
        .strip_prefix("exchange_rates_")?
        .strip_suffix(".csv")?;
    // combined exports like exchange_rates_ALL.csv are not period datasets
    stem.parse().ok()
}
