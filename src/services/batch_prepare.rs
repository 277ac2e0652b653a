//! Manifest builder: stages the newest period dataset and any supplier
//! files into the preprocessing folder and writes the batch manifest the
//! processor consumes.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::models::{BatchManifest, BatchStatus, ManifestFiles};
use crate::services::rate_store::RateStore;

pub struct ManifestBuilder {
    store: RateStore,
    input_dir: PathBuf,
    preprocessing_dir: PathBuf,
    hotfolder_dir: PathBuf,
}

impl ManifestBuilder {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            store: RateStore::new(&config.data_dir),
            input_dir: config.input_dir.clone(),
            preprocessing_dir: config.preprocessing_dir.clone(),
            hotfolder_dir: config.hotfolder_dir.clone(),
        }
    }

    /// Stages preprocessing artifacts and writes the manifest into the
    /// hotfolder. Errors when no period dataset exists to stage.
    pub fn create_manifest(&self) -> Result<PathBuf> {
        let batch_id = Utc::now().format("%Y%m%d%H%M%S").to_string();

        let (period, source_forex) = self.store.latest()?.ok_or_else(|| {
            Error::NotFound("no exchange rate dataset available, run a fetch first".to_string())
        })?;
        info!(batch_id, period = %period, source = %source_forex.display(), "Staging batch");

        std::fs::create_dir_all(&self.preprocessing_dir)?;
        std::fs::create_dir_all(&self.hotfolder_dir)?;

        let forex_dest = self.preprocessing_dir.join(format!("Forex_{}.csv", batch_id));
        std::fs::copy(&source_forex, &forex_dest)?;

        // supplier drops are discovered by filename convention
        let input_csvs = self.input_csvs()?;
        let partner_files: Vec<&PathBuf> =
            input_csvs.iter().filter(|p| name_contains(p, "partner")).collect();
        let unit_files: Vec<&PathBuf> =
            input_csvs.iter().filter(|p| name_contains(p, "unit")).collect();

        let partners_dest =
            self.preprocessing_dir.join(format!("Partner_Data_{}.csv", batch_id));
        stage_merged(&partner_files, &partners_dest, "No partner data found")?;

        let units_dest =
            self.preprocessing_dir.join(format!("Merged_Units_{}.csv", batch_id));
        stage_merged(&unit_files, &units_dest, "No units data found")?;

        let manifest = BatchManifest {
            batch_id: batch_id.clone(),
            creation_timestamp: Utc::now().to_rfc3339(),
            source_forex_file: source_forex,
            status: BatchStatus::ReadyForProcessing,
            files: ManifestFiles {
                partners: partners_dest,
                units: units_dest,
                forex: forex_dest,
            },
            raw_data: input_csvs,
        };

        let manifest_path = self.hotfolder_dir.join(format!("{}_MANIFEST.json", batch_id));
        manifest.save(&manifest_path)?;
        info!(path = %manifest_path.display(), "Manifest written");
        Ok(manifest_path)
    }

    fn input_csvs(&self) -> Result<Vec<PathBuf>> {
        let mut csvs = Vec::new();
        let entries = match std::fs::read_dir(&self.input_dir) {
            Ok(e) => e,
            Err(_) => return Ok(csvs),
        };
        for entry in entries {
            let path = entry?.path();
            let is_csv = path
                .extension()
                .map(|e| e.eq_ignore_ascii_case("csv"))
                .unwrap_or(false);
            if is_csv {
                csvs.push(path);
            }
        }
        csvs.sort();
        Ok(csvs)
    }
}

fn name_contains(path: &Path, needle: &str) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.to_ascii_lowercase().contains(needle))
        .unwrap_or(false)
}

/// Concatenates same-kind supplier files into one staged CSV, keeping the
/// header of the first. With no sources an explicit placeholder is written
/// so the manifest is always structurally complete.
fn stage_merged(sources: &[&PathBuf], dest: &Path, placeholder: &str) -> Result<()> {
    if sources.is_empty() {
        warn!(dest = %dest.display(), "No source files, placeholder written");
        std::fs::write(dest, placeholder)?;
        return Ok(());
    }

    let mut writer = csv::Writer::from_path(dest)?;
    let mut header_written = false;
    for src in sources {
        let mut reader = csv::Reader::from_path(src)?;
        if !header_written {
            writer.write_record(reader.headers()?)?;
            header_written = true;
        }
        for record in reader.records() {
            writer.write_record(&record?)?;
        }
    }
    writer.flush()?;
    info!(files = sources.len(), dest = %dest.display(), "Merged supplier files");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config_in(tmp: &TempDir) -> PipelineConfig {
        let config =
            PipelineConfig::with_roots(&tmp.path().join("data"), &tmp.path().join("pipe"));
        config.ensure_dirs().unwrap();
        config
    }

    fn seed_dataset(config: &PipelineConfig) {
        std::fs::write(
            config.data_dir.join("exchange_rates_2024_05.csv"),
            "Country,Currency,Date,Exchange_Rate,Base_Currency,Timestamp\n\
             GHA,GHS,202405,15.2,USD,2024-06-01T00:00:00Z\n",
        )
        .unwrap();
    }

    #[test]
    fn errors_without_any_dataset() {
        let tmp = TempDir::new().unwrap();
        let builder = ManifestBuilder::new(&config_in(&tmp));
        assert!(matches!(builder.create_manifest(), Err(Error::NotFound(_))));
    }

    #[test]
    fn stages_forex_and_placeholders() {
        let tmp = TempDir::new().unwrap();
        let config = config_in(&tmp);
        seed_dataset(&config);

        let manifest_path = ManifestBuilder::new(&config).create_manifest().unwrap();
        let manifest = BatchManifest::load(&manifest_path).unwrap();

        assert_eq!(manifest.status, BatchStatus::ReadyForProcessing);
        assert!(manifest.files.forex.exists());
        assert!(manifest.raw_data.is_empty());

        // no supplier drops: both staged files are placeholders
        let partners = std::fs::read_to_string(&manifest.files.partners).unwrap();
        assert_eq!(partners, "No partner data found");
        let units = std::fs::read_to_string(&manifest.files.units).unwrap();
        assert_eq!(units, "No units data found");
    }

    #[test]
    fn merges_partner_files_and_records_raw_inputs() {
        let tmp = TempDir::new().unwrap();
        let config = config_in(&tmp);
        seed_dataset(&config);

        std::fs::write(
            config.input_dir.join("Partner_West.csv"),
            "Country,Partner\nGHA,Acme\n",
        )
        .unwrap();
        std::fs::write(
            config.input_dir.join("partner_east.csv"),
            "Country,Partner\nNGA,Globex\n",
        )
        .unwrap();
        std::fs::write(config.input_dir.join("notes.txt"), "ignored").unwrap();

        let manifest_path = ManifestBuilder::new(&config).create_manifest().unwrap();
        let manifest = BatchManifest::load(&manifest_path).unwrap();

        assert_eq!(manifest.raw_data.len(), 2);

        let merged = std::fs::read_to_string(&manifest.files.partners).unwrap();
        assert!(merged.starts_with("Country,Partner\n"));
        assert!(merged.contains("GHA,Acme"));
        assert!(merged.contains("NGA,Globex"));
        // header appears exactly once
        assert_eq!(merged.matches("Country,Partner").count(), 1);
    }
}
