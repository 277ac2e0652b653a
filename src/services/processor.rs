//! Manifest-driven batch processor.
//!
//! One batch runs CREATED -> TRANSFORMING -> ARCHIVED or QUARANTINED.
//! Files are copied into the batch archive first and originals removed
//! only after every copy lands, so a crash at any point leaves the inputs
//! recoverable. Failures quarantine copies of every referenced file and
//! re-raise so the caller's retry policy decides what happens next.

use std::path::{Path, PathBuf};

use chrono::Utc;
use csv::StringRecord;
use tracing::{error, info, warn};

use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::models::BatchManifest;

#[derive(Debug)]
pub struct ProcessedBatch {
    pub batch_id: String,
    pub output_path: PathBuf,
    pub rows: usize,
    pub archive_dir: PathBuf,
}

pub struct BatchProcessor {
    hotfolder_dir: PathBuf,
    archive_dir: PathBuf,
    quarantine_dir: PathBuf,
    log_dir: PathBuf,
}

impl BatchProcessor {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            hotfolder_dir: config.hotfolder_dir.clone(),
            archive_dir: config.archive_dir.clone(),
            quarantine_dir: config.quarantine_dir.clone(),
            log_dir: config.log_dir.clone(),
        }
    }

    /// Picks the most recently modified pending manifest in the hotfolder.
    pub fn resolve_latest_manifest(&self) -> Result<PathBuf> {
        let mut newest: Option<(std::time::SystemTime, PathBuf)> = None;
        let entries = std::fs::read_dir(&self.hotfolder_dir).map_err(|e| {
            Error::NotFound(format!(
                "Cannot read hotfolder {}: {}",
                self.hotfolder_dir.display(),
                e
            ))
        })?;
        for entry in entries {
            let path = entry?.path();
            let is_manifest = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.ends_with("_MANIFEST.json"))
                .unwrap_or(false);
            if !is_manifest {
                continue;
            }
            let mtime = std::fs::metadata(&path)?.modified()?;
            if newest.as_ref().map(|(t, _)| mtime >= *t).unwrap_or(true) {
                newest = Some((mtime, path));
            }
        }
        newest.map(|(_, path)| path).ok_or_else(|| {
            Error::NotFound(format!(
                "No manifest files found in {}",
                self.hotfolder_dir.display()
            ))
        })
    }

    /// Full processing cycle for one manifest. Archives on success,
    /// quarantines and re-raises on failure.
    pub fn process(&self, manifest_path: &Path) -> Result<ProcessedBatch> {
        let manifest = BatchManifest::load(manifest_path)?;
        let batch_id = manifest.batch_id.clone();
        let all_files = manifest.referenced_files(manifest_path);
        info!(batch_id, files = all_files.len(), "Processing batch");

        match self.run_batch(&manifest, &all_files) {
            Ok(processed) => {
                info!(batch_id, rows = processed.rows, "Batch archived");
                Ok(processed)
            }
            Err(e) => {
                error!(batch_id, error = %e, "Batch failed, quarantining");
                self.quarantine(&batch_id, &all_files, &e);
                Err(Error::Batch(format!("{}: {}", batch_id, e)))
            }
        }
    }

    fn run_batch(&self, manifest: &BatchManifest, all_files: &[PathBuf]) -> Result<ProcessedBatch> {
        let (headers, rows) = transform(manifest)?;

        let batch_archive = self.archive_dir.join(&manifest.batch_id);
        std::fs::create_dir_all(&batch_archive)?;

        let output_path =
            batch_archive.join(format!("processed_output_{}.csv", manifest.batch_id));
        write_output(&output_path, &headers, &rows)?;

        copy_to_folder(all_files, &batch_archive)?;
        remove_files(all_files);
        self.write_success_log(manifest, rows.len(), &batch_archive)?;

        Ok(ProcessedBatch {
            batch_id: manifest.batch_id.clone(),
            output_path,
            rows: rows.len(),
            archive_dir: batch_archive,
        })
    }

    /// Best-effort only. The original files stay where they are and the
    /// triggering error still propagates.
    fn quarantine(&self, batch_id: &str, all_files: &[PathBuf], cause: &Error) {
        let folder = self.quarantine_dir.join(batch_id);
        if let Err(e) = std::fs::create_dir_all(&folder) {
            warn!(error = %e, "Cannot create quarantine folder");
            return;
        }
        if let Err(e) = copy_to_folder(all_files, &folder) {
            warn!(error = %e, "Quarantine copy incomplete");
        }
        if let Err(e) = self.write_error_log(batch_id, cause) {
            warn!(error = %e, "Cannot write error log");
        }
    }

    fn write_success_log(
        &self,
        manifest: &BatchManifest,
        rows: usize,
        batch_archive: &Path,
    ) -> Result<()> {
        std::fs::create_dir_all(&self.log_dir)?;
        let log = format!(
            "Batch {} completed successfully at {}\nOutput rows: {}\nArchive: {}\n",
            manifest.batch_id,
            Utc::now().to_rfc3339(),
            rows,
            batch_archive.display()
        );
        std::fs::write(
            self.log_dir.join(format!("{}_success.log", manifest.batch_id)),
            log,
        )?;
        Ok(())
    }

    fn write_error_log(&self, batch_id: &str, cause: &Error) -> Result<()> {
        std::fs::create_dir_all(&self.log_dir)?;
        let log = format!(
            "Batch: {}\nTimestamp: {}\nError: {}\n",
            batch_id,
            Utc::now().to_rfc3339(),
            cause
        );
        std::fs::write(self.log_dir.join(format!("{}_error.log", batch_id)), log)?;
        Ok(())
    }
}

/// Loads the staged forex file, stamps every row with a processing
/// timestamp, and left-joins partner columns on `Country` when a real
/// partner CSV is present.
fn transform(manifest: &BatchManifest) -> Result<(Vec<String>, Vec<Vec<String>>)> {
    let forex_path = &manifest.files.forex;
    if !forex_path.exists() {
        return Err(Error::NotFound(format!(
            "Forex file not found: {}",
            forex_path.display()
        )));
    }

    let mut reader = csv::Reader::from_path(forex_path)?;
    let mut headers: Vec<String> = reader.headers()?.iter().map(String::from).collect();
    let mut rows: Vec<Vec<String>> = Vec::new();
    for record in reader.records() {
        rows.push(record?.iter().map(String::from).collect());
    }
    info!(rows = rows.len(), file = %forex_path.display(), "Loaded forex data");

    let processed_at = Utc::now().to_rfc3339();
    headers.push("Processed_At".to_string());
    for row in &mut rows {
        row.push(processed_at.clone());
    }

    // placeholders are not CSV; a failed partner read skips the join
    match load_partner_table(&manifest.files.partners, &headers) {
        Some((partner_headers, partner_rows)) => {
            let country_idx = headers.iter().position(|h| h == "Country");
            if let Some(country_idx) = country_idx {
                headers.extend(partner_headers.iter().cloned());
                for row in &mut rows {
                    match row.get(country_idx).and_then(|c| partner_rows.get(c.as_str())) {
                        Some(extra) => row.extend(extra.iter().cloned()),
                        None => row.extend(std::iter::repeat(String::new()).take(partner_headers.len())),
                    }
                }
                info!(columns = partner_headers.len(), "Merged partner data");
            }
        }
        None => {}
    }

    Ok((headers, rows))
}

/// Partner columns other than the join key, keyed by country code.
/// Returns `None` when the file is missing, unreadable, or has no
/// `Country` column.
fn load_partner_table(
    path: &Path,
    existing_headers: &[String],
) -> Option<(Vec<String>, std::collections::HashMap<String, Vec<String>>)> {
    if !path.exists() {
        return None;
    }
    let mut reader = match csv::Reader::from_path(path) {
        Ok(r) => r,
        Err(e) => {
            warn!(file = %path.display(), error = %e, "Cannot read partner file, skipping merge");
            return None;
        }
    };
    let headers: StringRecord = match reader.headers() {
        Ok(h) => h.clone(),
        Err(_) => return None,
    };
    let country_idx = headers.iter().position(|h| h == "Country")?;

    let extra_cols: Vec<(usize, String)> = headers
        .iter()
        .enumerate()
        .filter(|(i, h)| *i != country_idx && !existing_headers.iter().any(|e| e == h))
        .map(|(i, h)| (i, h.to_string()))
        .collect();

    let mut table = std::collections::HashMap::new();
    for record in reader.records() {
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                warn!(file = %path.display(), error = %e, "Malformed partner row, skipping merge");
                return None;
            }
        };
        let country = record.get(country_idx)?.to_string();
        let extras = extra_cols
            .iter()
            .map(|(i, _)| record.get(*i).unwrap_or_default().to_string())
            .collect();
        table.insert(country, extras);
    }

    Some((extra_cols.into_iter().map(|(_, h)| h).collect(), table))
}

fn write_output(path: &Path, headers: &[String], rows: &[Vec<String>]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(headers)?;
    for row in rows {
        writer.write_record(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Copies every existing file into `dest`. A missing source is warned and
/// skipped; an I/O failure on an existing file aborts so originals are
/// never deleted after a partial copy.
fn copy_to_folder(files: &[PathBuf], dest: &Path) -> Result<()> {
    for src in files {
        if !src.exists() {
            warn!(file = %src.display(), "File not found during copy");
            continue;
        }
        let name = src
            .file_name()
            .ok_or_else(|| Error::Io(format!("Bad file name: {}", src.display())))?;
        std::fs::copy(src, dest.join(name))?;
    }
    Ok(())
}

/// Deletes originals after a confirmed successful copy. Best-effort.
fn remove_files(files: &[PathBuf]) {
    for src in files {
        if src.exists() {
            if let Err(e) = std::fs::remove_file(src) {
                warn!(file = %src.display(), error = %e, "Could not remove original");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BatchStatus, ManifestFiles};
    use tempfile::TempDir;

    fn config_in(tmp: &TempDir) -> PipelineConfig {
        let config =
            PipelineConfig::with_roots(&tmp.path().join("data"), &tmp.path().join("pipe"));
        config.ensure_dirs().unwrap();
        config
    }

    fn stage_batch(config: &PipelineConfig, batch_id: &str, partner_csv: Option<&str>) -> PathBuf {
        let forex = config.preprocessing_dir.join(format!("Forex_{}.csv", batch_id));
        std::fs::write(
            &forex,
            "Country,Currency,Date,Exchange_Rate,Base_Currency,Timestamp\n\
             GHA,GHS,202405,15.2,USD,2024-06-01T00:00:00Z\n\
             NGA,NGN,202405,1480.0,USD,2024-06-01T00:00:00Z\n",
        )
        .unwrap();

        let partners = config.preprocessing_dir.join(format!("Partner_Data_{}.csv", batch_id));
        std::fs::write(&partners, partner_csv.unwrap_or("No partner data found")).unwrap();

        let units = config.preprocessing_dir.join(format!("Merged_Units_{}.csv", batch_id));
        std::fs::write(&units, "No units data found").unwrap();

        let manifest = BatchManifest {
            batch_id: batch_id.to_string(),
            creation_timestamp: "2024-06-01T12:00:00Z".to_string(),
            source_forex_file: config.data_dir.join("exchange_rates_2024_05.csv"),
            status: BatchStatus::ReadyForProcessing,
            files: ManifestFiles { partners, units, forex },
            raw_data: vec![],
        };
        let path = config.hotfolder_dir.join(format!("{}_MANIFEST.json", batch_id));
        manifest.save(&path).unwrap();
        path
    }

    #[test]
    fn successful_batch_archives_and_removes_originals() {
        let tmp = TempDir::new().unwrap();
        let config = config_in(&tmp);
        let manifest_path = stage_batch(&config, "20240601120000", None);
        let manifest = BatchManifest::load(&manifest_path).unwrap();

        let processed = BatchProcessor::new(&config).process(&manifest_path).unwrap();

        assert_eq!(processed.rows, 2);
        assert!(processed.output_path.exists());

        // every referenced file copied into the batch archive
        let archive = config.archive_dir.join("20240601120000");
        assert!(archive.join("20240601120000_MANIFEST.json").exists());
        assert!(archive.join("Forex_20240601120000.csv").exists());
        assert!(archive.join("Partner_Data_20240601120000.csv").exists());

        // and no original remains at its source path
        assert!(!manifest_path.exists());
        assert!(!manifest.files.forex.exists());
        assert!(!manifest.files.partners.exists());
        assert!(!manifest.files.units.exists());

        assert!(config.log_dir.join("20240601120000_success.log").exists());
    }

    #[test]
    fn output_is_stamped_and_partner_joined() {
        let tmp = TempDir::new().unwrap();
        let config = config_in(&tmp);
        let manifest_path = stage_batch(
            &config,
            "20240601120001",
            Some("Country,Partner\nGHA,Acme\n"),
        );

        let processed = BatchProcessor::new(&config).process(&manifest_path).unwrap();

        let output = std::fs::read_to_string(&processed.output_path).unwrap();
        let mut lines = output.lines();
        let header = lines.next().unwrap();
        assert!(header.contains("Processed_At"));
        assert!(header.ends_with(",Partner"));

        let gha = lines.clone().find(|l| l.starts_with("GHA")).unwrap();
        assert!(gha.ends_with(",Acme"));
        // no partner row: joined column left empty
        let nga = lines.find(|l| l.starts_with("NGA")).unwrap();
        assert!(nga.ends_with(","));
    }

    #[test]
    fn missing_forex_quarantines_and_keeps_originals() {
        let tmp = TempDir::new().unwrap();
        let config = config_in(&tmp);
        let manifest_path = stage_batch(&config, "20240601120002", None);
        let manifest = BatchManifest::load(&manifest_path).unwrap();
        std::fs::remove_file(&manifest.files.forex).unwrap();

        let err = BatchProcessor::new(&config).process(&manifest_path).unwrap_err();
        assert!(matches!(err, Error::Batch(_)));
        assert!(err.to_string().contains("Forex file not found"));

        // originals untouched
        assert!(manifest_path.exists());
        assert!(manifest.files.partners.exists());

        // quarantine holds best-effort copies plus the failure record
        let quarantine = config.quarantine_dir.join("20240601120002");
        assert!(quarantine.join("20240601120002_MANIFEST.json").exists());
        assert!(quarantine.join("Partner_Data_20240601120002.csv").exists());

        let error_log = config.log_dir.join("20240601120002_error.log");
        let log = std::fs::read_to_string(error_log).unwrap();
        assert!(log.contains("Batch: 20240601120002"));
        assert!(log.contains("Forex file not found"));
    }

    #[test]
    fn resolves_newest_pending_manifest() {
        let tmp = TempDir::new().unwrap();
        let config = config_in(&tmp);
        let processor = BatchProcessor::new(&config);

        assert!(matches!(processor.resolve_latest_manifest(), Err(Error::NotFound(_))));

        stage_batch(&config, "20240601120000", None);
        std::thread::sleep(std::time::Duration::from_millis(25));
        let newer = stage_batch(&config, "20240601120003", None);

        assert_eq!(processor.resolve_latest_manifest().unwrap(), newer);
    }
}
