//! Pipeline directory layout.
//!
//! Every path the pipeline touches comes from one `PipelineConfig` built at
//! command start and passed explicitly to the services. Override the roots
//! with the `PIPELINE_ROOT` and `FX_DATA_DIR` environment variables.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Monthly exchange rate CSVs produced by the fetcher
    pub data_dir: PathBuf,

    /// Manually supplied partner/unit CSVs waiting for the next batch
    pub input_dir: PathBuf,

    /// Staged copies the manifest references
    pub preprocessing_dir: PathBuf,

    /// Manifests waiting to be processed
    pub hotfolder_dir: PathBuf,

    /// Terminal success location, one subdirectory per batch_id
    pub archive_dir: PathBuf,

    /// Terminal failure location, one subdirectory per batch_id
    pub quarantine_dir: PathBuf,

    /// Per-batch success/error logs
    pub log_dir: PathBuf,

    /// Timestamped validation report JSONs
    pub validation_dir: PathBuf,
}

impl PipelineConfig {
    /// Build the layout from the environment, falling back to
    /// `./data` and `./data_pipeline` next to the working directory.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("FX_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("data"));
        let pipeline_root = std::env::var("PIPELINE_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("data_pipeline"));
        Self::with_roots(&data_dir, &pipeline_root)
    }

    /// Explicit roots, used by tests and by anything embedding the library.
    pub fn with_roots(data_dir: &Path, pipeline_root: &Path) -> Self {
        Self {
            data_dir: data_dir.to_path_buf(),
            input_dir: pipeline_root.join("1_input"),
            preprocessing_dir: pipeline_root.join("2_preprocessing"),
            hotfolder_dir: pipeline_root.join("3_processing_hotfolder"),
            archive_dir: pipeline_root.join("4_archive"),
            quarantine_dir: pipeline_root.join("5_error"),
            log_dir: pipeline_root.join("6_logs"),
            validation_dir: data_dir.join("validation_reports"),
        }
    }

    pub fn currency_cache_file(&self) -> PathBuf {
        self.data_dir.join("currency_cache.json")
    }

    pub fn presence_ledger_file(&self) -> PathBuf {
        self.data_dir.join("country_presence.json")
    }

    /// Create every runtime directory. Call once at command start.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [
            &self.data_dir,
            &self.input_dir,
            &self.preprocessing_dir,
            &self.hotfolder_dir,
            &self.archive_dir,
            &self.quarantine_dir,
            &self.log_dir,
            &self.validation_dir,
        ] {
            std::fs::create_dir_all(dir).map_err(|e| {
                Error::Config(format!("Cannot create {}: {}", dir.display(), e))
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn ensure_dirs_creates_full_layout() {
        let tmp = TempDir::new().unwrap();
        let config =
            PipelineConfig::with_roots(&tmp.path().join("data"), &tmp.path().join("pipeline"));
        config.ensure_dirs().unwrap();

        assert!(config.data_dir.is_dir());
        assert!(config.hotfolder_dir.is_dir());
        assert!(config.quarantine_dir.is_dir());
        assert!(config.validation_dir.is_dir());
    }
}
