use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Lifecycle of one batch. The manifest is written as
/// `READY_FOR_PROCESSING`; the terminal disposition is expressed by where
/// the files end up (archive vs quarantine), not by rewriting the manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchStatus {
    #[serde(rename = "READY_FOR_PROCESSING")]
    ReadyForProcessing,
    #[serde(rename = "PROCESSED")]
    Processed,
    #[serde(rename = "FAILED")]
    Failed,
}

/// The three staged preprocessing files every manifest references.
/// Partner/unit entries may point at explicit placeholder files so the
/// manifest shape is always structurally complete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestFiles {
    pub partners: PathBuf,
    pub units: PathBuf,
    pub forex: PathBuf,
}

/// Structured reference document describing which files constitute one
/// processing batch. Consumed exactly once by the batch processor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchManifest {
    pub batch_id: String,
    pub creation_timestamp: String,
    pub source_forex_file: PathBuf,
    pub status: BatchStatus,
    pub files: ManifestFiles,
    pub raw_data: Vec<PathBuf>,
}

impl BatchManifest {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            Error::NotFound(format!("Cannot read manifest {}: {}", path.display(), e))
        })?;
        let manifest: BatchManifest = serde_json::from_str(&data)
            .map_err(|e| Error::Parse(format!("Invalid manifest {}: {}", path.display(), e)))?;
        Ok(manifest)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_json::to_string_pretty(self)?;
        std::fs::write(path, data)
            .map_err(|e| Error::Io(format!("Cannot write manifest {}: {}", path.display(), e)))?;
        Ok(())
    }

    /// Every file the archive/quarantine discipline must cover: the staged
    /// preprocessing files, the raw inputs, and the manifest itself.
    pub fn referenced_files(&self, manifest_path: &Path) -> Vec<PathBuf> {
        let mut files = vec![
            manifest_path.to_path_buf(),
            self.files.forex.clone(),
            self.files.partners.clone(),
            self.files.units.clone(),
        ];
        files.extend(self.raw_data.iter().cloned());
        files
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_manifest() -> BatchManifest {
        BatchManifest {
            batch_id: "20240601120000".to_string(),
            creation_timestamp: "2024-06-01T12:00:00Z".to_string(),
            source_forex_file: PathBuf::from("data/exchange_rates_2024_05.csv"),
            status: BatchStatus::ReadyForProcessing,
            files: ManifestFiles {
                partners: PathBuf::from("pre/Partner_Data_20240601120000.csv"),
                units: PathBuf::from("pre/Merged_Units_20240601120000.csv"),
                forex: PathBuf::from("pre/Forex_20240601120000.csv"),
            },
            raw_data: vec![PathBuf::from("input/partners_q2.csv")],
        }
    }

    #[test]
    fn save_load_round_trip() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("20240601120000_MANIFEST.json");

        let manifest = sample_manifest();
        manifest.save(&path).unwrap();
        let loaded = BatchManifest::load(&path).unwrap();

        assert_eq!(loaded.batch_id, manifest.batch_id);
        assert_eq!(loaded.status, BatchStatus::ReadyForProcessing);
        assert_eq!(loaded.files.forex, manifest.files.forex);
    }

    #[test]
    fn status_serializes_screaming_case() {
        let json = serde_json::to_string(&BatchStatus::ReadyForProcessing).unwrap();
        assert_eq!(json, "\"READY_FOR_PROCESSING\"");
    }

    #[test]
    fn referenced_files_include_manifest_and_raw_inputs() {
        let manifest = sample_manifest();
        let files = manifest.referenced_files(Path::new("hot/20240601120000_MANIFEST.json"));
        assert_eq!(files.len(), 5);
        assert!(files.contains(&PathBuf::from("hot/20240601120000_MANIFEST.json")));
        assert!(files.contains(&PathBuf::from("input/partners_q2.csv")));
    }

    #[test]
    fn missing_manifest_is_not_found() {
        let err = BatchManifest::load(Path::new("/nonexistent/MANIFEST.json")).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
