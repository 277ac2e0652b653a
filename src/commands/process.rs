use std::path::PathBuf;

use crate::config::PipelineConfig;
use crate::services::BatchProcessor;

pub fn run(manifest: Option<PathBuf>) {
    let config = PipelineConfig::from_env();
    if let Err(e) = config.ensure_dirs() {
        eprintln!("❌ Cannot create pipeline directories: {}", e);
        std::process::exit(1);
    }

    let processor = BatchProcessor::new(&config);

    let manifest_path = match manifest {
        Some(path) => {
            if !path.exists() {
                eprintln!("❌ Manifest not found: {}", path.display());
                std::process::exit(1);
            }
            path
        }
        None => match processor.resolve_latest_manifest() {
            Ok(path) => {
                println!("📄 Auto-selected latest manifest: {}", path.display());
                path
            }
            Err(e) => {
                eprintln!("❌ {}", e);
                std::process::exit(1);
            }
        },
    };

    match processor.process(&manifest_path) {
        Ok(processed) => {
            println!("✅ Batch {} archived", processed.batch_id);
            println!("   Output: {} ({} rows)", processed.output_path.display(), processed.rows);
            println!("   Archive: {}", processed.archive_dir.display());
        }
        Err(e) => {
            eprintln!("❌ Batch failed: {}", e);
            eprintln!("   Inputs were quarantined; originals are untouched.");
            std::process::exit(1);
        }
    }
}
