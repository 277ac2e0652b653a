use crate::config::PipelineConfig;
use crate::services::ManifestBuilder;

pub fn run() {
    let config = PipelineConfig::from_env();
    if let Err(e) = config.ensure_dirs() {
        eprintln!("❌ Cannot create pipeline directories: {}", e);
        std::process::exit(1);
    }

    println!("📦 Preparing batch from the latest exchange rate dataset");

    match ManifestBuilder::new(&config).create_manifest() {
        Ok(manifest_path) => {
            println!("✅ Manifest written: {}", manifest_path.display());
            println!("   Process it with: fxpipeline process");
        }
        Err(e) => {
            eprintln!("❌ Batch preparation failed: {}", e);
            std::process::exit(1);
        }
    }
}
