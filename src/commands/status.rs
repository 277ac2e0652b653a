use crate::config::PipelineConfig;
use crate::services::currency_resolver::CurrencyCache;
use crate::services::{PresenceLedger, RateStore};

pub fn run() {
    let config = PipelineConfig::from_env();

    println!("💱 Exchange Rate Pipeline Status\n");

    match show_status(&config) {
        Ok(()) => {}
        Err(e) => {
            eprintln!("❌ Error: {}", e);
            std::process::exit(1);
        }
    }
}

fn show_status(config: &PipelineConfig) -> crate::error::Result<()> {
    let store = RateStore::new(&config.data_dir);
    let catalog = store.catalog()?;

    if catalog.is_empty() {
        println!("⚠️  No exchange rate datasets found. Run 'fetch' or 'backfill' first.");
        return Ok(());
    }

    let mut total_rows = 0usize;
    for period in catalog.keys() {
        total_rows += store.load(*period)?.len();
    }

    let first = catalog.keys().next();
    let last = catalog.keys().next_back();
    println!("📈 Periods stored: {}", catalog.len());
    if let (Some(first), Some(last)) = (first, last) {
        println!("   Range: {} → {}", first, last);
    }
    println!("   Total rows: {}", total_rows);

    let ledger = PresenceLedger::load(&config.presence_ledger_file());
    println!("\n📒 Presence ledger: {} periods tracked", ledger.periods_tracked());

    let cache = CurrencyCache::load(&config.currency_cache_file());
    println!("💰 Currency cache: {} entries", cache.len());

    let pending = pending_manifests(config);
    if pending > 0 {
        println!("\n📦 Pending manifests: {} (run 'process' to consume)", pending);
    } else {
        println!("\n📦 No pending manifests");
    }

    Ok(())
}

fn pending_manifests(config: &PipelineConfig) -> usize {
    let Ok(entries) = std::fs::read_dir(&config.hotfolder_dir) else {
        return 0;
    };
    entries
        .flatten()
        .filter(|e| {
            e.file_name()
                .to_str()
                .map(|n| n.ends_with("_MANIFEST.json"))
                .unwrap_or(false)
        })
        .count()
}
