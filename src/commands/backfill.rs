use std::time::Duration;

use crate::commands::parse_period_arg;
use crate::config::PipelineConfig;
use crate::constants::IMF_START_YEAR;
use crate::models::Period;
use crate::services::RateFetcher;

pub fn run(
    start: Option<String>,
    end: Option<String>,
    chunk_months: usize,
    delay_ms: u64,
    force: bool,
    combined: bool,
) {
    let start = match start {
        Some(value) => parse_period_arg(&value),
        None => match Period::new(IMF_START_YEAR, 1) {
            Ok(p) => p,
            Err(e) => {
                eprintln!("❌ {}", e);
                std::process::exit(1);
            }
        },
    };
    let end = match end {
        Some(value) => parse_period_arg(&value),
        None => Period::last_month(),
    };
    if start > end {
        eprintln!("❌ Start period {} is after end period {}", start, end);
        std::process::exit(1);
    }
    if chunk_months == 0 {
        eprintln!("❌ --chunk-months must be at least 1");
        std::process::exit(1);
    }

    let config = PipelineConfig::from_env();
    if let Err(e) = config.ensure_dirs() {
        eprintln!("❌ Cannot create pipeline directories: {}", e);
        std::process::exit(1);
    }

    println!("💱 Historical backfill {} → {}", start, end);
    println!("   Chunk size: {} months, delay: {}ms", chunk_months, delay_ms);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("❌ Failed to create async runtime: {}", e);
            std::process::exit(1);
        }
    };

    let result = runtime.block_on(async {
        let mut fetcher = RateFetcher::new(&config)?;
        let summary = fetcher
            .backfill(start, end, chunk_months, Duration::from_millis(delay_ms), force)
            .await?;

        let combined_rows = if combined {
            let dest = config.data_dir.join("exchange_rates_ALL.csv");
            Some((fetcher.store().write_combined(&dest)?, dest))
        } else {
            None
        };
        Ok::<_, crate::error::Error>((summary, combined_rows))
    });

    let (summary, combined_rows) = match result {
        Ok(r) => r,
        Err(e) => {
            eprintln!("❌ Backfill failed: {}", e);
            std::process::exit(1);
        }
    };

    println!("\n📊 Backfill summary ({} periods):", summary.total());
    println!("   Fetched: {}", summary.fetched);
    println!("   Skipped (already complete): {}", summary.skipped);
    println!("   Failed: {}", summary.failed);

    if !summary.suspicious_periods.is_empty() {
        println!("\n⚠️  Suspiciously small datasets:");
        for period in &summary.suspicious_periods {
            println!("   - {}", period);
        }
    }
    if !summary.failed_periods.is_empty() {
        println!("\n❌ Failed periods:");
        for (period, error) in &summary.failed_periods {
            println!("   - {}: {}", period, error);
        }
        println!("   Re-run the same command to retry; complete periods are skipped.");
    }

    if let Some((rows, dest)) = combined_rows {
        println!("\n📦 Combined dataset: {} rows → {}", rows, dest.display());
    }
}
