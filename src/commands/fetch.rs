use crate::commands::parse_period_arg;
use crate::config::PipelineConfig;
use crate::models::{FetchOutcome, Period};
use crate::services::validator::ReportStatus;
use crate::services::{RateFetcher, ValidateOptions, Validator};

pub fn run(period: Option<String>, force: bool, validate: bool) {
    let period = match period {
        Some(value) => parse_period_arg(&value),
        None => Period::last_month(),
    };

    let config = PipelineConfig::from_env();
    if let Err(e) = config.ensure_dirs() {
        eprintln!("❌ Cannot create pipeline directories: {}", e);
        std::process::exit(1);
    }

    println!("💱 Fetching exchange rates for {}", period);
    if force {
        println!("   Force mode: existing dataset will be replaced");
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("❌ Failed to create async runtime: {}", e);
            std::process::exit(1);
        }
    };

    let outcome = runtime.block_on(async {
        let mut fetcher = RateFetcher::new(&config)?;
        let outcome = fetcher.fetch_period(period, force).await?;
        fetcher.flush()?;
        Ok::<_, crate::error::Error>(outcome)
    });

    match outcome {
        Ok(FetchOutcome::Skipped { rows, countries }) => {
            println!(
                "✅ {} already complete: {} rows, {} countries (no fetch needed)",
                period,
                rows,
                countries.len()
            );
        }
        Ok(FetchOutcome::Fetched { rows, countries, suspicious }) => {
            println!("✅ Saved {}: {} rows, {} countries", period, rows, countries.len());
            if suspicious {
                println!(
                    "⚠️  Only {} countries returned; dataset may be incomplete",
                    countries.len()
                );
            }
        }
        Ok(FetchOutcome::Failed { error }) => {
            eprintln!("❌ Fetch failed for {}: {}", period, error);
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("❌ Fetch failed for {}: {}", period, e);
            std::process::exit(1);
        }
    }

    if validate {
        println!("\n🔍 Validating {}...", period);
        let result = runtime.block_on(async {
            let validator = Validator::new(&config)?;
            let report = validator.validate(period, ValidateOptions::default()).await?;
            validator.save_report(&report)?;
            Ok::<_, crate::error::Error>(report)
        });
        match result {
            Ok(report) if report.overall_status == ReportStatus::Pass => {
                println!("✅ Validation passed ({} rows)", report.total_rows);
            }
            Ok(report) => {
                eprintln!("❌ Validation FAILED:");
                for issue in &report.issues {
                    eprintln!("   - {}", issue);
                }
                std::process::exit(1);
            }
            Err(e) => {
                eprintln!("❌ Validation error: {}", e);
                std::process::exit(1);
            }
        }
    }
}
