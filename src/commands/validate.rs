use crate::commands::parse_period_arg;
use crate::config::PipelineConfig;
use crate::services::validator::ReportStatus;
use crate::services::{ValidateOptions, Validator};

pub fn run(period: String, offline: bool, accuracy: bool, fail_on_issues: bool) {
    let period = parse_period_arg(&period);
    let config = PipelineConfig::from_env();
    if let Err(e) = config.ensure_dirs() {
        eprintln!("❌ Cannot create pipeline directories: {}", e);
        std::process::exit(1);
    }

    println!("🔍 Validating {}{}", period, if offline { " (offline)" } else { "" });

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("❌ Failed to create async runtime: {}", e);
            std::process::exit(1);
        }
    };

    let result = runtime.block_on(async {
        let validator = Validator::new(&config)?;
        let report = validator
            .validate(period, ValidateOptions { offline, accuracy })
            .await?;
        let report_path = validator.save_report(&report)?;
        Ok::<_, crate::error::Error>((report, report_path))
    });

    let (report, report_path) = match result {
        Ok(r) => r,
        Err(e) => {
            eprintln!("❌ Validation error: {}", e);
            std::process::exit(1);
        }
    };

    println!("   Rows: {}", report.total_rows);
    if let Some(coverage) = &report.checks.coverage {
        println!(
            "   Coverage: {:.1}% ({} local / {} live)",
            coverage.coverage_pct, coverage.local_count, coverage.live_count
        );
    }
    if !report.checks.month_on_month.is_empty() {
        println!(
            "   ⚠️  {} large month-over-month swings (advisory)",
            report.checks.month_on_month.len()
        );
    }
    if let Some(acc) = &report.checks.accuracy {
        println!(
            "   Accuracy: {} compared, {} mismatches",
            acc.compared,
            acc.mismatches.len()
        );
    }

    match report.overall_status {
        ReportStatus::Pass => {
            println!("\n✅ PASS");
            println!("   Report saved to {}", report_path.display());
        }
        _ => {
            println!("\n❌ FAIL with {} issue(s):", report.issues.len());
            for issue in &report.issues {
                println!("   - {}", issue);
            }
            println!("   Report saved to {}", report_path.display());
            if fail_on_issues {
                std::process::exit(1);
            }
        }
    }
}
