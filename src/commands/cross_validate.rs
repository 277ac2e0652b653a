use crate::commands::parse_period_arg;
use crate::config::PipelineConfig;
use crate::services::validator::ReportStatus;
use crate::services::{CrossSelection, Validator};

pub fn run(start: Option<String>, end: Option<String>, sample: Option<usize>) {
    let selection = match (&start, &end, sample) {
        (Some(s), Some(e), None) => {
            CrossSelection::Range(parse_period_arg(s), parse_period_arg(e))
        }
        (None, None, Some(n)) => CrossSelection::Sample(n),
        (None, None, None) => CrossSelection::All,
        _ => {
            eprintln!("❌ Use either --start and --end together, or --sample N, or neither");
            std::process::exit(1);
        }
    };

    let config = PipelineConfig::from_env();
    if let Err(e) = config.ensure_dirs() {
        eprintln!("❌ Cannot create pipeline directories: {}", e);
        std::process::exit(1);
    }

    println!("🔍 Cross-validating stored rates against the live source");

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("❌ Failed to create async runtime: {}", e);
            std::process::exit(1);
        }
    };

    let result = runtime.block_on(async {
        let validator = Validator::new(&config)?;
        let report = validator.cross_validate(selection).await?;
        let report_path = validator.save_cross_report(&report)?;
        Ok::<_, crate::error::Error>((report, report_path))
    });

    let (report, report_path) = match result {
        Ok(r) => r,
        Err(e) => {
            eprintln!("❌ Cross-validation error: {}", e);
            std::process::exit(1);
        }
    };

    println!("\n📊 Cross-validation summary:");
    println!("   Periods checked: {}", report.periods_checked);
    println!("   Rates compared: {}", report.total_compared);
    println!("   Mismatches: {}", report.total_mismatches);
    println!("   Live fetch failures: {}", report.fetch_failures);
    println!("   Accuracy: {:.2}%", report.accuracy_pct);

    for detail in &report.periods {
        if let Some(error) = &detail.fetch_error {
            println!("   ⚠️  {}: live re-fetch failed ({})", detail.period, error);
        } else if detail.mismatch_count > 0 {
            println!(
                "   ⚠️  {}: {} of {} rates disagree",
                detail.period, detail.mismatch_count, detail.compared
            );
        }
    }

    match report.overall_status {
        ReportStatus::Pass => {
            println!("\n✅ PASS");
        }
        _ => {
            println!("\n🔎 REVIEW: check the per-period detail above");
        }
    }
    println!("   Report saved to {}", report_path.display());
}
