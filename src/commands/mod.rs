pub mod backfill;
pub mod cross_validate;
pub mod fetch;
pub mod prepare;
pub mod process;
pub mod status;
pub mod validate;

use crate::models::Period;

/// Parses a `YYYY-MM` CLI argument, exiting with a usage hint on failure.
pub(crate) fn parse_period_arg(value: &str) -> Period {
    match value.parse() {
        Ok(period) => period,
        Err(e) => {
            eprintln!("❌ Invalid period '{}': {}", value, e);
            eprintln!("   Expected format: YYYY-MM (e.g., 2024-05)");
            std::process::exit(1);
        }
    }
}
