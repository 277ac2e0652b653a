mod manifest;
mod outcome;
mod period;
mod rate_record;

pub use manifest::{BatchManifest, BatchStatus, ManifestFiles};
pub use outcome::{FetchOutcome, PeriodResult, RunSummary};
pub use period::Period;
pub use rate_record::{sort_records, ExchangeRateRecord};
