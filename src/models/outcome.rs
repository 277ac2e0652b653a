use std::collections::BTreeSet;

use crate::models::Period;

/// What happened to one period during an acquisition run.
///
/// Each unit of work resolves to exactly one of these; the caller
/// aggregates them instead of inferring state from logs.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// Dataset already complete per the ledger; no network call was made.
    Skipped { rows: usize, countries: BTreeSet<String> },
    /// Fresh data fetched and persisted. `suspicious` means the country
    /// count fell below the configured floor; the file was saved anyway.
    Fetched { rows: usize, countries: BTreeSet<String>, suspicious: bool },
    /// Retries exhausted; the rest of the run continued without this period.
    Failed { error: String },
}

impl FetchOutcome {
    pub fn countries(&self) -> Option<&BTreeSet<String>> {
        match self {
            FetchOutcome::Skipped { countries, .. } | FetchOutcome::Fetched { countries, .. } => {
                Some(countries)
            }
            FetchOutcome::Failed { .. } => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PeriodResult {
    pub period: Period,
    pub outcome: FetchOutcome,
}

/// Aggregated result of a multi-period acquisition run.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub fetched: usize,
    pub skipped: usize,
    pub failed: usize,
    pub suspicious_periods: Vec<Period>,
    pub failed_periods: Vec<(Period, String)>,
    pub results: Vec<PeriodResult>,
}

impl RunSummary {
    pub fn record(&mut self, period: Period, outcome: FetchOutcome) {
        match &outcome {
            FetchOutcome::Skipped { .. } => self.skipped += 1,
            FetchOutcome::Fetched { suspicious, .. } => {
                self.fetched += 1;
                if *suspicious {
                    self.suspicious_periods.push(period);
                }
            }
            FetchOutcome::Failed { error } => {
                self.failed += 1;
                self.failed_periods.push((period, error.clone()));
            }
        }
        self.results.push(PeriodResult { period, outcome });
    }

    pub fn total(&self) -> usize {
        self.fetched + self.skipped + self.failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_counts_by_outcome() {
        let mut summary = RunSummary::default();
        let p1: Period = "202401".parse().unwrap();
        let p2: Period = "202402".parse().unwrap();
        let p3: Period = "202403".parse().unwrap();

        summary.record(
            p1,
            FetchOutcome::Skipped { rows: 180, countries: BTreeSet::new() },
        );
        summary.record(
            p2,
            FetchOutcome::Fetched { rows: 30, countries: BTreeSet::new(), suspicious: true },
        );
        summary.record(p3, FetchOutcome::Failed { error: "timeout".to_string() });

        assert_eq!(summary.total(), 3);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.fetched, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.suspicious_periods, vec![p2]);
        assert_eq!(summary.failed_periods[0].0, p3);
    }
}
