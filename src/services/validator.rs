//! Validation engine.
//!
//! A fixed battery of checks against one persisted period dataset, plus a
//! cross-validation mode that runs the live-accuracy check across many
//! periods. Every check is a pure function over already-loaded data; the
//! async surface only gathers inputs and assembles the report.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;

use chrono::Utc;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::constants::{
    is_aggregate_code, MAX_MONTH_ON_MONTH_CHANGE, MAX_REASONABLE_RATE, MIN_REASONABLE_RATE,
    RATE_ACCURACY_TOLERANCE,
};
use crate::error::{Error, Result};
use crate::models::{ExchangeRateRecord, Period};
use crate::services::imf_client::ImfClient;
use crate::services::rate_store::RateStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportStatus {
    #[serde(rename = "PASS")]
    Pass,
    #[serde(rename = "FAIL")]
    Fail,
    #[serde(rename = "REVIEW")]
    Review,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CoverageCheck {
    pub live_count: usize,
    pub local_count: usize,
    pub coverage_pct: f64,
    pub missing: Vec<String>,
    pub extra: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DuplicateFinding {
    pub country: String,
    pub date: String,
    pub count: usize,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct AnomalousRates {
    pub null_rate: Vec<String>,
    pub non_positive: Vec<(String, f64)>,
    pub above_max: Vec<(String, f64)>,
    pub below_min: Vec<(String, f64)>,
}

impl AnomalousRates {
    pub fn count(&self) -> usize {
        self.null_rate.len() + self.non_positive.len() + self.above_max.len() + self.below_min.len()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DateMismatch {
    pub country: String,
    pub found: String,
    pub expected: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SwingFinding {
    pub country: String,
    pub previous: f64,
    pub current: f64,
    pub change_pct: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RateMismatch {
    pub country: String,
    pub stored: f64,
    pub live: f64,
    /// `None` when the live value is zero and a relative difference is
    /// not applicable.
    pub difference_pct: Option<f64>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct AccuracyCheck {
    pub compared: usize,
    pub mismatches: Vec<RateMismatch>,
    /// Countries present locally with no live counterpart. Tracked but
    /// not counted as mismatches.
    pub missing_live: Vec<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ValidationChecks {
    pub coverage: Option<CoverageCheck>,
    pub null_currencies: Vec<String>,
    pub duplicates: Vec<DuplicateFinding>,
    pub anomalous_rates: AnomalousRates,
    pub date_mismatches: Vec<DateMismatch>,
    pub month_on_month: Vec<SwingFinding>,
    pub accuracy: Option<AccuracyCheck>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ValidationReport {
    pub period: String,
    pub generated_at: String,
    pub total_rows: usize,
    pub overall_status: ReportStatus,
    pub issues: Vec<String>,
    pub checks: ValidationChecks,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PeriodAccuracy {
    pub period: String,
    pub status: ReportStatus,
    pub compared: usize,
    pub mismatch_count: usize,
    pub mismatches: Vec<RateMismatch>,
    pub fetch_error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CrossValidationReport {
    pub generated_at: String,
    pub periods_checked: usize,
    pub total_compared: usize,
    pub total_mismatches: usize,
    pub fetch_failures: usize,
    pub accuracy_pct: f64,
    pub overall_status: ReportStatus,
    pub periods: Vec<PeriodAccuracy>,
}

/// Which periods cross-validation should cover.
#[derive(Debug, Clone, Copy)]
pub enum CrossSelection {
    Range(Period, Period),
    Sample(usize),
    All,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ValidateOptions {
    /// Skip every live call; coverage and accuracy checks are omitted.
    pub offline: bool,
    /// Re-fetch the period and compare stored rates to live values.
    pub accuracy: bool,
}

pub fn check_coverage(local: &BTreeSet<String>, live: &BTreeSet<String>) -> CoverageCheck {
    let coverage_pct = if live.is_empty() {
        0.0
    } else {
        let overlap = live.intersection(local).count();
        overlap as f64 / live.len() as f64 * 100.0
    };
    CoverageCheck {
        live_count: live.len(),
        local_count: local.len(),
        coverage_pct,
        missing: live.difference(local).cloned().collect(),
        extra: local.difference(live).cloned().collect(),
    }
}

/// Rows without a resolved currency, minus the aggregate exemption list.
pub fn check_null_currencies(records: &[ExchangeRateRecord]) -> Vec<String> {
    records
        .iter()
        .filter(|r| r.currency.is_none() && !is_aggregate_code(&r.country))
        .map(|r| r.country.clone())
        .collect()
}

pub fn check_duplicates(records: &[ExchangeRateRecord]) -> Vec<DuplicateFinding> {
    let mut counts: BTreeMap<(String, String), usize> = BTreeMap::new();
    for r in records {
        *counts.entry((r.country.clone(), r.date.clone())).or_default() += 1;
    }
    counts
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|((country, date), count)| DuplicateFinding { country, date, count })
        .collect()
}

pub fn check_anomalous_rates(records: &[ExchangeRateRecord]) -> AnomalousRates {
    let mut out = AnomalousRates::default();
    for r in records {
        match r.rate {
            None => out.null_rate.push(r.country.clone()),
            Some(rate) if rate <= 0.0 => out.non_positive.push((r.country.clone(), rate)),
            Some(rate) if rate > MAX_REASONABLE_RATE => {
                out.above_max.push((r.country.clone(), rate))
            }
            Some(rate) if rate < MIN_REASONABLE_RATE => {
                out.below_min.push((r.country.clone(), rate))
            }
            Some(_) => {}
        }
    }
    out
}

/// Every row must carry the period its dataset claims to represent.
pub fn check_date_stamps(records: &[ExchangeRateRecord], period: Period) -> Vec<DateMismatch> {
    let expected = period.key();
    records
        .iter()
        .filter(|r| r.date != expected)
        .map(|r| DateMismatch {
            country: r.country.clone(),
            found: r.date.clone(),
            expected: expected.clone(),
        })
        .collect()
}

/// Advisory only: large swings are often legitimate (redenominations,
/// currency crises) so they never fail the run.
pub fn check_month_swings(
    current: &[ExchangeRateRecord],
    previous: &[ExchangeRateRecord],
) -> Vec<SwingFinding> {
    let prior: HashMap<&str, f64> = previous
        .iter()
        .filter_map(|r| r.rate.map(|rate| (r.country.as_str(), rate)))
        .collect();

    let mut findings = Vec::new();
    for r in current {
        let (Some(rate), Some(&prev)) = (r.rate, prior.get(r.country.as_str())) else {
            continue;
        };
        if prev == 0.0 {
            continue;
        }
        let change = (rate - prev) / prev;
        if change.abs() > MAX_MONTH_ON_MONTH_CHANGE {
            findings.push(SwingFinding {
                country: r.country.clone(),
                previous: prev,
                current: rate,
                change_pct: change * 100.0,
            });
        }
    }
    findings
}

pub fn check_accuracy(
    records: &[ExchangeRateRecord],
    live: &HashMap<String, f64>,
) -> AccuracyCheck {
    let mut out = AccuracyCheck::default();
    for r in records {
        let Some(stored) = r.rate else { continue };
        let Some(&live_rate) = live.get(&r.country) else {
            out.missing_live.push(r.country.clone());
            continue;
        };
        out.compared += 1;

        if live_rate == 0.0 {
            // a relative difference against zero is meaningless
            if stored != 0.0 {
                out.mismatches.push(RateMismatch {
                    country: r.country.clone(),
                    stored,
                    live: live_rate,
                    difference_pct: None,
                });
            }
            continue;
        }

        let diff = ((stored - live_rate) / live_rate).abs();
        if diff > RATE_ACCURACY_TOLERANCE {
            out.mismatches.push(RateMismatch {
                country: r.country.clone(),
                stored,
                live: live_rate,
                difference_pct: Some(diff * 100.0),
            });
        }
    }
    out
}

/// Assembles the full report from already-gathered inputs.
pub fn build_report(
    period: Period,
    records: &[ExchangeRateRecord],
    live_countries: Option<&BTreeSet<String>>,
    previous: Option<&[ExchangeRateRecord]>,
    live_rates: Option<&HashMap<String, f64>>,
) -> ValidationReport {
    let mut checks = ValidationChecks::default();
    let mut issues = Vec::new();

    if let Some(live) = live_countries {
        let coverage = check_coverage(
            &records.iter().map(|r| r.country.clone()).collect(),
            live,
        );
        if !coverage.missing.is_empty() {
            issues.push(format!(
                "Coverage {:.1}%: {} live countries missing locally",
                coverage.coverage_pct,
                coverage.missing.len()
            ));
        }
        checks.coverage = Some(coverage);
    }

    checks.null_currencies = check_null_currencies(records);
    if !checks.null_currencies.is_empty() {
        issues.push(format!(
            "{} countries with unresolved currency",
            checks.null_currencies.len()
        ));
    }

    checks.duplicates = check_duplicates(records);
    if !checks.duplicates.is_empty() {
        issues.push(format!("{} duplicate country/period pairs", checks.duplicates.len()));
    }

    checks.anomalous_rates = check_anomalous_rates(records);
    if checks.anomalous_rates.count() > 0 {
        issues.push(format!("{} anomalous rates", checks.anomalous_rates.count()));
    }

    checks.date_mismatches = check_date_stamps(records, period);
    if !checks.date_mismatches.is_empty() {
        issues.push(format!(
            "{} rows stamped with the wrong period",
            checks.date_mismatches.len()
        ));
    }

    if let Some(previous) = previous {
        checks.month_on_month = check_month_swings(records, previous);
    }

    if let Some(live) = live_rates {
        let accuracy = check_accuracy(records, live);
        if !accuracy.mismatches.is_empty() {
            issues.push(format!(
                "{} of {} rates disagree with the live source",
                accuracy.mismatches.len(),
                accuracy.compared
            ));
        }
        checks.accuracy = Some(accuracy);
    }

    let overall_status = if issues.is_empty() { ReportStatus::Pass } else { ReportStatus::Fail };

    ValidationReport {
        period: period.key(),
        generated_at: Utc::now().to_rfc3339(),
        total_rows: records.len(),
        overall_status,
        issues,
        checks,
    }
}

pub struct Validator {
    client: ImfClient,
    store: RateStore,
    report_dir: PathBuf,
}

impl Validator {
    pub fn new(config: &PipelineConfig) -> Result<Self> {
        Ok(Self {
            client: ImfClient::new()?,
            store: RateStore::new(&config.data_dir),
            report_dir: config.validation_dir.clone(),
        })
    }

    /// Validates one persisted period dataset. A structurally invalid
    /// dataset surfaces as an error rather than a degraded report.
    pub async fn validate(&self, period: Period, options: ValidateOptions) -> Result<ValidationReport> {
        let records = self.store.load(period)?;

        let live_countries = if options.offline {
            None
        } else {
            let live: BTreeSet<String> =
                self.client.fetch_country_list(period).await.into_iter().collect();
            if live.is_empty() {
                warn!(period = %period, "Live country list unavailable, coverage check skipped");
                None
            } else {
                Some(live)
            }
        };

        let previous = match self.store.load(period.pred()) {
            Ok(records) => Some(records),
            Err(Error::NotFound(_)) => None,
            Err(e) => return Err(e),
        };

        let live_rates = if options.accuracy && !options.offline {
            Some(self.live_rates(period).await?)
        } else {
            None
        };

        let report = build_report(
            period,
            &records,
            live_countries.as_ref(),
            previous.as_deref(),
            live_rates.as_ref(),
        );
        info!(
            period = %period,
            status = ?report.overall_status,
            issues = report.issues.len(),
            "Validation complete"
        );
        Ok(report)
    }

    /// Runs the accuracy check across the selection, aggregating agreement.
    /// A period whose live re-fetch fails is tracked separately from one
    /// that fetches but disagrees.
    pub async fn cross_validate(&self, selection: CrossSelection) -> Result<CrossValidationReport> {
        let periods = self.select_periods(selection)?;
        if periods.is_empty() {
            return Err(Error::NotFound("no period datasets to cross-validate".to_string()));
        }
        info!(periods = periods.len(), "Starting cross-validation");

        let mut details = Vec::with_capacity(periods.len());
        let mut total_compared = 0usize;
        let mut total_mismatches = 0usize;
        let mut fetch_failures = 0usize;

        for period in periods {
            let records = self.store.load(period)?;
            match self.live_rates(period).await {
                Ok(live) => {
                    let accuracy = check_accuracy(&records, &live);
                    total_compared += accuracy.compared;
                    total_mismatches += accuracy.mismatches.len();
                    let status = if accuracy.mismatches.is_empty() {
                        ReportStatus::Pass
                    } else {
                        ReportStatus::Review
                    };
                    details.push(PeriodAccuracy {
                        period: period.key(),
                        status,
                        compared: accuracy.compared,
                        mismatch_count: accuracy.mismatches.len(),
                        mismatches: accuracy.mismatches,
                        fetch_error: None,
                    });
                }
                Err(e) => {
                    warn!(period = %period, error = %e, "Live re-fetch failed");
                    fetch_failures += 1;
                    details.push(PeriodAccuracy {
                        period: period.key(),
                        status: ReportStatus::Review,
                        compared: 0,
                        mismatch_count: 0,
                        mismatches: Vec::new(),
                        fetch_error: Some(e.to_string()),
                    });
                }
            }
        }

        let accuracy_pct = if total_compared == 0 {
            if total_mismatches == 0 { 100.0 } else { 0.0 }
        } else {
            (total_compared - total_mismatches) as f64 / total_compared as f64 * 100.0
        };
        let overall_status = if total_mismatches == 0 && fetch_failures == 0 {
            ReportStatus::Pass
        } else {
            ReportStatus::Review
        };

        Ok(CrossValidationReport {
            generated_at: Utc::now().to_rfc3339(),
            periods_checked: details.len(),
            total_compared,
            total_mismatches,
            fetch_failures,
            accuracy_pct,
            overall_status,
            periods: details,
        })
    }

    pub fn save_report(&self, report: &ValidationReport) -> Result<PathBuf> {
        let filename = format!(
            "validation_{}_{}.json",
            report.period,
            Utc::now().format("%Y%m%d_%H%M%S")
        );
        self.write_json(&filename, report)
    }

    pub fn save_cross_report(&self, report: &CrossValidationReport) -> Result<PathBuf> {
        let filename = format!("cross_validation_{}.json", Utc::now().format("%Y%m%d_%H%M%S"));
        self.write_json(&filename, report)
    }

    fn write_json<T: Serialize>(&self, filename: &str, value: &T) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.report_dir)?;
        let path = self.report_dir.join(filename);
        let json = serde_json::to_string_pretty(value)?;
        std::fs::write(&path, json)?;
        info!(path = %path.display(), "Report saved");
        Ok(path)
    }

    fn select_periods(&self, selection: CrossSelection) -> Result<Vec<Period>> {
        let cataloged: Vec<Period> = self.store.catalog()?.into_keys().collect();
        Ok(match selection {
            CrossSelection::All => cataloged,
            CrossSelection::Range(start, end) => cataloged
                .into_iter()
                .filter(|p| *p >= start && *p <= end)
                .collect(),
            CrossSelection::Sample(n) => {
                let mut sampled: Vec<Period> = cataloged
                    .choose_multiple(&mut rand::thread_rng(), n)
                    .copied()
                    .collect();
                sampled.sort();
                sampled
            }
        })
    }

    async fn live_rates(&self, period: Period) -> Result<HashMap<String, f64>> {
        let series = self.client.fetch_series(period, period, None).await?;
        let mut live = HashMap::new();
        for s in series {
            for (obs_period, rate) in s.observations {
                if obs_period == period {
                    live.insert(s.country.clone(), rate);
                }
            }
        }
        Ok(live)
    }
}
