//! Acquisition engine.
//!
//! Single-period fetch, range fetch (one API call split by period) and the
//! chunked historical backfill. Completeness decisions consult the presence
//! ledger; every unit of work resolves to an explicit `FetchOutcome` which
//! the caller aggregates into a `RunSummary`.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use chrono::Utc;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::constants::{EXPECTED_MIN_COUNTRY_COUNT, IMF_RANGE_TIMEOUT_SECS};
use crate::error::{Error, Result};
use crate::models::{ExchangeRateRecord, FetchOutcome, Period, RunSummary};
use crate::services::currency_resolver::CurrencyResolver;
use crate::services::imf_client::{CountrySeries, ImfClient};
use crate::services::presence_ledger::PresenceLedger;
use crate::services::rate_store::RateStore;

/// Why a period does or does not need a network call.
#[derive(Debug, PartialEq, Eq)]
enum SkipDecision {
    /// No dataset on disk; must fetch.
    NoDataset,
    /// Dataset covers everything the ledger expects; skip.
    Complete,
    /// Dataset exists but the ledger has never seen this period; accept the
    /// file and register its countries.
    FirstTimeTracking,
    /// Ledger expects countries the dataset lacks; re-fetch.
    MissingCountries(usize),
}

/// True when the ledger expects countries the existing dataset lacks.
fn needs_refetch(existing: &BTreeSet<String>, expected: Option<&BTreeSet<String>>) -> bool {
    match expected {
        Some(expected) => !expected.is_subset(existing),
        None => false,
    }
}

pub struct RateFetcher {
    client: ImfClient,
    resolver: CurrencyResolver,
    store: RateStore,
    ledger: PresenceLedger,
    min_country_count: usize,
}

impl RateFetcher {
    pub fn new(config: &PipelineConfig) -> Result<Self> {
        Ok(Self {
            client: ImfClient::new()?,
            resolver: CurrencyResolver::new(&config.currency_cache_file())?,
            store: RateStore::new(&config.data_dir),
            ledger: PresenceLedger::load(&config.presence_ledger_file()),
            min_country_count: EXPECTED_MIN_COUNTRY_COUNT,
        })
    }

    pub fn store(&self) -> &RateStore {
        &self.store
    }

    /// Persists the ledger. Call once at the end of a run; per-period
    /// updates only touch the in-memory state.
    pub fn flush(&self) -> Result<()> {
        self.ledger.save()
    }

    fn skip_decision(&self, period: Period, force: bool) -> Result<SkipDecision> {
        if force || !self.store.exists(period) {
            return Ok(SkipDecision::NoDataset);
        }
        let existing = self.store.countries(period)?;
        match self.ledger.expected(period) {
            None => Ok(SkipDecision::FirstTimeTracking),
            Some(expected) => {
                if needs_refetch(&existing, Some(expected)) {
                    Ok(SkipDecision::MissingCountries(
                        expected.difference(&existing).count(),
                    ))
                } else {
                    Ok(SkipDecision::Complete)
                }
            }
        }
    }

    /// Fetches and persists one period. Completeness-aware: an existing
    /// dataset that covers the ledger's expected set is skipped without a
    /// network call; one with missing countries is backed up and re-fetched.
    pub async fn fetch_period(&mut self, period: Period, force: bool) -> Result<FetchOutcome> {
        match self.skip_decision(period, force)? {
            SkipDecision::Complete => {
                let rows = self.store.load(period)?.len();
                let countries = self.store.countries(period)?;
                info!(period = %period, countries = countries.len(), "Complete, skipping fetch");
                return Ok(FetchOutcome::Skipped { rows, countries });
            }
            SkipDecision::FirstTimeTracking => {
                let rows = self.store.load(period)?.len();
                let countries = self.store.countries(period)?;
                info!(period = %period, "Existing dataset registered with ledger");
                self.ledger.record(period, &countries);
                return Ok(FetchOutcome::Skipped { rows, countries });
            }
            SkipDecision::MissingCountries(missing) => {
                warn!(period = %period, missing, "Countries missing, re-fetching");
            }
            SkipDecision::NoDataset => {}
        }

        let series = self.client.fetch_series(period, period, None).await?;
        let mut by_period = self.build_records(series).await?;
        let records = by_period.remove(&period).unwrap_or_default();
        if records.is_empty() {
            return Err(Error::NotFound(format!(
                "IMF returned no observations for {}",
                period
            )));
        }

        Ok(self.persist(period, records)?)
    }

    /// Fetches `[start, end]` with a single API call and splits the
    /// response by period before persisting each one independently.
    pub async fn fetch_range(
        &mut self,
        start: Period,
        end: Period,
        force: bool,
    ) -> Result<RunSummary> {
        let periods = Period::range(start, end);
        let series = self
            .client
            .fetch_series(start, end, Some(Duration::from_secs(IMF_RANGE_TIMEOUT_SECS)))
            .await?;
        let mut by_period = self.build_records(series).await?;

        let mut summary = RunSummary::default();
        for period in periods {
            let outcome = self.settle_period(period, by_period.remove(&period), force)?;
            summary.record(period, outcome);
        }
        Ok(summary)
    }

    /// Chunked historical backfill: one API call per `chunk_months`-sized
    /// chunk, strictly sequential with an inter-chunk delay. A chunk whose
    /// periods are all complete is skipped without a network call; a failed
    /// chunk marks its pending periods failed and the run continues.
    pub async fn backfill(
        &mut self,
        start: Period,
        end: Period,
        chunk_months: usize,
        chunk_delay: Duration,
        force: bool,
    ) -> Result<RunSummary> {
        let chunks = Period::chunks(start, end, chunk_months);
        let total_months = Period::range(start, end).len();
        info!(
            months = total_months,
            chunks = chunks.len(),
            chunk_months,
            "Starting chunked backfill"
        );

        let mut summary = RunSummary::default();

        for (idx, &(chunk_start, chunk_end)) in chunks.iter().enumerate() {
            let chunk_periods = Period::range(chunk_start, chunk_end);

            let mut pending = Vec::new();
            for &period in &chunk_periods {
                match self.skip_decision(period, force)? {
                    SkipDecision::Complete => {
                        let rows = self.store.load(period)?.len();
                        let countries = self.store.countries(period)?;
                        summary.record(period, FetchOutcome::Skipped { rows, countries });
                    }
                    SkipDecision::FirstTimeTracking => {
                        let rows = self.store.load(period)?.len();
                        let countries = self.store.countries(period)?;
                        self.ledger.record(period, &countries);
                        summary.record(period, FetchOutcome::Skipped { rows, countries });
                    }
                    decision => {
                        if let SkipDecision::MissingCountries(missing) = decision {
                            warn!(period = %period, missing, "Countries missing, will re-fetch");
                        }
                        pending.push(period);
                    }
                }
            }

            if pending.is_empty() {
                info!(
                    chunk = idx + 1,
                    total = chunks.len(),
                    start = %chunk_start,
                    end = %chunk_end,
                    "Chunk complete, no call needed"
                );
                continue;
            }

            info!(
                chunk = idx + 1,
                total = chunks.len(),
                start = %chunk_start,
                end = %chunk_end,
                pending = pending.len(),
                "Fetching chunk"
            );

            match self
                .client
                .fetch_series(
                    chunk_start,
                    chunk_end,
                    Some(Duration::from_secs(IMF_RANGE_TIMEOUT_SECS)),
                )
                .await
            {
                Ok(series) => {
                    let mut by_period = self.build_records(series).await?;
                    for period in pending {
                        let outcome = match by_period.remove(&period) {
                            Some(records) if !records.is_empty() => {
                                // always a fresh persist here; completeness
                                // already routed complete periods to Skipped
                                self.persist(period, records)?
                            }
                            _ => FetchOutcome::Failed {
                                error: "no observations in chunk response".to_string(),
                            },
                        };
                        summary.record(period, outcome);
                    }
                }
                Err(e) => {
                    warn!(start = %chunk_start, end = %chunk_end, error = %e, "Chunk failed");
                    for period in pending {
                        summary.record(period, FetchOutcome::Failed { error: e.to_string() });
                    }
                }
            }

            if idx < chunks.len() - 1 {
                sleep(chunk_delay).await;
            }
        }

        self.ledger.save()?;
        info!(
            fetched = summary.fetched,
            skipped = summary.skipped,
            failed = summary.failed,
            "Backfill complete"
        );
        Ok(summary)
    }

    /// Decides one period's fate inside a range fetch. Same completeness
    /// rules as `fetch_period`, except the fresh records are already in
    /// hand so an incomplete dataset is replaced without another call.
    fn settle_period(
        &mut self,
        period: Period,
        records: Option<Vec<ExchangeRateRecord>>,
        force: bool,
    ) -> Result<FetchOutcome> {
        match self.skip_decision(period, force)? {
            SkipDecision::Complete => {
                let rows = self.store.load(period)?.len();
                let countries = self.store.countries(period)?;
                return Ok(FetchOutcome::Skipped { rows, countries });
            }
            SkipDecision::FirstTimeTracking => {
                let rows = self.store.load(period)?.len();
                let countries = self.store.countries(period)?;
                self.ledger.record(period, &countries);
                return Ok(FetchOutcome::Skipped { rows, countries });
            }
            SkipDecision::MissingCountries(missing) => {
                warn!(period = %period, missing, "Countries missing, replacing from range response");
            }
            SkipDecision::NoDataset => {}
        }
        match records {
            Some(records) if !records.is_empty() => self.persist(period, records),
            _ => Ok(FetchOutcome::Failed {
                error: "no observations in range response".to_string(),
            }),
        }
    }

    /// Backs up any existing dataset, writes the new one, and unions the
    /// observed countries into the ledger. Saves even suspiciously small
    /// datasets; dropping data would be irrecoverable.
    fn persist(&mut self, period: Period, records: Vec<ExchangeRateRecord>) -> Result<FetchOutcome> {
        let countries: BTreeSet<String> =
            records.iter().map(|r| r.country.clone()).collect();
        let suspicious = countries.len() < self.min_country_count;
        if suspicious {
            warn!(
                period = %period,
                countries = countries.len(),
                floor = self.min_country_count,
                "Suspiciously few countries, saved anyway"
            );
        }

        if self.store.exists(period) {
            self.store.backup(period)?;
        }
        let rows = records.len();
        self.store.save(period, records)?;
        self.ledger.record(period, &countries);

        info!(period = %period, rows, countries = countries.len(), "Period persisted");
        Ok(FetchOutcome::Fetched { rows, countries, suspicious })
    }

    /// Turns raw IMF series into dataset records, resolving every country's
    /// currency in one batch, keyed by the period each observation belongs to.
    async fn build_records(
        &mut self,
        series: Vec<CountrySeries>,
    ) -> Result<BTreeMap<Period, Vec<ExchangeRateRecord>>> {
        let country_codes: Vec<String> = series
            .iter()
            .map(|s| s.country.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let currency_map = self.resolver.resolve(&country_codes).await?;
        let fetched_at = Utc::now().to_rfc3339();

        let mut by_period: BTreeMap<Period, Vec<ExchangeRateRecord>> = BTreeMap::new();
        for s in series {
            let currency = currency_map.get(&s.country).cloned().flatten();
            for (period, rate) in s.observations {
                by_period.entry(period).or_default().push(ExchangeRateRecord {
                    country: s.country.clone(),
                    currency: currency.clone(),
                    date: period.key(),
                    rate: Some(rate),
                    base_currency: s.base_currency.clone(),
                    timestamp: fetched_at.clone(),
                });
            }
        }
        Ok(by_period)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(codes: &[&str]) -> BTreeSet<String> {
        codes.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn no_ledger_entry_never_forces_refetch() {
        assert!(!needs_refetch(&set(&["GHA"]), None));
    }

    #[test]
    fn superset_or_equal_skips() {
        let expected = set(&["GHA", "NGA"]);
        assert!(!needs_refetch(&set(&["GHA", "NGA"]), Some(&expected)));
        assert!(!needs_refetch(&set(&["GHA", "NGA", "KEN"]), Some(&expected)));
    }

    #[test]
    fn missing_countries_force_refetch() {
        let expected = set(&["GHA", "NGA", "KEN"]);
        assert!(needs_refetch(&set(&["GHA", "NGA"]), Some(&expected)));
    }

    mod skip_decisions {
        use super::*;
        use crate::config::PipelineConfig;
        use crate::models::ExchangeRateRecord;
        use tempfile::TempDir;

        fn record(country: &str, date: &str) -> ExchangeRateRecord {
            ExchangeRateRecord {
                country: country.to_string(),
                currency: Some("XXX".to_string()),
                date: date.to_string(),
                rate: Some(1.0),
                base_currency: "USD".to_string(),
                timestamp: "2024-06-01T00:00:00Z".to_string(),
            }
        }

        fn fetcher_in(tmp: &TempDir) -> RateFetcher {
            let config =
                PipelineConfig::with_roots(&tmp.path().join("data"), &tmp.path().join("pipe"));
            config.ensure_dirs().unwrap();
            RateFetcher::new(&config).unwrap()
        }

        #[test]
        fn complete_period_is_skipped_without_network() {
            let tmp = TempDir::new().unwrap();
            let mut fetcher = fetcher_in(&tmp);
            let period: Period = "202405".parse().unwrap();

            fetcher
                .store
                .save(period, vec![record("GHA", "202405"), record("NGA", "202405")])
                .unwrap();
            fetcher.ledger.record(period, &set(&["GHA", "NGA"]));

            assert_eq!(fetcher.skip_decision(period, false).unwrap(), SkipDecision::Complete);
        }

        #[test]
        fn ledger_gap_demands_refetch() {
            let tmp = TempDir::new().unwrap();
            let mut fetcher = fetcher_in(&tmp);
            let period: Period = "202405".parse().unwrap();

            fetcher.store.save(period, vec![record("GHA", "202405")]).unwrap();
            fetcher.ledger.record(period, &set(&["GHA", "NGA", "KEN"]));

            assert_eq!(
                fetcher.skip_decision(period, false).unwrap(),
                SkipDecision::MissingCountries(2)
            );
        }

        #[test]
        fn untracked_existing_file_is_registered_not_refetched() {
            let tmp = TempDir::new().unwrap();
            let fetcher = fetcher_in(&tmp);
            let period: Period = "202405".parse().unwrap();

            fetcher.store.save(period, vec![record("GHA", "202405")]).unwrap();
            assert_eq!(
                fetcher.skip_decision(period, false).unwrap(),
                SkipDecision::FirstTimeTracking
            );
        }

        #[test]
        fn force_always_fetches() {
            let tmp = TempDir::new().unwrap();
            let mut fetcher = fetcher_in(&tmp);
            let period: Period = "202405".parse().unwrap();

            fetcher.store.save(period, vec![record("GHA", "202405")]).unwrap();
            fetcher.ledger.record(period, &set(&["GHA"]));

            assert_eq!(fetcher.skip_decision(period, true).unwrap(), SkipDecision::NoDataset);
        }

        #[test]
        fn range_settle_replaces_incomplete_dataset() {
            let tmp = TempDir::new().unwrap();
            let mut fetcher = fetcher_in(&tmp);
            let period: Period = "202405".parse().unwrap();

            fetcher.store.save(period, vec![record("GHA", "202405")]).unwrap();
            fetcher.ledger.record(period, &set(&["GHA", "NGA", "KEN"]));

            let fresh = vec![
                record("GHA", "202405"),
                record("NGA", "202405"),
                record("KEN", "202405"),
            ];
            let outcome = fetcher.settle_period(period, Some(fresh), false).unwrap();

            assert!(matches!(outcome, FetchOutcome::Fetched { rows: 3, .. }));
            assert_eq!(fetcher.store.load(period).unwrap().len(), 3);
            // incomplete file backed up, not overwritten in place
            let backup = fetcher.store.dataset_path(period).with_extension("csv.bak");
            assert!(backup.exists());
        }

        #[test]
        fn range_settle_skips_complete_dataset() {
            let tmp = TempDir::new().unwrap();
            let mut fetcher = fetcher_in(&tmp);
            let period: Period = "202405".parse().unwrap();

            fetcher
                .store
                .save(period, vec![record("GHA", "202405"), record("NGA", "202405")])
                .unwrap();
            fetcher.ledger.record(period, &set(&["GHA", "NGA"]));

            let fresh = vec![record("GHA", "202405")];
            let outcome = fetcher.settle_period(period, Some(fresh), false).unwrap();

            assert!(matches!(outcome, FetchOutcome::Skipped { rows: 2, .. }));
            assert_eq!(fetcher.store.load(period).unwrap().len(), 2);
        }

        #[test]
        fn persist_backs_up_flags_suspicious_and_unions_ledger() {
            let tmp = TempDir::new().unwrap();
            let mut fetcher = fetcher_in(&tmp);
            let period: Period = "202405".parse().unwrap();

            fetcher.store.save(period, vec![record("ZWE", "202405")]).unwrap();
            fetcher.ledger.record(period, &set(&["ZWE"]));

            let outcome = fetcher
                .persist(period, vec![record("GHA", "202405"), record("NGA", "202405")])
                .unwrap();

            match outcome {
                FetchOutcome::Fetched { rows, countries, suspicious } => {
                    assert_eq!(rows, 2);
                    assert_eq!(countries.len(), 2);
                    assert!(suspicious); // 2 < EXPECTED_MIN_COUNTRY_COUNT
                }
                other => panic!("expected Fetched, got {:?}", other),
            }

            // old file backed up, not deleted
            let backup = fetcher.store.dataset_path(period).with_extension("csv.bak");
            assert!(backup.exists());

            // ledger unioned: old ZWE still expected alongside new countries
            let expected = fetcher.ledger.expected(period).unwrap();
            assert_eq!(expected, &set(&["GHA", "NGA", "ZWE"]));
        }
    }
}
