//! Country -> currency resolution.
//!
//! Resolution order: static override table, persisted cache, then the REST
//! Countries API with a bounded worker pool. A code that exhausts its
//! retries is cached as unresolved (negative caching) so later runs do not
//! re-attempt it; delete `currency_cache.json` to retry unresolved codes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::Value;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::constants::{
    currency_override, REST_COUNTRIES_MAX_RETRIES, REST_COUNTRIES_MAX_WORKERS,
    REST_COUNTRIES_TIMEOUT_SECS, REST_COUNTRIES_URL,
};
use crate::error::{Error, Result};

/// Persisted `country -> currency` map. `None` entries are negative cache
/// hits: the lookup was attempted and exhausted its retries.
#[derive(Debug)]
pub struct CurrencyCache {
    path: PathBuf,
    entries: HashMap<String, Option<String>>,
}

impl CurrencyCache {
    /// Loads the cache, treating a missing or corrupt file as empty.
    pub fn load(path: &Path) -> Self {
        let entries = std::fs::read_to_string(path)
            .ok()
            .and_then(|data| serde_json::from_str(&data).ok())
            .unwrap_or_default();
        Self { path: path.to_path_buf(), entries }
    }

    pub fn get(&self, country: &str) -> Option<&Option<String>> {
        self.entries.get(country)
    }

    pub fn insert(&mut self, country: String, currency: Option<String>) {
        self.entries.insert(country, currency);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Flushed once per resolution batch, bounding crash loss to the
    /// in-flight batch.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(&self.entries)?;
        std::fs::write(&self.path, data)
            .map_err(|e| Error::Io(format!("Cannot write currency cache: {}", e)))?;
        Ok(())
    }
}

pub struct CurrencyResolver {
    client: reqwest::Client,
    cache: CurrencyCache,
}

impl CurrencyResolver {
    pub fn new(cache_path: &Path) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REST_COUNTRIES_TIMEOUT_SECS))
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, cache: CurrencyCache::load(cache_path) })
    }

    /// Resolves currency codes for `country_codes`. Overrides win over the
    /// cache, the cache wins over the network. Unknown codes are looked up
    /// in groups of at most `REST_COUNTRIES_MAX_WORKERS` concurrent tasks;
    /// the cache is flushed once after the whole batch completes.
    pub async fn resolve(
        &mut self,
        country_codes: &[String],
    ) -> Result<HashMap<String, Option<String>>> {
        let mut result = HashMap::new();
        let mut to_fetch = Vec::new();

        for code in country_codes {
            if let Some(currency) = currency_override(code) {
                result.insert(code.clone(), Some(currency.to_string()));
            } else if let Some(cached) = self.cache.get(code) {
                result.insert(code.clone(), cached.clone());
            } else {
                to_fetch.push(code.clone());
            }
        }

        if to_fetch.is_empty() {
            return Ok(result);
        }

        info!(count = to_fetch.len(), "Fetching currency codes for new countries");

        for group in to_fetch.chunks(REST_COUNTRIES_MAX_WORKERS) {
            let mut tasks = Vec::new();
            for code in group {
                let client = self.client.clone();
                let code = code.clone();
                tasks.push(tokio::spawn(async move {
                    let currency = fetch_currency(&client, &code).await;
                    (code, currency)
                }));
            }

            for task in futures::future::join_all(tasks).await {
                match task {
                    Ok((code, currency)) => {
                        self.cache.insert(code.clone(), currency.clone());
                        result.insert(code, currency);
                    }
                    Err(e) => {
                        return Err(Error::Other(format!("Currency lookup task panicked: {}", e)))
                    }
                }
            }
        }

        self.cache.save()?;

        let unresolved: Vec<&String> = to_fetch
            .iter()
            .filter(|code| matches!(result.get(*code), Some(None)))
            .collect();
        if !unresolved.is_empty() {
            warn!(codes = ?unresolved, "Could not resolve currency, negative-cached");
        }

        Ok(result)
    }

    pub fn cache(&self) -> &CurrencyCache {
        &self.cache
    }
}

/// One country lookup with local retry. Returns `None` once retries are
/// exhausted, which the caller negative-caches.
async fn fetch_currency(client: &reqwest::Client, country_code: &str) -> Option<String> {
    let url = format!("{}/{}", REST_COUNTRIES_URL, country_code);

    for attempt in 0..REST_COUNTRIES_MAX_RETRIES {
        if attempt > 0 {
            sleep(Duration::from_secs_f64(1.5_f64.powi(attempt as i32 - 1))).await;
        }

        let response = match client.get(&url).send().await {
            Ok(r) => r,
            Err(_) => continue,
        };
        if !response.status().is_success() {
            continue;
        }
        let data: Value = match response.json().await {
            Ok(d) => d,
            Err(_) => continue,
        };

        // Response is an array; the first entry's "currencies" object is
        // keyed by ISO currency code.
        if let Some(currency) = data
            .get(0)
            .and_then(|entry| entry.get("currencies"))
            .and_then(|c| c.as_object())
            .and_then(|c| c.keys().next())
        {
            return Some(currency.clone());
        }
        return None; // valid response, entity genuinely has no currency
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn cache_round_trip_keeps_negative_entries() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("currency_cache.json");

        let mut cache = CurrencyCache::load(&path);
        cache.insert("GHA".to_string(), Some("GHS".to_string()));
        cache.insert("XYZ".to_string(), None);
        cache.save().unwrap();

        let reloaded = CurrencyCache::load(&path);
        assert_eq!(reloaded.get("GHA"), Some(&Some("GHS".to_string())));
        assert_eq!(reloaded.get("XYZ"), Some(&None));
        assert_eq!(reloaded.get("NGA"), None);
    }

    #[test]
    fn corrupt_cache_file_treated_as_empty() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("currency_cache.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(CurrencyCache::load(&path).is_empty());
    }

    #[tokio::test]
    async fn cached_and_overridden_codes_skip_the_network() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("currency_cache.json");

        let mut seeded = CurrencyCache::load(&path);
        seeded.insert("GHA".to_string(), Some("GHS".to_string()));
        seeded.insert("XYZ".to_string(), None);
        seeded.save().unwrap();

        let mut resolver = CurrencyResolver::new(&path).unwrap();
        let result = resolver
            .resolve(&["GHA".to_string(), "XYZ".to_string(), "CUW".to_string()])
            .await
            .unwrap();

        assert_eq!(result.get("GHA"), Some(&Some("GHS".to_string())));
        assert_eq!(result.get("XYZ"), Some(&None));
        // override table wins without cache or lookup
        assert_eq!(result.get("CUW"), Some(&Some("XCG".to_string())));
    }
}
