//! IMF SDMX client.
//!
//! Fetches monthly exchange rate observations from the IMF data service and
//! parses the SDMX-JSON CompactData payload: a list of per-country series,
//! each carrying `(TIME_PERIOD, OBS_VALUE)` observations.

use std::collections::HashSet;
use std::time::Duration;

use rand::Rng;
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, error, warn};

use crate::constants::{
    IMF_API_TIMEOUT_SECS, IMF_BASE_URL, IMF_FLOW_REF, IMF_KEY, IMF_MAX_RETRIES,
};
use crate::error::{Error, Result};
use crate::models::Period;

/// All observations the IMF returned for one country.
#[derive(Debug, Clone)]
pub struct CountrySeries {
    pub country: String,
    pub base_currency: String,
    /// `(period, rate)` pairs; observations without a value are dropped
    /// at parse time, matching the source's own "dataonly" detail level.
    pub observations: Vec<(Period, f64)>,
}

#[derive(Clone)]
pub struct ImfClient {
    client: reqwest::Client,
}

impl ImfClient {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(IMF_API_TIMEOUT_SECS))
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    fn data_url(start: Period, end: Period) -> String {
        format!(
            "{}/{}/{}?startPeriod={}&endPeriod={}\
             &dimensionAtObservation=TIME_PERIOD&detail=dataonly&includeHistory=false&format=sdmx-json",
            IMF_BASE_URL,
            IMF_FLOW_REF,
            IMF_KEY,
            start.api_str(),
            end.api_str()
        )
    }

    /// Fetches every series in `[start, end]` with one API call.
    ///
    /// Retries transient failures with exponential backoff plus jitter;
    /// 4xx responses are request problems and fail immediately.
    /// `timeout` overrides the client default for large range calls.
    pub async fn fetch_series(
        &self,
        start: Period,
        end: Period,
        timeout: Option<Duration>,
    ) -> Result<Vec<CountrySeries>> {
        let url = Self::data_url(start, end);
        let mut last_error: Option<String> = None;

        for attempt in 0..IMF_MAX_RETRIES {
            if attempt > 0 {
                let delay = Duration::from_secs_f64(
                    2.0_f64.powi(attempt as i32 - 1) + rand::thread_rng().gen::<f64>(),
                );
                let reason = last_error.as_deref().unwrap_or("unknown error");
                warn!(
                    attempt = attempt + 1,
                    max = IMF_MAX_RETRIES,
                    reason,
                    wait_s = delay.as_secs_f64(),
                    "IMF API retry backoff"
                );
                sleep(delay).await;
            }

            let mut request = self.client.get(&url).header("Cache-Control", "no-cache");
            if let Some(t) = timeout {
                request = request.timeout(t);
            }

            match request.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        match resp.text().await {
                            Ok(text) => match serde_json::from_str::<Value>(&text) {
                                Ok(data) => return parse_compact_data(&data),
                                Err(e) => {
                                    last_error = Some(format!("JSON parse error: {}", e));
                                    continue;
                                }
                            },
                            Err(e) => {
                                last_error = Some(format!("Response body error: {}", e));
                                continue;
                            }
                        }
                    } else if status.is_client_error() {
                        // Request problem, retrying cannot fix it
                        return Err(Error::Network(format!(
                            "IMF API client error ({}) for {} -> {}",
                            status.as_u16(),
                            start,
                            end
                        )));
                    } else {
                        last_error = Some(format!("HTTP {}", status.as_u16()));
                        continue;
                    }
                }
                Err(e) => {
                    last_error = Some(format!("Network error: {}", e));
                    continue;
                }
            }
        }

        error!(start = %start, end = %end, "IMF API request failed after all attempts");
        Err(Error::Network(format!(
            "IMF API request failed after {} attempts for {} -> {}: {}",
            IMF_MAX_RETRIES,
            start,
            end,
            last_error.unwrap_or_else(|| "unknown error".to_string())
        )))
    }

    /// The set of country codes the IMF currently reports for `period`.
    /// Returns an empty set on any failure so the coverage check can
    /// degrade gracefully instead of blocking validation.
    pub async fn fetch_country_list(&self, period: Period) -> HashSet<String> {
        match self.fetch_series(period, period, None).await {
            Ok(series) => series.into_iter().map(|s| s.country).collect(),
            Err(e) => {
                warn!(period = %period, error = %e, "Live country list unavailable");
                HashSet::new()
            }
        }
    }
}

/// Base currency encoded in the SDMX indicator: `USD_XDC` means USD per
/// domestic currency unit; anything else carries its base as the segment
/// after the last underscore.
fn base_currency_for(indicator: &str) -> String {
    if indicator == "USD_XDC" {
        "USD".to_string()
    } else {
        indicator
            .rsplit('_')
            .next()
            .unwrap_or(indicator)
            .to_string()
    }
}

/// Walks the CompactData payload. A single series or observation may be
/// serialized as an object instead of a one-element array, so both shapes
/// are accepted.
pub fn parse_compact_data(data: &Value) -> Result<Vec<CountrySeries>> {
    let dataset = data
        .get("CompactData")
        .and_then(|c| c.get("DataSet"))
        .or_else(|| data.get("DataSet"))
        .ok_or_else(|| Error::Parse("IMF response has no DataSet".to_string()))?;

    let series_value = match dataset.get("Series") {
        Some(s) => s,
        None => return Ok(Vec::new()), // valid but empty response
    };

    let series_list: Vec<&Value> = match series_value {
        Value::Array(items) => items.iter().collect(),
        Value::Object(_) => vec![series_value],
        _ => {
            return Err(Error::Parse(
                "IMF Series field is neither array nor object".to_string(),
            ))
        }
    };

    let mut result = Vec::new();
    for series in series_list {
        let country = match attr(series, "COUNTRY") {
            Some(c) => c.to_string(),
            None => continue,
        };
        let indicator = attr(series, "INDICATOR").unwrap_or("USD_XDC").to_string();

        let obs_value = match series.get("Obs") {
            Some(o) => o,
            None => continue,
        };
        let obs_list: Vec<&Value> = match obs_value {
            Value::Array(items) => items.iter().collect(),
            Value::Object(_) => vec![obs_value],
            _ => continue,
        };

        let mut observations = Vec::new();
        for obs in obs_list {
            let time_period = match attr(obs, "TIME_PERIOD") {
                Some(t) => t,
                None => continue,
            };
            let raw_value = match attr(obs, "OBS_VALUE") {
                Some(v) => v.to_string(),
                None => match obs.get("@OBS_VALUE").and_then(|v| v.as_f64()) {
                    Some(v) => v.to_string(),
                    None => continue, // observation without a value
                },
            };

            let period: Period = match time_period.parse() {
                Ok(p) => p,
                Err(_) => {
                    debug!(time_period, "Unparseable TIME_PERIOD, skipping observation");
                    continue;
                }
            };
            let rate: f64 = match raw_value.parse() {
                Ok(r) => r,
                Err(_) => {
                    warn!(country = %country, time_period, raw_value, "Unparseable OBS_VALUE");
                    continue;
                }
            };
            observations.push((period, rate));
        }

        if !observations.is_empty() {
            result.push(CountrySeries {
                country,
                base_currency: base_currency_for(&indicator),
                observations,
            });
        }
    }

    Ok(result)
}

/// SDMX-JSON attributes arrive as `@NAME` string fields.
fn attr<'a>(value: &'a Value, name: &str) -> Option<&'a str> {
    value
        .get(format!("@{}", name))
        .or_else(|| value.get(name))
        .and_then(|v| v.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_multi_series_payload() {
        let payload = json!({
            "CompactData": {
                "DataSet": {
                    "Series": [
                        {
                            "@COUNTRY": "GHA",
                            "@INDICATOR": "USD_XDC",
                            "Obs": [
                                {"@TIME_PERIOD": "2024-M04", "@OBS_VALUE": "13.10"},
                                {"@TIME_PERIOD": "2024-M05", "@OBS_VALUE": "14.05"}
                            ]
                        },
                        {
                            "@COUNTRY": "NGA",
                            "@INDICATOR": "USD_XDC",
                            "Obs": {"@TIME_PERIOD": "2024-M05", "@OBS_VALUE": "1450.2"}
                        }
                    ]
                }
            }
        });

        let series = parse_compact_data(&payload).unwrap();
        assert_eq!(series.len(), 2);

        let ghana = &series[0];
        assert_eq!(ghana.country, "GHA");
        assert_eq!(ghana.base_currency, "USD");
        assert_eq!(ghana.observations.len(), 2);
        assert_eq!(ghana.observations[1].0.key(), "202405");
        assert!((ghana.observations[1].1 - 14.05).abs() < f64::EPSILON);

        // single-observation series arrives as an object, not an array
        assert_eq!(series[1].observations.len(), 1);
    }

    #[test]
    fn skips_observations_without_value() {
        let payload = json!({
            "CompactData": {
                "DataSet": {
                    "Series": {
                        "@COUNTRY": "EGY",
                        "@INDICATOR": "USD_XDC",
                        "Obs": [
                            {"@TIME_PERIOD": "2024-M05"},
                            {"@TIME_PERIOD": "2024-M06", "@OBS_VALUE": "47.8"}
                        ]
                    }
                }
            }
        });

        let series = parse_compact_data(&payload).unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].observations.len(), 1);
        assert_eq!(series[0].observations[0].0.key(), "202406");
    }

    #[test]
    fn empty_dataset_is_ok_missing_dataset_is_error() {
        let empty = json!({"CompactData": {"DataSet": {}}});
        assert!(parse_compact_data(&empty).unwrap().is_empty());

        let malformed = json!({"ErrorDetails": "no data"});
        assert!(parse_compact_data(&malformed).is_err());
    }

    #[test]
    fn base_currency_derivation() {
        assert_eq!(base_currency_for("USD_XDC"), "USD");
        assert_eq!(base_currency_for("PA_RT_EUR"), "EUR");
    }
}
