//! Pipeline Constants
//!
//! Single source of truth for API endpoints, retry policy and
//! data quality thresholds. All other modules import from here.

/// IMF SDMX dataflow reference for the exchange rate series
pub const IMF_FLOW_REF: &str = "IMF.STA,ER";

/// IMF series key: all countries, USD per domestic currency, monthly
pub const IMF_KEY: &str = ".USD_XDC.PA_RT.M";

/// Base URL of the IMF SDMX data service
pub const IMF_BASE_URL: &str = "https://api.imf.org/external/sdmx/2.1/data";

/// Default timeout for a single-month IMF call, in seconds
pub const IMF_API_TIMEOUT_SECS: u64 = 30;

/// Timeout for multi-month range calls (larger payloads), in seconds
pub const IMF_RANGE_TIMEOUT_SECS: u64 = 120;

/// Attempts per IMF call before the unit is recorded as failed
pub const IMF_MAX_RETRIES: u32 = 3;

/// First year covered by the historical backfill
pub const IMF_START_YEAR: i32 = 2000;

/// Months per API call during chunked backfill (12 = one call per year)
pub const DEFAULT_CHUNK_MONTHS: usize = 12;

/// Delay between consecutive chunk calls, milliseconds
pub const DEFAULT_CHUNK_DELAY_MS: u64 = 1000;

/// Base URL of the REST Countries currency lookup
pub const REST_COUNTRIES_URL: &str = "https://restcountries.com/v3.1/alpha";

/// Timeout for a single currency lookup, in seconds
pub const REST_COUNTRIES_TIMEOUT_SECS: u64 = 5;

/// Concurrent currency lookups per resolution batch
pub const REST_COUNTRIES_MAX_WORKERS: usize = 10;

/// Attempts per country code before negative-caching it
pub const REST_COUNTRIES_MAX_RETRIES: u32 = 3;

/// Hardcoded overrides for territories the REST Countries API mis-maps.
/// These always win over both the cache and a fresh lookup.
pub const SPECIAL_CURRENCY_OVERRIDES: &[(&str, &str)] = &[
    ("CUW", "XCG"),  // Curacao
    ("SXM", "XCG"),  // Sint Maarten
    ("G163", "EUR"), // Eurozone aggregate
];

/// IMF aggregate/regional codes that are not countries and will never
/// resolve to a currency. Excluded from the null-currency check.
pub const IMF_AGGREGATE_CODES: &[&str] = &[
    "G163", "G7", "G20", "R1", "5B", "5Y", "7A", "1C_163", "F1", "F3", "F6",
    "W00", "A10", "A20",
];

/// Rates above this are implausible and flagged
pub const MAX_REASONABLE_RATE: f64 = 100_000.0;

/// Positive rates below this are implausible and flagged
pub const MIN_REASONABLE_RATE: f64 = 0.0001;

/// Month-over-month relative move above this is flagged (advisory only)
pub const MAX_MONTH_ON_MONTH_CHANGE: f64 = 0.30;

/// A freshly fetched month with fewer countries than this is suspicious.
/// The data is still saved; dropping it would be irrecoverable.
pub const EXPECTED_MIN_COUNTRY_COUNT: usize = 50;

/// Relative tolerance for the live rate accuracy check (0.1%)
pub const RATE_ACCURACY_TOLERANCE: f64 = 0.001;

/// Returns the override currency for a country code, if one is configured.
pub fn currency_override(country: &str) -> Option<&'static str> {
    SPECIAL_CURRENCY_OVERRIDES
        .iter()
        .find(|(code, _)| *code == country)
        .map(|(_, currency)| *currency)
}

/// True for IMF aggregate/regional codes exempt from the currency check.
pub fn is_aggregate_code(country: &str) -> bool {
    IMF_AGGREGATE_CODES.contains(&country)
}
