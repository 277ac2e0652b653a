pub mod batch_prepare;
pub mod currency_resolver;
pub mod fetcher;
pub mod imf_client;
pub mod presence_ledger;
pub mod processor;
pub mod rate_store;
pub mod validator;

pub use batch_prepare::ManifestBuilder;
pub use currency_resolver::{CurrencyCache, CurrencyResolver};
pub use fetcher::RateFetcher;
pub use imf_client::{CountrySeries, ImfClient};
pub use presence_ledger::PresenceLedger;
pub use processor::BatchProcessor;
pub use rate_store::RateStore;
pub use validator::{CrossSelection, ValidateOptions, Validator};
