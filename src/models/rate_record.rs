use serde::{Deserialize, Serialize};

/// One monthly exchange rate observation as persisted in the period CSVs.
///
/// `currency` is nullable: aggregate codes never resolve, and REST Countries
/// lookups can exhaust their retries. `rate` is nullable because the source
/// occasionally publishes observations without a value; validation flags
/// them rather than the parser dropping them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExchangeRateRecord {
    #[serde(rename = "Country")]
    pub country: String,

    #[serde(rename = "Currency")]
    pub currency: Option<String>,

    /// Month the observation belongs to, as a 6-digit `YYYYMM` string
    #[serde(rename = "Date")]
    pub date: String,

    /// Units of domestic currency per one unit of the base currency
    #[serde(rename = "Exchange_Rate")]
    pub rate: Option<f64>,

    #[serde(rename = "Base_Currency")]
    pub base_currency: String,

    /// When the fetch that produced this row ran (RFC 3339)
    #[serde(rename = "Timestamp")]
    pub timestamp: String,
}

impl ExchangeRateRecord {
    /// Sort key giving the deterministic on-disk ordering.
    pub fn sort_key(&self) -> (&str, &str) {
        (self.country.as_str(), self.date.as_str())
    }
}

/// Sorts records the way every persisted dataset is ordered.
pub fn sort_records(records: &mut [ExchangeRateRecord]) {
    records.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
}

#[cfg(test)]
mod tests {
    use super::*;

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

    #[test]
    fn sorted_by_country_then_date() {
        let mut records = vec![
            record("NGA", "202405"),
            record("GHA", "202405"),
            record("GHA", "202404"),
        ];
        sort_records(&mut records);
        assert_eq!(records[0].country, "GHA");
        assert_eq!(records[0].date, "202404");
        assert_eq!(records[1].date, "202405");
        assert_eq!(records[2].country, "NGA");
    }

    #[test]
    fn csv_round_trip_preserves_nulls() {
        let rec = ExchangeRateRecord {
            currency: None,
            rate: None,
            ..record("G163", "202405")
        };
        let mut writer = csv::Writer::from_writer(vec![]);
        writer.serialize(&rec).unwrap();
        let data = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        assert!(data.starts_with("Country,Currency,Date,Exchange_Rate,Base_Currency,Timestamp"));

        let mut reader = csv::Reader::from_reader(data.as_bytes());
        let parsed: ExchangeRateRecord = reader.deserialize().next().unwrap().unwrap();
        assert_eq!(parsed.currency, None);
        assert_eq!(parsed.rate, None);
        assert_eq!(parsed.country, "G163");
    }
}
