use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A calendar month, the unit every dataset, ledger entry and
/// validation report is keyed by.
///
/// Accepts `YYYYMM`, `YYYY-MM` and `YYYY_MM` on input; renders as
/// `YYYYMM` (`key`), `YYYY-MM` (`api_str`, IMF calls) or `YYYY_MM`
/// (`file_key`, filenames).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Period {
    year: i32,
    month: u32,
}

impl Period {
    pub fn new(year: i32, month: u32) -> Result<Self> {
        if !(1..=12).contains(&month) {
            return Err(Error::InvalidInput(format!(
                "Month out of range: {}-{}",
                year, month
            )));
        }
        Ok(Self { year, month })
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// `YYYYMM`, the Date column value and ledger map key.
    pub fn key(&self) -> String {
        format!("{}{:02}", self.year, self.month)
    }

    /// `YYYY-MM`, the format the IMF API expects.
    pub fn api_str(&self) -> String {
        format!("{}-{:02}", self.year, self.month)
    }

    /// `YYYY_MM`, used in dataset filenames.
    pub fn file_key(&self) -> String {
        format!("{}_{:02}", self.year, self.month)
    }

    pub fn pred(&self) -> Self {
        if self.month == 1 {
            Self { year: self.year - 1, month: 12 }
        } else {
            Self { year: self.year, month: self.month - 1 }
        }
    }

    pub fn succ(&self) -> Self {
        if self.month == 12 {
            Self { year: self.year + 1, month: 1 }
        } else {
            Self { year: self.year, month: self.month + 1 }
        }
    }

    /// The month before the current one; the default acquisition target.
    pub fn last_month() -> Self {
        Self::last_month_from(Utc::now().date_naive())
    }

    pub fn last_month_from(today: NaiveDate) -> Self {
        let current = Self { year: today.year(), month: today.month() };
        current.pred()
    }

    /// Inclusive list of months from `start` to `end`.
    pub fn range(start: Period, end: Period) -> Vec<Period> {
        let mut months = Vec::new();
        let mut cursor = start;
        while cursor <= end {
            months.push(cursor);
            cursor = cursor.succ();
        }
        months
    }

    /// Splits an inclusive range into consecutive chunks of at most
    /// `chunk_months` periods. One IMF call is issued per chunk.
    pub fn chunks(start: Period, end: Period, chunk_months: usize) -> Vec<(Period, Period)> {
        let months = Self::range(start, end);
        months
            .chunks(chunk_months.max(1))
            .map(|chunk| (chunk[0], chunk[chunk.len() - 1]))
            .collect()
    }
}

impl FromStr for Period {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        // accepts YYYYMM, YYYY-MM and the SDMX YYYY-Mmm form
        let digits: String = s.chars().filter(|c| c.is_ascii_digit()).collect();
        if digits.len() != 6 || s.len() > 8 {
            return Err(Error::InvalidInput(format!(
                "Invalid period '{}': expected YYYYMM or YYYY-MM",
                s
            )));
        }
        let year: i32 = digits[..4]
            .parse()
            .map_err(|_| Error::InvalidInput(format!("Invalid year in period '{}'", s)))?;
        let month: u32 = digits[4..]
            .parse()
            .map_err(|_| Error::InvalidInput(format!("Invalid month in period '{}'", s)))?;
        Self::new(year, month)
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.api_str())
    }
}

impl TryFrom<String> for Period {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Period> for String {
    fn from(p: Period) -> Self {
        p.key()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_accepted_formats() {
        let expected = Period::new(2024, 5).unwrap();
        assert_eq!("202405".parse::<Period>().unwrap(), expected);
        assert_eq!("2024-05".parse::<Period>().unwrap(), expected);
        assert_eq!("2024_05".parse::<Period>().unwrap(), expected);
        // SDMX TIME_PERIOD form
        assert_eq!("2024-M05".parse::<Period>().unwrap(), expected);
    }

    #[test]
    fn rejects_garbage() {
        assert!("2024".parse::<Period>().is_err());
        assert!("2024-13".parse::<Period>().is_err());
        assert!("abcdef".parse::<Period>().is_err());
    }

    #[test]
    fn renders_formats() {
        let p = Period::new(2024, 5).unwrap();
        assert_eq!(p.key(), "202405");
        assert_eq!(p.api_str(), "2024-05");
        assert_eq!(p.file_key(), "2024_05");
    }

    #[test]
    fn pred_and_succ_cross_year_boundary() {
        let jan = Period::new(2024, 1).unwrap();
        assert_eq!(jan.pred(), Period::new(2023, 12).unwrap());
        let dec = Period::new(2023, 12).unwrap();
        assert_eq!(dec.succ(), jan);
    }

    #[test]
    fn last_month_handles_january() {
        let today = NaiveDate::from_ymd_opt(2025, 1, 15).unwrap();
        assert_eq!(Period::last_month_from(today), Period::new(2024, 12).unwrap());
    }

    #[test]
    fn range_is_inclusive() {
        let months = Period::range(
            Period::new(2023, 11).unwrap(),
            Period::new(2024, 2).unwrap(),
        );
        assert_eq!(months.len(), 4);
        assert_eq!(months[0].key(), "202311");
        assert_eq!(months[3].key(), "202402");
    }

    #[test]
    fn chunks_cover_range_without_overlap() {
        let chunks = Period::chunks(
            Period::new(2023, 1).unwrap(),
            Period::new(2025, 3).unwrap(),
            12,
        );
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0], (Period::new(2023, 1).unwrap(), Period::new(2023, 12).unwrap()));
        assert_eq!(chunks[1], (Period::new(2024, 1).unwrap(), Period::new(2024, 12).unwrap()));
        assert_eq!(chunks[2], (Period::new(2025, 1).unwrap(), Period::new(2025, 3).unwrap()));
    }
}
