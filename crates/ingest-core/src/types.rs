//! Core value types.
//!
//! [`Symbol`] names an instrument, [`OhlcvBar`] is one daily session and
//! [`DateRange`] is the inclusive window every fetch is made over.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{IngestError, Result};

/// Ticker a feature table belongs to, e.g. `AAPL`.
///
/// Normalized on construction: surrounding whitespace is dropped and letters
/// are uppercased, so `" aapl"` and `"AAPL"` name the same instrument.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    /// Normalizes `ticker` into a symbol.
    #[must_use]
    pub fn new(ticker: impl AsRef<str>) -> Self {
        Self(ticker.as_ref().trim().to_ascii_uppercase())
    }

    /// The normalized ticker.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Symbol {
    type Err = std::convert::Infallible;

    fn from_str(ticker: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::new(ticker))
    }
}

impl From<&str> for Symbol {
    fn from(ticker: &str) -> Self {
        Self::new(ticker)
    }
}

impl From<String> for Symbol {
    fn from(ticker: String) -> Self {
        Self::new(ticker)
    }
}

impl From<Symbol> for String {
    fn from(symbol: Symbol) -> Self {
        symbol.0
    }
}

/// One trading session of a single symbol.
///
/// `adjusted_close` is only set by loaders that report split and dividend
/// adjustments.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OhlcvBar {
    /// Session date.
    pub date: NaiveDate,
    /// First traded price.
    pub open: f64,
    /// Session high.
    pub high: f64,
    /// Session low.
    pub low: f64,
    /// Last traded price.
    pub close: f64,
    /// Shares traded.
    pub volume: f64,
    /// Close adjusted for splits and dividends.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adjusted_close: Option<f64>,
}

impl OhlcvBar {
    /// An unadjusted bar.
    #[must_use]
    pub const fn new(
        date: NaiveDate,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            date,
            open,
            high,
            low,
            close,
            volume,
            adjusted_close: None,
        }
    }

    /// Attaches the adjusted close.
    #[must_use]
    pub const fn with_adjusted_close(mut self, price: f64) -> Self {
        self.adjusted_close = Some(price);
        self
    }

    /// Typical price, `(high + low + close) / 3`.
    #[must_use]
    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }
}

/// An inclusive range of calendar dates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    /// First date in the range.
    pub start: NaiveDate,
    /// Last date in the range.
    pub end: NaiveDate,
}

impl DateRange {
    /// Creates a range, rejecting `start > end`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(IngestError::InvalidParameter(format!(
                "Start date {start} is after end date {end}"
            )));
        }
        Ok(Self { start, end })
    }

    /// Number of calendar days in the range, both ends included.
    #[must_use]
    pub fn calendar_days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// Number of Monday-to-Friday dates in the range.
    #[must_use]
    pub fn weekdays(&self) -> usize {
        self.start
            .iter_days()
            .take_while(|d| *d <= self.end)
            .filter(|d| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun))
            .count()
    }

    /// Returns true if `date` lies inside the range.
    #[must_use]
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Splits the range into consecutive chunks of at most `days` days.
    ///
    /// The last chunk is truncated at `end`. `days == 0` is treated as 1.
    #[must_use]
    pub fn chunks(&self, days: i64) -> Vec<Self> {
        let step = days.max(1);
        let mut chunks = Vec::new();
        let mut current = self.start;
        while current <= self.end {
            let chunk_end = (current + Duration::days(step - 1)).min(self.end);
            chunks.push(Self {
                start: current,
                end: chunk_end,
            });
            current = chunk_end + Duration::days(1);
        }
        chunks
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn symbol_is_normalized() {
        assert_eq!(Symbol::new(" aapl ").as_str(), "AAPL");
        assert_eq!(Symbol::from("msft").to_string(), "MSFT");
        assert_eq!("brk.b".parse::<Symbol>().unwrap(), Symbol::new("BRK.B"));
    }

    #[test]
    fn range_rejects_inverted_bounds() {
        assert!(DateRange::new(d(2024, 2, 1), d(2024, 1, 1)).is_err());
    }

    #[test]
    fn weekdays_skip_weekends() {
        // 2024-01-01 is a Monday.
        let range = DateRange::new(d(2024, 1, 1), d(2024, 1, 14)).unwrap();
        assert_eq!(range.calendar_days(), 14);
        assert_eq!(range.weekdays(), 10);
    }

    #[test]
    fn chunks_cover_range_without_overlap() {
        let range = DateRange::new(d(2024, 1, 1), d(2024, 3, 15)).unwrap();
        let chunks = range.chunks(30);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].start, d(2024, 1, 1));
        assert_eq!(chunks[0].end, d(2024, 1, 30));
        assert_eq!(chunks[1].start, d(2024, 1, 31));
        assert_eq!(chunks[2].end, d(2024, 3, 15));
        let total: i64 = chunks.iter().map(DateRange::calendar_days).sum();
        assert_eq!(total, range.calendar_days());
    }
}
