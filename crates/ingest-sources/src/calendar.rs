//! Calendar-derived features.

use std::f64::consts::TAU;

use async_trait::async_trait;
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use ingest_core::{DataSource, DateRange, FeatureTable, Result, SourceState, Symbol};

/// Columns produced by [`TimeFeatureSource`].
pub const TIME_COLUMNS: [&str; 13] = [
    "day_of_week",
    "day_of_month",
    "day_of_year",
    "week_of_year",
    "month",
    "quarter",
    "is_month_start",
    "is_month_end",
    "is_quarter_end",
    "dow_sin",
    "dow_cos",
    "month_sin",
    "month_cos",
];

fn is_weekday(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

fn is_last_day_of_month(date: NaiveDate) -> bool {
    (date + Duration::days(1)).month() != date.month()
}

fn flag(b: bool) -> f64 {
    if b { 1.0 } else { 0.0 }
}

/// Builds the calendar table for every weekday in `range`.
pub fn calendar_table(range: DateRange) -> Result<FeatureTable> {
    let dates: Vec<NaiveDate> = range
        .start
        .iter_days()
        .take_while(|d| *d <= range.end)
        .filter(|d| is_weekday(*d))
        .collect();

    let col = |f: &dyn Fn(NaiveDate) -> f64| dates.iter().map(|d| f(*d)).collect::<Vec<f64>>();
    let dow = |d: NaiveDate| f64::from(d.weekday().num_days_from_monday());
    let month = |d: NaiveDate| f64::from(d.month());

    FeatureTable::from_columns(
        dates.clone(),
        vec![
            ("day_of_week", col(&dow)),
            ("day_of_month", col(&|d| f64::from(d.day()))),
            ("day_of_year", col(&|d| f64::from(d.ordinal()))),
            ("week_of_year", col(&|d| f64::from(d.iso_week().week()))),
            ("month", col(&month)),
            ("quarter", col(&|d| f64::from((d.month() - 1) / 3 + 1))),
            ("is_month_start", col(&|d| flag(d.day() == 1))),
            ("is_month_end", col(&|d| flag(is_last_day_of_month(d)))),
            (
                "is_quarter_end",
                col(&|d| flag(d.month() % 3 == 0 && is_last_day_of_month(d))),
            ),
            ("dow_sin", col(&|d| (TAU * dow(d) / 7.0).sin())),
            ("dow_cos", col(&|d| (TAU * dow(d) / 7.0).cos())),
            ("month_sin", col(&|d| (TAU * (month(d) - 1.0) / 12.0).sin())),
            ("month_cos", col(&|d| (TAU * (month(d) - 1.0) / 12.0).cos())),
        ],
    )
}

/// Time features derived from the calendar alone.
///
/// Emits one row per weekday. Exchange holidays are not modeled: a holiday
/// row survives the outer join and its price cells are forward-filled during
/// post-processing.
#[derive(Debug, Default)]
pub struct TimeFeatureSource {
    priority: Option<i32>,
    state: SourceState,
}

impl TimeFeatureSource {
    /// Default priority: lowest of the built-in sources.
    pub const DEFAULT_PRIORITY: i32 = 2;

    /// Creates the source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the merge priority.
    #[must_use]
    pub const fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }
}

#[async_trait]
impl DataSource for TimeFeatureSource {
    fn name(&self) -> &str {
        "time_features"
    }

    fn priority(&self) -> i32 {
        self.priority.unwrap_or(Self::DEFAULT_PRIORITY)
    }

    fn feature_columns(&self) -> Vec<String> {
        TIME_COLUMNS.iter().map(|c| (*c).to_string()).collect()
    }

    fn state(&self) -> &SourceState {
        &self.state
    }

    async fn fetch(
        &self,
        _symbol: &Symbol,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<FeatureTable> {
        calendar_table(DateRange::new(start, end)?)
    }
}
