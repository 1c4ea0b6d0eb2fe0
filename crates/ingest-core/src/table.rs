//! Date-indexed feature table.
//!
//! A [`FeatureTable`] wraps a polars [`DataFrame`] whose first column is
//! [`DATE_COLUMN`] with [`DataType::Date`]; every other column is a feature.
//! Missing cells are nulls, and `NaN` handed to any constructor is stored as
//! null. The table does not enforce sorted or unique dates on its own; the
//! source manager establishes that invariant during post-processing and the
//! quality validator checks it.

use chrono::NaiveDate;
use polars::prelude::*;

use crate::error::{IngestError, Result};
use crate::types::DateRange;

/// Name of the index column.
pub const DATE_COLUMN: &str = "date";

/// Date-indexed table of named feature columns.
#[derive(Clone, Debug)]
pub struct FeatureTable {
    df: DataFrame,
}

impl Default for FeatureTable {
    fn default() -> Self {
        Self::empty()
    }
}

impl PartialEq for FeatureTable {
    fn eq(&self, other: &Self) -> bool {
        self.df.dtypes() == other.df.dtypes() && self.df.equals_missing(&other.df)
    }
}

impl FeatureTable {
    /// Creates a table with the given index and no columns.
    #[must_use]
    pub fn new(dates: Vec<NaiveDate>) -> Self {
        let index = DateChunked::from_naive_date(DATE_COLUMN.into(), dates);
        Self {
            df: index.into_series().into_frame(),
        }
    }

    /// Creates a table with no rows and no columns.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Builds a table from an index and `f64` columns.
    pub fn from_columns<S: Into<String>>(
        dates: Vec<NaiveDate>,
        columns: Vec<(S, Vec<f64>)>,
    ) -> Result<Self> {
        let mut table = Self::new(dates);
        for (name, values) in columns {
            table.insert(float_column(name, &values))?;
        }
        Ok(table)
    }

    /// Adds an `f64` column, builder style.
    pub fn with_column(mut self, name: impl Into<String>, values: Vec<f64>) -> Result<Self> {
        self.insert(float_column(name, &values))?;
        Ok(self)
    }

    /// Wraps a frame that already satisfies the table layout.
    pub(crate) fn from_frame(df: DataFrame) -> Self {
        Self { df }
    }

    /// Inserts or replaces a column.
    ///
    /// Float `NaN` cells are stored as null. The index column cannot be
    /// replaced.
    pub fn insert(&mut self, column: Column) -> Result<()> {
        let name = column.name().to_string();
        if name == DATE_COLUMN {
            return Err(IngestError::InvalidParameter(format!(
                "{DATE_COLUMN} is the index column"
            )));
        }
        if column.len() != self.height() {
            return Err(IngestError::InvalidParameter(format!(
                "column {name} has {} values, index has {}",
                column.len(),
                self.height()
            )));
        }
        let column = if column.dtype().is_float() {
            nan_to_null(&column)?
        } else {
            column
        };
        self.df.with_column(column)?;
        Ok(())
    }

    /// Removes a feature column.
    pub fn remove(&mut self, name: &str) -> Option<Column> {
        if name == DATE_COLUMN {
            return None;
        }
        self.df.drop_in_place(name).ok()
    }

    /// The underlying frame, index column first.
    #[must_use]
    pub const fn as_dataframe(&self) -> &DataFrame {
        &self.df
    }

    /// Consumes the table, returning the underlying frame.
    #[must_use]
    pub fn into_dataframe(self) -> DataFrame {
        self.df
    }

    fn index(&self) -> Option<&DateChunked> {
        self.df.column(DATE_COLUMN).ok()?.date().ok()
    }

    /// The date index, in row order.
    #[must_use]
    pub fn dates(&self) -> Vec<NaiveDate> {
        self.index()
            .map(|index| index.as_date_iter().flatten().collect())
            .unwrap_or_default()
    }

    /// Number of rows.
    #[must_use]
    pub fn height(&self) -> usize {
        self.df.height()
    }

    /// Number of feature columns.
    #[must_use]
    pub fn width(&self) -> usize {
        self.columns().count()
    }

    /// Returns true if the table has no rows or no columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.height() == 0 || self.width() == 0
    }

    /// Feature column names in insertion order.
    #[must_use]
    pub fn column_names(&self) -> Vec<&str> {
        self.columns().map(|c| c.name().as_str()).collect()
    }

    /// Returns true if a feature column with this name exists.
    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Looks up a feature column by name.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Column> {
        if name == DATE_COLUMN {
            return None;
        }
        self.df.column(name).ok()
    }

    /// Iterates over feature columns.
    pub fn columns(&self) -> impl Iterator<Item = &Column> {
        self.df
            .get_columns()
            .iter()
            .filter(|c| c.name().as_str() != DATE_COLUMN)
    }

    /// Row position of the first occurrence of `date`.
    #[must_use]
    pub fn row_of(&self, date: NaiveDate) -> Option<usize> {
        self.index()?.as_date_iter().position(|d| d == Some(date))
    }

    /// Numeric value at `(row, column)`, `None` when missing or textual.
    #[must_use]
    pub fn value(&self, row: usize, column: &str) -> Option<f64> {
        let column = self.column(column)?;
        if !column.dtype().is_primitive_numeric() {
            return None;
        }
        column
            .get(row)
            .ok()?
            .extract::<f64>()
            .filter(|x| !x.is_nan())
    }

    /// Numeric value at `(date, column)`, `None` when missing.
    #[must_use]
    pub fn get(&self, date: NaiveDate, column: &str) -> Option<f64> {
        self.value(self.row_of(date)?, column)
    }

    /// Total number of cells, `height * width`.
    #[must_use]
    pub fn total_cells(&self) -> usize {
        self.height() * self.width()
    }

    /// Number of null cells across all feature columns.
    #[must_use]
    pub fn missing_cells(&self) -> usize {
        self.columns().map(Column::null_count).sum()
    }

    /// Fraction of missing cells; zero for a table without cells.
    #[must_use]
    pub fn missing_ratio(&self) -> f64 {
        let total = self.total_cells();
        if total == 0 {
            return 0.0;
        }
        self.missing_cells() as f64 / total as f64
    }

    /// Number of infinite cells across all feature columns.
    #[must_use]
    pub fn infinite_cells(&self) -> usize {
        self.columns()
            .filter_map(float_values)
            .map(|values| values.into_iter().flatten().filter(|x| x.is_infinite()).count())
            .sum()
    }

    /// Number of rows whose date already appeared on an earlier row.
    #[must_use]
    pub fn duplicate_dates(&self) -> usize {
        self.df
            .column(DATE_COLUMN)
            .and_then(Column::n_unique)
            .map_or(0, |distinct| self.height() - distinct)
    }

    /// Returns true if dates never decrease from one row to the next.
    #[must_use]
    pub fn is_sorted(&self) -> bool {
        self.dates().is_sorted()
    }

    /// Day differences between consecutive rows, in row order.
    #[must_use]
    pub fn date_gaps(&self) -> Vec<i64> {
        self.dates()
            .windows(2)
            .map(|w| (w[1] - w[0]).num_days())
            .collect()
    }

    /// Smallest and largest date, if any.
    #[must_use]
    pub fn date_range(&self) -> Option<DateRange> {
        let dates = self.dates();
        let start = *dates.iter().min()?;
        let end = *dates.iter().max()?;
        Some(DateRange { start, end })
    }

    /// Sorts rows by date. Rows with equal dates keep their relative order.
    pub fn sort_by_date(&mut self) -> Result<()> {
        self.df = self.df.sort(
            [DATE_COLUMN],
            SortMultipleOptions::default().with_maintain_order(true),
        )?;
        Ok(())
    }

    /// Drops every row whose date already appeared earlier.
    pub fn dedup_dates(&mut self) -> Result<()> {
        self.df = self.df.unique_stable(
            Some(&[DATE_COLUMN.to_string()]),
            UniqueKeepStrategy::First,
            None,
        )?;
        Ok(())
    }

    /// Rows whose date falls inside `range`, in original order.
    pub fn filter_range(&self, range: DateRange) -> Result<Self> {
        let mask: BooleanChunked = match self.index() {
            Some(index) => index
                .as_date_iter()
                .map(|d| d.is_some_and(|d| range.contains(d)))
                .collect(),
            None => return Ok(self.clone()),
        };
        Ok(Self {
            df: self.df.filter(&mask)?,
        })
    }

    /// Stacks tables vertically.
    ///
    /// The result has the union of all columns in first-seen order. Cells a
    /// part does not provide are null. A column whose dtype differs between
    /// parts is widened to the common supertype.
    pub fn concat(tables: &[Self]) -> Result<Self> {
        if tables.is_empty() {
            return Ok(Self::empty());
        }
        let frames: Vec<LazyFrame> = tables.iter().map(|t| t.df.clone().lazy()).collect();
        let df = concat_lf_diagonal(
            frames,
            UnionArgs {
                to_supertypes: true,
                ..Default::default()
            },
        )?
        .collect()?;
        Ok(Self { df })
    }

    /// Rough in-memory footprint in bytes.
    #[must_use]
    pub fn approx_bytes(&self) -> usize {
        self.df.estimated_size()
    }
}

/// A `Float64` column with `NaN` stored as null.
pub fn float_column(name: impl Into<String>, values: &[f64]) -> Column {
    let name: String = name.into();
    let values: Vec<Option<f64>> = values.iter().map(|v| (!v.is_nan()).then_some(*v)).collect();
    Column::new(name.into(), values)
}

/// The column's cells as `f64`, or `None` for non-numeric columns.
pub fn float_values(column: &Column) -> Option<Float64Chunked> {
    if !column.dtype().is_primitive_numeric() {
        return None;
    }
    let cast = column.cast(&DataType::Float64).ok()?;
    cast.f64().ok().cloned()
}

fn nan_to_null(column: &Column) -> Result<Column> {
    let cast = column.cast(&DataType::Float64)?;
    let values: Float64Chunked = cast
        .f64()?
        .into_iter()
        .map(|v| v.filter(|x| !x.is_nan()))
        .collect();
    let values = values.with_name(column.name().clone()).into_column();
    Ok(values.cast(column.dtype())?)
}
