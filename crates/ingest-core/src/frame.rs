//! Conversion between [`FeatureTable`] and foreign polars frames.
//!
//! A foreign frame may name its index anything and store it as a date or a
//! datetime. Reading one normalizes it into the table layout: the index is
//! cast to [`DataType::Date`], renamed to [`DATE_COLUMN`] and moved first.

use polars::prelude::*;

use crate::error::{IngestError, Result};
use crate::table::{DATE_COLUMN, FeatureTable};

impl FeatureTable {
    /// Copies the table out as a DataFrame with a leading `date` column.
    pub fn to_dataframe(&self) -> Result<DataFrame> {
        Ok(self.as_dataframe().clone())
    }

    /// Reads a DataFrame whose `date_column` holds the index.
    ///
    /// Date and datetime index columns are accepted; a null index cell is an
    /// error. `Float32` columns stay `Float32`, `String` columns stay text,
    /// every other column is cast to `Float64`. Float `NaN` becomes null.
    pub fn from_dataframe(df: &DataFrame, date_column: &str) -> Result<Self> {
        let index = df
            .column(date_column)
            .map_err(|e| IngestError::Parse(e.to_string()))?
            .cast(&DataType::Date)
            .map_err(|e| IngestError::Parse(e.to_string()))?
            .with_name(DATE_COLUMN.into());
        if index.null_count() > 0 {
            return Err(IngestError::Parse(format!(
                "{} invalid dates in column {date_column}",
                index.null_count()
            )));
        }

        let mut table = Self::from_frame(index.into_frame());
        for col in df.get_columns() {
            if col.name().as_str() == date_column {
                continue;
            }
            let col = match col.dtype() {
                DataType::String | DataType::Float32 | DataType::Float64 => col.clone(),
                _ => col
                    .cast(&DataType::Float64)
                    .map_err(|e| IngestError::Parse(e.to_string()))?,
            };
            table.insert(col)?;
        }

        Ok(table)
    }
}
