//! IQR fencing shared by post-processing and validation.

use polars::prelude::*;

/// Interquartile-range fence, `[Q1 - k*IQR, Q3 + k*IQR]`.
///
/// Quartiles use linear interpolation between closest ranks.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IqrFence {
    /// Lower bound.
    pub lower: f64,
    /// Upper bound.
    pub upper: f64,
}

impl IqrFence {
    /// The conventional Tukey multiplier.
    pub const TUKEY: f64 = 1.5;

    /// Computes the fence over the finite cells of a numeric column.
    ///
    /// Returns `None` for non-numeric columns and when no finite value exists.
    #[must_use]
    pub fn from_column(column: &Column, multiplier: f64) -> Option<Self> {
        if !column.dtype().is_primitive_numeric() {
            return None;
        }
        let cast = column.cast(&DataType::Float64).ok()?;
        let finite: Float64Chunked = cast
            .f64()
            .ok()?
            .into_iter()
            .flatten()
            .filter(|x| x.is_finite())
            .map(Some)
            .collect();
        let q1 = finite.quantile(0.25, QuantileMethod::Linear).ok()??;
        let q3 = finite.quantile(0.75, QuantileMethod::Linear).ok()??;
        let iqr = q3 - q1;
        Some(Self {
            lower: q1 - multiplier * iqr,
            upper: q3 + multiplier * iqr,
        })
    }

    /// Computes the fence over the finite entries of `values`.
    #[must_use]
    pub fn from_values(values: &[f64], multiplier: f64) -> Option<Self> {
        Self::from_column(&Column::new("values".into(), values), multiplier)
    }

    /// Returns true if `value` lies outside the fence.
    #[must_use]
    pub fn is_outlier(&self, value: f64) -> bool {
        value < self.lower || value > self.upper
    }

    /// Number of finite cells of `column` outside the fence.
    #[must_use]
    pub fn count_outliers(&self, column: &Column) -> usize {
        column
            .cast(&DataType::Float64)
            .ok()
            .and_then(|c| c.f64().ok().cloned())
            .map_or(0, |values| {
                values
                    .into_iter()
                    .flatten()
                    .filter(|x| x.is_finite() && self.is_outlier(*x))
                    .count()
            })
    }

    /// Clamps every cell of a numeric column into the fence; nulls stay null.
    pub fn clip(&self, column: &Column) -> PolarsResult<Column> {
        let lower = Series::new(PlSmallStr::EMPTY, [self.lower]);
        let upper = Series::new(PlSmallStr::EMPTY, [self.upper]);
        let clipped = clip(column.as_materialized_series(), &lower, &upper)?;
        Ok(clipped.into_column())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quartiles_interpolate_linearly() {
        let fence = IqrFence::from_values(&[1.0, 2.0, 3.0, 4.0], 0.0).unwrap();
        assert!((fence.lower - 1.75).abs() < 1e-12);
        assert!((fence.upper - 3.25).abs() < 1e-12);
        assert_eq!(IqrFence::from_values(&[], 1.5), None);
    }

    #[test]
    fn fence_ignores_non_finite_values() {
        let fence =
            IqrFence::from_values(&[1.0, 2.0, 3.0, 4.0, f64::NAN, f64::INFINITY], 1.5).unwrap();
        assert!((fence.lower - (1.75 - 1.5 * 1.5)).abs() < 1e-12);
        assert!((fence.upper - (3.25 + 1.5 * 1.5)).abs() < 1e-12);
        assert!(fence.is_outlier(100.0));
    }

    #[test]
    fn clip_keeps_nulls_and_dtype() {
        let fence = IqrFence {
            lower: 0.0,
            upper: 10.0,
        };
        let column = Column::new("close".into(), [Some(-5.0f32), None, Some(50.0)]);
        let clipped = fence.clip(&column).unwrap();
        assert_eq!(clipped.dtype(), &DataType::Float32);
        let values: Vec<Option<f32>> = clipped.f32().unwrap().into_iter().collect();
        assert_eq!(values, vec![Some(0.0), None, Some(10.0)]);
        assert_eq!(fence.count_outliers(&column), 2);
    }
}
