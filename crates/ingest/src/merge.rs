//! Priority merge and post-processing of per-source tables.

use std::collections::BTreeMap;

use ingest_core::{DATE_COLUMN, FeatureTable, IqrFence, Result, float_values};
use polars::prelude::*;
use tracing::debug;

/// Column prefixes whose values are fenced during post-processing.
pub const CLIPPED_PREFIXES: [&str; 5] = ["open", "high", "low", "close", "volume"];

/// Suffix the join gives the lower-priority copy of a shared column.
const RIGHT_SUFFIX: &str = "_right";

/// Full-outer-joins `tables` on date, earlier tables taking precedence.
///
/// `tables` must be ordered from highest to lowest priority. Each shared
/// column is coalesced in that order, so a later table only fills cells that
/// every earlier table left null. Each input is sorted and de-duplicated
/// first, so the result has unique ascending dates.
///
/// Conflicting cells are resolved silently; the number of cells each source
/// lost is reported in a single `debug!` event.
pub fn merge_by_priority(tables: &[(String, FeatureTable)]) -> Result<FeatureTable> {
    let mut merged: Option<DataFrame> = None;
    let mut overridden: BTreeMap<&str, usize> = BTreeMap::new();

    for (source, table) in tables {
        let mut table = table.clone();
        table.sort_by_date()?;
        table.dedup_dates()?;
        let incoming = table.into_dataframe();

        merged = Some(match merged {
            None => incoming,
            Some(current) => {
                let (joined, lost) = coalesce_join(&current, &incoming)?;
                if lost > 0 {
                    *overridden.entry(source.as_str()).or_default() += lost;
                }
                joined
            }
        });
    }

    if !overridden.is_empty() {
        debug!(?overridden, "Lower-priority cells overridden during merge");
    }
    let Some(merged) = merged else {
        return Ok(FeatureTable::empty());
    };
    let merged = merged.sort([DATE_COLUMN], SortMultipleOptions::default())?;
    FeatureTable::from_dataframe(&merged, DATE_COLUMN)
}

/// Joins `incoming` onto `current` and folds every shared column back into
/// one, `current` first. Returns the frame and the number of non-null
/// `incoming` cells that disagreed with an existing value.
fn coalesce_join(current: &DataFrame, incoming: &DataFrame) -> Result<(DataFrame, usize)> {
    let shared: Vec<PlSmallStr> = incoming
        .get_column_names()
        .into_iter()
        .filter(|name| name.as_str() != DATE_COLUMN && current.get_column_index(name.as_str()).is_some())
        .cloned()
        .collect();

    let mut joined = current.join(
        incoming,
        [DATE_COLUMN],
        [DATE_COLUMN],
        JoinArgs::new(JoinType::Full).with_coalesce(JoinCoalesce::CoalesceColumns),
        None,
    )?;

    let mut lost = 0;
    for name in shared {
        let donor = joined.drop_in_place(&format!("{name}{RIGHT_SUFFIX}"))?;
        let kept = joined.column(&name)?.clone();
        let donor = donor.cast(kept.dtype())?;
        lost += kept
            .as_materialized_series()
            .not_equal(donor.as_materialized_series())?
            .into_iter()
            .filter(|differs| *differs == Some(true))
            .count();
        joined.with_column(coalesce_columns(&[kept, donor])?)?;
    }
    Ok((joined, lost))
}

/// Cleans a merged table in place.
///
/// Infinities become null; numeric nulls are forward filled, then backward
/// filled, then zeroed; price and volume columns are clipped to their IQR
/// fence; columns whose values all fit are cast to `Float32`. Text columns
/// are forward and backward filled only.
pub fn post_process(table: &mut FeatureTable) -> Result<()> {
    let names: Vec<String> = table.column_names().into_iter().map(str::to_string).collect();
    for name in names {
        let Some(column) = table.column(&name) else {
            continue;
        };
        let cleaned = match float_values(column) {
            Some(values) => {
                let clip = CLIPPED_PREFIXES.iter().any(|prefix| name.starts_with(prefix));
                clean_numeric(values, clip)?
            }
            None => column
                .fill_null(FillNullStrategy::Forward(None))?
                .fill_null(FillNullStrategy::Backward(None))?,
        };
        table.insert(cleaned)?;
    }
    Ok(())
}

fn clean_numeric(values: Float64Chunked, clip: bool) -> Result<Column> {
    let name = values.name().clone();
    let finite: Float64Chunked = values
        .into_iter()
        .map(|v| v.filter(|x| x.is_finite()))
        .collect();
    let mut column = finite
        .with_name(name)
        .into_column()
        .fill_null(FillNullStrategy::Forward(None))?
        .fill_null(FillNullStrategy::Backward(None))?
        .fill_null(FillNullStrategy::Zero)?;
    if clip {
        if let Some(fence) = IqrFence::from_column(&column, IqrFence::TUKEY) {
            column = fence.clip(&column)?;
        }
    }
    narrow(column)
}

fn narrow(column: Column) -> Result<Column> {
    let fits = float_values(&column).is_some_and(|values| {
        values
            .into_iter()
            .flatten()
            .all(|v| v.abs() <= f64::from(f32::MAX))
    });
    if fits {
        Ok(column.cast(&DataType::Float32)?)
    } else {
        Ok(column)
    }
}
