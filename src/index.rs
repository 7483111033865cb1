//! Read-side lookups over the flattened metadata frame.
//!
//! Everything here is a pure read: the frame is built once at connect
//! time and never mutated afterwards, so these functions take `&DataFrame`
//! and return fresh projections or row records.

use polars::prelude::*;
use serde_json::{Map, Value};

use crate::error::{MetricsError, Result};
use crate::flatten::{
    CATALOG_NAME, FIELD_BASIC_TYPE, FIELD_DESCRIPTION, FIELD_NAME, FIELD_TYPE, JOINED_CATALOGS,
};

/// Column order shared by [`all_metrics`] and [`dimensions_for_metric`].
const SUMMARY_COLUMNS: [&str; 4] = [FIELD_NAME, FIELD_BASIC_TYPE, FIELD_DESCRIPTION, CATALOG_NAME];

/// All metric-typed fields, projected to name, basic type, description
/// and owning catalog.
pub fn all_metrics(frame: &DataFrame) -> Result<DataFrame> {
    frame
        .clone()
        .lazy()
        .filter(col(FIELD_TYPE).eq(lit("metric")))
        .select(SUMMARY_COLUMNS.map(col))
        .collect()
        .map_err(Into::into)
}

/// Every full row whose field name matches, as JSON records. A name
/// duplicated across catalogs yields one record per catalog; an unknown
/// name yields an empty list.
pub fn metric_detail(frame: &DataFrame, metric_name: &str) -> Result<Vec<Map<String, Value>>> {
    let rows = filter_eq(frame, FIELD_NAME, metric_name)?;
    rows_to_records(&rows)
}

/// Dimensions usable alongside a metric.
///
/// The metric's catalog plus its joined catalogs form the eligible set;
/// a dimension qualifies when its catalog is in that set. When the
/// metric name is duplicated across catalogs, the first row by original
/// load order decides the neighborhood.
pub fn dimensions_for_metric(frame: &DataFrame, metric_name: &str) -> Result<DataFrame> {
    let matches = filter_eq(frame, FIELD_NAME, metric_name)?;
    if matches.height() == 0 {
        return Err(MetricsError::NotFound(format!(
            "no field named {} in the loaded catalogs",
            metric_name
        )));
    }
    let eligible = eligible_catalogs(&matches)?;

    let kinds = frame.column(FIELD_TYPE)?.str()?;
    let catalogs = frame.column(CATALOG_NAME)?.str()?;
    let mask: BooleanChunked = kinds
        .into_iter()
        .zip(catalogs)
        .map(|(kind, catalog)| {
            Some(
                kind == Some("dimension")
                    && catalog.is_some_and(|c| eligible.iter().any(|e| e == c)),
            )
        })
        .collect();

    frame.filter(&mask)?.select(SUMMARY_COLUMNS).map_err(Into::into)
}

/// Prompt-ready export: the metric summary renamed to `metric_*` column
/// names, with each metric's eligible dimensions serialized into an
/// `available_dimensions` JSON string column.
pub fn metrics_with_dimensions(frame: &DataFrame) -> Result<DataFrame> {
    let mut metrics = all_metrics(frame)?;
    let names: Vec<Option<String>> = metrics
        .column(FIELD_NAME)?
        .str()?
        .into_iter()
        .map(|name| name.map(str::to_string))
        .collect();

    metrics.rename(FIELD_NAME, "metric_name")?;
    metrics.rename(FIELD_BASIC_TYPE, "metric_type")?;
    metrics.rename(FIELD_DESCRIPTION, "metric_description")?;
    metrics.rename(CATALOG_NAME, "metric_catalog")?;

    let mut rendered: Vec<Option<String>> = Vec::with_capacity(names.len());
    for name in names {
        match name {
            Some(name) => {
                let dimensions = dimensions_for_metric(frame, &name)?;
                let records = rows_to_records(&dimensions)?;
                rendered.push(Some(serde_json::to_string(&records)?));
            }
            None => rendered.push(None),
        }
    }
    metrics.with_column(Series::new("available_dimensions", rendered))?;
    Ok(metrics)
}

/// Converts a frame into one JSON object per row, keyed by column name.
pub fn rows_to_records(frame: &DataFrame) -> Result<Vec<Map<String, Value>>> {
    let columns = frame.get_columns();
    let mut records = Vec::with_capacity(frame.height());
    for idx in 0..frame.height() {
        let mut record = Map::new();
        for series in columns {
            let value = series.get(idx)?;
            record.insert(series.name().to_string(), any_value_to_json(value));
        }
        records.push(record);
    }
    Ok(records)
}

fn filter_eq(frame: &DataFrame, column: &str, value: &str) -> Result<DataFrame> {
    let mask: BooleanChunked = frame
        .column(column)?
        .str()?
        .into_iter()
        .map(|cell| Some(cell == Some(value)))
        .collect();
    frame.filter(&mask).map_err(Into::into)
}

/// Joined catalogs of the first matching row plus its own catalog,
/// deduplicated.
fn eligible_catalogs(matches: &DataFrame) -> Result<Vec<String>> {
    let mut eligible: Vec<String> = Vec::new();
    if let AnyValue::List(inner) = matches.column(JOINED_CATALOGS)?.get(0)? {
        for name in inner.str()?.into_iter().flatten() {
            eligible.push(name.to_string());
        }
    }
    if let Some(own) = matches.column(CATALOG_NAME)?.str()?.get(0) {
        if !eligible.iter().any(|c| c == own) {
            eligible.push(own.to_string());
        }
    }
    Ok(eligible)
}

fn any_value_to_json(value: AnyValue) -> Value {
    match value {
        AnyValue::Null => Value::Null,
        AnyValue::Boolean(b) => Value::Bool(b),
        AnyValue::String(s) => Value::String(s.to_string()),
        AnyValue::StringOwned(s) => Value::String(s.to_string()),
        AnyValue::Int64(v) => Value::from(v),
        AnyValue::Float64(v) => Value::from(v),
        AnyValue::List(inner) => {
            let items = (0..inner.len())
                .map(|i| inner.get(i).map(any_value_to_json).unwrap_or(Value::Null))
                .collect();
            Value::Array(items)
        }
        other => Value::String(format!("{:?}", other)),
    }
}
