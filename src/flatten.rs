//! Catalog metadata flattening.
//!
//! Each catalog's metadata arrives as a nested document whose field
//! records have no fixed key set. Rows are accumulated as raw JSON maps
//! together with a running union of the keys seen so far, and the wide
//! frame is materialized exactly once, after the last catalog. A key
//! first seen in a late catalog backfills earlier rows as nulls.

use indicatif::{ProgressBar, ProgressStyle};
use polars::prelude::*;
use serde_json::Value;
use tracing::warn;

use crate::catalog::{self, CatalogMetadata};
use crate::endpoint::EndpointResolver;
use crate::error::{MetricsError, Result};
use crate::transport::Transport;

pub const CATALOG_NAME: &str = "catalog_name";
pub const CATALOG_LABEL: &str = "catalog_label";
pub const JOINED_CATALOGS: &str = "joined_catalogs";
pub const FIELD_NAME: &str = "field_name";
pub const FIELD_TYPE: &str = "field_fieldType";
pub const FIELD_BASIC_TYPE: &str = "field_basicType";
pub const FIELD_DESCRIPTION: &str = "field_description";

const FIELD_PREFIX: &str = "field_";

/// Field columns that exist in every frame, observed or not, so the
/// read-side projections are total.
const BASELINE_FIELD_COLUMNS: [&str; 4] =
    [FIELD_NAME, FIELD_TYPE, FIELD_BASIC_TYPE, FIELD_DESCRIPTION];

#[derive(Debug)]
struct FieldRow {
    catalog_name: String,
    catalog_label: String,
    joined_catalogs: Vec<String>,
    attrs: serde_json::Map<String, Value>,
}

/// Accumulates one row per field across catalogs and materializes the
/// wide catalog × field frame on [`finish`](FieldTableBuilder::finish).
#[derive(Debug, Default)]
pub struct FieldTableBuilder {
    rows: Vec<FieldRow>,
    field_columns: Vec<String>,
}

impl FieldTableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of field rows accumulated so far.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Expands one catalog's fields into rows. The catalog's name, label
    /// and joined-tables list are replicated onto each of its rows; they
    /// are per-catalog facts the flat shape simply duplicates.
    pub fn push_catalog(&mut self, metadata: CatalogMetadata) {
        let CatalogMetadata {
            name,
            label,
            fields,
            joined_tables,
        } = metadata;

        for field in fields {
            for key in field.keys() {
                let column = format!("{}{}", FIELD_PREFIX, key);
                if !self.field_columns.iter().any(|c| c == &column) {
                    self.field_columns.push(column);
                }
            }
            self.rows.push(FieldRow {
                catalog_name: name.clone(),
                catalog_label: label.clone(),
                joined_catalogs: joined_tables.clone(),
                attrs: field,
            });
        }
    }

    /// Materializes the frame.
    ///
    /// Column typing: a field column whose non-null values are all JSON
    /// strings becomes String and all-boolean becomes Boolean; anything
    /// mixed or structured is stored as its JSON text. `joined_catalogs`
    /// is List(String).
    pub fn finish(self) -> Result<DataFrame> {
        if self.rows.is_empty() {
            return empty_frame();
        }

        let mut columns: Vec<Series> = Vec::with_capacity(3 + self.field_columns.len());

        let names: Vec<&str> = self.rows.iter().map(|r| r.catalog_name.as_str()).collect();
        columns.push(Series::new(CATALOG_NAME, names));

        let labels: Vec<&str> = self.rows.iter().map(|r| r.catalog_label.as_str()).collect();
        columns.push(Series::new(CATALOG_LABEL, labels));

        let joined: Vec<Series> = self
            .rows
            .iter()
            .map(|r| Series::new("", r.joined_catalogs.clone()))
            .collect();
        columns.push(Series::new(JOINED_CATALOGS, joined));

        for column in ordered_field_columns(&self.field_columns) {
            let key = column
                .strip_prefix(FIELD_PREFIX)
                .unwrap_or(column.as_str())
                .to_string();
            columns.push(field_column_series(&column, &key, &self.rows));
        }

        DataFrame::new(columns).map_err(Into::into)
    }
}

/// Baseline columns first, in their fixed order, then every other
/// observed key in first-seen order.
fn ordered_field_columns(observed: &[String]) -> Vec<String> {
    let mut columns: Vec<String> = BASELINE_FIELD_COLUMNS
        .iter()
        .map(|c| c.to_string())
        .collect();
    for column in observed {
        if !columns.iter().any(|c| c == column) {
            columns.push(column.clone());
        }
    }
    columns
}

fn field_column_series(column: &str, key: &str, rows: &[FieldRow]) -> Series {
    let mut saw_value = false;
    let mut all_bool = true;
    for row in rows {
        match row.attrs.get(key) {
            None | Some(Value::Null) => {}
            Some(Value::Bool(_)) => saw_value = true,
            Some(_) => {
                saw_value = true;
                all_bool = false;
            }
        }
    }

    if saw_value && all_bool {
        let values: Vec<Option<bool>> = rows
            .iter()
            .map(|row| row.attrs.get(key).and_then(Value::as_bool))
            .collect();
        return Series::new(column, values);
    }

    let values: Vec<Option<String>> = rows
        .iter()
        .map(|row| row.attrs.get(key).and_then(json_cell))
        .collect();
    Series::new(column, values)
}

/// One JSON attribute value rendered as a frame cell.
fn json_cell(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

fn empty_frame() -> Result<DataFrame> {
    let mut columns = vec![
        Series::new_empty(CATALOG_NAME, &DataType::String),
        Series::new_empty(CATALOG_LABEL, &DataType::String),
        Series::new_empty(JOINED_CATALOGS, &DataType::List(Box::new(DataType::String))),
    ];
    for column in BASELINE_FIELD_COLUMNS {
        columns.push(Series::new_empty(column, &DataType::String));
    }
    DataFrame::new(columns).map_err(Into::into)
}

/// Fetches metadata for each catalog name, up to `limit`, and flattens
/// everything into the wide frame.
///
/// A catalog whose metadata request reports a non-ok status contributes
/// no rows: it is skipped with a warning and the load keeps going.
/// Transport and decode failures are fatal, as everywhere else.
pub fn load_field_table(
    transport: &dyn Transport,
    resolver: &EndpointResolver,
    catalog_names: &[String],
    limit: Option<usize>,
) -> Result<DataFrame> {
    let count = limit.unwrap_or(catalog_names.len()).min(catalog_names.len());

    let bar = ProgressBar::new(count as u64);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} catalogs")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let mut builder = FieldTableBuilder::new();
    for name in &catalog_names[..count] {
        let response = catalog::load_catalog_metadata(transport, resolver, name)?;
        if response.status != "ok" {
            warn!("failed to read metadata for catalog {}; skipping it", name);
            bar.inc(1);
            continue;
        }
        match response.results {
            Some(metadata) => builder.push_catalog(metadata),
            None => {
                return Err(MetricsError::Decode(format!(
                    "metadata response for {} has ok status but no results",
                    name
                )))
            }
        }
        bar.inc(1);
    }
    bar.finish_and_clear();

    builder.finish()
}
