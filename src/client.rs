//! Client facade over the loaders, the index and the query builder.

use polars::prelude::*;
use serde_json::{Map, Value};
use tracing::info;

use crate::catalog;
use crate::config::ClientConfig;
use crate::endpoint::EndpointResolver;
use crate::error::Result;
use crate::flatten;
use crate::index;
use crate::query::{self, MetricsQuery, QueryRequest};
use crate::transport::Transport;

/// A connected client: the sorted catalog names and the flattened field
/// frame, both loaded once at connect time and read-only afterwards.
pub struct MetricsClient<T> {
    transport: T,
    resolver: EndpointResolver,
    catalogs: Vec<String>,
    fields: DataFrame,
}

impl<T: Transport> MetricsClient<T> {
    /// Loads the catalog listing, then each catalog's metadata up to the
    /// configured limit, and flattens everything into the field frame.
    pub fn connect(config: ClientConfig, transport: T) -> Result<Self> {
        let resolver = EndpointResolver::new(&config);

        info!("loading catalog listing");
        let catalogs = catalog::load_catalog_names(&transport, &resolver)?;

        info!("loading metadata for {} catalogs", catalogs.len());
        let fields =
            flatten::load_field_table(&transport, &resolver, &catalogs, config.catalog_limit)?;

        Ok(Self {
            transport,
            resolver,
            catalogs,
            fields,
        })
    }

    /// Catalog names in ascending order, as loaded.
    pub fn catalogs(&self) -> &[String] {
        &self.catalogs
    }

    /// The flattened catalog × field frame.
    pub fn fields(&self) -> &DataFrame {
        &self.fields
    }

    pub fn all_metrics(&self) -> Result<DataFrame> {
        index::all_metrics(&self.fields)
    }

    pub fn metric_detail(&self, metric_name: &str) -> Result<Vec<Map<String, Value>>> {
        index::metric_detail(&self.fields, metric_name)
    }

    pub fn dimensions_for_metric(&self, metric_name: &str) -> Result<DataFrame> {
        index::dimensions_for_metric(&self.fields, metric_name)
    }

    pub fn metrics_with_dimensions(&self) -> Result<DataFrame> {
        index::metrics_with_dimensions(&self.fields)
    }

    pub fn build_query(&self, request: &QueryRequest) -> Result<MetricsQuery> {
        query::build_query(&self.transport, &self.resolver, &self.fields, request)
    }
}
