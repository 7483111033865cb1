//! Query construction against the compile endpoint.
//!
//! A request is resolved against the flattened metadata frame first:
//! metric names become `{catalog}_{field}` identifiers, dimensions are
//! checked against the metric's join neighborhood, and the assembled
//! body is posted for compilation. The service compiles against one
//! catalog at a time, so metrics spanning catalogs are rejected before
//! anything goes over the wire.

use std::fmt;

use itertools::Itertools;
use polars::prelude::*;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::endpoint::{Endpoint, EndpointResolver};
use crate::error::{MetricsError, Result};
use crate::flatten::{CATALOG_NAME, FIELD_NAME};
use crate::index;
use crate::transport::Transport;

/// Everything the compile endpoint accepts. `filters`, `sorts`,
/// `table_calculations` and `additional_metrics` are forwarded verbatim.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub metrics: Vec<String>,
    pub dimensions: Vec<String>,
    pub filters: Value,
    pub table_calculations: Vec<Value>,
    pub sorts: Vec<Value>,
    pub additional_metrics: Vec<Value>,
    pub limit: u32,
}

impl Default for QueryRequest {
    fn default() -> Self {
        Self {
            metrics: Vec::new(),
            dimensions: Vec::new(),
            filters: json!({}),
            table_calculations: Vec::new(),
            sorts: Vec::new(),
            additional_metrics: Vec::new(),
            limit: 1,
        }
    }
}

impl QueryRequest {
    pub fn for_metrics<I, S>(metrics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            metrics: metrics.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn with_dimensions<I, S>(mut self, dimensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dimensions = dimensions.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }
}

/// Compiled query text plus the catalog it was compiled against.
/// Immutable once built; the request that produced it is not retained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsQuery {
    query: String,
    catalog: String,
}

impl MetricsQuery {
    pub(crate) fn new(query: String, catalog: String) -> Self {
        Self { query, catalog }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn catalog(&self) -> &str {
        &self.catalog
    }
}

impl fmt::Display for MetricsQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.catalog, self.query)
    }
}

#[derive(Debug, Deserialize)]
struct CompileResponse {
    status: String,
    #[serde(default)]
    results: Option<String>,
    #[serde(default)]
    error: Option<Value>,
}

/// Drops everything from the first `limit` token onward.
///
/// The compile endpoint appends a limit clause to the text it returns;
/// callers that want the bare query strip it here. This is a plain text
/// scan over the lowercased query, not a SQL-aware parse; any earlier
/// occurrence of the token truncates too.
pub fn strip_trailing_limit(query: &str) -> &str {
    match query.find("limit") {
        Some(pos) => &query[..pos],
        None => query,
    }
}

/// Resolves a request against the frame, posts the compile body, and
/// wraps the compiled text.
pub fn build_query(
    transport: &dyn Transport,
    resolver: &EndpointResolver,
    frame: &DataFrame,
    request: &QueryRequest,
) -> Result<MetricsQuery> {
    if request.metrics.is_empty() {
        return Err(MetricsError::MissingParameter("metrics"));
    }

    let selected = filter_isin(frame, FIELD_NAME, &request.metrics)?;
    if selected.height() == 0 {
        return Err(MetricsError::NotFound(format!(
            "none of the requested metrics are in the loaded catalogs: {}",
            request.metrics.join(", ")
        )));
    }

    let catalogs: Vec<String> = selected
        .column(CATALOG_NAME)?
        .str()?
        .into_iter()
        .flatten()
        .unique()
        .map(str::to_string)
        .collect();
    if catalogs.len() > 1 {
        return Err(MetricsError::CrossCatalog(catalogs.join(", ")));
    }
    let catalog_name = catalogs
        .into_iter()
        .next()
        .ok_or_else(|| MetricsError::NotFound("selected rows carry no catalog name".to_string()))?;

    let metric_ids = field_ids(&selected)?;

    let first_metric = &request.metrics[0];
    let valid = index::dimensions_for_metric(frame, first_metric)?;
    let chosen = filter_isin(&valid, FIELD_NAME, &request.dimensions)?;
    if chosen.height() != request.dimensions.len() {
        warn!(
            "some requested dimensions are not valid for {}; ignoring them",
            first_metric
        );
    }
    let dimension_ids = field_ids(&chosen)?;

    let body = json!({
        "exploreName": catalog_name,
        "dimensions": dimension_ids,
        "metrics": metric_ids,
        "sorts": request.sorts,
        "filters": request.filters,
        "limit": request.limit,
        "tableCalculations": request.table_calculations,
        "additionalMetrics": request.additional_metrics,
    });

    let (url, headers) = resolver.resolve(Endpoint::CompileQuery {
        table_name: &catalog_name,
    })?;
    debug!("compiling query for catalog {}", catalog_name);
    let response: CompileResponse = serde_json::from_value(transport.post_json(&url, headers, &body)?)?;

    if response.status != "ok" {
        return Err(MetricsError::QueryCompile(
            response.error.unwrap_or(Value::Null),
        ));
    }
    let compiled = response.results.ok_or_else(|| {
        MetricsError::Decode("compile response has ok status but no results".to_string())
    })?;

    let mut query = compiled.to_lowercase();
    if request.limit == 1 {
        query = strip_trailing_limit(&query).to_string();
    }
    Ok(MetricsQuery::new(query, catalog_name))
}

/// Backend field identifiers are `{catalog}_{field}`, one per row.
fn field_ids(rows: &DataFrame) -> Result<Vec<String>> {
    let catalogs = rows.column(CATALOG_NAME)?.str()?;
    let fields = rows.column(FIELD_NAME)?.str()?;
    let ids = catalogs
        .into_iter()
        .zip(fields)
        .filter_map(|(catalog, field)| Some(format!("{}_{}", catalog?, field?)))
        .collect();
    Ok(ids)
}

fn filter_isin(frame: &DataFrame, column: &str, values: &[String]) -> Result<DataFrame> {
    let mask: BooleanChunked = frame
        .column(column)?
        .str()?
        .into_iter()
        .map(|cell| Some(cell.is_some_and(|c| values.iter().any(|v| v == c))))
        .collect();
    frame.filter(&mask).map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogMetadata;
    use crate::config::ClientConfig;
    use crate::flatten::FieldTableBuilder;
    use crate::transport::testing::ScriptedTransport;

    fn catalog_metadata(body: Value) -> CatalogMetadata {
        serde_json::from_value(body).unwrap()
    }

    fn sample_frame() -> DataFrame {
        let mut builder = FieldTableBuilder::new();
        builder.push_catalog(catalog_metadata(json!({
            "name": "orders",
            "label": "Orders",
            "fields": [
                {"name": "revenue", "fieldType": "metric", "basicType": "numeric"},
                {"name": "status", "fieldType": "dimension", "basicType": "string"}
            ],
            "joinedTables": ["customers"]
        })));
        builder.push_catalog(catalog_metadata(json!({
            "name": "customers",
            "label": "Customers",
            "fields": [
                {"name": "lifetime_value", "fieldType": "metric", "basicType": "numeric"},
                {"name": "region", "fieldType": "dimension", "basicType": "string"}
            ],
            "joinedTables": []
        })));
        builder.finish().unwrap()
    }

    fn resolver() -> EndpointResolver {
        EndpointResolver::new(&ClientConfig::new(
            "https://metrics.example.com",
            "token",
            "proj",
        ))
    }

    #[test]
    fn test_strip_trailing_limit() {
        assert_eq!(
            strip_trailing_limit("select a, b from t limit 10"),
            "select a, b from t "
        );
        assert_eq!(strip_trailing_limit("select a from t"), "select a from t");
    }

    #[test]
    fn test_compile_round_trip() {
        let transport = ScriptedTransport::new().respond(
            "/explores/orders/compileQuery",
            json!({"status": "ok", "results": "SELECT A FROM ORDERS LIMIT 10"}),
        );
        let request = QueryRequest::for_metrics(["revenue"]).with_dimensions(["status"]);

        let query = build_query(&transport, &resolver(), &sample_frame(), &request).unwrap();
        assert_eq!(query.query(), "select a from orders ");
        assert_eq!(query.catalog(), "orders");

        let body = transport.last_body().unwrap();
        assert_eq!(body["exploreName"], json!("orders"));
        assert_eq!(body["metrics"], json!(["orders_revenue"]));
        assert_eq!(body["dimensions"], json!(["orders_status"]));
        assert_eq!(body["limit"], json!(1));
    }

    #[test]
    fn test_higher_limit_keeps_clause() {
        let transport = ScriptedTransport::new().respond(
            "/explores/orders/compileQuery",
            json!({"status": "ok", "results": "SELECT A FROM ORDERS LIMIT 50"}),
        );
        let request = QueryRequest::for_metrics(["revenue"]).with_limit(50);

        let query = build_query(&transport, &resolver(), &sample_frame(), &request).unwrap();
        assert_eq!(query.query(), "select a from orders limit 50");
    }

    #[test]
    fn test_invalid_dimensions_are_dropped() {
        let transport = ScriptedTransport::new().respond(
            "/explores/orders/compileQuery",
            json!({"status": "ok", "results": "SELECT A FROM ORDERS"}),
        );
        let request =
            QueryRequest::for_metrics(["revenue"]).with_dimensions(["region", "method", "bogus"]);

        build_query(&transport, &resolver(), &sample_frame(), &request).unwrap();

        // region lives in the joined customers catalog; the others are
        // outside the neighborhood and silently dropped.
        let body = transport.last_body().unwrap();
        assert_eq!(body["dimensions"], json!(["customers_region"]));
    }

    #[test]
    fn test_cross_catalog_metrics_never_reach_the_transport() {
        let transport = ScriptedTransport::new();
        let request = QueryRequest::for_metrics(["revenue", "lifetime_value"]);

        let err = build_query(&transport, &resolver(), &sample_frame(), &request).unwrap_err();
        assert!(matches!(err, MetricsError::CrossCatalog(_)));
        assert_eq!(transport.call_count(), 0);
    }

    #[test]
    fn test_empty_metrics_is_missing_parameter() {
        let transport = ScriptedTransport::new();
        let request = QueryRequest::default();

        let err = build_query(&transport, &resolver(), &sample_frame(), &request).unwrap_err();
        assert!(matches!(err, MetricsError::MissingParameter("metrics")));
        assert_eq!(transport.call_count(), 0);
    }

    #[test]
    fn test_unknown_metrics_are_not_found() {
        let transport = ScriptedTransport::new();
        let request = QueryRequest::for_metrics(["no_such_metric"]);

        let err = build_query(&transport, &resolver(), &sample_frame(), &request).unwrap_err();
        assert!(matches!(err, MetricsError::NotFound(_)));
        assert_eq!(transport.call_count(), 0);
    }

    #[test]
    fn test_compile_failure_carries_backend_payload() {
        let transport = ScriptedTransport::new().respond(
            "/explores/orders/compileQuery",
            json!({"status": "error", "error": {"name": "CompileError", "message": "bad field"}}),
        );
        let request = QueryRequest::for_metrics(["revenue"]);

        let err = build_query(&transport, &resolver(), &sample_frame(), &request).unwrap_err();
        match err {
            MetricsError::QueryCompile(payload) => {
                assert_eq!(payload["name"], json!("CompileError"));
            }
            other => panic!("expected a compile error, got {:?}", other),
        }
    }
}
