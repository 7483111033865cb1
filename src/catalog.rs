//! Catalog listing and per-catalog metadata responses.
//!
//! Field records keep their raw JSON maps: the key set varies with the
//! service version and feeds the union-of-keys flattening downstream.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::endpoint::{Endpoint, EndpointResolver};
use crate::error::{MetricsError, Result};
use crate::transport::Transport;

/// One entry in the project catalog listing. Extra attributes are
/// ignored; only the name is used downstream.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogEntry {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogListResponse {
    pub results: Vec<CatalogEntry>,
}

/// Field metadata for one catalog, as returned by the metadata endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogMetadata {
    pub name: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub fields: Vec<Map<String, Value>>,
    #[serde(default, rename = "joinedTables")]
    pub joined_tables: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogMetadataResponse {
    pub status: String,
    #[serde(default)]
    pub results: Option<CatalogMetadata>,
}

/// Pulls the catalog listing and returns its table names sorted
/// ascending (case-sensitive lexical order).
pub fn load_catalog_names(
    transport: &dyn Transport,
    resolver: &EndpointResolver,
) -> Result<Vec<String>> {
    let (url, headers) = resolver.resolve(Endpoint::Catalog)?;
    let body = transport.get(&url, headers)?;
    let decoded: CatalogListResponse = serde_json::from_value(body)
        .map_err(|e| MetricsError::Decode(format!("catalog listing: {}", e)))?;
    let mut names: Vec<String> = decoded.results.into_iter().map(|entry| entry.name).collect();
    names.sort();
    Ok(names)
}

/// Fetches the metadata document for one catalog. The caller decides
/// what a non-ok status means; this only decodes.
pub fn load_catalog_metadata(
    transport: &dyn Transport,
    resolver: &EndpointResolver,
    table_name: &str,
) -> Result<CatalogMetadataResponse> {
    let (url, headers) = resolver.resolve(Endpoint::CatalogMetadata { table_name })?;
    let body = transport.get(&url, headers)?;
    serde_json::from_value(body)
        .map_err(|e| MetricsError::Decode(format!("metadata for {}: {}", table_name, e)))
}
