use thiserror::Error;

/// Error taxonomy for the metrics client.
///
/// Per-catalog metadata failures during the initial load are not errors:
/// they are logged and the catalog is skipped. Everything below is fatal
/// to the operation that raised it, and nothing is retried.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// A required argument was not supplied (e.g. an empty metrics list).
    #[error("missing parameter: {0}")]
    MissingParameter(&'static str),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("decode error: {0}")]
    Decode(String),

    /// The requested metrics span more than one catalog; the backend
    /// compiles a query against a single model at a time.
    #[error("metrics span multiple catalogs: {0}")]
    CrossCatalog(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// The backend rejected the compile request; carries its error payload.
    #[error("query compile failed: {0}")]
    QueryCompile(serde_json::Value),

    #[error("warehouse error: {0}")]
    Warehouse(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("table error: {0}")]
    Table(String),
}

impl From<polars::error::PolarsError> for MetricsError {
    fn from(e: polars::error::PolarsError) -> Self {
        MetricsError::Table(e.to_string())
    }
}

impl From<serde_json::Error> for MetricsError {
    fn from(e: serde_json::Error) -> Self {
        MetricsError::Decode(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MetricsError>;
