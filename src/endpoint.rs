//! Endpoint resolution.
//!
//! Service operations are a closed enum: the variants that need a table
//! name carry it, so a request for them cannot be built without one.

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};

use crate::config::ClientConfig;
use crate::error::{MetricsError, Result};

/// One of the service operations the client performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint<'a> {
    /// List the project's data catalog.
    Catalog,
    /// Field metadata for one catalog table.
    CatalogMetadata { table_name: &'a str },
    /// Compile a metrics query against one explore/table.
    CompileQuery { table_name: &'a str },
}

/// Maps operations onto concrete request targets and headers. Pure:
/// the result is a function of the stored config and the endpoint value.
#[derive(Debug, Clone)]
pub struct EndpointResolver {
    base_url: String,
    project_id: String,
    access_token: String,
}

impl EndpointResolver {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            base_url: config.base_url.clone(),
            project_id: config.project_id.clone(),
            access_token: config.access_token.clone(),
        }
    }

    /// Returns the request URL and headers for an operation. Every
    /// operation authenticates with the stored access token; query
    /// compilation additionally declares its JSON body.
    pub fn resolve(&self, endpoint: Endpoint<'_>) -> Result<(String, HeaderMap)> {
        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("ApiKey {}", self.access_token))
            .map_err(|e| MetricsError::Config(format!("access token is not a valid header value: {}", e)))?;
        headers.insert(AUTHORIZATION, auth);

        let url = match endpoint {
            Endpoint::Catalog => format!(
                "{}/api/v1/projects/{}/dataCatalog",
                self.base_url, self.project_id
            ),
            Endpoint::CatalogMetadata { table_name } => format!(
                "{}/api/v1/projects/{}/dataCatalog/{}/metadata",
                self.base_url, self.project_id, table_name
            ),
            Endpoint::CompileQuery { table_name } => {
                headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                format!(
                    "{}/api/v1/projects/{}/explores/{}/compileQuery",
                    self.base_url, self.project_id, table_name
                )
            }
        };

        Ok((url, headers))
    }
}
