//! Warehouse execution for compiled queries.
//!
//! Each call is one self-contained statement request; no session or
//! connection survives between calls. Credentials travel in an explicit
//! config value handed to [`MetricsQuery::execute_on`];
//! [`WarehouseConfig::from_env`] is just a constructor for the
//! conventional variable set.

use polars::prelude::*;
use reqwest::header::{self, HeaderMap, HeaderValue};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{MetricsError, Result};
use crate::query::MetricsQuery;
use crate::transport::Transport;

/// Connection parameters for the warehouse. `user` completes the
/// credential set; token-authenticated statement calls do not send it.
#[derive(Debug, Clone)]
pub struct WarehouseConfig {
    pub account: String,
    pub user: String,
    pub password: String,
    pub database: String,
    pub warehouse: String,
    pub role: String,
}

impl WarehouseConfig {
    /// Reads the `SNOWFLAKE_*` variables. Every variable must be set.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            account: require_env("SNOWFLAKE_ACCOUNT")?,
            user: require_env("SNOWFLAKE_EMAIL")?,
            password: require_env("SNOWFLAKE_PASSWORD")?,
            database: require_env("SNOWFLAKE_DATABASE")?,
            warehouse: require_env("SNOWFLAKE_WAREHOUSE")?,
            role: require_env("SNOWFLAKE_ROLE")?,
        })
    }
}

fn require_env(name: &str) -> Result<String> {
    std::env::var(name).map_err(|_| MetricsError::Config(format!("{} is not set", name)))
}

/// Executes one SQL statement and returns its result set as a frame.
pub trait Warehouse {
    fn execute(&self, sql: &str, config: &WarehouseConfig) -> Result<DataFrame>;
}

/// Drives the warehouse's HTTP statement endpoint
/// (`https://{account}.snowflakecomputing.com/api/v2/statements`).
/// Result cells arrive as JSON strings, so every column comes back as a
/// String series; callers cast as needed.
pub struct SqlApiWarehouse<T> {
    transport: T,
}

impl<T: Transport> SqlApiWarehouse<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }
}

#[derive(Debug, Deserialize)]
struct StatementResponse {
    #[serde(rename = "resultSetMetaData")]
    result_set_meta_data: ResultSetMetaData,
    #[serde(default)]
    data: Vec<Vec<Option<String>>>,
}

#[derive(Debug, Deserialize)]
struct ResultSetMetaData {
    #[serde(rename = "rowType")]
    row_type: Vec<ColumnType>,
}

#[derive(Debug, Deserialize)]
struct ColumnType {
    name: String,
}

impl<T: Transport> Warehouse for SqlApiWarehouse<T> {
    fn execute(&self, sql: &str, config: &WarehouseConfig) -> Result<DataFrame> {
        let url = format!(
            "https://{}.snowflakecomputing.com/api/v2/statements",
            config.account
        );

        let mut headers = HeaderMap::new();
        let bearer = format!("Bearer {}", config.password);
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&bearer).map_err(|_| {
                MetricsError::Config("warehouse token is not a valid header value".to_string())
            })?,
        );
        headers.insert(
            "X-Snowflake-Authorization-Token-Type",
            HeaderValue::from_static("OAUTH"),
        );
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));

        let body = json!({
            "statement": sql,
            "database": config.database,
            "warehouse": config.warehouse,
            "role": config.role,
        });

        debug!("executing statement on account {}", config.account);
        let response = self.transport.post_json(&url, headers, &body)?;

        if response.get("resultSetMetaData").is_none() {
            let message = response
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("statement execution failed")
                .to_string();
            return Err(MetricsError::Warehouse(message));
        }
        let statement: StatementResponse = serde_json::from_value(response)?;

        let columns: Vec<Series> = statement
            .result_set_meta_data
            .row_type
            .iter()
            .enumerate()
            .map(|(idx, column)| {
                let values: Vec<Option<String>> = statement
                    .data
                    .iter()
                    .map(|row| row.get(idx).cloned().flatten())
                    .collect();
                Series::new(&column.name, values)
            })
            .collect();
        DataFrame::new(columns).map_err(Into::into)
    }
}

impl MetricsQuery {
    /// Runs the compiled query on the given warehouse. One request per
    /// call; nothing is cached or kept open between calls.
    pub fn execute_on(
        &self,
        warehouse: &dyn Warehouse,
        config: &WarehouseConfig,
    ) -> Result<DataFrame> {
        warehouse.execute(self.query(), config)
    }
}
