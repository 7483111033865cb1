//! Blocking JSON transport.
//!
//! The whole client is synchronous: one request, one response, no retry.
//! The trait exists so the loaders and the query builder can be driven
//! by an in-memory transport in tests.

use reqwest::blocking::Client;
use reqwest::header::HeaderMap;
use serde_json::Value;

use crate::error::{MetricsError, Result};

pub trait Transport {
    fn get(&self, url: &str, headers: HeaderMap) -> Result<Value>;
    fn post_json(&self, url: &str, headers: HeaderMap, body: &Value) -> Result<Value>;
}

/// reqwest-backed transport used outside of tests.
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    fn decode(text: &str) -> Result<Value> {
        serde_json::from_str(text)
            .map_err(|e| MetricsError::Decode(format!("response is not valid JSON: {}", e)))
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for HttpTransport {
    fn get(&self, url: &str, headers: HeaderMap) -> Result<Value> {
        let text = self.client.get(url).headers(headers).send()?.text()?;
        Self::decode(&text)
    }

    fn post_json(&self, url: &str, headers: HeaderMap, body: &Value) -> Result<Value> {
        let text = self
            .client
            .post(url)
            .headers(headers)
            .json(body)
            .send()?
            .text()?;
        Self::decode(&text)
    }
}
