pub mod catalog;
pub mod client;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod flatten;
pub mod index;
pub mod query;
pub mod transport;
pub mod warehouse;

pub use client::MetricsClient;
pub use config::ClientConfig;
pub use error::{MetricsError, Result};
pub use query::{MetricsQuery, QueryRequest};
pub use transport::{HttpTransport, Transport};
pub use warehouse::{SqlApiWarehouse, Warehouse, WarehouseConfig};
