//! FunFood Common Library
//!
//! Shared code for the FunFood services including:
//! - JSON document repository
//! - Generic query engine (filters, search, sort, pagination, relations)
//! - Resource services with schemas and per-resource hooks
//! - Error types and handling
//! - Configuration management
//! - Metrics and observability

pub mod config;
pub mod db;
pub mod errors;
pub mod metrics;
pub mod query;
pub mod services;

// Re-export commonly used types
pub use config::AppConfig;
pub use db::{Document, JsonRepository, Repository};
pub use errors::{AppError, Result};
pub use query::{QueryEngine, QueryOptions, QueryResult};
pub use services::{ResourceService, ServiceRegistry};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
