//! # primflow-server
//!
//! HTTP server for primflow.
//!
//! This crate provides:
//! - JSON API for editing the stored state graph
//! - Workflow runs against a snapshot of the stored graph
//! - Permissive CORS for browser-based editors
//! - Prometheus metrics and a health endpoint

pub mod config;
pub mod error;
pub mod handler;
pub mod metrics;
pub mod server;

pub use config::{Config, ConfigError, EngineConfig, MetricsConfig, NetworkConfig, StorageConfig};
pub use error::ServerError;
pub use handler::{ApiHandler, ApiResponse};
pub use metrics::Metrics;
pub use server::{Server, ServerConfig};
