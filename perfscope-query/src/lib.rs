//! perfscope query library
//!
//! This library talks to a Prometheus-compatible backend and turns range
//! query results into the core data types: comparison tables, aligned
//! percentile frames and per-run sample frames.

// Core modules
pub mod client;
pub mod collect;
pub mod config;
pub mod mock_client;
pub mod promql;
pub mod study;

// Re-export commonly used types
pub use client::{PrometheusClient, RangeQuery};
pub use config::PerfscopeConfig;
pub use study::{NamedMetric, Study};
