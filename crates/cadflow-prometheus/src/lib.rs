//! Prometheus metrics backend for the cadflow orchestrator.
//!
//! [`PrometheusMetrics`] implements [`cadflow_core::MetricsBackend`] on its own [`Registry`].
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use cadflow_core::{InMemoryCluster, InMemoryStore, OrchestratorContext};
//! use cadflow_prometheus::PrometheusMetrics;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let metrics = PrometheusMetrics::new()?;
//! let ctx = OrchestratorContext::new(
//!     Arc::new(InMemoryStore::new()),
//!     Arc::new(InMemoryCluster::new()),
//! )
//! .with_metrics(Arc::new(metrics.clone()));
//! # let _ = ctx;
//!
//! // let families = metrics.gather();
//! // TextEncoder::new().encode(&families, &mut buffer)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Metrics
//! - `cadflow_lock_acquisitions_total{mode}` - Counter (`mode` = `normal` | `stolen`)
//! - `cadflow_lock_release_failures_total` - Counter
//! - `cadflow_jobs_submitted_total{role, outcome}` - Counter
//! - `cadflow_stage_transitions_total{stage}` - Counter
//! - `cadflow_batches_terminal_total{stage}` - Counter
//! - `cadflow_sweeps_total` - Counter
//! - `cadflow_sweep_timeouts_total` - Counter
//!
//! No `/metrics` endpoint is served here; encode [`PrometheusMetrics::gather`] from the host's HTTP stack.

mod backend;
pub use backend::PrometheusMetrics;

pub use prometheus::{Encoder, Registry, TextEncoder};
