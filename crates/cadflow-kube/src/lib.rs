//! Kubernetes backend for the cadflow [`ClusterClient`](cadflow_core::ClusterClient) port.
//!
//! [`to_pod`] is a pure conversion and can be used without a cluster;
//! [`KubeClusterClient`] submits and deletes the resulting pods.

mod convert;
pub use convert::to_pod;

mod client;
pub use client::KubeClusterClient;

mod error;
pub use error::KubeError;
