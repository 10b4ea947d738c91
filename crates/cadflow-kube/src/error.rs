use thiserror::Error;

use cadflow_model::ErrorKind;

#[derive(Debug, Error)]
pub enum KubeError {
    #[error("failed to create kubernetes client: {0}")]
    Client(#[from] kube::Error),
}

impl KubeError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Cluster
    }
}
