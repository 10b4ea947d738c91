use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::{
    Client,
    api::{Api, DeleteParams, PostParams},
};
use tracing::{debug, info};

use cadflow_core::{ClusterClient, ClusterError};
use cadflow_model::WorkloadSpec;

use crate::{convert::to_pod, error::KubeError};

/// [`ClusterClient`] talking to the Kubernetes API server.
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
}

impl KubeClusterClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Client from the in-cluster service account or the local kubeconfig.
    pub async fn try_default() -> Result<Self, KubeError> {
        let client = Client::try_default().await?;
        Ok(Self::new(client))
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn submit_pod(&self, spec: &WorkloadSpec) -> Result<(), ClusterError> {
        let pod = to_pod(spec);
        match self.pods(spec.namespace()).create(&PostParams::default(), &pod).await {
            Ok(_) => {
                info!(pod = spec.name(), namespace = spec.namespace(), "pod created");
                Ok(())
            }
            Err(kube::Error::Api(ae)) if ae.code == 409 => Err(ClusterError::AlreadyExists {
                name: spec.name().to_string(),
                namespace: spec.namespace().to_string(),
            }),
            Err(e) => Err(api_error("create", spec.name(), spec.namespace(), e)),
        }
    }

    async fn delete_pod(&self, name: &str, namespace: &str) -> Result<(), ClusterError> {
        match self.pods(namespace).delete(name, &DeleteParams::default()).await {
            Ok(_) => {
                debug!(pod = name, namespace, "pod deletion requested");
                Ok(())
            }
            Err(kube::Error::Api(ae)) if ae.code == 404 => Err(ClusterError::NotFound {
                name: name.to_string(),
                namespace: namespace.to_string(),
            }),
            Err(e) => Err(api_error("delete", name, namespace, e)),
        }
    }

    async fn pod_annotations(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Option<BTreeMap<String, String>>, ClusterError> {
        let pod = self
            .pods(namespace)
            .get_opt(name)
            .await
            .map_err(|e| api_error("get", name, namespace, e))?;
        Ok(pod.map(|p| p.metadata.annotations.unwrap_or_default()))
    }
}

/// API server rejections map to [`ClusterError::Api`], transport failures to [`ClusterError::Unavailable`].
fn api_error(op: &'static str, name: &str, namespace: &str, err: kube::Error) -> ClusterError {
    match err {
        kube::Error::Api(ae) => ClusterError::Api {
            op,
            name: name.to_string(),
            namespace: namespace.to_string(),
            reason: format!("{} ({})", ae.message, ae.code),
        },
        other => ClusterError::Unavailable(format!("{op} {namespace}/{name}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use kube::error::ErrorResponse;

    use super::*;

    #[test]
    fn api_rejections_keep_the_reason() {
        let err = kube::Error::Api(ErrorResponse {
            status: "Failure".into(),
            message: "pods is forbidden".into(),
            reason: "Forbidden".into(),
            code: 403,
        });

        match api_error("create", "cad-reader-b-1", "cad", err) {
            ClusterError::Api { op, name, reason, .. } => {
                assert_eq!(op, "create");
                assert_eq!(name, "cad-reader-b-1");
                assert_eq!(reason, "pods is forbidden (403)");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
