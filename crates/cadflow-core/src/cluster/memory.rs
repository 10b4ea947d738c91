use std::{
    collections::BTreeMap,
    sync::{Mutex, MutexGuard},
};

use async_trait::async_trait;

use cadflow_model::WorkloadSpec;

use super::{ClusterClient, ClusterError};

#[derive(Debug, Default)]
struct Inner {
    /// Live pods keyed by `(namespace, name)`.
    pods: BTreeMap<(String, String), WorkloadSpec>,
    /// Every accepted submission in order, including ones later deleted.
    submitted: Vec<WorkloadSpec>,
    deleted: Vec<String>,
    fail_submits: usize,
    fail_deletes: bool,
}

/// [`ClusterClient`] that keeps pods in memory.
///
/// Submissions can be made to fail a number of times, deletions can be switched off.
#[derive(Debug, Default)]
pub struct InMemoryCluster {
    inner: Mutex<Inner>,
}

impl InMemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, Inner>, ClusterError> {
        self.inner
            .lock()
            .map_err(|_| ClusterError::Unavailable("cluster state poisoned".into()))
    }

    /// Fail the next `count` submissions with an API error.
    pub fn fail_next_submits(&self, count: usize) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.fail_submits = count;
        }
    }

    pub fn fail_deletes(&self, enabled: bool) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.fail_deletes = enabled;
        }
    }

    /// Accepted submissions, oldest first.
    pub fn submitted(&self) -> Vec<WorkloadSpec> {
        self.inner
            .lock()
            .map(|inner| inner.submitted.clone())
            .unwrap_or_default()
    }

    /// Names of pods currently present.
    pub fn running(&self) -> Vec<String> {
        self.inner
            .lock()
            .map(|inner| inner.pods.keys().map(|(_, name)| name.clone()).collect())
            .unwrap_or_default()
    }

    /// Names passed to successful deletions, oldest first.
    pub fn deleted(&self) -> Vec<String> {
        self.inner
            .lock()
            .map(|inner| inner.deleted.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ClusterClient for InMemoryCluster {
    async fn submit_pod(&self, spec: &WorkloadSpec) -> Result<(), ClusterError> {
        let mut inner = self.state()?;
        let id = (spec.namespace().to_string(), spec.name().to_string());

        if inner.fail_submits > 0 {
            inner.fail_submits -= 1;
            return Err(ClusterError::Api {
                op: "create",
                name: id.1,
                namespace: id.0,
                reason: "injected failure".into(),
            });
        }
        if inner.pods.contains_key(&id) {
            return Err(ClusterError::AlreadyExists {
                name: id.1,
                namespace: id.0,
            });
        }

        inner.pods.insert(id, spec.clone());
        inner.submitted.push(spec.clone());
        Ok(())
    }

    async fn delete_pod(&self, name: &str, namespace: &str) -> Result<(), ClusterError> {
        let mut inner = self.state()?;
        if inner.fail_deletes {
            return Err(ClusterError::Api {
                op: "delete",
                name: name.to_string(),
                namespace: namespace.to_string(),
                reason: "injected failure".into(),
            });
        }

        match inner.pods.remove(&(namespace.to_string(), name.to_string())) {
            Some(_) => {
                inner.deleted.push(name.to_string());
                Ok(())
            }
            None => Err(ClusterError::NotFound {
                name: name.to_string(),
                namespace: namespace.to_string(),
            }),
        }
    }

    async fn pod_annotations(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Option<BTreeMap<String, String>>, ClusterError> {
        let inner = self.state()?;
        Ok(inner
            .pods
            .get(&(namespace.to_string(), name.to_string()))
            .map(|spec| spec.metadata.annotations.clone()))
    }
}
