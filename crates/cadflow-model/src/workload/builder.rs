use std::collections::{BTreeMap, HashSet};

use super::{
    Affinity, AffinityTerm, ContainerDef, PodAntiAffinity, PodTemplate, RestartPolicy, SpecError,
    Toleration, WeightedAffinityTerm, WorkloadMeta, WorkloadSpec,
};

/// Weight applied to every preferred anti-affinity term.
pub const PREFERRED_ANTI_AFFINITY_WEIGHT: i32 = 100;

const MAX_NAME_LEN: usize = 63;

/// Fluent accumulator for a [`WorkloadSpec`].
///
/// Setters can be called in any order; each one creates the nested block it writes into
/// (metadata, pod spec, affinity) on first use. Nothing is validated until [`Self::build`].
#[derive(Debug, Clone, Default)]
pub struct WorkloadSpecBuilder {
    metadata: Option<WorkloadMeta>,
    spec: Option<PodDraft>,
}

#[derive(Debug, Clone, Default)]
struct PodDraft {
    containers: Vec<ContainerDef>,
    restart_policy: RestartPolicy,
    node_selector: BTreeMap<String, String>,
    node_name: Option<String>,
    tolerations: Vec<Toleration>,
    anti_affinity: Option<PodAntiAffinity>,
}

impl PodDraft {
    fn anti_affinity(&mut self) -> &mut PodAntiAffinity {
        self.anti_affinity.get_or_insert_with(PodAntiAffinity::default)
    }
}

impl WorkloadSpecBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn meta(&mut self) -> &mut WorkloadMeta {
        self.metadata.get_or_insert_with(WorkloadMeta::default)
    }

    fn pod(&mut self) -> &mut PodDraft {
        self.spec.get_or_insert_with(PodDraft::default)
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.meta().name = name.into();
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.meta().namespace = namespace.into();
        self
    }

    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.meta().labels.insert(key.into(), value.into());
        self
    }

    pub fn labels<I, K, V>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let meta = self.meta();
        for (k, v) in labels {
            meta.labels.insert(k.into(), v.into());
        }
        self
    }

    pub fn annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.meta().annotations.insert(key.into(), value.into());
        self
    }

    pub fn annotations<I, K, V>(mut self, annotations: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let meta = self.meta();
        for (k, v) in annotations {
            meta.annotations.insert(k.into(), v.into());
        }
        self
    }

    pub fn toleration(mut self, toleration: Toleration) -> Self {
        self.pod().tolerations.push(toleration);
        self
    }

    pub fn tolerations(mut self, tolerations: impl IntoIterator<Item = Toleration>) -> Self {
        self.pod().tolerations.extend(tolerations);
        self
    }

    pub fn restart_policy(mut self, policy: RestartPolicy) -> Self {
        self.pod().restart_policy = policy;
        self
    }

    pub fn node_selector(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.pod().node_selector.insert(key.into(), value.into());
        self
    }

    pub fn node_name(mut self, node: impl Into<String>) -> Self {
        self.pod().node_name = Some(node.into());
        self
    }

    /// Hard rule: never schedule next to pods carrying `match_labels` within `topology_key`.
    pub fn anti_affinity_rule<I, K, V>(mut self, match_labels: I, topology_key: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let term = affinity_term(match_labels, topology_key);
        self.pod().anti_affinity().required.push(term);
        self
    }

    /// Soft rule with weight [`PREFERRED_ANTI_AFFINITY_WEIGHT`].
    pub fn anti_affinity_preference<I, K, V>(
        mut self,
        match_labels: I,
        topology_key: impl Into<String>,
    ) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let term = affinity_term(match_labels, topology_key);
        self.pod().anti_affinity().preferred.push(WeightedAffinityTerm {
            weight: PREFERRED_ANTI_AFFINITY_WEIGHT,
            term,
        });
        self
    }

    pub fn container(mut self, container: ContainerDef) -> Self {
        self.pod().containers.push(container);
        self
    }

    /// Validate the accumulated blocks and produce the spec.
    pub fn build(self) -> Result<WorkloadSpec, SpecError> {
        let metadata = self.metadata.ok_or(SpecError::MissingBlock("metadata"))?;
        validate_name("name", &metadata.name)?;
        validate_name("namespace", &metadata.namespace)?;

        let pod = self.spec.ok_or(SpecError::MissingBlock("spec"))?;
        if pod.containers.is_empty() {
            return Err(SpecError::NoContainers);
        }

        let mut seen = HashSet::with_capacity(pod.containers.len());
        let mut containers = Vec::with_capacity(pod.containers.len());
        for def in pod.containers {
            validate_name("container name", def.name())?;
            if !seen.insert(def.name().to_string()) {
                return Err(SpecError::DuplicateContainer(def.name().to_string()));
            }
            let container = def.into_spec();
            if container.image.trim().is_empty() {
                return Err(SpecError::EmptyImage(container.name));
            }
            containers.push(container);
        }

        let affinity = pod
            .anti_affinity
            .filter(|a| !a.is_empty())
            .map(|pod_anti_affinity| Affinity { pod_anti_affinity });

        Ok(WorkloadSpec {
            metadata,
            spec: PodTemplate {
                containers,
                restart_policy: pod.restart_policy,
                node_selector: pod.node_selector,
                node_name: pod.node_name,
                tolerations: pod.tolerations,
                affinity,
            },
        })
    }
}

fn affinity_term<I, K, V>(match_labels: I, topology_key: impl Into<String>) -> AffinityTerm
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    AffinityTerm {
        match_labels: match_labels
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect(),
        topology_key: topology_key.into(),
    }
}

fn validate_name(field: &'static str, value: &str) -> Result<(), SpecError> {
    if value.is_empty() {
        return Err(SpecError::MissingField(field));
    }
    if !is_dns_label(value) {
        return Err(SpecError::InvalidName {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

fn is_dns_label(s: &str) -> bool {
    let bytes = s.as_bytes();
    bytes.len() <= MAX_NAME_LEN
        && bytes
            .iter()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-')
        && bytes.first().is_some_and(|b| b.is_ascii_alphanumeric())
        && bytes.last().is_some_and(|b| b.is_ascii_alphanumeric())
}
