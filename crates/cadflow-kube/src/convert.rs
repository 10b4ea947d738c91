use std::collections::BTreeMap;

use k8s_openapi::{
    api::core::v1::{
        Affinity as K8sAffinity, Container, ContainerPort as K8sContainerPort, EnvVar, Pod,
        PodAffinityTerm, PodAntiAffinity as K8sPodAntiAffinity, PodSpec, Toleration as K8sToleration,
        WeightedPodAffinityTerm,
    },
    apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta},
};

use cadflow_model::workload::{
    Affinity, AffinityTerm, ContainerPort, ContainerSpec, Protocol, Toleration, WorkloadSpec,
};

/// Kubernetes `Pod` equivalent of a validated workload spec.
///
/// Empty maps and lists are left unset rather than sent as empty values.
pub fn to_pod(spec: &WorkloadSpec) -> Pod {
    let meta = &spec.metadata;
    let pod = &spec.spec;

    Pod {
        metadata: ObjectMeta {
            name: Some(meta.name.clone()),
            namespace: Some(meta.namespace.clone()),
            labels: non_empty_map(&meta.labels),
            annotations: non_empty_map(&meta.annotations),
            ..Default::default()
        },
        spec: Some(PodSpec {
            containers: pod.containers.iter().map(container).collect(),
            restart_policy: Some(pod.restart_policy.as_str().to_string()),
            node_selector: non_empty_map(&pod.node_selector),
            node_name: pod.node_name.clone(),
            tolerations: non_empty(pod.tolerations.iter().map(toleration).collect()),
            affinity: pod.affinity.as_ref().map(affinity),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn container(c: &ContainerSpec) -> Container {
    Container {
        name: c.name.clone(),
        image: Some(c.image.clone()),
        image_pull_policy: Some(c.image_pull_policy.as_str().to_string()),
        ports: non_empty(c.ports.iter().map(port).collect()),
        env: non_empty(
            c.env
                .iter()
                .map(|kv| EnvVar {
                    name: kv.key().to_string(),
                    value: Some(kv.value().to_string()),
                    ..Default::default()
                })
                .collect(),
        ),
        command: non_empty(c.command.clone()),
        args: non_empty(c.args.clone()),
        ..Default::default()
    }
}

fn port(p: &ContainerPort) -> K8sContainerPort {
    let protocol = match p.protocol {
        Protocol::Tcp => "TCP",
        Protocol::Udp => "UDP",
    };
    K8sContainerPort {
        container_port: i32::from(p.container_port),
        protocol: Some(protocol.to_string()),
        ..Default::default()
    }
}

fn toleration(t: &Toleration) -> K8sToleration {
    K8sToleration {
        key: t.key.clone(),
        operator: t.operator.clone(),
        value: t.value.clone(),
        effect: t.effect.clone(),
        ..Default::default()
    }
}

fn affinity(a: &Affinity) -> K8sAffinity {
    let anti = &a.pod_anti_affinity;
    K8sAffinity {
        pod_anti_affinity: Some(K8sPodAntiAffinity {
            required_during_scheduling_ignored_during_execution: non_empty(
                anti.required.iter().map(term).collect(),
            ),
            preferred_during_scheduling_ignored_during_execution: non_empty(
                anti.preferred
                    .iter()
                    .map(|w| WeightedPodAffinityTerm {
                        weight: w.weight,
                        pod_affinity_term: term(&w.term),
                    })
                    .collect(),
            ),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn term(t: &AffinityTerm) -> PodAffinityTerm {
    PodAffinityTerm {
        label_selector: Some(LabelSelector {
            match_labels: non_empty_map(&t.match_labels),
            ..Default::default()
        }),
        topology_key: t.topology_key.clone(),
        ..Default::default()
    }
}

fn non_empty<T>(items: Vec<T>) -> Option<Vec<T>> {
    (!items.is_empty()).then_some(items)
}

fn non_empty_map(map: &BTreeMap<String, String>) -> Option<BTreeMap<String, String>> {
    (!map.is_empty()).then(|| map.clone())
}

#[cfg(test)]
mod tests {
    use cadflow_model::workload::{ContainerDef, PullPolicy, RestartPolicy};

    use super::*;

    fn worker_spec() -> WorkloadSpec {
        WorkloadSpec::builder()
            .name("cad-worker-b-1")
            .namespace("cad")
            .label("app", "cadflow")
            .label("cadflow.io/role", "worker")
            .annotation("cadflow.io/batch-id", "B-1")
            .restart_policy(RestartPolicy::Never)
            .node_selector("pool", "cad")
            .toleration(Toleration::new().with_key("gpu").with_operator("Exists"))
            .anti_affinity_rule([("cadflow.io/role", "worker")], "kubernetes.io/hostname")
            .container(
                ContainerDef::new("worker", "cadflow/worker:1.0")
                    .pull_policy(PullPolicy::Always)
                    .port(ContainerPort::tcp(8080))
                    .env("CADFLOW_BATCH_ID", "B-1")
                    .command("cadflow-worker", ["--batch-id", "B-1"]),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn metadata_and_spec_fields_are_carried() {
        let pod = to_pod(&worker_spec());

        assert_eq!(pod.metadata.name.as_deref(), Some("cad-worker-b-1"));
        assert_eq!(pod.metadata.namespace.as_deref(), Some("cad"));
        assert_eq!(pod.metadata.labels.as_ref().unwrap()["cadflow.io/role"], "worker");

        let spec = pod.spec.unwrap();
        assert_eq!(spec.restart_policy.as_deref(), Some("Never"));
        assert_eq!(spec.node_selector.unwrap()["pool"], "cad");
        assert_eq!(spec.tolerations.unwrap()[0].key.as_deref(), Some("gpu"));

        let c = &spec.containers[0];
        assert_eq!(c.image.as_deref(), Some("cadflow/worker:1.0"));
        assert_eq!(c.image_pull_policy.as_deref(), Some("Always"));
        assert_eq!(c.command.as_deref(), Some(&["cadflow-worker".to_string()][..]));
        assert_eq!(c.ports.as_ref().unwrap()[0].container_port, 8080);
        assert_eq!(c.env.as_ref().unwrap()[0].value.as_deref(), Some("B-1"));
    }

    #[test]
    fn anti_affinity_serializes_in_kubernetes_shape() {
        let pod = to_pod(&worker_spec());
        let json = serde_json::to_value(&pod).unwrap();

        let anti = &json["spec"]["affinity"]["podAntiAffinity"];
        let required = &anti["requiredDuringSchedulingIgnoredDuringExecution"][0];
        assert_eq!(required["topologyKey"], "kubernetes.io/hostname");
        assert_eq!(required["labelSelector"]["matchLabels"]["cadflow.io/role"], "worker");
        assert!(anti.get("preferredDuringSchedulingIgnoredDuringExecution").is_none());
    }

    #[test]
    fn empty_collections_stay_unset() {
        let spec = WorkloadSpec::builder()
            .name("cad-reader-b-1")
            .namespace("cad")
            .container(ContainerDef::new("reader", "cadflow/reader:1.0"))
            .build()
            .unwrap();

        let pod = to_pod(&spec);
        assert!(pod.metadata.labels.is_none());
        let spec = pod.spec.unwrap();
        assert!(spec.affinity.is_none());
        assert!(spec.tolerations.is_none());
        assert!(spec.containers[0].env.is_none());
        assert!(spec.containers[0].args.is_none());
    }
}
