//! Typed model of rendered chart documents
//!
//! `helm template` output is decoded once into [`Manifest`], a sum type with
//! one variant per kind the verifiers care about. Anything else is kept as
//! [`Manifest::Other`] with only its metadata. Decoding a known kind with the
//! wrong shape fails here, at the boundary, rather than deep inside a check.
//!
//! Service, Ingress, ServiceAccount and the pod security context come from
//! k8s-openapi. Pod templates, Secrets and ConfigMaps use the lighter serde
//! types below: the verifiers only need key names and text, Secret `data`
//! must not be base64-decoded, and empty `data:` renders as null.

use std::collections::{BTreeMap, BTreeSet};

use k8s_openapi::api::core::v1::{PodSecurityContext, Service, ServiceAccount};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::trace;

use crate::{yaml, Error, Result};

/// Treat an explicit YAML `null` the same as a missing field
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// =============================================================================
// Pod templates
// =============================================================================

/// Kinds that carry a pod template
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum WorkloadKind {
    /// apps/v1 Deployment
    Deployment,
    /// apps/v1 StatefulSet
    StatefulSet,
    /// batch/v1 Job
    Job,
}

impl WorkloadKind {
    /// Parse a `kind` string
    pub fn from_kind(kind: &str) -> Option<Self> {
        match kind {
            "Deployment" => Some(Self::Deployment),
            "StatefulSet" => Some(Self::StatefulSet),
            "Job" => Some(Self::Job),
            _ => None,
        }
    }

    /// The Kubernetes `kind` string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deployment => "Deployment",
            Self::StatefulSet => "StatefulSet",
            Self::Job => "Job",
        }
    }
}

impl std::fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pod template of a workload
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodTemplateSpec {
    /// Pod metadata (labels matched by Service selectors)
    #[serde(default)]
    pub metadata: ObjectMeta,
    /// Pod spec
    #[serde(default)]
    pub spec: PodSpec,
}

/// The subset of a pod spec the verifiers read
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodSpec {
    /// Main containers
    #[serde(default, deserialize_with = "null_as_default")]
    pub containers: Vec<Container>,
    /// Init containers
    #[serde(default, deserialize_with = "null_as_default")]
    pub init_containers: Vec<Container>,
    /// Pod volumes
    #[serde(default, deserialize_with = "null_as_default")]
    pub volumes: Vec<Volume>,
    /// ServiceAccount the pod runs as
    #[serde(default)]
    pub service_account_name: Option<String>,
    /// Whether the ServiceAccount token is mounted
    #[serde(default)]
    pub automount_service_account_token: Option<bool>,
    /// Pod-level security settings
    #[serde(default)]
    pub security_context: Option<PodSecurityContext>,
}

impl PodSpec {
    /// Main containers followed by init containers
    pub fn all_containers(&self) -> impl Iterator<Item = &Container> {
        self.containers.iter().chain(self.init_containers.iter())
    }

    /// Find a pod volume by name
    pub fn volume(&self, name: &str) -> Option<&Volume> {
        self.volumes.iter().find(|v| v.name == name)
    }

    /// Find an init container by name
    pub fn init_container(&self, name: &str) -> Option<&Container> {
        self.init_containers.iter().find(|c| c.name == name)
    }
}

/// Container spec
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    /// Container name
    pub name: String,
    /// Image
    #[serde(default)]
    pub image: Option<String>,
    /// Command
    #[serde(default, deserialize_with = "null_as_default")]
    pub command: Vec<String>,
    /// Args
    #[serde(default, deserialize_with = "null_as_default")]
    pub args: Vec<String>,
    /// Environment variables
    #[serde(default, deserialize_with = "null_as_default")]
    pub env: Vec<EnvVar>,
    /// Volume mounts
    #[serde(default, deserialize_with = "null_as_default")]
    pub volume_mounts: Vec<VolumeMount>,
    /// Exposed ports
    #[serde(default, deserialize_with = "null_as_default")]
    pub ports: Vec<ContainerPort>,
}

impl Container {
    /// Literal env values, command and args: the places a container can
    /// name a mounted file directly
    pub fn text_sources(&self) -> Vec<&str> {
        self.env
            .iter()
            .filter_map(|e| e.value.as_deref())
            .chain(self.command.iter().map(String::as_str))
            .chain(self.args.iter().map(String::as_str))
            .collect()
    }

    /// Whether any mount uses the named volume
    pub fn mounts_volume(&self, volume: &str) -> bool {
        self.volume_mounts.iter().any(|m| m.name == volume)
    }
}

/// Environment variable
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EnvVar {
    /// Variable name
    pub name: String,
    /// Literal value
    #[serde(default)]
    pub value: Option<String>,
    /// Reference-based value (secretKeyRef, fieldRef, ...)
    #[serde(default)]
    pub value_from: Option<Value>,
}

/// Volume mount
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VolumeMount {
    /// Name of the pod volume
    pub name: String,
    /// Path inside the container
    pub mount_path: String,
    /// Single key mounted as a file at `mount_path`
    #[serde(default)]
    pub sub_path: Option<String>,
    /// Read-only mount
    #[serde(default)]
    pub read_only: Option<bool>,
}

/// Container port
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContainerPort {
    /// Port name
    #[serde(default)]
    pub name: Option<String>,
    /// Port number
    pub container_port: i32,
    /// Protocol
    #[serde(default)]
    pub protocol: Option<String>,
}

/// Pod volume
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Volume {
    /// Volume name
    pub name: String,
    /// Secret source
    #[serde(default)]
    pub secret: Option<SecretVolumeSource>,
    /// ConfigMap source
    #[serde(default)]
    pub config_map: Option<ConfigMapVolumeSource>,
    /// emptyDir source (contents irrelevant)
    #[serde(default)]
    pub empty_dir: Option<Value>,
}

/// Secret volume source
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SecretVolumeSource {
    /// Referenced Secret
    pub secret_name: String,
}

/// ConfigMap volume source
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMapVolumeSource {
    /// Referenced ConfigMap
    pub name: String,
}

/// What backs a volume
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VolumeSource<'a> {
    /// A Secret by name
    Secret(&'a str),
    /// A ConfigMap by name
    ConfigMap(&'a str),
    /// An emptyDir
    EmptyDir,
    /// PVC, projected, hostPath, ...
    Other,
}

impl Volume {
    /// Classify the backing source
    pub fn source(&self) -> VolumeSource<'_> {
        if let Some(secret) = &self.secret {
            VolumeSource::Secret(&secret.secret_name)
        } else if let Some(cm) = &self.config_map {
            VolumeSource::ConfigMap(&cm.name)
        } else if self.empty_dir.is_some() {
            VolumeSource::EmptyDir
        } else {
            VolumeSource::Other
        }
    }
}

/// Deployment, StatefulSet or Job reduced to what the verifiers read
#[derive(Clone, Debug, PartialEq)]
pub struct Workload {
    /// Which controller kind this is
    pub kind: WorkloadKind,
    /// Controller metadata
    pub metadata: ObjectMeta,
    /// Pod template
    pub template: PodTemplateSpec,
    /// Governing Service (StatefulSet only)
    pub service_name: Option<String>,
}

#[derive(Deserialize)]
struct WorkloadDocument {
    metadata: ObjectMeta,
    spec: WorkloadSpec,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WorkloadSpec {
    template: PodTemplateSpec,
    #[serde(default)]
    service_name: Option<String>,
}

impl Workload {
    /// Pod spec shortcut
    pub fn pod(&self) -> &PodSpec {
        &self.template.spec
    }

    /// Pod template labels
    pub fn pod_labels(&self) -> &BTreeMap<String, String> {
        static EMPTY: BTreeMap<String, String> = BTreeMap::new();
        self.template.metadata.labels.as_ref().unwrap_or(&EMPTY)
    }
}

// =============================================================================
// ConfigMap, Secret, ServiceMonitor
// =============================================================================

/// Rendered ConfigMap
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMap {
    /// Metadata
    pub metadata: ObjectMeta,
    /// Text data
    #[serde(default, deserialize_with = "null_as_default")]
    pub data: BTreeMap<String, String>,
    /// Binary data (base64)
    #[serde(default, deserialize_with = "null_as_default")]
    pub binary_data: BTreeMap<String, String>,
}

impl ConfigMap {
    /// Every key a volume of this ConfigMap exposes
    pub fn keys(&self) -> BTreeSet<&str> {
        self.data
            .keys()
            .chain(self.binary_data.keys())
            .map(String::as_str)
            .collect()
    }
}

/// Rendered or externally provided Secret
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Secret {
    /// Metadata
    pub metadata: ObjectMeta,
    /// Secret type (Opaque, kubernetes.io/tls, ...)
    #[serde(default, rename = "type")]
    pub type_: Option<String>,
    /// Base64 data; values are never decoded
    #[serde(default, deserialize_with = "null_as_default")]
    pub data: BTreeMap<String, Value>,
    /// Plain-text data
    #[serde(default, deserialize_with = "null_as_default")]
    pub string_data: BTreeMap<String, Value>,
}

impl Secret {
    /// Every key a volume of this Secret exposes
    pub fn keys(&self) -> BTreeSet<&str> {
        self.data
            .keys()
            .chain(self.string_data.keys())
            .map(String::as_str)
            .collect()
    }
}

/// Prometheus-operator ServiceMonitor
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceMonitor {
    /// Metadata
    pub metadata: ObjectMeta,
    /// Spec
    #[serde(default)]
    pub spec: ServiceMonitorSpec,
}

/// ServiceMonitor spec
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceMonitorSpec {
    /// Selects Services by label
    #[serde(default)]
    pub selector: MatchLabels,
    /// Scrape endpoints (not interpreted)
    #[serde(default, deserialize_with = "null_as_default")]
    pub endpoints: Vec<Value>,
}

/// `matchLabels`-only label selector
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MatchLabels {
    /// Required label values
    #[serde(default, deserialize_with = "null_as_default")]
    pub match_labels: BTreeMap<String, String>,
}

// =============================================================================
// Manifest
// =============================================================================

/// One rendered Kubernetes document
#[derive(Clone, Debug, PartialEq)]
pub enum Manifest {
    /// Deployment, StatefulSet or Job
    Workload(Workload),
    /// core/v1 Service
    Service(Service),
    /// core/v1 Secret
    Secret(Secret),
    /// core/v1 ConfigMap
    ConfigMap(ConfigMap),
    /// networking/v1 Ingress
    Ingress(Ingress),
    /// monitoring.coreos.com/v1 ServiceMonitor
    ServiceMonitor(ServiceMonitor),
    /// core/v1 ServiceAccount
    ServiceAccount(ServiceAccount),
    /// Any kind the verifiers don't inspect
    Other {
        /// The document's kind
        kind: String,
        /// The document's metadata
        metadata: ObjectMeta,
    },
}

impl Manifest {
    /// Decode one document
    pub fn from_value(value: Value) -> Result<Self> {
        let kind = value
            .get("kind")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::manifest(describe(&value), "document has no kind"))?
            .to_string();
        let name = value
            .pointer("/metadata/name")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::manifest(&kind, "document has no metadata.name"))?;
        let id = format!("{kind}/{name}");
        trace!(manifest = %id, "decoding manifest");

        let decode = |e: serde_json::Error| Error::manifest(&id, e.to_string());

        let manifest = match kind.as_str() {
            "Service" => Manifest::Service(serde_json::from_value(value).map_err(decode)?),
            "Secret" => Manifest::Secret(serde_json::from_value(value).map_err(decode)?),
            "ConfigMap" => Manifest::ConfigMap(serde_json::from_value(value).map_err(decode)?),
            "Ingress" => Manifest::Ingress(serde_json::from_value(value).map_err(decode)?),
            "ServiceMonitor" => {
                Manifest::ServiceMonitor(serde_json::from_value(value).map_err(decode)?)
            }
            "ServiceAccount" => {
                Manifest::ServiceAccount(serde_json::from_value(value).map_err(decode)?)
            }
            other => match WorkloadKind::from_kind(other) {
                Some(workload_kind) => {
                    let doc: WorkloadDocument = serde_json::from_value(value).map_err(decode)?;
                    Manifest::Workload(Workload {
                        kind: workload_kind,
                        metadata: doc.metadata,
                        template: doc.spec.template,
                        service_name: doc.spec.service_name,
                    })
                }
                None => {
                    let metadata = value
                        .get("metadata")
                        .cloned()
                        .map(serde_json::from_value)
                        .transpose()
                        .map_err(decode)?
                        .unwrap_or_default();
                    Manifest::Other { kind, metadata }
                }
            },
        };
        Ok(manifest)
    }

    /// The document's `kind`
    pub fn kind(&self) -> &str {
        match self {
            Manifest::Workload(w) => w.kind.as_str(),
            Manifest::Service(_) => "Service",
            Manifest::Secret(_) => "Secret",
            Manifest::ConfigMap(_) => "ConfigMap",
            Manifest::Ingress(_) => "Ingress",
            Manifest::ServiceMonitor(_) => "ServiceMonitor",
            Manifest::ServiceAccount(_) => "ServiceAccount",
            Manifest::Other { kind, .. } => kind,
        }
    }

    /// The document's metadata
    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            Manifest::Workload(w) => &w.metadata,
            Manifest::Service(s) => &s.metadata,
            Manifest::Secret(s) => &s.metadata,
            Manifest::ConfigMap(c) => &c.metadata,
            Manifest::Ingress(i) => &i.metadata,
            Manifest::ServiceMonitor(s) => &s.metadata,
            Manifest::ServiceAccount(s) => &s.metadata,
            Manifest::Other { metadata, .. } => metadata,
        }
    }

    /// `metadata.name` (always present after decoding)
    pub fn name(&self) -> &str {
        self.metadata().name.as_deref().unwrap_or_default()
    }

    /// `Kind/name`, the identifier used in every diagnostic
    pub fn id(&self) -> String {
        format!("{}/{}", self.kind(), self.name())
    }

    /// A metadata label value
    pub fn label(&self, key: &str) -> Option<&str> {
        self.metadata()
            .labels
            .as_ref()
            .and_then(|l| l.get(key))
            .map(String::as_str)
    }

    /// A metadata annotation value
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.metadata()
            .annotations
            .as_ref()
            .and_then(|a| a.get(key))
            .map(String::as_str)
    }

    /// The workload, if this is one
    pub fn as_workload(&self) -> Option<&Workload> {
        match self {
            Manifest::Workload(w) => Some(w),
            _ => None,
        }
    }
}

fn describe(value: &Value) -> String {
    value
        .pointer("/metadata/name")
        .and_then(Value::as_str)
        .map(|n| format!("?/{n}"))
        .unwrap_or_else(|| crate::error::UNKNOWN_SUBJECT.to_string())
}

/// Decode a whole `helm template` stream
pub fn parse_manifests(input: &str) -> Result<Vec<Manifest>> {
    yaml::parse_documents(input)?
        .into_iter()
        .map(Manifest::from_value)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn synapse_statefulset() -> Value {
        json!({
            "apiVersion": "apps/v1",
            "kind": "StatefulSet",
            "metadata": {
                "name": "pytest-synapse-main",
                "labels": {"app.kubernetes.io/name": "synapse-main"}
            },
            "spec": {
                "serviceName": "pytest-synapse-main-headless",
                "template": {
                    "metadata": {"labels": {"app.kubernetes.io/instance": "pytest-synapse-main"}},
                    "spec": {
                        "serviceAccountName": "pytest-synapse",
                        "initContainers": [{
                            "name": "render-config",
                            "command": ["/matrix-tools", "render-config", "-output", "/conf/homeserver.yaml"],
                            "volumeMounts": [{"name": "rendered-config", "mountPath": "/conf"}]
                        }],
                        "containers": [{
                            "name": "synapse",
                            "command": ["python3", "-m", "synapse.app.homeserver", "-c", "/conf/homeserver.yaml"],
                            "env": [
                                {"name": "A", "value": "/secrets/a"},
                                {"name": "B", "valueFrom": {"fieldRef": {"fieldPath": "metadata.name"}}}
                            ],
                            "volumeMounts": [{"name": "rendered-config", "mountPath": "/conf", "readOnly": true}],
                            "ports": [{"name": "synapse-http", "containerPort": 8008}]
                        }],
                        "volumes": [
                            {"name": "rendered-config", "emptyDir": {"medium": "Memory"}},
                            {"name": "secrets", "secret": {"secretName": "pytest-synapse"}},
                            {"name": "config", "configMap": {"name": "pytest-synapse"}},
                            {"name": "media", "persistentVolumeClaim": {"claimName": "media"}}
                        ]
                    }
                }
            }
        })
    }

    /// Story: a StatefulSet decodes into a typed workload whose volumes can be
    /// classified without touching raw JSON
    #[test]
    fn story_statefulset_decodes_to_typed_workload() {
        let manifest = Manifest::from_value(synapse_statefulset()).unwrap();
        assert_eq!(manifest.kind(), "StatefulSet");
        assert_eq!(manifest.id(), "StatefulSet/pytest-synapse-main");
        assert_eq!(manifest.label("app.kubernetes.io/name"), Some("synapse-main"));

        let workload = manifest.as_workload().unwrap();
        assert_eq!(workload.kind, WorkloadKind::StatefulSet);
        assert_eq!(workload.service_name.as_deref(), Some("pytest-synapse-main-headless"));
        assert_eq!(workload.pod().all_containers().count(), 2);
        assert_eq!(
            workload.pod_labels().get("app.kubernetes.io/instance").map(String::as_str),
            Some("pytest-synapse-main")
        );

        let pod = workload.pod();
        assert_eq!(pod.volume("rendered-config").unwrap().source(), VolumeSource::EmptyDir);
        assert_eq!(pod.volume("secrets").unwrap().source(), VolumeSource::Secret("pytest-synapse"));
        assert_eq!(pod.volume("config").unwrap().source(), VolumeSource::ConfigMap("pytest-synapse"));
        assert_eq!(pod.volume("media").unwrap().source(), VolumeSource::Other);
        assert!(pod.init_container("render-config").is_some());
    }

    #[test]
    fn test_container_text_sources_skip_value_from() {
        let manifest = Manifest::from_value(synapse_statefulset()).unwrap();
        let container = &manifest.as_workload().unwrap().pod().containers[0];
        let sources = container.text_sources();
        assert_eq!(sources[0], "/secrets/a");
        assert!(sources.contains(&"/conf/homeserver.yaml"));
        assert_eq!(sources.len(), 1 + 5);
        assert!(container.mounts_volume("rendered-config"));
        assert!(!container.mounts_volume("secrets"));
    }

    /// Story: a Secret rendered with `data:` and nothing under it has no keys
    /// rather than failing to decode
    #[test]
    fn story_empty_secret_data_is_empty_not_error() {
        let manifest = parse_manifests(
            "apiVersion: v1\nkind: Secret\nmetadata:\n  name: pytest-empty\ntype: Opaque\ndata:\n",
        )
        .unwrap();
        match &manifest[0] {
            Manifest::Secret(secret) => {
                assert!(secret.keys().is_empty());
                assert_eq!(secret.type_.as_deref(), Some("Opaque"));
            }
            other => panic!("Expected Secret, got {}", other.kind()),
        }
    }

    #[test]
    fn test_secret_keys_union_data_and_string_data() {
        let manifest = Manifest::from_value(json!({
            "kind": "Secret",
            "metadata": {"name": "s"},
            "data": {"password": "cGFzc3dvcmQ="},
            "stringData": {"apiKey": "plain"}
        }))
        .unwrap();
        let Manifest::Secret(secret) = manifest else {
            panic!("Expected Secret")
        };
        assert_eq!(secret.keys().into_iter().collect::<Vec<_>>(), vec!["apiKey", "password"]);
    }

    #[test]
    fn test_configmap_keys_include_binary_data() {
        let manifest = Manifest::from_value(json!({
            "kind": "ConfigMap",
            "metadata": {"name": "cm"},
            "data": {"config.yaml": "a: b"},
            "binaryData": {"logo.png": "iVBORw0K"}
        }))
        .unwrap();
        let Manifest::ConfigMap(cm) = manifest else {
            panic!("Expected ConfigMap")
        };
        assert_eq!(cm.keys().len(), 2);
    }

    #[test]
    fn test_service_monitor_selector() {
        let manifest = Manifest::from_value(json!({
            "apiVersion": "monitoring.coreos.com/v1",
            "kind": "ServiceMonitor",
            "metadata": {"name": "pytest-synapse"},
            "spec": {
                "selector": {"matchLabels": {"app.kubernetes.io/part-of": "matrix-stack"}},
                "endpoints": [{"port": "synapse-http"}]
            }
        }))
        .unwrap();
        let Manifest::ServiceMonitor(sm) = manifest else {
            panic!("Expected ServiceMonitor")
        };
        assert_eq!(sm.spec.selector.match_labels.len(), 1);
        assert_eq!(sm.spec.endpoints.len(), 1);
    }

    #[test]
    fn test_service_and_ingress_use_k8s_openapi_types() {
        let service = Manifest::from_value(json!({
            "apiVersion": "v1",
            "kind": "Service",
            "metadata": {"name": "pytest-haproxy"},
            "spec": {"selector": {"app": "haproxy"}, "ports": [{"name": "http", "port": 8008}]}
        }))
        .unwrap();
        match service {
            Manifest::Service(s) => {
                let ports = s.spec.unwrap().ports.unwrap();
                assert_eq!(ports[0].name.as_deref(), Some("http"));
            }
            other => panic!("Expected Service, got {}", other.kind()),
        }

        let ingress = Manifest::from_value(json!({
            "apiVersion": "networking.k8s.io/v1",
            "kind": "Ingress",
            "metadata": {"name": "pytest-synapse"},
            "spec": {"rules": [{"host": "synapse.ess.localhost"}]}
        }))
        .unwrap();
        assert_eq!(ingress.kind(), "Ingress");
    }

    #[test]
    fn test_unknown_kinds_keep_metadata() {
        let manifest = Manifest::from_value(json!({
            "kind": "Role",
            "metadata": {"name": "pytest-synapse", "annotations": {"x": "y"}}
        }))
        .unwrap();
        assert_eq!(manifest.kind(), "Role");
        assert_eq!(manifest.annotation("x"), Some("y"));
        assert!(manifest.as_workload().is_none());
    }

    #[rstest]
    #[case::no_kind(json!({"metadata": {"name": "x"}}), "no kind")]
    #[case::no_name(json!({"kind": "Secret", "metadata": {}}), "no metadata.name")]
    #[case::deployment_without_template(
        json!({"kind": "Deployment", "metadata": {"name": "x"}, "spec": {}}),
        "template"
    )]
    fn test_malformed_documents_fail_at_the_boundary(#[case] value: Value, #[case] needle: &str) {
        let err = Manifest::from_value(value).unwrap_err();
        assert!(matches!(err, Error::Manifest { .. }));
        assert!(err.to_string().contains(needle), "{err}");
    }

    #[rstest]
    #[case("Deployment", Some(WorkloadKind::Deployment))]
    #[case("StatefulSet", Some(WorkloadKind::StatefulSet))]
    #[case("Job", Some(WorkloadKind::Job))]
    #[case("CronJob", None)]
    fn test_workload_kind_from_kind(#[case] kind: &str, #[case] expected: Option<WorkloadKind>) {
        assert_eq!(WorkloadKind::from_kind(kind), expected);
        if let Some(k) = expected {
            assert_eq!(k.to_string(), kind);
        }
    }
}
