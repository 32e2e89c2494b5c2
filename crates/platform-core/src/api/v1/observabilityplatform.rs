use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::conditions_schema;

pub static FINALIZER_BACKUP: &str = "observability-platform.observability.io/backup";
pub static FINALIZER_COMPONENTS: &str = "observability-platform.observability.io/components";
pub static FINALIZER_EXTERNAL_RESOURCES: &str = "observability-platform.observability.io/external-resources";
pub static FINALIZER_ROOT: &str = "observability-platform.observability.io/root";

/// The five component kinds this operator knows how to order and render, in
/// the fixed declaration order used wherever a deterministic listing is
/// needed (e.g. reverse-order teardown).
pub const COMPONENT_NAMES: &[&str] = &["metrics", "logs", "traces", "visualization", "collector"];

/// Generate the Kubernetes wrapper struct `ObservabilityPlatform` from our
/// Spec and Status types. This is cluster-scoped (no `namespaced` attribute):
/// the platform spans whichever namespace `spec.target_namespace` names.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[cfg_attr(test, derive(Default))]
#[kube(
    kind = "ObservabilityPlatform",
    group = "observability.io",
    version = "v1",
    shortname = "obsplatform"
)]
#[kube(status = "ObservabilityPlatformStatus")]
pub struct ObservabilityPlatformSpec {
    #[serde(default)]
    pub components: ComponentsSpec,

    #[serde(default)]
    pub high_availability: bool,

    /// Namespace components are rendered into. Defaults to the platform's own name.
    pub target_namespace: Option<String>,

    #[serde(default)]
    pub pause_requested: bool,

    pub backup: Option<BackupSpec>,

    pub security: Option<SecuritySpec>,

    #[cfg(feature = "drift")]
    pub drift_detection: Option<DriftDetectionSpec>,
}

impl ObservabilityPlatformSpec {
    pub fn target_namespace_or(&self, platform_name: &str) -> String {
        self.target_namespace.clone().unwrap_or_else(|| platform_name.to_string())
    }

    /// Enabled component names in the fixed declaration order.
    pub fn enabled_components(&self) -> Vec<String> {
        COMPONENT_NAMES
            .iter()
            .filter(|name| self.components.get(name).is_some_and(|c| c.enabled))
            .map(|s| s.to_string())
            .collect()
    }
}

#[derive(Default, Deserialize, Serialize, Clone, Debug, JsonSchema)]
pub struct ComponentsSpec {
    pub metrics: Option<ComponentSpec>,
    pub visualization: Option<ComponentSpec>,
    pub logs: Option<ComponentSpec>,
    pub traces: Option<ComponentSpec>,
    pub collector: Option<ComponentSpec>,
}

impl ComponentsSpec {
    pub fn get(&self, name: &str) -> Option<&ComponentSpec> {
        match name {
            "metrics" => self.metrics.as_ref(),
            "visualization" => self.visualization.as_ref(),
            "logs" => self.logs.as_ref(),
            "traces" => self.traces.as_ref(),
            "collector" => self.collector.as_ref(),
            _ => None,
        }
    }
}

fn default_replicas() -> i32 {
    1
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema)]
pub struct ComponentSpec {
    #[serde(default)]
    pub enabled: bool,

    /// Semantic version string, validated against the compatibility matrix
    /// before this component is ever handed to its renderer.
    pub version: String,

    #[serde(default = "default_replicas")]
    pub replicas: i32,

    pub resources: Option<ResourceRequirements>,

    pub storage: Option<StorageConfig>,

    #[serde(default)]
    pub config: BTreeMap<String, String>,

    /// Only meaningful for `visualization`: names of other components it
    /// reads from and therefore requires to be enabled.
    #[serde(default)]
    pub data_sources: Vec<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema)]
pub struct ResourceRequirements {
    pub requests_cpu: Option<String>,
    pub requests_memory: Option<String>,
    pub limits_cpu: Option<String>,
    pub limits_memory: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema)]
pub struct StorageConfig {
    pub storage_class: Option<String>,
    #[serde(default = "default_storage_size")]
    pub size: String,
}

fn default_storage_size() -> String {
    "10Gi".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            storage_class: None,
            size: default_storage_size(),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema)]
pub struct BackupSpec {
    #[serde(default)]
    pub enabled: bool,
    pub schedule: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema)]
pub struct SecuritySpec {
    #[serde(default)]
    pub network_policy_enabled: bool,
}

#[cfg(feature = "drift")]
#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema)]
pub struct DriftDetectionSpec {
    #[serde(default)]
    pub enabled: bool,
    pub source_url: String,
    pub revision: String,
    #[serde(default)]
    pub auto_remediate: bool,
    #[serde(default = "default_check_interval")]
    pub check_interval_seconds: u64,
    #[serde(default = "default_rollback_window")]
    pub rollback_window_seconds: u64,
    pub promotion: Option<PromotionSpec>,
}

#[cfg(feature = "drift")]
fn default_check_interval() -> u64 {
    300
}

#[cfg(feature = "drift")]
fn default_rollback_window() -> u64 {
    600
}

#[cfg(feature = "drift")]
#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema)]
pub struct PromotionSpec {
    pub environments: Vec<String>,
    #[serde(default = "default_promotion_window")]
    pub promotion_window_seconds: u64,
}

#[cfg(feature = "drift")]
fn default_promotion_window() -> u64 {
    1800
}

/// Status-subresource, operator-owned only. Never read by the reconciler to
/// make spec decisions (observedGeneration excepted).
#[derive(Deserialize, Serialize, Clone, Default, Debug, JsonSchema)]
pub struct ObservabilityPlatformStatus {
    pub phase: Option<String>,

    pub observed_generation: Option<i64>,

    #[schemars(schema_with = "conditions_schema")]
    #[serde(default)]
    pub conditions: Vec<Condition>,

    #[serde(default)]
    pub component_status: BTreeMap<String, ComponentStatusEntry>,

    pub progress: Option<ProgressStatus>,

    #[serde(default)]
    pub operation_history: Vec<OperationOutcome>,

    pub last_reconcile_time: Option<String>,
}

impl ObservabilityPlatformStatus {
    pub const MAX_OPERATION_HISTORY: usize = 10;

    /// Push an outcome onto the bounded ring, dropping the oldest entry once
    /// full. Entries are kept newest-last so `operation_history.last()` is
    /// the most recent operation.
    pub fn push_operation(&mut self, outcome: OperationOutcome) {
        self.operation_history.push(outcome);
        while self.operation_history.len() > Self::MAX_OPERATION_HISTORY {
            self.operation_history.remove(0);
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Default, Debug, JsonSchema)]
pub struct ComponentStatusEntry {
    pub ready: bool,
    pub desired_replicas: i32,
    pub ready_replicas: i32,
    pub version: String,
    pub message: String,
    pub last_checked: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Default, Debug, JsonSchema)]
pub struct ProgressStatus {
    pub operation: String,
    pub current: u32,
    pub total: u32,
    pub percentage: u8,
    pub message: String,
    pub last_updated: String,
}

#[derive(Deserialize, Serialize, Clone, Default, Debug, JsonSchema)]
pub struct OperationOutcome {
    pub operation: String,
    pub success: bool,
    pub duration_seconds: f64,
    pub message: String,
    pub finished_at: String,
}
