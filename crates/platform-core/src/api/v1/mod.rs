pub mod observabilityplatform;

pub use observabilityplatform::{
    BackupSpec, ComponentSpec, ComponentStatusEntry, ComponentsSpec,
    ObservabilityPlatform, ObservabilityPlatformSpec, ObservabilityPlatformStatus, OperationOutcome,
    ProgressStatus, ResourceRequirements, SecuritySpec, StorageConfig,
    FINALIZER_BACKUP, FINALIZER_COMPONENTS, FINALIZER_EXTERNAL_RESOURCES, FINALIZER_ROOT, COMPONENT_NAMES,
};
#[cfg(feature = "drift")]
pub use observabilityplatform::{DriftDetectionSpec, PromotionSpec};

/// Tells kube's schema generator to emit the well-known Kubernetes
/// list-map-by-`type` shape for a `Vec<Condition>` field, matching what
/// `kubectl` and `kstatus`-aware tooling expect.
pub fn conditions_schema(_: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
    serde_json::from_value(serde_json::json!({
        "type": "array",
        "x-kubernetes-list-type": "map",
        "x-kubernetes-list-map-keys": ["type"],
        "items": {
            "type": "object",
            "properties": {
                "lastTransitionTime": { "format": "date-time", "type": "string" },
                "message": { "type": "string" },
                "observedGeneration": { "type": "integer", "format": "int64", "default": 0 },
                "reason": { "type": "string" },
                "status": { "type": "string" },
                "type": { "type": "string" }
            },
            "required": [
                "lastTransitionTime",
                "message",
                "reason",
                "status",
                "type"
            ],
        },
    }))
    .unwrap()
}
