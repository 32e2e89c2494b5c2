//! Capability traits the reconciliation engine consumes but does not
//! implement. Concrete Kubernetes access goes through `kube::Client`
//! directly in most of this crate (that's the `ObjectStore` capability, and
//! `kube::Api` already plays that role faithfully enough that we don't
//! wrap it); the traits below exist for the collaborators the spec
//! explicitly calls out as external and opaque: manifest rendering and
//! GitOps source fetching. Keeping them as `async_trait` objects lets C4/C6
//! run against fakes in tests without a live cluster.

use std::collections::BTreeMap;

use async_trait::async_trait;
use kube::core::ObjectMeta;

use crate::api::v1::ObservabilityPlatform;
use crate::util::errors::Result;

/// Per-component-type configuration handed to a renderer: global defaults
/// merged with the component's own spec and any synthesized inter-component
/// endpoints (e.g. visualization's metrics/logs/traces URLs).
#[derive(Debug, Clone, Default)]
pub struct MergedConfig {
    pub values: BTreeMap<String, String>,
    pub endpoints: BTreeMap<String, String>,
    pub replicas: i32,
    pub version: String,
}

/// The capability that turns merged configuration into concrete
/// sub-resources for one component type. Production renderers (metrics,
/// visualization, logs, traces, collector) are out of scope for this crate;
/// only the trait and a test double (`testing::NoopRenderer`) live here.
#[async_trait]
pub trait ComponentRenderer: Send + Sync {
    async fn reconcile(&self, platform: &ObservabilityPlatform, config: &MergedConfig) -> Result<()>;

    async fn delete(&self, platform: &ObservabilityPlatform) -> Result<()>;

    /// Best-effort pre-deletion backup hook. Renderers that have nothing
    /// meaningful to snapshot beyond the Platform spec/status (the common
    /// case) can leave this as a no-op.
    async fn backup(&self, _platform: &ObservabilityPlatform) -> Result<()> {
        Ok(())
    }

    /// Field paths this renderer owns after the manifest leaves its hands
    /// (e.g. an autoscaler writing back `spec.replicas`), which drift
    /// detection must not flag as divergence.
    fn post_render_owned_fields(&self) -> &'static [&'static str] {
        &[]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Normal,
    Warning,
}

/// Publishes Kubernetes events against an object reference. Distinct from
/// the in-memory event ring kept by the status writer: this is the
/// capability that actually calls the apiserver's events API (or a fake, in
/// tests).
pub trait EventSink: Send + Sync {
    fn record(&self, object: &ObjectMeta, kind: EventKind, reason: &str, message: &str);
}

/// A tree of rendered files, keyed by path relative to the source root.
pub type FileTree = BTreeMap<String, Vec<u8>>;

/// Fetches desired state from an external GitOps-style source for drift
/// detection (C6). Gated the same way C6 itself is: behind the `drift`
/// feature.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, url: &str, revision: &str, credentials: Option<&str>) -> Result<FileTree>;

    async fn resolve_revision(&self, url: &str, branch: &str) -> Result<String>;
}
