//! Fakes for the capability traits in `capabilities`. `NoopRenderer` also
//! doubles as the operator binary's actual renderer registration, since
//! production manifest rendering is an opaque capability this crate never
//! implements (only consumes) — see `capabilities` module docs.

#[cfg(feature = "drift")]
use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use kube::core::ObjectMeta;

use crate::api::v1::ObservabilityPlatform;
#[cfg(test)]
use crate::api::v1::ObservabilityPlatformSpec;
use crate::capabilities::{ComponentRenderer, EventKind, EventSink, MergedConfig};
#[cfg(feature = "drift")]
use crate::capabilities::{FileTree, SourceFetcher};
use crate::util::errors::Result;

/// A `ComponentRenderer` that accepts any config and renders nothing.
/// Reconcile/delete both succeed unconditionally; useful both as the
/// operator's real renderer until production ones exist, and as a test
/// double that lets C3/C4 be exercised without a live cluster.
#[derive(Debug, Default)]
pub struct NoopRenderer;

#[async_trait]
impl ComponentRenderer for NoopRenderer {
    async fn reconcile(&self, _platform: &ObservabilityPlatform, _config: &MergedConfig) -> Result<()> {
        Ok(())
    }

    async fn delete(&self, _platform: &ObservabilityPlatform) -> Result<()> {
        Ok(())
    }
}

/// A `ComponentRenderer` that always fails, for exercising C4's
/// abort-on-first-failure behavior in tests.
#[derive(Debug, Default)]
pub struct FailingRenderer;

#[async_trait]
impl ComponentRenderer for FailingRenderer {
    async fn reconcile(&self, _platform: &ObservabilityPlatform, _config: &MergedConfig) -> Result<()> {
        Err(crate::util::errors::Error::StdError(crate::util::errors::StdError::Fatal(
            "FailingRenderer always fails".to_string(),
        )))
    }

    async fn delete(&self, _platform: &ObservabilityPlatform) -> Result<()> {
        Err(crate::util::errors::Error::StdError(crate::util::errors::StdError::Fatal(
            "FailingRenderer always fails".to_string(),
        )))
    }
}

#[derive(Debug, Clone)]
pub struct RecordedEvent {
    pub object_name: Option<String>,
    pub kind: EventKind,
    pub reason: String,
    pub message: String,
}

/// In-memory `EventSink` that just remembers everything it was asked to
/// record, so tests can assert on it.
#[derive(Default)]
pub struct FakeEventSink {
    events: Mutex<Vec<RecordedEvent>>,
}

impl FakeEventSink {
    pub fn recorded(&self) -> Vec<RecordedEvent> {
        self.events.lock().expect("fake event sink mutex poisoned").clone()
    }
}

impl EventSink for FakeEventSink {
    fn record(&self, object: &ObjectMeta, kind: EventKind, reason: &str, message: &str) {
        self.events.lock().expect("fake event sink mutex poisoned").push(RecordedEvent {
            object_name: object.name.clone(),
            kind,
            reason: reason.to_string(),
            message: message.to_string(),
        });
    }
}

/// In-memory `SourceFetcher` backed by a fixed map of revision -> file tree,
/// for exercising C6 without shelling out to `git`.
#[cfg(feature = "drift")]
#[derive(Default)]
pub struct FakeSourceFetcher {
    pub revisions: BTreeMap<String, FileTree>,
}

#[cfg(feature = "drift")]
#[async_trait]
impl SourceFetcher for FakeSourceFetcher {
    async fn fetch(&self, _url: &str, revision: &str, _credentials: Option<&str>) -> Result<FileTree> {
        self.revisions
            .get(revision)
            .cloned()
            .ok_or_else(|| crate::util::errors::Error::StdError(crate::util::errors::StdError::NotFound(format!("no fixture for revision {revision}"))))
    }

    async fn resolve_revision(&self, _url: &str, branch: &str) -> Result<String> {
        Ok(branch.to_string())
    }
}

/// Builds a minimal `ObservabilityPlatform` with a default spec and no
/// status, for tests that only need a named object to pass around. The
/// underlying `ObservabilityPlatformSpec: Default` impl only exists under
/// `#[cfg(test)]`, so this helper is test-only too.
#[cfg(test)]
pub fn test_platform(name: &str) -> ObservabilityPlatform {
    ObservabilityPlatform::new(name, ObservabilityPlatformSpec::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_renderer_always_succeeds() {
        let renderer = NoopRenderer;
        let platform = test_platform("demo");
        let config = MergedConfig::default();
        assert!(renderer.reconcile(&platform, &config).await.is_ok());
        assert!(renderer.delete(&platform).await.is_ok());
    }

    #[test]
    fn fake_event_sink_records_events() {
        let sink = FakeEventSink::default();
        sink.record(&ObjectMeta::default(), EventKind::Normal, "Test", "message");
        assert_eq!(sink.recorded().len(), 1);
    }
}
