use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use kube::client::Client;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::capabilities::{ComponentRenderer, EventSink};
use crate::util::metrics::Metrics;

pub const EVENT_RING_CAPACITY: usize = 1000;
pub const DRIFT_REPORT_RING_CAPACITY: usize = 20;

#[derive(Debug, Clone)]
pub struct PlatformEvent {
    pub platform: String,
    pub kind: &'static str,
    pub reason: String,
    pub message: String,
    pub component: Option<String>,
    pub duration_seconds: Option<f64>,
}

/// Workload-level + application-level health observed for one component on
/// the last pipeline pass. Cached so the health-server's `/healthz` and any
/// out-of-band readers don't have to re-probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentHealth {
    pub workload_ready: bool,
    pub application_healthy: bool,
}

impl ComponentHealth {
    pub fn healthy(&self) -> bool {
        self.workload_ready && self.application_healthy
    }
}

/// The two pieces of explicitly-synchronized process-wide state (per the
/// design notes: "the only process-wide state is the health-check cache,
/// the event ring, and metric gauges"). Each field is behind its own lock so
/// a reader of one never blocks a writer of the other.
#[derive(Default)]
pub struct Diagnostics {
    pub last_reconcile: Option<Instant>,
}

#[derive(Clone, Default)]
pub struct State {
    diagnostics: Arc<RwLock<Diagnostics>>,
    event_ring: Arc<RwLock<VecDeque<PlatformEvent>>>,
    component_health: Arc<RwLock<BTreeMap<(String, String), ComponentHealth>>>,
    registry: prometheus::Registry,
    ready: Arc<std::sync::atomic::AtomicBool>,
    #[cfg(feature = "drift")]
    drift_reports: Arc<RwLock<BTreeMap<String, VecDeque<crate::controllers::drift::DriftReport>>>>,
    #[cfg(feature = "drift")]
    spec_history: Arc<RwLock<BTreeMap<String, VecDeque<crate::api::v1::ObservabilityPlatformSpec>>>>,
}

impl State {
    pub fn metrics_families(&self) -> Vec<prometheus::proto::MetricFamily> {
        self.registry.gather()
    }

    pub async fn record_reconcile(&self) {
        self.diagnostics.write().await.last_reconcile = Some(Instant::now());
    }

    pub async fn last_reconcile_age(&self) -> Option<tokio::time::Duration> {
        self.diagnostics.read().await.last_reconcile.map(|t| t.elapsed())
    }

    pub async fn push_event(&self, event: PlatformEvent) {
        let mut ring = self.event_ring.write().await;
        ring.push_back(event);
        while ring.len() > EVENT_RING_CAPACITY {
            ring.pop_front();
        }
    }

    pub async fn recent_events(&self) -> Vec<PlatformEvent> {
        self.event_ring.read().await.iter().cloned().collect()
    }

    pub async fn set_component_health(&self, platform: &str, component: &str, health: ComponentHealth) {
        self.component_health
            .write()
            .await
            .insert((platform.to_string(), component.to_string()), health);
    }

    pub async fn component_health(&self, platform: &str, component: &str) -> Option<ComponentHealth> {
        self.component_health.read().await.get(&(platform.to_string(), component.to_string())).copied()
    }

    #[cfg(feature = "drift")]
    pub async fn push_drift_report(&self, report: crate::controllers::drift::DriftReport) {
        // Keyed loosely: reports aren't currently tagged per-platform at the
        // call site, so they land in a single shared ring under "_all".
        let mut rings = self.drift_reports.write().await;
        let ring = rings.entry("_all".to_string()).or_default();
        ring.push_back(report);
        while ring.len() > DRIFT_REPORT_RING_CAPACITY {
            ring.pop_front();
        }
    }

    #[cfg(feature = "drift")]
    pub async fn recent_drift_reports(&self) -> Vec<crate::controllers::drift::DriftReport> {
        self.drift_reports
            .read()
            .await
            .get("_all")
            .map(|ring| ring.iter().cloned().collect())
            .unwrap_or_default()
    }

    #[cfg(feature = "drift")]
    pub async fn record_known_good_spec(&self, platform: &str, spec: crate::api::v1::ObservabilityPlatformSpec) {
        let mut history = self.spec_history.write().await;
        let ring = history.entry(platform.to_string()).or_default();
        ring.push_back(spec);
        while ring.len() > 5 {
            ring.pop_front();
        }
    }

    #[cfg(feature = "drift")]
    pub async fn last_known_good_spec(&self, platform: &str) -> Option<crate::api::v1::ObservabilityPlatformSpec> {
        self.spec_history.read().await.get(platform).and_then(|ring| ring.back()).cloned()
    }

    pub fn mark_ready(&self) {
        self.ready.store(true, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(std::sync::atomic::Ordering::SeqCst)
    }

    pub fn to_context(
        &self,
        client: Client,
        renderers: BTreeMap<String, Arc<dyn ComponentRenderer>>,
        event_sink: Arc<dyn EventSink>,
    ) -> Arc<Context> {
        Arc::new(Context {
            client,
            metrics: Metrics::default().register(&self.registry).expect("metrics registration"),
            state: self.clone(),
            renderers,
            event_sink,
        })
    }
}

/// Context passed into every reconcile. `renderers` is the fixed mapping
/// from component name to its `ComponentRenderer`, injected once at startup
/// (the "dynamic-dispatch renderers" design note).
#[derive(Clone)]
pub struct Context {
    pub client: Client,
    pub metrics: Metrics,
    pub state: State,
    pub renderers: BTreeMap<String, Arc<dyn ComponentRenderer>>,
    pub event_sink: Arc<dyn EventSink>,
}
