use chrono::Utc;
use prometheus::{histogram_opts, opts, HistogramVec, IntCounter, IntCounterVec, IntGaugeVec, Registry};
use tokio::time::Instant;

use crate::util::errors::Error;

#[derive(Clone)]
pub struct Metrics {
    pub reconciliations: IntCounter,
    pub reconcile_errors: IntCounterVec,
    pub reconcile_duration: HistogramVec,
    pub platforms_by_phase: IntGaugeVec,
    pub component_health: IntGaugeVec,
    pub component_ready_replicas: IntGaugeVec,
    pub component_desired_replicas: IntGaugeVec,
    pub health_check_duration: HistogramVec,
    pub health_check_errors: IntCounterVec,
    pub component_last_health_check: IntGaugeVec,
}

impl Default for Metrics {
    fn default() -> Self {
        let reconcile_duration = HistogramVec::new(
            histogram_opts!(
                "observability_platform_reconcile_duration_seconds",
                "Duration of a reconcile pass, in seconds",
            )
            .buckets(vec![0.01, 0.1, 0.25, 0.5, 1., 5., 15., 60.]),
            &["platform", "namespace"],
        )
        .unwrap();

        let reconcile_errors = IntCounterVec::new(
            opts!(
                "observability_platform_reconcile_errors_total",
                "Reconcile errors by taxonomy reason",
            ),
            &["platform", "namespace", "reason"],
        )
        .unwrap();

        let reconciliations = IntCounter::new(
            "observability_platform_reconciliations_total",
            "Total reconcile passes started",
        )
        .unwrap();

        let platforms_by_phase = IntGaugeVec::new(
            opts!("observability_platform_platforms_total", "Platforms observed, by phase"),
            &["phase"],
        )
        .unwrap();

        let component_health = IntGaugeVec::new(
            opts!(
                "observability_platform_component_health",
                "1 if a component is healthy (workload-ready AND application-healthy), else 0",
            ),
            &["platform", "namespace", "component"],
        )
        .unwrap();

        let component_ready_replicas = IntGaugeVec::new(
            opts!("observability_platform_component_ready_replicas", "Ready replicas observed for a component"),
            &["platform", "namespace", "component"],
        )
        .unwrap();

        let component_desired_replicas = IntGaugeVec::new(
            opts!("observability_platform_component_desired_replicas", "Desired replicas for a component"),
            &["platform", "namespace", "component"],
        )
        .unwrap();

        let health_check_duration = HistogramVec::new(
            histogram_opts!(
                "observability_platform_health_check_duration_seconds",
                "Duration of an application-level health probe",
            )
            .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.5, 1., 5., 10.]),
            &["platform", "namespace", "component"],
        )
        .unwrap();

        let health_check_errors = IntCounterVec::new(
            opts!("observability_platform_health_check_errors_total", "Failed application-level health probes"),
            &["platform", "namespace", "component"],
        )
        .unwrap();

        let component_last_health_check = IntGaugeVec::new(
            opts!(
                "observability_platform_component_last_health_check_timestamp",
                "Unix timestamp of the last health check for a component",
            ),
            &["platform", "namespace", "component"],
        )
        .unwrap();

        Metrics {
            reconciliations,
            reconcile_errors,
            reconcile_duration,
            platforms_by_phase,
            component_health,
            component_ready_replicas,
            component_desired_replicas,
            health_check_duration,
            health_check_errors,
            component_last_health_check,
        }
    }
}

impl Metrics {
    /// Register every metric with the process registry. Call once at startup.
    pub fn register(self, registry: &Registry) -> Result<Self, prometheus::Error> {
        registry.register(Box::new(self.reconciliations.clone()))?;
        registry.register(Box::new(self.reconcile_errors.clone()))?;
        registry.register(Box::new(self.reconcile_duration.clone()))?;
        registry.register(Box::new(self.platforms_by_phase.clone()))?;
        registry.register(Box::new(self.component_health.clone()))?;
        registry.register(Box::new(self.component_ready_replicas.clone()))?;
        registry.register(Box::new(self.component_desired_replicas.clone()))?;
        registry.register(Box::new(self.health_check_duration.clone()))?;
        registry.register(Box::new(self.health_check_errors.clone()))?;
        registry.register(Box::new(self.component_last_health_check.clone()))?;
        Ok(self)
    }

    pub fn reconcile_failure(&self, platform: &str, namespace: &str, e: &Error) {
        self.reconcile_errors
            .with_label_values(&[platform, namespace, e.metric_label().as_ref()])
            .inc();
    }

    pub fn count_and_measure(&self, platform: &str, namespace: &str) -> ReconcileMeasurer {
        self.reconciliations.inc();
        ReconcileMeasurer {
            start: Instant::now(),
            metric: self.reconcile_duration.clone(),
            platform: platform.to_string(),
            namespace: namespace.to_string(),
        }
    }

    /// A Platform's phase gauge is incremented on entry to a phase and
    /// decremented on the way out, so `platforms_by_phase` always reflects
    /// the current count per phase rather than a running total.
    pub fn record_phase_transition(&self, old_phase: Option<&str>, new_phase: Option<&str>) {
        if let Some(old) = old_phase {
            self.platforms_by_phase.with_label_values(&[old]).dec();
        }
        if let Some(new) = new_phase {
            self.platforms_by_phase.with_label_values(&[new]).inc();
        }
    }

    pub fn set_component_replicas(&self, platform: &str, namespace: &str, component: &str, ready: i64, desired: i64) {
        self.component_ready_replicas.with_label_values(&[platform, namespace, component]).set(ready);
        self.component_desired_replicas.with_label_values(&[platform, namespace, component]).set(desired);
    }

    pub fn record_health_check(&self, platform: &str, namespace: &str, component: &str, duration_secs: f64, healthy: bool) {
        self.health_check_duration
            .with_label_values(&[platform, namespace, component])
            .observe(duration_secs);
        if !healthy {
            self.health_check_errors.with_label_values(&[platform, namespace, component]).inc();
        }
        self.component_last_health_check
            .with_label_values(&[platform, namespace, component])
            .set(Utc::now().timestamp());
    }
}

/// Records reconcile duration into the histogram when dropped, regardless of
/// which exit path the reconcile took.
pub struct ReconcileMeasurer {
    start: Instant,
    metric: HistogramVec,
    platform: String,
    namespace: String,
}

impl Drop for ReconcileMeasurer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_millis() as f64 / 1000.0;
        self.metric
            .with_label_values(&[self.platform.as_str(), self.namespace.as_str()])
            .observe(duration);
    }
}
