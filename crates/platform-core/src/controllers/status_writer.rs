//! C2: serialized, conflict-retrying publication of status updates. Callers
//! never touch the apiserver directly; they hand a mutate-closure to
//! `StatusWriter::enqueue` (or one of its sugar methods) and a single
//! background worker applies it under optimistic concurrency.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, ResourceExt};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::api::v1::{ComponentStatusEntry, ObservabilityPlatform, ObservabilityPlatformStatus, OperationOutcome, ProgressStatus};
use crate::capabilities::{EventKind, EventSink};
use crate::controllers::context::{PlatformEvent, State};
use crate::util::conditions;
use crate::util::errors::{Error, Result, StdError};
use crate::util::metrics::Metrics;

pub const QUEUE_CAPACITY: usize = 100;
pub const MAX_CONFLICT_RETRIES: u32 = 3;
pub const FIELD_MANAGER: &str = "observability-platform-status-writer";

type Mutator = Box<dyn FnOnce(&mut ObservabilityPlatformStatus) + Send>;

struct StatusOp {
    name: String,
    mutate: Mutator,
    responder: oneshot::Sender<Result<()>>,
}

#[derive(Clone)]
pub struct StatusWriter {
    tx: mpsc::Sender<StatusOp>,
}

impl StatusWriter {
    /// Spawn the worker and return a handle. The worker runs until every
    /// `StatusWriter` clone (and hence every sender) is dropped.
    pub fn spawn(client: Client, state: State, metrics: Metrics, event_sink: Arc<dyn EventSink>) -> Self {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        tokio::spawn(run_worker(client, rx, state, metrics, event_sink));
        StatusWriter { tx }
    }

    /// Hand a mutate-closure to the worker. Returns once enqueued or once
    /// `cancel` fires, whichever happens first; never blocks past either.
    pub async fn enqueue<F>(&self, name: &str, cancel: &CancellationToken, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut ObservabilityPlatformStatus) + Send + 'static,
    {
        let (resp_tx, resp_rx) = oneshot::channel();
        let op = StatusOp {
            name: name.to_string(),
            mutate: Box::new(mutate),
            responder: resp_tx,
        };

        tokio::select! {
            send_result = self.tx.send(op) => {
                send_result.map_err(|_| Error::StdError(StdError::Fatal("status writer worker gone".into())))?;
            }
            _ = cancel.cancelled() => {
                return Err(Error::StdError(StdError::Cancelled));
            }
        }

        match resp_rx.await {
            Ok(result) => result,
            Err(_) => Err(Error::StdError(StdError::Fatal("status writer dropped response".into()))),
        }
    }

    pub async fn set_condition(&self, name: &str, cancel: &CancellationToken, condition: Condition) -> Result<()> {
        self.enqueue(name, cancel, move |status| {
            let (conds, _changed) = conditions::set(&status.conditions, condition);
            status.conditions = conds;
        })
        .await
    }

    pub async fn set_component_status(&self, name: &str, cancel: &CancellationToken, component: String, entry: ComponentStatusEntry) -> Result<()> {
        self.enqueue(name, cancel, move |status| {
            status.component_status.insert(component, entry);
        })
        .await
    }

    pub async fn update_progress(&self, name: &str, cancel: &CancellationToken, progress: ProgressStatus) -> Result<()> {
        self.enqueue(name, cancel, move |status| {
            status.progress = Some(progress);
        })
        .await
    }

    pub async fn complete_operation(&self, name: &str, cancel: &CancellationToken, outcome: OperationOutcome) -> Result<()> {
        self.enqueue(name, cancel, move |status| {
            status.push_operation(outcome);
            status.progress = None;
        })
        .await
    }

    pub async fn record_error(&self, name: &str, cancel: &CancellationToken, reason: conditions::Reason, message: String) -> Result<()> {
        let observed_generation = None;
        self.enqueue(name, cancel, move |status| {
            let cond = Condition {
                type_: conditions::TYPE_ERROR.to_string(),
                status: "True".to_string(),
                reason: reason.to_string(),
                message,
                last_transition_time: k8s_openapi::apimachinery::pkg::apis::meta::v1::Time(Utc::now()),
                observed_generation,
            };
            let (conds, _) = conditions::set(&status.conditions, cond);
            status.conditions = conds;
        })
        .await
    }

    pub async fn clear_error(&self, name: &str, cancel: &CancellationToken) -> Result<()> {
        self.enqueue(name, cancel, |status| {
            let (conds, _) = conditions::remove(&status.conditions, conditions::TYPE_ERROR);
            status.conditions = conds;
        })
        .await
    }

    pub async fn set_degraded(&self, name: &str, cancel: &CancellationToken, degraded: bool, message: String) -> Result<()> {
        self.enqueue(name, cancel, move |status| {
            let cond = Condition {
                type_: conditions::TYPE_DEGRADED.to_string(),
                status: if degraded { "True" } else { "False" }.to_string(),
                reason: if degraded { conditions::Reason::TransientError } else { conditions::Reason::Ready }.to_string(),
                message,
                last_transition_time: k8s_openapi::apimachinery::pkg::apis::meta::v1::Time(Utc::now()),
                observed_generation: None,
            };
            let (conds, _) = conditions::set(&status.conditions, cond);
            status.conditions = conds;
        })
        .await
    }

    pub async fn recompute_phase(&self, name: &str, cancel: &CancellationToken) -> Result<()> {
        self.enqueue(name, cancel, |status| {
            status.phase = Some(conditions::compute_phase(&status.conditions).to_string());
        })
        .await
    }

    pub async fn aggregate_components(&self, name: &str, cancel: &CancellationToken, enabled: Vec<String>) -> Result<()> {
        self.enqueue(name, cancel, move |status| {
            let mut per_component: BTreeMap<String, Condition> = BTreeMap::new();
            for comp in &enabled {
                if let Some(c) = conditions::get(&status.conditions, &conditions::component_ready_type(comp)) {
                    per_component.insert(comp.clone(), c.clone());
                }
            }
            let observed_generation = status.observed_generation;
            let ready = conditions::aggregate_ready(&enabled, &per_component, observed_generation);
            let (conds, _) = conditions::set(&status.conditions, ready);
            status.conditions = conds;
        })
        .await
    }
}

async fn run_worker(client: Client, mut rx: mpsc::Receiver<StatusOp>, state: State, metrics: Metrics, event_sink: Arc<dyn EventSink>) {
    let api: Api<ObservabilityPlatform> = Api::all(client);

    while let Some(op) = rx.recv().await {
        let result = apply_op(&api, &op.name, op.mutate, &state, &metrics, event_sink.as_ref()).await;
        if let Err(ref e) = result {
            warn!(platform = %op.name, error = %e, "status update dropped");
        }
        let _ = op.responder.send(result);
    }
}

async fn apply_op(
    api: &Api<ObservabilityPlatform>,
    name: &str,
    mutate: Mutator,
    state: &State,
    metrics: &Metrics,
    event_sink: &dyn EventSink,
) -> Result<()> {
    let mut attempt = 0u32;
    loop {
        attempt += 1;

        let current = match api.get(name).await {
            Ok(obj) => obj,
            Err(kube::Error::Api(e)) if e.code == 404 => return Ok(()),
            Err(e) => return Err(Error::from(e)),
        };

        let mut status = current.status.clone().unwrap_or_default();
        let old_phase = status.phase.clone();

        mutate(&mut status);

        status.observed_generation = current.metadata.generation;
        status.last_reconcile_time = Some(Utc::now().to_rfc3339());

        let patch = Patch::Apply(serde_json::json!({
            "apiVersion": "observability.io/v1",
            "kind": "ObservabilityPlatform",
            "status": status,
        }));
        let params = PatchParams::apply(FIELD_MANAGER).force();

        match api.patch_status(name, &params, &patch).await {
            Ok(_) => {
                metrics.record_phase_transition(old_phase.as_deref(), status.phase.as_deref());
                emit_transition_event(name, old_phase.as_deref(), status.phase.as_deref(), state, event_sink).await;
                return Ok(());
            }
            Err(kube::Error::Api(e)) if e.code == 409 => {
                if attempt >= MAX_CONFLICT_RETRIES {
                    error!(platform = %name, "status update conflicted {} times, giving up", attempt);
                    return Err(Error::StdError(StdError::Conflict(e.message)));
                }
                sleep(Duration::from_millis(100 * attempt as u64)).await;
                continue;
            }
            Err(e) => {
                error!(platform = %name, error = %e, "status update failed");
                return Err(Error::from(e));
            }
        }
    }
}

async fn emit_transition_event(name: &str, old_phase: Option<&str>, new_phase: Option<&str>, state: &State, event_sink: &dyn EventSink) {
    if old_phase == new_phase {
        return;
    }
    let (kind, reason) = match new_phase {
        Some("Ready") => (EventKind::Normal, "PlatformReady"),
        Some("Failed") => (EventKind::Warning, "PlatformFailed"),
        Some("Degraded") => (EventKind::Warning, "PlatformDegraded"),
        _ => (EventKind::Normal, "PlatformUpdated"),
    };
    let message = format!("phase transitioned from {:?} to {:?}", old_phase, new_phase);

    event_sink.record(
        &kube::core::ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        kind,
        reason,
        &message,
    );

    state
        .push_event(PlatformEvent {
            platform: name.to_string(),
            kind: if matches!(kind, EventKind::Normal) { "Normal" } else { "Warning" },
            reason: reason.to_string(),
            message,
            component: None,
            duration_seconds: None,
        })
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_capacity_matches_spec() {
        assert_eq!(QUEUE_CAPACITY, 100);
    }

    #[test]
    fn retry_budget_matches_spec() {
        assert_eq!(MAX_CONFLICT_RETRIES, 3);
    }
}
