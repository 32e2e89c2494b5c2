//! C5: the reconciliation entrypoint and its `kube::runtime::Controller`
//! wiring. Direct descendant of the teacher's `cluster_controller::reconcile`
//! + `error_policy` + `State`/`Context` trio, generalized to the six-step
//! sequence: fetch → deletion check → finalizer ensure → pause check →
//! pipeline run → phase publish.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{ConfigMap, PersistentVolumeClaim, Secret, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, Time};
use kube::runtime::controller::Action;
use kube::runtime::{watcher, Controller};
use kube::{Api, Client, ResourceExt};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::api::v1::ObservabilityPlatform;
use crate::capabilities::{EventKind, EventSink};
use crate::controllers::context::{Context, PlatformEvent};
use crate::controllers::{finalizers, pipeline, status_writer::StatusWriter};
use crate::util::conditions::{self, Reason};
use crate::util::errors::{Error, Result, StdError};
use crate::util::labels;

pub const REQUEUE_READY: Duration = Duration::from_secs(5 * 60);
pub const REQUEUE_ERROR: Duration = Duration::from_secs(30);
pub const REQUEUE_PAUSED: Duration = Duration::from_secs(60 * 60);

#[instrument(skip(ctx, platform, status_writer, cancel), fields(name = %platform.name_any(), namespace))]
pub async fn reconcile(
    platform: Arc<ObservabilityPlatform>,
    ctx: Arc<Context>,
    status_writer: Arc<StatusWriter>,
    cancel: CancellationToken,
) -> Result<Action> {
    let name = platform.name_any();
    let namespace = platform.spec.target_namespace_or(&name);
    tracing::Span::current().record("namespace", namespace.as_str());

    let _measurer = ctx.metrics.count_and_measure(&name, &namespace);

    if platform.metadata.deletion_timestamp.is_some() {
        info!(platform = %name, "running teardown");
        finalizers::run_teardown(&platform, ctx.clone()).await?;
        ctx.state.record_reconcile().await;
        return Ok(Action::await_change());
    }

    if finalizers::ensure_finalizers(&platform, &ctx).await? {
        return Ok(Action::await_change());
    }

    if platform.spec.pause_requested {
        status_writer
            .set_condition(
                &name,
                &cancel,
                Condition {
                    type_: conditions::TYPE_PROGRESSING.to_string(),
                    status: "False".to_string(),
                    reason: Reason::Paused.to_string(),
                    message: "reconciliation paused by spec.pauseRequested".to_string(),
                    last_transition_time: Time(chrono::Utc::now()),
                    observed_generation: platform.metadata.generation,
                },
            )
            .await?;
        status_writer.recompute_phase(&name, &cancel).await?;
        ctx.state.record_reconcile().await;
        return Ok(Action::requeue(REQUEUE_PAUSED));
    }

    let result = pipeline::run(&platform, &ctx, &status_writer, &cancel).await;
    ctx.state.record_reconcile().await;

    match result {
        Ok(()) => {
            status_writer
                .set_condition(
                    &name,
                    &cancel,
                    Condition {
                        type_: conditions::TYPE_PROGRESSING.to_string(),
                        status: "False".to_string(),
                        reason: Reason::Ready.to_string(),
                        message: "reconcile completed".to_string(),
                        last_transition_time: Time(chrono::Utc::now()),
                        observed_generation: platform.metadata.generation,
                    },
                )
                .await?;
            status_writer.recompute_phase(&name, &cancel).await?;

            #[cfg(feature = "drift")]
            ctx.state.record_known_good_spec(&name, platform.spec.clone()).await;

            Ok(Action::requeue(REQUEUE_READY))
        }
        Err(e) => Ok(handle_error(&e, &ctx, &status_writer, &platform, &cancel).await),
    }
}

pub async fn handle_error(
    err: &Error,
    ctx: &Context,
    status_writer: &StatusWriter,
    platform: &ObservabilityPlatform,
    cancel: &CancellationToken,
) -> Action {
    let name = platform.name_any();
    let namespace = platform.spec.target_namespace_or(&name);

    warn!(platform = %name, error = %err, "reconcile failed");
    ctx.metrics.reconcile_failure(&name, &namespace, err);

    if let Err(e) = status_writer.record_error(&name, cancel, error_reason(err), err.to_string()).await {
        warn!(platform = %name, error = %e, "failed to record error condition");
    }
    if let Err(e) = status_writer.recompute_phase(&name, cancel).await {
        warn!(platform = %name, error = %e, "failed to recompute phase after error");
    }

    ctx.event_sink.record(
        &kube::core::ObjectMeta {
            name: Some(name.clone()),
            ..Default::default()
        },
        EventKind::Warning,
        "ReconcileFailed",
        &err.to_string(),
    );
    ctx.state
        .push_event(PlatformEvent {
            platform: name,
            kind: "Warning",
            reason: "ReconcileFailed".to_string(),
            message: err.to_string(),
            component: None,
            duration_seconds: None,
        })
        .await;

    Action::requeue(REQUEUE_ERROR)
}

fn error_reason(err: &Error) -> Reason {
    match err {
        Error::StdError(StdError::ValidationFailed(_)) => Reason::ConfigValidationFailed,
        Error::StdError(StdError::DependencyNotReady(_)) => Reason::DependencyNotReady,
        Error::StdError(StdError::TransientRemote(_)) => Reason::TransientError,
        Error::StdError(StdError::Conflict(_)) => Reason::TransientError,
        _ => Reason::Failed,
    }
}

/// Terminal error policy for the controller runner itself (errors that
/// escape `reconcile`'s own `Result` handling, which should never happen
/// since `reconcile` always returns `Ok(Action)` — kept for defense against
/// a future code path that bypasses `handle_error`).
fn error_policy(_platform: Arc<ObservabilityPlatform>, _error: &Error, _ctx: Arc<Context>) -> Action {
    Action::requeue(REQUEUE_ERROR)
}

/// Starts the controller loop. Watches `ObservabilityPlatform` plus the
/// workload/config kinds it owns, filtered to the operator's `managed-by`
/// label exactly as the teacher scopes its pageserver pod/PVC watches.
pub async fn run(client: Client, ctx: Arc<Context>, status_writer: Arc<StatusWriter>, concurrency: u16, cancel: CancellationToken) {
    let platforms: Api<ObservabilityPlatform> = Api::all(client.clone());
    let owned_config = watcher::Config::default().labels(labels::MANAGED_BY);

    ctx.state.mark_ready();

    Controller::new(platforms, watcher::Config::default())
        .owns::<Deployment>(Api::all(client.clone()), owned_config.clone())
        .owns::<StatefulSet>(Api::all(client.clone()), owned_config.clone())
        .owns::<Service>(Api::all(client.clone()), owned_config.clone())
        .owns::<ConfigMap>(Api::all(client.clone()), owned_config.clone())
        .owns::<Secret>(Api::all(client.clone()), owned_config.clone())
        .owns::<PersistentVolumeClaim>(Api::all(client.clone()), owned_config)
        .concurrency(concurrency.into())
        .shutdown_on_signal()
        .run(
            move |platform, ctx| reconcile(platform, ctx, status_writer.clone(), cancel.clone()),
            error_policy,
            ctx,
        )
        .for_each(|res| async move {
            match res {
                Ok((object_ref, action)) => info!(?object_ref, ?action, "reconciled"),
                Err(e) => warn!(error = %e, "reconcile stream error"),
            }
        })
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_reason_maps_validation_failures_to_config_validation_failed() {
        let err = Error::StdError(StdError::ValidationFailed("bad spec".to_string()));
        assert_eq!(error_reason(&err), Reason::ConfigValidationFailed);
    }

    #[test]
    fn error_reason_maps_conflict_and_transient_remote_to_transient_error() {
        assert_eq!(error_reason(&Error::StdError(StdError::Conflict("busy".to_string()))), Reason::TransientError);
        assert_eq!(
            error_reason(&Error::StdError(StdError::TransientRemote("timeout".to_string()))),
            Reason::TransientError
        );
    }

    #[test]
    fn error_reason_maps_dependency_not_ready() {
        let err = Error::StdError(StdError::DependencyNotReady("metrics".to_string()));
        assert_eq!(error_reason(&err), Reason::DependencyNotReady);
    }

    #[test]
    fn error_reason_falls_back_to_failed() {
        let err = Error::StdError(StdError::Fatal("boom".to_string()));
        assert_eq!(error_reason(&err), Reason::Failed);
    }
}

