//! C6: periodic drift detection, rollback, and environment promotion. Gated
//! behind the `drift` feature the same way the teacher gates its OTLP
//! exporter behind `telemetry` — this whole module compiles out when the
//! feature is off.
//!
//! Runs strictly out-of-band (`tokio::time::interval`, its own spawned
//! task): it never calls `reconcile` directly, only folds remediation work
//! back into the same reconcile queue by relying on the watch event a spec
//! patch produces.

use std::collections::BTreeMap;
use std::process::Command;
use std::sync::Arc;

use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::ResourceExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;

use crate::api::v1::ObservabilityPlatform;
use crate::capabilities::{EventKind, EventSink, FileTree, SourceFetcher};
use crate::controllers::context::Context;
use crate::controllers::status_writer::StatusWriter;
use crate::util::conditions::{self, Reason};
use crate::util::errors::{Error, Result, StdError};
use crate::util::labels;

pub const FIELD_MANAGER: &str = "observability-platform-drift";
pub const MAX_SPEC_HISTORY: usize = 5;

/// Fields stripped from both sides of a drift comparison regardless of what
/// a renderer declares it owns.
const IGNORED_FIELDS: &[&str] = &["metadata.annotations", "metadata.resourceVersion", "status"];

#[derive(Debug, Clone)]
pub struct DriftedResource {
    pub kind: String,
    pub name: String,
    pub field: String,
    pub desired: String,
    pub observed: String,
}

#[derive(Debug, Clone)]
pub struct DriftReport {
    pub checked: u32,
    pub drifted: Vec<DriftedResource>,
    pub last_revision: String,
    pub check_time: String,
}

impl DriftReport {
    pub fn is_clean(&self) -> bool {
        self.drifted.is_empty()
    }
}

/// Default `SourceFetcher`: shells out to a pinned `git` checkout inside a
/// scratch `tempfile::TempDir`. No templating of its own — it only resolves
/// and materializes the source tree; `ComponentRenderer`s decide what any of
/// it means.
pub struct GitSourceFetcher;

#[async_trait::async_trait]
impl SourceFetcher for GitSourceFetcher {
    async fn fetch(&self, url: &str, revision: &str, credentials: Option<&str>) -> Result<FileTree> {
        let url = url.to_string();
        let revision = revision.to_string();
        let credentials = credentials.map(str::to_string);

        tokio::task::spawn_blocking(move || fetch_blocking(&url, &revision, credentials.as_deref()))
            .await
            .map_err(|e| Error::StdError(StdError::Fatal(format!("git fetch task panicked: {e}"))))?
    }

    async fn resolve_revision(&self, url: &str, branch: &str) -> Result<String> {
        let url = url.to_string();
        let branch = branch.to_string();

        tokio::task::spawn_blocking(move || resolve_revision_blocking(&url, &branch))
            .await
            .map_err(|e| Error::StdError(StdError::Fatal(format!("git ls-remote task panicked: {e}"))))?
    }
}

fn fetch_blocking(url: &str, revision: &str, credentials: Option<&str>) -> Result<FileTree> {
    let dir = tempfile::tempdir().map_err(|e| Error::StdError(StdError::Fatal(format!("tempdir: {e}"))))?;
    let auth_url = match credentials {
        Some(token) => url.replacen("https://", &format!("https://x-access-token:{token}@"), 1),
        None => url.to_string(),
    };

    run_git(&["clone", "--quiet", &auth_url, dir.path().to_str().unwrap_or_default()])?;
    run_git_in(dir.path(), &["checkout", "--quiet", revision])?;

    let mut tree = BTreeMap::new();
    walk_tree(dir.path(), dir.path(), &mut tree)?;
    Ok(tree)
}

fn resolve_revision_blocking(url: &str, branch: &str) -> Result<String> {
    let output = run_git(&["ls-remote", url, branch])?;
    output
        .split_whitespace()
        .next()
        .map(str::to_string)
        .ok_or_else(|| Error::StdError(StdError::TransientRemote(format!("no ref found for {branch} at {url}"))))
}

fn run_git(args: &[&str]) -> Result<String> {
    run_git_in(std::path::Path::new("."), args)
}

fn run_git_in(dir: &std::path::Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .current_dir(dir)
        .args(args)
        .output()
        .map_err(|e| Error::StdError(StdError::TransientRemote(format!("git {args:?} failed to start: {e}"))))?;
    if !output.status.success() {
        return Err(Error::StdError(StdError::TransientRemote(format!(
            "git {args:?} exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr)
        ))));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn walk_tree(root: &std::path::Path, dir: &std::path::Path, out: &mut FileTree) -> Result<()> {
    for entry in std::fs::read_dir(dir).map_err(|e| Error::StdError(StdError::Fatal(format!("read_dir: {e}"))))? {
        let entry = entry.map_err(|e| Error::StdError(StdError::Fatal(format!("read_dir entry: {e}"))))?;
        let path = entry.path();
        if path.file_name().and_then(|n| n.to_str()) == Some(".git") {
            continue;
        }
        if path.is_dir() {
            walk_tree(root, &path, out)?;
        } else {
            let rel = path.strip_prefix(root).unwrap_or(&path).to_string_lossy().into_owned();
            let bytes = std::fs::read(&path).map_err(|e| Error::StdError(StdError::Fatal(format!("read {rel}: {e}"))))?;
            out.insert(rel, bytes);
        }
    }
    Ok(())
}

/// Compares the managed workload replica counts named in `desired` against
/// what's observed on the cluster, skipping any field path a renderer has
/// declared as post-render-owned. This is a structural approximation of a
/// full manifest diff: the fetched tree is opaque bytes (renderers own the
/// templating), so drift here is scoped to the one cross-cutting field every
/// component shares — desired replica count — plus version pinning pulled
/// from the fetched tree's `<component>/VERSION` convention, if present.
pub async fn diff_against_cluster(
    desired: &FileTree,
    platform: &ObservabilityPlatform,
    ctx: &Context,
    revision: &str,
) -> Result<DriftReport> {
    let name = platform.name_any();
    let namespace = platform.spec.target_namespace_or(&name);
    let mut drifted = Vec::new();
    let mut checked = 0u32;

    for component in platform.spec.enabled_components() {
        checked += 1;
        let owned_fields = ctx
            .renderers
            .get(&component)
            .map(|r| r.post_render_owned_fields())
            .unwrap_or(&[]);
        if owned_fields.contains(&"spec.replicas") {
            continue;
        }

        let Some(spec) = platform.spec.components.get(&component) else { continue };
        let version_path = format!("{component}/VERSION");
        if let Some(bytes) = desired.get(&version_path) {
            let desired_version = String::from_utf8_lossy(bytes).trim().to_string();
            if !desired_version.is_empty() && desired_version != spec.version && !IGNORED_FIELDS.contains(&"spec.version") {
                drifted.push(DriftedResource {
                    kind: "ComponentSpec".to_string(),
                    name: component.clone(),
                    field: "version".to_string(),
                    desired: desired_version,
                    observed: spec.version.clone(),
                });
            }
        }

        let observed = observed_replicas(ctx, &component, &namespace).await;
        if let Some(observed) = observed {
            if observed != spec.replicas {
                drifted.push(DriftedResource {
                    kind: "Workload".to_string(),
                    name: component.clone(),
                    field: "replicas".to_string(),
                    desired: spec.replicas.to_string(),
                    observed: observed.to_string(),
                });
            }
        }
    }

    Ok(DriftReport {
        checked,
        drifted,
        last_revision: revision.to_string(),
        check_time: chrono::Utc::now().to_rfc3339(),
    })
}

async fn observed_replicas(ctx: &Context, component: &str, namespace: &str) -> Option<i32> {
    let deployments: Api<Deployment> = Api::namespaced(ctx.client.clone(), namespace);
    if let Ok(Some(dep)) = deployments.get_opt(component).await {
        return dep.spec.map(|s| s.replicas.unwrap_or(0));
    }
    let statefulsets: Api<StatefulSet> = Api::namespaced(ctx.client.clone(), namespace);
    if let Ok(Some(sts)) = statefulsets.get_opt(component).await {
        return sts.spec.map(|s| s.replicas.unwrap_or(0));
    }
    None
}

/// One tick of the periodic task: fetch the pinned revision, diff, then
/// either publish `DriftDetected` or (if `auto_remediate`) patch the drifted
/// components' replica counts back to the desired value, which is all the
/// replica-only diff above can meaningfully remediate on its own.
pub async fn check_once(
    platform: &ObservabilityPlatform,
    ctx: &Context,
    fetcher: &dyn SourceFetcher,
    status_writer: &StatusWriter,
    cancel: &CancellationToken,
) -> Result<DriftReport> {
    let Some(drift_spec) = platform.spec.drift_detection.as_ref().filter(|d| d.enabled) else {
        return Ok(DriftReport {
            checked: 0,
            drifted: Vec::new(),
            last_revision: String::new(),
            check_time: chrono::Utc::now().to_rfc3339(),
        });
    };

    if cancel.is_cancelled() {
        return Err(Error::StdError(StdError::Cancelled));
    }

    let tree = fetcher.fetch(&drift_spec.source_url, &drift_spec.revision, None).await?;
    let report = diff_against_cluster(&tree, platform, ctx, &drift_spec.revision).await?;

    let name = platform.name_any();
    ctx.state.push_drift_report(report.clone()).await;

    if report.is_clean() {
        if let Err(e) = status_writer.set_condition(&name, cancel, clean_condition()).await {
            warn!(platform = %name, error = %e, "failed to clear DriftDetected condition");
        }
        return Ok(report);
    }

    if drift_spec.auto_remediate {
        remediate(platform, ctx, &report).await;
    } else if let Err(e) = status_writer.set_condition(&name, cancel, drifted_condition(&report)).await {
        warn!(platform = %name, error = %e, "failed to publish DriftDetected condition");
    }

    ctx.event_sink.record(
        &kube::core::ObjectMeta {
            name: Some(name),
            ..Default::default()
        },
        EventKind::Warning,
        "DriftDetected",
        &format!("{} of {} components drifted", report.drifted.len(), report.checked),
    );

    Ok(report)
}

fn drifted_condition(report: &DriftReport) -> Condition {
    Condition {
        type_: conditions::TYPE_DRIFT_DETECTED.to_string(),
        status: "True".to_string(),
        reason: Reason::DriftDetected.to_string(),
        message: format!("{} of {} components drifted from {}", report.drifted.len(), report.checked, report.last_revision),
        last_transition_time: k8s_openapi::apimachinery::pkg::apis::meta::v1::Time(chrono::Utc::now()),
        observed_generation: None,
    }
}

fn clean_condition() -> Condition {
    Condition {
        type_: conditions::TYPE_DRIFT_DETECTED.to_string(),
        status: "False".to_string(),
        reason: Reason::Ready.to_string(),
        message: "no drift observed on last check".to_string(),
        last_transition_time: k8s_openapi::apimachinery::pkg::apis::meta::v1::Time(chrono::Utc::now()),
        observed_generation: None,
    }
}

async fn remediate(platform: &ObservabilityPlatform, ctx: &Context, report: &DriftReport) {
    let namespace = platform.spec.target_namespace_or(&platform.name_any());
    for drifted in &report.drifted {
        if drifted.field != "replicas" {
            continue;
        }
        let Ok(desired) = drifted.desired.parse::<i32>() else { continue };
        let deployments: Api<Deployment> = Api::namespaced(ctx.client.clone(), &namespace);
        let patch = Patch::Merge(serde_json::json!({ "spec": { "replicas": desired } }));
        if let Err(e) = deployments
            .patch(&drifted.name, &PatchParams::apply(FIELD_MANAGER), &patch)
            .await
        {
            warn!(component = %drifted.name, error = %e, "drift remediation patch failed");
        }
    }
}

/// §4.6 "Rollback": if the most recent `operation_history` entry failed and
/// has stayed failed past `rollback_window_seconds`, restore the last
/// known-good spec from the bounded in-memory history. This is the one
/// legitimate spec mutation the operator performs on its own — status
/// writes (`StatusWriter`) never touch `spec`.
pub async fn maybe_rollback(platform: &ObservabilityPlatform, ctx: &Context) -> Result<bool> {
    let Some(drift_spec) = platform.spec.drift_detection.as_ref() else { return Ok(false) };
    let name = platform.name_any();

    let Some(last) = platform.status.as_ref().and_then(|s| s.operation_history.last()) else {
        return Ok(false);
    };
    if last.success {
        return Ok(false);
    }

    let Ok(finished_at) = chrono::DateTime::parse_from_rfc3339(&last.finished_at) else {
        return Ok(false);
    };
    let window = chrono::Duration::seconds(drift_spec.rollback_window_seconds as i64);
    if chrono::Utc::now().signed_duration_since(finished_at) < window {
        return Ok(false);
    }

    let Some(previous_spec) = ctx.state.last_known_good_spec(&name).await else {
        return Ok(false);
    };

    let api: Api<ObservabilityPlatform> = Api::all(ctx.client.clone());
    let patch = Patch::Merge(serde_json::json!({ "spec": previous_spec }));
    api.patch(&name, &PatchParams::apply(FIELD_MANAGER), &patch).await?;

    ctx.event_sink.record(
        &kube::core::ObjectMeta {
            name: Some(name.clone()),
            ..Default::default()
        },
        EventKind::Warning,
        "PlatformRolledBack",
        "rolled back to last known-good spec after sustained failure",
    );
    info!(platform = %name, "rolled back to last known-good spec");
    Ok(true)
}

/// §4.6 "Promotion": when the current environment has held `Ready=True`/
/// `Degraded=False` for the configured window, synthesize a spec patch for
/// the next environment's Platform object (looked up by the
/// `<base>-<next-env>` naming convention) and apply it there, not here.
pub async fn maybe_promote(platform: &ObservabilityPlatform, ctx: &Context) -> Result<Option<String>> {
    let Some(drift_spec) = platform.spec.drift_detection.as_ref() else { return Ok(None) };
    let Some(promotion) = drift_spec.promotion.as_ref() else { return Ok(None) };

    let status = platform.status.as_ref();
    let ready = status.is_some_and(|s| conditions::is_true(&s.conditions, conditions::TYPE_READY));
    let degraded = status.is_some_and(|s| conditions::is_true(&s.conditions, conditions::TYPE_DEGRADED));
    if !ready || degraded {
        return Ok(None);
    }

    let ready_since = status
        .and_then(|s| conditions::get(&s.conditions, conditions::TYPE_READY))
        .map(|c| c.last_transition_time.0);
    let Some(ready_since) = ready_since else { return Ok(None) };
    let window = chrono::Duration::seconds(promotion.promotion_window_seconds as i64);
    if chrono::Utc::now().signed_duration_since(ready_since) < window {
        return Ok(None);
    }

    let name = platform.name_any();
    let base = strip_env_suffix(&name, &promotion.environments);
    let current_env_idx = promotion
        .environments
        .iter()
        .position(|e| name == format!("{base}-{e}"))
        .or(Some(0));
    let Some(idx) = current_env_idx else { return Ok(None) };
    let Some(next_env) = promotion.environments.get(idx + 1) else {
        return Ok(None);
    };

    let target_name = format!("{base}-{next_env}");
    let api: Api<ObservabilityPlatform> = Api::all(ctx.client.clone());
    let patch = Patch::Merge(serde_json::json!({ "spec": { "components": platform.spec.components } }));
    api.patch(&target_name, &PatchParams::apply(FIELD_MANAGER), &patch).await?;

    info!(platform = %name, target = %target_name, "promoted revision to next environment");
    Ok(Some(target_name))
}

fn strip_env_suffix(name: &str, environments: &[String]) -> String {
    for env in environments {
        if let Some(base) = name.strip_suffix(&format!("-{env}")) {
            return base.to_string();
        }
    }
    name.to_string()
}

/// Spawns the periodic out-of-band task. Ticks at `interval_secs`; each tick
/// re-lists enabled Platforms with drift detection on and checks each in
/// turn. Folds remediation back through the same reconcile queue indirectly:
/// any spec/status patch this task makes produces a watch event that
/// `reconcile` (C5) picks up on its own, never calling it directly.
pub async fn run_drift_task(
    client: kube::Client,
    ctx: Arc<Context>,
    status_writer: Arc<StatusWriter>,
    interval_secs: u64,
    cancel: CancellationToken,
) {
    let fetcher = GitSourceFetcher;
    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
    let platforms: Api<ObservabilityPlatform> = Api::all(client);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("drift task shutting down");
                return;
            }
            _ = ticker.tick() => {}
        }

        let list = match platforms.list(&ListParams::default()).await {
            Ok(list) => list,
            Err(e) => {
                warn!(error = %e, "drift task failed to list platforms");
                continue;
            }
        };

        for platform in &list.items {
            if let Err(e) = check_once(platform, &ctx, &fetcher, &status_writer, &cancel).await {
                warn!(platform = %platform.name_any(), error = %e, "drift check failed");
                continue;
            }
            if let Err(e) = maybe_rollback(platform, &ctx).await {
                warn!(platform = %platform.name_any(), error = %e, "rollback check failed");
            }
            if let Err(e) = maybe_promote(platform, &ctx).await {
                warn!(platform = %platform.name_any(), error = %e, "promotion check failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drift_report_clean_when_empty() {
        let report = DriftReport {
            checked: 3,
            drifted: Vec::new(),
            last_revision: "abc".to_string(),
            check_time: "now".to_string(),
        };
        assert!(report.is_clean());
    }

    #[test]
    fn strip_env_suffix_matches_known_environment() {
        let envs = vec!["staging".to_string(), "production".to_string()];
        assert_eq!(strip_env_suffix("platform-staging", &envs), "platform");
        assert_eq!(strip_env_suffix("platform", &envs), "platform");
    }
}
