//! C4: dependency-ordered build/configure/health-check of the components
//! named in `spec.components`. This is the direct generalization of a
//! hand-rolled fixed sequence (namespace, shared resources, then a literal
//! list of per-subsystem reconciles) into a data-driven one: the sequence is
//! computed rather than written out, because the set of enabled components
//! varies per Platform.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::time::Duration as StdDuration;

use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Secret, ServiceAccount};
use k8s_openapi::api::networking::v1::NetworkPolicy;
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, PolicyRule, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::ResourceExt;
use rand::Rng;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::api::v1::{ComponentStatusEntry, ObservabilityPlatform, ProgressStatus};
use crate::capabilities::MergedConfig;
use crate::controllers::context::{ComponentHealth, Context};
use crate::controllers::status_writer::StatusWriter;
use crate::util::conditions::{self, Reason};
use crate::util::errors::{Error, Result, StdError};
use crate::util::labels;

pub const FIELD_MANAGER: &str = "observability-platform-pipeline";
pub const HEALTH_PROBE_TIMEOUT: StdDuration = StdDuration::from_secs(10);
pub const REQUEUE_ON_SUCCESS: StdDuration = StdDuration::from_secs(5 * 60);
pub const REQUEUE_ON_ERROR: StdDuration = StdDuration::from_secs(30);

/// Fixed dependency graph: `{metrics, logs, traces}` have no predecessors;
/// `visualization` depends on whichever of them are enabled. `collector` is
/// independent (feeds metrics/traces/logs but isn't itself depended upon
/// here, matching spec.md's silence on collector ordering).
fn dependencies_of(component: &str) -> &'static [&'static str] {
    match component {
        "visualization" => &["metrics", "logs", "traces"],
        _ => &[],
    }
}

/// Kahn's algorithm over the enabled subset, lexical tie-break for
/// determinism. Pure function — no I/O, directly unit-testable.
pub fn topological_order(enabled: &BTreeSet<String>) -> Vec<String> {
    let mut in_degree: BTreeMap<&str, usize> = BTreeMap::new();
    let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();

    for name in enabled {
        in_degree.entry(name.as_str()).or_insert(0);
    }
    for name in enabled {
        let deps: Vec<&str> = dependencies_of(name).iter().filter(|d| enabled.contains(**d)).copied().collect();
        *in_degree.get_mut(name.as_str()).unwrap() += deps.len();
        for dep in deps {
            dependents.entry(dep).or_default().push(name.as_str());
        }
    }

    let mut ready: VecDeque<&str> = in_degree
        .iter()
        .filter(|(_, deg)| **deg == 0)
        .map(|(name, _)| *name)
        .collect::<Vec<_>>()
        .into_iter()
        .collect();
    let mut ready_sorted: Vec<&str> = ready.drain(..).collect();
    ready_sorted.sort_unstable();
    let mut ready: VecDeque<&str> = ready_sorted.into();

    let mut order = Vec::with_capacity(enabled.len());
    while let Some(name) = ready.pop_front() {
        order.push(name.to_string());
        if let Some(deps) = dependents.get(name) {
            let mut newly_ready = Vec::new();
            for dependent in deps {
                let deg = in_degree.get_mut(dependent).unwrap();
                *deg -= 1;
                if *deg == 0 {
                    newly_ready.push(*dependent);
                }
            }
            newly_ready.sort_unstable();
            for n in newly_ready {
                // Keep the whole queue lexically ordered among same-readiness ties.
                let pos = ready.iter().position(|r| *r > n).unwrap_or(ready.len());
                ready.insert(pos, n);
            }
        }
    }

    order
}

/// metrics-version -> permitted versions for its dependents. A minimal,
/// explicit matrix; unknown metrics versions reject everything (fail
/// closed, matching "Reject with a ConfigValidationFailed condition if
/// incompatible").
fn compatibility_matrix() -> BTreeMap<&'static str, BTreeMap<&'static str, &'static [&'static str]>> {
    let mut m = BTreeMap::new();
    let mut v248 = BTreeMap::new();
    v248.insert("visualization", &["10.0", "10.1", "10.2"][..]);
    v248.insert("logs", &["2.8", "2.9"][..]);
    v248.insert("traces", &["2.2", "2.3"][..]);
    v248.insert("collector", &["0.95", "0.96"][..]);
    m.insert("2.48", v248);
    let mut v250 = BTreeMap::new();
    v250.insert("visualization", &["10.2", "10.3"][..]);
    v250.insert("logs", &["2.9", "2.10"][..]);
    v250.insert("traces", &["2.3", "2.4"][..]);
    v250.insert("collector", &["0.96", "0.97"][..]);
    m.insert("2.50", v250);
    m
}

pub fn check_version_compatibility(platform: &ObservabilityPlatform) -> Result<()> {
    let Some(metrics) = platform.spec.components.metrics.as_ref().filter(|c| c.enabled) else {
        return Ok(());
    };
    let matrix = compatibility_matrix();
    let Some(permitted) = matrix.get(metrics.version.as_str()) else {
        return Err(Error::StdError(StdError::ValidationFailed(format!(
            "metrics version {} is not in the compatibility matrix",
            metrics.version
        ))));
    };

    for (name, spec) in [
        ("visualization", platform.spec.components.visualization.as_ref()),
        ("logs", platform.spec.components.logs.as_ref()),
        ("traces", platform.spec.components.traces.as_ref()),
        ("collector", platform.spec.components.collector.as_ref()),
    ] {
        let Some(spec) = spec.filter(|c| c.enabled) else { continue };
        let Some(versions) = permitted.get(name) else { continue };
        if !versions.contains(&spec.version.as_str()) {
            return Err(Error::StdError(StdError::ValidationFailed(format!(
                "metrics {} is incompatible with {} {} (permitted: {:?})",
                metrics.version, name, spec.version, versions
            ))));
        }
    }

    Ok(())
}

pub fn check_cross_references(platform: &ObservabilityPlatform) -> Result<()> {
    if let Some(viz) = platform.spec.components.visualization.as_ref().filter(|c| c.enabled) {
        for data_source in &viz.data_sources {
            let enabled = platform.spec.components.get(data_source).is_some_and(|c| c.enabled);
            if !enabled {
                return Err(Error::StdError(StdError::ValidationFailed(format!(
                    "visualization data source '{data_source}' requires that component to be enabled"
                ))));
            }
        }
    }
    Ok(())
}

pub fn check_ha_invariant(platform: &ObservabilityPlatform) -> Result<()> {
    if !platform.spec.high_availability {
        return Ok(());
    }
    for name in platform.spec.enabled_components() {
        let Some(comp) = platform.spec.components.get(&name) else { continue };
        if comp.replicas < 2 {
            return Err(Error::StdError(StdError::ValidationFailed(format!(
                "{name} must have replicas >= 2 in high-availability mode"
            ))));
        }
        if name == "metrics" && comp.storage.is_none() {
            return Err(Error::StdError(StdError::ValidationFailed(
                "storage is required for metrics in HA mode".to_string(),
            )));
        }
    }
    Ok(())
}

pub async fn ensure_namespace(ctx: &Context, namespace: &str) -> Result<()> {
    let namespaces: Api<Namespace> = Api::all(ctx.client.clone());
    if namespaces.get_opt(namespace).await?.is_some() {
        return Ok(());
    }

    let mut ns_labels = std::collections::BTreeMap::new();
    ns_labels.insert(labels::MANAGED_BY.to_string(), labels::MANAGED_BY_VALUE.to_string());

    let ns = Namespace {
        metadata: ObjectMeta {
            name: Some(namespace.to_string()),
            labels: Some(ns_labels),
            ..Default::default()
        },
        ..Default::default()
    };
    namespaces.create(&PostParams::default(), &ns).await?;
    Ok(())
}

pub async fn ensure_common_resources(ctx: &Context, platform: &ObservabilityPlatform, namespace: &str) -> Result<()> {
    let name = platform.name_any();
    let common_labels = labels::common(&name);

    let service_accounts: Api<ServiceAccount> = Api::namespaced(ctx.client.clone(), namespace);
    let sa_name = format!("{name}-operator");
    if service_accounts.get_opt(&sa_name).await?.is_none() {
        let sa = ServiceAccount {
            metadata: ObjectMeta {
                name: Some(sa_name.clone()),
                namespace: Some(namespace.to_string()),
                labels: Some(common_labels.clone()),
                ..Default::default()
            },
            ..Default::default()
        };
        service_accounts.create(&PostParams::default(), &sa).await?;
    }

    let cluster_roles: Api<ClusterRole> = Api::all(ctx.client.clone());
    let role_name = format!("{name}-components");
    if cluster_roles.get_opt(&role_name).await?.is_none() {
        let role = ClusterRole {
            metadata: ObjectMeta {
                name: Some(role_name.clone()),
                labels: Some(common_labels.clone()),
                ..Default::default()
            },
            rules: Some(vec![PolicyRule {
                api_groups: Some(vec!["".to_string(), "apps".to_string()]),
                resources: Some(vec!["pods".to_string(), "services".to_string(), "configmaps".to_string()]),
                verbs: vec!["get".to_string(), "list".to_string(), "watch".to_string()],
                ..Default::default()
            }]),
            ..Default::default()
        };
        cluster_roles.create(&PostParams::default(), &role).await?;
    }

    let bindings: Api<ClusterRoleBinding> = Api::all(ctx.client.clone());
    let binding_name = format!("{name}-components");
    if bindings.get_opt(&binding_name).await?.is_none() {
        let binding = ClusterRoleBinding {
            metadata: ObjectMeta {
                name: Some(binding_name.clone()),
                labels: Some(common_labels.clone()),
                ..Default::default()
            },
            role_ref: RoleRef {
                api_group: "rbac.authorization.k8s.io".to_string(),
                kind: "ClusterRole".to_string(),
                name: role_name,
            },
            subjects: Some(vec![Subject {
                kind: "ServiceAccount".to_string(),
                name: sa_name,
                namespace: Some(namespace.to_string()),
                ..Default::default()
            }]),
        };
        bindings.create(&PostParams::default(), &binding).await?;
    }

    if platform.spec.security.as_ref().is_some_and(|s| s.network_policy_enabled) {
        let policies: Api<NetworkPolicy> = Api::namespaced(ctx.client.clone(), namespace);
        let policy_name = format!("{name}-default-deny");
        if policies.get_opt(&policy_name).await?.is_none() {
            let policy = NetworkPolicy {
                metadata: ObjectMeta {
                    name: Some(policy_name),
                    namespace: Some(namespace.to_string()),
                    labels: Some(common_labels.clone()),
                    ..Default::default()
                },
                spec: Some(k8s_openapi::api::networking::v1::NetworkPolicySpec {
                    pod_selector: k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector {
                        match_labels: Some(labels::selector_map(&name)),
                        ..Default::default()
                    },
                    policy_types: Some(vec!["Ingress".to_string(), "Egress".to_string()]),
                    ..Default::default()
                }),
            };
            policies.create(&PostParams::default(), &policy).await?;
        }
    }

    let secrets: Api<Secret> = Api::namespaced(ctx.client.clone(), namespace);
    let secret_name = format!("{name}-admin-credentials");
    if secrets.get_opt(&secret_name).await?.is_none() {
        let password = generate_password(16);
        let mut data = std::collections::BTreeMap::new();
        data.insert("password".to_string(), k8s_openapi::ByteString(password.into_bytes()));
        let secret = Secret {
            metadata: ObjectMeta {
                name: Some(secret_name),
                namespace: Some(namespace.to_string()),
                labels: Some(common_labels.clone()),
                ..Default::default()
            },
            data: Some(data),
            ..Default::default()
        };
        secrets.create(&PostParams::default(), &secret).await?;
    }

    let configmaps: Api<ConfigMap> = Api::namespaced(ctx.client.clone(), namespace);
    let global_config_name = format!("{name}-global-config");
    let mut config_data = std::collections::BTreeMap::new();
    config_data.insert("clusterName".to_string(), name.clone());
    config_data.insert("logLevel".to_string(), "info".to_string());
    config_data.insert("retention".to_string(), "15d".to_string());
    let global_config = ConfigMap {
        metadata: ObjectMeta {
            name: Some(global_config_name.clone()),
            namespace: Some(namespace.to_string()),
            labels: Some(common_labels),
            ..Default::default()
        },
        data: Some(config_data),
        ..Default::default()
    };
    let patch = Patch::Apply(&global_config);
    configmaps
        .patch(&global_config_name, &PatchParams::apply(FIELD_MANAGER).force(), &patch)
        .await?;

    Ok(())
}

fn generate_password(len: usize) -> String {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    (0..len).map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char).collect()
}

fn endpoint_for(component: &str, namespace: &str) -> String {
    format!("{component}.{namespace}.svc.cluster.local")
}

fn health_probe_path(component: &str) -> (u16, &'static str) {
    match component {
        "metrics" => (9090, "/-/healthy"),
        "visualization" => (3000, "/api/health"),
        "logs" => (3100, "/ready"),
        "traces" => (16686, "/"),
        "collector" => (13133, "/"),
        _ => (8080, "/healthz"),
    }
}

fn build_merged_config(platform: &ObservabilityPlatform, component: &str, namespace: &str) -> Result<MergedConfig> {
    let spec = platform
        .spec
        .components
        .get(component)
        .ok_or_else(|| Error::StdError(StdError::Fatal(format!("no spec for enabled component {component}"))))?;

    let mut endpoints = BTreeMap::new();
    if component == "visualization" {
        for source in &spec.data_sources {
            endpoints.insert(source.clone(), endpoint_for(source, namespace));
        }
    }

    Ok(MergedConfig {
        values: spec.config.clone(),
        endpoints,
        replicas: spec.replicas,
        version: spec.version.clone(),
    })
}

/// Runs the full C4 sequence for one reconcile: namespace, shared resources,
/// topological per-component reconcile+health, and status folding. Returns
/// `Ok(())` on full success; any component failure aborts the remaining
/// components (all enabled components are treated as critical) and returns
/// the error for C5's `handle_error` to route.
pub async fn run(
    platform: &ObservabilityPlatform,
    ctx: &Context,
    status_writer: &StatusWriter,
    cancel: &CancellationToken,
) -> Result<()> {
    let name = platform.name_any();
    let namespace = platform.spec.target_namespace_or(&name);

    check_ha_invariant(platform)?;
    check_version_compatibility(platform)?;
    check_cross_references(platform)?;

    ensure_namespace(ctx, &namespace).await?;
    ensure_common_resources(ctx, platform, &namespace).await?;

    let enabled_set: BTreeSet<String> = platform.spec.enabled_components().into_iter().collect();
    let order = topological_order(&enabled_set);
    let total = order.len() as u32;

    for (idx, component) in order.iter().enumerate() {
        status_writer
            .update_progress(
                &name,
                cancel,
                ProgressStatus {
                    operation: "reconcile".to_string(),
                    current: idx as u32 + 1,
                    total,
                    percentage: if total == 0 { 100 } else { ((idx as u32 + 1) * 100) / total } as u8,
                    message: format!("Reconciling {component}"),
                    last_updated: chrono::Utc::now().to_rfc3339(),
                },
            )
            .await?;

        if let Err(e) = reconcile_one_component(platform, ctx, status_writer, cancel, component, &namespace).await {
            let ready_type = conditions::component_ready_type(component);
            status_writer
                .set_condition(
                    &name,
                    cancel,
                    k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition {
                        type_: ready_type,
                        status: "False".to_string(),
                        reason: Reason::Failed.to_string(),
                        message: e.to_string(),
                        last_transition_time: k8s_openapi::apimachinery::pkg::apis::meta::v1::Time(chrono::Utc::now()),
                        observed_generation: platform.metadata.generation,
                    },
                )
                .await?;
            return Err(e);
        }
    }

    status_writer.aggregate_components(&name, cancel, order).await?;
    status_writer.clear_error(&name, cancel).await?;
    Ok(())
}

async fn reconcile_one_component(
    platform: &ObservabilityPlatform,
    ctx: &Context,
    status_writer: &StatusWriter,
    cancel: &CancellationToken,
    component: &str,
    namespace: &str,
) -> Result<()> {
    let name = platform.name_any();
    let merged = build_merged_config(platform, component, namespace)?;

    let renderer = ctx
        .renderers
        .get(component)
        .ok_or_else(|| Error::StdError(StdError::Fatal(format!("no renderer registered for component {component}"))))?;

    let start = Instant::now();
    let result = renderer.reconcile(platform, &merged).await;
    let elapsed = start.elapsed();

    let ready_type = conditions::component_ready_type(component);
    match result {
        Ok(()) => {
            status_writer
                .set_condition(
                    &name,
                    cancel,
                    k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition {
                        type_: ready_type,
                        status: "True".to_string(),
                        reason: Reason::Ready.to_string(),
                        message: format!("reconciled in {}", conditions::format_duration(elapsed)),
                        last_transition_time: k8s_openapi::apimachinery::pkg::apis::meta::v1::Time(chrono::Utc::now()),
                        observed_generation: platform.metadata.generation,
                    },
                )
                .await?;

            let health = probe_health(ctx, &name, component, namespace, merged.replicas).await;
            ctx.state.set_component_health(&name, component, health).await;
            ctx.metrics
                .component_health
                .with_label_values(&[&name, namespace, component])
                .set(health.healthy() as i64);

            status_writer
                .set_component_status(
                    &name,
                    cancel,
                    component.to_string(),
                    ComponentStatusEntry {
                        ready: health.healthy(),
                        desired_replicas: merged.replicas,
                        ready_replicas: if health.workload_ready { merged.replicas } else { 0 },
                        version: merged.version,
                        message: if health.healthy() { "healthy".to_string() } else { "unhealthy".to_string() },
                        last_checked: Some(chrono::Utc::now().to_rfc3339()),
                    },
                )
                .await?;

            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Workload-level (replica counts) AND application-level (HTTP GET)
/// health. Both capabilities currently read through `kube::Api` directly
/// (workload) or `reqwest` (application) rather than through a trait object
/// — the spec treats rendering as opaque but health probing against a
/// well-known port/path is part of the core's job, not the renderer's.
/// Also folds the observed replica counts and probe timing into the
/// per-component gauges/histogram so `/metrics` reflects what was probed.
pub async fn probe_health(ctx: &Context, platform: &str, component: &str, namespace: &str, desired_replicas: i32) -> ComponentHealth {
    let (workload_ready, ready_replicas) = probe_workload(ctx, component, namespace).await;
    ctx.metrics
        .set_component_replicas(platform, namespace, component, ready_replicas as i64, desired_replicas as i64);

    let start = Instant::now();
    let application_healthy = probe_application(component, namespace).await;
    let elapsed = start.elapsed().as_secs_f64();
    ctx.metrics.record_health_check(platform, namespace, component, elapsed, application_healthy);

    ComponentHealth {
        workload_ready,
        application_healthy,
    }
}

/// Returns `(ready, ready_replicas)`.
async fn probe_workload(ctx: &Context, component: &str, namespace: &str) -> (bool, i32) {
    use k8s_openapi::api::apps::v1::Deployment;
    let deployments: Api<Deployment> = Api::namespaced(ctx.client.clone(), namespace);
    match deployments.get_opt(component).await {
        Ok(Some(dep)) => {
            let status = dep.status.unwrap_or_default();
            let desired = status.replicas.unwrap_or(0);
            let ready = status.ready_replicas.unwrap_or(0);
            (ready >= desired && desired > 0, ready)
        }
        _ => (false, 0),
    }
}

async fn probe_application(component: &str, namespace: &str) -> bool {
    let (port, path) = health_probe_path(component);
    let url = format!("http://{}.{namespace}.svc.cluster.local:{port}{path}", component);

    let client = match reqwest::Client::builder().timeout(HEALTH_PROBE_TIMEOUT).build() {
        Ok(c) => c,
        Err(_) => return false,
    };

    match client.get(&url).send().await {
        Ok(resp) => resp.status().is_success(),
        Err(e) => {
            warn!(component, url, error = %e, "application health probe failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::v1::{ComponentSpec, ObservabilityPlatformSpec};
    use crate::testing::test_platform;

    fn set_of(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn component(version: &str) -> ComponentSpec {
        ComponentSpec {
            enabled: true,
            version: version.to_string(),
            replicas: 1,
            resources: None,
            storage: None,
            config: BTreeMap::new(),
            data_sources: Vec::new(),
        }
    }

    fn platform_with(spec: ObservabilityPlatformSpec) -> ObservabilityPlatform {
        let mut platform = test_platform("demo");
        platform.spec = spec;
        platform
    }

    #[test]
    fn topological_order_puts_dependencies_before_visualization() {
        let order = topological_order(&set_of(&["visualization", "metrics", "logs", "traces"]));
        let viz_pos = order.iter().position(|c| c == "visualization").unwrap();
        for dep in ["metrics", "logs", "traces"] {
            let dep_pos = order.iter().position(|c| c == dep).unwrap();
            assert!(dep_pos < viz_pos, "{dep} should precede visualization");
        }
    }

    #[test]
    fn topological_order_is_deterministic_for_ties() {
        let a = topological_order(&set_of(&["traces", "logs", "metrics"]));
        let b = topological_order(&set_of(&["metrics", "traces", "logs"]));
        assert_eq!(a, b);
        assert_eq!(a, vec!["logs".to_string(), "metrics".to_string(), "traces".to_string()]);
    }

    #[test]
    fn topological_order_handles_partial_enablement() {
        let order = topological_order(&set_of(&["visualization", "metrics"]));
        assert_eq!(order, vec!["metrics".to_string(), "visualization".to_string()]);
    }

    #[test]
    fn topological_order_handles_collector_independently() {
        let order = topological_order(&set_of(&["collector", "metrics"]));
        assert_eq!(order.len(), 2);
    }

    #[test]
    fn version_compatibility_accepts_matching_matrix_row() {
        let mut spec = ObservabilityPlatformSpec::default();
        spec.components.metrics = Some(component("2.48"));
        spec.components.logs = Some(component("2.9"));
        let platform = platform_with(spec);
        assert!(check_version_compatibility(&platform).is_ok());
    }

    #[test]
    fn version_compatibility_rejects_unknown_metrics_version() {
        let mut spec = ObservabilityPlatformSpec::default();
        spec.components.metrics = Some(component("1.0"));
        let platform = platform_with(spec);
        assert!(check_version_compatibility(&platform).is_err());
    }

    #[test]
    fn version_compatibility_rejects_mismatched_dependent_version() {
        let mut spec = ObservabilityPlatformSpec::default();
        spec.components.metrics = Some(component("2.48"));
        spec.components.logs = Some(component("2.10"));
        let platform = platform_with(spec);
        assert!(check_version_compatibility(&platform).is_err());
    }

    #[test]
    fn cross_references_reject_visualization_data_source_not_enabled() {
        let mut spec = ObservabilityPlatformSpec::default();
        let mut viz = component("10.0");
        viz.data_sources = vec!["metrics".to_string()];
        spec.components.visualization = Some(viz);
        let platform = platform_with(spec);
        assert!(check_cross_references(&platform).is_err());
    }

    #[test]
    fn cross_references_allow_enabled_data_source() {
        let mut spec = ObservabilityPlatformSpec::default();
        let mut viz = component("10.0");
        viz.data_sources = vec!["metrics".to_string()];
        spec.components.metrics = Some(component("2.48"));
        spec.components.visualization = Some(viz);
        let platform = platform_with(spec);
        assert!(check_cross_references(&platform).is_ok());
    }

    #[test]
    fn ha_invariant_ignored_when_not_requested() {
        let mut spec = ObservabilityPlatformSpec::default();
        let mut metrics = component("2.48");
        metrics.replicas = 1;
        spec.components.metrics = Some(metrics);
        let platform = platform_with(spec);
        assert!(check_ha_invariant(&platform).is_ok());
    }

    #[test]
    fn ha_invariant_rejects_single_replica() {
        let mut spec = ObservabilityPlatformSpec::default();
        spec.high_availability = true;
        let mut metrics = component("2.48");
        metrics.replicas = 1;
        metrics.storage = Some(crate::api::v1::StorageConfig::default());
        spec.components.metrics = Some(metrics);
        let platform = platform_with(spec);
        assert!(check_ha_invariant(&platform).is_err());
    }

    #[test]
    fn ha_invariant_requires_storage_for_metrics() {
        let mut spec = ObservabilityPlatformSpec::default();
        spec.high_availability = true;
        let mut metrics = component("2.48");
        metrics.replicas = 2;
        spec.components.metrics = Some(metrics);
        let platform = platform_with(spec);
        assert!(check_ha_invariant(&platform).is_err());
    }

    #[test]
    fn ha_invariant_passes_with_replicas_and_storage() {
        let mut spec = ObservabilityPlatformSpec::default();
        spec.high_availability = true;
        let mut metrics = component("2.48");
        metrics.replicas = 2;
        metrics.storage = Some(crate::api::v1::StorageConfig::default());
        spec.components.metrics = Some(metrics);
        let platform = platform_with(spec);
        assert!(check_ha_invariant(&platform).is_ok());
    }
}
