//! C3: multi-stage ordered teardown. The built-in `kube::runtime::finalizer`
//! helper manages exactly one token; our spec needs four, removed in reverse
//! dependency order as each stage's cleanup completes, so this module
//! manages the `metadata.finalizers` array directly through merge patches —
//! the same `Api::patch` idiom the rest of this crate already uses for
//! everything else.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use k8s_openapi::api::core::v1::{ConfigMap, Namespace, NetworkPolicy, PersistentVolumeClaim, Pod, Secret, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams};
use kube::ResourceExt;
use tokio::time::{interval, timeout};
use tracing::{info, warn};

use crate::api::v1::{ObservabilityPlatform, FINALIZER_BACKUP, FINALIZER_COMPONENTS, FINALIZER_EXTERNAL_RESOURCES, FINALIZER_ROOT};
use crate::controllers::context::Context;
use crate::util::errors::{Error, Result};
use crate::util::labels;

pub const FIELD_MANAGER: &str = "observability-platform-finalizers";
pub const DELETION_GRACE_WINDOW: StdDuration = StdDuration::from_secs(5 * 60);
pub const POD_WAIT_TIMEOUT: StdDuration = StdDuration::from_secs(2 * 60);
pub const POD_WAIT_POLL: StdDuration = StdDuration::from_secs(5);

/// Ordered stage tokens, leaf stage (backup) first — the order they're
/// *added* in. Teardown runs them in reverse.
fn ordered_tokens(platform: &ObservabilityPlatform) -> Vec<&'static str> {
    let mut tokens = Vec::new();
    if platform.spec.backup.as_ref().is_some_and(|b| b.enabled) {
        tokens.push(FINALIZER_BACKUP);
    }
    tokens.push(FINALIZER_COMPONENTS);
    tokens.push(FINALIZER_EXTERNAL_RESOURCES);
    tokens.push(FINALIZER_ROOT);
    tokens
}

/// Add any missing finalizer tokens in declaration order. Returns whether
/// any were added — callers use this to wait for the resulting watch event
/// rather than immediately continuing the reconcile with stale metadata.
pub async fn ensure_finalizers(platform: &ObservabilityPlatform, ctx: &Context) -> Result<bool> {
    let wanted = ordered_tokens(platform);
    let current: Vec<String> = platform.finalizers().to_vec();

    let missing: Vec<&str> = wanted.into_iter().filter(|t| !current.iter().any(|c| c == t)).collect();
    if missing.is_empty() {
        return Ok(false);
    }

    let mut merged = current;
    merged.extend(missing.into_iter().map(String::from));

    let api: Api<ObservabilityPlatform> = Api::all(ctx.client.clone());
    let patch = Patch::Merge(serde_json::json!({
        "metadata": { "finalizers": merged }
    }));
    api.patch(&platform.name_any(), &PatchParams::apply(FIELD_MANAGER), &patch)
        .await?;

    Ok(true)
}

async fn remove_finalizer(client: &kube::Client, name: &str, token: &str) -> Result<()> {
    let api: Api<ObservabilityPlatform> = Api::all(client.clone());
    let current = match api.get(name).await {
        Ok(obj) => obj,
        Err(kube::Error::Api(e)) if e.code == 404 => return Ok(()),
        Err(e) => return Err(Error::from(e)),
    };
    let remaining: Vec<String> = current.finalizers().iter().filter(|f| f.as_str() != token).cloned().collect();
    let patch = Patch::Merge(serde_json::json!({ "metadata": { "finalizers": remaining } }));
    api.patch(name, &PatchParams::apply(FIELD_MANAGER), &patch).await?;
    Ok(())
}

/// Run whichever teardown stages still have their finalizer token present,
/// in reverse dependency order, removing each token as its stage completes.
/// Idempotent: a crash mid-stage simply resumes that same stage next time,
/// since the token for a completed stage is only removed after success.
pub async fn run_teardown(platform: &ObservabilityPlatform, ctx: Arc<Context>) -> Result<()> {
    let name = platform.name_any();
    let namespace = platform.spec.target_namespace_or(&name);
    let present = platform.finalizers().to_vec();

    let result = timeout(DELETION_GRACE_WINDOW, async {
        if present.iter().any(|f| f == FINALIZER_BACKUP) {
            backup_stage(platform, &ctx).await;
            remove_finalizer(&ctx.client, &name, FINALIZER_BACKUP).await?;
        }

        if present.iter().any(|f| f == FINALIZER_COMPONENTS) {
            components_stage(platform, &ctx, &namespace).await?;
            remove_finalizer(&ctx.client, &name, FINALIZER_COMPONENTS).await?;
        }

        if present.iter().any(|f| f == FINALIZER_EXTERNAL_RESOURCES) {
            external_resources_stage(&ctx, &namespace, &name).await;
            remove_finalizer(&ctx.client, &name, FINALIZER_EXTERNAL_RESOURCES).await?;
        }

        if present.iter().any(|f| f == FINALIZER_ROOT) {
            root_stage(&ctx, &namespace, &name).await;
            remove_finalizer(&ctx.client, &name, FINALIZER_ROOT).await?;
        }

        Ok::<(), Error>(())
    })
    .await;

    match result {
        Ok(inner) => inner,
        Err(_) => {
            warn!(platform = %name, "teardown exceeded the deletion grace window");
            Ok(())
        }
    }
}

async fn backup_stage(platform: &ObservabilityPlatform, ctx: &Context) {
    let name = platform.name_any();
    let namespace = platform.spec.target_namespace_or(&name);
    let configmaps: Api<ConfigMap> = Api::namespaced(ctx.client.clone(), &namespace);

    let mut data = std::collections::BTreeMap::new();
    if let Ok(spec_json) = serde_json::to_string(&platform.spec) {
        data.insert("spec.json".to_string(), spec_json);
    }
    if let Ok(status_json) = serde_json::to_string(&platform.status) {
        data.insert("status.json".to_string(), status_json);
    }
    data.insert("backedUpAt".to_string(), chrono::Utc::now().to_rfc3339());

    let mut backup_labels = labels::common(&name);
    backup_labels.insert(labels::BACKUP_TYPE.to_string(), labels::BACKUP_TYPE_PRE_DELETION.to_string());

    let backup = ConfigMap {
        metadata: ObjectMeta {
            name: Some(format!("{name}-backup-{}", chrono::Utc::now().timestamp())),
            namespace: Some(namespace.clone()),
            labels: Some(backup_labels),
            // Deliberately no owner_references: this object must outlive the Platform.
            ..Default::default()
        },
        data: Some(data),
        ..Default::default()
    };

    if let Err(e) = configmaps.create(&Default::default(), &backup).await {
        warn!(platform = %name, error = %e, "failed to write pre-deletion backup config-object");
    }

    for component in platform.spec.enabled_components() {
        if let Some(renderer) = ctx.renderers.get(&component) {
            if let Err(e) = renderer.backup(platform).await {
                warn!(platform = %name, component = %component, error = %e, "component backup hook failed, continuing");
            }
        }
    }
}

async fn components_stage(platform: &ObservabilityPlatform, ctx: &Context, namespace: &str) -> Result<()> {
    let name = platform.name_any();

    // Reverse of the install order: visualization depends on the other
    // three, so it is torn down first.
    for component in ["visualization", "traces", "logs", "metrics", "collector"] {
        if !platform.spec.enabled_components().iter().any(|c| c == component) {
            continue;
        }
        if let Some(renderer) = ctx.renderers.get(component) {
            if let Err(e) = renderer.delete(platform).await {
                warn!(platform = %name, component = %component, error = %e, "component delete failed, continuing teardown");
            }
        }
    }

    wait_for_pods_gone(ctx, namespace, &name).await
}

async fn wait_for_pods_gone(ctx: &Context, namespace: &str, platform_name: &str) -> Result<()> {
    let pods: Api<Pod> = Api::namespaced(ctx.client.clone(), namespace);
    let lp = ListParams::default().labels(&labels::selector(platform_name));

    let deadline = tokio::time::Instant::now() + POD_WAIT_TIMEOUT;
    let mut ticker = interval(POD_WAIT_POLL);

    loop {
        let list = pods.list(&lp).await?;
        if list.items.is_empty() {
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            warn!(platform = %platform_name, remaining = list.items.len(), "pod-termination wait exceeded 2 minutes, continuing teardown");
            return Ok(());
        }
        ticker.tick().await;
    }
}

async fn external_resources_stage(ctx: &Context, namespace: &str, platform_name: &str) {
    let lp = ListParams::default().labels(&labels::selector(platform_name));
    let dp = DeleteParams::default();

    let pvcs: Api<PersistentVolumeClaim> = Api::namespaced(ctx.client.clone(), namespace);
    delete_all(&pvcs, &lp, &dp, platform_name, "PersistentVolumeClaim").await;

    let secrets: Api<Secret> = Api::namespaced(ctx.client.clone(), namespace);
    delete_all(&secrets, &lp, &dp, platform_name, "Secret").await;

    let services: Api<Service> = Api::namespaced(ctx.client.clone(), namespace);
    delete_all(&services, &lp, &dp, platform_name, "Service").await;

    let policies: Api<NetworkPolicy> = Api::namespaced(ctx.client.clone(), namespace);
    delete_all(&policies, &lp, &dp, platform_name, "NetworkPolicy").await;

    // Config-objects are handled separately: backup snapshots must survive.
    let configmaps: Api<ConfigMap> = Api::namespaced(ctx.client.clone(), namespace);
    match configmaps.list(&lp).await {
        Ok(list) => {
            for cm in list.items {
                let is_backup = cm
                    .metadata
                    .labels
                    .as_ref()
                    .and_then(|l| l.get(labels::BACKUP_TYPE))
                    .is_some_and(|v| v == labels::BACKUP_TYPE_PRE_DELETION);
                if is_backup {
                    continue;
                }
                if let Some(cm_name) = cm.metadata.name {
                    if let Err(e) = configmaps.delete(&cm_name, &dp).await {
                        warn!(platform = %platform_name, name = %cm_name, error = %e, "failed to delete ConfigMap, continuing");
                    }
                }
            }
        }
        Err(e) => warn!(platform = %platform_name, error = %e, "failed to list ConfigMaps for cleanup"),
    }
}

async fn delete_all<K>(api: &Api<K>, lp: &ListParams, dp: &DeleteParams, platform_name: &str, kind: &str)
where
    K: kube::Resource + Clone + std::fmt::Debug + for<'de> serde::Deserialize<'de>,
{
    match api.list(lp).await {
        Ok(list) => {
            for obj in list.items {
                if let Some(name) = obj.meta().name.clone() {
                    if let Err(e) = api.delete(&name, dp).await {
                        warn!(platform = %platform_name, kind, name = %name, error = %e, "failed to delete resource, continuing");
                    }
                }
            }
        }
        Err(e) => warn!(platform = %platform_name, kind, error = %e, "failed to list resources for cleanup"),
    }
}

async fn root_stage(ctx: &Context, namespace: &str, platform_name: &str) {
    let lp = ListParams::default().labels(&labels::selector(platform_name));
    let dp = DeleteParams::default();

    let configmaps: Api<ConfigMap> = Api::namespaced(ctx.client.clone(), namespace);
    delete_all(&configmaps, &lp, &dp, platform_name, "ConfigMap (root sweep)").await;

    let namespaces: Api<Namespace> = Api::all(ctx.client.clone());
    match namespaces.get_opt(namespace).await {
        Ok(Some(ns)) => {
            let our_keys: Vec<&str> = ns
                .metadata
                .labels
                .as_ref()
                .map(|l| l.keys().filter(|k| k.as_str() == labels::MANAGED_BY).map(|s| s.as_str()).collect())
                .unwrap_or_default();
            if !our_keys.is_empty() {
                let patch = Patch::Merge(serde_json::json!({
                    "metadata": { "labels": { labels::MANAGED_BY: serde_json::Value::Null } }
                }));
                if let Err(e) = namespaces.patch(namespace, &PatchParams::apply(FIELD_MANAGER), &patch).await {
                    warn!(namespace, error = %e, "failed to scrub operator labels from namespace");
                }
            }
        }
        Ok(None) => {}
        Err(e) => warn!(namespace, error = %e, "failed to read namespace during root teardown"),
    }

    info!(platform = %platform_name, "teardown complete");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_platform;

    #[test]
    fn ordered_tokens_omits_backup_when_not_enabled() {
        let platform = test_platform("demo");
        let tokens = ordered_tokens(&platform);
        assert!(!tokens.contains(&FINALIZER_BACKUP));
        assert_eq!(tokens, vec![FINALIZER_COMPONENTS, FINALIZER_EXTERNAL_RESOURCES, FINALIZER_ROOT]);
    }

    #[test]
    fn ordered_tokens_includes_backup_first_when_enabled() {
        let mut platform = test_platform("demo");
        platform.spec.backup = Some(crate::api::v1::BackupSpec {
            enabled: true,
            schedule: None,
        });
        let tokens = ordered_tokens(&platform);
        assert_eq!(
            tokens,
            vec![FINALIZER_BACKUP, FINALIZER_COMPONENTS, FINALIZER_EXTERNAL_RESOURCES, FINALIZER_ROOT]
        );
    }
}
