//! Label keys applied to every sub-resource the operator creates. Ownership
//! of a sub-resource is established through these labels plus an owner
//! reference where one is possible (cluster-scoped owners can't be set as
//! Kubernetes owner references on namespaced children across namespaces, so
//! the label selector is the authoritative ownership signal everywhere
//! finalizer cleanup needs to enumerate "everything we created").

pub const MANAGED_BY: &str = "managed-by";
pub const MANAGED_BY_VALUE: &str = "observability-platform-operator";
pub const PLATFORM: &str = "platform";
pub const PART_OF: &str = "part-of";
pub const PART_OF_VALUE: &str = "observability-platform";
pub const INSTANCE: &str = "instance";
pub const COMPONENT: &str = "component";
pub const BACKUP_TYPE: &str = "backup-type";
pub const BACKUP_TYPE_PRE_DELETION: &str = "pre-deletion";

pub fn common(platform: &str) -> std::collections::BTreeMap<String, String> {
    std::collections::BTreeMap::from([
        (MANAGED_BY.to_string(), MANAGED_BY_VALUE.to_string()),
        (PLATFORM.to_string(), platform.to_string()),
        (PART_OF.to_string(), PART_OF_VALUE.to_string()),
        (INSTANCE.to_string(), platform.to_string()),
    ])
}

pub fn for_component(platform: &str, component: &str) -> std::collections::BTreeMap<String, String> {
    let mut m = common(platform);
    m.insert(COMPONENT.to_string(), component.to_string());
    m
}

pub fn selector(platform: &str) -> String {
    format!("{PLATFORM}={platform}")
}

pub fn selector_map(platform: &str) -> std::collections::BTreeMap<String, String> {
    std::collections::BTreeMap::from([(PLATFORM.to_string(), platform.to_string())])
}
