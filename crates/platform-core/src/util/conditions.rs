//! Pure, I/O-free condition bookkeeping: upsert/get/remove over a condition
//! list, aggregation of per-component readiness into the overall `Ready`
//! condition, and phase derivation from the current condition set. None of
//! this module touches the Kubernetes API so it is safe to unit test and to
//! call from any task without holding a client.

use std::collections::BTreeMap;
use std::fmt;

use chrono::Utc;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, Time};
use tokio::time::Duration;

pub const TYPE_READY: &str = "Ready";
pub const TYPE_PROGRESSING: &str = "Progressing";
pub const TYPE_DEGRADED: &str = "Degraded";
pub const TYPE_ERROR: &str = "Error";
pub const TYPE_DRIFT_DETECTED: &str = "DriftDetected";

pub fn component_ready_type(component: &str) -> String {
    format!("{}Ready", titlecase(component))
}

fn titlecase(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Closed reason vocabulary. `Display` renders the exact PascalCase string
/// stored in `condition.reason`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    Ready,
    InProgress,
    Failed,
    Paused,
    ComponentUpgrading,
    ConfigValidationFailed,
    DependencyNotReady,
    TransientError,
    DriftDetected,
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Reason::Ready => "Ready",
            Reason::InProgress => "InProgress",
            Reason::Failed => "Failed",
            Reason::Paused => "Paused",
            Reason::ComponentUpgrading => "ComponentUpgrading",
            Reason::ConfigValidationFailed => "ConfigValidationFailed",
            Reason::DependencyNotReady => "DependencyNotReady",
            Reason::TransientError => "TransientError",
            Reason::DriftDetected => "DriftDetected",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Pending,
    Installing,
    Upgrading,
    Ready,
    Degraded,
    Failed,
    Deleting,
    Paused,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Phase::Pending => "Pending",
            Phase::Installing => "Installing",
            Phase::Upgrading => "Upgrading",
            Phase::Ready => "Ready",
            Phase::Degraded => "Degraded",
            Phase::Failed => "Failed",
            Phase::Deleting => "Deleting",
            Phase::Paused => "Paused",
        };
        write!(f, "{s}")
    }
}

/// Upsert `new` into `conds` by `type_`. Refreshes `last_transition_time` to
/// now only when status, reason, or message actually changed; otherwise the
/// existing transition time is kept. Returns the new list and whether
/// anything changed (callers use this to skip a redundant status write).
pub fn set(conds: &[Condition], mut new: Condition) -> (Vec<Condition>, bool) {
    let mut out = conds.to_vec();

    if let Some(existing) = out.iter_mut().find(|c| c.type_ == new.type_) {
        let unchanged = existing.status == new.status
            && existing.reason == new.reason
            && existing.message == new.message;

        if unchanged {
            // Preserve lastTransitionTime; still take the fresher observedGeneration.
            let changed = existing.observed_generation != new.observed_generation;
            existing.observed_generation = new.observed_generation;
            return (out, changed);
        }

        new.last_transition_time = Time(Utc::now());
        *existing = new;
        (out, true)
    } else {
        new.last_transition_time = Time(Utc::now());
        out.push(new);
        (out, true)
    }
}

pub fn get<'a>(conds: &'a [Condition], type_: &str) -> Option<&'a Condition> {
    conds.iter().find(|c| c.type_ == type_)
}

pub fn remove(conds: &[Condition], type_: &str) -> (Vec<Condition>, bool) {
    let original_len = conds.len();
    let out: Vec<Condition> = conds.iter().filter(|c| c.type_ != type_).cloned().collect();
    let removed = out.len() != original_len;
    (out, removed)
}

pub fn is_true(conds: &[Condition], type_: &str) -> bool {
    get(conds, type_).is_some_and(|c| c.status == "True")
}

fn new_condition(type_: &str, status: &str, reason: Reason, message: String, observed_generation: Option<i64>) -> Condition {
    Condition {
        type_: type_.to_string(),
        status: status.to_string(),
        reason: reason.to_string(),
        message,
        last_transition_time: Time(Utc::now()),
        observed_generation,
    }
}

/// Fold the `<Component>Ready` conditions of every enabled component into the
/// overall `Ready` condition, per the four-way disjunction:
/// empty -> Unknown/InProgress; all ready -> True/Ready; some ready ->
/// False/InProgress (naming the stragglers); none ready -> False/Failed.
pub fn aggregate_ready(
    enabled: &[String],
    component_conditions: &BTreeMap<String, Condition>,
    observed_generation: Option<i64>,
) -> Condition {
    if enabled.is_empty() {
        return new_condition(
            TYPE_READY,
            "Unknown",
            Reason::InProgress,
            "No components configured".to_string(),
            observed_generation,
        );
    }

    let mut ready = Vec::new();
    let mut not_ready = Vec::new();
    for name in enabled {
        let is_ready = component_conditions
            .get(name)
            .is_some_and(|c| c.status == "True");
        if is_ready {
            ready.push(name.clone());
        } else {
            not_ready.push(name.clone());
        }
    }

    if not_ready.is_empty() {
        new_condition(TYPE_READY, "True", Reason::Ready, "All components are ready".to_string(), observed_generation)
    } else if !ready.is_empty() {
        new_condition(
            TYPE_READY,
            "False",
            Reason::InProgress,
            format!("Waiting for: {}", not_ready.join(", ")),
            observed_generation,
        )
    } else {
        new_condition(
            TYPE_READY,
            "False",
            Reason::Failed,
            format!("Not ready: {}", not_ready.join(", ")),
            observed_generation,
        )
    }
}

/// Phase derivation. Evaluated in order; first match wins.
pub fn compute_phase(conds: &[Condition]) -> Phase {
    if is_true(conds, TYPE_ERROR) {
        return Phase::Failed;
    }
    if is_true(conds, TYPE_READY) && is_true(conds, TYPE_DEGRADED) {
        return Phase::Degraded;
    }
    if is_true(conds, TYPE_READY) {
        return Phase::Ready;
    }
    if let Some(progressing) = get(conds, TYPE_PROGRESSING) {
        if progressing.status == "True" {
            if progressing.reason == Reason::ComponentUpgrading.to_string() {
                return Phase::Upgrading;
            }
            if progressing.reason == Reason::Paused.to_string() {
                return Phase::Paused;
            }
            return Phase::Installing;
        }
    }
    Phase::Pending
}

/// Human-readable duration formatting used in condition messages and events.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m{}s", secs / 60, secs % 60)
    } else if secs < 86400 {
        format!("{}h{}m", secs / 3600, (secs % 3600) / 60)
    } else {
        format!("{}d{}h", secs / 86400, (secs % 86400) / 3600)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cond(type_: &str, status: &str, reason: &str, message: &str) -> Condition {
        Condition {
            type_: type_.to_string(),
            status: status.to_string(),
            reason: reason.to_string(),
            message: message.to_string(),
            last_transition_time: Time(Utc::now()),
            observed_generation: Some(1),
        }
    }

    #[test]
    fn set_adds_new_condition() {
        let (conds, changed) = set(&[], cond(TYPE_READY, "True", "Ready", "all good"));
        assert!(changed);
        assert_eq!(conds.len(), 1);
    }

    #[test]
    fn set_keeps_transition_time_when_unchanged() {
        let (conds, _) = set(&[], cond(TYPE_READY, "True", "Ready", "all good"));
        let original_time = conds[0].last_transition_time.0;

        std::thread::sleep(std::time::Duration::from_millis(5));
        let (conds2, changed) = set(&conds, cond(TYPE_READY, "True", "Ready", "all good"));
        assert!(!changed);
        assert_eq!(conds2[0].last_transition_time.0, original_time);
    }

    #[test]
    fn set_refreshes_transition_time_on_reason_change() {
        let (conds, _) = set(&[], cond(TYPE_READY, "False", "InProgress", "waiting"));
        let original_time = conds[0].last_transition_time.0;

        std::thread::sleep(std::time::Duration::from_millis(5));
        let (conds2, changed) = set(&conds, cond(TYPE_READY, "False", "Failed", "waiting"));
        assert!(changed);
        assert_ne!(conds2[0].last_transition_time.0, original_time);
    }

    #[test]
    fn remove_drops_matching_type() {
        let (conds, _) = set(&[], cond(TYPE_READY, "True", "Ready", "ok"));
        let (conds, removed) = remove(&conds, TYPE_READY);
        assert!(removed);
        assert!(conds.is_empty());
    }

    #[test]
    fn aggregate_empty_is_unknown() {
        let c = aggregate_ready(&[], &BTreeMap::new(), Some(1));
        assert_eq!(c.status, "Unknown");
        assert_eq!(c.reason, "InProgress");
    }

    #[test]
    fn aggregate_all_ready_is_true() {
        let mut m = BTreeMap::new();
        m.insert("metrics".to_string(), cond("MetricsReady", "True", "Ready", "ok"));
        m.insert("logs".to_string(), cond("LogsReady", "True", "Ready", "ok"));
        let c = aggregate_ready(&["metrics".to_string(), "logs".to_string()], &m, Some(1));
        assert_eq!(c.status, "True");
        assert_eq!(c.reason, "Ready");
    }

    #[test]
    fn aggregate_partial_is_in_progress() {
        let mut m = BTreeMap::new();
        m.insert("metrics".to_string(), cond("MetricsReady", "True", "Ready", "ok"));
        m.insert("logs".to_string(), cond("LogsReady", "False", "InProgress", "pending"));
        let c = aggregate_ready(&["metrics".to_string(), "logs".to_string()], &m, Some(1));
        assert_eq!(c.status, "False");
        assert_eq!(c.reason, "InProgress");
        assert!(c.message.contains("logs"));
    }

    #[test]
    fn aggregate_none_ready_is_failed() {
        let mut m = BTreeMap::new();
        m.insert("metrics".to_string(), cond("MetricsReady", "False", "Failed", "err"));
        let c = aggregate_ready(&["metrics".to_string()], &m, Some(1));
        assert_eq!(c.status, "False");
        assert_eq!(c.reason, "Failed");
    }

    #[test]
    fn phase_error_wins_first() {
        let conds = vec![cond(TYPE_ERROR, "True", "Fatal", "boom"), cond(TYPE_READY, "True", "Ready", "ok")];
        assert_eq!(compute_phase(&conds), Phase::Failed);
    }

    #[test]
    fn phase_ready_and_degraded() {
        let conds = vec![cond(TYPE_READY, "True", "Ready", "ok"), cond(TYPE_DEGRADED, "True", "TransientError", "flaky")];
        assert_eq!(compute_phase(&conds), Phase::Degraded);
    }

    #[test]
    fn phase_ready() {
        let conds = vec![cond(TYPE_READY, "True", "Ready", "ok")];
        assert_eq!(compute_phase(&conds), Phase::Ready);
    }

    #[test]
    fn phase_upgrading() {
        let conds = vec![cond(TYPE_PROGRESSING, "True", "ComponentUpgrading", "bumping version")];
        assert_eq!(compute_phase(&conds), Phase::Upgrading);
    }

    #[test]
    fn phase_installing() {
        let conds = vec![cond(TYPE_PROGRESSING, "True", "InProgress", "installing")];
        assert_eq!(compute_phase(&conds), Phase::Installing);
    }

    #[test]
    fn phase_default_pending() {
        assert_eq!(compute_phase(&[]), Phase::Pending);
    }

    #[test]
    fn duration_formatting_buckets() {
        assert_eq!(format_duration(Duration::from_secs(42)), "42s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m5s");
        assert_eq!(format_duration(Duration::from_secs(3 * 3600 + 61)), "3h1m");
        assert_eq!(format_duration(Duration::from_secs(2 * 86400 + 3600)), "2d1h");
    }

    #[test]
    fn component_ready_type_titlecases() {
        assert_eq!(component_ready_type("metrics"), "MetricsReady");
        assert_eq!(component_ready_type("visualization"), "VisualizationReady");
    }
}
