//! `EventSink` backed by the real Kubernetes events API, grounded on the
//! teacher's `Recorder::new(client, reporter)` / `recorder.publish(...)`
//! idiom (`cluster_controller.rs`'s `cleanup` method). `record` is
//! synchronous per the trait; publishing is fire-and-forget on a spawned
//! task since the apiserver call itself is async.

use kube::core::{ObjectMeta, ObjectReference};
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::Client;
use tracing::warn;

use crate::capabilities::{EventKind, EventSink};

const API_VERSION: &str = "observability.io/v1";
const KIND: &str = "ObservabilityPlatform";

pub struct KubeEventSink {
    client: Client,
    reporter: Reporter,
}

impl KubeEventSink {
    pub fn new(client: Client, reporter: impl Into<Reporter>) -> Self {
        KubeEventSink {
            client,
            reporter: reporter.into(),
        }
    }
}

impl EventSink for KubeEventSink {
    fn record(&self, object: &ObjectMeta, kind: EventKind, reason: &str, message: &str) {
        let recorder = Recorder::new(self.client.clone(), self.reporter.clone());
        let object_ref = ObjectReference {
            api_version: Some(API_VERSION.to_string()),
            kind: Some(KIND.to_string()),
            name: object.name.clone(),
            namespace: object.namespace.clone(),
            uid: object.uid.clone(),
            ..Default::default()
        };

        let event = Event {
            type_: match kind {
                EventKind::Normal => EventType::Normal,
                EventKind::Warning => EventType::Warning,
            },
            reason: reason.to_string(),
            note: Some(message.to_string()),
            action: reason.to_string(),
            secondary: None,
        };

        tokio::spawn(async move {
            if let Err(e) = recorder.publish(&event, &object_ref).await {
                warn!(error = %e, "failed to publish Kubernetes event");
            }
        });
    }
}
