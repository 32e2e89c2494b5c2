pub mod context;
#[cfg(feature = "drift")]
pub mod drift;
pub mod finalizers;
pub mod kube_events;
pub mod pipeline;
pub mod reconcile;
pub mod status_writer;

pub use context::{Context, State};
pub use kube_events::KubeEventSink;
pub use reconcile::{reconcile, run};
pub use status_writer::StatusWriter;
