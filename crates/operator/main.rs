use std::collections::BTreeMap;
use std::sync::Arc;

use clap::Parser;
use kube::api::{Api, ListParams};
use kube::Client;
use platform_core::api::v1::{ObservabilityPlatform, COMPONENT_NAMES};
use platform_core::capabilities::ComponentRenderer;
use platform_core::controllers::{reconcile, KubeEventSink, State, StatusWriter};
use platform_core::testing::NoopRenderer;
use platform_core::util::telemetry::{self, LogFormat};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

mod config;
mod handlers;
mod server;

use config::OperatorConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = OperatorConfig::parse();

    let log_format: LogFormat = config.log_format.parse().map_err(|e: String| anyhow::anyhow!(e))?;
    telemetry::init(log_format).await;

    let client = Client::try_default().await?;

    // Fail fast with a legible message if the CRD isn't installed, rather
    // than surfacing an opaque 404 from the first reconcile.
    let platforms: Api<ObservabilityPlatform> = Api::all(client.clone());
    if let Err(e) = platforms.list(&ListParams::default().limit(1)).await {
        error!(
            error = %e,
            "failed to list ObservabilityPlatform resources; is the CRD installed? \
             run `crdgen | kubectl apply -f -`"
        );
        return Err(e.into());
    }

    let state = State::default();

    let mut renderers: BTreeMap<String, Arc<dyn ComponentRenderer>> = BTreeMap::new();
    for name in COMPONENT_NAMES {
        renderers.insert(name.to_string(), Arc::new(NoopRenderer) as Arc<dyn ComponentRenderer>);
    }

    let event_sink = Arc::new(KubeEventSink::new(client.clone(), "observability-platform-operator"));
    let ctx = state.to_context(client.clone(), renderers, event_sink.clone());
    let status_writer = Arc::new(StatusWriter::spawn(client.clone(), state.clone(), ctx.metrics.clone(), event_sink));

    let cancel = CancellationToken::new();

    let controller = reconcile::run(client.clone(), ctx.clone(), status_writer.clone(), config.concurrency, cancel.clone());

    #[cfg(feature = "drift")]
    let drift_task = platform_core::controllers::drift::run_drift_task(
        client.clone(),
        ctx.clone(),
        status_writer.clone(),
        config.drift_check_interval_secs,
        cancel.clone(),
    );
    #[cfg(not(feature = "drift"))]
    let drift_task = std::future::pending::<()>();

    let server = server::start_server(state, &config.health_bind_addr);

    info!("observability-platform-operator starting up");

    tokio::select! {
        _ = controller => info!("controller loop exited"),
        _ = drift_task => info!("drift task exited"),
        res = server => {
            res?;
            info!("http server exited");
        }
    }

    cancel.cancel();
    Ok(())
}
