use actix_web::{middleware, web::Data, App, HttpServer};
use anyhow::Result;
use platform_core::controllers::State;

use crate::handlers::{health, index, metrics};

/// Configure and start the health/readiness/metrics/diagnostics HTTP
/// listener. Graceful-shutdown timeout carried over from the teacher
/// unchanged.
pub async fn start_server(state: State, bind_addr: &str) -> Result<()> {
    let bind_addr = bind_addr.to_string();
    let server = HttpServer::new(move || {
        App::new()
            .app_data(Data::new(state.clone()))
            .wrap(middleware::Logger::default().exclude("/healthz"))
            .service(index::index)
            .service(health::healthz)
            .service(health::readyz)
            .service(metrics::metrics)
    })
    .bind(bind_addr)?
    .shutdown_timeout(5);

    server.run().await?;
    Ok(())
}
