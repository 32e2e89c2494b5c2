use actix_web::{get, web::Data, HttpRequest, HttpResponse, Responder};
use platform_core::controllers::State;

const LIVENESS_STALE_AFTER: std::time::Duration = std::time::Duration::from_secs(5 * 60);

/// Fails once the last successful reconcile is older than five minutes.
#[get("/healthz")]
pub async fn healthz(state: Data<State>, _req: HttpRequest) -> impl Responder {
    match state.last_reconcile_age().await {
        Some(age) if age > LIVENESS_STALE_AFTER => {
            HttpResponse::ServiceUnavailable().json(format!("last reconcile was {age:?} ago"))
        }
        Some(_) => HttpResponse::Ok().json("healthy"),
        None => HttpResponse::Ok().json("starting"),
    }
}

/// Gated on the readiness flag the controller flips once its first setup
/// pass has completed.
#[get("/readyz")]
pub async fn readyz(state: Data<State>, _req: HttpRequest) -> impl Responder {
    if state.is_ready() {
        HttpResponse::Ok().json("ready")
    } else {
        HttpResponse::ServiceUnavailable().json("not ready")
    }
}
