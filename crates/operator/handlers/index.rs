use actix_web::{get, web::Data, HttpRequest, HttpResponse, Responder};
use platform_core::controllers::State;
use serde::Serialize;

#[derive(Serialize)]
struct IndexResponse {
    ready: bool,
    last_reconcile_age_secs: Option<u64>,
    recent_events: Vec<EventSummary>,
}

#[derive(Serialize)]
struct EventSummary {
    platform: String,
    kind: &'static str,
    reason: String,
    message: String,
}

#[get("/")]
pub async fn index(state: Data<State>, _req: HttpRequest) -> impl Responder {
    let recent_events = state
        .recent_events()
        .await
        .into_iter()
        .rev()
        .take(50)
        .map(|e| EventSummary {
            platform: e.platform,
            kind: e.kind,
            reason: e.reason,
            message: e.message,
        })
        .collect();

    let response = IndexResponse {
        ready: state.is_ready(),
        last_reconcile_age_secs: state.last_reconcile_age().await.map(|d| d.as_secs()),
        recent_events,
    };

    HttpResponse::Ok().json(&response)
}
