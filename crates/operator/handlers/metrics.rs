use actix_web::{get, web::Data, HttpRequest, HttpResponse, Responder};
use platform_core::controllers::State;
use prometheus::{Encoder, TextEncoder};

#[get("/metrics")]
pub async fn metrics(state: Data<State>, _req: HttpRequest) -> impl Responder {
    let families = state.metrics_families();
    let encoder = TextEncoder::new();
    let mut buffer = vec![];
    encoder.encode(&families, &mut buffer).unwrap();
    HttpResponse::Ok().body(buffer)
}
