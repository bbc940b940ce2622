use actix_web::{HttpResponse, Responder};
use serde_json::json;

// Liveness check, no authentication
pub async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(json!({ "status": "ok" }))
}
