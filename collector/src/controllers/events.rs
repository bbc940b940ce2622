use actix_web::{HttpRequest, HttpResponse, web};
use chrono::Utc;
use log::info;

use crate::controllers::admin::require_admin;
use crate::errors::ApiError;
use crate::models::event::{EventQuery, IngestResponse};
use crate::repositories::events;
use crate::state::AppState;

pub const TOKEN_HEADER: &str = "X-Login-Alert-Token";

// Accept a login event from an agent
pub async fn ingest_login_event(
    req: HttpRequest,
    body: web::Bytes,
    data: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let token = req.headers().get(TOKEN_HEADER).and_then(|v| v.to_str().ok());
    let accepted = data.ingestion.ingest_json(&body, token).await?;

    Ok(HttpResponse::Created().json(IngestResponse {
        status: "ok",
        id: accepted.id,
    }))
}

// Query stored events, newest first
pub async fn list_events(req: HttpRequest, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    require_admin(&req, &data)?;

    let query = web::Query::<EventQuery>::from_query(req.query_string())
        .map_err(|e| ApiError::Validation(vec![e.to_string()]))?
        .into_inner();
    let filter = query.into_filter(Utc::now()).map_err(ApiError::Validation)?;

    let rows = events::list_events(&data.pool, &filter).await?;
    info!("Returning {} login events", rows.len());

    Ok(HttpResponse::Ok().json(rows))
}
