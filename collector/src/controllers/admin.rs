use actix_web::{HttpRequest, HttpResponse, web};
use log::warn;

use crate::errors::ApiError;
use crate::models::token::RotateTokenResponse;
use crate::services::token_authority::constant_time_eq;
use crate::state::AppState;

pub const ADMIN_HEADER: &str = "X-Admin-Api-Key";

/// Admin routes answer 500 while no admin key is configured
pub fn require_admin(req: &HttpRequest, state: &AppState) -> Result<(), ApiError> {
    let Some(expected) = state.admin_api_key.as_deref() else {
        warn!("Admin request to {} refused: ADMIN_API_KEY not set", req.path());
        return Err(ApiError::NotConfigured("Admin API key not configured".to_string()));
    };

    let presented = req.headers().get(ADMIN_HEADER).and_then(|v| v.to_str().ok());
    match presented {
        Some(key) if constant_time_eq(key, expected) => Ok(()),
        _ => {
            warn!("Admin request to {} refused: invalid admin key", req.path());
            Err(ApiError::Unauthorized("Invalid admin key".to_string()))
        }
    }
}

// Mint a new login alert token; the previous one stops working immediately
pub async fn rotate_token(req: HttpRequest, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    require_admin(&req, &data)?;

    let row = data.authority.rotate().await?;
    Ok(HttpResponse::Ok().json(RotateTokenResponse::from(row)))
}
