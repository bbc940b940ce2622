use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use log::error;
use serde::Serialize;
use serde_json::Value;
use std::fmt;

use crate::services::ingestion::IngestError;
use crate::services::token_authority::TokenError;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// Errors returned by the HTTP handlers
#[derive(Debug)]
pub enum ApiError {
    Unauthorized(String),
    /// The server cannot check credentials at all
    NotConfigured(String),
    Validation(Vec<String>),
    Internal(anyhow::Error),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Unauthorized(msg) => write!(f, "unauthorized: {}", msg),
            ApiError::NotConfigured(msg) => write!(f, "server misconfigured: {}", msg),
            ApiError::Validation(errors) => write!(f, "validation failed: {}", errors.join("; ")),
            ApiError::Internal(err) => write!(f, "internal error: {:#}", err),
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::NotConfigured(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let (error_message, code, details) = match self {
            ApiError::Unauthorized(msg) => (msg.clone(), "UNAUTHORIZED", None),
            ApiError::NotConfigured(msg) => (msg.clone(), "SERVER_MISCONFIGURED", None),
            ApiError::Validation(errors) => (
                "Validation failed".to_string(),
                "VALIDATION_ERROR",
                Some(serde_json::json!({ "errors": errors })),
            ),
            ApiError::Internal(err) => {
                error!("Internal server error: {:?}", err);
                ("Internal server error".to_string(), "INTERNAL_SERVER_ERROR", None)
            }
        };

        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: error_message,
            code: code.to_string(),
            details,
        })
    }
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Invalid => ApiError::Unauthorized("Invalid token".to_string()),
            TokenError::NotConfigured(msg) => ApiError::NotConfigured(msg),
            TokenError::Store(e) => ApiError::Internal(e.into()),
        }
    }
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::Unauthorized => ApiError::Unauthorized("Invalid token".to_string()),
            IngestError::NotConfigured(msg) => ApiError::NotConfigured(msg),
            IngestError::Validation(errors) => ApiError::Validation(errors),
            IngestError::Store(e) => ApiError::Internal(e.into()),
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::Internal(err.into())
    }
}
