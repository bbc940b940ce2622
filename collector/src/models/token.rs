use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `api_tokens` table. Rows are never deleted; the newest one
/// is the token agents must present.
#[derive(Debug, Clone, FromRow)]
pub struct ApiToken {
    pub id: i64,
    pub token: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct RotateTokenResponse {
    pub new_token: String,
    pub created_at: DateTime<Utc>,
}

impl From<ApiToken> for RotateTokenResponse {
    fn from(row: ApiToken) -> Self {
        Self {
            new_token: row.token,
            created_at: row.created_at,
        }
    }
}
