use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::models::token::ApiToken;

/// Most recently inserted token row, if any. Insertion order decides, not
/// `created_at`, so a clock step cannot revive a superseded token.
pub async fn latest_token(pool: &SqlitePool) -> Result<Option<ApiToken>, sqlx::Error> {
    sqlx::query_as::<_, ApiToken>(
        r#"
        SELECT id, token, created_at
        FROM api_tokens
        ORDER BY id DESC
        LIMIT 1
        "#,
    )
    .fetch_optional(pool)
    .await
}

pub async fn insert_token(
    pool: &SqlitePool,
    token: &str,
    created_at: DateTime<Utc>,
) -> Result<ApiToken, sqlx::Error> {
    sqlx::query_as::<_, ApiToken>(
        r#"
        INSERT INTO api_tokens (token, created_at)
        VALUES (?, ?)
        RETURNING id, token, created_at
        "#,
    )
    .bind(token)
    .bind(created_at)
    .fetch_one(pool)
    .await
}

pub async fn count_tokens(pool: &SqlitePool) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM api_tokens")
        .fetch_one(pool)
        .await
}
