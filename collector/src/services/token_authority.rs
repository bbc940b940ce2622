//! Shared-secret authority for agent requests.
//!
//! The current token lives in memory behind a read-write lock so that
//! verification never sees a half-applied rotation. Rotations are serialized
//! with an async mutex, which keeps the in-memory value equal to the newest
//! row in `api_tokens`.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use log::{info, warn};
use sqlx::SqlitePool;
use std::sync::{PoisonError, RwLock};
use subtle::ConstantTimeEq;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::models::token::ApiToken;
use crate::repositories::tokens;

const TOKEN_BYTES: usize = 32;

#[derive(Debug, Error)]
pub enum TokenError {
    /// No current token could be established
    #[error("token authority not configured: {0}")]
    NotConfigured(String),

    #[error("invalid token")]
    Invalid,

    #[error("token store error: {0}")]
    Store(#[from] sqlx::Error),
}

pub struct TokenAuthority {
    pool: SqlitePool,
    current: RwLock<Option<String>>,
    rotation: Mutex<()>,
}

impl TokenAuthority {
    /// An authority with no current token. Every verification fails until
    /// [`TokenAuthority::seed_if_absent`] succeeds.
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            current: RwLock::new(None),
            rotation: Mutex::new(()),
        }
    }

    /// Build an authority and establish its current token from the store
    pub async fn load(pool: SqlitePool, bootstrap: Option<&str>) -> Result<Self, TokenError> {
        let authority = Self::new(pool);
        authority.seed_if_absent(bootstrap).await?;
        Ok(authority)
    }

    pub fn current(&self) -> Option<String> {
        self.current.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Load the newest stored token, or persist `bootstrap` when the store
    /// holds none. A bootstrap value is ignored once any token exists.
    pub async fn seed_if_absent(&self, bootstrap: Option<&str>) -> Result<String, TokenError> {
        let _guard = self.rotation.lock().await;

        if let Some(existing) = tokens::latest_token(&self.pool).await? {
            if bootstrap.is_some_and(|b| b != existing.token) {
                info!("Ignoring bootstrap token; token table already seeded (id={})", existing.id);
            }
            self.set_current(existing.token.clone());
            return Ok(existing.token);
        }

        let bootstrap = bootstrap.map(str::trim).filter(|b| !b.is_empty()).ok_or_else(|| {
            TokenError::NotConfigured("token table is empty and no bootstrap token was supplied".to_string())
        })?;

        let row = tokens::insert_token(&self.pool, bootstrap, Utc::now()).await?;
        info!("Seeded token table from bootstrap token (id={})", row.id);
        self.set_current(row.token.clone());
        Ok(row.token)
    }

    /// Mint, persist and switch to a fresh token
    pub async fn rotate(&self) -> Result<ApiToken, TokenError> {
        let _guard = self.rotation.lock().await;

        let row = tokens::insert_token(&self.pool, &generate_token(), Utc::now()).await?;
        self.set_current(row.token.clone());
        info!("Rotated login alert token (id={})", row.id);
        Ok(row)
    }

    /// Check a presented token against the current one.
    ///
    /// Fails closed: without a current token every caller is rejected with
    /// [`TokenError::NotConfigured`].
    pub fn verify(&self, candidate: Option<&str>) -> Result<(), TokenError> {
        let current = self.current.read().unwrap_or_else(PoisonError::into_inner);
        let Some(expected) = current.as_deref() else {
            warn!("Rejecting request: no current token is configured");
            return Err(TokenError::NotConfigured("no current token".to_string()));
        };

        match candidate {
            Some(candidate) if constant_time_eq(candidate, expected) => Ok(()),
            _ => Err(TokenError::Invalid),
        }
    }

    fn set_current(&self, token: String) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(token);
    }
}

/// 32 random bytes, URL-safe base64 without padding
pub fn generate_token() -> String {
    let bytes: [u8; TOKEN_BYTES] = rand::random();
    URL_SAFE_NO_PAD.encode(bytes)
}

pub fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}
