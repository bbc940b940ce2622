use chrono::Utc;
use log::{debug, info, warn};
use sqlx::SqlitePool;
use std::sync::Arc;
use thiserror::Error;

use crate::models::event::{LoginEventIn, StoredLoginEvent};
use crate::repositories::events;
use crate::services::notifier::Notifier;
use crate::services::token_authority::{TokenAuthority, TokenError};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("invalid or missing token")]
    Unauthorized,

    #[error("server misconfigured: {0}")]
    NotConfigured(String),

    #[error("invalid event: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("failed to store event: {0}")]
    Store(#[from] sqlx::Error),
}

impl From<TokenError> for IngestError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Invalid => IngestError::Unauthorized,
            TokenError::NotConfigured(msg) => IngestError::NotConfigured(msg),
            TokenError::Store(e) => IngestError::Store(e),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Accepted {
    pub id: i64,
}

/// Authenticates, validates, stores and fans out agent events.
///
/// Events are never deduplicated: a retried delivery produces a second row.
pub struct IngestionService {
    pool: SqlitePool,
    authority: Arc<TokenAuthority>,
    notifier: Arc<dyn Notifier>,
}

impl IngestionService {
    pub fn new(pool: SqlitePool, authority: Arc<TokenAuthority>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            pool,
            authority,
            notifier,
        }
    }

    /// Ingest a raw request body. A body that does not parse is reported as
    /// a validation failure only to callers holding the current token.
    pub async fn ingest_json(&self, body: &[u8], token: Option<&str>) -> Result<Accepted, IngestError> {
        match serde_json::from_slice::<LoginEventIn>(body) {
            Ok(payload) => self.ingest(payload, token).await,
            Err(e) => {
                self.authority.verify(token)?;
                warn!("Rejected malformed login event body: {}", e);
                Err(IngestError::Validation(vec![format!("body: {}", e)]))
            }
        }
    }

    /// Store an authenticated and valid event, then fan it out in the background
    pub async fn ingest(&self, payload: LoginEventIn, token: Option<&str>) -> Result<Accepted, IngestError> {
        self.authority.verify(token)?;

        let event = payload.validate().map_err(|problems| {
            warn!("Rejected login event with data-quality problems: {}", problems.join("; "));
            IngestError::Validation(problems)
        })?;

        let stored = events::insert_event(&self.pool, &event, Utc::now()).await?;
        info!(
            "Stored login event id={} user={} host={} from {}:{}",
            stored.id, stored.user, stored.hostname, stored.source_ip, stored.source_port
        );

        let id = stored.id;
        self.notify_detached(stored);
        Ok(Accepted { id })
    }

    fn notify_detached(&self, event: StoredLoginEvent) {
        let notifier = Arc::clone(&self.notifier);
        tokio::spawn(async move {
            match notifier.notify(&event).await {
                Ok(()) => debug!("Notification sent for event id={}", event.id),
                Err(e) => warn!("Failed to send notification for event id={}: {:#}", event.id, e),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_pool;
    use crate::services::notifier::NoopNotifier;
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct FailingNotifier;

    #[async_trait]
    impl Notifier for FailingNotifier {
        async fn notify(&self, _event: &StoredLoginEvent) -> anyhow::Result<()> {
            anyhow::bail!("webhook unreachable")
        }
    }

    struct RecordingNotifier(mpsc::UnboundedSender<i64>);

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, event: &StoredLoginEvent) -> anyhow::Result<()> {
            self.0.send(event.id)?;
            Ok(())
        }
    }

    const BODY: &str = r#"{"type": "user_login", "timestamp": "2025-03-01T12:30:00+00:00",
        "hostname": "bastion-1", "user": "jaye", "method": "publickey",
        "source_ip": "10.0.0.5", "source_port": "54321",
        "raw_message": "Accepted publickey for jaye from 10.0.0.5 port 54321 ssh2"}"#;

    async fn service(notifier: Arc<dyn Notifier>) -> (IngestionService, SqlitePool) {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        let authority = Arc::new(TokenAuthority::load(pool.clone(), Some("secret")).await.unwrap());
        (IngestionService::new(pool.clone(), authority, notifier), pool)
    }

    #[tokio::test]
    async fn test_identical_events_get_distinct_ids() {
        let (service, pool) = service(Arc::new(NoopNotifier)).await;

        let first = service.ingest_json(BODY.as_bytes(), Some("secret")).await.unwrap();
        let second = service.ingest_json(BODY.as_bytes(), Some("secret")).await.unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!(events::count_events(&pool).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_missing_user_is_rejected_without_storing() {
        let (service, pool) = service(Arc::new(NoopNotifier)).await;
        let mut body: serde_json::Value = serde_json::from_str(BODY).unwrap();
        body.as_object_mut().unwrap().remove("user");

        let result = service.ingest_json(body.to_string().as_bytes(), Some("secret")).await;

        match result {
            Err(IngestError::Validation(problems)) => assert_eq!(problems, vec!["user: field required"]),
            other => panic!("expected validation failure, got {:?}", other),
        }
        assert_eq!(events::count_events(&pool).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_token_is_checked_before_body() {
        let (service, pool) = service(Arc::new(NoopNotifier)).await;

        let wrong = service.ingest_json(b"not json", Some("wrong")).await;
        assert!(matches!(wrong, Err(IngestError::Unauthorized)));

        let missing = service.ingest_json(BODY.as_bytes(), None).await;
        assert!(matches!(missing, Err(IngestError::Unauthorized)));

        let malformed = service.ingest_json(b"not json", Some("secret")).await;
        assert!(matches!(malformed, Err(IngestError::Validation(_))));
        assert_eq!(events::count_events(&pool).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_ingest_checks_token_before_fields() {
        let (service, pool) = service(Arc::new(NoopNotifier)).await;

        let unauthenticated = service.ingest(LoginEventIn::default(), Some("wrong")).await;
        assert!(matches!(unauthenticated, Err(IngestError::Unauthorized)));

        let incomplete = service.ingest(LoginEventIn::default(), Some("secret")).await;
        match incomplete {
            Err(IngestError::Validation(problems)) => assert_eq!(problems.len(), 8),
            other => panic!("expected validation failure, got {:?}", other),
        }

        let payload: LoginEventIn = serde_json::from_str(BODY).unwrap();
        let accepted = service.ingest(payload, Some("secret")).await.unwrap();
        assert!(accepted.id > 0);
        assert_eq!(events::count_events(&pool).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unseeded_authority_reports_misconfiguration() {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        let authority = Arc::new(TokenAuthority::new(pool.clone()));
        let service = IngestionService::new(pool, authority, Arc::new(NoopNotifier));

        let result = service.ingest_json(BODY.as_bytes(), Some("secret")).await;
        assert!(matches!(result, Err(IngestError::NotConfigured(_))));
    }

    #[tokio::test]
    async fn test_notification_failure_does_not_affect_acceptance() {
        let (service, pool) = service(Arc::new(FailingNotifier)).await;

        let accepted = service.ingest_json(BODY.as_bytes(), Some("secret")).await.unwrap();

        assert!(accepted.id > 0);
        assert_eq!(events::count_events(&pool).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_accepted_event_is_fanned_out() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (service, _pool) = service(Arc::new(RecordingNotifier(tx))).await;

        let accepted = service.ingest_json(BODY.as_bytes(), Some("secret")).await.unwrap();

        let notified = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap();
        assert_eq!(notified, Some(accepted.id));
    }
}
