//! HTTP delivery of login events to the collector

use crate::errors::{AgentError, Result};
use crate::event::LoginAttemptEvent;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, Response, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

/// Header the collector reads the shared bearer token from
pub const TOKEN_HEADER: &str = "X-Login-Alert-Token";

/// Attempt budget and back-off schedule for a single event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Pause after the first failed attempt; doubled after each further failure
    pub initial_backoff: Duration,
    /// Upper bound on one request, independent of the retry budget
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(2),
            attempt_timeout: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Pause that follows failed attempt number `attempt` (1-based)
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        self.initial_backoff
            .saturating_mul(2_u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

/// Final result of delivering one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered {
        attempts: u32,
        /// Identifier assigned by the collector, when its response carried one
        event_id: Option<i64>,
        backoffs: Vec<Duration>,
    },
    /// Retry budget exhausted; the event is gone apart from the error log line
    Dropped {
        attempts: u32,
        last_error: String,
        backoffs: Vec<Duration>,
    },
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            DeliveryOutcome::Delivered { attempts, .. } | DeliveryOutcome::Dropped { attempts, .. } => *attempts,
        }
    }

    pub fn backoffs(&self) -> &[Duration] {
        match self {
            DeliveryOutcome::Delivered { backoffs, .. } | DeliveryOutcome::Dropped { backoffs, .. } => backoffs,
        }
    }
}

/// Destination for detected login events
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Never fails: exhaustion is reported as [`DeliveryOutcome::Dropped`]
    async fn deliver(&self, event: &LoginAttemptEvent) -> DeliveryOutcome;
}

/// Authenticated HTTP client with bounded retries and exponential back-off
#[derive(Debug, Clone)]
pub struct DeliveryClient {
    client: Client,
    collector_url: String,
    policy: RetryPolicy,
}

impl DeliveryClient {
    pub fn new(collector_url: String, token: &str, verify_tls: bool, policy: RetryPolicy) -> Result<Self> {
        let mut token_value = HeaderValue::from_str(token)
            .map_err(|_| AgentError::Config("token contains characters not allowed in an HTTP header".to_string()))?;
        token_value.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(TOKEN_HEADER, token_value);

        let client = Client::builder()
            .timeout(policy.attempt_timeout)
            .user_agent(format!("watchtower_agent/{}", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .danger_accept_invalid_certs(!verify_tls)
            .build()?;

        Ok(Self {
            client,
            collector_url,
            policy,
        })
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Deliver one event, retrying failed attempts until the budget is spent
    pub async fn deliver(&self, event: &LoginAttemptEvent) -> DeliveryOutcome {
        let mut backoffs = Vec::new();
        let mut last_error = None;

        for attempt in 1..=self.policy.max_attempts {
            match self.attempt(event).await {
                Ok(event_id) => {
                    info!(
                        user = %event.user,
                        source = %event.source(),
                        attempt,
                        event_id,
                        "Sent login event"
                    );
                    return DeliveryOutcome::Delivered {
                        attempts: attempt,
                        event_id,
                        backoffs,
                    };
                }
                Err(e) => {
                    if attempt < self.policy.max_attempts {
                        let backoff = self.policy.backoff_after(attempt);
                        warn!(
                            "Error sending event (attempt {}/{}), retrying in {:?}: {}",
                            attempt, self.policy.max_attempts, backoff, e
                        );
                        sleep(backoff).await;
                        backoffs.push(backoff);
                    } else {
                        warn!(
                            "Error sending event (attempt {}/{}): {}",
                            attempt, self.policy.max_attempts, e
                        );
                    }
                    last_error = Some(e);
                }
            }
        }

        let last_error = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no delivery attempt was made".to_string());

        error!(
            user = %event.user,
            source_ip = %event.source_ip,
            source_port = %event.source_port,
            hostname = %event.hostname,
            event_timestamp = %event.event_timestamp,
            "Failed to send event after {} attempts; dropping: {}",
            self.policy.max_attempts,
            last_error
        );

        DeliveryOutcome::Dropped {
            attempts: self.policy.max_attempts,
            last_error,
            backoffs,
        }
    }

    /// Single attempt to send an event
    async fn attempt(&self, event: &LoginAttemptEvent) -> Result<Option<i64>> {
        let response = timeout(
            self.policy.attempt_timeout,
            self.client.post(&self.collector_url).json(event).send(),
        )
        .await
        .map_err(|_| AgentError::Transport("Request timeout".to_string()))??;

        self.handle_response(response).await
    }

    /// Any 2xx is a delivery; everything else is a failed attempt
    async fn handle_response(&self, response: Response) -> Result<Option<i64>> {
        let status = response.status();

        if status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let event_id = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|json| json["id"].as_i64());

            match status {
                StatusCode::OK | StatusCode::CREATED => {
                    debug!("Collector accepted event id={:?}", event_id)
                }
                _ => warn!(
                    "Collector accepted event with unexpected status {}: {}",
                    status, body
                ),
            }
            return Ok(event_id);
        }

        let error_body = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());

        let error_message = match status.as_u16() {
            401 => format!("Collector rejected the token: {}", error_body),
            422 => format!("Collector rejected the event as invalid: {}", error_body),
            429 => format!("Rate limited by collector: {}", error_body),
            500..=599 => format!("Collector server error {}: {}", status, error_body),
            _ => format!("Unexpected response {}: {}", status, error_body),
        };

        Err(AgentError::Transport(error_message))
    }
}

#[async_trait]
impl EventSink for DeliveryClient {
    async fn deliver(&self, event: &LoginAttemptEvent) -> DeliveryOutcome {
        DeliveryClient::deliver(self, event).await
    }
}
