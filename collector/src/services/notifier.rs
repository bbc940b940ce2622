use anyhow::{Context, Result};
use async_trait::async_trait;
use log::info;
use reqwest::Client as HttpClient;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use crate::models::event::StoredLoginEvent;

/// Fan-out target for accepted login events
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &StoredLoginEvent) -> Result<()>;
}

/// Posts a message to a Slack incoming webhook
pub struct SlackNotifier {
    webhook_url: String,
    http_client: HttpClient,
}

impl SlackNotifier {
    pub fn new(webhook_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http_client = HttpClient::builder()
            .timeout(timeout)
            .build()
            .context("failed to build Slack HTTP client")?;

        Ok(Self {
            webhook_url: webhook_url.into(),
            http_client,
        })
    }
}

pub fn slack_text(event: &StoredLoginEvent) -> String {
    format!(
        ":warning: *Login detected*\n*Host*: `{}`\n*User*: `{}`\n*From*: `{}:{}`\n*Method*: `{}`\n*Event time*: `{}`",
        event.hostname, event.user, event.source_ip, event.source_port, event.method, event.event_timestamp
    )
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn notify(&self, event: &StoredLoginEvent) -> Result<()> {
        self.http_client
            .post(&self.webhook_url)
            .json(&json!({ "text": slack_text(event) }))
            .send()
            .await
            .context("Slack webhook request failed")?
            .error_for_status()
            .context("Slack webhook rejected notification")?;
        Ok(())
    }
}

/// Used when no webhook is configured
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, _event: &StoredLoginEvent) -> Result<()> {
        Ok(())
    }
}

pub fn notifier_from_config(webhook_url: Option<&str>, timeout: Duration) -> Result<Arc<dyn Notifier>> {
    match webhook_url {
        Some(url) => {
            info!("Slack notifications enabled");
            Ok(Arc::new(SlackNotifier::new(url, timeout)?))
        }
        None => {
            info!("SLACK_WEBHOOK_URL not set; notifications disabled");
            Ok(Arc::new(NoopNotifier))
        }
    }
}
