//! Collector configuration, read once from the environment at startup

use std::env;
use std::time::Duration;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";
pub const DEFAULT_DATABASE_URL: &str = "sqlite:///var/lib/watchtower/watchtower.db";

#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub bind_addr: String,
    pub database_url: String,
    /// Seeds the token table on first boot only
    pub bootstrap_token: Option<String>,
    /// Guards the admin routes; without it they answer 500
    pub admin_api_key: Option<String>,
    pub slack_webhook_url: Option<String>,
    pub notify_timeout: Duration,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            database_url: DEFAULT_DATABASE_URL.to_string(),
            bootstrap_token: None,
            admin_api_key: None,
            slack_webhook_url: None,
            notify_timeout: Duration::from_secs(5),
        }
    }
}

impl CollectorConfig {
    /// Load configuration from environment variables (and `.env`, if present)
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        Self {
            bind_addr: non_empty("WATCHTOWER_BIND").unwrap_or(defaults.bind_addr),
            database_url: non_empty("WATCHTOWER_DATABASE_URL").unwrap_or(defaults.database_url),
            bootstrap_token: non_empty("LOGIN_ALERT_TOKEN"),
            admin_api_key: non_empty("ADMIN_API_KEY"),
            slack_webhook_url: non_empty("SLACK_WEBHOOK_URL"),
            notify_timeout: non_empty("SLACK_TIMEOUT_SECONDS")
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.notify_timeout),
        }
    }
}

/// First four characters and the length, for logging secrets
pub fn mask_secret(secret: &str) -> String {
    if secret.is_empty() {
        return "<empty>".into();
    }
    let prefix = secret.chars().take(4).collect::<String>();
    format!("{}*** (len={})", prefix, secret.len())
}
