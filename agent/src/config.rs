//! Configuration management for the login-watch agent
//!
//! Every setting is read from the environment (or the matching CLI flag) once
//! at startup and then passed around as an immutable value.

use clap::Parser;
use clap::builder::BoolishValueParser;
use std::time::Duration;

use crate::delivery::RetryPolicy;
use crate::event::EventContext;
use crate::host;

#[derive(Debug, Clone, Parser)]
#[command(name = "watchtower_agent", version, about = "Ships successful SSH logins to a Watchtower collector")]
pub struct Config {
    /// URL of the collector's ingestion endpoint
    #[arg(long, env = "WATCHTOWER_COLLECTOR_URL")]
    pub collector_url: String,

    /// Shared bearer token presented to the collector
    #[arg(long, env = "WATCHTOWER_TOKEN", hide_env_values = true)]
    pub token: String,

    /// Verify the collector's TLS certificate
    #[arg(
        long,
        env = "WATCHTOWER_VERIFY_TLS",
        default_value_t = true,
        action = clap::ArgAction::Set,
        value_parser = BoolishValueParser::new()
    )]
    pub verify_tls: bool,

    /// systemd unit whose journal is followed
    #[arg(long, env = "WATCHTOWER_SSH_UNIT", default_value = "ssh.service")]
    pub ssh_unit: String,

    #[arg(long, env = "WATCHTOWER_REGION")]
    pub region: Option<String>,

    #[arg(long, env = "WATCHTOWER_HOST_GROUP")]
    pub host_group: Option<String>,

    #[arg(long, env = "WATCHTOWER_SEVERITY", default_value = "info")]
    pub severity: String,

    /// Mark every reported login as flagged
    #[arg(
        long,
        env = "WATCHTOWER_FLAGGED",
        default_value_t = false,
        action = clap::ArgAction::Set,
        value_parser = BoolishValueParser::new()
    )]
    pub flagged: bool,

    /// Override the reported hostname (defaults to the system hostname)
    #[arg(long, env = "WATCHTOWER_HOSTNAME")]
    pub hostname: Option<String>,

    /// Delivery attempts per event before it is dropped
    #[arg(long, env = "WATCHTOWER_MAX_ATTEMPTS", default_value_t = 3)]
    pub max_attempts: u32,

    /// First back-off between failed attempts, doubled after each failure
    #[arg(long, env = "WATCHTOWER_INITIAL_BACKOFF_SECONDS", default_value_t = 2)]
    pub initial_backoff_secs: u64,

    /// Timeout of a single delivery attempt
    #[arg(long, env = "WATCHTOWER_HTTP_TIMEOUT_SECONDS", default_value_t = 5)]
    pub http_timeout_secs: u64,

    /// Events waiting for delivery before the follower blocks
    #[arg(long, env = "WATCHTOWER_QUEUE_CAPACITY", default_value_t = 256)]
    pub queue_capacity: usize,

    /// Pause after the log stream ends before it is restarted
    #[arg(long, env = "WATCHTOWER_RESTART_DELAY_SECONDS", default_value_t = 2)]
    pub restart_delay_secs: u64,

    /// Pause after an unexpected follower error before it is restarted
    #[arg(long, env = "WATCHTOWER_ERROR_RESTART_DELAY_SECONDS", default_value_t = 5)]
    pub error_restart_delay_secs: u64,
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.collector_url.trim().is_empty() {
            return Err("collector_url cannot be empty".to_string());
        }

        if !self.collector_url.starts_with("http://") && !self.collector_url.starts_with("https://") {
            return Err(format!(
                "collector_url must be an http(s) URL, got '{}'",
                self.collector_url
            ));
        }

        if self.token.trim().is_empty() {
            return Err("token cannot be empty".to_string());
        }

        if self.ssh_unit.trim().is_empty() {
            return Err("ssh_unit cannot be empty".to_string());
        }

        if self.max_attempts == 0 {
            return Err("max_attempts must be greater than 0".to_string());
        }

        if self.http_timeout_secs == 0 {
            return Err("http_timeout must be greater than 0".to_string());
        }

        if self.queue_capacity == 0 {
            return Err("queue_capacity must be greater than 0".to_string());
        }

        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_backoff: Duration::from_secs(self.initial_backoff_secs),
            attempt_timeout: Duration::from_secs(self.http_timeout_secs),
        }
    }

    pub fn restart_delay(&self) -> Duration {
        Duration::from_secs(self.restart_delay_secs)
    }

    pub fn error_restart_delay(&self) -> Duration {
        Duration::from_secs(self.error_restart_delay_secs)
    }

    /// Metadata stamped onto every event this agent reports
    pub fn event_context(&self) -> EventContext {
        let hostname = match self.hostname.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => host::system_hostname(),
        };

        EventContext {
            hostname,
            region: non_blank(&self.region),
            host_group: non_blank(&self.host_group),
            severity: Some(self.severity.clone()).filter(|s| !s.trim().is_empty()),
            flagged: self.flagged,
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.trim().is_empty()).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        let mut argv = vec!["watchtower_agent"];
        argv.extend_from_slice(args);
        Config::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults_match_delivery_constants() {
        let config = parse(&[
            "--collector-url",
            "https://collector.example:8000/login",
            "--token",
            "secret",
            "--hostname",
            "bastion-1",
        ]);

        assert!(config.validate().is_ok());
        assert!(config.verify_tls);
        assert!(!config.flagged);
        assert_eq!(config.ssh_unit, "ssh.service");

        let policy = config.retry_policy();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.initial_backoff, Duration::from_secs(2));
        assert_eq!(policy.attempt_timeout, Duration::from_secs(5));
        assert_eq!(config.restart_delay(), Duration::from_secs(2));
        assert_eq!(config.error_restart_delay(), Duration::from_secs(5));
    }

    #[test]
    fn test_boolish_toggles() {
        let config = parse(&[
            "--collector-url",
            "http://localhost:8000/login",
            "--token",
            "secret",
            "--verify-tls",
            "false",
            "--flagged",
            "yes",
        ]);

        assert!(!config.verify_tls);
        assert!(config.flagged);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = parse(&["--collector-url", "http://localhost:8000/login", "--token", "secret"]);

        config.collector_url = "collector:8000".to_string();
        assert!(config.validate().is_err());

        config.collector_url = "http://localhost:8000/login".to_string();
        config.token = "  ".to_string();
        assert!(config.validate().is_err());

        config.token = "secret".to_string();
        config.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_event_context_uses_override_and_drops_blank_metadata() {
        let config = parse(&[
            "--collector-url",
            "http://localhost:8000/login",
            "--token",
            "secret",
            "--hostname",
            "bastion-1",
            "--region",
            "ca-central",
            "--host-group",
            "",
        ]);

        let ctx = config.event_context();
        assert_eq!(ctx.hostname, "bastion-1");
        assert_eq!(ctx.region.as_deref(), Some("ca-central"));
        assert_eq!(ctx.host_group, None);
        assert_eq!(ctx.severity.as_deref(), Some("info"));
    }
}
