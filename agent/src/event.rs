//! Login event data structures

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Kind of event reported to the collector.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum EventType {
    #[serde(rename = "user_login")]
    UserLogin,
}

/// Fields extracted from a single "Accepted ..." sshd line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SshLogin {
    pub method: String,
    pub user: String,
    pub source_ip: String,
    pub source_port: String,
    pub raw_message: String,
}

/// Host identity and classification defaults, fixed for the process lifetime.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EventContext {
    pub hostname: String,
    pub region: Option<String>,
    pub host_group: Option<String>,
    pub severity: Option<String>,
    pub flagged: bool,
}

/// Wire record sent to the collector's ingestion endpoint.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoginAttemptEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    #[serde(rename = "timestamp")]
    pub event_timestamp: String,
    pub hostname: String,
    pub user: String,
    pub method: String,
    pub source_ip: String,
    pub source_port: String,
    pub raw_message: String,
    pub region: Option<String>,
    pub host_group: Option<String>,
    pub severity: Option<String>,
    pub flagged: bool,
}

impl LoginAttemptEvent {
    /// Stamp a parsed login with the detection time and host metadata.
    pub fn new(login: SshLogin, ctx: &EventContext, detected_at: DateTime<Utc>) -> Self {
        Self {
            event_type: EventType::UserLogin,
            event_timestamp: detected_at.to_rfc3339_opts(SecondsFormat::Micros, false),
            hostname: ctx.hostname.clone(),
            user: login.user,
            method: login.method,
            source_ip: login.source_ip,
            source_port: login.source_port,
            raw_message: login.raw_message,
            region: ctx.region.clone(),
            host_group: ctx.host_group.clone(),
            severity: ctx.severity.clone(),
            flagged: ctx.flagged,
        }
    }

    /// `ip:port` as it appears in log lines and notifications
    pub fn source(&self) -> String {
        format!("{}:{}", self.source_ip, self.source_port)
    }
}
