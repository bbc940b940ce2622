use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

pub const USER_LOGIN: &str = "user_login";

pub const DEFAULT_QUERY_HOURS: i64 = 24;
pub const MAX_QUERY_HOURS: i64 = 168;
pub const DEFAULT_QUERY_LIMIT: i64 = 100;
pub const MAX_QUERY_LIMIT: i64 = 1000;

/// Login event as posted by an agent. Every field is optional here so that
/// missing values surface as validation problems rather than parse errors.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginEventIn {
    #[serde(rename = "type", alias = "event_type")]
    pub event_type: Option<String>,
    #[serde(alias = "event_timestamp")]
    pub timestamp: Option<String>,
    pub hostname: Option<String>,
    pub user: Option<String>,
    pub method: Option<String>,
    pub source_ip: Option<String>,
    pub source_port: Option<String>,
    pub raw_message: Option<String>,

    // classification metadata set by agent configuration
    pub region: Option<String>,
    pub host_group: Option<String>,
    pub severity: Option<String>,
    pub flagged: Option<bool>,
}

/// A login event that passed validation and can be stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLoginEvent {
    pub event_type: String,
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

impl LoginEventIn {
    /// Check every required field, reporting all problems at once
    pub fn validate(self) -> Result<NewLoginEvent, Vec<String>> {
        let mut problems = Vec::new();

        let mut required = |name: &str, value: Option<String>| -> String {
            match value.map(|v| v.trim().to_string()) {
                Some(v) if !v.is_empty() => v,
                _ => {
                    problems.push(format!("{}: field required", name));
                    String::new()
                }
            }
        };

        let event_type = required("type", self.event_type);
        let event_timestamp = required("timestamp", self.timestamp);
        let hostname = required("hostname", self.hostname);
        let user = required("user", self.user);
        let method = required("method", self.method);
        let source_ip = required("source_ip", self.source_ip);
        let source_port = required("source_port", self.source_port);
        let raw_message = required("raw_message", self.raw_message);

        if !event_type.is_empty() && event_type != USER_LOGIN {
            problems.push(format!("type: unsupported event type '{}'", event_type));
        }

        if !problems.is_empty() {
            return Err(problems);
        }

        Ok(NewLoginEvent {
            event_type,
            event_timestamp,
            hostname,
            user,
            method,
            source_ip,
            source_port,
            raw_message,
            region: optional(self.region),
            host_group: optional(self.host_group),
            severity: optional(self.severity),
            flagged: self.flagged.unwrap_or(false),
        })
    }
}

fn optional(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// A row from the `login_events` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct StoredLoginEvent {
    pub id: i64,
    pub received_at: DateTime<Utc>,
    pub event_type: String,
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

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub status: &'static str,
    pub id: i64,
}

/// Query-string parameters of the event listing
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventQuery {
    pub user: Option<String>,
    pub hostname: Option<String>,
    pub region: Option<String>,
    pub host_group: Option<String>,
    pub severity: Option<String>,
    pub flagged: Option<bool>,
    pub hours: Option<i64>,
    pub limit: Option<i64>,
}

/// Validated listing filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFilter {
    pub user: Option<String>,
    pub hostname: Option<String>,
    pub region: Option<String>,
    pub host_group: Option<String>,
    pub severity: Option<String>,
    pub flagged: Option<bool>,
    pub received_since: DateTime<Utc>,
    pub limit: i64,
}

impl EventQuery {
    pub fn into_filter(self, now: DateTime<Utc>) -> Result<EventFilter, Vec<String>> {
        let mut problems = Vec::new();

        let hours = self.hours.unwrap_or(DEFAULT_QUERY_HOURS);
        if !(1..=MAX_QUERY_HOURS).contains(&hours) {
            problems.push(format!("hours: must be between 1 and {}", MAX_QUERY_HOURS));
        }

        let limit = self.limit.unwrap_or(DEFAULT_QUERY_LIMIT);
        if !(1..=MAX_QUERY_LIMIT).contains(&limit) {
            problems.push(format!("limit: must be between 1 and {}", MAX_QUERY_LIMIT));
        }

        if !problems.is_empty() {
            return Err(problems);
        }

        Ok(EventFilter {
            user: optional(self.user),
            hostname: optional(self.hostname),
            region: optional(self.region),
            host_group: optional(self.host_group),
            severity: optional(self.severity),
            flagged: self.flagged,
            received_since: now - Duration::hours(hours),
            limit,
        })
    }
}
