//! Watchtower login-watch agent library
//!
//! This library provides components for following a host's SSH log,
//! detecting successful logins and delivering them to a Watchtower collector.

pub mod agent;
pub mod config;
pub mod delivery;
pub mod dispatcher;
pub mod errors;
pub mod event;
pub mod follower;
pub mod host;
pub mod log_parser;
pub mod source;

pub use agent::WatchtowerAgent;
pub use config::Config;
pub use delivery::{DeliveryClient, DeliveryOutcome, EventSink, RetryPolicy};
pub use errors::{AgentError, Result};
pub use event::{EventContext, EventType, LoginAttemptEvent, SshLogin};
pub use follower::LogFollower;
pub use log_parser::parse_line;
