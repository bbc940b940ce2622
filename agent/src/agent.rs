//! Agent runtime wiring the follower, the delivery queue and shutdown handling

use crate::config::Config;
use crate::delivery::DeliveryClient;
use crate::dispatcher::{DeliveryStats, Dispatcher, event_queue};
use crate::errors::{AgentError, Result};
use crate::follower::{FollowerStats, LogFollower};
use crate::source::CommandSource;

use std::sync::Arc;
use tokio::time::{Duration, interval, timeout};
use tracing::{error, info, warn};

/// How long queued and in-flight deliveries may continue after shutdown
const SHUTDOWN_GRACE: Duration = Duration::from_secs(15);

const STATS_INTERVAL: Duration = Duration::from_secs(60);

/// Main agent orchestrating log following and event delivery
pub struct WatchtowerAgent {
    config: Config,
    delivery: DeliveryClient,
}

impl WatchtowerAgent {
    pub fn new(config: Config) -> Result<Self> {
        config.validate().map_err(AgentError::Config)?;

        let delivery = DeliveryClient::new(
            config.collector_url.clone(),
            &config.token,
            config.verify_tls,
            config.retry_policy(),
        )?;

        Ok(Self { config, delivery })
    }

    /// Run until an interrupt arrives or the follower fails irrecoverably
    pub async fn start(self) -> Result<()> {
        let context = self.config.event_context();
        info!(
            "Starting Watchtower agent on {} - collector: {}, unit: {}, TLS verification: {}",
            context.hostname, self.config.collector_url, self.config.ssh_unit, self.config.verify_tls
        );

        let (tx, rx) = event_queue(self.config.queue_capacity);

        let dispatcher = Dispatcher::new(Arc::new(self.delivery), rx);
        let delivery_stats = dispatcher.stats();
        let mut dispatcher_task = tokio::spawn(dispatcher.run());

        let follower = LogFollower::new(
            CommandSource::journalctl(&self.config.ssh_unit),
            context,
            tx,
            self.config.restart_delay(),
            self.config.error_restart_delay(),
        );
        let follower_stats = follower.stats();
        let mut follower_task = tokio::spawn(follower.run());

        let reporter = tokio::spawn(report_stats(
            Arc::clone(&follower_stats),
            Arc::clone(&delivery_stats),
        ));

        let result = tokio::select! {
            signal = shutdown_signal() => {
                signal.map(|()| info!("Shutdown signal received"))
            }
            joined = &mut follower_task => match joined {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(e),
                Err(e) => Err(AgentError::Source(format!("log follower task failed: {}", e))),
            },
        };

        if let Err(e) = &result {
            error!("Log follower stopped unexpectedly: {}", e);
        }

        // Dropping the follower closes the queue and kills the tailing process.
        follower_task.abort();
        reporter.abort();

        match timeout(SHUTDOWN_GRACE, &mut dispatcher_task).await {
            Ok(_) => info!("Pending deliveries finished"),
            Err(_) => {
                warn!(
                    "Abandoning in-flight deliveries after {:?} shutdown grace period",
                    SHUTDOWN_GRACE
                );
                dispatcher_task.abort();
            }
        }

        log_stats("Final agent stats", &follower_stats, &delivery_stats);
        info!("Watchtower agent shutdown complete");
        result
    }
}

/// Ctrl-C, or SIGTERM from a service manager
#[cfg(unix)]
async fn shutdown_signal() -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result?,
        _ = terminate.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn shutdown_signal() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}

/// Report stats periodically
async fn report_stats(follower: Arc<FollowerStats>, delivery: Arc<DeliveryStats>) {
    let mut stats_interval = interval(STATS_INTERVAL);
    // The first tick completes immediately.
    stats_interval.tick().await;

    loop {
        stats_interval.tick().await;
        log_stats("Agent stats", &follower, &delivery);
    }
}

fn log_stats(label: &str, follower: &FollowerStats, delivery: &DeliveryStats) {
    info!(
        restarts = follower.restarts(),
        lines = follower.lines(),
        matched = follower.matched(),
        queued = delivery.queued(),
        delivered = delivery.delivered(),
        dropped = delivery.dropped(),
        "{}",
        label
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_agent_rejects_invalid_config() {
        let config = Config::try_parse_from([
            "watchtower_agent",
            "--collector-url",
            "collector.internal/login",
            "--token",
            "secret",
        ])
        .unwrap();

        assert!(matches!(WatchtowerAgent::new(config), Err(AgentError::Config(_))));
    }

    #[test]
    fn test_agent_creation() {
        let config = Config::try_parse_from([
            "watchtower_agent",
            "--collector-url",
            "https://collector.internal/login",
            "--token",
            "secret",
        ])
        .unwrap();

        assert!(WatchtowerAgent::new(config).is_ok());
    }
}
