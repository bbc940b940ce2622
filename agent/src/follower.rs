//! Supervised log follower: tails a log source forever, restarting it after
//! every exit or failure, and queues each detected login for delivery.

use crate::errors::{AgentError, Result};
use crate::event::{EventContext, LoginAttemptEvent};
use crate::log_parser::{LogParser, SshAcceptedParser};
use crate::source::{LogSource, LogStream};
use chrono::Utc;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::sleep;
use tracing::{error, info, warn};

/// Follower lifecycle. There is no terminal state; only dropping the
/// follower's future ends it.
pub enum FollowerState {
    Starting,
    Streaming(LogStream),
    RestartWait(Duration),
}

/// Follower counters shared with the stats reporter
#[derive(Debug, Default)]
pub struct FollowerStats {
    restarts: AtomicU64,
    lines: AtomicU64,
    matched: AtomicU64,
}

impl FollowerStats {
    pub fn restarts(&self) -> u64 {
        self.restarts.load(Ordering::Relaxed)
    }

    pub fn lines(&self) -> u64 {
        self.lines.load(Ordering::Relaxed)
    }

    pub fn matched(&self) -> u64 {
        self.matched.load(Ordering::Relaxed)
    }
}

pub struct LogFollower<S> {
    source: S,
    parser: Box<dyn LogParser>,
    context: EventContext,
    events: mpsc::Sender<LoginAttemptEvent>,
    restart_delay: Duration,
    error_restart_delay: Duration,
    stats: Arc<FollowerStats>,
}

impl<S: LogSource> LogFollower<S> {
    pub fn new(
        source: S,
        context: EventContext,
        events: mpsc::Sender<LoginAttemptEvent>,
        restart_delay: Duration,
        error_restart_delay: Duration,
    ) -> Self {
        Self {
            source,
            parser: Box::new(SshAcceptedParser),
            context,
            events,
            restart_delay,
            error_restart_delay,
            stats: Arc::new(FollowerStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<FollowerStats> {
        Arc::clone(&self.stats)
    }

    /// Run until the event queue is closed. Source failures never end the loop.
    pub async fn run(self) -> Result<()> {
        info!("Starting log follower: {}", self.source.describe());

        let mut state = FollowerState::Starting;
        loop {
            state = match state {
                FollowerState::Starting => self.start().await,
                FollowerState::Streaming(stream) => self.stream(stream).await?,
                FollowerState::RestartWait(delay) => {
                    self.stats.restarts.fetch_add(1, Ordering::Relaxed);
                    sleep(delay).await;
                    info!("Restarting log follower: {}", self.source.describe());
                    FollowerState::Starting
                }
            };
        }
    }

    async fn start(&self) -> FollowerState {
        match self.source.open().await {
            Ok(stream) => FollowerState::Streaming(stream),
            Err(e) => {
                error!(
                    "Error starting log follower: {}; retrying in {:?}",
                    e, self.error_restart_delay
                );
                FollowerState::RestartWait(self.error_restart_delay)
            }
        }
    }

    async fn stream(&self, mut stream: LogStream) -> Result<FollowerState> {
        loop {
            match stream.next_line().await {
                Ok(Some(line)) => self.process_line(&line).await?,
                Ok(None) => {
                    let end = stream.finish().await;
                    warn!(
                        "{} stopped ({}); restarting in {:?}",
                        self.source.describe(),
                        end,
                        self.restart_delay
                    );
                    return Ok(FollowerState::RestartWait(self.restart_delay));
                }
                Err(e) => {
                    stream.abort().await;
                    error!(
                        "Error reading {}: {}; restarting in {:?}",
                        self.source.describe(),
                        e,
                        self.error_restart_delay
                    );
                    return Ok(FollowerState::RestartWait(self.error_restart_delay));
                }
            }
        }
    }

    /// Parse one line and queue the resulting event, if any
    async fn process_line(&self, line: &str) -> Result<()> {
        if line.trim().is_empty() {
            return Ok(());
        }
        self.stats.lines.fetch_add(1, Ordering::Relaxed);

        let Some(login) = self.parser.parse(line) else {
            return Ok(());
        };
        self.stats.matched.fetch_add(1, Ordering::Relaxed);

        let event = LoginAttemptEvent::new(login, &self.context, Utc::now());
        info!(
            user = %event.user,
            source = %event.source(),
            method = %event.method,
            "Detected successful login"
        );

        match self.events.try_send(event) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(event)) => {
                warn!("Delivery queue full, waiting for space");
                self.events.send(event).await.map_err(|_| AgentError::QueueClosed)
            }
            Err(TrySendError::Closed(_)) => Err(AgentError::QueueClosed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::event_queue;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::io::Cursor;
    use tokio::io::DuplexStream;
    use tokio::sync::Mutex;
    use tokio::time::{Instant, timeout};

    enum Script {
        Lines(&'static str),
        Fail,
    }

    /// Replays scripted streams, then blocks forever on an idle pipe
    struct ScriptedSource {
        script: Mutex<VecDeque<Script>>,
        opened_at: Mutex<Vec<Instant>>,
        idle: Mutex<Vec<DuplexStream>>,
    }

    impl ScriptedSource {
        fn new(script: Vec<Script>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                opened_at: Mutex::new(Vec::new()),
                idle: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LogSource for Arc<ScriptedSource> {
        fn describe(&self) -> String {
            "scripted".to_string()
        }

        async fn open(&self) -> Result<LogStream> {
            self.opened_at.lock().await.push(Instant::now());
            match self.script.lock().await.pop_front() {
                Some(Script::Lines(text)) => Ok(LogStream::from_reader(Cursor::new(text.as_bytes().to_vec()))),
                Some(Script::Fail) => Err(AgentError::Source("scripted failure".to_string())),
                None => {
                    let (reader, writer) = tokio::io::duplex(64);
                    self.idle.lock().await.push(writer);
                    Ok(LogStream::from_reader(reader))
                }
            }
        }
    }

    fn context() -> EventContext {
        EventContext {
            hostname: "bastion-1".to_string(),
            severity: Some("info".to_string()),
            ..EventContext::default()
        }
    }

    async fn next_user(rx: &mut mpsc::Receiver<LoginAttemptEvent>) -> String {
        timeout(Duration::from_secs(60), rx.recv())
            .await
            .expect("event within a minute")
            .expect("queue open")
            .user
    }

    #[tokio::test(start_paused = true)]
    async fn test_restarts_after_stream_closes_without_losing_or_duplicating() {
        let source = ScriptedSource::new(vec![
            Script::Lines(""),
            Script::Lines("Accepted publickey for alice from 10.0.0.1 port 1000 ssh2\n"),
            Script::Lines(
                "Server listening on 0.0.0.0 port 22.\n\nAccepted password for bob from 10.0.0.2 port 2000 ssh2\nFailed password for eve from 10.0.0.3 port 3000 ssh2\nAccepted publickey for carol from 10.0.0.4 port 4000 ssh2\n",
            ),
        ]);
        let (tx, mut rx) = event_queue(8);
        let follower = LogFollower::new(
            Arc::clone(&source),
            context(),
            tx,
            Duration::from_secs(2),
            Duration::from_secs(5),
        );
        let stats = follower.stats();
        let task = tokio::spawn(follower.run());

        assert_eq!(next_user(&mut rx).await, "alice");
        assert_eq!(next_user(&mut rx).await, "bob");
        assert_eq!(next_user(&mut rx).await, "carol");

        // Wait until the follower has settled on the idle fourth stream.
        while source.opened_at.lock().await.len() < 4 {
            sleep(Duration::from_millis(100)).await;
        }
        assert!(rx.try_recv().is_err());

        let opened = source.opened_at.lock().await.clone();
        for pair in opened.windows(2) {
            let gap = pair[1] - pair[0];
            assert!(gap >= Duration::from_secs(2), "restarted too early: {:?}", gap);
            assert!(gap < Duration::from_secs(3), "restarted too late: {:?}", gap);
        }

        assert_eq!(stats.restarts(), 3);
        assert_eq!(stats.lines(), 5);
        assert_eq!(stats.matched(), 3);
        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_failure_uses_longer_delay() {
        let source = ScriptedSource::new(vec![
            Script::Fail,
            Script::Lines("Accepted publickey for dave from 10.0.0.9 port 9000 ssh2\n"),
        ]);
        let (tx, mut rx) = event_queue(8);
        let follower = LogFollower::new(
            Arc::clone(&source),
            context(),
            tx,
            Duration::from_secs(2),
            Duration::from_secs(5),
        );
        let task = tokio::spawn(follower.run());

        assert_eq!(next_user(&mut rx).await, "dave");

        let opened = source.opened_at.lock().await.clone();
        let gap = opened[1] - opened[0];
        assert!(gap >= Duration::from_secs(5) && gap < Duration::from_secs(6));
        task.abort();
    }

    #[tokio::test]
    async fn test_events_carry_host_context() {
        let source = ScriptedSource::new(vec![Script::Lines(
            "Accepted publickey for jaye from 10.0.0.5 port 54321 ssh2\n",
        )]);
        let (tx, mut rx) = event_queue(1);
        let task = tokio::spawn(
            LogFollower::new(source, context(), tx, Duration::from_secs(2), Duration::from_secs(5)).run(),
        );

        let event = timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
        assert_eq!(event.hostname, "bastion-1");
        assert_eq!(event.user, "jaye");
        assert_eq!(event.source_port, "54321");
        assert_eq!(event.raw_message, "Accepted publickey for jaye from 10.0.0.5 port 54321 ssh2");
        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_queue_blocks_follower_without_dropping() {
        let text: &'static str = Box::leak(
            (0..20)
                .map(|i| format!("Accepted publickey for u{} from 10.0.0.{} port {} ssh2\n", i, i, 1000 + i))
                .collect::<String>()
                .into_boxed_str(),
        );
        let source = ScriptedSource::new(vec![Script::Lines(text)]);
        let (tx, mut rx) = event_queue(2);
        let follower = LogFollower::new(source, context(), tx, Duration::from_secs(2), Duration::from_secs(5));
        let stats = follower.stats();
        let task = tokio::spawn(follower.run());

        sleep(Duration::from_secs(1)).await;
        let matched_while_blocked = stats.matched();
        sleep(Duration::from_secs(10)).await;
        assert_eq!(stats.matched(), matched_while_blocked);
        assert!(matched_while_blocked <= 3, "follower ran ahead: {}", matched_while_blocked);

        let mut users = Vec::new();
        for _ in 0..20 {
            users.push(next_user(&mut rx).await);
        }
        let expected: Vec<String> = (0..20).map(|i| format!("u{}", i)).collect();
        assert_eq!(users, expected);
        assert_eq!(stats.matched(), 20);
        task.abort();
    }

    #[tokio::test]
    async fn test_closed_queue_stops_follower() {
        let source = ScriptedSource::new(vec![Script::Lines(
            "Accepted publickey for jaye from 10.0.0.5 port 54321 ssh2\n",
        )]);
        let (tx, rx) = event_queue(1);
        drop(rx);

        let result = LogFollower::new(source, context(), tx, Duration::from_secs(2), Duration::from_secs(5))
            .run()
            .await;

        assert!(matches!(result, Err(AgentError::QueueClosed)));
    }
}
