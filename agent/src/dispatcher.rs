//! Bounded hand-off between the log follower and event delivery

use crate::delivery::{DeliveryOutcome, EventSink};
use crate::event::LoginAttemptEvent;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::info;

/// Delivery counters shared with the stats reporter
#[derive(Debug, Default)]
pub struct DeliveryStats {
    queued: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl DeliveryStats {
    /// Events taken off the queue so far
    pub fn queued(&self) -> u64 {
        self.queued.load(Ordering::Relaxed)
    }

    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn record(&self, outcome: &DeliveryOutcome) {
        let counter = if outcome.is_delivered() {
            &self.delivered
        } else {
            &self.dropped
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Create the bounded event queue. A full queue makes the sender wait.
pub fn event_queue(capacity: usize) -> (mpsc::Sender<LoginAttemptEvent>, mpsc::Receiver<LoginAttemptEvent>) {
    mpsc::channel(capacity)
}

/// Single delivery worker draining the event queue in arrival order
pub struct Dispatcher {
    sink: Arc<dyn EventSink>,
    events: mpsc::Receiver<LoginAttemptEvent>,
    stats: Arc<DeliveryStats>,
}

impl Dispatcher {
    pub fn new(sink: Arc<dyn EventSink>, events: mpsc::Receiver<LoginAttemptEvent>) -> Self {
        Self {
            sink,
            events,
            stats: Arc::new(DeliveryStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<DeliveryStats> {
        Arc::clone(&self.stats)
    }

    /// Deliver events until every sender is gone and the queue is empty
    pub async fn run(mut self) {
        while let Some(event) = self.events.recv().await {
            self.stats.queued.fetch_add(1, Ordering::Relaxed);
            let outcome = self.sink.deliver(&event).await;
            self.stats.record(&outcome);
        }

        info!("Event queue closed, dispatcher stopping");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventContext, SshLogin};
    use async_trait::async_trait;
    use chrono::Utc;
    use tokio::sync::Mutex;

    struct RecordingSink {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl EventSink for RecordingSink {
        async fn deliver(&self, event: &LoginAttemptEvent) -> DeliveryOutcome {
            self.seen.lock().await.push(event.user.clone());
            if event.user == "unlucky" {
                DeliveryOutcome::Dropped {
                    attempts: 3,
                    last_error: "collector down".to_string(),
                    backoffs: vec![],
                }
            } else {
                DeliveryOutcome::Delivered {
                    attempts: 1,
                    event_id: Some(1),
                    backoffs: vec![],
                }
            }
        }
    }

    fn event(user: &str) -> LoginAttemptEvent {
        let login = SshLogin {
            method: "publickey".to_string(),
            user: user.to_string(),
            source_ip: "10.0.0.5".to_string(),
            source_port: "22".to_string(),
            raw_message: format!("Accepted publickey for {} from 10.0.0.5 port 22 ssh2", user),
        };
        LoginAttemptEvent::new(login, &EventContext::default(), Utc::now())
    }

    #[tokio::test]
    async fn test_drains_queue_in_order_after_senders_close() {
        let sink = Arc::new(RecordingSink {
            seen: Mutex::new(Vec::new()),
        });
        let (tx, rx) = event_queue(4);
        let dispatcher = Dispatcher::new(sink.clone(), rx);
        let stats = dispatcher.stats();

        for user in ["alice", "unlucky", "bob"] {
            tx.send(event(user)).await.unwrap();
        }
        drop(tx);

        dispatcher.run().await;

        assert_eq!(*sink.seen.lock().await, vec!["alice", "unlucky", "bob"]);
        assert_eq!(stats.queued(), 3);
        assert_eq!(stats.delivered(), 2);
        assert_eq!(stats.dropped(), 1);
    }
}
