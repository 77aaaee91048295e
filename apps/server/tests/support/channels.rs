use async_trait::async_trait;
use carelink::subscriptions::{Channel, ChannelError, ChannelFactory};
use carelink_models::{Identifier, SubscriptionNotification};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Channel factory that records every delivered notification in memory.
#[derive(Default)]
pub struct RecordingChannels {
    deliveries: Arc<Mutex<Vec<(Identifier, SubscriptionNotification)>>>,
    failing: Mutex<HashSet<Identifier>>,
    stalling: Mutex<HashSet<Identifier>>,
    stalled: Arc<AtomicUsize>,
    abandoned: Arc<AtomicUsize>,
}

impl RecordingChannels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliveries to `subscriber` fail as if its endpoint answered HTTP 503.
    pub fn fail_for(&self, subscriber: Identifier) {
        self.failing.lock().unwrap().insert(subscriber);
    }

    /// Deliveries to `subscriber` never complete.
    pub fn stall_for(&self, subscriber: Identifier) {
        self.stalling.lock().unwrap().insert(subscriber);
    }

    /// Stalled deliveries that have started.
    pub fn stalled(&self) -> usize {
        self.stalled.load(Ordering::SeqCst)
    }

    /// Stalled deliveries whose future was dropped before completing.
    pub fn abandoned(&self) -> usize {
        self.abandoned.load(Ordering::SeqCst)
    }

    pub fn deliveries(&self) -> Vec<(Identifier, SubscriptionNotification)> {
        self.deliveries.lock().unwrap().clone()
    }

    /// Subscribers that received a notification about `focus` (e.g. `Task/1`), sorted.
    pub fn recipients_of(&self, focus: &str) -> Vec<Identifier> {
        let mut recipients: Vec<Identifier> = self
            .deliveries()
            .into_iter()
            .filter(|(_, n)| n.focus().reference.as_deref() == Some(focus))
            .map(|(subscriber, _)| subscriber)
            .collect();
        recipients.sort_by(|a, b| a.to_token().cmp(&b.to_token()));
        recipients
    }
}

struct RecordingChannel {
    subscriber: Identifier,
    fail: bool,
    stall: bool,
    stalled: Arc<AtomicUsize>,
    abandoned: Arc<AtomicUsize>,
    deliveries: Arc<Mutex<Vec<(Identifier, SubscriptionNotification)>>>,
}

/// Counts a delivery future dropped while still pending.
struct AbandonGuard(Arc<AtomicUsize>);

impl Drop for AbandonGuard {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Channel for RecordingChannel {
    async fn notify(&self, notification: &SubscriptionNotification) -> Result<(), ChannelError> {
        if self.stall {
            let _guard = AbandonGuard(Arc::clone(&self.abandoned));
            self.stalled.fetch_add(1, Ordering::SeqCst);
            std::future::pending::<()>().await;
        }
        if self.fail {
            return Err(ChannelError::Receiver {
                endpoint: format!("memory://{}", self.subscriber.to_token()),
                reason: "HTTP 503".to_string(),
            });
        }
        self.deliveries
            .lock()
            .unwrap()
            .push((self.subscriber.clone(), notification.clone()));
        Ok(())
    }
}

#[async_trait]
impl ChannelFactory for RecordingChannels {
    async fn create(&self, subscriber: &Identifier) -> Result<Arc<dyn Channel>, ChannelError> {
        Ok(Arc::new(RecordingChannel {
            subscriber: subscriber.clone(),
            fail: self.failing.lock().unwrap().contains(subscriber),
            stall: self.stalling.lock().unwrap().contains(subscriber),
            stalled: Arc::clone(&self.stalled),
            abandoned: Arc::clone(&self.abandoned),
            deliveries: Arc::clone(&self.deliveries),
        }))
    }
}
