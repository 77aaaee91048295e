//! Subscription notifications
//!
//! When a tracked resource changes, the organizations interested in it are derived from the
//! resource itself and each one receives a notification Bundle over its own channel. Deliveries
//! run concurrently; one subscriber failing never prevents delivery to the others.

pub mod channel;
pub mod directory;
pub mod factory;
pub mod subscribers;

pub use channel::{Channel, ChannelError, RestHookChannel};
pub use directory::{DirectoryError, ServiceDirectory, StaticDirectory};
pub use factory::{ChannelFactory, DirectoryChannelFactory};
pub use subscribers::{SubscriberFn, SubscriberRegistry};

use crate::models::{local_reference, resource_type};
use async_trait::async_trait;
use carelink_models::{Identifier, Reference, SubscriptionNotification};
use serde_json::Value as JsonValue;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinSet;

#[derive(Error, Debug)]
pub enum SubscriptionError {
    #[error("cannot derive subscribers of {resource}: {reason}")]
    Derivation { resource: String, reason: String },

    #[error(
        "{failed} of {attempted} notification deliveries failed: {details}",
        failed = .failures.len(),
        details = DeliveryFailure::join(.failures)
    )]
    Delivery {
        attempted: usize,
        failures: Vec<DeliveryFailure>,
    },
}

/// One subscriber that could not be notified.
#[derive(Debug)]
pub struct DeliveryFailure {
    /// `None` when the delivery worker died before reporting who it was delivering to.
    pub subscriber: Option<Identifier>,
    pub error: ChannelError,
}

impl DeliveryFailure {
    fn join(failures: &[DeliveryFailure]) -> String {
        failures
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }
}

impl fmt::Display for DeliveryFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.subscriber {
            Some(subscriber) => write!(f, "{subscriber}: {}", self.error),
            None => write!(f, "unknown subscriber: {}", self.error),
        }
    }
}

/// Notifies every organization interested in a changed resource.
#[async_trait]
pub trait SubscriptionManager: Send + Sync {
    async fn notify(&self, resource: &JsonValue) -> Result<(), SubscriptionError>;
}

/// Default manager: derives subscribers, then fans out one delivery task per subscriber.
pub struct Notifier {
    registry: SubscriberRegistry,
    channels: Arc<dyn ChannelFactory>,
    events: AtomicU64,
    subscription: Reference,
}

impl Notifier {
    pub fn new(registry: SubscriberRegistry, channels: Arc<dyn ChannelFactory>) -> Self {
        Self {
            registry,
            channels,
            events: AtomicU64::new(0),
            // No Subscription resources exist; every notification points at this placeholder.
            subscription: Reference::literal(format!("Subscription/{}", uuid::Uuid::new_v4())),
        }
    }

    pub fn subscription(&self) -> &Reference {
        &self.subscription
    }

    fn next_event_number(&self) -> u64 {
        self.events.fetch_add(1, Ordering::Relaxed) + 1
    }
}

#[async_trait]
impl SubscriptionManager for Notifier {
    async fn notify(&self, resource: &JsonValue) -> Result<(), SubscriptionError> {
        let Some(kind) = resource_type(resource) else {
            return Err(SubscriptionError::Derivation {
                resource: "resource".to_string(),
                reason: "missing resourceType".to_string(),
            });
        };

        let Some(subscribers) = self.registry.subscribers(kind, resource)? else {
            tracing::info!(
                resource_type = kind,
                "Resource type has no subscribers, not notifying"
            );
            return Ok(());
        };

        let focus = local_reference(resource).ok_or_else(|| SubscriptionError::Derivation {
            resource: kind.to_string(),
            reason: "resource has no id".to_string(),
        })?;

        let attempted = subscribers.len();
        tracing::debug!(
            focus = ?focus.reference,
            subscribers = attempted,
            "Notifying subscribers"
        );

        // Dropping the set aborts deliveries still in flight.
        let mut deliveries = JoinSet::new();
        for subscriber in subscribers {
            let channels = Arc::clone(&self.channels);
            let notification = SubscriptionNotification::new(
                self.subscription.clone(),
                self.next_event_number(),
                focus.clone(),
            );
            deliveries.spawn(async move {
                let result = match channels.create(&subscriber).await {
                    Ok(channel) => channel.notify(&notification).await,
                    Err(e) => Err(e),
                };
                (subscriber, result)
            });
        }

        let mut failures = Vec::new();
        while let Some(joined) = deliveries.join_next().await {
            match joined {
                Ok((_, Ok(()))) => {}
                Ok((subscriber, Err(error))) => {
                    tracing::warn!(
                        subscriber = %subscriber,
                        error = %error,
                        "Notification delivery failed"
                    );
                    failures.push(DeliveryFailure {
                        subscriber: Some(subscriber),
                        error,
                    });
                }
                Err(join_error) => {
                    tracing::error!(error = %join_error, "Notification worker aborted");
                    failures.push(DeliveryFailure {
                        subscriber: None,
                        error: ChannelError::Aborted(join_error.to_string()),
                    });
                }
            }
        }

        if failures.is_empty() {
            tracing::info!(
                focus = ?focus.reference,
                subscribers = attempted,
                "Subscribers notified"
            );
            Ok(())
        } else {
            Err(SubscriptionError::Delivery {
                attempted,
                failures,
            })
        }
    }
}

/// Manager used when notifications are switched off.
pub struct DisabledNotifications;

#[async_trait]
impl SubscriptionManager for DisabledNotifications {
    async fn notify(&self, resource: &JsonValue) -> Result<(), SubscriptionError> {
        tracing::debug!(
            resource_type = resource_type(resource).unwrap_or("unknown"),
            "Notifications disabled, skipping"
        );
        Ok(())
    }
}
