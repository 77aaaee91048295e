//! Notification delivery channels.

use crate::client::FHIR_JSON;
use crate::subscriptions::directory::DirectoryError;
use async_trait::async_trait;
use carelink_models::{Identifier, SubscriptionNotification};
use reqwest::header;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum ChannelError {
    /// The receiving side failed: transport error or non-2xx answer.
    #[error("notification receiver {endpoint} failed: {reason}")]
    Receiver { endpoint: String, reason: String },

    #[error("no '{service}' endpoint registered for {subscriber}")]
    EndpointNotFound {
        subscriber: Identifier,
        service: String,
    },

    #[error("directory lookup for {subscriber} failed: {source}")]
    Directory {
        subscriber: Identifier,
        source: DirectoryError,
    },

    #[error("failed to serialize notification: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("delivery worker aborted: {0}")]
    Aborted(String),
}

impl ChannelError {
    /// True when delivery reached the point of talking to the receiver and the receiver
    /// (or the network in between) failed, as opposed to a local lookup or programming error.
    pub fn is_receiver_failure(&self) -> bool {
        matches!(self, ChannelError::Receiver { .. })
    }
}

/// Delivers notifications to one subscriber.
#[async_trait]
pub trait Channel: Send + Sync {
    async fn notify(&self, notification: &SubscriptionNotification) -> Result<(), ChannelError>;
}

/// REST-hook channel: POSTs the notification Bundle to the subscriber's endpoint.
pub struct RestHookChannel {
    endpoint: Url,
    http: reqwest::Client,
}

impl RestHookChannel {
    pub fn new(endpoint: Url, http: reqwest::Client) -> Self {
        Self { endpoint, http }
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn receiver_error(&self, reason: impl ToString) -> ChannelError {
        ChannelError::Receiver {
            endpoint: self.endpoint.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl Channel for RestHookChannel {
    async fn notify(&self, notification: &SubscriptionNotification) -> Result<(), ChannelError> {
        let body = serde_json::to_vec(notification)?;

        tracing::debug!(
            endpoint = %self.endpoint,
            notification_id = %notification.id(),
            "Delivering notification"
        );
        let response = self
            .http
            .post(self.endpoint.clone())
            .header(header::CONTENT_TYPE, FHIR_JSON)
            .body(body)
            .send()
            .await
            .map_err(|e| self.receiver_error(e))?;

        let status = response.status();
        // Drain the body so the connection can be reused; its content is irrelevant.
        let _ = response.bytes().await;

        if !status.is_success() {
            return Err(self.receiver_error(format!("HTTP {}", status.as_u16())));
        }
        Ok(())
    }
}
