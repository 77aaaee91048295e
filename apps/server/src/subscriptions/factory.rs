//! Per-subscriber delivery channels.

use crate::subscriptions::channel::{Channel, ChannelError, RestHookChannel};
use crate::subscriptions::directory::ServiceDirectory;
use async_trait::async_trait;
use carelink_models::Identifier;
use std::sync::Arc;
use std::time::Duration;

/// Resolves the delivery channel of a subscriber.
#[async_trait]
pub trait ChannelFactory: Send + Sync {
    async fn create(&self, subscriber: &Identifier) -> Result<Arc<dyn Channel>, ChannelError>;
}

/// Builds REST-hook channels from the endpoint a subscriber registered in the directory.
pub struct DirectoryChannelFactory {
    directory: Arc<dyn ServiceDirectory>,
    service: String,
    http: reqwest::Client,
}

impl DirectoryChannelFactory {
    pub fn new(
        directory: Arc<dyn ServiceDirectory>,
        service: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            directory,
            service: service.into(),
            http,
        })
    }
}

#[async_trait]
impl ChannelFactory for DirectoryChannelFactory {
    async fn create(&self, subscriber: &Identifier) -> Result<Arc<dyn Channel>, ChannelError> {
        let endpoints = self
            .directory
            .lookup(subscriber, &self.service)
            .await
            .map_err(|source| ChannelError::Directory {
                subscriber: subscriber.clone(),
                source,
            })?;

        // Several registrations: the first one wins.
        let endpoint = endpoints
            .into_iter()
            .next()
            .ok_or_else(|| ChannelError::EndpointNotFound {
                subscriber: subscriber.clone(),
                service: self.service.clone(),
            })?;

        Ok(Arc::new(RestHookChannel::new(endpoint, self.http.clone())))
    }
}
