//! Shared application state.

use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::AuthManager;
use crate::client::{FhirClient, HttpFhirClient};
use crate::config::Config;
use crate::policy::{PolicyAgent, PolicyEvaluator, RegoEvaluator};
use crate::services::{CarePlanService, TaskService};
use crate::subscriptions::{
    DirectoryChannelFactory, DisabledNotifications, Notifier, StaticDirectory,
    SubscriberRegistry, SubscriptionManager,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub client: Arc<dyn FhirClient>,
    pub auth: Arc<AuthManager>,
    /// `None` when policy enforcement is disabled
    pub policy: Option<Arc<PolicyAgent>>,
    pub notifier: Arc<dyn SubscriptionManager>,
    pub tasks: Arc<TaskService>,
    pub care_plans: Arc<CarePlanService>,
}

impl AppState {
    /// Wire the production collaborators described by `config`.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let client: Arc<dyn FhirClient> = Arc::new(
            HttpFhirClient::new(
                &config.fhir.base_url,
                Duration::from_secs(config.fhir.timeout_seconds),
            )
            .context("Failed to create FHIR client")?,
        );

        let notifier: Arc<dyn SubscriptionManager> = if config.notifications.enabled {
            let directory = StaticDirectory::from_entries(&config.notifications.directory)
                .context("Invalid notification directory")?;
            let channels = DirectoryChannelFactory::new(
                Arc::new(directory),
                config.notifications.service_id.clone(),
                Duration::from_secs(config.notifications.timeout_seconds),
            )
            .context("Failed to create notification HTTP client")?;
            Arc::new(Notifier::new(
                SubscriberRegistry::standard(),
                Arc::new(channels),
            ))
        } else {
            Arc::new(DisabledNotifications)
        };

        let evaluator: Option<Arc<dyn PolicyEvaluator>> = match &config.policy.path {
            Some(path) if config.policy.enabled => Some(Arc::new(
                RegoEvaluator::from_file(&config.policy.package, path)
                    .context("Failed to load authorization policy")?,
            )),
            _ => None,
        };

        Self::from_parts(config, client, notifier, evaluator)
    }

    /// Assemble state around explicit collaborators.
    pub fn from_parts(
        config: Config,
        client: Arc<dyn FhirClient>,
        notifier: Arc<dyn SubscriptionManager>,
        evaluator: Option<Arc<dyn PolicyEvaluator>>,
    ) -> anyhow::Result<Self> {
        let auth = AuthManager::new(&config.auth)
            .map_err(|e| anyhow::anyhow!("Failed to initialize authentication: {e:?}"))?;

        let policy = evaluator.map(|evaluator| {
            Arc::new(PolicyAgent::new(
                Arc::clone(&client),
                evaluator,
                config.policy.roles_header.clone(),
            ))
        });

        tracing::info!(
            fhir_base_url = %config.fhir.base_url,
            auth_enabled = config.auth.enabled,
            policy_enabled = policy.is_some(),
            notifications_enabled = config.notifications.enabled,
            "Application state initialized"
        );

        Ok(Self {
            tasks: Arc::new(TaskService::new(Arc::clone(&client), Arc::clone(&notifier))),
            care_plans: Arc::new(CarePlanService::new(
                Arc::clone(&client),
                Arc::clone(&notifier),
            )),
            config: Arc::new(config),
            client,
            auth: Arc::new(auth),
            policy,
            notifier,
        })
    }
}
