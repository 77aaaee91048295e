pub mod channels;
pub mod fixtures;
pub mod store;

use anyhow::Context as _;
use axum::{
    body::Body,
    http::{HeaderMap, Method, Request, StatusCode},
    Router,
};
use carelink::{
    api::create_router,
    config::JwtAlgorithm,
    policy::{PolicyEvaluator, RegoEvaluator},
    subscriptions::{ChannelFactory, Notifier, SubscriberRegistry, SubscriptionManager},
    AppState, Config,
};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt as _;

// Re-export commonly used items
pub use channels::RecordingChannels;
pub use fixtures::*;
pub use store::MemoryFhirClient;

pub const SECRET: &str = "test-secret";

/// HS256 authentication, notifications on, no policy.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.auth.enabled = true;
    config.auth.algorithm = JwtAlgorithm::HS256;
    config.auth.secret = Some(SECRET.to_string());
    config
}

/// Bearer token for a user of organization `URA|<organization>`.
pub fn token(organization: &str) -> String {
    let claims = json!({
        "sub": format!("user@{organization}"),
        "organization": format!("{URA}|{organization}"),
        "exp": chrono::Utc::now().timestamp() + 3600
    });
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .expect("encode test token")
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: Arc<MemoryFhirClient>,
    pub channels: Arc<RecordingChannels>,
}

impl TestApp {
    pub fn new() -> anyhow::Result<Self> {
        Self::new_with(|_| {}, None)
    }

    /// App whose FHIR routes are guarded by the Rego `policy` (package `carelink`).
    pub fn with_policy(policy: &str) -> anyhow::Result<Self> {
        Self::new_with(|config| config.policy.enabled = true, Some(policy))
    }

    pub fn new_with(
        configure: impl FnOnce(&mut Config),
        policy: Option<&str>,
    ) -> anyhow::Result<Self> {
        let mut config = test_config();
        configure(&mut config);

        let store = Arc::new(MemoryFhirClient::new());
        let channels = Arc::new(RecordingChannels::new());
        let factory: Arc<dyn ChannelFactory> = channels.clone();
        let notifier: Arc<dyn SubscriptionManager> =
            Arc::new(Notifier::new(SubscriberRegistry::standard(), factory));

        let evaluator = match policy {
            Some(source) => Some(Arc::new(
                RegoEvaluator::new("carelink", "test.rego", source)
                    .map_err(|e| anyhow::anyhow!("load test policy: {e}"))?,
            ) as Arc<dyn PolicyEvaluator>),
            None => None,
        };

        let state = AppState::from_parts(config, store.clone(), notifier, evaluator)
            .context("initialize AppState")?;
        let router = create_router(state.clone());

        Ok(Self {
            router,
            state,
            store,
            channels,
        })
    }

    /// Send one request; the response body is parsed as JSON (`Null` when empty).
    pub async fn request(
        &self,
        method: Method,
        path_and_query: &str,
        bearer: Option<&str>,
        body: Option<Value>,
    ) -> anyhow::Result<(StatusCode, HeaderMap, Value)> {
        let mut builder = Request::builder()
            .method(method)
            .uri(path_and_query)
            .header("accept", "application/fhir+json");
        if let Some(token) = bearer {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/fhir+json")
                .body(Body::from(serde_json::to_vec(&body)?)),
            None => builder.body(Body::empty()),
        }
        .context("build request")?;

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .context("dispatch request")?;

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .context("read response body")?;
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).context("parse response body")?
        };

        Ok((status, headers, body))
    }

    /// Wait until at least `count` notifications were recorded. Deliveries run on
    /// background tasks after the write returned.
    pub async fn wait_for_deliveries(&self, count: usize) {
        for _ in 0..200 {
            if self.channels.deliveries().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "expected {count} deliveries, got {}",
            self.channels.deliveries().len()
        );
    }
}

pub fn assert_status(actual: StatusCode, expected: StatusCode, context: &str) {
    assert_eq!(actual, expected, "{context}: unexpected status");
}

/// First `issue.code` of an OperationOutcome.
pub fn issue_code(outcome: &Value) -> Option<&str> {
    outcome["issue"][0]["code"].as_str()
}
