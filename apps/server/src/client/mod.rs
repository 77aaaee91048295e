//! Client for the remote FHIR resource server.
//!
//! CarePlans, CareTeams and Tasks are owned by the resource server; the orchestrator only
//! holds transient views fetched per operation. All writes that must be consistent with
//! each other go through [`FhirClient::transaction`].

mod http;

pub use http::HttpFhirClient;

use async_trait::async_trait;
use carelink_models::Bundle;
use serde_json::Value as JsonValue;
use thiserror::Error;

pub const FHIR_JSON: &str = "application/fhir+json";

/// Search parameters as `(name, value)` pairs, in request order.
pub type SearchParams = [(String, String)];

#[derive(Error, Debug)]
pub enum ClientError {
    /// Non-2xx answer; `outcome` is the OperationOutcome body when the server sent one.
    #[error("FHIR server answered {method} {url} with HTTP {status}")]
    OperationOutcome {
        method: String,
        url: String,
        status: u16,
        outcome: Option<JsonValue>,
    },

    #[error("FHIR server request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Invalid FHIR server response: {0}")]
    Decode(String),

    #[error("Invalid FHIR server URL: {0}")]
    InvalidUrl(String),
}

impl ClientError {
    /// HTTP status of an OperationOutcome error.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::OperationOutcome { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.status(), Some(404 | 410))
    }

    /// First `issue.diagnostics` of the OperationOutcome, if any.
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            ClientError::OperationOutcome {
                outcome: Some(outcome),
                ..
            } => outcome
                .get("issue")?
                .as_array()?
                .iter()
                .find_map(|issue| issue.get("diagnostics").and_then(JsonValue::as_str)),
            _ => None,
        }
    }
}

/// Typed read/search/create/update/delete against a FHIR resource server.
#[async_trait]
pub trait FhirClient: Send + Sync {
    /// Read the current version of `resource_type/id`
    async fn read(&self, resource_type: &str, id: &str) -> Result<JsonValue, ClientError>;

    /// Type-level search. The result is a `searchset` Bundle (includes as `include` entries).
    async fn search(
        &self,
        resource_type: &str,
        params: &SearchParams,
    ) -> Result<Bundle, ClientError>;

    /// Create with a server-assigned id; returns the stored resource
    async fn create(&self, resource: &JsonValue) -> Result<JsonValue, ClientError>;

    /// Update (or create) `resource_type/id`; returns the stored resource
    async fn update(
        &self,
        resource_type: &str,
        id: &str,
        resource: &JsonValue,
    ) -> Result<JsonValue, ClientError>;

    async fn delete(&self, resource_type: &str, id: &str) -> Result<(), ClientError>;

    /// Submit a `transaction` Bundle; all entries commit atomically or none do.
    async fn transaction(&self, bundle: &Bundle) -> Result<Bundle, ClientError>;
}
