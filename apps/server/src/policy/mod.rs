//! Resource-level authorization
//!
//! Every protected request is evaluated against a Rego policy. The policy sees who is asking
//! (the caller's organization and roles), what they are asking for, the resource itself and
//! every CarePlan of the resource's patient, so decisions can follow CareTeam membership.

pub mod context;
pub mod evaluator;
pub mod middleware;
pub mod subject;

pub use context::{CarePlanCache, Context, Preflight, SubjectKey};
pub use evaluator::{PolicyEvaluator, RegoEvaluator};
pub use middleware::policy_middleware;
pub use subject::{SubjectFn, SubjectRegistry};

use crate::auth::Principal;
use crate::client::{ClientError, FhirClient};
use crate::models::resource_type;
use axum::http::request::Parts;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("access denied")]
    AccessDenied,

    #[error("request is not authenticated")]
    NotAuthenticated,

    #[error("resource type '{0}' is not supported by the authorization policy")]
    UnsupportedResourceType(String),

    #[error("invalid subject in {resource}: {reason}")]
    InvalidSubject { resource: String, reason: String },

    #[error("policy query '{0}' produced no result")]
    MissingBinding(String),

    #[error("policy query '{query}' produced a {found} instead of a boolean")]
    InvalidBinding { query: String, found: &'static str },

    #[error("policy evaluation failed: {0}")]
    Evaluation(String),

    #[error("failed to load policy '{path}': {reason}")]
    PolicyLoad { path: String, reason: String },

    #[error("failed to resolve CarePlans of subject: {0}")]
    Client(#[from] ClientError),
}

impl PolicyError {
    pub fn is_access_denied(&self) -> bool {
        matches!(self, PolicyError::AccessDenied)
    }
}

pub struct PolicyAgent {
    client: Arc<dyn FhirClient>,
    evaluator: Arc<dyn PolicyEvaluator>,
    subjects: SubjectRegistry,
    roles_header: String,
}

impl PolicyAgent {
    pub fn new(
        client: Arc<dyn FhirClient>,
        evaluator: Arc<dyn PolicyEvaluator>,
        roles_header: impl Into<String>,
    ) -> Self {
        Self {
            client,
            evaluator,
            subjects: SubjectRegistry::standard(),
            roles_header: roles_header.into(),
        }
    }

    pub fn with_subjects(mut self, subjects: SubjectRegistry) -> Self {
        self.subjects = subjects;
        self
    }

    /// Project the request onto what the policy needs. No I/O.
    pub fn preflight(
        &self,
        resource_type: &str,
        id: Option<&str>,
        parts: &Parts,
    ) -> Result<Preflight, PolicyError> {
        let principal = parts
            .extensions
            .get::<Principal>()
            .ok_or(PolicyError::NotAuthenticated)?;

        let roles = parts
            .headers
            .get(self.roles_header.as_str())
            .and_then(|v| v.to_str().ok())
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|r| !r.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Preflight {
            principal: principal.organization.clone(),
            method: parts.method.as_str().to_string(),
            roles,
            query: parts.uri.query().unwrap_or_default().to_string(),
            resource_type: resource_type.to_string(),
            resource_id: id.map(str::to_string),
        })
    }

    /// Build the evaluation input for one resource, looking up the CarePlans of its subject
    /// unless this request already did.
    pub async fn prepare_context(
        &self,
        cache: &mut CarePlanCache,
        preflight: &Preflight,
        resource: &JsonValue,
    ) -> Result<Context, PolicyError> {
        let kind = resource_type(resource).unwrap_or(&preflight.resource_type);
        let subject = self.subjects.subject(kind, resource)?;

        let care_plans = match subject.as_ref().and_then(SubjectKey::from_reference) {
            None => Vec::new(),
            Some(key) => match cache.get(&key) {
                Some(plans) => plans.clone(),
                None => {
                    let bundle = self
                        .client
                        .search("CarePlan", &key.care_plan_search())
                        .await?;
                    let plans: Vec<JsonValue> =
                        bundle.resources_of_type("CarePlan").cloned().collect();
                    tracing::debug!(
                        subject = ?key,
                        care_plans = plans.len(),
                        "Resolved CarePlans of subject"
                    );
                    cache.insert(key, plans.clone());
                    plans
                }
            },
        };

        Ok(Context {
            principal: preflight.principal.clone(),
            method: preflight.method.clone(),
            roles: preflight.roles.clone(),
            query: preflight.query.clone(),
            resource_type: kind.to_string(),
            resource: resource.clone(),
            care_plans,
        })
    }

    /// `Ok(())` when the policy allows, [`PolicyError::AccessDenied`] when it denies.
    pub fn allow(&self, context: &Context) -> Result<(), PolicyError> {
        let input = serde_json::to_value(context)
            .map_err(|e| PolicyError::Evaluation(format!("cannot serialize input: {e}")))?;

        if self.evaluator.evaluate(&input)? {
            Ok(())
        } else {
            tracing::info!(
                principal = %context.principal,
                method = %context.method,
                resource_type = %context.resource_type,
                resource_id = crate::models::resource_id(&context.resource).unwrap_or(""),
                "Policy denied access"
            );
            Err(PolicyError::AccessDenied)
        }
    }
}
