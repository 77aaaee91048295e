//! Policy evaluation input.

use carelink_models::{Identifier, Reference};
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::collections::HashMap;

/// What is known about a request before any resource is looked at.
#[derive(Debug, Clone, PartialEq)]
pub struct Preflight {
    pub principal: Identifier,
    pub method: String,
    pub roles: Vec<String>,
    pub query: String,
    pub resource_type: String,
    pub resource_id: Option<String>,
}

/// Input document of one policy evaluation (`input` in the policy).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Context {
    pub principal: Identifier,
    pub method: String,
    pub roles: Vec<String>,
    pub query: String,
    pub resource_type: String,
    pub resource: JsonValue,
    pub care_plans: Vec<JsonValue>,
}

/// How a subject was addressed; cache key for its CarePlans.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SubjectKey {
    Literal(String),
    Identifier(Identifier),
}

impl SubjectKey {
    /// Literal addressing wins when a reference carries both.
    pub fn from_reference(subject: &Reference) -> Option<Self> {
        if let Some(literal) = subject.reference.as_deref().filter(|r| !r.is_empty()) {
            return Some(Self::Literal(literal.to_string()));
        }
        subject
            .logical_identifier()
            .map(|id| Self::Identifier(id.clone()))
    }

    /// The CarePlan search that finds every plan of this subject.
    pub fn care_plan_search(&self) -> Vec<(String, String)> {
        match self {
            Self::Literal(reference) => vec![("subject".to_string(), reference.clone())],
            Self::Identifier(identifier) => vec![(
                "subject:Patient.identifier".to_string(),
                identifier.to_token(),
            )],
        }
    }
}

/// CarePlans per subject, owned by a single request.
#[derive(Debug, Default)]
pub struct CarePlanCache {
    plans: HashMap<SubjectKey, Vec<JsonValue>>,
}

impl CarePlanCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &SubjectKey) -> Option<&Vec<JsonValue>> {
        self.plans.get(key)
    }

    pub fn insert(&mut self, key: SubjectKey, plans: Vec<JsonValue>) {
        self.plans.insert(key, plans);
    }

    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }
}
