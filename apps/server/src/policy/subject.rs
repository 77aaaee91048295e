//! Clinical subject (patient) of a resource, per resource type.

use super::PolicyError;
use carelink_models::Reference;
use serde_json::Value as JsonValue;
use std::collections::HashMap;

/// Returns the patient a resource is about, or `None` for types without a clinical subject.
pub type SubjectFn = fn(&JsonValue) -> Result<Option<Reference>, PolicyError>;

#[derive(Clone)]
pub struct SubjectRegistry {
    extractors: HashMap<&'static str, SubjectFn>,
}

impl SubjectRegistry {
    pub fn empty() -> Self {
        Self {
            extractors: HashMap::new(),
        }
    }

    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register("Task", task_subject);
        for resource_type in [
            "CarePlan",
            "CareTeam",
            "ServiceRequest",
            "Condition",
            "Observation",
            "Procedure",
            "QuestionnaireResponse",
        ] {
            registry.register(resource_type, subject_element);
        }
        registry.register("Patient", patient_itself);
        for resource_type in [
            "Questionnaire",
            "Organization",
            "Practitioner",
            "PractitionerRole",
            "Endpoint",
            "OperationOutcome",
        ] {
            registry.register(resource_type, no_subject);
        }
        registry
    }

    pub fn register(&mut self, resource_type: &'static str, extract: SubjectFn) {
        self.extractors.insert(resource_type, extract);
    }

    /// Fails for types the registry does not know: skipping evaluation is never safe.
    pub fn subject(
        &self,
        resource_type: &str,
        resource: &JsonValue,
    ) -> Result<Option<Reference>, PolicyError> {
        let extract = self
            .extractors
            .get(resource_type)
            .ok_or_else(|| PolicyError::UnsupportedResourceType(resource_type.to_string()))?;
        extract(resource)
    }
}

impl Default for SubjectRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

fn reference_element(resource: &JsonValue, element: &str) -> Result<Option<Reference>, PolicyError> {
    let Some(value) = resource.get(element) else {
        return Ok(None);
    };
    serde_json::from_value(value.clone())
        .map(Some)
        .map_err(|e| PolicyError::InvalidSubject {
            resource: crate::models::resource_type(resource)
                .unwrap_or("resource")
                .to_string(),
            reason: format!("'{element}' is not a Reference: {e}"),
        })
}

fn task_subject(resource: &JsonValue) -> Result<Option<Reference>, PolicyError> {
    reference_element(resource, "for")
}

fn subject_element(resource: &JsonValue) -> Result<Option<Reference>, PolicyError> {
    reference_element(resource, "subject")
}

fn patient_itself(resource: &JsonValue) -> Result<Option<Reference>, PolicyError> {
    Ok(crate::models::resource_id(resource).map(|id| Reference::literal(format!("Patient/{id}"))))
}

fn no_subject(_: &JsonValue) -> Result<Option<Reference>, PolicyError> {
    Ok(None)
}
