//! FHIR CarePlan model

use super::care_team::CareTeam;
use super::datatypes::Reference;
use super::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// FHIR CarePlan resource
///
/// Governs a shared care arrangement: one CareTeam and an ordered list of Task activities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CarePlan {
    /// Resource type - always "CarePlan"
    #[serde(default = "default_resource_type")]
    pub resource_type: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Contained resources (e.g. an inline CareTeam)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contained: Vec<Value>,

    /// The patient whose care is planned
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<Reference>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub care_team: Vec<Reference>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub activity: Vec<CarePlanActivity>,

    /// Additional content beyond core fields
    #[serde(flatten)]
    pub extensions: HashMap<String, Value>,
}

fn default_resource_type() -> String {
    "CarePlan".to_string()
}

/// Action planned as part of a CarePlan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CarePlanActivity {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<Reference>,

    /// Additional content beyond core fields
    #[serde(flatten)]
    pub extensions: HashMap<String, Value>,
}

impl CarePlanActivity {
    pub fn new(reference: Reference) -> Self {
        Self {
            reference: Some(reference),
            extensions: HashMap::new(),
        }
    }
}

impl CarePlan {
    /// Parse from JSON Value
    pub fn from_value(value: &Value) -> Result<Self> {
        let plan: CarePlan = serde_json::from_value(value.clone())?;
        if plan.resource_type != "CarePlan" {
            return Err(Error::InvalidResource(format!(
                "expected resourceType 'CarePlan', got '{}'",
                plan.resource_type
            )));
        }
        Ok(plan)
    }

    /// Convert to JSON Value
    pub fn to_value(&self) -> Result<Value> {
        serde_json::to_value(self).map_err(Error::from)
    }

    /// Look up a contained CareTeam by its local id.
    pub fn contained_care_team(&self, local_id: &str) -> Option<Result<CareTeam>> {
        self.contained
            .iter()
            .find(|r| {
                r.get("resourceType").and_then(Value::as_str) == Some("CareTeam")
                    && r.get("id").and_then(Value::as_str) == Some(local_id)
            })
            .map(CareTeam::from_value)
    }

    /// Replace the contained resource with the same local id as `team`.
    pub fn replace_contained_care_team(&mut self, team: &CareTeam) -> Result<()> {
        let local_id = team
            .id
            .as_deref()
            .ok_or_else(|| Error::MissingField("CareTeam.id".to_string()))?;
        let value = team.to_value()?;
        let slot = self
            .contained
            .iter_mut()
            .find(|r| {
                r.get("resourceType").and_then(Value::as_str) == Some("CareTeam")
                    && r.get("id").and_then(Value::as_str) == Some(local_id)
            })
            .ok_or_else(|| {
                Error::InvalidResource(format!("no contained CareTeam with id '{local_id}'"))
            })?;
        *slot = value;
        Ok(())
    }
}
