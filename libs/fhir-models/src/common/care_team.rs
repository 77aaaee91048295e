//! FHIR CareTeam model

use super::datatypes::{Identifier, Period, Reference};
use super::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// FHIR CareTeam resource
///
/// The organizations currently responsible for a CarePlan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CareTeam {
    /// Resource type - always "CareTeam"
    #[serde(default = "default_resource_type")]
    pub resource_type: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<Reference>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub participant: Vec<CareTeamParticipant>,

    /// Additional content beyond core fields
    #[serde(flatten)]
    pub extensions: HashMap<String, Value>,
}

fn default_resource_type() -> String {
    "CareTeam".to_string()
}

/// Member of a CareTeam
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CareTeamParticipant {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub member: Option<Reference>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub period: Option<Period>,

    /// Additional content beyond core fields
    #[serde(flatten)]
    pub extensions: HashMap<String, Value>,
}

impl CareTeamParticipant {
    /// New active participant starting at `start`
    pub fn active(member: Reference, start: impl Into<String>) -> Self {
        Self {
            member: Some(member),
            period: Some(Period::starting(start)),
            extensions: HashMap::new(),
        }
    }

    /// A participant is active until its period has an end.
    pub fn is_active(&self) -> bool {
        self.period.as_ref().map_or(true, |p| p.end.is_none())
    }

    pub fn member_identifier(&self) -> Option<&Identifier> {
        self.member.as_ref().and_then(Reference::logical_identifier)
    }
}

impl CareTeam {
    pub fn new() -> Self {
        Self {
            resource_type: default_resource_type(),
            id: None,
            subject: None,
            participant: Vec::new(),
            extensions: HashMap::new(),
        }
    }

    /// Parse from JSON Value
    pub fn from_value(value: &Value) -> Result<Self> {
        let team: CareTeam = serde_json::from_value(value.clone())?;
        if team.resource_type != "CareTeam" {
            return Err(Error::InvalidResource(format!(
                "expected resourceType 'CareTeam', got '{}'",
                team.resource_type
            )));
        }
        Ok(team)
    }

    /// Convert to JSON Value
    pub fn to_value(&self) -> Result<Value> {
        serde_json::to_value(self).map_err(Error::from)
    }

    /// First active participant whose member has the given logical identifier.
    pub fn active_member_mut(&mut self, identifier: &Identifier) -> Option<&mut CareTeamParticipant> {
        self.participant
            .iter_mut()
            .find(|p| p.is_active() && p.member_identifier() == Some(identifier))
    }

    pub fn has_active_member(&self, identifier: &Identifier) -> bool {
        self.participant
            .iter()
            .any(|p| p.is_active() && p.member_identifier() == Some(identifier))
    }

    /// Logical identifiers of every participant, active or not, in participant order.
    pub fn member_identifiers(&self) -> impl Iterator<Item = &Identifier> {
        self.participant
            .iter()
            .filter_map(CareTeamParticipant::member_identifier)
    }
}

impl Default for CareTeam {
    fn default() -> Self {
        Self::new()
    }
}
