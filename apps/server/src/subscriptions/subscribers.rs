//! Which organizations are interested in a changed resource.

use super::SubscriptionError;
use carelink_models::{CarePlan, CareTeam, Identifier, Reference, Task};
use serde_json::Value as JsonValue;
use std::collections::HashMap;

/// Derives the subscriber identifiers of one resource type.
pub type SubscriberFn = fn(&JsonValue) -> Result<Vec<Identifier>, SubscriptionError>;

/// Registry mapping a resource type to its subscriber derivation.
#[derive(Clone)]
pub struct SubscriberRegistry {
    derivations: HashMap<&'static str, SubscriberFn>,
}

impl SubscriberRegistry {
    pub fn empty() -> Self {
        Self {
            derivations: HashMap::new(),
        }
    }

    /// Task, CareTeam and CarePlan.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register("Task", task_subscribers);
        registry.register("CareTeam", care_team_subscribers);
        registry.register("CarePlan", care_plan_subscribers);
        registry
    }

    pub fn register(&mut self, resource_type: &'static str, derive: SubscriberFn) {
        self.derivations.insert(resource_type, derive);
    }

    pub fn supports(&self, resource_type: &str) -> bool {
        self.derivations.contains_key(resource_type)
    }

    /// De-duplicated subscribers in derivation order, or `None` if the type is not tracked.
    pub fn subscribers(
        &self,
        resource_type: &str,
        resource: &JsonValue,
    ) -> Result<Option<Vec<Identifier>>, SubscriptionError> {
        let Some(derive) = self.derivations.get(resource_type) else {
            return Ok(None);
        };
        let mut subscribers = derive(resource)?;
        let mut seen = std::collections::HashSet::new();
        subscribers.retain(|id| seen.insert(id.clone()));
        Ok(Some(subscribers))
    }
}

impl Default for SubscriberRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

fn derivation_error(resource: &JsonValue, reason: impl ToString) -> SubscriptionError {
    let resource_type = crate::models::resource_type(resource).unwrap_or("resource");
    let id = crate::models::resource_id(resource).unwrap_or("?");
    SubscriptionError::Derivation {
        resource: format!("{resource_type}/{id}"),
        reason: reason.to_string(),
    }
}

/// Owner and requester, when expressed as logical references.
fn task_subscribers(resource: &JsonValue) -> Result<Vec<Identifier>, SubscriptionError> {
    let task = Task::from_value(resource).map_err(|e| derivation_error(resource, e))?;
    Ok([task.owner.as_ref(), task.requester.as_ref()]
        .into_iter()
        .flatten()
        .filter_map(Reference::logical_identifier)
        .cloned()
        .collect())
}

fn care_team_subscribers(resource: &JsonValue) -> Result<Vec<Identifier>, SubscriptionError> {
    let team = CareTeam::from_value(resource).map_err(|e| derivation_error(resource, e))?;
    Ok(team.member_identifiers().cloned().collect())
}

/// Members of the CarePlan's contained CareTeam.
fn care_plan_subscribers(resource: &JsonValue) -> Result<Vec<Identifier>, SubscriptionError> {
    let plan = CarePlan::from_value(resource).map_err(|e| derivation_error(resource, e))?;
    let local_id = plan
        .care_team
        .iter()
        .find_map(Reference::contained_id)
        .ok_or_else(|| derivation_error(resource, "CarePlan has no contained CareTeam"))?;
    let team = plan
        .contained_care_team(local_id)
        .ok_or_else(|| {
            derivation_error(resource, format!("contained CareTeam '#{local_id}' not found"))
        })?
        .map_err(|e| derivation_error(resource, e))?;
    Ok(team.member_identifiers().cloned().collect())
}
