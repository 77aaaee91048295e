//! FHIR Task model

use super::datatypes::Reference;
use super::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// FHIR Task resource
///
/// A single order exchanged between a placer (`requester`) and a filler (`owner`).
/// `input`, `output`, `intent` and the rest of the payload live in `extensions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Resource type - always "Task"
    #[serde(default = "default_resource_type")]
    pub resource_type: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    pub status: TaskStatus,

    /// The patient the Task is performed for
    #[serde(rename = "for", skip_serializing_if = "Option::is_none")]
    pub patient: Option<Reference>,

    /// The underlying order (e.g. a ServiceRequest)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focus: Option<Reference>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub requester: Option<Reference>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<Reference>,

    /// The governing CarePlan
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub based_on: Vec<Reference>,

    /// Parent Task(s); non-empty means this is a subtask
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub part_of: Vec<Reference>,

    /// Additional content beyond core fields
    #[serde(flatten)]
    pub extensions: HashMap<String, Value>,
}

fn default_resource_type() -> String {
    "Task".to_string()
}

/// Lifecycle status of a Task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    Requested,
    Accepted,
    InProgress,
    OnHold,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Requested => "requested",
            TaskStatus::Accepted => "accepted",
            TaskStatus::InProgress => "in-progress",
            TaskStatus::OnHold => "on-hold",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    /// Statuses in which the owner still holds a live responsibility.
    pub fn keeps_owner_active(&self) -> bool {
        matches!(
            self,
            TaskStatus::Accepted | TaskStatus::InProgress | TaskStatus::OnHold
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    /// Whether a Task may move from `self` to `next`. Re-submitting the same status is allowed.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        use TaskStatus::*;

        if *self == next {
            return true;
        }
        match self {
            Requested => matches!(next, Accepted | Cancelled | Failed),
            Accepted => matches!(next, InProgress | OnHold | Completed | Cancelled | Failed),
            InProgress => matches!(next, OnHold | Completed | Failed | Cancelled),
            OnHold => matches!(next, InProgress | Cancelled | Failed),
            Completed | Failed | Cancelled => false,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Task {
    /// Parse from JSON Value
    pub fn from_value(value: &Value) -> Result<Self> {
        let task: Task = serde_json::from_value(value.clone())?;
        if task.resource_type != "Task" {
            return Err(Error::InvalidResource(format!(
                "expected resourceType 'Task', got '{}'",
                task.resource_type
            )));
        }
        Ok(task)
    }

    /// Convert to JSON Value
    pub fn to_value(&self) -> Result<Value> {
        serde_json::to_value(self).map_err(Error::from)
    }

    pub fn is_subtask(&self) -> bool {
        !self.part_of.is_empty()
    }

    /// The first `basedOn` reference that points at a CarePlan, as `(reference, id)`.
    pub fn care_plan_reference(&self) -> Option<(&Reference, &str)> {
        self.based_on.iter().find_map(|r| match r.type_and_id() {
            Some(("CarePlan", id)) => Some((r, id)),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_task_keeps_unknown_fields() {
        let task = Task::from_value(&json!({
            "resourceType": "Task",
            "id": "1",
            "status": "in-progress",
            "intent": "order",
            "for": {"reference": "Patient/p1"},
            "basedOn": [{"reference": "CarePlan/cp1"}],
            "input": [{"type": {"text": "q"}, "valueReference": {"reference": "Questionnaire/q1"}}]
        }))
        .unwrap();

        assert_eq!(task.status, TaskStatus::InProgress);
        assert_eq!(task.patient.as_ref().unwrap().reference.as_deref(), Some("Patient/p1"));
        assert_eq!(task.care_plan_reference().map(|(_, id)| id), Some("cp1"));

        let out = task.to_value().unwrap();
        assert_eq!(out["intent"], "order");
        assert_eq!(out["input"][0]["valueReference"]["reference"], "Questionnaire/q1");
        assert_eq!(out["for"]["reference"], "Patient/p1");
    }

    #[test]
    fn test_unknown_status_is_rejected() {
        let result = Task::from_value(&json!({"resourceType": "Task", "status": "draft"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_wrong_resource_type_is_rejected() {
        let result = Task::from_value(&json!({"resourceType": "CarePlan", "status": "accepted"}));
        assert!(matches!(result, Err(Error::InvalidResource(_))));
    }

    #[test]
    fn test_status_transitions() {
        use TaskStatus::*;

        assert!(Requested.can_transition_to(Accepted));
        assert!(Accepted.can_transition_to(Completed));
        assert!(OnHold.can_transition_to(InProgress));
        assert!(Completed.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(InProgress));
        assert!(!Requested.can_transition_to(Completed));
        assert!(!Cancelled.can_transition_to(Requested));
    }

    #[test]
    fn test_owner_active_statuses() {
        assert!(TaskStatus::Accepted.keeps_owner_active());
        assert!(TaskStatus::OnHold.keeps_owner_active());
        assert!(!TaskStatus::Requested.keeps_owner_active());
        assert!(!TaskStatus::Completed.keeps_owner_active());
    }
}
