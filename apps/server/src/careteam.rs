//! CareTeam consistency engine.
//!
//! CareTeam membership is derived from the Tasks of a CarePlan: the requester of a Task is
//! always a member, the owner is a member while it holds a live Task. Every Task write
//! recomputes the membership against the Task *as it is about to be written* and appends
//! the resulting CareTeam update to the caller's transaction, so the Task and its CareTeam
//! consequence commit together or not at all.

use crate::client::{ClientError, FhirClient};
use carelink_models::{
    CarePlan, CareTeam, CareTeamParticipant, Identifier, Reference, Task, TaskStatus,
    TransactionBuilder, weak_etag,
};
use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CareTeamError {
    #[error("CarePlan/{0} not found")]
    CarePlanNotFound(String),

    #[error("CarePlan/{care_plan_id} must reference exactly one CareTeam, found {count}")]
    CareTeamCardinality { care_plan_id: String, count: usize },

    #[error("CareTeam '{reference}' of CarePlan/{care_plan_id} not found")]
    CareTeamNotFound {
        care_plan_id: String,
        reference: String,
    },

    #[error("CarePlan/{care_plan_id} is malformed: {reason}")]
    MalformedCarePlan {
        care_plan_id: String,
        reason: String,
    },

    #[error("Invalid CareTeam resource: {0}")]
    Model(#[from] carelink_models::Error),

    #[error(transparent)]
    Client(#[from] ClientError),
}

/// Where the CareTeam of a CarePlan is stored, which decides what gets written back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CareTeamLocation {
    /// Standalone `CareTeam/<id>`
    External(String),
    /// Inline in `CarePlan.contained`
    Contained,
}

/// A CarePlan with its CareTeam and activity Tasks, as read from the store.
#[derive(Debug, Clone)]
pub struct CarePlanGraph {
    pub care_plan: CarePlan,
    pub care_team: CareTeam,
    pub location: CareTeamLocation,
    pub activities: Vec<Task>,
}

/// Read a CarePlan, its single CareTeam and all activity Tasks in one search.
pub async fn resolve(
    client: &dyn FhirClient,
    care_plan_id: &str,
) -> Result<CarePlanGraph, CareTeamError> {
    let params = [
        ("_id".to_string(), care_plan_id.to_string()),
        ("_include".to_string(), "CarePlan:care-team".to_string()),
        (
            "_include".to_string(),
            "CarePlan:activity-reference".to_string(),
        ),
    ];
    let bundle = client.search("CarePlan", &params).await?;

    let malformed = |reason: String| CareTeamError::MalformedCarePlan {
        care_plan_id: care_plan_id.to_string(),
        reason,
    };

    let care_plan = bundle
        .resources_of_type("CarePlan")
        .find(|r| r.get("id").and_then(|v| v.as_str()) == Some(care_plan_id))
        .ok_or_else(|| CareTeamError::CarePlanNotFound(care_plan_id.to_string()))
        .and_then(|r| CarePlan::from_value(r).map_err(|e| malformed(e.to_string())))?;

    if care_plan.care_team.len() != 1 {
        return Err(CareTeamError::CareTeamCardinality {
            care_plan_id: care_plan_id.to_string(),
            count: care_plan.care_team.len(),
        });
    }
    let team_ref = &care_plan.care_team[0];
    let not_found = || CareTeamError::CareTeamNotFound {
        care_plan_id: care_plan_id.to_string(),
        reference: team_ref.reference.clone().unwrap_or_default(),
    };

    let (care_team, location) = if let Some(local_id) = team_ref.contained_id() {
        let team = care_plan
            .contained_care_team(local_id)
            .ok_or_else(not_found)?
            .map_err(|e| malformed(e.to_string()))?;
        (team, CareTeamLocation::Contained)
    } else {
        let team_id = match team_ref.type_and_id() {
            Some(("CareTeam", id)) => id.to_string(),
            _ => {
                return Err(malformed(format!(
                    "careTeam reference '{}' is not a CareTeam reference",
                    team_ref.reference.as_deref().unwrap_or_default()
                )))
            }
        };
        let team = bundle
            .resources_of_type("CareTeam")
            .find(|r| r.get("id").and_then(|v| v.as_str()) == Some(team_id.as_str()))
            .ok_or_else(not_found)
            .and_then(|r| CareTeam::from_value(r).map_err(|e| malformed(e.to_string())))?;
        (team, CareTeamLocation::External(team_id))
    };

    let mut activities = Vec::with_capacity(care_plan.activity.len());
    for (index, activity) in care_plan.activity.iter().enumerate() {
        let task_id = activity_task_id(activity.reference.as_ref())
            .ok_or_else(|| malformed(format!("activity[{index}] is not a literal Task reference")))?;

        match bundle
            .resources_of_type("Task")
            .find(|r| r.get("id").and_then(|v| v.as_str()) == Some(task_id))
        {
            Some(resource) => {
                let task = Task::from_value(resource)
                    .map_err(|e| malformed(format!("activity Task/{task_id}: {e}")))?;
                activities.push(task);
            }
            None => {
                tracing::warn!(
                    care_plan_id,
                    task_id,
                    "CarePlan activity Task was not returned by the store, ignoring it"
                );
            }
        }
    }

    Ok(CarePlanGraph {
        care_plan,
        care_team,
        location,
        activities,
    })
}

fn activity_task_id(reference: Option<&Reference>) -> Option<&str> {
    let reference = reference?;
    if matches!(reference.reference_type.as_deref(), Some(t) if t != "Task") {
        return None;
    }
    match reference.type_and_id()? {
        ("Task", id) => Some(id),
        _ => None,
    }
}

/// Recompute CareTeam membership for `trigger`. Returns whether the CareTeam changed.
///
/// `other_activities` are the CarePlan's Tasks excluding the triggering Task itself.
pub fn apply(
    care_team: &mut CareTeam,
    other_activities: &[Task],
    trigger: &Task,
    now: DateTime<Utc>,
) -> bool {
    let now = now.to_rfc3339_opts(SecondsFormat::Secs, true);
    let mut changed = false;

    if let Some(requester) = trigger.requester.as_ref() {
        changed |= activate(care_team, requester, &now);
    }

    if let Some(owner) = trigger.owner.as_ref() {
        match trigger.status {
            TaskStatus::Accepted => {
                changed |= activate(care_team, owner, &now);
            }
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled => {
                if let Some(owner_id) = owner.logical_identifier() {
                    if owns_live_task(other_activities, owner_id) {
                        tracing::debug!(
                            owner = %owner_id,
                            "Owner still has live Tasks in this CarePlan, membership unchanged"
                        );
                    } else {
                        changed |= deactivate(care_team, owner_id, &now);
                    }
                }
            }
            TaskStatus::Requested | TaskStatus::InProgress | TaskStatus::OnHold => {}
        }
    }

    if changed {
        care_team.participant.sort_by_key(|p| {
            p.member_identifier()
                .and_then(|id| id.value.clone())
                .unwrap_or_default()
        });
    }
    changed
}

fn owns_live_task(tasks: &[Task], owner: &Identifier) -> bool {
    tasks.iter().any(|t| {
        t.status.keeps_owner_active()
            && t.owner.as_ref().and_then(Reference::logical_identifier) == Some(owner)
    })
}

fn activate(care_team: &mut CareTeam, party: &Reference, now: &str) -> bool {
    let Some(identifier) = party.logical_identifier() else {
        tracing::debug!(
            reference = ?party.reference,
            "Party has no logical identifier, cannot be a CareTeam member"
        );
        return false;
    };
    if care_team.has_active_member(identifier) {
        return false;
    }

    let member = Reference::logical(
        Some(party.reference_type.as_deref().unwrap_or("Organization")),
        identifier.clone(),
    );
    care_team
        .participant
        .push(CareTeamParticipant::active(member, now));
    true
}

fn deactivate(care_team: &mut CareTeam, member: &Identifier, now: &str) -> bool {
    match care_team.active_member_mut(member) {
        Some(participant) => {
            participant.period.get_or_insert_with(Default::default).end = Some(now.to_string());
            true
        }
        None => false,
    }
}

/// Recompute the CareTeam of CarePlan `care_plan_id` for the not yet persisted `trigger`
/// and append the CareTeam update to `tx`.
///
/// Subtasks never change membership. Nothing is appended unless the CareTeam changed, and
/// nothing is appended on error.
pub async fn update(
    client: &dyn FhirClient,
    care_plan_id: &str,
    trigger: &Task,
    tx: &mut TransactionBuilder,
) -> Result<bool, CareTeamError> {
    if trigger.is_subtask() {
        tracing::debug!(task_id = ?trigger.id, "Subtask does not affect CareTeam membership");
        return Ok(false);
    }

    let CarePlanGraph {
        mut care_plan,
        mut care_team,
        location,
        activities,
    } = resolve(client, care_plan_id).await?;

    let other_activities: Vec<Task> = activities
        .into_iter()
        .filter(|t| t.id != trigger.id)
        .collect();

    if !apply(&mut care_team, &other_activities, trigger, Utc::now()) {
        return Ok(false);
    }

    // Guarded by the version that was resolved; a concurrent writer fails the transaction.
    match location {
        CareTeamLocation::External(team_id) => {
            let value = care_team.to_value()?;
            let etag = weak_etag(&value);
            tx.update(value, format!("CareTeam/{team_id}"), etag);
        }
        CareTeamLocation::Contained => {
            care_plan.replace_contained_care_team(&care_team)?;
            let value = care_plan.to_value()?;
            let etag = weak_etag(&value);
            tx.update(value, format!("CarePlan/{care_plan_id}"), etag);
        }
    }

    tracing::info!(
        care_plan_id,
        task_id = ?trigger.id,
        task_status = %trigger.status,
        participants = care_team.participant.len(),
        "CareTeam membership updated"
    );
    Ok(true)
}
