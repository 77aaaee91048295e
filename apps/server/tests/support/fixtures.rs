use carelink_models::Identifier;
use serde_json::{json, Value};

pub const URA: &str = "http://fhir.nl/fhir/NamingSystem/ura";
pub const PATIENT: &str = "Patient/p1";

pub fn org(value: &str) -> Identifier {
    Identifier::new(URA, value)
}

pub fn org_ref(value: &str) -> Value {
    json!({"type": "Organization", "identifier": {"system": URA, "value": value}})
}

pub fn participant(value: &str, start: &str, end: Option<&str>) -> Value {
    let mut period = json!({"start": start});
    if let Some(end) = end {
        period["end"] = json!(end);
    }
    json!({"member": org_ref(value), "period": period})
}

/// `CareTeam/<id>` with the given participants.
pub fn care_team(id: &str, participants: Vec<Value>) -> Value {
    json!({
        "resourceType": "CareTeam",
        "id": id,
        "subject": {"reference": PATIENT},
        "participant": participants
    })
}

/// `CarePlan/<id>` pointing at `CareTeam/<team_id>` with the given activity Task ids.
pub fn care_plan(id: &str, team_id: &str, task_ids: &[&str]) -> Value {
    let activity: Vec<Value> = task_ids
        .iter()
        .map(|t| json!({"reference": {"reference": format!("Task/{t}"), "type": "Task"}}))
        .collect();
    json!({
        "resourceType": "CarePlan",
        "id": id,
        "status": "active",
        "intent": "order",
        "subject": {"reference": PATIENT},
        "careTeam": [{"reference": format!("CareTeam/{team_id}")}],
        "activity": activity
    })
}

/// Top-level Task of `CarePlan/<care_plan_id>` from `requester` to `owner`.
pub fn task(id: Option<&str>, care_plan_id: &str, status: &str, requester: &str, owner: &str) -> Value {
    let mut task = json!({
        "resourceType": "Task",
        "status": status,
        "intent": "order",
        "for": {"reference": PATIENT},
        "basedOn": [{"reference": format!("CarePlan/{care_plan_id}"), "type": "CarePlan"}],
        "requester": org_ref(requester),
        "owner": org_ref(owner)
    });
    if let Some(id) = id {
        task["id"] = json!(id);
    }
    task
}

/// Active members of a CareTeam resource, sorted by identifier value.
pub fn active_members(team: &Value) -> Vec<String> {
    let mut members: Vec<String> = team["participant"]
        .as_array()
        .into_iter()
        .flatten()
        .filter(|p| p["period"]["end"].is_null())
        .filter_map(|p| p["member"]["identifier"]["value"].as_str().map(str::to_string))
        .collect();
    members.sort();
    members
}

/// Members whose participation has ended, sorted by identifier value.
pub fn ended_members(team: &Value) -> Vec<String> {
    let mut members: Vec<String> = team["participant"]
        .as_array()
        .into_iter()
        .flatten()
        .filter(|p| !p["period"]["end"].is_null())
        .filter_map(|p| p["member"]["identifier"]["value"].as_str().map(str::to_string))
        .collect();
    members.sort();
    members
}
