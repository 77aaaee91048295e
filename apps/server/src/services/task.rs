//! Task create and update.

use super::{commit, notify_in_background, require_type, Committed};
use crate::careteam;
use crate::client::FhirClient;
use crate::subscriptions::SubscriptionManager;
use crate::{Error, Result};
use carelink_models::{
    CarePlan, CarePlanActivity, Reference, Task, TransactionBuilder, weak_etag,
};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use uuid::Uuid;

pub struct TaskService {
    client: Arc<dyn FhirClient>,
    notifier: Arc<dyn SubscriptionManager>,
}

/// Where the CareTeam update (if any) sits in the transaction.
struct PendingWrite {
    tx: TransactionBuilder,
    care_team_entry: Option<usize>,
}

impl TaskService {
    pub fn new(client: Arc<dyn FhirClient>, notifier: Arc<dyn SubscriptionManager>) -> Self {
        Self { client, notifier }
    }

    /// Create a Task. A top-level Task joins its CarePlan's activities and updates the
    /// CareTeam in the same transaction.
    pub async fn create(&self, mut resource: JsonValue) -> Result<Committed> {
        require_type(&resource, "Task")?;
        // Server assigned.
        if let Some(object) = resource.as_object_mut() {
            object.remove("id");
        }
        let task = Task::from_value(&resource)?;
        validate(&task)?;

        let full_url = format!("urn:uuid:{}", Uuid::new_v4());
        let mut tx = TransactionBuilder::new();
        tx.create(resource, full_url.as_str())?;

        let pending = if task.is_subtask() {
            PendingWrite {
                tx,
                care_team_entry: None,
            }
        } else {
            let care_plan_id = care_plan_id(&task)?;
            let mut pending = self.with_care_team(tx, &care_plan_id, &task).await?;
            self.link_activity(&mut pending.tx, &care_plan_id, &full_url)
                .await?;
            pending
        };

        let committed = self.commit_and_notify(pending).await?;
        tracing::info!(
            task_id = crate::models::resource_id(&committed.resource).unwrap_or(""),
            status = %task.status,
            subtask = task.is_subtask(),
            "Task created"
        );
        Ok(committed)
    }

    /// Replace `Task/<id>`, enforcing the status lifecycle against the stored version.
    pub async fn update(&self, id: &str, mut resource: JsonValue) -> Result<Committed> {
        require_type(&resource, "Task")?;
        match crate::models::resource_id(&resource) {
            Some(body_id) if body_id != id => {
                return Err(Error::InvalidResource(format!(
                    "Task.id '{body_id}' does not match the request URL id '{id}'"
                )))
            }
            Some(_) => {}
            None => {
                if let Some(object) = resource.as_object_mut() {
                    object.insert("id".to_string(), JsonValue::String(id.to_string()));
                }
            }
        }

        let task = Task::from_value(&resource)?;
        validate(&task)?;

        let stored_value = self.client.read("Task", id).await?;
        let stored = Task::from_value(&stored_value)?;
        ensure_same_lineage(id, &stored, &task)?;
        if !stored.status.can_transition_to(task.status) {
            return Err(Error::BusinessRule(format!(
                "Task/{id} cannot transition from '{}' to '{}'",
                stored.status, task.status
            )));
        }

        let mut tx = TransactionBuilder::new();
        tx.update(resource, format!("Task/{id}"), weak_etag(&stored_value));

        let pending = if task.is_subtask() {
            PendingWrite {
                tx,
                care_team_entry: None,
            }
        } else {
            self.with_care_team(tx, &care_plan_id(&task)?, &task).await?
        };

        let committed = self.commit_and_notify(pending).await?;
        tracing::info!(
            task_id = id,
            from = %stored.status,
            to = %task.status,
            "Task updated"
        );
        Ok(committed)
    }

    async fn with_care_team(
        &self,
        mut tx: TransactionBuilder,
        care_plan_id: &str,
        task: &Task,
    ) -> Result<PendingWrite> {
        let changed = careteam::update(self.client.as_ref(), care_plan_id, task, &mut tx).await?;
        let care_team_entry = changed.then(|| tx.len() - 1);
        Ok(PendingWrite {
            tx,
            care_team_entry,
        })
    }

    /// Add the new Task to `CarePlan.activity`. When the CareTeam update already rewrites
    /// the CarePlan (contained CareTeam), that entry is amended instead of adding another.
    async fn link_activity(
        &self,
        tx: &mut TransactionBuilder,
        care_plan_id: &str,
        task_full_url: &str,
    ) -> Result<()> {
        let url = format!("CarePlan/{care_plan_id}");
        let mut activity_ref = Reference::literal(task_full_url);
        activity_ref.reference_type = Some("Task".to_string());

        if let Some(pending) = tx.entry_resource_mut(&url) {
            let mut plan = CarePlan::from_value(pending)?;
            plan.activity.push(CarePlanActivity::new(activity_ref));
            *pending = plan.to_value()?;
            return Ok(());
        }

        let mut plan = match self.client.read("CarePlan", care_plan_id).await {
            Ok(value) => CarePlan::from_value(&value)?,
            Err(e) if e.is_not_found() => {
                return Err(Error::InvalidReference(format!(
                    "Task.basedOn references unknown CarePlan/{care_plan_id}"
                )))
            }
            Err(e) => return Err(e.into()),
        };
        plan.activity.push(CarePlanActivity::new(activity_ref));
        let value = plan.to_value()?;
        let etag = weak_etag(&value);
        tx.update(value, url, etag);
        Ok(())
    }

    async fn commit_and_notify(&self, pending: PendingWrite) -> Result<Committed> {
        let stored = commit(self.client.as_ref(), pending.tx).await?;

        let task = stored
            .first()
            .cloned()
            .ok_or_else(|| Error::Internal("empty transaction response".to_string()))?;

        let mut notify = vec![task.clone()];
        if let Some(team) = pending.care_team_entry.and_then(|i| stored.get(i)) {
            notify.push(team.clone());
        }

        Ok(Committed {
            resource: task,
            notifications: notify_in_background(Arc::clone(&self.notifier), notify),
        })
    }
}

fn validate(task: &Task) -> Result<()> {
    if task.requester.is_none() {
        return Err(Error::InvalidResource("Task.requester is required".to_string()));
    }
    if !task.is_subtask() && task.care_plan_reference().is_none() {
        return Err(Error::InvalidReference(
            "Task.basedOn must reference a CarePlan".to_string(),
        ));
    }
    Ok(())
}

/// A Task stays with the CarePlan and parent Task it was created under.
fn ensure_same_lineage(id: &str, stored: &Task, task: &Task) -> Result<()> {
    let care_plan = |t: &Task| t.care_plan_reference().map(|(_, plan)| plan.to_string());
    if care_plan(stored) != care_plan(task) {
        return Err(Error::BusinessRule(format!(
            "Task/{id} cannot move from CarePlan/{} to CarePlan/{}",
            care_plan(stored).unwrap_or_default(),
            care_plan(task).unwrap_or_default()
        )));
    }

    let parents = |t: &Task| -> Vec<Option<String>> {
        t.part_of.iter().map(|r| r.reference.clone()).collect()
    };
    if parents(stored) != parents(task) {
        return Err(Error::BusinessRule(format!("Task/{id} cannot change its partOf")));
    }
    Ok(())
}

fn care_plan_id(task: &Task) -> Result<String> {
    task.care_plan_reference()
        .map(|(_, id)| id.to_string())
        .ok_or_else(|| Error::InvalidReference("Task.basedOn must reference a CarePlan".to_string()))
}
