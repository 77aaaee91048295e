//! CarePlan creation.

use super::{commit, notify_in_background, require_type, Committed};
use crate::auth::Principal;
use crate::client::FhirClient;
use crate::subscriptions::SubscriptionManager;
use crate::{Error, Result};
use carelink_models::{
    CarePlan, CareTeam, CareTeamParticipant, Reference, TransactionBuilder,
};
use chrono::{SecondsFormat, Utc};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use uuid::Uuid;

/// Local id of the CareTeam contained in every CarePlan this service creates.
pub const CONTAINED_CARE_TEAM_ID: &str = "careteam";

pub struct CarePlanService {
    client: Arc<dyn FhirClient>,
    notifier: Arc<dyn SubscriptionManager>,
}

impl CarePlanService {
    pub fn new(client: Arc<dyn FhirClient>, notifier: Arc<dyn SubscriptionManager>) -> Self {
        Self { client, notifier }
    }

    /// Create a CarePlan with a fresh contained CareTeam whose first member is the creating
    /// organization.
    pub async fn create(&self, creator: &Principal, resource: JsonValue) -> Result<Committed> {
        require_type(&resource, "CarePlan")?;
        let mut plan = CarePlan::from_value(&resource)?;
        plan.id = None;

        if plan.subject.is_none() {
            return Err(Error::InvalidResource("CarePlan.subject is required".to_string()));
        }
        if !plan.care_team.is_empty() {
            return Err(Error::InvalidResource(
                "CarePlan.careTeam is managed by the server and must be empty".to_string(),
            ));
        }

        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        let mut team = CareTeam::new();
        team.id = Some(CONTAINED_CARE_TEAM_ID.to_string());
        team.subject = plan.subject.clone();
        team.participant.push(CareTeamParticipant::active(
            Reference::logical(Some("Organization"), creator.organization.clone()),
            now,
        ));

        plan.contained
            .retain(|r| crate::models::resource_id(r) != Some(CONTAINED_CARE_TEAM_ID));
        plan.contained.push(team.to_value()?);
        plan.care_team = vec![Reference::literal(format!("#{CONTAINED_CARE_TEAM_ID}"))];

        let mut tx = TransactionBuilder::new();
        tx.create(plan.to_value()?, format!("urn:uuid:{}", Uuid::new_v4()))?;

        let stored = commit(self.client.as_ref(), tx).await?;
        let care_plan = stored
            .into_iter()
            .next()
            .ok_or_else(|| Error::Internal("empty transaction response".to_string()))?;

        tracing::info!(
            care_plan_id = crate::models::resource_id(&care_plan).unwrap_or(""),
            creator = %creator.organization,
            "CarePlan created"
        );

        Ok(Committed {
            notifications: notify_in_background(Arc::clone(&self.notifier), vec![care_plan.clone()]),
            resource: care_plan,
        })
    }
}
