//! Write orchestration: each write is one store transaction followed by notifications.

pub mod care_plan;
pub mod task;

pub use care_plan::CarePlanService;
pub use task::TaskService;

use crate::client::FhirClient;
use crate::subscriptions::SubscriptionManager;
use crate::{Error, Result};
use carelink_models::{Bundle, Reference, TransactionBuilder};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Result of a committed write.
#[derive(Debug)]
pub struct Committed {
    /// The primary resource as stored
    pub resource: JsonValue,
    /// Background delivery of the notifications this write triggered. Dropping the handle
    /// detaches it; deliveries keep running.
    pub notifications: JoinHandle<()>,
}

/// Submit `tx` and return the stored version of every entry, in entry order.
pub(crate) async fn commit(
    client: &dyn FhirClient,
    tx: TransactionBuilder,
) -> Result<Vec<JsonValue>> {
    let request = tx.build();
    let response = client.transaction(&request).await?;
    let stored = committed_resources(&request, &response);
    tracing::debug!(entries = stored.len(), "Transaction committed");
    Ok(stored)
}

/// Pair each transaction entry with its result. A response entry that carries the resource
/// is used as is; otherwise the submitted resource gets the id from `response.location`.
/// Entries without a resource yield `Null` so indexes stay aligned with the request.
fn committed_resources(request: &Bundle, response: &Bundle) -> Vec<JsonValue> {
    request
        .entries()
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            let result = response.entries().get(index);
            if let Some(stored) = result.and_then(|e| e.resource.clone()) {
                return stored;
            }
            let Some(mut resource) = entry.resource.clone() else {
                return JsonValue::Null;
            };
            let location = result
                .and_then(|e| e.response.as_ref())
                .and_then(|r| r.location.clone());
            if let Some(location) = location {
                let reference = Reference::literal(location);
                if let (Some((_, id)), Some(object)) =
                    (reference.type_and_id(), resource.as_object_mut())
                {
                    object.insert("id".to_string(), JsonValue::String(id.to_string()));
                }
            }
            resource
        })
        .collect()
}

/// Notify each resource in turn on a background task. Failures are logged, never returned:
/// the write they follow is already committed.
pub(crate) fn notify_in_background(
    notifier: Arc<dyn SubscriptionManager>,
    resources: Vec<JsonValue>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        for resource in resources {
            if let Err(e) = notifier.notify(&resource).await {
                tracing::warn!(
                    focus = ?crate::models::local_reference(&resource).and_then(|r| r.reference),
                    error = %e,
                    "Notification failed"
                );
            }
        }
    })
}

fn require_type(resource: &JsonValue, expected: &str) -> Result<()> {
    match crate::models::resource_type(resource) {
        Some(t) if t == expected => Ok(()),
        Some(t) => Err(Error::InvalidResource(format!(
            "expected resourceType '{expected}', got '{t}'"
        ))),
        None => Err(Error::InvalidResource("missing resourceType".to_string())),
    }
}
