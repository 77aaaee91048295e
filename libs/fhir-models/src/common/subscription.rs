//! Topic-based subscription notification envelope
//!
//! Notifications follow the R4 Subscriptions Backport IG: a `history` Bundle whose first
//! entry is a `Parameters` resource describing the subscription status and the event.

use super::bundle::{Bundle, BundleEntry, BundleType};
use super::datatypes::Reference;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

pub const NOTIFICATION_BUNDLE_PROFILE: &str =
    "http://hl7.org/fhir/uv/subscriptions-backport/StructureDefinition/backport-subscription-notification-r4";
pub const SUBSCRIPTION_STATUS_PROFILE: &str =
    "http://hl7.org/fhir/uv/subscriptions-backport/StructureDefinition/backport-subscription-status-r4";

/// A single event notification. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(into = "Bundle")]
pub struct SubscriptionNotification {
    id: Uuid,
    timestamp: DateTime<Utc>,
    subscription: Reference,
    event_number: u64,
    focus: Reference,
}

impl SubscriptionNotification {
    /// New notification with a fresh id, stamped now.
    pub fn new(subscription: Reference, event_number: u64, focus: Reference) -> Self {
        Self::at(Utc::now(), subscription, event_number, focus)
    }

    pub fn at(
        timestamp: DateTime<Utc>,
        subscription: Reference,
        event_number: u64,
        focus: Reference,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp,
            subscription,
            event_number,
            focus,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn subscription(&self) -> &Reference {
        &self.subscription
    }

    pub fn event_number(&self) -> u64 {
        self.event_number
    }

    pub fn focus(&self) -> &Reference {
        &self.focus
    }

    fn status_parameters(&self, instant: &str) -> Value {
        json!({
            "resourceType": "Parameters",
            "meta": {"profile": [SUBSCRIPTION_STATUS_PROFILE]},
            "parameter": [
                {"name": "subscription", "valueReference": self.subscription},
                {"name": "status", "valueCode": "active"},
                {"name": "type", "valueCode": "event-notification"},
                {
                    "name": "notification-event",
                    "part": [
                        {"name": "event-number", "valueString": self.event_number.to_string()},
                        {"name": "timestamp", "valueInstant": instant},
                        {"name": "focus", "valueReference": self.focus}
                    ]
                }
            ]
        })
    }
}

impl From<SubscriptionNotification> for Bundle {
    fn from(notification: SubscriptionNotification) -> Self {
        let instant = notification
            .timestamp
            .to_rfc3339_opts(SecondsFormat::Millis, true);

        let mut bundle = Bundle::new(BundleType::History);
        bundle.id = Some(notification.id.to_string());
        bundle.timestamp = Some(instant.clone());
        bundle.extensions.insert(
            "meta".to_string(),
            json!({"profile": [NOTIFICATION_BUNDLE_PROFILE]}),
        );
        bundle.add_entry(BundleEntry {
            full_url: Some(format!("urn:uuid:{}", notification.id)),
            resource: Some(notification.status_parameters(&instant)),
            ..Default::default()
        });
        bundle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_wire_shape() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        let mut focus = Reference::literal("Task/42");
        focus.reference_type = Some("Task".to_string());
        let notification =
            SubscriptionNotification::at(ts, Reference::literal("Subscription/s1"), 7, focus);

        let json = serde_json::to_value(&notification).unwrap();
        assert_eq!(json["resourceType"], "Bundle");
        assert_eq!(json["type"], "history");
        assert_eq!(json["id"], notification.id().to_string());
        assert_eq!(json["timestamp"], "2024-05-01T12:30:00.000Z");
        assert_eq!(json["meta"]["profile"][0], NOTIFICATION_BUNDLE_PROFILE);

        let entry = &json["entry"][0];
        assert_eq!(entry["fullUrl"], format!("urn:uuid:{}", notification.id()));

        let params = &entry["resource"]["parameter"];
        assert_eq!(entry["resource"]["resourceType"], "Parameters");
        assert_eq!(params[0]["name"], "subscription");
        assert_eq!(params[0]["valueReference"]["reference"], "Subscription/s1");
        assert_eq!(params[1]["name"], "status");
        assert_eq!(params[1]["valueCode"], "active");
        assert_eq!(params[2]["name"], "type");
        assert_eq!(params[2]["valueCode"], "event-notification");

        let event = &params[3];
        assert_eq!(event["name"], "notification-event");
        assert_eq!(event["part"][0]["name"], "event-number");
        assert_eq!(event["part"][0]["valueString"], "7");
        assert_eq!(event["part"][1]["name"], "timestamp");
        assert_eq!(event["part"][1]["valueInstant"], "2024-05-01T12:30:00.000Z");
        assert_eq!(event["part"][2]["name"], "focus");
        assert_eq!(event["part"][2]["valueReference"]["reference"], "Task/42");
        assert_eq!(event["part"][2]["valueReference"]["type"], "Task");
    }

    #[test]
    fn test_each_notification_gets_fresh_id() {
        let a = SubscriptionNotification::new(
            Reference::literal("Subscription/s"),
            1,
            Reference::literal("Task/1"),
        );
        let b = SubscriptionNotification::new(
            Reference::literal("Subscription/s"),
            1,
            Reference::literal("Task/1"),
        );
        assert_ne!(a.id(), b.id());
    }
}
