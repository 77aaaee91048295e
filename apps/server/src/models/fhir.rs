//! Accessors for untyped FHIR resources (`serde_json::Value`).

use carelink_models::Reference;
use serde_json::Value as JsonValue;

pub fn resource_type(resource: &JsonValue) -> Option<&str> {
    resource.get("resourceType").and_then(JsonValue::as_str)
}

pub fn resource_id(resource: &JsonValue) -> Option<&str> {
    resource.get("id").and_then(JsonValue::as_str)
}

/// True for names shaped like a FHIR resource type (`CarePlan`, not `metadata` or `_search`).
pub fn is_resource_type(name: &str) -> bool {
    name.starts_with(|c: char| c.is_ascii_uppercase()) && name.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Relative literal reference to a stored resource (`Type/id`), with its type set.
pub fn local_reference(resource: &JsonValue) -> Option<Reference> {
    let resource_type = resource_type(resource)?;
    let id = resource_id(resource)?;
    let mut reference = Reference::literal(format!("{resource_type}/{id}"));
    reference.reference_type = Some(resource_type.to_string());
    Some(reference)
}

/// Decode a raw query string into `(name, value)` pairs, keeping repeated parameters.
pub fn parse_query(query: &str) -> Vec<(String, String)> {
    url::form_urlencoded::parse(query.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .filter(|(k, _)| !k.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_local_reference() {
        let task = json!({"resourceType": "Task", "id": "7"});
        let reference = local_reference(&task).unwrap();
        assert_eq!(reference.reference.as_deref(), Some("Task/7"));
        assert_eq!(reference.reference_type.as_deref(), Some("Task"));

        assert!(local_reference(&json!({"resourceType": "Task"})).is_none());
    }

    #[test]
    fn test_is_resource_type() {
        assert!(is_resource_type("CarePlan"));
        assert!(!is_resource_type("metadata"));
        assert!(!is_resource_type("_search"));
        assert!(!is_resource_type("Task$x"));
    }

    #[test]
    fn test_parse_query_keeps_repeats_and_decodes() {
        let params = parse_query("_include=CarePlan:care-team&_include=CarePlan:activity-reference&subject=Patient%2F1&=x");
        assert_eq!(
            params,
            vec![
                ("_include".to_string(), "CarePlan:care-team".to_string()),
                ("_include".to_string(), "CarePlan:activity-reference".to_string()),
                ("subject".to_string(), "Patient/1".to_string()),
            ]
        );
    }
}
