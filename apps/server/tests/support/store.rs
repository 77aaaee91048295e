//! In-memory FHIR resource server.
//!
//! Implements just enough of the RESTful API for the orchestrator: read, the CarePlan
//! searches (`_id`, `subject`, `_include`) and atomic transactions that resolve
//! `urn:uuid:` references between entries. Every write bumps `meta.versionId`, and a
//! transaction entry whose `ifMatch` is stale fails the whole transaction with 412.

use async_trait::async_trait;
use carelink::client::{ClientError, FhirClient, SearchParams};
use carelink_models::{
    Bundle, BundleEntry, BundleEntryResponse, BundleEntrySearch, BundleEntrySearchMode,
    BundleType, Reference,
};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

type Key = (String, String);

#[derive(Default)]
pub struct MemoryFhirClient {
    resources: Mutex<BTreeMap<Key, Value>>,
    transactions: Mutex<Vec<Bundle>>,
    searches: Mutex<Vec<(String, Vec<(String, String)>)>>,
    next_id: AtomicU64,
    fail_transactions: AtomicBool,
    minimal_responses: AtomicBool,
}

impl MemoryFhirClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `resource` as is; it must carry `resourceType` and `id`.
    pub fn put(&self, resource: Value) {
        let key = key_of(&resource).expect("seed resource needs resourceType and id");
        self.resources.lock().unwrap().insert(key, resource);
    }

    pub fn get(&self, resource_type: &str, id: &str) -> Option<Value> {
        self.resources
            .lock()
            .unwrap()
            .get(&(resource_type.to_string(), id.to_string()))
            .cloned()
    }

    pub fn all_of_type(&self, resource_type: &str) -> Vec<Value> {
        self.resources
            .lock()
            .unwrap()
            .iter()
            .filter(|((t, _), _)| t == resource_type)
            .map(|(_, r)| r.clone())
            .collect()
    }

    pub fn transactions(&self) -> Vec<Bundle> {
        self.transactions.lock().unwrap().clone()
    }

    pub fn searches(&self) -> Vec<(String, Vec<(String, String)>)> {
        self.searches.lock().unwrap().clone()
    }

    /// Reject every transaction with HTTP 409, leaving the store untouched.
    pub fn fail_transactions(&self, fail: bool) {
        self.fail_transactions.store(fail, Ordering::SeqCst);
    }

    /// Answer transactions with `response.location` only, like `Prefer: return=minimal`.
    pub fn minimal_responses(&self, minimal: bool) {
        self.minimal_responses.store(minimal, Ordering::SeqCst);
    }

    fn assign_id(&self) -> String {
        format!("{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

fn key_of(resource: &Value) -> Option<Key> {
    Some((
        resource.get("resourceType")?.as_str()?.to_string(),
        resource.get("id")?.as_str()?.to_string(),
    ))
}

fn version_of(resource: &Value) -> u64 {
    resource
        .pointer("/meta/versionId")
        .and_then(Value::as_str)
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

/// Stamp the version following `previous` onto `resource`.
fn next_version(resource: &mut Value, previous: Option<&Value>) -> u64 {
    let version = previous.map(version_of).unwrap_or(0) + 1;
    resource["meta"]["versionId"] = json!(version.to_string());
    version
}

fn not_found(method: &str, resource_type: &str, id: &str) -> ClientError {
    ClientError::OperationOutcome {
        method: method.to_string(),
        url: format!("memory:///{resource_type}/{id}"),
        status: 404,
        outcome: Some(json!({
            "resourceType": "OperationOutcome",
            "issue": [{
                "severity": "error",
                "code": "not-found",
                "diagnostics": format!("{resource_type}/{id} not found")
            }]
        })),
    }
}

fn matches_param(resource: &Value, name: &str, value: &str) -> bool {
    match name {
        "_include" => true,
        "_id" => resource.get("id").and_then(Value::as_str) == Some(value),
        "subject" => resource["subject"]["reference"].as_str() == Some(value),
        "subject:Patient.identifier" => match value.split_once('|') {
            Some((system, id)) => {
                resource["subject"]["identifier"]["system"].as_str() == Some(system)
                    && resource["subject"]["identifier"]["value"].as_str() == Some(id)
            }
            None => false,
        },
        _ => true,
    }
}

/// Literal `Type/id` references found at `pointer` in each array element of `field`.
fn literal_targets(resource: &Value, field: &str, pointer: &str) -> Vec<Key> {
    resource
        .get(field)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|item| item.pointer(pointer).and_then(Value::as_str))
        .filter_map(|reference| {
            Reference::literal(reference)
                .type_and_id()
                .map(|(t, id)| (t.to_string(), id.to_string()))
        })
        .collect()
}

fn search_entry(resource: Value, mode: BundleEntrySearchMode) -> BundleEntry {
    BundleEntry {
        full_url: key_of(&resource).map(|(t, id)| format!("memory:///{t}/{id}")),
        resource: Some(resource),
        search: Some(BundleEntrySearch {
            mode: Some(mode),
            extensions: HashMap::new(),
        }),
        ..Default::default()
    }
}

#[async_trait]
impl FhirClient for MemoryFhirClient {
    async fn read(&self, resource_type: &str, id: &str) -> Result<Value, ClientError> {
        self.get(resource_type, id)
            .ok_or_else(|| not_found("GET", resource_type, id))
    }

    async fn search(
        &self,
        resource_type: &str,
        params: &SearchParams,
    ) -> Result<Bundle, ClientError> {
        self.searches
            .lock()
            .unwrap()
            .push((resource_type.to_string(), params.to_vec()));

        let store = self.resources.lock().unwrap();
        let matches: Vec<Value> = store
            .iter()
            .filter(|((t, _), _)| t == resource_type)
            .map(|(_, r)| r)
            .filter(|r| params.iter().all(|(n, v)| matches_param(r, n, v)))
            .cloned()
            .collect();

        let mut included: Vec<Key> = Vec::new();
        for (name, value) in params.iter().filter(|(n, _)| n == "_include") {
            for resource in &matches {
                let targets = match value.as_str() {
                    "CarePlan:care-team" => literal_targets(resource, "careTeam", "/reference"),
                    "CarePlan:activity-reference" => {
                        literal_targets(resource, "activity", "/reference/reference")
                    }
                    other => panic!("unsupported {name}={other}"),
                };
                for target in targets {
                    if !included.contains(&target) {
                        included.push(target);
                    }
                }
            }
        }

        let mut bundle = Bundle::new(BundleType::Searchset);
        bundle.total = Some(matches.len() as u32);
        for resource in matches {
            bundle.add_entry(search_entry(resource, BundleEntrySearchMode::Match));
        }
        for key in included {
            if let Some(resource) = store.get(&key) {
                bundle.add_entry(search_entry(resource.clone(), BundleEntrySearchMode::Include));
            }
        }
        Ok(bundle)
    }

    async fn create(&self, resource: &Value) -> Result<Value, ClientError> {
        let mut stored = resource.clone();
        stored["id"] = json!(self.assign_id());
        next_version(&mut stored, None);
        let key = key_of(&stored)
            .ok_or_else(|| ClientError::Decode("resource has no resourceType".to_string()))?;
        self.resources.lock().unwrap().insert(key, stored.clone());
        Ok(stored)
    }

    async fn update(
        &self,
        resource_type: &str,
        id: &str,
        resource: &Value,
    ) -> Result<Value, ClientError> {
        let key = (resource_type.to_string(), id.to_string());
        let mut stored = resource.clone();
        stored["id"] = json!(id);
        let mut store = self.resources.lock().unwrap();
        next_version(&mut stored, store.get(&key));
        store.insert(key, stored.clone());
        Ok(stored)
    }

    async fn delete(&self, resource_type: &str, id: &str) -> Result<(), ClientError> {
        self.resources
            .lock()
            .unwrap()
            .remove(&(resource_type.to_string(), id.to_string()))
            .map(|_| ())
            .ok_or_else(|| not_found("DELETE", resource_type, id))
    }

    async fn transaction(&self, bundle: &Bundle) -> Result<Bundle, ClientError> {
        self.transactions.lock().unwrap().push(bundle.clone());
        if self.fail_transactions.load(Ordering::SeqCst) {
            return Err(ClientError::OperationOutcome {
                method: "POST".to_string(),
                url: "memory:///".to_string(),
                status: 409,
                outcome: None,
            });
        }

        let mut planned = Vec::new();
        let mut rewrites = Vec::new();
        for entry in bundle.entries() {
            let request = entry
                .request
                .as_ref()
                .ok_or_else(|| ClientError::Decode("entry without request".to_string()))?;
            let resource = entry
                .resource
                .clone()
                .ok_or_else(|| ClientError::Decode("entry without resource".to_string()))?;
            let (resource_type, id, status) = match request.method.as_str() {
                "POST" => (request.url.clone(), self.assign_id(), "201 Created"),
                "PUT" => {
                    let reference = Reference::literal(request.url.clone());
                    let (t, id) = reference
                        .type_and_id()
                        .ok_or_else(|| ClientError::Decode(format!("bad url {}", request.url)))?;
                    (t.to_string(), id.to_string(), "200 OK")
                }
                other => return Err(ClientError::Decode(format!("unsupported method {other}"))),
            };
            if let Some(full_url) = entry.full_url.as_ref().filter(|u| u.starts_with("urn:uuid:")) {
                rewrites.push((full_url.clone(), format!("{resource_type}/{id}")));
            }
            planned.push((resource_type, id, resource, status, request.if_match.clone()));
        }

        let minimal = self.minimal_responses.load(Ordering::SeqCst);
        let mut response = Bundle::new(BundleType::TransactionResponse);
        let mut store = self.resources.lock().unwrap();

        for (resource_type, id, _, _, if_match) in &planned {
            let Some(expected) = if_match else { continue };
            let current = store
                .get(&(resource_type.clone(), id.clone()))
                .map(version_of)
                .unwrap_or(0);
            if *expected != format!("W/\"{current}\"") {
                return Err(ClientError::OperationOutcome {
                    method: "POST".to_string(),
                    url: "memory:///".to_string(),
                    status: 412,
                    outcome: Some(json!({
                        "resourceType": "OperationOutcome",
                        "issue": [{
                            "severity": "error",
                            "code": "conflict",
                            "diagnostics": format!(
                                "{resource_type}/{id} is at version {current}, not {expected}"
                            )
                        }]
                    })),
                });
            }
        }

        for (resource_type, id, resource, status, _) in planned {
            let mut text = resource.to_string();
            for (from, to) in &rewrites {
                text = text.replace(&format!("\"{from}\""), &format!("\"{to}\""));
            }
            let mut stored: Value =
                serde_json::from_str(&text).map_err(|e| ClientError::Decode(e.to_string()))?;
            stored["id"] = json!(id);
            let key = (resource_type.clone(), id.clone());
            let version = next_version(&mut stored, store.get(&key));
            store.insert(key, stored.clone());

            response.add_entry(BundleEntry {
                resource: (!minimal).then_some(stored),
                response: Some(BundleEntryResponse {
                    status: status.to_string(),
                    location: Some(format!("{resource_type}/{id}/_history/{version}")),
                    etag: Some(format!("W/\"{version}\"")),
                    outcome: None,
                    extensions: HashMap::new(),
                }),
                ..Default::default()
            });
        }
        Ok(response)
    }
}
