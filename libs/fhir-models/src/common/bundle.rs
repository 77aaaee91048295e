//! FHIR Bundle model and transaction builder
//!
//! Bundles carry search results from the resource store, atomic transaction writes to it,
//! and subscription notifications to receivers.

use super::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// FHIR Bundle resource
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Bundle {
    /// Resource type - always "Bundle"
    #[serde(default = "default_resource_type")]
    pub resource_type: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(rename = "type")]
    pub bundle_type: BundleType,

    /// When the bundle was assembled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,

    /// If search, the total number of matches
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<Vec<BundleLink>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry: Option<Vec<BundleEntry>>,

    /// Additional content beyond core fields (meta, signature, ...)
    #[serde(flatten)]
    pub extensions: HashMap<String, Value>,
}

fn default_resource_type() -> String {
    "Bundle".to_string()
}

/// Type of Bundle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BundleType {
    Document,
    Message,
    Transaction,
    TransactionResponse,
    Batch,
    BatchResponse,
    History,
    Searchset,
    Collection,
    SubscriptionNotification,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleLink {
    pub relation: String,
    pub url: String,
}

/// Entry in the bundle
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<BundleEntrySearch>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<BundleEntryRequest>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<BundleEntryResponse>,

    /// Additional content beyond core fields
    #[serde(flatten)]
    pub extensions: HashMap<String, Value>,
}

/// Request details for a transaction entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleEntryRequest {
    /// GET | POST | PUT | PATCH | DELETE
    pub method: String,

    pub url: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub if_match: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub if_none_exist: Option<String>,

    /// Additional content beyond core fields
    #[serde(flatten)]
    pub extensions: HashMap<String, Value>,
}

/// Outcome of a transaction entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleEntryResponse {
    pub status: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Value>,

    /// Additional content beyond core fields
    #[serde(flatten)]
    pub extensions: HashMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleEntrySearch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<BundleEntrySearchMode>,

    /// Additional content beyond core fields
    #[serde(flatten)]
    pub extensions: HashMap<String, Value>,
}

/// Why an entry is in a search result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BundleEntrySearchMode {
    Match,
    Include,
    Outcome,
}

impl Bundle {
    pub fn new(bundle_type: BundleType) -> Self {
        Self {
            resource_type: default_resource_type(),
            id: None,
            bundle_type,
            timestamp: None,
            total: None,
            link: None,
            entry: None,
            extensions: HashMap::new(),
        }
    }

    /// Parse from JSON Value
    pub fn from_value(value: &Value) -> Result<Self> {
        serde_json::from_value(value.clone()).map_err(Error::from)
    }

    /// Convert to JSON Value
    pub fn to_value(&self) -> Result<Value> {
        serde_json::to_value(self).map_err(Error::from)
    }

    pub fn entries(&self) -> &[BundleEntry] {
        self.entry.as_deref().unwrap_or(&[])
    }

    pub fn add_entry(&mut self, entry: BundleEntry) {
        self.entry.get_or_insert_with(Vec::new).push(entry);
    }

    /// All entry resources, in entry order.
    pub fn resources(&self) -> impl Iterator<Item = &Value> {
        self.entries().iter().filter_map(|e| e.resource.as_ref())
    }

    /// Entry resources whose `resourceType` equals `resource_type`.
    pub fn resources_of_type<'a>(
        &'a self,
        resource_type: &'a str,
    ) -> impl Iterator<Item = &'a Value> + 'a {
        self.resources()
            .filter(move |r| r.get("resourceType").and_then(Value::as_str) == Some(resource_type))
    }

    /// `response.location` of every entry of a transaction-response, in entry order.
    pub fn response_locations(&self) -> Vec<Option<&str>> {
        self.entries()
            .iter()
            .map(|e| e.response.as_ref().and_then(|r| r.location.as_deref()))
            .collect()
    }
}

/// Builds a FHIR `transaction` Bundle whose entries are committed atomically by the store.
///
/// Entries are kept in insertion order, which is also the order of the entries in the
/// transaction-response.
#[derive(Debug, Clone)]
pub struct TransactionBuilder {
    bundle: Bundle,
}

impl TransactionBuilder {
    pub fn new() -> Self {
        Self {
            bundle: Bundle::new(BundleType::Transaction),
        }
    }

    /// Append a `POST <resourceType>` entry. `full_url` is usually a `urn:uuid:` placeholder
    /// that other entries of the same transaction may reference.
    pub fn create(&mut self, resource: Value, full_url: impl Into<String>) -> Result<&mut Self> {
        let resource_type = resource
            .get("resourceType")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::MissingField("resourceType".to_string()))?
            .to_string();
        self.bundle.add_entry(BundleEntry {
            full_url: Some(full_url.into()),
            resource: Some(resource),
            request: Some(BundleEntryRequest {
                method: "POST".to_string(),
                url: resource_type,
                if_match: None,
                if_none_exist: None,
                extensions: HashMap::new(),
            }),
            ..Default::default()
        });
        Ok(self)
    }

    /// Append a `PUT <Type>/<id>` entry. With `if_match` the store rejects the whole
    /// transaction when the resource changed since that version was read.
    pub fn update(
        &mut self,
        resource: Value,
        url: impl Into<String>,
        if_match: Option<String>,
    ) -> &mut Self {
        let url = url.into();
        self.bundle.add_entry(BundleEntry {
            full_url: Some(url.clone()),
            resource: Some(resource),
            request: Some(BundleEntryRequest {
                method: "PUT".to_string(),
                url,
                if_match,
                if_none_exist: None,
                extensions: HashMap::new(),
            }),
            ..Default::default()
        });
        self
    }

    /// Resource of the entry whose request URL is `url`, for amending a pending write.
    pub fn entry_resource_mut(&mut self, url: &str) -> Option<&mut Value> {
        self.bundle
            .entry
            .as_mut()?
            .iter_mut()
            .find(|e| e.request.as_ref().is_some_and(|r| r.url == url))?
            .resource
            .as_mut()
    }

    pub fn len(&self) -> usize {
        self.bundle.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn entries(&self) -> &[BundleEntry] {
        self.bundle.entries()
    }

    /// Request URLs of all entries, e.g. `["Task", "CareTeam/1"]`.
    pub fn request_urls(&self) -> Vec<&str> {
        self.entries()
            .iter()
            .filter_map(|e| e.request.as_ref().map(|r| r.url.as_str()))
            .collect()
    }

    pub fn build(self) -> Bundle {
        self.bundle
    }
}

/// Weak ETag (`W/"<versionId>"`) of a resource as read from the store.
pub fn weak_etag(resource: &Value) -> Option<String> {
    resource
        .pointer("/meta/versionId")
        .and_then(Value::as_str)
        .map(|version| format!("W/\"{version}\""))
}

impl Default for TransactionBuilder {
    fn default() -> Self {
        Self::new()
    }
}
