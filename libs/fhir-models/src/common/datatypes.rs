//! FHIR complex datatypes shared by the care coordination resources

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};

/// An identifier for an organization (or any other business entity).
///
/// Two identifiers are equal when their `system` and `value` are equal. `type`, `use`,
/// `period` and any other property are ignored for comparison.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identifier {
    /// The namespace for the identifier value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    /// The value that is unique within the system
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    /// Additional content beyond core fields
    #[serde(flatten)]
    pub extensions: HashMap<String, Value>,
}

impl Identifier {
    pub fn new(system: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            system: Some(system.into()),
            value: Some(value.into()),
            extensions: HashMap::new(),
        }
    }

    /// Parse a search-token style `system|value` string.
    pub fn from_token(token: &str) -> Option<Self> {
        let (system, value) = token.split_once('|')?;
        if system.is_empty() || value.is_empty() {
            return None;
        }
        Some(Self::new(system, value))
    }

    /// Render as a search token (`system|value`).
    pub fn to_token(&self) -> String {
        format!(
            "{}|{}",
            self.system.as_deref().unwrap_or_default(),
            self.value.as_deref().unwrap_or_default()
        )
    }

    /// True when both system and value are set and non-empty.
    pub fn is_complete(&self) -> bool {
        matches!(&self.system, Some(s) if !s.is_empty())
            && matches!(&self.value, Some(v) if !v.is_empty())
    }
}

impl PartialEq for Identifier {
    fn eq(&self, other: &Self) -> bool {
        self.system == other.system && self.value == other.value
    }
}

impl Eq for Identifier {}

impl Hash for Identifier {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.system.hash(state);
        self.value.hash(state);
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_token())
    }
}

/// A reference from one resource to another.
///
/// A *literal* reference carries `reference` (`Type/id`, an absolute URL, `#contained`
/// or `urn:uuid:`), a *logical* reference carries an `identifier`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reference {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,

    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub reference_type: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<Identifier>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,

    /// Additional content beyond core fields
    #[serde(flatten)]
    pub extensions: HashMap<String, Value>,
}

impl Reference {
    /// Literal reference such as `Task/123`
    pub fn literal(reference: impl Into<String>) -> Self {
        Self {
            reference: Some(reference.into()),
            ..Default::default()
        }
    }

    /// Logical reference by identifier, with an optional type hint
    pub fn logical(reference_type: Option<&str>, identifier: Identifier) -> Self {
        Self {
            reference_type: reference_type.map(str::to_string),
            identifier: Some(identifier),
            ..Default::default()
        }
    }

    /// The identifier of a logical reference, if it carries a complete one.
    pub fn logical_identifier(&self) -> Option<&Identifier> {
        self.identifier.as_ref().filter(|id| id.is_complete())
    }

    /// Split a relative or absolute literal reference into `(type, id)`.
    ///
    /// Returns `None` for contained (`#id`), `urn:` and malformed references.
    pub fn type_and_id(&self) -> Option<(&str, &str)> {
        let reference = self.reference.as_deref()?;
        if reference.starts_with('#') || reference.starts_with("urn:") {
            return None;
        }
        // Drop a trailing version (`Type/id/_history/2`).
        let reference = match reference.find("/_history/") {
            Some(pos) => &reference[..pos],
            None => reference,
        };
        let mut segments = reference.rsplit('/');
        let id = segments.next().filter(|s| !s.is_empty())?;
        let resource_type = segments.next().filter(|s| !s.is_empty())?;
        if !resource_type.starts_with(|c: char| c.is_ascii_uppercase()) {
            return None;
        }
        Some((resource_type, id))
    }

    /// Local id of a contained reference (`#id`).
    pub fn contained_id(&self) -> Option<&str> {
        self.reference.as_deref()?.strip_prefix('#')
    }
}

/// A time period defined by a start and an optional end.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Period {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,

    /// Additional content beyond core fields
    #[serde(flatten)]
    pub extensions: HashMap<String, Value>,
}

impl Period {
    pub fn starting(start: impl Into<String>) -> Self {
        Self {
            start: Some(start.into()),
            ..Default::default()
        }
    }
}
