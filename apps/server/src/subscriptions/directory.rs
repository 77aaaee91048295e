//! Service directory: where does an organization receive a given service?

use crate::config::DirectoryEntry;
use async_trait::async_trait;
use carelink_models::Identifier;
use std::collections::HashMap;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("directory unavailable: {0}")]
    Unavailable(String),

    #[error("invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },
}

/// Looks up the endpoints an organization registered for a service.
#[async_trait]
pub trait ServiceDirectory: Send + Sync {
    async fn lookup(
        &self,
        organization: &Identifier,
        service: &str,
    ) -> Result<Vec<Url>, DirectoryError>;
}

/// Directory backed by the `notifications.directory` configuration entries.
#[derive(Debug, Default, Clone)]
pub struct StaticDirectory {
    endpoints: HashMap<(Identifier, String), Vec<Url>>,
}

impl StaticDirectory {
    pub fn from_entries(entries: &[DirectoryEntry]) -> Result<Self, DirectoryError> {
        let mut directory = Self::default();
        for entry in entries {
            let endpoint =
                Url::parse(&entry.endpoint).map_err(|e| DirectoryError::InvalidEndpoint {
                    endpoint: entry.endpoint.clone(),
                    reason: e.to_string(),
                })?;
            directory.register(
                Identifier::new(&entry.system, &entry.value),
                &entry.service,
                endpoint,
            );
        }
        Ok(directory)
    }

    pub fn register(&mut self, organization: Identifier, service: &str, endpoint: Url) {
        self.endpoints
            .entry((organization, service.to_string()))
            .or_default()
            .push(endpoint);
    }
}

#[async_trait]
impl ServiceDirectory for StaticDirectory {
    async fn lookup(
        &self,
        organization: &Identifier,
        service: &str,
    ) -> Result<Vec<Url>, DirectoryError> {
        Ok(self
            .endpoints
            .get(&(organization.clone(), service.to_string()))
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lookup_by_organization_and_service() {
        let directory = StaticDirectory::from_entries(&[
            DirectoryEntry {
                system: "urn:oid:1".into(),
                value: "A".into(),
                service: "fhir-notify".into(),
                endpoint: "https://a.example.org/notify".into(),
            },
            DirectoryEntry {
                system: "urn:oid:1".into(),
                value: "A".into(),
                service: "fhir-api".into(),
                endpoint: "https://a.example.org/fhir".into(),
            },
        ])
        .unwrap();

        let org = Identifier::new("urn:oid:1", "A");
        let found = directory.lookup(&org, "fhir-notify").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].as_str(), "https://a.example.org/notify");

        let unknown = Identifier::new("urn:oid:1", "B");
        assert!(directory.lookup(&unknown, "fhir-notify").await.unwrap().is_empty());
    }

    #[test]
    fn invalid_endpoint_is_rejected() {
        let result = StaticDirectory::from_entries(&[DirectoryEntry {
            system: "s".into(),
            value: "v".into(),
            service: "fhir-notify".into(),
            endpoint: "nope".into(),
        }]);
        assert!(matches!(result, Err(DirectoryError::InvalidEndpoint { .. })));
    }
}
