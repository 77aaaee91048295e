//! Startup configuration.
//!
//! Resolved once in `main` from built-in defaults, an optional config file and
//! `CARELINK__*` environment variables (in that order of precedence, lowest first),
//! then passed to the services through `AppState`.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use url::Url;

const ENV_PREFIX: &str = "CARELINK";
const CONFIG_FILE_ENV: &str = "CARELINK_CONFIG";
const DEFAULT_CONFIG_FILE: &str = "config.yaml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub fhir: FhirConfig,
    pub logging: LoggingConfig,
    pub auth: AuthConfig,
    pub policy: PolicyConfig,
    pub notifications: NotificationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_request_body_size: usize,
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8081,
            max_request_body_size: 10 * 1024 * 1024,
            cors_origins: Vec::new(),
        }
    }
}

/// The remote FHIR resource server that owns CarePlans, CareTeams and Tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FhirConfig {
    pub base_url: String,
    pub timeout_seconds: u64,
}

impl Default for FhirConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/fhir".to_string(),
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
    pub file_enabled: bool,
    pub file_directory: String,
    pub file_prefix: String,
    /// daily | hourly | minutely | never
    pub file_rotation: String,
    pub service_name: String,
    pub deployment_environment: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file_enabled: false,
            file_directory: "./logs".to_string(),
            file_prefix: "carelink".to_string(),
            file_rotation: "daily".to_string(),
            service_name: "carelink".to_string(),
            deployment_environment: "development".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JwtAlgorithm {
    HS256,
    RS256,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub enabled: bool,
    pub algorithm: JwtAlgorithm,
    /// Shared secret for HS256
    pub secret: Option<String>,
    /// PEM encoded public key for RS256
    pub public_key_path: Option<PathBuf>,
    pub issuer: Option<String>,
    pub audience: Option<String>,
    /// Claim holding the caller's organization identifier
    pub organization_claim: String,
    /// Paths below `/fhir` served without a token, e.g. `/metadata`
    pub public_paths: Vec<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            algorithm: JwtAlgorithm::RS256,
            secret: None,
            public_key_path: None,
            issuer: None,
            audience: None,
            organization_claim: "organization".to_string(),
            public_paths: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub enabled: bool,
    /// Rego package whose `allow` rule is evaluated
    pub package: String,
    /// Rego source file
    pub path: Option<PathBuf>,
    /// Request header carrying comma separated caller roles
    pub roles_header: String,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            package: "carelink".to_string(),
            path: None,
            roles_header: "x-carelink-roles".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub enabled: bool,
    /// Service name looked up in the directory for each subscriber
    pub service_id: String,
    pub timeout_seconds: u64,
    pub directory: Vec<DirectoryEntry>,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            service_id: "fhir-notify".to_string(),
            timeout_seconds: 10,
            directory: Vec::new(),
        }
    }
}

/// One endpoint registration: organization `system|value` offers `service` at `endpoint`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub system: String,
    pub value: String,
    pub service: String,
    pub endpoint: String,
}

impl Config {
    /// Load configuration from defaults, the config file and the environment.
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let file = std::env::var(CONFIG_FILE_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.into());

        let settings = ::config::Config::builder()
            .add_source(::config::Config::try_from(&Config::default())?)
            .add_source(::config::File::with_name(&file).required(false))
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("server.cors_origins")
                    .with_list_parse_key("auth.public_paths"),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Cross-field checks that serde cannot express.
    pub fn validate(&self) -> Result<(), String> {
        Url::parse(&self.fhir.base_url)
            .map_err(|e| format!("fhir.base_url '{}' is invalid: {e}", self.fhir.base_url))?;

        if self.auth.enabled {
            match self.auth.algorithm {
                JwtAlgorithm::HS256 if self.auth.secret.is_none() => {
                    return Err("auth.secret is required for HS256".to_string())
                }
                JwtAlgorithm::RS256 if self.auth.public_key_path.is_none() => {
                    return Err("auth.public_key_path is required for RS256".to_string())
                }
                _ => {}
            }
        }

        if self.policy.enabled {
            if !self.auth.enabled {
                return Err("policy.enabled requires auth.enabled".to_string());
            }
            if self.policy.path.is_none() {
                return Err("policy.path is required when policy is enabled".to_string());
            }
            if self.policy.package.trim().is_empty() {
                return Err("policy.package cannot be empty".to_string());
            }
        }

        for entry in &self.notifications.directory {
            Url::parse(&entry.endpoint).map_err(|e| {
                format!(
                    "notifications.directory endpoint '{}' for {}|{} is invalid: {e}",
                    entry.endpoint, entry.system, entry.value
                )
            })?;
        }

        Ok(())
    }

    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(format!("{}:{}", self.server.host, self.server.port).parse()?)
    }
}
