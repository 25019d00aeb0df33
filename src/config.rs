//! Settings loaded from the TOML config file, with environment overrides.
//!
//! Only the `[DeploymentWebhook]` section drives request handling. Its values
//! are kept as raw strings and resolved on every request, so a bad
//! `ContentKey` surfaces as a per-request misconfiguration rather than a
//! startup failure.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::content::{Content, ContentType};
use crate::error::ConfigError;

pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:8888";
pub const DEFAULT_CONFIG_PATH: &str = "webhook_config.toml";
pub const DEFAULT_DATABASE_PATH: &str = "data/content.db";
pub const DEFAULT_PROPERTY_ALIAS: &str = "deploymentData";

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(rename_all = "PascalCase")]
pub struct WebhookConfig {
    #[serde(default)]
    pub deployment_webhook: DeploymentWebhookSection,
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub content_type: Vec<ContentTypeSeed>,
    #[serde(default)]
    pub content: Vec<ContentSeed>,
}

/// The `DeploymentWebhook` section, exactly as configured
#[derive(Debug, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct DeploymentWebhookSection {
    pub secret: Option<String>,
    pub content_key: Option<String>,
    pub property_alias: Option<String>,
}

impl DeploymentWebhookSection {
    /// The shared secret; empty when unset.
    pub fn secret(&self) -> &str {
        self.secret.as_deref().unwrap_or_default()
    }

    pub fn has_secret(&self) -> bool {
        !self.secret().is_empty()
    }

    /// Parse `ContentKey`. None when it is missing or not a UUID.
    pub fn content_key(&self) -> Option<Uuid> {
        self.content_key
            .as_deref()
            .and_then(|raw| Uuid::parse_str(raw.trim()).ok())
    }

    pub fn raw_content_key(&self) -> Option<&str> {
        self.content_key.as_deref()
    }

    /// The property receiving the payload, `deploymentData` unless configured.
    pub fn property_alias(&self) -> &str {
        self.property_alias
            .as_deref()
            .unwrap_or(DEFAULT_PROPERTY_ALIAS)
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(rename_all = "PascalCase")]
pub struct ServerSection {
    pub bind_address: Option<String>,
    pub database_path: Option<PathBuf>,
    pub log_directory: Option<PathBuf>,
}

impl ServerSection {
    pub fn bind_address(&self) -> &str {
        self.bind_address.as_deref().unwrap_or(DEFAULT_BIND_ADDRESS)
    }

    pub fn database_path(&self) -> &Path {
        self.database_path
            .as_deref()
            .unwrap_or(Path::new(DEFAULT_DATABASE_PATH))
    }
}

/// A `[[ContentType]]` entry created in the store at startup if missing
#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "PascalCase")]
pub struct ContentTypeSeed {
    pub alias: String,
    pub name: Option<String>,
    #[serde(default)]
    pub varies_by_culture: bool,
    #[serde(default)]
    pub properties: Vec<String>,
}

impl ContentTypeSeed {
    pub fn to_content_type(&self) -> ContentType {
        let mut content_type = ContentType::new(&self.alias, self.varies_by_culture);
        if let Some(name) = &self.name {
            content_type.name = name.clone();
        }
        for property in &self.properties {
            content_type = content_type.with_property(property);
        }
        content_type
    }
}

/// A `[[Content]]` entry created in the store at startup if missing
#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "PascalCase")]
pub struct ContentSeed {
    pub key: Uuid,
    pub name: String,
    pub content_type: String,
    #[serde(default)]
    pub cultures: Vec<String>,
}

impl WebhookConfig {
    /// Resolve `[[Content]]` entries against the declared `[[ContentType]]` entries.
    pub fn seed_contents(&self) -> Result<Vec<Content>, ConfigError> {
        self.content
            .iter()
            .map(|seed| {
                let content_type = self
                    .content_type
                    .iter()
                    .find(|t| t.alias == seed.content_type)
                    .map(ContentTypeSeed::to_content_type)
                    .ok_or_else(|| {
                        ConfigError::Invalid(format!(
                            "Content '{}' refers to undeclared content type '{}'",
                            seed.name, seed.content_type
                        ))
                    })?;
                Ok(Content::new(seed.key, &seed.name, content_type)
                    .with_cultures(seed.cultures.iter().cloned()))
            })
            .collect()
    }

    /// Override file values with the environment variables named in `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("DEPLOYMENT_WEBHOOK_SECRET") {
            self.deployment_webhook.secret = Some(v);
        }
        if let Some(v) = lookup("DEPLOYMENT_WEBHOOK_CONTENT_KEY") {
            self.deployment_webhook.content_key = Some(v);
        }
        if let Some(v) = lookup("DEPLOYMENT_WEBHOOK_PROPERTY_ALIAS") {
            self.deployment_webhook.property_alias = Some(v);
        }
        if let Some(v) = lookup("BIND_ADDRESS") {
            self.server.bind_address = Some(v);
        }
        if let Some(v) = lookup("DATABASE_PATH") {
            self.server.database_path = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("LOG_DIRECTORY") {
            self.server.log_directory = Some(PathBuf::from(v));
        }
    }

    /// Log settings that will make every webhook call fail.
    pub fn warn_if_incomplete(&self) {
        let section = &self.deployment_webhook;
        if !section.has_secret() {
            warn!("DeploymentWebhook.Secret is not configured; every webhook call will be rejected");
        }
        if section.content_key().is_none() {
            warn!(
                "DeploymentWebhook.ContentKey {:?} is not a valid UUID; webhook calls will fail",
                section.raw_content_key()
            );
        }
    }
}

/// Parse a config file body
pub fn parse_config(path: &str, body: &str) -> Result<WebhookConfig, ConfigError> {
    toml::from_str(body).map_err(|source| ConfigError::Parse {
        path: path.to_string(),
        source,
    })
}

/// Load the configuration file, falling back to defaults when it does not exist
pub fn load_config(path: &str) -> Result<WebhookConfig, ConfigError> {
    if !Path::new(path).exists() {
        info!("Config file '{}' not found, using defaults and environment", path);
        return Ok(WebhookConfig::default());
    }

    let body = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_string(),
        source,
    })?;
    parse_config(path, &body)
}
