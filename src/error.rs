use std::io;

use uuid::Uuid;

use crate::content::PublishStatus;

/// Errors raised while loading settings at startup
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Read { path: String, source: io::Error },

    #[error("Failed to parse config file '{path}': {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Anything that stops the server from starting
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Content store error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Hard faults from a content store backend
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Content type '{content_type}' has no property '{alias}'")]
    UnknownProperty { content_type: String, alias: String },

    #[error("Content type '{0}' does not exist")]
    UnknownContentType(String),

    #[error("Content {0} does not exist")]
    MissingContent(Uuid),

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Injected fault: {0}")]
    Injected(String),
}

/// Outcome classes of a webhook call that did not succeed
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("Unauthorized webhook call")]
    Unauthorized,

    #[error("Invalid ContentKey in configuration")]
    InvalidContentKey,

    #[error("Content not found for key {0}")]
    ContentNotFound(Uuid),

    #[error("Publishing content {key} failed: {status}")]
    PublishFailed { key: Uuid, status: PublishStatus },

    #[error("Request body is not well-formed JSON: {0}")]
    InvalidPayload(serde_json::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Helper type for Results that use StoreError
pub type StoreResult<T> = std::result::Result<T, StoreError>;
