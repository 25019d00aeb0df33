pub mod api;
pub mod config;
pub mod content;
pub mod db;
pub mod error;
pub mod logging;
pub mod receiver;
pub mod utils;

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use crate::config::WebhookConfig;
use crate::db::SqliteContentStore;
use crate::error::{ConfigError, StartupError};
use crate::receiver::WebhookReceiver;

pub use crate::config::load_config;

pub struct AppState<S> {
    pub receiver: WebhookReceiver<S>,
    pub start_time: Instant,
    pub started_at: DateTime<Utc>,
}

impl<S> AppState<S> {
    pub fn new(receiver: WebhookReceiver<S>) -> Self {
        Self {
            receiver,
            start_time: Instant::now(),
            started_at: Utc::now(),
        }
    }
}

pub type SharedState<S> = Arc<AppState<S>>;

/// Create the seed content types and records from the config that the store lacks.
pub async fn seed_store(
    store: &SqliteContentStore,
    config: &WebhookConfig,
) -> Result<usize, StartupError> {
    for seed in &config.content_type {
        store.ensure_content_type(&seed.to_content_type()).await?;
    }

    let mut created = 0;
    for content in config.seed_contents()? {
        if store.ensure_content(&content).await? {
            created += 1;
        }
    }

    if created > 0 {
        info!("Seeded {} content record(s)", created);
    }
    Ok(created)
}

/// Read the config file at `path` and apply environment overrides
pub fn resolve_config(path: &str) -> Result<WebhookConfig, ConfigError> {
    let mut config = load_config(path)?;
    config.apply_overrides(|key| std::env::var(key).ok());
    Ok(config)
}
