//! HTTP surface: the cloud-deploy webhook plus health and status probes

pub mod stats;
pub mod webhook;

use axum::{Router, extract::DefaultBodyLimit, routing};

use crate::SharedState;
use crate::content::ContentStore;

pub use stats::{health, status};
pub use webhook::{handle_cloud_deploy, token_from_query};

pub const WEBHOOK_PATH: &str = "/api/webhooks/cloud-deploy";

/// Largest accepted request body, in bytes
pub const MAX_BODY_BYTES: usize = 30_000_000;

/// Build the application router over `state`
pub fn router<S: ContentStore>(state: SharedState<S>) -> Router {
    Router::new()
        .route("/health", routing::get(health))
        .route("/status", routing::get(status::<S>))
        .route(
            WEBHOOK_PATH,
            routing::get(handle_cloud_deploy::<S>).post(handle_cloud_deploy::<S>),
        )
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}
