//! Health and status endpoints

use axum::{Json, extract::State as AxumState};
use serde::Serialize;

use crate::SharedState;
use crate::content::ContentStore;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Server information
#[derive(Debug, Serialize)]
pub struct ServerStats {
    pub name: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub started_at: String,
}

/// Which webhook settings are usable; never their values
#[derive(Debug, Serialize)]
pub struct WebhookStats {
    pub secret_configured: bool,
    pub content_key_valid: bool,
    pub property_alias: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub server: ServerStats,
    pub webhook: WebhookStats,
}

/// GET /status
pub async fn status<S: ContentStore>(
    AxumState(state): AxumState<SharedState<S>>,
) -> Json<StatusResponse> {
    let settings = state.receiver.settings();

    Json(StatusResponse {
        server: ServerStats {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: state.start_time.elapsed().as_secs(),
            started_at: state.started_at.to_rfc3339(),
        },
        webhook: WebhookStats {
            secret_configured: settings.has_secret(),
            content_key_valid: settings.content_key().is_some(),
            property_alias: settings.property_alias().to_string(),
        },
    })
}
