//! Webhook handler for cloud deployment notifications

use axum::{
    Json,
    body::Bytes,
    extract::{Query, State as AxumState},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::warn;

use crate::SharedState;
use crate::content::ContentStore;
use crate::error::WebhookError;
use crate::receiver::Payload;

const TOKEN_PARAM: &str = "t";

/// The `t` query parameter carrying the shared secret.
///
/// Repeated values are joined with commas, so `?t=a&t=b` yields `"a,b"`.
pub fn token_from_query(params: &[(String, String)]) -> Option<String> {
    let values: Vec<&str> = params
        .iter()
        .filter(|(name, _)| name == TOKEN_PARAM)
        .map(|(_, value)| value.as_str())
        .collect();
    if values.is_empty() {
        None
    } else {
        Some(values.join(","))
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        match self {
            WebhookError::Unauthorized => StatusCode::UNAUTHORIZED.into_response(),
            WebhookError::InvalidContentKey => {
                (StatusCode::BAD_REQUEST, "Invalid ContentKey.").into_response()
            }
            WebhookError::ContentNotFound(_) => StatusCode::NOT_FOUND.into_response(),
            WebhookError::PublishFailed { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Publish failed.").into_response()
            }
            WebhookError::InvalidPayload(_) => {
                (StatusCode::BAD_REQUEST, "Invalid payload.").into_response()
            }
            WebhookError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        }
    }
}

/// Handles GET and POST calls from the cloud deploy service.
pub async fn handle_cloud_deploy<S: ContentStore>(
    AxumState(state): AxumState<SharedState<S>>,
    Query(params): Query<Vec<(String, String)>>,
    body: Bytes,
) -> Response {
    let payload = match Payload::from_body(&body) {
        Ok(payload) => payload,
        Err(e) => {
            warn!("Could not parse webhook body as JSON: {}", e);
            return WebhookError::InvalidPayload(e).into_response();
        }
    };

    let token = token_from_query(&params);
    match state.receiver.handle(&payload, token.as_deref()).await {
        Ok(ack) => Json(ack).into_response(),
        Err(e) => e.into_response(),
    }
}
