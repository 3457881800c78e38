//! Incoming webhook endpoints.
//!
//! Posting to a webhook needs no session: the webhook id in the path, and
//! the HMAC signature for webhooks with a secret, authenticate the caller.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tracing::debug;
use traq_webhook::{
    CreateWebhook, Incoming, CHANNEL_ID_HEADER, GITHUB_EVENT_HEADER, GITHUB_SIGNATURE_HEADER,
    SIGNATURE_HEADER,
};
use uuid::Uuid;

use crate::api::{ApiError, AppState};
use crate::session::CurrentUser;

/// Creates the webhook API routes.
pub fn webhook_routes() -> Router<AppState> {
    Router::new()
        .route("/webhooks", get(list_webhooks).post(create_webhook))
        .route(
            "/webhooks/{id}",
            get(get_webhook).post(post_message).delete(delete_webhook),
        )
        .route("/webhooks/{id}/github", post(post_github))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

// ==================== Management Handlers ====================

async fn list_webhooks(State(state): State<AppState>, CurrentUser(user): CurrentUser) -> impl IntoResponse {
    Json(state.webhooks.list(&user))
}

async fn create_webhook(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<CreateWebhook>,
) -> Result<impl IntoResponse, ApiError> {
    let webhook = state.webhooks.create(&user, req)?;
    Ok((StatusCode::CREATED, Json(webhook)))
}

async fn get_webhook(
    State(state): State<AppState>,
    CurrentUser(_): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.webhooks.get(id)?))
}

async fn delete_webhook(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state.webhooks.delete(&user, id)?;
    Ok(StatusCode::NO_CONTENT)
}

// ==================== Delivery Handlers ====================

async fn post_message(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let incoming = Incoming {
        content_type: header_str(&headers, header::CONTENT_TYPE.as_str()),
        signature: header_str(&headers, SIGNATURE_HEADER),
        channel_id: header_str(&headers, CHANNEL_ID_HEADER),
        body: &body,
    };
    let message = state.webhooks.post(id, incoming)?;
    debug!(webhook_id = %id, message_id = %message.id, "Webhook message posted");
    Ok(StatusCode::NO_CONTENT)
}

async fn post_github(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let incoming = Incoming {
        content_type: header_str(&headers, header::CONTENT_TYPE.as_str()),
        signature: header_str(&headers, GITHUB_SIGNATURE_HEADER),
        channel_id: None,
        body: &body,
    };
    let event = header_str(&headers, GITHUB_EVENT_HEADER);
    if let Some(message) = state.webhooks.post_github(id, event, incoming)? {
        debug!(webhook_id = %id, message_id = %message.id, "GitHub event posted");
    }
    Ok(StatusCode::NO_CONTENT)
}
