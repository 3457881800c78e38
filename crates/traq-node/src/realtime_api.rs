//! Server-Sent-Events stream, heartbeats, push devices and WebRTC state.

use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::debug;
use traq_repository::UserRepository;
use traq_types::{ChannelId, Timestamp, UserId};

use crate::api::{ApiError, AppState};
use crate::observability::SseConnectionGuard;
use crate::session::CurrentUser;

/// Creates the realtime API routes.
pub fn realtime_routes() -> Router<AppState> {
    Router::new()
        .route("/notification", get(notification_stream))
        .route("/notification/device", post(register_device))
        .route("/heartbeat", get(get_heartbeat).post(post_heartbeat))
        .route("/webrtc/state", get(get_webrtc_state).put(put_webrtc_state))
}

// ==================== Request/Response Types ====================

#[derive(Debug, Deserialize)]
pub struct DeviceRequest {
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatRequest {
    pub channel_id: ChannelId,
    pub status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatQuery {
    pub channel_id: ChannelId,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStatus {
    pub user_id: UserId,
    pub status: String,
    pub updated_at: Timestamp,
}

/// Who is on a channel right now.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatResponse {
    pub channel_id: ChannelId,
    pub user_statuses: Vec<UserStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebRtcStateRequest {
    pub channel_id: ChannelId,
    #[serde(default)]
    pub state: Vec<String>,
}

// ==================== Notification Handlers ====================

/// Opens the caller's event stream. The response stays open until the
/// client goes away or the node shuts down.
async fn notification_stream(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Response, ApiError> {
    let connection = state.streamer.connect(user.id).await?;
    debug!(user_id = %user.id, connection = %connection.id(), "SSE stream opened");

    let guard = SseConnectionGuard::new();
    let stream = connection
        .into_stream(state.settings.keepalive)
        .map(move |frame| {
            let _ = &guard;
            frame
        });

    Ok((
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
            (header::HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        Body::from_stream(stream),
    )
        .into_response())
}

/// Registers a push-notification device token for the caller.
async fn register_device(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<DeviceRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state.repo.register_device(user.id, &req.token)?;
    Ok(StatusCode::NO_CONTENT)
}

// ==================== Heartbeat Handlers ====================

async fn post_heartbeat(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<HeartbeatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state.channels.get_channel(user.id, req.channel_id)?;
    state
        .heartbeat
        .update(user.id, req.channel_id, &req.status)?;
    Ok(Json(heartbeat_response(&state, req.channel_id)))
}

async fn get_heartbeat(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<HeartbeatQuery>,
) -> Result<impl IntoResponse, ApiError> {
    state.channels.get_channel(user.id, query.channel_id)?;
    Ok(Json(heartbeat_response(&state, query.channel_id)))
}

fn heartbeat_response(state: &AppState, channel_id: ChannelId) -> HeartbeatResponse {
    HeartbeatResponse {
        channel_id,
        user_statuses: state
            .heartbeat
            .entries(channel_id)
            .into_iter()
            .map(|v| UserStatus {
                user_id: v.user_id,
                status: v.status,
                updated_at: v.updated_at,
            })
            .collect(),
    }
}

// ==================== WebRTC Handlers ====================

async fn get_webrtc_state(State(state): State<AppState>, CurrentUser(_): CurrentUser) -> impl IntoResponse {
    Json(state.webrtc.all())
}

async fn put_webrtc_state(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<WebRtcStateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state.channels.get_channel(user.id, req.channel_id)?;
    state.webrtc.set_state(user.id, req.channel_id, req.state)?;
    Ok(StatusCode::NO_CONTENT)
}
