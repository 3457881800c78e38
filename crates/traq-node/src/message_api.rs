//! Message, pin, stamp and clip endpoints.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use traq_types::{ChannelId, MessageId, Timestamp};
use uuid::Uuid;

use crate::api::{ApiError, AppState};
use crate::session::CurrentUser;

/// Page size used when the client does not ask for one.
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Largest page a client may request.
pub const MAX_PAGE_SIZE: usize = 200;

/// Creates the message API routes.
pub fn message_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/channels/{id}/messages",
            get(list_messages).post(post_message),
        )
        .route(
            "/messages/{id}",
            get(get_message).put(edit_message).delete(delete_message),
        )
        .route("/activity/latest-messages", get(latest_messages))
        // Pins
        .route("/pins", post(create_pin))
        .route("/pins/{id}", get(get_pin).delete(delete_pin))
        .route("/channels/{id}/pins", get(channel_pins))
        // Stamps
        .route("/stamps", get(list_stamps).post(create_stamp))
        .route(
            "/stamps/{id}",
            get(get_stamp).patch(rename_stamp).delete(delete_stamp),
        )
        .route("/messages/{id}/stamps", get(message_stamps))
        .route(
            "/messages/{id}/stamps/{stamp_id}",
            post(stamp_message).delete(unstamp_message),
        )
        .route("/users/me/stamp-history", get(stamp_history))
        // Clips
        .route("/clip-folders", get(list_folders).post(create_folder))
        .route(
            "/clip-folders/{id}",
            get(get_folder).delete(delete_folder),
        )
        .route(
            "/clip-folders/{id}/messages",
            get(folder_messages).post(clip_message),
        )
        .route(
            "/clip-folders/{id}/messages/{message_id}",
            delete(unclip_message),
        )
}

// ==================== Request/Response Types ====================

#[derive(Debug, Deserialize)]
pub struct PostMessageRequest {
    pub content: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PageQuery {
    pub limit: Option<usize>,
    pub offset: usize,
}

impl PageQuery {
    fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePinRequest {
    pub message_id: MessageId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateStampRequest {
    pub name: String,
    #[serde(default)]
    pub file_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct RenameStampRequest {
    pub name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct StampCountRequest {
    pub count: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StampHistoryEntry {
    pub stamp_id: Uuid,
    pub datetime: Timestamp,
}

#[derive(Debug, Deserialize)]
pub struct CreateFolderRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipMessageRequest {
    pub message_id: MessageId,
}

// ==================== Message Handlers ====================

async fn list_messages(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<ChannelId>,
    Query(page): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let messages = state
        .messages
        .list(user.id, id, page.limit(), page.offset)?;
    Ok(Json(messages))
}

async fn post_message(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<ChannelId>,
    Json(req): Json<PostMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let message = state.messages.create(user.id, id, &req.content)?;
    Ok((StatusCode::CREATED, Json(message)))
}

async fn get_message(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<MessageId>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.messages.get(user.id, id)?))
}

async fn edit_message(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<MessageId>,
    Json(req): Json<PostMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state.messages.edit(user.id, id, &req.content)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_message(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<MessageId>,
) -> Result<impl IntoResponse, ApiError> {
    state.messages.delete(user.id, id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn latest_messages(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(page): Query<PageQuery>,
) -> impl IntoResponse {
    Json(state.messages.latest(user.id, page.limit()))
}

// ==================== Pin Handlers ====================

async fn create_pin(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<CreatePinRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let pin = state.messages.pin(user.id, req.message_id)?;
    Ok((StatusCode::CREATED, Json(pin)))
}

async fn get_pin(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.messages.get_pin(user.id, id)?))
}

async fn delete_pin(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state.messages.unpin(user.id, id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn channel_pins(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<ChannelId>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.messages.channel_pins(user.id, id)?))
}

// ==================== Stamp Handlers ====================

async fn list_stamps(State(state): State<AppState>, CurrentUser(_): CurrentUser) -> impl IntoResponse {
    Json(state.stamps.list())
}

async fn create_stamp(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<CreateStampRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let stamp = state.stamps.create(&req.name, user.id, req.file_id)?;
    Ok((StatusCode::CREATED, Json(stamp)))
}

async fn get_stamp(
    State(state): State<AppState>,
    CurrentUser(_): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.stamps.get(id)?))
}

async fn rename_stamp(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(req): Json<RenameStampRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state.stamps.rename(user.id, id, &req.name)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_stamp(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state.stamps.delete(user.id, id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn message_stamps(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<MessageId>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.stamps.message_stamps(user.id, id)?))
}

/// Stamps a message. The body is optional; without it one use is added.
async fn stamp_message(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path((id, stamp_id)): Path<(MessageId, Uuid)>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let count = if body.is_empty() {
        1
    } else {
        serde_json::from_slice::<StampCountRequest>(&body)
            .map_err(|e| ApiError::BadRequest(format!("invalid body: {}", e)))?
            .count
            .unwrap_or(1)
    };
    state.stamps.stamp_message(user.id, id, stamp_id, count)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn unstamp_message(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path((id, stamp_id)): Path<(MessageId, Uuid)>,
) -> Result<impl IntoResponse, ApiError> {
    state.stamps.unstamp_message(user.id, id, stamp_id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn stamp_history(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(page): Query<PageQuery>,
) -> impl IntoResponse {
    let history: Vec<StampHistoryEntry> = state
        .stamps
        .history(user.id, page.limit())
        .into_iter()
        .map(|(stamp_id, datetime)| StampHistoryEntry { stamp_id, datetime })
        .collect();
    Json(history)
}

// ==================== Clip Handlers ====================

async fn list_folders(State(state): State<AppState>, CurrentUser(user): CurrentUser) -> impl IntoResponse {
    Json(state.clips.folders(user.id))
}

async fn create_folder(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<CreateFolderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let folder = state
        .clips
        .create_folder(user.id, &req.name, &req.description)?;
    Ok((StatusCode::CREATED, Json(folder)))
}

async fn get_folder(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.clips.folder(user.id, id)?))
}

async fn delete_folder(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state.clips.delete_folder(user.id, id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn folder_messages(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.clips.messages(user.id, id)?))
}

async fn clip_message(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(req): Json<ClipMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    // The message must be visible to the user before it can be clipped.
    state.messages.get(user.id, req.message_id)?;
    let clipped = state.clips.add_message(user.id, id, req.message_id)?;
    Ok((StatusCode::CREATED, Json(clipped)))
}

async fn unclip_message(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path((id, message_id)): Path<(Uuid, MessageId)>,
) -> Result<impl IntoResponse, ApiError> {
    state.clips.remove_message(user.id, id, message_id)?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_limit_is_clamped() {
        assert_eq!(PageQuery::default().limit(), DEFAULT_PAGE_SIZE);
        let page = PageQuery {
            limit: Some(10_000),
            offset: 0,
        };
        assert_eq!(page.limit(), MAX_PAGE_SIZE);
        let page = PageQuery {
            limit: Some(0),
            offset: 0,
        };
        assert_eq!(page.limit(), 1);
    }
}
