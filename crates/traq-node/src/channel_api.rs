//! Channel tree, subscriptions, stars, mutes and unread endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use traq_channel::ChannelFlags;
use traq_repository::{ChannelRepository, MessageRepository};
use traq_types::{Channel, ChannelId, SubscriptionFlags, Timestamp, UserId};

use crate::api::{ApiError, AppState};
use crate::session::CurrentUser;

/// Longest accepted channel topic, in characters.
pub const MAX_TOPIC_LENGTH: usize = 500;

/// Creates the channel API routes.
pub fn channel_routes() -> Router<AppState> {
    Router::new()
        .route("/channels", get(list_channels).post(create_channel))
        .route(
            "/channels/{id}",
            get(get_channel).patch(edit_channel).delete(delete_channel),
        )
        .route("/channels/{id}/children", post(create_child))
        .route("/channels/{id}/parent", put(change_parent))
        .route("/channels/{id}/topic", get(get_topic).put(set_topic))
        .route(
            "/channels/{id}/notification",
            get(get_notify_subscribers).put(set_notify_subscribers),
        )
        .route("/channels/{id}/viewers", get(get_viewers))
        .route("/users/me/subscriptions", get(list_subscriptions))
        .route("/users/me/subscriptions/{id}", put(set_subscription))
        .route("/users/me/stars", get(list_stars))
        .route("/users/me/stars/{id}", put(star).delete(unstar))
        .route("/users/me/mute", get(list_mutes))
        .route("/users/me/mute/{id}", post(mute).delete(unmute))
        .route("/users/me/unread", get(list_unread))
        .route("/users/me/unread/{id}", axum::routing::delete(read_channel))
}

// ==================== Request/Response Types ====================

#[derive(Debug, Deserialize)]
pub struct CreateChannelRequest {
    pub name: String,
    #[serde(default)]
    pub parent: Option<ChannelId>,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub members: Vec<UserId>,
}

#[derive(Debug, Deserialize)]
pub struct CreateChildRequest {
    pub name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct EditChannelRequest {
    pub name: Option<String>,
    pub visibility: Option<bool>,
    pub force: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct ChangeParentRequest {
    pub parent: Option<ChannelId>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TopicBody {
    pub topic: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct NotifySubscribersRequest {
    pub on: Vec<UserId>,
    pub off: Vec<UserId>,
}

/// A channel with its place in the tree.
#[derive(Debug, Serialize)]
pub struct ChannelResponse {
    #[serde(flatten)]
    pub channel: Channel,
    pub children: Vec<ChannelId>,
    pub path: Option<String>,
}

/// `GET /channels` body.
#[derive(Debug, Serialize)]
pub struct ChannelListResponse {
    pub public: Vec<ChannelResponse>,
    pub private: Vec<ChannelResponse>,
    pub dm: Vec<Channel>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewerResponse {
    pub user_id: UserId,
    pub state: String,
    pub updated_at: Timestamp,
}

// ==================== Channel Handlers ====================

async fn list_channels(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> impl IntoResponse {
    let tree = state.channels.tree();
    let mut response = ChannelListResponse {
        public: Vec::new(),
        private: Vec::new(),
        dm: Vec::new(),
    };
    for channel in state.channels.list_channels(user.id) {
        if channel.is_dm() {
            response.dm.push(channel);
            continue;
        }
        let detail = ChannelResponse {
            children: tree.children(Some(channel.id)).to_vec(),
            path: tree.path(channel.id),
            channel,
        };
        if detail.channel.is_public {
            response.public.push(detail);
        } else {
            response.private.push(detail);
        }
    }
    Json(response)
}

/// Creates a channel. With `parent` the new channel becomes its child and
/// inherits its visibility; otherwise `private` selects a top-level private
/// channel with the given members.
async fn create_channel(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<CreateChannelRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let channel = match req.parent {
        Some(parent) => state.channels.create_child(&req.name, parent, user.id)?,
        None if req.private => state
            .channels
            .create_private(&req.name, user.id, &req.members)?,
        None => state.channels.create_public(&req.name, None, user.id)?,
    };
    Ok((StatusCode::CREATED, Json(channel)))
}

async fn get_channel(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<ChannelId>,
) -> Result<impl IntoResponse, ApiError> {
    let channel = state.channels.get_channel(user.id, id)?;
    let tree = state.channels.tree();
    Ok(Json(ChannelResponse {
        children: tree.children(Some(id)).to_vec(),
        path: tree.path(id),
        channel,
    }))
}

/// Renames a channel or changes its flags. Forcing requires an
/// administrator.
async fn edit_channel(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<ChannelId>,
    Json(req): Json<EditChannelRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state.channels.get_channel(user.id, id)?;
    if req.force.is_some() && !user.is_admin() {
        return Err(ApiError::Forbidden("only administrators can force channels".into()));
    }

    if let Some(name) = &req.name {
        state.channels.change_name(id, name, user.id)?;
    }
    if req.visibility.is_some() || req.force.is_some() {
        state.channels.update_flags(
            id,
            ChannelFlags {
                visibility: req.visibility,
                forced: req.force,
            },
            user.id,
        )?;
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Deletes a channel and its subtree. Administrator only.
async fn delete_channel(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<ChannelId>,
) -> Result<impl IntoResponse, ApiError> {
    if !user.is_admin() {
        return Err(ApiError::Forbidden("only administrators can delete channels".into()));
    }
    state.channels.get_channel(user.id, id)?;
    state.channels.delete(id, user.id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn create_child(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<ChannelId>,
    Json(req): Json<CreateChildRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let channel = state.channels.create_child(&req.name, id, user.id)?;
    Ok((StatusCode::CREATED, Json(channel)))
}

async fn change_parent(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<ChannelId>,
    Json(req): Json<ChangeParentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state.channels.get_channel(user.id, id)?;
    if let Some(parent) = req.parent {
        state.channels.get_channel(user.id, parent)?;
    }
    state.channels.change_parent(id, req.parent, user.id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_topic(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<ChannelId>,
) -> Result<impl IntoResponse, ApiError> {
    let channel = state.channels.get_channel(user.id, id)?;
    Ok(Json(TopicBody {
        topic: channel.topic,
    }))
}

async fn set_topic(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<ChannelId>,
    Json(req): Json<TopicBody>,
) -> Result<impl IntoResponse, ApiError> {
    if req.topic.chars().count() > MAX_TOPIC_LENGTH {
        return Err(ApiError::BadRequest(format!(
            "topic must be at most {} characters",
            MAX_TOPIC_LENGTH
        )));
    }
    state.channels.get_channel(user.id, id)?;
    state.channels.set_topic(id, &req.topic, user.id)?;
    Ok(StatusCode::NO_CONTENT)
}

// ==================== Subscription Handlers ====================

async fn get_notify_subscribers(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<ChannelId>,
) -> Result<impl IntoResponse, ApiError> {
    state.channels.get_channel(user.id, id)?;
    Ok(Json(state.channels.notify_subscribers(id)?))
}

async fn set_notify_subscribers(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<ChannelId>,
    Json(req): Json<NotifySubscribersRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state.channels.get_channel(user.id, id)?;
    state
        .channels
        .change_notify_subscribers(id, &req.on, &req.off)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_viewers(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<ChannelId>,
) -> Result<impl IntoResponse, ApiError> {
    state.channels.get_channel(user.id, id)?;
    let viewers: Vec<ViewerResponse> = state
        .heartbeat
        .entries(id)
        .into_iter()
        .map(|v| ViewerResponse {
            user_id: v.user_id,
            state: v.status,
            updated_at: v.updated_at,
        })
        .collect();
    Ok(Json(viewers))
}

async fn list_subscriptions(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> impl IntoResponse {
    Json(state.channels.user_subscriptions(user.id))
}

async fn set_subscription(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<ChannelId>,
    Json(flags): Json<SubscriptionFlags>,
) -> Result<impl IntoResponse, ApiError> {
    state.channels.set_user_subscription(user.id, id, flags)?;
    Ok(StatusCode::NO_CONTENT)
}

// ==================== Star / Mute / Unread Handlers ====================

async fn list_stars(State(state): State<AppState>, CurrentUser(user): CurrentUser) -> impl IntoResponse {
    Json(state.repo.get_stars(user.id))
}

async fn star(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<ChannelId>,
) -> Result<impl IntoResponse, ApiError> {
    state.channels.star(user.id, id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn unstar(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<ChannelId>,
) -> Result<impl IntoResponse, ApiError> {
    state.channels.unstar(user.id, id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_mutes(State(state): State<AppState>, CurrentUser(user): CurrentUser) -> impl IntoResponse {
    Json(state.repo.get_muted_channels(user.id))
}

async fn mute(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<ChannelId>,
) -> Result<impl IntoResponse, ApiError> {
    state.channels.mute(user.id, id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn unmute(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<ChannelId>,
) -> Result<impl IntoResponse, ApiError> {
    state.channels.unmute(user.id, id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_unread(State(state): State<AppState>, CurrentUser(user): CurrentUser) -> impl IntoResponse {
    Json(state.repo.get_unread_channels(user.id))
}

async fn read_channel(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<ChannelId>,
) -> Result<impl IntoResponse, ApiError> {
    state.channels.read(user.id, id)?;
    Ok(StatusCode::NO_CONTENT)
}
