//! Bot management endpoints.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use traq_bot::{BotTokens, CreateBot, UpdateBot};
use traq_types::{Bot, BotState, ChannelId};
use uuid::Uuid;

use crate::api::{ApiError, AppState};
use crate::session::CurrentUser;

/// Creates the bot API routes.
pub fn bot_routes() -> Router<AppState> {
    Router::new()
        .route("/bots", get(list_bots).post(create_bot))
        .route("/bots/{id}", get(get_bot).patch(edit_bot).delete(delete_bot))
        .route("/bots/{id}/tokens", get(get_tokens))
        .route("/bots/{id}/events", put(set_events))
        .route("/bots/{id}/events/logs", get(get_logs))
        .route("/bots/{id}/state", put(change_state))
        .route("/bots/{id}/reissue", post(reissue))
        .route("/channels/{id}/bots", get(channel_bots).post(join_channel))
        .route("/channels/{id}/bots/{bot_id}", delete(leave_channel))
}

// ==================== Request/Response Types ====================

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ListBotsQuery {
    pub all: bool,
}

#[derive(Debug, Deserialize)]
pub struct SetEventsRequest {
    pub events: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChangeStateRequest {
    pub state: BotState,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LogsQuery {
    pub limit: Option<usize>,
    pub offset: usize,
}

#[derive(Debug, Deserialize)]
pub struct JoinChannelRequest {
    pub code: String,
}

/// A new bot and the secrets issued for it.
#[derive(Debug, Serialize)]
pub struct CreatedBot {
    #[serde(flatten)]
    pub bot: Bot,
    pub tokens: BotTokens,
}

// ==================== Bot Handlers ====================

/// Lists the caller's bots, or every bot with `?all=true`.
async fn list_bots(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<ListBotsQuery>,
) -> impl IntoResponse {
    let creator = if query.all { None } else { Some(user.id) };
    Json(state.bots.list(creator))
}

async fn create_bot(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<CreateBot>,
) -> Result<impl IntoResponse, ApiError> {
    let (bot, tokens) = state.bots.create(&user, req)?;
    Ok((StatusCode::CREATED, Json(CreatedBot { bot, tokens })))
}

async fn get_bot(
    State(state): State<AppState>,
    CurrentUser(_): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.bots.get(id)?))
}

async fn edit_bot(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateBot>,
) -> Result<impl IntoResponse, ApiError> {
    state.bots.update(&user, id, req)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_bot(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state.bots.delete(&user, id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_tokens(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.bots.tokens(&user, id)?))
}

async fn set_events(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(req): Json<SetEventsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state.bots.set_events(&user, id, &req.events)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_logs(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Query(query): Query<LogsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let logs = state
        .bots
        .logs(&user, id, query.limit.unwrap_or(50), query.offset)?;
    Ok(Json(logs))
}

/// Activation pings the bot first and fails with 400 when it does not answer.
async fn change_state(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(req): Json<ChangeStateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let bot = state.bots.change_state(&user, id, req.state).await?;
    Ok(Json(bot))
}

async fn reissue(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.bots.reissue(&user, id)?))
}

// ==================== Channel Membership Handlers ====================

async fn channel_bots(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<ChannelId>,
) -> Result<impl IntoResponse, ApiError> {
    state.channels.get_channel(user.id, id)?;
    Ok(Json(state.bots.channel_bots(id)))
}

async fn join_channel(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<ChannelId>,
    Json(req): Json<JoinChannelRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state.bots.join_channel(&user, id, &req.code)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn leave_channel(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path((id, bot_id)): Path<(ChannelId, Uuid)>,
) -> Result<impl IntoResponse, ApiError> {
    state.bots.leave_channel(&user, id, bot_id)?;
    Ok(StatusCode::NO_CONTENT)
}
