//! Login, users, tags and user groups.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, patch, post},
    Json, Router,
};
use axum_extra::extract::CookieJar;
use serde::{Deserialize, Serialize};
use tracing::info;
use traq_hub::{fields, Event, Field, Topic};
use traq_oauth2::{hash_password, verify_password};
use traq_repository::{TagRepository, UserRepository, UsersQuery};
use traq_types::{Tag, User, UserGroup, UserId, UserStatus};
use uuid::Uuid;
use validator::Validate;

use crate::api::{ApiError, AppState};
use crate::session::{removal_cookie, session_cookie, CurrentUser, SESSION_COOKIE};
use crate::validation::{
    validate_description, validate_display_name, validate_group_name, validate_password,
    validate_tag, validate_user_name, Checker,
};

/// Creates the user API routes.
pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/users", get(list_users).post(create_user))
        .route("/users/me", get(get_me).patch(update_me))
        .route("/users/{id}", get(get_user))
        .route("/users/{id}/status", patch(change_status))
        .route("/users/{id}/tags", get(list_tags).post(add_tag))
        .route("/users/{id}/tags/{tag_id}", delete(remove_tag))
        .route("/users/{id}/dm-channel", get(dm_channel))
        .route("/groups", get(list_groups).post(create_group))
        .route("/groups/{id}", get(get_group).delete(delete_group))
        .route("/groups/{id}/members", post(add_group_member))
        .route("/groups/{id}/members/{user_id}", delete(remove_group_member))
}

// ==================== Request/Response Types ====================

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub name: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    pub password: String,
}

impl Validate for CreateUserRequest {
    fn validate(&self) -> Result<(), validator::ValidationErrors> {
        Checker::new()
            .check("name", validate_user_name(&self.name))
            .check("displayName", validate_display_name(&self.display_name))
            .check("password", validate_password(&self.password))
            .finish()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMeRequest {
    pub display_name: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangeStatusRequest {
    pub status: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ListUsersQuery {
    pub include_suspended: bool,
}

#[derive(Debug, Deserialize)]
pub struct AddTagRequest {
    pub tag: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateGroupRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl Validate for CreateGroupRequest {
    fn validate(&self) -> Result<(), validator::ValidationErrors> {
        Checker::new()
            .check("name", validate_group_name(&self.name))
            .check("description", validate_description(&self.description))
            .finish()
    }
}

#[derive(Debug, Deserialize)]
pub struct AddMemberRequest {
    pub id: UserId,
}

/// A tag attached to a user.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserTagResponse {
    pub tag_id: Uuid,
    pub tag: String,
    pub is_locked: bool,
}

/// A user with their tags and group memberships.
#[derive(Debug, Serialize)]
pub struct UserDetail {
    #[serde(flatten)]
    pub user: User,
    pub tags: Vec<UserTagResponse>,
    pub groups: Vec<Uuid>,
}

fn user_tags(state: &AppState, user_id: UserId) -> Vec<UserTagResponse> {
    state
        .repo
        .get_user_tags(user_id)
        .into_iter()
        .map(|(user_tag, tag)| UserTagResponse {
            tag_id: tag.id,
            tag: tag.name,
            is_locked: user_tag.locked,
        })
        .collect()
}

fn user_detail(state: &AppState, user: User) -> UserDetail {
    let groups = state
        .repo
        .list_user_groups()
        .into_iter()
        .filter(|g| g.members.contains(&user.id))
        .map(|g| g.id)
        .collect();
    UserDetail {
        tags: user_tags(state, user.id),
        groups,
        user,
    }
}

fn publish_user(state: &AppState, topic: Topic, user: &User) {
    state.hub.publish(
        Event::new(topic)
            .with_id(fields::USER_ID, user.id)
            .with(fields::USER, Field::User(Box::new(user.clone()))),
    );
}

fn require_admin(user: &User) -> Result<(), ApiError> {
    if !user.is_admin() {
        return Err(ApiError::Forbidden("administrator only".into()));
    }
    Ok(())
}

// ==================== Session Handlers ====================

/// Logs in with a name and password and sets the session cookie.
async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let invalid = || ApiError::Unauthorized("invalid name or password".into());
    let user = state.repo.get_user_by_name(&req.name).map_err(|_| invalid())?;
    if user.bot || !verify_password(&user.password_hash, &req.password) {
        return Err(invalid());
    }
    if !user.status.can_authenticate() {
        return Err(ApiError::Forbidden("this account is not active".into()));
    }

    if let Some(old) = jar.get(SESSION_COOKIE) {
        state.sessions.remove(old.value());
    }
    let session = state.sessions.create(user.id);
    info!(user_id = %user.id, "User logged in");

    let cookie = session_cookie(&session.token, state.settings.secure_cookies);
    Ok((jar.add(cookie), StatusCode::NO_CONTENT))
}

/// Discards the current session.
async fn logout(State(state): State<AppState>, jar: CookieJar) -> impl IntoResponse {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        state.sessions.remove(cookie.value());
    }
    (jar.add(removal_cookie()), StatusCode::NO_CONTENT)
}

// ==================== User Handlers ====================

/// Registers a user. Administrator only.
async fn create_user(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Json(req): Json<CreateUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&actor)?;
    req.validate()?;

    let hash = hash_password(&req.password)?;
    let display_name = if req.display_name.is_empty() {
        req.name.clone()
    } else {
        req.display_name
    };
    let user = state
        .repo
        .create_user(User::new(req.name, display_name, hash))?;
    info!(user_id = %user.id, name = %user.name, "User registered");
    publish_user(&state, Topic::UserJoined, &user);

    Ok((StatusCode::CREATED, Json(user)))
}

async fn list_users(
    State(state): State<AppState>,
    CurrentUser(_): CurrentUser,
    Query(query): Query<ListUsersQuery>,
) -> impl IntoResponse {
    Json(state.repo.list_users(UsersQuery {
        active_only: !query.include_suspended,
        exclude_bots: false,
    }))
}

async fn get_me(State(state): State<AppState>, CurrentUser(user): CurrentUser) -> impl IntoResponse {
    Json(user_detail(&state, user))
}

async fn update_me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<UpdateMeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    Checker::new()
        .check("displayName", validate_display_name(&req.display_name))
        .finish()?;
    let user = state
        .repo
        .update_user_display_name(user.id, &req.display_name)?;
    publish_user(&state, Topic::UserUpdated, &user);
    Ok(StatusCode::NO_CONTENT)
}

async fn get_user(
    State(state): State<AppState>,
    CurrentUser(_): CurrentUser,
    Path(id): Path<UserId>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state.repo.get_user(id)?;
    Ok(Json(user_detail(&state, user)))
}

/// Changes a user's account status. Administrator only. Users that can no
/// longer authenticate lose their sessions and tokens.
async fn change_status(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<UserId>,
    Json(req): Json<ChangeStatusRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&actor)?;
    let status: UserStatus = req.status.parse().map_err(ApiError::BadRequest)?;
    if id == actor.id && !status.can_authenticate() {
        return Err(ApiError::BadRequest("you cannot deactivate yourself".into()));
    }

    let user = state.repo.update_user_status(id, status)?;
    if !status.can_authenticate() {
        let sessions = state.sessions.remove_user(id);
        for token in state.oauth2.list_user_tokens(id) {
            state.oauth2.revoke_user_token(id, token.id)?;
        }
        info!(user_id = %id, status = %status, sessions, "User disabled");
    }
    publish_user(&state, Topic::UserUpdated, &user);
    Ok(StatusCode::NO_CONTENT)
}

async fn dm_channel(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<UserId>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.channels.dm_channel(user.id, id)?))
}

// ==================== Tag Handlers ====================

async fn list_tags(
    State(state): State<AppState>,
    CurrentUser(_): CurrentUser,
    Path(id): Path<UserId>,
) -> Result<impl IntoResponse, ApiError> {
    state.repo.get_user(id)?;
    Ok(Json(user_tags(&state, id)))
}

async fn add_tag(
    State(state): State<AppState>,
    CurrentUser(_): CurrentUser,
    Path(id): Path<UserId>,
    Json(req): Json<AddTagRequest>,
) -> Result<impl IntoResponse, ApiError> {
    Checker::new().check("tag", validate_tag(&req.tag)).finish()?;
    state.repo.get_user(id)?;

    let tag: Tag = state.repo.get_or_create_tag(&req.tag)?;
    let user_tag = state.repo.add_user_tag(id, tag.id)?;
    state.hub.publish(
        Event::new(Topic::UserTagAdded)
            .with_id(fields::USER_ID, id)
            .with_id(fields::TAG_ID, tag.id),
    );

    Ok((
        StatusCode::CREATED,
        Json(UserTagResponse {
            tag_id: tag.id,
            tag: tag.name,
            is_locked: user_tag.locked,
        }),
    ))
}

async fn remove_tag(
    State(state): State<AppState>,
    CurrentUser(_): CurrentUser,
    Path((id, tag_id)): Path<(UserId, Uuid)>,
) -> Result<impl IntoResponse, ApiError> {
    state.repo.delete_user_tag(id, tag_id)?;
    state.hub.publish(
        Event::new(Topic::UserTagRemoved)
            .with_id(fields::USER_ID, id)
            .with_id(fields::TAG_ID, tag_id),
    );
    Ok(StatusCode::NO_CONTENT)
}

// ==================== Group Handlers ====================

fn publish_group(state: &AppState, topic: Topic, group_id: Uuid) {
    state
        .hub
        .publish(Event::new(topic).with_id(fields::GROUP_ID, group_id));
}

/// Loads a group the actor administers.
fn administered_group(state: &AppState, actor: &User, id: Uuid) -> Result<UserGroup, ApiError> {
    let group = state.repo.get_user_group(id)?;
    if group.admin_id != actor.id && !actor.is_admin() {
        return Err(ApiError::Forbidden("you are not the group admin".into()));
    }
    Ok(group)
}

async fn list_groups(State(state): State<AppState>, CurrentUser(_): CurrentUser) -> impl IntoResponse {
    Json(state.repo.list_user_groups())
}

async fn create_group(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<CreateGroupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;
    let group = state
        .repo
        .create_user_group(UserGroup::new(req.name, req.description, user.id))?;
    info!(group_id = %group.id, name = %group.name, "User group created");
    publish_group(&state, Topic::UserGroupCreated, group.id);
    Ok((StatusCode::CREATED, Json(group)))
}

async fn get_group(
    State(state): State<AppState>,
    CurrentUser(_): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.repo.get_user_group(id)?))
}

async fn delete_group(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    administered_group(&state, &user, id)?;
    state.repo.delete_user_group(id)?;
    publish_group(&state, Topic::UserGroupDeleted, id);
    Ok(StatusCode::NO_CONTENT)
}

async fn add_group_member(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(req): Json<AddMemberRequest>,
) -> Result<impl IntoResponse, ApiError> {
    administered_group(&state, &user, id)?;
    state.repo.get_user(req.id)?;
    state.repo.add_user_group_member(id, req.id)?;
    publish_group(&state, Topic::UserGroupUpdated, id);
    Ok(StatusCode::NO_CONTENT)
}

async fn remove_group_member(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path((id, user_id)): Path<(Uuid, UserId)>,
) -> Result<impl IntoResponse, ApiError> {
    administered_group(&state, &user, id)?;
    state.repo.remove_user_group_member(id, user_id)?;
    publish_group(&state, Topic::UserGroupUpdated, id);
    Ok(StatusCode::NO_CONTENT)
}
