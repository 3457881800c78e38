//! OAuth2 authorization server endpoints and client management.
//!
//! The protocol endpoints (`/oauth2/*`) answer errors with the OAuth2
//! envelope `{"error", "error_description", "error_uri"}` instead of the
//! generic API error body.

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Form, Json, Router,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use traq_oauth2::{
    AuthorizeOutcome, AuthorizeRequest, ClientCredentials, NewClient, OAuth2Error, TokenRequest,
};
use traq_types::OAuth2Client;
use url::form_urlencoded;
use uuid::Uuid;

use crate::api::{ApiError, AppState, API_PREFIX};
use crate::session::{CurrentUser, SessionUser};

/// Path of the login page unauthenticated authorize requests are sent to.
pub const LOGIN_PATH: &str = "/login";

/// Creates the OAuth2 API routes.
pub fn oauth2_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/oauth2/authorize",
            get(authorize_get).post(authorize_post),
        )
        .route("/oauth2/authorize/decide", post(decide))
        .route("/oauth2/token", post(token))
        .route("/oauth2/revoke", post(revoke))
        .route("/clients", get(list_clients).post(create_client))
        .route("/clients/{id}", get(get_client).delete(delete_client))
        .route("/users/me/tokens", get(list_tokens))
        .route("/users/me/tokens/{id}", delete(revoke_token))
}

// ==================== Errors ====================

/// An OAuth2 failure rendered with the protocol envelope.
#[derive(Debug)]
pub struct OAuth2ApiError(pub OAuth2Error);

impl From<OAuth2Error> for OAuth2ApiError {
    fn from(e: OAuth2Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for OAuth2ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            OAuth2Error::Protocol {
                unauthorized: true, ..
            }
            | OAuth2Error::InvalidToken => StatusCode::UNAUTHORIZED,
            OAuth2Error::Protocol { .. } | OAuth2Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            OAuth2Error::Forbidden(_) => StatusCode::FORBIDDEN,
            OAuth2Error::Repository(e) => {
                warn!(error = %e, "OAuth2 request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
            OAuth2Error::Internal(e) => {
                warn!(error = %e, "OAuth2 request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(self.0.response())).into_response()
    }
}

// ==================== Request/Response Types ====================

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DecideRequest {
    pub submit: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RevokeRequest {
    pub token: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ListClientsQuery {
    pub all: bool,
}

/// A freshly registered client. The secret is only shown here.
#[derive(Debug, Serialize)]
pub struct CreatedClient {
    #[serde(flatten)]
    pub client: OAuth2Client,
    pub secret: String,
}

// ==================== Authorization Handlers ====================

async fn authorize_get(
    State(state): State<AppState>,
    SessionUser(session): SessionUser,
    Query(req): Query<AuthorizeRequest>,
) -> Result<Response, OAuth2ApiError> {
    authorize(&state, session, req)
}

async fn authorize_post(
    State(state): State<AppState>,
    SessionUser(session): SessionUser,
    Form(req): Form<AuthorizeRequest>,
) -> Result<Response, OAuth2ApiError> {
    authorize(&state, session, req)
}

fn authorize(
    state: &AppState,
    session: Option<crate::session::Session>,
    req: AuthorizeRequest,
) -> Result<Response, OAuth2ApiError> {
    let replay = format!("{}/oauth2/authorize?{}", API_PREFIX, authorize_query(&req));
    let outcome = state
        .oauth2
        .authorize(req, session.as_ref().map(|s| s.user_id))?;

    let location = match outcome {
        AuthorizeOutcome::Redirect(location) => location,
        AuthorizeOutcome::LoginRequired => {
            let query: String = form_urlencoded::Serializer::new(String::new())
                .append_pair("redirect", &replay)
                .finish();
            format!("{}?{}", LOGIN_PATH, query)
        }
        AuthorizeOutcome::Consent { pending, location } => {
            // Consent is only returned for a logged-in session.
            let stored = session
                .as_ref()
                .map(|s| state.sessions.set_pending(&s.token, pending))
                .unwrap_or(false);
            if !stored {
                return Err(OAuth2Error::Forbidden("bad session".into()).into());
            }
            location
        }
    };
    Ok(found(&location))
}

/// Applies the user's answer on the consent page.
async fn decide(
    State(state): State<AppState>,
    SessionUser(session): SessionUser,
    Form(req): Form<DecideRequest>,
) -> Result<Response, OAuth2ApiError> {
    let session = session.ok_or_else(|| OAuth2Error::Forbidden("bad session".into()))?;
    let pending = state.sessions.take_pending(&session.token);
    let location = state
        .oauth2
        .decide(pending, session.user_id, &req.submit)?;
    debug!(user_id = %session.user_id, "Authorization decided");
    Ok(found(&location))
}

async fn token(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(req): Form<TokenRequest>,
) -> Result<Response, OAuth2ApiError> {
    let response = state.oauth2.token(&req, basic_credentials(&headers))?;
    Ok((
        [
            (header::CACHE_CONTROL, "no-store"),
            (header::PRAGMA, "no-cache"),
        ],
        Json(response),
    )
        .into_response())
}

/// Revokes an access or refresh token. Unknown tokens succeed silently.
async fn revoke(
    State(state): State<AppState>,
    Form(req): Form<RevokeRequest>,
) -> Result<StatusCode, OAuth2ApiError> {
    state.oauth2.revoke(&req.token)?;
    Ok(StatusCode::OK)
}

fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

/// Re-encode an authorize request so it can be replayed after login.
fn authorize_query(req: &AuthorizeRequest) -> String {
    let mut query = form_urlencoded::Serializer::new(String::new());
    let pairs = [
        ("response_type", &req.response_type),
        ("client_id", &req.client_id),
        ("redirect_uri", &req.redirect_uri),
        ("scope", &req.scope),
        ("state", &req.state),
        ("code_challenge", &req.code_challenge),
        ("code_challenge_method", &req.code_challenge_method),
        ("nonce", &req.nonce),
        ("prompt", &req.prompt),
    ];
    for (key, value) in pairs {
        if !value.is_empty() {
            query.append_pair(key, value);
        }
    }
    query.finish()
}

/// Client id and secret from an `Authorization: Basic` header.
fn basic_credentials(headers: &HeaderMap) -> Option<ClientCredentials> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let encoded = value.strip_prefix("Basic ")?;
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (id, secret) = decoded.split_once(':')?;
    Some(ClientCredentials {
        id: id.to_string(),
        secret: secret.to_string(),
    })
}

// ==================== Client Handlers ====================

/// The caller's clients, or every client for an administrator with
/// `?all=true`.
async fn list_clients(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<ListClientsQuery>,
) -> impl IntoResponse {
    let creator = if query.all && user.is_admin() {
        None
    } else {
        Some(user.id)
    };
    Json(state.oauth2.list_clients(creator))
}

async fn create_client(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<NewClient>,
) -> Result<impl IntoResponse, ApiError> {
    let client = state.oauth2.create_client(user.id, req)?;
    let secret = client.secret.clone();
    Ok((StatusCode::CREATED, Json(CreatedClient { client, secret })))
}

async fn get_client(
    State(state): State<AppState>,
    CurrentUser(_): CurrentUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.oauth2.get_client(&id)?))
}

async fn delete_client(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.oauth2.delete_client(&id, &user)?;
    Ok(StatusCode::NO_CONTENT)
}

// ==================== Token Handlers ====================

async fn list_tokens(State(state): State<AppState>, CurrentUser(user): CurrentUser) -> impl IntoResponse {
    Json(state.oauth2.list_user_tokens(user.id))
}

async fn revoke_token(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state.oauth2.revoke_user_token(user.id, id)?;
    Ok(StatusCode::NO_CONTENT)
}
