//! HTTP API for the traQ node.
//!
//! Every route group lives in its own `*_api` module and is mounted here
//! under [`API_PREFIX`]. Health and metrics endpoints sit at the root.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use traq_bot::{BotError, BotService};
use traq_channel::{ChannelError, ChannelService};
use traq_hub::Hub;
use traq_message::{ClipService, MessageError, MessageService, StampService};
use traq_oauth2::{OAuth2Error, OAuth2Service};
use traq_realtime::{HeartbeatTracker, RealtimeError, Streamer, WebRtcManager};
use traq_repository::{Repository, RepositoryError};
use traq_webhook::{WebhookError, WebhookService};
use validator::ValidationErrors;

use crate::bot_api::bot_routes;
use crate::channel_api::channel_routes;
use crate::message_api::message_routes;
use crate::oauth2_api::oauth2_routes;
use crate::observability::{metrics_handler, metrics_layer, request_id_layer};
use crate::realtime_api::realtime_routes;
use crate::session::SessionStore;
use crate::user_api::user_routes;
use crate::validation::ValidationErrorResponse;
use crate::webhook_api::webhook_routes;

/// Path prefix of the versioned API.
pub const API_PREFIX: &str = "/api/v3";

/// Settings handlers read at request time.
#[derive(Debug, Clone)]
pub struct ApiSettings {
    /// Public origin, used for absolute redirects.
    pub origin: String,
    /// Interval between SSE keep-alive comments.
    pub keepalive: Duration,
    /// Mark session cookies `Secure`.
    pub secure_cookies: bool,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            origin: "http://localhost:3000".to_string(),
            keepalive: Duration::from_secs(10),
            secure_cookies: false,
        }
    }
}

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repository>,
    pub hub: Arc<Hub>,
    pub channels: ChannelService,
    pub messages: MessageService,
    pub stamps: StampService,
    pub clips: ClipService,
    pub streamer: Arc<Streamer>,
    pub heartbeat: Arc<HeartbeatTracker>,
    pub webrtc: Arc<WebRtcManager>,
    pub oauth2: Arc<OAuth2Service>,
    pub bots: Arc<BotService>,
    pub webhooks: Arc<WebhookService>,
    pub sessions: Arc<SessionStore>,
    pub settings: Arc<ApiSettings>,
}

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    UnsupportedMediaType(String),
    #[error("validation failed")]
    Validation(ValidationErrors),
    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::Validation(errors) => {
                return ValidationErrorResponse::from(errors.clone()).into_response()
            }
            ApiError::Internal(message) => {
                tracing::error!(error = %message, "Request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

/// Error body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl From<ValidationErrors> for ApiError {
    fn from(e: ValidationErrors) -> Self {
        ApiError::Validation(e)
    }
}

impl From<RepositoryError> for ApiError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::NotFound(_) => ApiError::NotFound(e.to_string()),
            RepositoryError::AlreadyExists(_) => ApiError::Conflict(e.to_string()),
            RepositoryError::InvalidArgument(_) | RepositoryError::DepthLimit => {
                ApiError::BadRequest(e.to_string())
            }
        }
    }
}

impl From<ChannelError> for ApiError {
    fn from(e: ChannelError) -> Self {
        match e {
            ChannelError::NotFound(_) => ApiError::NotFound(e.to_string()),
            ChannelError::AlreadyExists(_) => ApiError::Conflict(e.to_string()),
            ChannelError::Forbidden(_) => ApiError::Forbidden(e.to_string()),
            ChannelError::DepthLimit
            | ChannelError::InvalidName(_)
            | ChannelError::InvalidArgument(_) => ApiError::BadRequest(e.to_string()),
            ChannelError::Repository(inner) => inner.into(),
        }
    }
}

impl From<MessageError> for ApiError {
    fn from(e: MessageError) -> Self {
        match e {
            MessageError::NotFound(_) => ApiError::NotFound(e.to_string()),
            MessageError::AlreadyExists(_) => ApiError::Conflict(e.to_string()),
            MessageError::Forbidden(_) => ApiError::Forbidden(e.to_string()),
            MessageError::InvalidArgument(_) => ApiError::BadRequest(e.to_string()),
        }
    }
}

impl From<RealtimeError> for ApiError {
    fn from(e: RealtimeError) -> Self {
        match e {
            RealtimeError::InvalidStatus(_) | RealtimeError::InvalidState(_) => {
                ApiError::BadRequest(e.to_string())
            }
            RealtimeError::Closed => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<OAuth2Error> for ApiError {
    fn from(e: OAuth2Error) -> Self {
        match e {
            OAuth2Error::InvalidToken => ApiError::Unauthorized(e.to_string()),
            OAuth2Error::Protocol { unauthorized, .. } => {
                if unauthorized {
                    ApiError::Unauthorized(e.to_string())
                } else {
                    ApiError::BadRequest(e.to_string())
                }
            }
            OAuth2Error::BadRequest(msg) => ApiError::BadRequest(msg),
            OAuth2Error::Forbidden(msg) => ApiError::Forbidden(msg),
            OAuth2Error::Repository(inner) => inner.into(),
            OAuth2Error::Internal(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<BotError> for ApiError {
    fn from(e: BotError) -> Self {
        match e {
            BotError::InvalidArgument(_) | BotError::PingFailed(_) => {
                ApiError::BadRequest(e.to_string())
            }
            BotError::Forbidden(_) => ApiError::Forbidden(e.to_string()),
            BotError::Repository(inner) => inner.into(),
            BotError::OAuth2(inner) => inner.into(),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<WebhookError> for ApiError {
    fn from(e: WebhookError) -> Self {
        match e {
            WebhookError::NotFound(_) => ApiError::NotFound(e.to_string()),
            WebhookError::Forbidden(_) => ApiError::Forbidden(e.to_string()),
            WebhookError::InvalidArgument(_) | WebhookError::Payload(_) => {
                ApiError::BadRequest(e.to_string())
            }
            WebhookError::UnsupportedMediaType(_) => ApiError::UnsupportedMediaType(e.to_string()),
            WebhookError::InvalidSignature(_) => ApiError::Unauthorized(e.to_string()),
            WebhookError::Message(inner) => inner.into(),
            WebhookError::Template(msg) => ApiError::Internal(msg),
        }
    }
}

/// Creates the API router.
pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        .merge(user_routes())
        .merge(channel_routes())
        .merge(message_routes())
        .merge(realtime_routes())
        .merge(bot_routes())
        .merge(oauth2_routes())
        .merge(webhook_routes());

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        .nest(API_PREFIX, api)
        .layer(metrics_layer())
        .layer(request_id_layer())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_of(error: ApiError) -> (StatusCode, serde_json::Value) {
        let response = error.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_channel_errors_map_to_status() {
        let (status, body) = body_of(ChannelError::DepthLimit.into()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "channel depth limit exceeded");

        let (status, _) = body_of(ChannelError::AlreadyExists("general".into()).into()).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) =
            body_of(ChannelError::Repository(RepositoryError::NotFound("x".into())).into()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_webhook_and_oauth2_errors_map_to_status() {
        let (status, _) = body_of(WebhookError::InvalidSignature("mismatch").into()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = body_of(WebhookError::UnsupportedMediaType("image/png".into()).into()).await;
        assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);

        let (status, _) = body_of(OAuth2Error::InvalidToken.into()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = body_of(BotError::PingFailed("ng".into()).into()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_validation_errors_render_details() {
        let errors = crate::validation::Checker::new()
            .check("name", crate::validation::validate_user_name("no spaces"))
            .finish()
            .unwrap_err();
        let (status, body) = body_of(errors.into()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation_error");
        assert_eq!(body["details"][0]["field"], "name");
    }
}
