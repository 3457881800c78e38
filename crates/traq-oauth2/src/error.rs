//! Error types for the OAuth2 server.

use serde::Serialize;
use std::fmt;
use thiserror::Error;
use traq_repository::RepositoryError;

/// Registered OAuth2 error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidRequest,
    UnauthorizedClient,
    AccessDenied,
    UnsupportedResponseType,
    InvalidScope,
    ServerError,
    InvalidClient,
    InvalidGrant,
    UnsupportedGrantType,
    LoginRequired,
    ConsentRequired,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidRequest => "invalid_request",
            ErrorCode::UnauthorizedClient => "unauthorized_client",
            ErrorCode::AccessDenied => "access_denied",
            ErrorCode::UnsupportedResponseType => "unsupported_response_type",
            ErrorCode::InvalidScope => "invalid_scope",
            ErrorCode::ServerError => "server_error",
            ErrorCode::InvalidClient => "invalid_client",
            ErrorCode::InvalidGrant => "invalid_grant",
            ErrorCode::UnsupportedGrantType => "unsupported_grant_type",
            ErrorCode::LoginRequired => "login_required",
            ErrorCode::ConsentRequired => "consent_required",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The OAuth2 error envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_uri: Option<String>,
}

/// Errors returned by the OAuth2 server.
#[derive(Debug, Error)]
pub enum OAuth2Error {
    /// A protocol error answered with the OAuth2 envelope. `unauthorized`
    /// selects 401 over 400.
    #[error("{code}")]
    Protocol {
        code: ErrorCode,
        description: Option<String>,
        unauthorized: bool,
    },

    /// The request is malformed before a trusted redirect URI is known.
    #[error("{0}")]
    BadRequest(String),

    /// The client, or the session, may not use this endpoint.
    #[error("{0}")]
    Forbidden(String),

    /// Missing, unknown or expired access token.
    #[error("invalid token")]
    InvalidToken,

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl OAuth2Error {
    /// A 400 protocol error.
    pub fn protocol(code: ErrorCode) -> Self {
        OAuth2Error::Protocol {
            code,
            description: None,
            unauthorized: false,
        }
    }

    /// A 401 protocol error.
    pub fn unauthorized(code: ErrorCode) -> Self {
        OAuth2Error::Protocol {
            code,
            description: None,
            unauthorized: true,
        }
    }

    /// Envelope to send for this error.
    pub fn response(&self) -> ErrorResponse {
        match self {
            OAuth2Error::Protocol {
                code, description, ..
            } => ErrorResponse {
                error: code.as_str(),
                error_description: description.clone(),
                error_uri: None,
            },
            OAuth2Error::BadRequest(msg) => ErrorResponse {
                error: ErrorCode::InvalidRequest.as_str(),
                error_description: Some(msg.clone()),
                error_uri: None,
            },
            OAuth2Error::Forbidden(msg) => ErrorResponse {
                error: ErrorCode::AccessDenied.as_str(),
                error_description: Some(msg.clone()),
                error_uri: None,
            },
            OAuth2Error::InvalidToken => ErrorResponse {
                error: ErrorCode::InvalidRequest.as_str(),
                error_description: Some("invalid token".into()),
                error_uri: None,
            },
            OAuth2Error::Repository(_) | OAuth2Error::Internal(_) => ErrorResponse {
                error: ErrorCode::ServerError.as_str(),
                error_description: None,
                error_uri: None,
            },
        }
    }
}
