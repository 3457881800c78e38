//! # traQ OAuth2
//!
//! The OAuth2 authorization server: the authorize endpoint with its consent
//! step, the token endpoint for the `authorization_code`, `password`,
//! `client_credentials` and `refresh_token` grants, PKCE, revocation and
//! bearer token authentication. Client registration and password hashing
//! live here as well.

pub mod clients;
pub mod credentials;
pub mod error;
pub mod pkce;
pub mod scope;
pub mod service;

pub use clients::NewClient;
pub use credentials::{hash_password, secure_alphanumeric, verify_password};
pub use error::{ErrorCode, ErrorResponse, OAuth2Error};
pub use scope::parse_scopes;
pub use service::{
    AuthorizeOutcome, AuthorizeRequest, ClientCredentials, OAuth2Config, OAuth2Service,
    PendingAuthorization, ResponseTypes, TokenRequest, TokenResponse, AUTH_SCHEME,
    AUTHORIZE_SESSION_TTL_SECS, TOKEN_LENGTH,
};

/// Result type for OAuth2 operations.
pub type Result<T> = std::result::Result<T, OAuth2Error>;
