//! Login sessions and request authentication.
//!
//! A request is authenticated either by an OAuth2 bearer token in the
//! `Authorization` header or by the `r_session` cookie issued by
//! `POST /login`. Sessions also hold the authorization request waiting for
//! the user's consent.

use axum::extract::FromRequestParts;
use axum::http::{header, request::Parts, HeaderMap};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use parking_lot::RwLock;
use std::collections::HashMap;
use traq_oauth2::{secure_alphanumeric, PendingAuthorization, AUTH_SCHEME};
use traq_repository::UserRepository;
use traq_types::{Timestamp, User, UserId};

use crate::api::{ApiError, AppState};

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "r_session";

/// Sessions expire two weeks after login.
pub const SESSION_TTL_SECS: i64 = 60 * 60 * 24 * 14;

const SESSION_TOKEN_LENGTH: usize = 48;

#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub user_id: UserId,
    pub created_at: Timestamp,
    pub pending: Option<PendingAuthorization>,
}

impl Session {
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.created_at.older_than(SESSION_TTL_SECS, now)
    }
}

/// In-memory session table keyed by cookie value.
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, user_id: UserId) -> Session {
        let session = Session {
            token: secure_alphanumeric(SESSION_TOKEN_LENGTH),
            user_id,
            created_at: Timestamp::now(),
            pending: None,
        };
        self.sessions
            .write()
            .insert(session.token.clone(), session.clone());
        session
    }

    /// Look up a live session. Expired entries are dropped on access.
    pub fn get(&self, token: &str) -> Option<Session> {
        let session = self.sessions.read().get(token).cloned()?;
        if session.is_expired(Timestamp::now()) {
            self.sessions.write().remove(token);
            return None;
        }
        Some(session)
    }

    pub fn remove(&self, token: &str) -> bool {
        self.sessions.write().remove(token).is_some()
    }

    /// Drop every session of a user. Returns how many were removed.
    pub fn remove_user(&self, user_id: UserId) -> usize {
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, s| s.user_id != user_id);
        before - sessions.len()
    }

    pub fn set_pending(&self, token: &str, pending: PendingAuthorization) -> bool {
        match self.sessions.write().get_mut(token) {
            Some(session) => {
                session.pending = Some(pending);
                true
            }
            None => false,
        }
    }

    pub fn take_pending(&self, token: &str) -> Option<PendingAuthorization> {
        self.sessions
            .write()
            .get_mut(token)
            .and_then(|s| s.pending.take())
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

/// Cookie carrying a freshly created session.
pub fn session_cookie(token: &str, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token.to_string()))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .build()
}

/// Cookie that clears the session on the client.
pub fn removal_cookie() -> Cookie<'static> {
    let mut cookie = Cookie::build((SESSION_COOKIE, "")).path("/").build();
    cookie.make_removal();
    cookie
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix(AUTH_SCHEME))
        .and_then(|h| h.strip_prefix(' '))
        .map(str::trim)
}

fn session_token(headers: &HeaderMap) -> Option<String> {
    CookieJar::from_headers(headers)
        .get(SESSION_COOKIE)
        .map(|cookie| cookie.value().to_owned())
}

fn unauthorized(message: &str) -> ApiError {
    ApiError::Unauthorized(message.to_string())
}

/// Resolve the acting user. `Ok(None)` means the request carries no
/// credentials at all.
fn authenticate(headers: &HeaderMap, state: &AppState) -> Result<Option<User>, ApiError> {
    let user_id = if let Some(token) = bearer_token(headers) {
        state
            .oauth2
            .authenticate(token)
            .map_err(|_| unauthorized("invalid or expired token"))?
            .user_id
    } else if let Some(token) = session_token(headers) {
        state
            .sessions
            .get(&token)
            .ok_or_else(|| unauthorized("session expired"))?
            .user_id
    } else {
        return Ok(None);
    };

    let user = state
        .repo
        .get_user(user_id)
        .map_err(|_| unauthorized("unknown user"))?;
    if !user.status.can_authenticate() {
        return Err(unauthorized("account is not active"));
    }
    Ok(Some(user))
}

/// Extractor for the authenticated user.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<CurrentUser>() {
            return Ok(user.clone());
        }
        let user = authenticate(&parts.headers, state)?
            .ok_or_else(|| unauthorized("you are not logged in"))?;
        let current = CurrentUser(user);
        parts.extensions.insert(current.clone());
        Ok(current)
    }
}

/// Extractor for the cookie session, if any. Used by the OAuth2 pages,
/// which keep their own state in the session.
#[derive(Debug, Clone)]
pub struct SessionUser(pub Option<Session>);

impl FromRequestParts<AppState> for SessionUser {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let session = session_token(&parts.headers).and_then(|token| state.sessions.get(&token));
        let session = session.filter(|s| {
            state
                .repo
                .get_user(s.user_id)
                .map(|u| u.status.can_authenticate())
                .unwrap_or(false)
        });
        Ok(SessionUser(session))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use traq_oauth2::{AuthorizeRequest, ResponseTypes};
    use traq_types::AccessScopes;
    use uuid::Uuid;

    fn pending() -> PendingAuthorization {
        PendingAuthorization {
            request: AuthorizeRequest::default(),
            types: ResponseTypes::default(),
            scopes: AccessScopes::default(),
            valid_scopes: AccessScopes::default(),
            accessed_at: Timestamp::now(),
        }
    }

    #[test]
    fn test_session_lifecycle() {
        let store = SessionStore::new();
        let user = Uuid::new_v4();
        let session = store.create(user);
        assert_eq!(session.token.len(), SESSION_TOKEN_LENGTH);
        assert_eq!(store.get(&session.token).unwrap().user_id, user);

        assert!(store.set_pending(&session.token, pending()));
        assert!(store.take_pending(&session.token).is_some());
        assert!(store.take_pending(&session.token).is_none());

        assert!(store.remove(&session.token));
        assert!(store.get(&session.token).is_none());
        assert!(!store.set_pending(&session.token, pending()));
    }

    #[test]
    fn test_remove_user_drops_all_sessions() {
        let store = SessionStore::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        store.create(alice);
        store.create(alice);
        let kept = store.create(bob);

        assert_eq!(store.remove_user(alice), 2);
        assert_eq!(store.len(), 1);
        assert!(store.get(&kept.token).is_some());
    }

    #[test]
    fn test_expired_session_is_rejected() {
        let store = SessionStore::new();
        let session = store.create(Uuid::new_v4());
        store.sessions.write().get_mut(&session.token).unwrap().created_at =
            Timestamp::from_millis(0);
        assert!(store.get(&session.token).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_credentials_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        headers.insert(header::COOKIE, HeaderValue::from_static("r_session=xyz; other=1"));
        assert_eq!(bearer_token(&headers), Some("abc"));
        assert_eq!(session_token(&headers).as_deref(), Some("xyz"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);
    }
}
