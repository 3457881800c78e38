//! Authorization and token endpoints.
//!
//! [`OAuth2Service`] is independent of the HTTP framework: handlers decode
//! the query or form into [`AuthorizeRequest`] / [`TokenRequest`], pass the
//! session user and any Basic credentials, and translate the outcome into a
//! redirect or a JSON body.

use crate::credentials::{secure_alphanumeric, verify_password};
use crate::error::{ErrorCode, OAuth2Error};
use crate::pkce::{self, PKCE_REGEX};
use crate::scope::parse_scopes;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error};
use traq_repository::{OAuth2Repository, Repository, RepositoryError, UserRepository};
use traq_types::{
    AccessScope, AccessScopes, CodeChallengeMethod, OAuth2Authorize, OAuth2Client, OAuth2Token, Timestamp,
    UserId, AUTHORIZATION_CODE_EXPIRES_IN,
};
use url::Url;
use uuid::Uuid;

/// Length of authorization codes, access tokens and refresh tokens.
pub const TOKEN_LENGTH: usize = 36;

/// How long a pending authorization waits for the user's decision.
pub const AUTHORIZE_SESSION_TTL_SECS: i64 = 5 * 60;

/// Token type reported by the token endpoint.
pub const AUTH_SCHEME: &str = "Bearer";

pub const GRANT_AUTHORIZATION_CODE: &str = "authorization_code";
pub const GRANT_PASSWORD: &str = "password";
pub const GRANT_CLIENT_CREDENTIALS: &str = "client_credentials";
pub const GRANT_REFRESH_TOKEN: &str = "refresh_token";

/// Token lifetime and refresh settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuth2Config {
    /// Access token lifetime in seconds.
    pub access_token_exp: i64,
    /// Issue refresh tokens alongside access tokens.
    pub refresh_enabled: bool,
}

impl Default for OAuth2Config {
    fn default() -> Self {
        Self {
            access_token_exp: 60 * 60 * 24 * 365,
            refresh_enabled: false,
        }
    }
}

/// Parameters of the authorization endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthorizeRequest {
    pub response_type: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub scope: String,
    pub state: String,
    pub code_challenge: String,
    pub code_challenge_method: String,
    pub nonce: String,
    pub prompt: String,
}

/// The set of `response_type` values requested.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResponseTypes {
    pub code: bool,
    pub token: bool,
    pub id_token: bool,
    pub none: bool,
}

impl ResponseTypes {
    /// Parse a space-separated `response_type`. Unknown values yield `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let mut types = ResponseTypes::default();
        for value in raw.split_ascii_whitespace() {
            match value {
                "code" => types.code = true,
                "token" => types.token = true,
                "id_token" => types.id_token = true,
                "none" => types.none = true,
                _ => return None,
            }
        }
        Some(types)
    }

    /// `none` must stand alone; otherwise at least one type is required.
    pub fn is_valid(&self) -> bool {
        if self.none {
            return !self.code && !self.token && !self.id_token;
        }
        self.code || self.token || self.id_token
    }

    /// Only the authorization code flow issues anything.
    pub fn is_code_flow(&self) -> bool {
        self.code && !self.token && !self.id_token
    }
}

/// An authorization request held in the user's session until they approve
/// or deny it on the consent page.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingAuthorization {
    pub request: AuthorizeRequest,
    pub types: ResponseTypes,
    pub scopes: AccessScopes,
    pub valid_scopes: AccessScopes,
    pub accessed_at: Timestamp,
}

impl PendingAuthorization {
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.accessed_at.older_than(AUTHORIZE_SESSION_TTL_SECS, now)
    }
}

/// What the authorization endpoint asks the HTTP layer to do.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthorizeOutcome {
    /// Redirect to the client with `code` or `error` in the query.
    Redirect(String),
    /// No session: send the user to the login page and replay the request.
    LoginRequired,
    /// Store `pending` in the session and redirect to the consent page.
    Consent {
        pending: PendingAuthorization,
        location: String,
    },
}

/// Form body of the token endpoint. Fields unused by a grant are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TokenRequest {
    pub grant_type: String,
    pub code: String,
    pub redirect_uri: String,
    pub client_id: String,
    pub client_secret: String,
    pub code_verifier: String,
    pub scope: String,
    pub username: String,
    pub password: String,
    pub refresh_token: String,
}

/// Client id and secret presented through HTTP Basic authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientCredentials {
    pub id: String,
    pub secret: String,
}

/// Successful token endpoint response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Present only when the granted scopes differ from those requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// The OAuth2 authorization server.
pub struct OAuth2Service {
    repo: Arc<dyn Repository>,
    config: OAuth2Config,
}

impl OAuth2Service {
    pub fn new(repo: Arc<dyn Repository>, config: OAuth2Config) -> Self {
        Self { repo, config }
    }

    pub fn config(&self) -> OAuth2Config {
        self.config
    }

    pub(crate) fn repo(&self) -> &dyn Repository {
        self.repo.as_ref()
    }

    /// Handle the authorization endpoint for the user owning the current
    /// session, if any.
    ///
    /// Errors are only returned while the client's redirect URI cannot be
    /// trusted; afterwards every failure becomes a redirect carrying `error`
    /// and `state`.
    pub fn authorize(
        &self,
        req: AuthorizeRequest,
        session_user: Option<UserId>,
    ) -> Result<AuthorizeOutcome> {
        if req.client_id.is_empty() {
            return Err(OAuth2Error::BadRequest("client_id is required".into()));
        }
        let client = self.redirectable_client(&req.client_id)?;
        if !req.redirect_uri.is_empty() && req.redirect_uri != client.redirect_uri {
            return Err(OAuth2Error::BadRequest("invalid client".into()));
        }
        let target = ClientRedirect::new(&client, &req.state)?;

        if !req.code_challenge_method.is_empty()
            && (req.code_challenge_method.parse::<CodeChallengeMethod>().is_err()
                || !PKCE_REGEX.is_match(&req.code_challenge))
        {
            return Ok(target.error(ErrorCode::InvalidRequest, None));
        }

        let scopes = match parse_scopes(&req.scope) {
            Ok(scopes) => scopes,
            Err(_) => return Ok(target.error(ErrorCode::InvalidScope, None)),
        };
        let valid_scopes = if scopes.is_empty() {
            client.scopes.clone()
        } else {
            let valid = client.available_scopes(&scopes);
            if valid.is_empty() {
                return Ok(target.error(ErrorCode::InvalidScope, None));
            }
            valid
        };

        let types = match ResponseTypes::parse(&req.response_type) {
            Some(types) if types.is_valid() => types,
            _ => return Ok(target.error(ErrorCode::UnsupportedResponseType, None)),
        };

        let pending = PendingAuthorization {
            request: req,
            types,
            scopes,
            valid_scopes,
            accessed_at: Timestamp::now(),
        };

        match pending.request.prompt.as_str() {
            "" => {}
            "none" => return Ok(self.authorize_silently(&target, &pending, session_user)),
            other => {
                return Ok(target.error(
                    ErrorCode::InvalidRequest,
                    Some(format!("prompt {} is not supported", other)),
                ))
            }
        }

        if !types.is_code_flow() {
            return Ok(target.error(ErrorCode::UnsupportedResponseType, None));
        }
        if session_user.is_none() {
            return Ok(AuthorizeOutcome::LoginRequired);
        }

        let mut consent = Url::parse("http://localhost/consent")
            .map_err(|e| OAuth2Error::Internal(e.to_string()))?;
        {
            let mut query = consent.query_pairs_mut();
            query.append_pair("client_id", &pending.request.client_id);
            query.append_pair("scopes", &pending.valid_scopes.to_string());
            if !pending.request.state.is_empty() {
                query.append_pair("state", &pending.request.state);
            }
        }
        let location = format!("/consent?{}", consent.query().unwrap_or_default());
        Ok(AuthorizeOutcome::Consent { pending, location })
    }

    /// `prompt=none`: issue a code only if the user already holds a token
    /// for this client covering every requested scope.
    fn authorize_silently(
        &self,
        target: &ClientRedirect,
        pending: &PendingAuthorization,
        session_user: Option<UserId>,
    ) -> AuthorizeOutcome {
        let Some(user_id) = session_user else {
            return target.error(ErrorCode::LoginRequired, None);
        };
        if let Err(e) = self.repo.get_user(user_id) {
            error!(error = %e, user_id = %user_id, "Failed to load session user");
            return target.error(ErrorCode::ServerError, None);
        }

        let consented = self
            .repo
            .list_tokens_by_user(user_id)
            .iter()
            .any(|t| t.client_id == pending.request.client_id && t.scopes.covers(&pending.scopes));
        if !consented {
            return target.error(ErrorCode::ConsentRequired, None);
        }

        self.issue_code(target, pending, user_id)
    }

    /// Handle the consent form. `pending` is taken out of the session by the
    /// caller; anything but `approve` denies the request.
    pub fn decide(
        &self,
        pending: Option<PendingAuthorization>,
        user_id: UserId,
        submit: &str,
    ) -> Result<String> {
        let pending = pending.ok_or_else(|| OAuth2Error::Forbidden("bad session".into()))?;
        let client = self.redirectable_client(&pending.request.client_id)?;
        let target = ClientRedirect::new(&client, &pending.request.state)?;

        if pending.is_expired(Timestamp::now()) {
            return Ok(target.location(ErrorCode::AccessDenied, Some("timeout")));
        }
        if submit != "approve" {
            return Ok(target.location(ErrorCode::AccessDenied, None));
        }
        if !pending.types.is_code_flow() {
            return Ok(target.location(ErrorCode::UnsupportedResponseType, None));
        }

        match self.issue_code(&target, &pending, user_id) {
            AuthorizeOutcome::Redirect(location) => Ok(location),
            _ => Ok(target.location(ErrorCode::ServerError, None)),
        }
    }

    fn issue_code(
        &self,
        target: &ClientRedirect,
        pending: &PendingAuthorization,
        user_id: UserId,
    ) -> AuthorizeOutcome {
        let req = &pending.request;
        let authorize = OAuth2Authorize {
            code: secure_alphanumeric(TOKEN_LENGTH),
            client_id: req.client_id.clone(),
            user_id,
            expires_in: AUTHORIZATION_CODE_EXPIRES_IN,
            redirect_uri: req.redirect_uri.clone(),
            scopes: pending.valid_scopes.clone(),
            original_scopes: pending.scopes.clone(),
            code_challenge: req.code_challenge.clone(),
            code_challenge_method: req.code_challenge_method.parse().ok(),
            nonce: req.nonce.clone(),
            created_at: Timestamp::now(),
        };
        let code = authorize.code.clone();
        if let Err(e) = self.repo.save_authorize(authorize) {
            error!(error = %e, client_id = %req.client_id, "Failed to save authorization code");
            return target.error(ErrorCode::ServerError, None);
        }
        debug!(client_id = %req.client_id, user_id = %user_id, "Issued authorization code");
        AuthorizeOutcome::Redirect(target.with_code(&code))
    }

    fn redirectable_client(&self, client_id: &str) -> Result<OAuth2Client> {
        let client = self.repo.get_client(client_id).map_err(|e| match e {
            RepositoryError::NotFound(_) => OAuth2Error::BadRequest("unknown client".into()),
            other => other.into(),
        })?;
        if client.redirect_uri.is_empty() {
            return Err(OAuth2Error::Forbidden("invalid client".into()));
        }
        Ok(client)
    }

    /// Handle the token endpoint, dispatching on `grant_type`.
    pub fn token(
        &self,
        req: &TokenRequest,
        basic: Option<ClientCredentials>,
    ) -> Result<TokenResponse> {
        match req.grant_type.as_str() {
            GRANT_AUTHORIZATION_CODE => self.grant_authorization_code(req, basic),
            GRANT_PASSWORD => self.grant_password(req, basic),
            GRANT_CLIENT_CREDENTIALS => self.grant_client_credentials(req, basic),
            GRANT_REFRESH_TOKEN => self.grant_refresh_token(req, basic),
            _ => Err(OAuth2Error::protocol(ErrorCode::UnsupportedGrantType)),
        }
    }

    fn grant_authorization_code(
        &self,
        req: &TokenRequest,
        basic: Option<ClientCredentials>,
    ) -> Result<TokenResponse> {
        if req.code.is_empty() {
            return Err(OAuth2Error::protocol(ErrorCode::InvalidRequest));
        }

        // Removed before any further check so a code never succeeds twice.
        let code = self.repo.take_authorize(&req.code).map_err(|e| match e {
            RepositoryError::NotFound(_) => OAuth2Error::protocol(ErrorCode::InvalidGrant),
            other => other.into(),
        })?;
        if code.is_expired(Timestamp::now()) {
            return Err(OAuth2Error::protocol(ErrorCode::InvalidGrant));
        }

        let client = self.token_client(&code.client_id)?;
        let presented = presented_credentials(req, basic)?;
        if client.id != presented.id || (client.confidential && client.secret != presented.secret)
        {
            return Err(OAuth2Error::unauthorized(ErrorCode::InvalidClient));
        }

        let redirect_mismatch = if code.redirect_uri.is_empty() {
            !req.redirect_uri.is_empty()
        } else {
            client.redirect_uri != req.redirect_uri
        };
        if redirect_mismatch {
            return Err(OAuth2Error::unauthorized(ErrorCode::InvalidGrant));
        }

        if !pkce::verify(
            &code.code_challenge,
            code.code_challenge_method,
            &req.code_verifier,
        ) {
            return Err(OAuth2Error::protocol(ErrorCode::InvalidRequest));
        }

        let token = self.build_token(&client, code.user_id, code.scopes, true);
        let token = self.repo.issue_token(token)?;
        Ok(self.respond(token, &code.original_scopes))
    }

    fn grant_password(
        &self,
        req: &TokenRequest,
        basic: Option<ClientCredentials>,
    ) -> Result<TokenResponse> {
        if req.username.is_empty() || req.password.is_empty() {
            return Err(OAuth2Error::protocol(ErrorCode::InvalidRequest));
        }

        let presented = presented_credentials(req, basic)?;
        let client = self.token_client(&presented.id)?;
        if client.confidential && client.secret != presented.secret {
            return Err(OAuth2Error::unauthorized(ErrorCode::InvalidClient));
        }

        let user = match self.repo.get_user_by_name(&req.username) {
            Ok(user) => user,
            Err(RepositoryError::NotFound(_)) => {
                return Err(OAuth2Error::unauthorized(ErrorCode::InvalidGrant))
            }
            Err(e) => return Err(e.into()),
        };
        if !user.status.can_authenticate() || !verify_password(&user.password_hash, &req.password)
        {
            return Err(OAuth2Error::unauthorized(ErrorCode::InvalidGrant));
        }

        let (requested, granted) = narrow_scopes(&req.scope, &client.scopes)?;
        let token = self.build_token(&client, user.id, granted, true);
        let token = self.repo.issue_token(token)?;
        Ok(self.respond(token, &requested))
    }

    fn grant_client_credentials(
        &self,
        req: &TokenRequest,
        basic: Option<ClientCredentials>,
    ) -> Result<TokenResponse> {
        let presented = presented_credentials(req, basic)?;
        let client = self.token_client(&presented.id)?;
        if !client.confidential {
            return Err(OAuth2Error::unauthorized(ErrorCode::UnauthorizedClient));
        }
        if client.secret != presented.secret {
            return Err(OAuth2Error::unauthorized(ErrorCode::InvalidClient));
        }

        let (requested, granted) = narrow_scopes(&req.scope, &client.scopes)?;
        let token = self.build_token(&client, Uuid::nil(), granted, false);
        let token = self.repo.issue_token(token)?;
        Ok(self.respond(token, &requested))
    }

    fn grant_refresh_token(
        &self,
        req: &TokenRequest,
        basic: Option<ClientCredentials>,
    ) -> Result<TokenResponse> {
        if req.refresh_token.is_empty() {
            return Err(OAuth2Error::protocol(ErrorCode::InvalidRequest));
        }

        let old = self
            .repo
            .get_token_by_refresh(&req.refresh_token)
            .map_err(|e| match e {
                RepositoryError::NotFound(_) => OAuth2Error::protocol(ErrorCode::InvalidGrant),
                other => other.into(),
            })?;

        let client = self.token_client(&old.client_id)?;
        if client.confidential {
            let presented = presented_credentials(req, basic)?;
            if client.id != presented.id || client.secret != presented.secret {
                return Err(OAuth2Error::unauthorized(ErrorCode::InvalidClient));
            }
        }

        let (_, granted) = narrow_scopes(&req.scope, &old.scopes)?;
        let token = self.build_token(&client, old.user_id, granted, true);

        // A concurrent refresh may have consumed the token in the meantime.
        let token = self
            .repo
            .rotate_token(&req.refresh_token, token)
            .map_err(|e| match e {
                RepositoryError::NotFound(_) => OAuth2Error::protocol(ErrorCode::InvalidGrant),
                other => other.into(),
            })?;
        debug!(client_id = %client.id, user_id = %old.user_id, "Rotated refresh token");
        Ok(self.respond(token, &old.scopes))
    }

    fn token_client(&self, client_id: &str) -> Result<OAuth2Client> {
        self.repo.get_client(client_id).map_err(|e| match e {
            RepositoryError::NotFound(_) => OAuth2Error::protocol(ErrorCode::InvalidClient),
            other => other.into(),
        })
    }

    fn build_token(
        &self,
        client: &OAuth2Client,
        user_id: UserId,
        scopes: AccessScopes,
        grant_allows_refresh: bool,
    ) -> OAuth2Token {
        let openid = scopes.contains(&AccessScope::new("openid"));
        let refresh = self.config.refresh_enabled && grant_allows_refresh && !openid;
        OAuth2Token {
            id: Uuid::new_v4(),
            client_id: client.id.clone(),
            user_id,
            access_token: secure_alphanumeric(TOKEN_LENGTH),
            refresh_token: refresh.then(|| secure_alphanumeric(TOKEN_LENGTH)),
            scopes,
            expires_in: self.config.access_token_exp,
            created_at: Timestamp::now(),
        }
    }

    fn respond(&self, token: OAuth2Token, original: &AccessScopes) -> TokenResponse {
        let scope = (original.len() != token.scopes.len()).then(|| token.scopes.to_string());
        TokenResponse {
            access_token: token.access_token,
            token_type: AUTH_SCHEME,
            expires_in: token.expires_in,
            refresh_token: token.refresh_token,
            scope,
        }
    }

    /// Revoke an access or refresh token. Unknown tokens are ignored.
    pub fn revoke(&self, token: &str) -> Result<()> {
        if token.is_empty() {
            return Ok(());
        }
        match self.repo.delete_token_by_access(token) {
            Ok(()) => return Ok(()),
            Err(RepositoryError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }
        match self.repo.delete_token_by_refresh(token) {
            Ok(()) | Err(RepositoryError::NotFound(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Resolve a bearer access token.
    pub fn authenticate(&self, access_token: &str) -> Result<OAuth2Token> {
        let token = self
            .repo
            .get_token_by_access(access_token)
            .map_err(|_| OAuth2Error::InvalidToken)?;
        if token.is_expired(Timestamp::now()) {
            return Err(OAuth2Error::InvalidToken);
        }
        Ok(token)
    }

    /// Issue a non-expiring token that belongs to no client, as used for bot
    /// users.
    pub fn issue_internal_token(&self, user_id: UserId, scopes: AccessScopes) -> Result<OAuth2Token> {
        let token = OAuth2Token {
            id: Uuid::new_v4(),
            client_id: String::new(),
            user_id,
            access_token: secure_alphanumeric(TOKEN_LENGTH),
            refresh_token: None,
            scopes,
            expires_in: i64::from(i32::MAX),
            created_at: Timestamp::now(),
        };
        Ok(self.repo.issue_token(token)?)
    }
}

/// Builds redirects back to a client's registered URI.
struct ClientRedirect {
    base: Url,
    state: String,
}

impl ClientRedirect {
    fn new(client: &OAuth2Client, state: &str) -> Result<Self> {
        let base = Url::parse(&client.redirect_uri)
            .map_err(|_| OAuth2Error::Forbidden("invalid client".into()))?;
        Ok(Self {
            base,
            state: state.to_string(),
        })
    }

    fn build(&self, pairs: &[(&str, &str)]) -> String {
        let mut url = self.base.clone();
        url.set_query(None);
        {
            let mut query = url.query_pairs_mut();
            for (key, value) in pairs {
                query.append_pair(key, value);
            }
            if !self.state.is_empty() {
                query.append_pair("state", &self.state);
            }
        }
        url.to_string()
    }

    fn location(&self, code: ErrorCode, description: Option<&str>) -> String {
        match description {
            Some(description) => {
                self.build(&[("error", code.as_str()), ("error_description", description)])
            }
            None => self.build(&[("error", code.as_str())]),
        }
    }

    fn error(&self, code: ErrorCode, description: Option<String>) -> AuthorizeOutcome {
        AuthorizeOutcome::Redirect(self.location(code, description.as_deref()))
    }

    fn with_code(&self, code: &str) -> String {
        self.build(&[("code", code)])
    }
}

/// Basic credentials win; otherwise the form's `client_id` is required.
fn presented_credentials(
    req: &TokenRequest,
    basic: Option<ClientCredentials>,
) -> Result<ClientCredentials> {
    match basic {
        Some(credentials) => Ok(credentials),
        None if req.client_id.is_empty() => Err(OAuth2Error::protocol(ErrorCode::InvalidClient)),
        None => Ok(ClientCredentials {
            id: req.client_id.clone(),
            secret: req.client_secret.clone(),
        }),
    }
}

/// Returns `(requested, granted)`. An empty request grants `allowed` in
/// full; a request with nothing in common with `allowed` is rejected.
fn narrow_scopes(raw: &str, allowed: &AccessScopes) -> Result<(AccessScopes, AccessScopes)> {
    let requested = parse_scopes(raw)?;
    if requested.is_empty() {
        return Ok((requested, allowed.clone()));
    }
    let granted = allowed.intersect(&requested);
    if granted.is_empty() {
        return Err(OAuth2Error::protocol(ErrorCode::InvalidScope));
    }
    Ok((requested, granted))
}
