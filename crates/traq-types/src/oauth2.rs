//! OAuth2 clients, authorization codes and tokens.

use crate::{AccessScopes, Timestamp, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Lifetime of an authorization code in seconds.
pub const AUTHORIZATION_CODE_EXPIRES_IN: i64 = 5 * 60;

/// A registered OAuth2 client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuth2Client {
    pub id: String,
    pub name: String,
    pub description: String,
    pub confidential: bool,
    pub creator_id: UserId,
    #[serde(skip_serializing)]
    pub secret: String,
    /// Single registered redirect URI. Empty means the client cannot use
    /// redirect-based flows.
    pub redirect_uri: String,
    pub scopes: AccessScopes,
    pub created_at: Timestamp,
}

impl OAuth2Client {
    /// Scopes of `requested` that this client is allowed to receive.
    pub fn available_scopes(&self, requested: &AccessScopes) -> AccessScopes {
        self.scopes.intersect(requested)
    }
}

/// PKCE code challenge method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CodeChallengeMethod {
    #[serde(rename = "plain")]
    Plain,
    #[serde(rename = "S256")]
    S256,
}

impl CodeChallengeMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            CodeChallengeMethod::Plain => "plain",
            CodeChallengeMethod::S256 => "S256",
        }
    }
}

impl fmt::Display for CodeChallengeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CodeChallengeMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plain" => Ok(CodeChallengeMethod::Plain),
            "S256" => Ok(CodeChallengeMethod::S256),
            other => Err(format!("unsupported code challenge method: {}", other)),
        }
    }
}

/// A single-use authorization code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuth2Authorize {
    pub code: String,
    pub client_id: String,
    pub user_id: UserId,
    pub expires_in: i64,
    /// Redirect URI presented at the authorize endpoint, if any.
    pub redirect_uri: String,
    pub scopes: AccessScopes,
    pub original_scopes: AccessScopes,
    pub code_challenge: String,
    pub code_challenge_method: Option<CodeChallengeMethod>,
    pub nonce: String,
    pub created_at: Timestamp,
}

impl OAuth2Authorize {
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.created_at.add_secs(self.expires_in) < now
    }
}

/// An issued access token, optionally paired with a refresh token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuth2Token {
    pub id: Uuid,
    pub client_id: String,
    /// Nil for tokens issued through the client-credentials grant.
    pub user_id: UserId,
    #[serde(skip_serializing)]
    pub access_token: String,
    #[serde(skip_serializing)]
    pub refresh_token: Option<String>,
    pub scopes: AccessScopes,
    pub expires_in: i64,
    pub created_at: Timestamp,
}

impl OAuth2Token {
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.created_at.add_secs(self.expires_in) < now
    }

    /// Seconds until expiry, never negative.
    pub fn remaining_secs(&self, now: Timestamp) -> i64 {
        let left = self.created_at.add_secs(self.expires_in).as_secs() - now.as_secs();
        left.max(0)
    }

    pub fn is_refreshable(&self) -> bool {
        self.refresh_token.is_some()
    }
}
