//! Client registration and per-user token management.

use crate::credentials::secure_alphanumeric;
use crate::error::OAuth2Error;
use crate::scope::parse_scopes;
use crate::service::{OAuth2Service, TOKEN_LENGTH};
use crate::Result;
use serde::Deserialize;
use tracing::info;
use traq_repository::{OAuth2Repository, RepositoryError};
use traq_types::{OAuth2Client, OAuth2Token, Timestamp, User, UserId};
use url::Url;
use uuid::Uuid;

/// Arguments for registering a client.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NewClient {
    pub name: String,
    pub description: String,
    pub confidential: bool,
    pub redirect_uri: String,
    /// Space-separated scope list.
    pub scopes: String,
}

impl OAuth2Service {
    /// Register a client owned by `creator`. The generated secret is only
    /// ever returned here.
    pub fn create_client(&self, creator: UserId, new: NewClient) -> Result<OAuth2Client> {
        if new.name.trim().is_empty() {
            return Err(OAuth2Error::BadRequest("name is required".into()));
        }
        let scopes = parse_scopes(&new.scopes)
            .map_err(|_| OAuth2Error::BadRequest("invalid scopes".into()))?;
        if scopes.is_empty() {
            return Err(OAuth2Error::BadRequest("at least one scope is required".into()));
        }
        if !new.redirect_uri.is_empty() {
            let valid = Url::parse(&new.redirect_uri)
                .map(|u| matches!(u.scheme(), "http" | "https"))
                .unwrap_or(false);
            if !valid {
                return Err(OAuth2Error::BadRequest("invalid redirect uri".into()));
            }
        }

        let client = self.repo().create_client(OAuth2Client {
            id: secure_alphanumeric(TOKEN_LENGTH),
            name: new.name,
            description: new.description,
            confidential: new.confidential,
            creator_id: creator,
            secret: secure_alphanumeric(TOKEN_LENGTH),
            redirect_uri: new.redirect_uri,
            scopes,
            created_at: Timestamp::now(),
        })?;
        info!(client_id = %client.id, creator_id = %creator, "Registered OAuth2 client");
        Ok(client)
    }

    pub fn get_client(&self, id: &str) -> Result<OAuth2Client> {
        Ok(self.repo().get_client(id)?)
    }

    /// Clients created by `creator`, or every client when `None`.
    pub fn list_clients(&self, creator: Option<UserId>) -> Vec<OAuth2Client> {
        self.repo().list_clients(creator)
    }

    /// Delete a client and every token issued to it. Only the creator or an
    /// administrator may do so.
    pub fn delete_client(&self, id: &str, actor: &User) -> Result<()> {
        let client = self.repo().get_client(id)?;
        if client.creator_id != actor.id && !actor.is_admin() {
            return Err(OAuth2Error::Forbidden("you are not the creator of this client".into()));
        }
        self.repo().delete_client(id)?;
        info!(client_id = %id, "Deleted OAuth2 client");
        Ok(())
    }

    /// Tokens issued to `user_id`.
    pub fn list_user_tokens(&self, user_id: UserId) -> Vec<OAuth2Token> {
        self.repo().list_tokens_by_user(user_id)
    }

    /// Revoke one of the user's own tokens. Tokens owned by somebody else
    /// are reported as missing.
    pub fn revoke_user_token(&self, user_id: UserId, token_id: Uuid) -> Result<()> {
        let token = self.repo().get_token(token_id)?;
        if token.user_id != user_id {
            return Err(RepositoryError::NotFound(format!("token {}", token_id)).into());
        }
        self.repo().delete_token(token_id)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::OAuth2Config;
    use std::sync::Arc;
    use traq_repository::{MemoryRepository, UserRepository};

    fn setup() -> (OAuth2Service, User) {
        let repo = Arc::new(MemoryRepository::new());
        let user = repo.create_user(User::new("bob", "Bob", String::new())).unwrap();
        (OAuth2Service::new(repo, OAuth2Config::default()), user)
    }

    fn new_client(scopes: &str, redirect_uri: &str) -> NewClient {
        NewClient {
            name: "app".into(),
            scopes: scopes.into(),
            redirect_uri: redirect_uri.into(),
            confidential: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_create_client_validates() {
        let (service, user) = setup();
        let client = service
            .create_client(user.id, new_client("read write", "https://a.example/cb"))
            .unwrap();
        assert_eq!(client.id.len(), TOKEN_LENGTH);
        assert_eq!(client.secret.len(), TOKEN_LENGTH);
        assert_eq!(service.list_clients(Some(user.id)).len(), 1);

        assert!(service.create_client(user.id, new_client("admin", "")).is_err());
        assert!(service.create_client(user.id, new_client("", "")).is_err());
        assert!(service
            .create_client(user.id, new_client("read", "ftp://a.example"))
            .is_err());
    }

    #[test]
    fn test_delete_client_requires_creator() {
        let (service, user) = setup();
        let client = service.create_client(user.id, new_client("read", "")).unwrap();
        let stranger = User::new("eve", "Eve", String::new());
        assert!(matches!(
            service.delete_client(&client.id, &stranger),
            Err(OAuth2Error::Forbidden(_))
        ));
        service.delete_client(&client.id, &user).unwrap();
        assert!(service.get_client(&client.id).is_err());
    }

    #[test]
    fn test_revoke_user_token() {
        let (service, user) = setup();
        let token = service
            .issue_internal_token(user.id, ["read"].into_iter().collect())
            .unwrap();
        assert_eq!(service.list_user_tokens(user.id).len(), 1);
        assert!(service.revoke_user_token(Uuid::new_v4(), token.id).is_err());
        service.revoke_user_token(user.id, token.id).unwrap();
        assert!(service.list_user_tokens(user.id).is_empty());
    }
}
