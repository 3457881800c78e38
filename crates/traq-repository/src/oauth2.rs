//! OAuth2 clients, authorization codes and tokens.

use crate::error::{RepositoryError, Result};
use crate::memory::MemoryRepository;
use traq_types::{OAuth2Authorize, OAuth2Client, OAuth2Token, UserId};
use uuid::Uuid;

/// OAuth2 persistence.
pub trait OAuth2Repository: Send + Sync {
    fn create_client(&self, client: OAuth2Client) -> Result<OAuth2Client>;
    fn get_client(&self, id: &str) -> Result<OAuth2Client>;
    fn list_clients(&self, creator_id: Option<UserId>) -> Vec<OAuth2Client>;
    /// Delete a client together with its codes and tokens.
    fn delete_client(&self, id: &str) -> Result<()>;

    fn save_authorize(&self, authorize: OAuth2Authorize) -> Result<()>;
    /// Load and delete an authorization code in one step. A code can be
    /// taken at most once.
    fn take_authorize(&self, code: &str) -> Result<OAuth2Authorize>;

    fn issue_token(&self, token: OAuth2Token) -> Result<OAuth2Token>;
    fn get_token(&self, id: Uuid) -> Result<OAuth2Token>;
    fn get_token_by_access(&self, access_token: &str) -> Result<OAuth2Token>;
    fn get_token_by_refresh(&self, refresh_token: &str) -> Result<OAuth2Token>;
    /// Replace the token holding `refresh_token` with `new` atomically.
    /// Fails if the refresh token was already consumed.
    fn rotate_token(&self, refresh_token: &str, new: OAuth2Token) -> Result<OAuth2Token>;
    fn delete_token(&self, id: Uuid) -> Result<()>;
    fn delete_token_by_access(&self, access_token: &str) -> Result<()>;
    fn delete_token_by_refresh(&self, refresh_token: &str) -> Result<()>;
    fn list_tokens_by_user(&self, user_id: UserId) -> Vec<OAuth2Token>;
}

fn token_not_found() -> RepositoryError {
    RepositoryError::NotFound("token".into())
}

impl OAuth2Repository for MemoryRepository {
    fn create_client(&self, client: OAuth2Client) -> Result<OAuth2Client> {
        let mut t = self.tables.write();
        if t.clients.contains_key(&client.id) {
            return Err(RepositoryError::AlreadyExists(format!("client {}", client.id)));
        }
        t.clients.insert(client.id.clone(), client.clone());
        Ok(client)
    }

    fn get_client(&self, id: &str) -> Result<OAuth2Client> {
        self.tables
            .read()
            .clients
            .get(id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("client {}", id)))
    }

    fn list_clients(&self, creator_id: Option<UserId>) -> Vec<OAuth2Client> {
        let mut clients: Vec<OAuth2Client> = self
            .tables
            .read()
            .clients
            .values()
            .filter(|c| creator_id.map_or(true, |u| c.creator_id == u))
            .cloned()
            .collect();
        clients.sort_by_key(|c| c.created_at);
        clients
    }

    fn delete_client(&self, id: &str) -> Result<()> {
        let mut t = self.tables.write();
        if t.clients.remove(id).is_none() {
            return Err(RepositoryError::NotFound(format!("client {}", id)));
        }
        t.authorizes.retain(|_, a| a.client_id != id);
        let tokens: Vec<Uuid> = t
            .tokens
            .values()
            .filter(|tok| tok.client_id == id)
            .map(|tok| tok.id)
            .collect();
        for token in tokens {
            t.purge_token(token);
        }
        Ok(())
    }

    fn save_authorize(&self, authorize: OAuth2Authorize) -> Result<()> {
        let mut t = self.tables.write();
        if t.authorizes.contains_key(&authorize.code) {
            return Err(RepositoryError::AlreadyExists("authorization code".into()));
        }
        t.authorizes.insert(authorize.code.clone(), authorize);
        Ok(())
    }

    fn take_authorize(&self, code: &str) -> Result<OAuth2Authorize> {
        self.tables
            .write()
            .authorizes
            .remove(code)
            .ok_or_else(|| RepositoryError::NotFound("authorization code".into()))
    }

    fn issue_token(&self, token: OAuth2Token) -> Result<OAuth2Token> {
        let mut t = self.tables.write();
        if t.access_index.contains_key(&token.access_token) {
            return Err(RepositoryError::AlreadyExists("access token".into()));
        }
        t.insert_token(token.clone());
        Ok(token)
    }

    fn get_token(&self, id: Uuid) -> Result<OAuth2Token> {
        self.tables
            .read()
            .tokens
            .get(&id)
            .cloned()
            .ok_or_else(token_not_found)
    }

    fn get_token_by_access(&self, access_token: &str) -> Result<OAuth2Token> {
        let t = self.tables.read();
        t.access_index
            .get(access_token)
            .and_then(|id| t.tokens.get(id))
            .cloned()
            .ok_or_else(token_not_found)
    }

    fn get_token_by_refresh(&self, refresh_token: &str) -> Result<OAuth2Token> {
        let t = self.tables.read();
        t.refresh_index
            .get(refresh_token)
            .and_then(|id| t.tokens.get(id))
            .cloned()
            .ok_or_else(token_not_found)
    }

    fn rotate_token(&self, refresh_token: &str, new: OAuth2Token) -> Result<OAuth2Token> {
        let mut t = self.tables.write();
        let old = t
            .refresh_index
            .get(refresh_token)
            .copied()
            .ok_or_else(token_not_found)?;
        t.purge_token(old);
        t.insert_token(new.clone());
        Ok(new)
    }

    fn delete_token(&self, id: Uuid) -> Result<()> {
        self.tables
            .write()
            .purge_token(id)
            .map(|_| ())
            .ok_or_else(token_not_found)
    }

    fn delete_token_by_access(&self, access_token: &str) -> Result<()> {
        let mut t = self.tables.write();
        let id = t
            .access_index
            .get(access_token)
            .copied()
            .ok_or_else(token_not_found)?;
        t.purge_token(id);
        Ok(())
    }

    fn delete_token_by_refresh(&self, refresh_token: &str) -> Result<()> {
        let mut t = self.tables.write();
        let id = t
            .refresh_index
            .get(refresh_token)
            .copied()
            .ok_or_else(token_not_found)?;
        t.purge_token(id);
        Ok(())
    }

    fn list_tokens_by_user(&self, user_id: UserId) -> Vec<OAuth2Token> {
        let mut tokens: Vec<OAuth2Token> = self
            .tables
            .read()
            .tokens
            .values()
            .filter(|tok| tok.user_id == user_id)
            .cloned()
            .collect();
        tokens.sort_by_key(|tok| tok.created_at);
        tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use traq_types::{AccessScopes, Timestamp};

    fn token(access: &str, refresh: Option<&str>) -> OAuth2Token {
        OAuth2Token {
            id: Uuid::new_v4(),
            client_id: "client".into(),
            user_id: Uuid::new_v4(),
            access_token: access.into(),
            refresh_token: refresh.map(String::from),
            scopes: AccessScopes::new(),
            expires_in: 3600,
            created_at: Timestamp::now(),
        }
    }

    fn authorize(code: &str) -> OAuth2Authorize {
        OAuth2Authorize {
            code: code.into(),
            client_id: "client".into(),
            user_id: Uuid::new_v4(),
            expires_in: 300,
            redirect_uri: String::new(),
            scopes: AccessScopes::new(),
            original_scopes: AccessScopes::new(),
            code_challenge: String::new(),
            code_challenge_method: None,
            nonce: String::new(),
            created_at: Timestamp::now(),
        }
    }

    #[test]
    fn test_take_authorize_is_single_use() {
        let repo = MemoryRepository::new();
        repo.save_authorize(authorize("abc")).unwrap();
        assert!(repo.take_authorize("abc").is_ok());
        assert!(matches!(repo.take_authorize("abc"), Err(RepositoryError::NotFound(_))));
    }

    #[test]
    fn test_rotate_token_consumes_refresh() {
        let repo = MemoryRepository::new();
        repo.issue_token(token("a1", Some("r1"))).unwrap();

        let rotated = repo.rotate_token("r1", token("a2", Some("r2"))).unwrap();
        assert_eq!(rotated.access_token, "a2");
        assert!(repo.get_token_by_access("a1").is_err());
        assert!(repo.get_token_by_refresh("r1").is_err());
        assert!(repo.rotate_token("r1", token("a3", Some("r3"))).is_err());
        assert!(repo.get_token_by_refresh("r2").is_ok());
    }

    #[test]
    fn test_delete_client_cascades() {
        let repo = MemoryRepository::new();
        repo.create_client(OAuth2Client {
            id: "client".into(),
            name: "c".into(),
            description: String::new(),
            confidential: false,
            creator_id: Uuid::new_v4(),
            secret: "s".into(),
            redirect_uri: String::new(),
            scopes: AccessScopes::new(),
            created_at: Timestamp::now(),
        })
        .unwrap();
        repo.issue_token(token("a1", Some("r1"))).unwrap();
        repo.save_authorize(authorize("code")).unwrap();

        repo.delete_client("client").unwrap();
        assert!(repo.get_token_by_access("a1").is_err());
        assert!(repo.take_authorize("code").is_err());
    }
}
