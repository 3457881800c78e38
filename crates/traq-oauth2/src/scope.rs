//! Scope string parsing.

use crate::error::{ErrorCode, OAuth2Error};
use crate::Result;
use traq_types::{is_oauth2_scope, AccessScope, AccessScopes};

/// Parse a space-separated scope list. Every name must be a registered
/// OAuth2 scope and appear at most once. An empty string yields no scopes.
pub fn parse_scopes(raw: &str) -> Result<AccessScopes> {
    let mut scopes = AccessScopes::new();
    for name in raw.split_ascii_whitespace() {
        let scope = AccessScope::new(name);
        if !is_oauth2_scope(name) || scopes.contains(&scope) {
            return Err(OAuth2Error::protocol(ErrorCode::InvalidScope));
        }
        scopes.add(scope);
    }
    Ok(scopes)
}
