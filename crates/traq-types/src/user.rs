//! Users, tags and user groups.

use crate::{Timestamp, UserId};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Valid user names: ASCII alphanumerics, `_` and `-`, 1 to 32 characters.
pub static USER_NAME_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_-]{1,32}$").expect("Invalid regex"));

/// Account status of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Active,
    Suspended,
    Deactivated,
}

impl UserStatus {
    /// Only active users may authenticate.
    pub fn can_authenticate(&self) -> bool {
        matches!(self, UserStatus::Active)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Active => "active",
            UserStatus::Suspended => "suspended",
            UserStatus::Deactivated => "deactivated",
        }
    }
}

impl fmt::Display for UserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(UserStatus::Active),
            "suspended" => Ok(UserStatus::Suspended),
            "deactivated" => Ok(UserStatus::Deactivated),
            other => Err(format!("unknown user status: {}", other)),
        }
    }
}

/// Well-known role names.
pub mod role {
    pub const ADMIN: &str = "admin";
    pub const USER: &str = "user";
    pub const BOT: &str = "bot";
}

/// A registered user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub display_name: String,
    /// PHC-formatted password hash; contains its own salt. Empty for bot users.
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: String,
    pub bot: bool,
    pub status: UserStatus,
    pub icon_file_id: Option<Uuid>,
    pub last_online: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl User {
    /// Creates an active human user with the default role.
    pub fn new(name: impl Into<String>, display_name: impl Into<String>, password_hash: String) -> Self {
        let now = Timestamp::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            display_name: display_name.into(),
            password_hash,
            role: role::USER.to_string(),
            bot: false,
            status: UserStatus::Active,
            icon_file_id: None,
            last_online: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Creates an active bot user. Bot users have no password.
    pub fn new_bot(name: impl Into<String>, display_name: impl Into<String>) -> Self {
        let mut user = Self::new(name, display_name, String::new());
        user.bot = true;
        user.role = role::BOT.to_string();
        user
    }

    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }

    pub fn is_admin(&self) -> bool {
        self.role == role::ADMIN
    }

    pub fn is_valid_name(name: &str) -> bool {
        USER_NAME_REGEX.is_match(name)
    }
}

/// A free-form tag that users can attach to profiles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: Uuid,
    pub name: String,
}

/// The association of a tag with a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserTag {
    pub user_id: UserId,
    pub tag_id: Uuid,
    pub locked: bool,
    pub created_at: Timestamp,
}

/// A named group of users that can be mentioned at once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserGroup {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub admin_id: UserId,
    pub members: Vec<UserId>,
    pub created_at: Timestamp,
}

impl UserGroup {
    pub fn new(name: impl Into<String>, description: impl Into<String>, admin_id: UserId) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: description.into(),
            admin_id,
            members: Vec::new(),
            created_at: Timestamp::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_name_validation() {
        assert!(User::is_valid_name("alice"));
        assert!(User::is_valid_name("bot_01-x"));
        assert!(!User::is_valid_name(""));
        assert!(!User::is_valid_name("has space"));
        assert!(!User::is_valid_name(&"a".repeat(33)));
    }

    #[test]
    fn test_status_roundtrip_and_auth() {
        assert_eq!("suspended".parse::<UserStatus>().unwrap(), UserStatus::Suspended);
        assert!("gone".parse::<UserStatus>().is_err());
        assert!(UserStatus::Active.can_authenticate());
        assert!(!UserStatus::Deactivated.can_authenticate());
    }

    #[test]
    fn test_bot_user() {
        let bot = User::new_bot("BOT_x", "x");
        assert!(bot.bot);
        assert_eq!(bot.role, role::BOT);
        assert!(bot.password_hash.is_empty());
    }
}
