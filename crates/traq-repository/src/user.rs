//! Users, tags, user groups and notification devices.

use crate::error::{RepositoryError, Result};
use crate::memory::MemoryRepository;
use traq_types::{Tag, Timestamp, User, UserGroup, UserId, UserStatus, UserTag};
use uuid::Uuid;

/// Filter for [`UserRepository::list_users`].
#[derive(Debug, Clone, Copy, Default)]
pub struct UsersQuery {
    pub active_only: bool,
    pub exclude_bots: bool,
}

impl UsersQuery {
    /// Active, non-bot users: the population that receives notifications.
    pub fn notifiable() -> Self {
        Self {
            active_only: true,
            exclude_bots: true,
        }
    }
}

/// User persistence.
pub trait UserRepository: Send + Sync {
    /// Insert a user. Fails with `AlreadyExists` if the name is taken.
    fn create_user(&self, user: User) -> Result<User>;
    fn get_user(&self, id: UserId) -> Result<User>;
    fn get_user_by_name(&self, name: &str) -> Result<User>;
    fn list_users(&self, query: UsersQuery) -> Vec<User>;
    /// Change a user's status. Deactivation purges the user's unread rows.
    fn update_user_status(&self, id: UserId, status: UserStatus) -> Result<User>;
    fn update_user_display_name(&self, id: UserId, display_name: &str) -> Result<User>;
    fn update_user_last_online(&self, id: UserId, at: Timestamp) -> Result<()>;
    /// Register a push-notification device token for a user.
    fn register_device(&self, user_id: UserId, token: &str) -> Result<()>;
    fn get_device_tokens(&self, user_ids: &[UserId]) -> Vec<String>;
}

/// Tag and user-group persistence.
pub trait TagRepository: Send + Sync {
    /// Return the tag with this name, creating it when absent.
    fn get_or_create_tag(&self, name: &str) -> Result<Tag>;
    fn get_tag(&self, id: Uuid) -> Result<Tag>;
    fn add_user_tag(&self, user_id: UserId, tag_id: Uuid) -> Result<UserTag>;
    fn delete_user_tag(&self, user_id: UserId, tag_id: Uuid) -> Result<()>;
    fn get_user_tags(&self, user_id: UserId) -> Vec<(UserTag, Tag)>;
    fn get_users_with_tag(&self, tag_id: Uuid) -> Vec<UserId>;

    fn create_user_group(&self, group: UserGroup) -> Result<UserGroup>;
    fn get_user_group(&self, id: Uuid) -> Result<UserGroup>;
    fn list_user_groups(&self) -> Vec<UserGroup>;
    fn delete_user_group(&self, id: Uuid) -> Result<UserGroup>;
    fn add_user_group_member(&self, group_id: Uuid, user_id: UserId) -> Result<()>;
    fn remove_user_group_member(&self, group_id: Uuid, user_id: UserId) -> Result<()>;
}

impl UserRepository for MemoryRepository {
    fn create_user(&self, user: User) -> Result<User> {
        let mut t = self.tables.write();
        if t.user_names.contains_key(&user.name) {
            return Err(RepositoryError::AlreadyExists(format!("user '{}'", user.name)));
        }
        t.user_names.insert(user.name.clone(), user.id);
        t.users.insert(user.id, user.clone());
        Ok(user)
    }

    fn get_user(&self, id: UserId) -> Result<User> {
        self.tables
            .read()
            .users
            .get(&id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("user {}", id)))
    }

    fn get_user_by_name(&self, name: &str) -> Result<User> {
        let t = self.tables.read();
        t.user_names
            .get(name)
            .and_then(|id| t.users.get(id))
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("user '{}'", name)))
    }

    fn list_users(&self, query: UsersQuery) -> Vec<User> {
        let mut users: Vec<User> = self
            .tables
            .read()
            .users
            .values()
            .filter(|u| !query.active_only || u.is_active())
            .filter(|u| !query.exclude_bots || !u.bot)
            .cloned()
            .collect();
        users.sort_by(|a, b| a.name.cmp(&b.name));
        users
    }

    fn update_user_status(&self, id: UserId, status: UserStatus) -> Result<User> {
        let mut t = self.tables.write();
        let user = t
            .users
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("user {}", id)))?;
        user.status = status;
        user.updated_at = Timestamp::now();
        let user = user.clone();

        if status == UserStatus::Deactivated {
            t.unreads.retain(|(u, _), _| *u != id);
        }
        Ok(user)
    }

    fn update_user_display_name(&self, id: UserId, display_name: &str) -> Result<User> {
        let mut t = self.tables.write();
        let user = t
            .users
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("user {}", id)))?;
        user.display_name = display_name.to_string();
        user.updated_at = Timestamp::now();
        Ok(user.clone())
    }

    fn update_user_last_online(&self, id: UserId, at: Timestamp) -> Result<()> {
        let mut t = self.tables.write();
        let user = t
            .users
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("user {}", id)))?;
        user.last_online = Some(at);
        Ok(())
    }

    fn register_device(&self, user_id: UserId, token: &str) -> Result<()> {
        let mut t = self.tables.write();
        if !t.users.contains_key(&user_id) {
            return Err(RepositoryError::NotFound(format!("user {}", user_id)));
        }
        if token.is_empty() {
            return Err(RepositoryError::InvalidArgument("empty device token".into()));
        }
        match t.devices.get(token) {
            Some(owner) if *owner != user_id => Err(RepositoryError::AlreadyExists(
                "device token registered to another user".into(),
            )),
            _ => {
                t.devices.insert(token.to_string(), user_id);
                Ok(())
            }
        }
    }

    fn get_device_tokens(&self, user_ids: &[UserId]) -> Vec<String> {
        self.tables
            .read()
            .devices
            .iter()
            .filter(|(_, owner)| user_ids.contains(owner))
            .map(|(token, _)| token.clone())
            .collect()
    }
}

impl TagRepository for MemoryRepository {
    fn get_or_create_tag(&self, name: &str) -> Result<Tag> {
        if name.is_empty() || name.chars().count() > 30 {
            return Err(RepositoryError::InvalidArgument(format!("tag name '{}'", name)));
        }
        let mut t = self.tables.write();
        if let Some(id) = t.tag_names.get(name).copied() {
            if let Some(tag) = t.tags.get(&id) {
                return Ok(tag.clone());
            }
        }
        let tag = Tag {
            id: Uuid::new_v4(),
            name: name.to_string(),
        };
        t.tag_names.insert(tag.name.clone(), tag.id);
        t.tags.insert(tag.id, tag.clone());
        Ok(tag)
    }

    fn get_tag(&self, id: Uuid) -> Result<Tag> {
        self.tables
            .read()
            .tags
            .get(&id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("tag {}", id)))
    }

    fn add_user_tag(&self, user_id: UserId, tag_id: Uuid) -> Result<UserTag> {
        let mut t = self.tables.write();
        if !t.users.contains_key(&user_id) {
            return Err(RepositoryError::NotFound(format!("user {}", user_id)));
        }
        if !t.tags.contains_key(&tag_id) {
            return Err(RepositoryError::NotFound(format!("tag {}", tag_id)));
        }
        if t.user_tags.contains_key(&(user_id, tag_id)) {
            return Err(RepositoryError::AlreadyExists(format!("tag {} on user {}", tag_id, user_id)));
        }
        let user_tag = UserTag {
            user_id,
            tag_id,
            locked: false,
            created_at: Timestamp::now(),
        };
        t.user_tags.insert((user_id, tag_id), user_tag.clone());
        Ok(user_tag)
    }

    fn delete_user_tag(&self, user_id: UserId, tag_id: Uuid) -> Result<()> {
        self.tables
            .write()
            .user_tags
            .remove(&(user_id, tag_id))
            .map(|_| ())
            .ok_or_else(|| RepositoryError::NotFound(format!("tag {} on user {}", tag_id, user_id)))
    }

    fn get_user_tags(&self, user_id: UserId) -> Vec<(UserTag, Tag)> {
        let t = self.tables.read();
        let mut tags: Vec<(UserTag, Tag)> = t
            .user_tags
            .values()
            .filter(|ut| ut.user_id == user_id)
            .filter_map(|ut| t.tags.get(&ut.tag_id).map(|tag| (ut.clone(), tag.clone())))
            .collect();
        tags.sort_by_key(|(ut, _)| ut.created_at);
        tags
    }

    fn get_users_with_tag(&self, tag_id: Uuid) -> Vec<UserId> {
        self.tables
            .read()
            .user_tags
            .keys()
            .filter(|(_, tag)| *tag == tag_id)
            .map(|(user, _)| *user)
            .collect()
    }

    fn create_user_group(&self, group: UserGroup) -> Result<UserGroup> {
        let mut t = self.tables.write();
        if t.groups.values().any(|g| g.name == group.name) {
            return Err(RepositoryError::AlreadyExists(format!("group '{}'", group.name)));
        }
        t.groups.insert(group.id, group.clone());
        Ok(group)
    }

    fn get_user_group(&self, id: Uuid) -> Result<UserGroup> {
        self.tables
            .read()
            .groups
            .get(&id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("group {}", id)))
    }

    fn list_user_groups(&self) -> Vec<UserGroup> {
        let mut groups: Vec<UserGroup> = self.tables.read().groups.values().cloned().collect();
        groups.sort_by(|a, b| a.name.cmp(&b.name));
        groups
    }

    fn delete_user_group(&self, id: Uuid) -> Result<UserGroup> {
        self.tables
            .write()
            .groups
            .remove(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("group {}", id)))
    }

    fn add_user_group_member(&self, group_id: Uuid, user_id: UserId) -> Result<()> {
        let mut t = self.tables.write();
        if !t.users.contains_key(&user_id) {
            return Err(RepositoryError::NotFound(format!("user {}", user_id)));
        }
        let group = t
            .groups
            .get_mut(&group_id)
            .ok_or_else(|| RepositoryError::NotFound(format!("group {}", group_id)))?;
        if group.members.contains(&user_id) {
            return Err(RepositoryError::AlreadyExists(format!("member {}", user_id)));
        }
        group.members.push(user_id);
        Ok(())
    }

    fn remove_user_group_member(&self, group_id: Uuid, user_id: UserId) -> Result<()> {
        let mut t = self.tables.write();
        let group = t
            .groups
            .get_mut(&group_id)
            .ok_or_else(|| RepositoryError::NotFound(format!("group {}", group_id)))?;
        let before = group.members.len();
        group.members.retain(|m| *m != user_id);
        if group.members.len() == before {
            return Err(RepositoryError::NotFound(format!("member {}", user_id)));
        }
        Ok(())
    }
}
