//! Bots, bot channel membership, event logs and webhooks.

use crate::error::{RepositoryError, Result};
use crate::memory::MemoryRepository;
use traq_types::{Bot, BotEventLog, ChannelId, UserId, Webhook};
use uuid::Uuid;

/// Bot persistence.
pub trait BotRepository: Send + Sync {
    fn create_bot(&self, bot: Bot) -> Result<Bot>;
    fn get_bot(&self, id: Uuid) -> Result<Bot>;
    fn get_bot_by_user(&self, user_id: UserId) -> Result<Bot>;
    fn get_bot_by_code(&self, code: &str) -> Result<Bot>;
    fn list_bots(&self) -> Vec<Bot>;
    fn update_bot(&self, bot: Bot) -> Result<Bot>;
    /// Apply `f` to a stored bot under the table lock and return the result.
    fn modify_bot(&self, id: Uuid, f: &mut dyn FnMut(&mut Bot)) -> Result<Bot>;
    /// Delete a bot, its channel memberships and its logs.
    fn delete_bot(&self, id: Uuid) -> Result<Bot>;

    /// Returns `false` if the bot was already in the channel.
    fn add_bot_to_channel(&self, bot_id: Uuid, channel_id: ChannelId) -> Result<bool>;
    fn remove_bot_from_channel(&self, bot_id: Uuid, channel_id: ChannelId) -> Result<bool>;
    fn get_channel_bot_ids(&self, channel_id: ChannelId) -> Vec<Uuid>;
    fn get_bot_channel_ids(&self, bot_id: Uuid) -> Vec<ChannelId>;

    fn record_bot_event_log(&self, log: BotEventLog);
    /// Event logs of a bot, newest first.
    fn get_bot_event_logs(&self, bot_id: Uuid, limit: usize, offset: usize) -> Vec<BotEventLog>;
}

/// Webhook persistence.
pub trait WebhookRepository: Send + Sync {
    fn create_webhook(&self, webhook: Webhook) -> Result<Webhook>;
    fn get_webhook(&self, id: Uuid) -> Result<Webhook>;
    fn list_webhooks(&self, creator_id: Option<UserId>) -> Vec<Webhook>;
    fn delete_webhook(&self, id: Uuid) -> Result<Webhook>;
}

fn bot_not_found(what: impl std::fmt::Display) -> RepositoryError {
    RepositoryError::NotFound(format!("bot {}", what))
}

impl BotRepository for MemoryRepository {
    fn create_bot(&self, bot: Bot) -> Result<Bot> {
        let mut t = self.tables.write();
        if !t.users.contains_key(&bot.bot_user_id) {
            return Err(RepositoryError::NotFound(format!("user {}", bot.bot_user_id)));
        }
        if t.bots.values().any(|b| b.bot_user_id == bot.bot_user_id) {
            return Err(RepositoryError::AlreadyExists(format!(
                "bot for user {}",
                bot.bot_user_id
            )));
        }
        t.bots.insert(bot.id, bot.clone());
        Ok(bot)
    }

    fn get_bot(&self, id: Uuid) -> Result<Bot> {
        self.tables
            .read()
            .bots
            .get(&id)
            .cloned()
            .ok_or_else(|| bot_not_found(id))
    }

    fn get_bot_by_user(&self, user_id: UserId) -> Result<Bot> {
        self.tables
            .read()
            .bots
            .values()
            .find(|b| b.bot_user_id == user_id)
            .cloned()
            .ok_or_else(|| bot_not_found(format!("for user {}", user_id)))
    }

    fn get_bot_by_code(&self, code: &str) -> Result<Bot> {
        self.tables
            .read()
            .bots
            .values()
            .find(|b| !code.is_empty() && b.bot_code == code)
            .cloned()
            .ok_or_else(|| bot_not_found("with that code"))
    }

    fn list_bots(&self) -> Vec<Bot> {
        let mut bots: Vec<Bot> = self.tables.read().bots.values().cloned().collect();
        bots.sort_by_key(|b| b.created_at);
        bots
    }

    fn update_bot(&self, bot: Bot) -> Result<Bot> {
        let mut t = self.tables.write();
        match t.bots.get_mut(&bot.id) {
            Some(slot) => {
                *slot = bot.clone();
                Ok(bot)
            }
            None => Err(bot_not_found(bot.id)),
        }
    }

    fn modify_bot(&self, id: Uuid, f: &mut dyn FnMut(&mut Bot)) -> Result<Bot> {
        let mut t = self.tables.write();
        let bot = t.bots.get_mut(&id).ok_or_else(|| bot_not_found(id))?;
        f(bot);
        Ok(bot.clone())
    }

    fn delete_bot(&self, id: Uuid) -> Result<Bot> {
        let mut t = self.tables.write();
        let bot = t.bots.remove(&id).ok_or_else(|| bot_not_found(id))?;
        t.bot_channels.retain(|(b, _)| *b != id);
        t.bot_logs.remove(&id);
        Ok(bot)
    }

    fn add_bot_to_channel(&self, bot_id: Uuid, channel_id: ChannelId) -> Result<bool> {
        let mut t = self.tables.write();
        if !t.bots.contains_key(&bot_id) {
            return Err(bot_not_found(bot_id));
        }
        if !t.channels.contains_key(&channel_id) {
            return Err(RepositoryError::NotFound(format!("channel {}", channel_id)));
        }
        Ok(t.bot_channels.insert((bot_id, channel_id)))
    }

    fn remove_bot_from_channel(&self, bot_id: Uuid, channel_id: ChannelId) -> Result<bool> {
        let mut t = self.tables.write();
        if !t.bots.contains_key(&bot_id) {
            return Err(bot_not_found(bot_id));
        }
        Ok(t.bot_channels.remove(&(bot_id, channel_id)))
    }

    fn get_channel_bot_ids(&self, channel_id: ChannelId) -> Vec<Uuid> {
        self.tables
            .read()
            .bot_channels
            .iter()
            .filter(|(_, c)| *c == channel_id)
            .map(|(b, _)| *b)
            .collect()
    }

    fn get_bot_channel_ids(&self, bot_id: Uuid) -> Vec<ChannelId> {
        self.tables
            .read()
            .bot_channels
            .iter()
            .filter(|(b, _)| *b == bot_id)
            .map(|(_, c)| *c)
            .collect()
    }

    fn record_bot_event_log(&self, log: BotEventLog) {
        self.tables
            .write()
            .bot_logs
            .entry(log.bot_id)
            .or_default()
            .push(log);
    }

    fn get_bot_event_logs(&self, bot_id: Uuid, limit: usize, offset: usize) -> Vec<BotEventLog> {
        self.tables
            .read()
            .bot_logs
            .get(&bot_id)
            .map(|logs| logs.iter().rev().skip(offset).take(limit).cloned().collect())
            .unwrap_or_default()
    }
}

impl WebhookRepository for MemoryRepository {
    fn create_webhook(&self, webhook: Webhook) -> Result<Webhook> {
        let mut t = self.tables.write();
        if !t.channels.contains_key(&webhook.channel_id) {
            return Err(RepositoryError::NotFound(format!("channel {}", webhook.channel_id)));
        }
        t.webhooks.insert(webhook.id, webhook.clone());
        Ok(webhook)
    }

    fn get_webhook(&self, id: Uuid) -> Result<Webhook> {
        self.tables
            .read()
            .webhooks
            .get(&id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("webhook {}", id)))
    }

    fn list_webhooks(&self, creator_id: Option<UserId>) -> Vec<Webhook> {
        let mut hooks: Vec<Webhook> = self
            .tables
            .read()
            .webhooks
            .values()
            .filter(|w| creator_id.map_or(true, |u| w.creator_id == u))
            .cloned()
            .collect();
        hooks.sort_by_key(|w| w.created_at);
        hooks
    }

    fn delete_webhook(&self, id: Uuid) -> Result<Webhook> {
        self.tables
            .write()
            .webhooks
            .remove(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("webhook {}", id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ChannelRepository, UserRepository};
    use std::collections::BTreeSet;
    use traq_types::{
        BotDeliveryResult, BotEventType, BotMode, BotState, Channel, Timestamp, User,
    };

    fn bot_for(repo: &MemoryRepository) -> Bot {
        let user = repo.create_user(User::new_bot("BOT_test", "test")).unwrap();
        let now = Timestamp::now();
        repo.create_bot(Bot {
            id: Uuid::new_v4(),
            bot_user_id: user.id,
            creator_id: Uuid::new_v4(),
            description: String::new(),
            verification_token: "vt".into(),
            access_token_id: Uuid::new_v4(),
            post_url: "http://localhost/bot".into(),
            subscribe_events: BTreeSet::from([BotEventType::MessageCreated]),
            mode: BotMode::Http,
            state: BotState::Active,
            privileged: false,
            bot_code: "code".into(),
            consecutive_failures: 0,
            created_at: now,
            updated_at: now,
        })
        .unwrap()
    }

    fn log(bot_id: Uuid, n: u64) -> BotEventLog {
        BotEventLog {
            request_id: Uuid::new_v4(),
            bot_id,
            event: BotEventType::Ping,
            body: String::new(),
            error: String::new(),
            code: 204,
            latency_ms: n,
            result: BotDeliveryResult::Ok,
            date_time: Timestamp::now(),
        }
    }

    #[test]
    fn test_modify_bot() {
        let repo = MemoryRepository::new();
        let bot = bot_for(&repo);
        let updated = repo
            .modify_bot(bot.id, &mut |b| b.consecutive_failures += 1)
            .unwrap();
        assert_eq!(updated.consecutive_failures, 1);
        assert_eq!(repo.get_bot(bot.id).unwrap().consecutive_failures, 1);
        assert_eq!(repo.get_bot_by_code("code").unwrap().id, bot.id);
        assert!(repo.get_bot_by_code("").is_err());
    }

    #[test]
    fn test_channel_membership() {
        let repo = MemoryRepository::new();
        let bot = bot_for(&repo);
        let owner = repo.create_user(User::new("alice", "alice", String::new())).unwrap();
        let ch = repo.create_channel(Channel::new("a", None, true, owner.id), &[]).unwrap();

        assert!(repo.add_bot_to_channel(bot.id, ch.id).unwrap());
        assert!(!repo.add_bot_to_channel(bot.id, ch.id).unwrap());
        assert_eq!(repo.get_channel_bot_ids(ch.id), vec![bot.id]);
        assert!(repo.remove_bot_from_channel(bot.id, ch.id).unwrap());
        assert!(repo.get_bot_channel_ids(bot.id).is_empty());
    }

    #[test]
    fn test_event_logs_newest_first() {
        let repo = MemoryRepository::new();
        let bot = bot_for(&repo);
        for n in 0..5 {
            repo.record_bot_event_log(log(bot.id, n));
        }
        let page = repo.get_bot_event_logs(bot.id, 2, 1);
        assert_eq!(page.iter().map(|l| l.latency_ms).collect::<Vec<_>>(), vec![3, 2]);

        repo.delete_bot(bot.id).unwrap();
        assert!(repo.get_bot_event_logs(bot.id, 10, 0).is_empty());
    }
}
