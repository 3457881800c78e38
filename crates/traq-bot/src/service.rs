//! Bot management: registration, settings, state changes and channel
//! membership.

use crate::engine::BotEngine;
use crate::error::BotError;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, warn};
use traq_hub::{fields, Event, Field, Hub, Topic};
use traq_oauth2::{secure_alphanumeric, OAuth2Service};
use traq_repository::{
    BotRepository, ChannelRepository, OAuth2Repository, Repository, RepositoryError,
    UserRepository,
};
use traq_types::{
    AccessScope, AccessScopes, Bot, BotDeliveryResult, BotEventLog, BotEventType, BotMode,
    BotState, ChannelId, Timestamp, User, UserStatus,
};
use url::Url;
use uuid::Uuid;

/// Prefix of every bot user's name.
pub const BOT_USER_PREFIX: &str = "BOT_";
const VERIFICATION_TOKEN_LENGTH: usize = 30;
const BOT_CODE_LENGTH: usize = 30;
const BOT_TOKEN_SCOPES: &[&str] = &["read", "write"];
/// Largest page of delivery logs returned at once.
pub const MAX_LOG_LIMIT: usize = 200;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateBot {
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub endpoint: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateBot {
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub endpoint: Option<String>,
    pub privileged: Option<bool>,
}

/// Secrets handed to a bot's developer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BotTokens {
    pub verification_token: String,
    pub access_token: String,
    pub bot_code: String,
}

pub struct BotService {
    repo: Arc<dyn Repository>,
    hub: Arc<Hub>,
    oauth2: Arc<OAuth2Service>,
    engine: Arc<BotEngine>,
}

impl BotService {
    pub fn new(
        repo: Arc<dyn Repository>,
        hub: Arc<Hub>,
        oauth2: Arc<OAuth2Service>,
        engine: Arc<BotEngine>,
    ) -> Self {
        Self {
            repo,
            hub,
            oauth2,
            engine,
        }
    }

    /// Register a bot together with its user and access token. New bots start
    /// paused and must pass a ping before they receive events.
    pub fn create(&self, creator: &User, req: CreateBot) -> Result<(Bot, BotTokens)> {
        let user_name = format!("{BOT_USER_PREFIX}{}", req.name);
        if req.name.is_empty() || !User::is_valid_name(&user_name) {
            return Err(BotError::InvalidArgument(format!("invalid bot name: {}", req.name)));
        }
        validate_endpoint(&req.endpoint)?;

        let display_name = if req.display_name.is_empty() {
            req.name.clone()
        } else {
            req.display_name.clone()
        };
        let user = self.repo.create_user(User::new_bot(user_name, display_name))?;
        let token = self.oauth2.issue_internal_token(user.id, bot_scopes())?;

        let now = Timestamp::now();
        let bot = self.repo.create_bot(Bot {
            id: Uuid::new_v4(),
            bot_user_id: user.id,
            creator_id: creator.id,
            description: req.description,
            verification_token: secure_alphanumeric(VERIFICATION_TOKEN_LENGTH),
            access_token_id: token.id,
            post_url: req.endpoint,
            subscribe_events: BTreeSet::new(),
            mode: BotMode::Http,
            state: BotState::Paused,
            privileged: false,
            bot_code: secure_alphanumeric(BOT_CODE_LENGTH),
            consecutive_failures: 0,
            created_at: now,
            updated_at: now,
        })?;

        self.hub.publish(
            Event::new(Topic::UserJoined)
                .with_id(fields::USER_ID, user.id)
                .with(fields::USER, Field::User(Box::new(user))),
        );
        info!(bot_id = %bot.id, creator = %creator.id, "Bot created");

        let tokens = BotTokens {
            verification_token: bot.verification_token.clone(),
            access_token: token.access_token,
            bot_code: bot.bot_code.clone(),
        };
        Ok((bot, tokens))
    }

    pub fn get(&self, id: Uuid) -> Result<Bot> {
        Ok(self.repo.get_bot(id)?)
    }

    /// All bots, or only those created by `creator`.
    pub fn list(&self, creator: Option<Uuid>) -> Vec<Bot> {
        let mut bots: Vec<Bot> = self
            .repo
            .list_bots()
            .into_iter()
            .filter(|b| creator.map_or(true, |c| b.creator_id == c))
            .collect();
        bots.sort_by_key(|b| b.created_at);
        bots
    }

    /// Current secrets of a bot. Creator or admin only.
    pub fn tokens(&self, actor: &User, id: Uuid) -> Result<BotTokens> {
        let bot = self.owned(actor, id)?;
        let token = self.repo.get_token(bot.access_token_id)?;
        Ok(BotTokens {
            verification_token: bot.verification_token,
            access_token: token.access_token,
            bot_code: bot.bot_code,
        })
    }

    pub fn update(&self, actor: &User, id: Uuid, req: UpdateBot) -> Result<Bot> {
        let bot = self.owned(actor, id)?;
        if req.privileged.is_some() && !actor.is_admin() {
            return Err(BotError::Forbidden("only administrators can change privileges".into()));
        }
        if let Some(endpoint) = &req.endpoint {
            validate_endpoint(endpoint)?;
        }
        if let Some(display_name) = &req.display_name {
            if display_name.is_empty() || display_name.chars().count() > 32 {
                return Err(BotError::InvalidArgument("invalid display name".into()));
            }
            self.repo.update_user_display_name(bot.bot_user_id, display_name)?;
        }

        let updated = self.repo.modify_bot(id, &mut |bot: &mut Bot| {
            if let Some(description) = &req.description {
                bot.description = description.clone();
            }
            if let Some(endpoint) = &req.endpoint {
                bot.post_url = endpoint.clone();
            }
            if let Some(privileged) = req.privileged {
                bot.privileged = privileged;
            }
            bot.updated_at = Timestamp::now();
        })?;

        if req.display_name.is_some() {
            self.hub
                .publish(Event::new(Topic::UserUpdated).with_id(fields::USER_ID, bot.bot_user_id));
        }
        info!(bot_id = %id, "Bot updated");
        Ok(updated)
    }

    /// Replace the subscribed event set. Names use the wire form
    /// (`MESSAGE_CREATED`).
    pub fn set_events(&self, actor: &User, id: Uuid, names: &[String]) -> Result<Bot> {
        self.owned(actor, id)?;
        let mut events = BTreeSet::new();
        for name in names {
            let event = BotEventType::from_str(name)
                .ok_or_else(|| BotError::InvalidArgument(format!("unknown bot event: {name}")))?;
            events.insert(event);
        }
        let updated = self.repo.modify_bot(id, &mut |bot: &mut Bot| {
            bot.subscribe_events = events.clone();
            bot.updated_at = Timestamp::now();
        })?;
        info!(bot_id = %id, events = updated.subscribe_events.len(), "Bot subscriptions replaced");
        Ok(updated)
    }

    /// Move a bot to `state`. Activation requires a successful ping; only
    /// administrators may disable.
    pub async fn change_state(&self, actor: &User, id: Uuid, state: BotState) -> Result<Bot> {
        let bot = self.owned(actor, id)?;
        match state {
            BotState::Active => {
                if bot.state == BotState::Disabled && !actor.is_admin() {
                    return Err(BotError::Forbidden("bot is disabled".into()));
                }
                if bot.state == BotState::Disabled {
                    self.set_state(id, BotState::Paused)?;
                }
                let result = self.engine.ping(id).await?;
                if result != BotDeliveryResult::Ok {
                    return Err(BotError::PingFailed(format!("ping result was {result}")));
                }
                Ok(self.repo.get_bot(id)?)
            }
            BotState::Paused => {
                if bot.state == BotState::Disabled && !actor.is_admin() {
                    return Err(BotError::Forbidden("bot is disabled".into()));
                }
                self.set_state(id, BotState::Paused)
            }
            BotState::Disabled => {
                if !actor.is_admin() {
                    return Err(BotError::Forbidden(
                        "only administrators can disable bots".into(),
                    ));
                }
                self.set_state(id, BotState::Disabled)
            }
        }
    }

    /// Regenerate the verification token, access token and bot code. The
    /// previous access token stops working immediately.
    pub fn reissue(&self, actor: &User, id: Uuid) -> Result<BotTokens> {
        let bot = self.owned(actor, id)?;
        let token = self.oauth2.issue_internal_token(bot.bot_user_id, bot_scopes())?;
        let updated = self.repo.modify_bot(id, &mut |bot: &mut Bot| {
            bot.verification_token = secure_alphanumeric(VERIFICATION_TOKEN_LENGTH);
            bot.bot_code = secure_alphanumeric(BOT_CODE_LENGTH);
            bot.access_token_id = token.id;
            bot.updated_at = Timestamp::now();
        })?;
        ignore_missing(self.repo.delete_token(bot.access_token_id))?;
        info!(bot_id = %id, "Bot tokens reissued");
        Ok(BotTokens {
            verification_token: updated.verification_token,
            access_token: token.access_token,
            bot_code: updated.bot_code,
        })
    }

    /// Delete a bot, revoke its token and deactivate its user.
    pub fn delete(&self, actor: &User, id: Uuid) -> Result<()> {
        let bot = self.owned(actor, id)?;
        ignore_missing(self.repo.delete_token(bot.access_token_id))?;
        self.repo.delete_bot(id)?;
        self.repo
            .update_user_status(bot.bot_user_id, UserStatus::Deactivated)?;
        self.hub
            .publish(Event::new(Topic::UserUpdated).with_id(fields::USER_ID, bot.bot_user_id));
        info!(bot_id = %id, "Bot deleted");
        Ok(())
    }

    /// Delivery log, newest first.
    pub fn logs(&self, actor: &User, id: Uuid, limit: usize, offset: usize) -> Result<Vec<BotEventLog>> {
        self.owned(actor, id)?;
        Ok(self
            .repo
            .get_bot_event_logs(id, limit.clamp(1, MAX_LOG_LIMIT), offset))
    }

    /// Install a bot into a channel using its bot code.
    pub fn join_channel(&self, actor: &User, channel_id: ChannelId, code: &str) -> Result<Bot> {
        let bot = self
            .repo
            .get_bot_by_code(code)
            .map_err(|_| BotError::InvalidArgument("invalid bot code".into()))?;
        let channel = self.repo.get_channel(channel_id)?;
        if !self.repo.is_channel_accessible(actor.id, channel.id) {
            return Err(RepositoryError::NotFound(format!("channel {channel_id}")).into());
        }
        if channel.is_dm() {
            return Err(BotError::InvalidArgument("bots cannot join direct message channels".into()));
        }
        if bot.state == BotState::Disabled {
            return Err(BotError::InvalidArgument("bot is disabled".into()));
        }

        if self.repo.add_bot_to_channel(bot.id, channel_id)? {
            self.hub.publish(
                Event::new(Topic::BotJoined)
                    .with_id(fields::BOT_ID, bot.id)
                    .with_id(fields::CHANNEL_ID, channel_id)
                    .with_id(fields::USER_ID, bot.bot_user_id),
            );
            info!(bot_id = %bot.id, channel_id = %channel_id, "Bot joined channel");
        }
        Ok(bot)
    }

    pub fn leave_channel(&self, actor: &User, channel_id: ChannelId, bot_id: Uuid) -> Result<()> {
        let bot = self.repo.get_bot(bot_id)?;
        if !self.repo.is_channel_accessible(actor.id, channel_id) {
            return Err(RepositoryError::NotFound(format!("channel {channel_id}")).into());
        }
        if self.repo.remove_bot_from_channel(bot.id, channel_id)? {
            self.hub.publish(
                Event::new(Topic::BotLeft)
                    .with_id(fields::BOT_ID, bot.id)
                    .with_id(fields::CHANNEL_ID, channel_id)
                    .with_id(fields::USER_ID, bot.bot_user_id),
            );
            info!(bot_id = %bot.id, channel_id = %channel_id, "Bot left channel");
        }
        Ok(())
    }

    /// Bots installed in a channel.
    pub fn channel_bots(&self, channel_id: ChannelId) -> Vec<Bot> {
        self.repo
            .get_channel_bot_ids(channel_id)
            .into_iter()
            .filter_map(|id| self.repo.get_bot(id).ok())
            .collect()
    }

    fn owned(&self, actor: &User, id: Uuid) -> Result<Bot> {
        let bot = self.repo.get_bot(id)?;
        if bot.creator_id != actor.id && !actor.is_admin() {
            return Err(BotError::Forbidden("not the bot's creator".into()));
        }
        Ok(bot)
    }

    fn set_state(&self, id: Uuid, state: BotState) -> Result<Bot> {
        let bot = self.repo.modify_bot(id, &mut |bot: &mut Bot| {
            bot.state = state;
            bot.consecutive_failures = 0;
            bot.updated_at = Timestamp::now();
        })?;
        info!(bot_id = %id, state = %state, "Bot state changed");
        Ok(bot)
    }
}

fn bot_scopes() -> AccessScopes {
    let mut scopes = AccessScopes::new();
    for scope in BOT_TOKEN_SCOPES {
        scopes.add(AccessScope::new(*scope));
    }
    scopes
}

fn validate_endpoint(endpoint: &str) -> Result<()> {
    match Url::parse(endpoint) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.host().is_some() => Ok(()),
        _ => Err(BotError::InvalidArgument(format!("invalid endpoint: {endpoint}"))),
    }
}

fn ignore_missing(result: traq_repository::Result<()>) -> Result<()> {
    match result {
        Ok(()) => Ok(()),
        Err(RepositoryError::NotFound(what)) => {
            warn!(what = %what, "Token already removed");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::tests::FakeSender;
    use crate::dispatcher::BotConfig;
    use crate::metrics::BotMetrics;
    use crate::sender::SendOutcome;
    use tokio_util::sync::CancellationToken;
    use traq_oauth2::OAuth2Config;
    use traq_repository::MemoryRepository;
    use traq_types::{role, Channel};

    struct Fixture {
        repo: Arc<MemoryRepository>,
        service: BotService,
        oauth2: Arc<OAuth2Service>,
        sender: Arc<FakeSender>,
        hub: Arc<Hub>,
        alice: User,
        admin: User,
    }

    fn fixture() -> Fixture {
        let repo = Arc::new(MemoryRepository::new());
        let hub = Arc::new(Hub::new());
        let oauth2 = Arc::new(OAuth2Service::new(repo.clone(), OAuth2Config::default()));
        let sender = Arc::new(FakeSender::default());
        let engine = BotEngine::start(
            repo.clone(),
            sender.clone(),
            BotConfig::default(),
            BotMetrics::new(),
            CancellationToken::new(),
        );
        let service = BotService::new(repo.clone(), hub.clone(), oauth2.clone(), engine);
        let alice = repo.create_user(User::new("alice", "Alice", String::new())).unwrap();
        let mut admin = User::new("root", "Root", String::new());
        admin.role = role::ADMIN.to_string();
        let admin = repo.create_user(admin).unwrap();
        Fixture {
            repo,
            service,
            oauth2,
            sender,
            hub,
            alice,
            admin,
        }
    }

    fn create(f: &Fixture) -> (Bot, BotTokens) {
        f.service
            .create(
                &f.alice,
                CreateBot {
                    name: "echo".into(),
                    endpoint: "https://bot.example.com/events".into(),
                    ..Default::default()
                },
            )
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_bot() {
        let f = fixture();
        let (bot, tokens) = create(&f);

        assert_eq!(bot.state, BotState::Paused);
        assert_eq!(bot.mode, BotMode::Http);
        let user = f.repo.get_user(bot.bot_user_id).unwrap();
        assert!(user.bot);
        assert_eq!(user.name, "BOT_echo");

        let token = f.oauth2.authenticate(&tokens.access_token).unwrap();
        assert_eq!(token.user_id, user.id);
        assert_eq!(token.scopes.len(), 2);
        assert_eq!(tokens.verification_token.len(), VERIFICATION_TOKEN_LENGTH);
    }

    #[tokio::test]
    async fn test_create_rejects_bad_input() {
        let f = fixture();
        let bad_name = f.service.create(
            &f.alice,
            CreateBot {
                name: "has space".into(),
                endpoint: "https://bot.example.com".into(),
                ..Default::default()
            },
        );
        assert!(matches!(bad_name, Err(BotError::InvalidArgument(_))));

        let bad_endpoint = f.service.create(
            &f.alice,
            CreateBot {
                name: "ok".into(),
                endpoint: "ftp://bot.example.com".into(),
                ..Default::default()
            },
        );
        assert!(matches!(bad_endpoint, Err(BotError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_set_events_rejects_unknown_names() {
        let f = fixture();
        let (bot, _) = create(&f);

        let updated = f
            .service
            .set_events(&f.alice, bot.id, &["MESSAGE_CREATED".into(), "PING".into()])
            .unwrap();
        assert!(updated.subscribe_events.contains(&BotEventType::MessageCreated));

        let err = f
            .service
            .set_events(&f.alice, bot.id, &["NOT_AN_EVENT".into()])
            .unwrap_err();
        assert!(matches!(err, BotError::InvalidArgument(_)));
        assert_eq!(f.repo.get_bot(bot.id).unwrap().subscribe_events.len(), 2);
    }

    #[tokio::test]
    async fn test_only_creator_or_admin_manages_bot() {
        let f = fixture();
        let (bot, _) = create(&f);
        let mallory = f
            .repo
            .create_user(User::new("mallory", "Mallory", String::new()))
            .unwrap();

        assert!(matches!(
            f.service.delete(&mallory, bot.id),
            Err(BotError::Forbidden(_))
        ));
        assert!(matches!(
            f.service.update(
                &f.alice,
                bot.id,
                UpdateBot {
                    privileged: Some(true),
                    ..Default::default()
                }
            ),
            Err(BotError::Forbidden(_))
        ));
        let updated = f
            .service
            .update(
                &f.admin,
                bot.id,
                UpdateBot {
                    privileged: Some(true),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(updated.privileged);
    }

    #[tokio::test]
    async fn test_activation_requires_ping() {
        let f = fixture();
        let (bot, _) = create(&f);

        f.sender.script.lock().push_back(SendOutcome::status(200));
        let err = f
            .service
            .change_state(&f.alice, bot.id, BotState::Active)
            .await
            .unwrap_err();
        assert!(matches!(err, BotError::PingFailed(_)));
        assert_eq!(f.repo.get_bot(bot.id).unwrap().state, BotState::Paused);

        let active = f
            .service
            .change_state(&f.alice, bot.id, BotState::Active)
            .await
            .unwrap();
        assert_eq!(active.state, BotState::Active);

        assert!(matches!(
            f.service
                .change_state(&f.alice, bot.id, BotState::Disabled)
                .await,
            Err(BotError::Forbidden(_))
        ));
        let disabled = f
            .service
            .change_state(&f.admin, bot.id, BotState::Disabled)
            .await
            .unwrap();
        assert_eq!(disabled.state, BotState::Disabled);
    }

    #[tokio::test]
    async fn test_reissue_invalidates_old_token() {
        let f = fixture();
        let (bot, old) = create(&f);

        let new = f.service.reissue(&f.alice, bot.id).unwrap();
        assert_ne!(new.access_token, old.access_token);
        assert_ne!(new.bot_code, old.bot_code);
        assert!(f.oauth2.authenticate(&old.access_token).is_err());
        assert!(f.oauth2.authenticate(&new.access_token).is_ok());
        assert_eq!(f.service.tokens(&f.alice, bot.id).unwrap().bot_code, new.bot_code);
    }

    #[tokio::test]
    async fn test_join_and_leave_channel() {
        let f = fixture();
        let (bot, tokens) = create(&f);
        let channel = f
            .repo
            .create_channel(Channel::new("general", None, true, f.alice.id), &[])
            .unwrap();
        let mut sub = f.hub.subscribe(8, &[Topic::BotJoined, Topic::BotLeft]).unwrap();

        f.service
            .join_channel(&f.alice, channel.id, &tokens.bot_code)
            .unwrap();
        assert_eq!(f.service.channel_bots(channel.id).len(), 1);
        let joined = sub.recv().await.unwrap();
        assert_eq!(joined.topic, Topic::BotJoined);
        assert_eq!(joined.id(fields::BOT_ID), Some(bot.id));

        assert!(matches!(
            f.service.join_channel(&f.alice, channel.id, "wrong"),
            Err(BotError::InvalidArgument(_))
        ));

        f.service.leave_channel(&f.alice, channel.id, bot.id).unwrap();
        assert!(f.service.channel_bots(channel.id).is_empty());
        assert_eq!(sub.recv().await.unwrap().topic, Topic::BotLeft);
    }

    #[tokio::test]
    async fn test_delete_deactivates_bot_user() {
        let f = fixture();
        let (bot, tokens) = create(&f);

        f.service.delete(&f.alice, bot.id).unwrap();
        assert!(f.repo.get_bot(bot.id).is_err());
        assert_eq!(
            f.repo.get_user(bot.bot_user_id).unwrap().status,
            UserStatus::Deactivated
        );
        assert!(f.oauth2.authenticate(&tokens.access_token).is_err());
    }
}
