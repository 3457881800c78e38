//! Webhook registration and intake.

use crate::error::WebhookError;
use crate::github::TemplateSet;
use crate::signature;
use crate::Result;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};
use traq_message::{MessageService, Producer};
use traq_repository::{ChannelRepository, Repository, UserRepository, WebhookRepository};
use traq_types::{ChannelId, Message, Timestamp, User, UserStatus, Webhook};
use url::form_urlencoded;
use uuid::Uuid;

/// Header overriding the destination channel of a post.
pub const CHANNEL_ID_HEADER: &str = "X-Channel-Id";
/// Header carrying the hex HMAC-SHA1 of the body.
pub const SIGNATURE_HEADER: &str = "X-Signature";
/// GitHub's signature header.
pub const GITHUB_SIGNATURE_HEADER: &str = "X-Hub-Signature";

const MAX_NAME_LENGTH: usize = 32;
const MAX_DESCRIPTION_LENGTH: usize = 1000;
const MAX_SECRET_LENGTH: usize = 50;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateWebhook {
    pub name: String,
    pub description: String,
    pub channel_id: Uuid,
    pub secret: String,
}

/// Body of an incoming post.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct PostBody {
    text: String,
    channel_id: Option<String>,
}

/// An incoming request, stripped of its transport.
#[derive(Debug, Clone, Copy, Default)]
pub struct Incoming<'a> {
    pub content_type: Option<&'a str>,
    pub signature: Option<&'a str>,
    pub channel_id: Option<&'a str>,
    pub body: &'a [u8],
}

pub struct WebhookService {
    repo: Arc<dyn Repository>,
    messages: MessageService,
    templates: Arc<TemplateSet>,
}

impl WebhookService {
    pub fn new(repo: Arc<dyn Repository>, messages: MessageService, templates: Arc<TemplateSet>) -> Self {
        Self {
            repo,
            messages,
            templates,
        }
    }

    /// Register a webhook posting to a public channel. A dedicated bot user
    /// authors its messages.
    pub fn create(&self, creator: &User, req: CreateWebhook) -> Result<Webhook> {
        let name_length = req.name.chars().count();
        if name_length == 0 || name_length > MAX_NAME_LENGTH {
            return Err(WebhookError::InvalidArgument("name must be 1-32 characters".into()));
        }
        if req.description.chars().count() > MAX_DESCRIPTION_LENGTH {
            return Err(WebhookError::InvalidArgument("description is too long".into()));
        }
        if req.secret.chars().count() > MAX_SECRET_LENGTH {
            return Err(WebhookError::InvalidArgument("secret is too long".into()));
        }
        let channel = self
            .repo
            .get_channel(req.channel_id)
            .map_err(|_| WebhookError::InvalidArgument("invalid channel".into()))?;
        if !channel.is_public || channel.is_dm() {
            return Err(WebhookError::InvalidArgument("webhooks must post to a public channel".into()));
        }

        let user_name = format!("Webhook_{}", &Uuid::new_v4().simple().to_string()[..16]);
        let user = self.repo.create_user(User::new_bot(user_name, req.name.clone()))?;
        let now = Timestamp::now();
        let webhook = self.repo.create_webhook(Webhook {
            id: Uuid::new_v4(),
            bot_user_id: user.id,
            name: req.name,
            description: req.description,
            channel_id: channel.id,
            secret: req.secret,
            creator_id: creator.id,
            created_at: now,
            updated_at: now,
        })?;
        info!(webhook_id = %webhook.id, channel_id = %channel.id, "Webhook created");
        Ok(webhook)
    }

    pub fn get(&self, id: Uuid) -> Result<Webhook> {
        Ok(self.repo.get_webhook(id)?)
    }

    /// Webhooks the actor manages; administrators see all of them.
    pub fn list(&self, actor: &User) -> Vec<Webhook> {
        let creator = (!actor.is_admin()).then_some(actor.id);
        self.repo.list_webhooks(creator)
    }

    pub fn delete(&self, actor: &User, id: Uuid) -> Result<()> {
        let webhook = self.repo.get_webhook(id)?;
        if webhook.creator_id != actor.id && !actor.is_admin() {
            return Err(WebhookError::Forbidden("not the webhook's creator".into()));
        }
        self.repo.delete_webhook(id)?;
        self.repo
            .update_user_status(webhook.bot_user_id, UserStatus::Deactivated)?;
        info!(webhook_id = %id, "Webhook deleted");
        Ok(())
    }

    /// Post the body of an incoming request as a message.
    ///
    /// `text/plain` bodies are posted verbatim; JSON and form bodies carry
    /// `text` and an optional `channelId`. The `X-Channel-Id` header wins
    /// over the body, and the bound channel is used when neither is given.
    pub fn post(&self, id: Uuid, incoming: Incoming<'_>) -> Result<Message> {
        let webhook = self.active_webhook(id)?;
        if webhook.requires_signature() {
            signature::verify(&webhook.secret, incoming.body, incoming.signature)?;
        }

        let (text, body_channel) = match media_type(incoming.content_type).as_str() {
            "text/plain" => (
                String::from_utf8(incoming.body.to_vec())
                    .map_err(|_| WebhookError::InvalidArgument("body is not UTF-8".into()))?,
                None,
            ),
            "application/json" => {
                let body: PostBody = serde_json::from_slice(incoming.body)?;
                (body.text, body.channel_id)
            }
            "application/x-www-form-urlencoded" => {
                let mut body = PostBody::default();
                for (key, value) in form_urlencoded::parse(incoming.body) {
                    match key.as_ref() {
                        "text" => body.text = value.into_owned(),
                        "channelId" => body.channel_id = Some(value.into_owned()),
                        _ => {}
                    }
                }
                (body.text, body.channel_id)
            }
            other => return Err(WebhookError::UnsupportedMediaType(other.to_string())),
        };
        if text.is_empty() {
            return Err(WebhookError::InvalidArgument("empty body".into()));
        }

        let requested = incoming
            .channel_id
            .map(str::to_string)
            .or(body_channel)
            .filter(|s| !s.is_empty());
        let channel_id = match requested {
            Some(raw) => Some(
                Uuid::parse_str(raw.trim())
                    .map_err(|_| WebhookError::InvalidArgument(format!("invalid {CHANNEL_ID_HEADER} header")))?,
            ),
            None => None,
        };
        self.deliver(&webhook, channel_id, &text)
    }

    /// Render a GitHub delivery through the template set. Events without a
    /// template are accepted and produce no message.
    pub fn post_github(&self, id: Uuid, event: Option<&str>, incoming: Incoming<'_>) -> Result<Option<Message>> {
        let webhook = self.active_webhook(id)?;
        if webhook.requires_signature() {
            signature::verify(&webhook.secret, incoming.body, incoming.signature)?;
        }
        let media = media_type(incoming.content_type);
        if media != "application/json" {
            return Err(WebhookError::UnsupportedMediaType(media));
        }
        let event = event
            .filter(|e| !e.is_empty())
            .ok_or_else(|| WebhookError::InvalidArgument("missing X-GitHub-Event header".into()))?;

        if !self.templates.knows(event) {
            debug!(webhook_id = %id, event, "Ignoring unsupported GitHub event");
            return Ok(None);
        }
        let payload: serde_json::Value = serde_json::from_slice(incoming.body)?;
        match self.templates.render(event, &payload) {
            Some(text) => self.deliver(&webhook, None, &text).map(Some),
            None => Ok(None),
        }
    }

    fn active_webhook(&self, id: Uuid) -> Result<Webhook> {
        let webhook = self.repo.get_webhook(id)?;
        let user = self.repo.get_user(webhook.bot_user_id)?;
        if !user.is_active() {
            return Err(WebhookError::Forbidden("webhook is disabled".into()));
        }
        Ok(webhook)
    }

    fn deliver(&self, webhook: &Webhook, channel_id: Option<ChannelId>, text: &str) -> Result<Message> {
        let target = channel_id.unwrap_or(webhook.channel_id);
        if !self.repo.is_channel_accessible(webhook.bot_user_id, target) {
            return Err(WebhookError::InvalidArgument("invalid channel".into()));
        }
        let message = Producer::Webhook(webhook.clone()).deliver_message(&self.messages, Some(target), text)?;
        info!(webhook_id = %webhook.id, message_id = %message.id, channel_id = %target, "Webhook message posted");
        Ok(message)
    }
}

/// Lower-cased media type without parameters.
fn media_type(content_type: Option<&str>) -> String {
    content_type
        .unwrap_or_default()
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}
