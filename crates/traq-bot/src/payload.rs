//! JSON bodies POSTed to bots.
//!
//! Every body carries `eventTime`; the remaining keys depend on the event.

use serde::Serialize;
use serde_json::{json, Map, Value};
use traq_repository::{ChannelRepository, Repository, StampRepository, UserRepository};
use traq_types::{Channel, Message, MessageStamp, ParseResult, Stamp, Tag, Timestamp, User, UserGroup};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPayload {
    pub id: Uuid,
    pub name: String,
    pub display_name: String,
    pub icon_id: Option<Uuid>,
    pub bot: bool,
}

impl From<&User> for UserPayload {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            display_name: user.display_name.clone(),
            icon_id: user.icon_file_id,
            bot: user.bot,
        }
    }
}

/// An embedded reference found in a message body.
#[derive(Debug, Clone, Serialize)]
pub struct EmbeddedPayload {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub id: Uuid,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    pub id: Uuid,
    pub user: Option<UserPayload>,
    pub channel_id: Uuid,
    pub text: String,
    pub plain_text: String,
    pub embedded: Vec<EmbeddedPayload>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelPayload {
    pub id: Uuid,
    pub name: String,
    /// `#parent/child` form.
    pub path: String,
    pub parent_id: Option<Uuid>,
    pub creator: Option<UserPayload>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StampPayload {
    pub stamp_id: Uuid,
    pub user_id: Uuid,
    pub stamp_name: String,
    pub count: u32,
    pub created_at: String,
    pub updated_at: String,
}

fn user_payload(repo: &dyn Repository, id: Uuid) -> Option<UserPayload> {
    repo.get_user(id).ok().as_ref().map(UserPayload::from)
}

pub fn message(repo: &dyn Repository, message: &Message, parsed: &ParseResult) -> MessagePayload {
    let embedded = parsed
        .mentions
        .iter()
        .map(|id| ("user", id))
        .chain(parsed.group_mentions.iter().map(|id| ("group", id)))
        .chain(parsed.tag_mentions.iter().map(|id| ("tag", id)))
        .chain(parsed.channel_links.iter().map(|id| ("channel", id)))
        .chain(parsed.citations.iter().map(|id| ("message", id)))
        .chain(parsed.attachments.iter().map(|id| ("file", id)))
        .map(|(kind, id)| EmbeddedPayload { kind, id: *id })
        .collect();
    MessagePayload {
        id: message.id,
        user: user_payload(repo, message.user_id),
        channel_id: message.channel_id,
        text: message.text.clone(),
        plain_text: parsed.plain_text.clone(),
        embedded,
        created_at: message.created_at.to_rfc3339(),
        updated_at: message.updated_at.to_rfc3339(),
    }
}

/// Slash-joined names from the root down to `channel`.
pub fn channel_path(repo: &dyn Repository, channel: &Channel) -> String {
    let mut names = vec![channel.name.clone()];
    let mut parent = channel.parent_id;
    while let Some(id) = parent {
        match repo.get_channel(id) {
            Ok(p) if names.len() < traq_types::MAX_CHANNEL_DEPTH => {
                names.push(p.name);
                parent = p.parent_id;
            }
            _ => break,
        }
    }
    names.reverse();
    format!("#{}", names.join("/"))
}

pub fn channel(repo: &dyn Repository, channel: &Channel) -> ChannelPayload {
    ChannelPayload {
        id: channel.id,
        name: channel.name.clone(),
        path: channel_path(repo, channel),
        parent_id: channel.parent_id,
        creator: user_payload(repo, channel.creator_id),
        created_at: channel.created_at.to_rfc3339(),
        updated_at: channel.updated_at.to_rfc3339(),
    }
}

pub fn stamps(repo: &dyn Repository, stamps: &[MessageStamp]) -> Vec<StampPayload> {
    stamps
        .iter()
        .map(|s| StampPayload {
            stamp_id: s.stamp_id,
            user_id: s.user_id,
            stamp_name: repo.get_stamp(s.stamp_id).map(|st| st.name).unwrap_or_default(),
            count: s.count,
            created_at: s.created_at.to_rfc3339(),
            updated_at: s.updated_at.to_rfc3339(),
        })
        .collect()
}

pub fn stamp_created(repo: &dyn Repository, stamp: &Stamp) -> Value {
    json!({
        "id": stamp.id,
        "name": stamp.name,
        "fileId": stamp.file_id,
        "creator": user_payload(repo, stamp.creator_id),
    })
}

pub fn tag(tag: &Tag) -> Value {
    json!({ "tagId": tag.id, "tag": tag.name })
}

pub fn group(group: &UserGroup) -> Value {
    json!({
        "id": group.id,
        "name": group.name,
        "description": group.description,
        "adminId": group.admin_id,
        "members": group.members,
        "createdAt": group.created_at.to_rfc3339(),
    })
}

/// Wrap an event body with `eventTime`. Non-object bodies are ignored.
pub fn envelope(event_time: Timestamp, body: Value) -> Value {
    let mut map = Map::new();
    map.insert("eventTime".into(), Value::String(event_time.to_rfc3339()));
    if let Value::Object(fields) = body {
        map.extend(fields);
    }
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use traq_repository::MemoryRepository;

    #[test]
    fn test_envelope_adds_event_time() {
        let value = envelope(Timestamp::from_millis(0), json!({ "channelId": "x" }));
        assert_eq!(value["eventTime"], "1970-01-01T00:00:00.000Z");
        assert_eq!(value["channelId"], "x");
    }

    #[test]
    fn test_channel_path() {
        let repo: Arc<dyn Repository> = Arc::new(MemoryRepository::new());
        let owner = repo.create_user(User::new("alice", "Alice", String::new())).unwrap();
        let root = repo
            .create_channel(Channel::new("general", None, true, owner.id), &[])
            .unwrap();
        let child = repo
            .create_channel(Channel::new("random", Some(root.id), true, owner.id), &[])
            .unwrap();
        assert_eq!(channel_path(repo.as_ref(), &child), "#general/random");

        let payload = channel(repo.as_ref(), &child);
        assert_eq!(payload.parent_id, Some(root.id));
        assert_eq!(payload.creator.unwrap().name, "alice");
    }
}
