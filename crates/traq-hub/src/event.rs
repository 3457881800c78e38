//! Hub events and their typed payload fields.

use crate::topic::Topic;
use std::collections::HashMap;
use traq_types::{Channel, Message, ParseResult, Stamp, Timestamp, User};
use uuid::Uuid;

/// Well-known payload field names.
pub mod fields {
    pub const MESSAGE: &str = "message";
    pub const MESSAGE_ID: &str = "message_id";
    pub const PARSE_RESULT: &str = "parse_result";
    pub const CHANNEL: &str = "channel";
    pub const CHANNEL_ID: &str = "channel_id";
    pub const USER: &str = "user";
    pub const USER_ID: &str = "user_id";
    pub const USER_IDS: &str = "user_ids";
    pub const STAMP: &str = "stamp";
    pub const STAMP_ID: &str = "stamp_id";
    pub const COUNT: &str = "count";
    pub const TAG_ID: &str = "tag_id";
    pub const GROUP_ID: &str = "group_id";
    pub const FOLDER_ID: &str = "folder_id";
    pub const PIN_ID: &str = "pin_id";
    pub const BOT_ID: &str = "bot_id";
    pub const IS_PUBLIC: &str = "is_public";
    pub const MEMBERS: &str = "members";
    pub const TOPIC: &str = "topic";
    pub const STATES: &str = "states";
    pub const VIEWERS: &str = "viewers";
    pub const DELETED_IDS: &str = "deleted_ids";
    pub const TIME: &str = "time";
}

/// A viewer row carried by `channel.viewers.changed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Viewer {
    pub user_id: Uuid,
    pub status: String,
    pub updated_at: Timestamp,
}

/// A typed payload value.
#[derive(Debug, Clone)]
pub enum Field {
    Id(Uuid),
    Ids(Vec<Uuid>),
    Bool(bool),
    Int(i64),
    Text(String),
    Texts(Vec<String>),
    Time(Timestamp),
    Message(Box<Message>),
    ParseResult(Box<ParseResult>),
    Channel(Box<Channel>),
    User(Box<User>),
    Stamp(Box<Stamp>),
    Viewers(Vec<Viewer>),
}

/// A publication: a topic plus named fields.
#[derive(Debug, Clone)]
pub struct Event {
    pub topic: Topic,
    pub fields: HashMap<&'static str, Field>,
}

impl Event {
    pub fn new(topic: Topic) -> Self {
        Self {
            topic,
            fields: HashMap::new(),
        }
    }

    /// Builder-style field insertion.
    pub fn with(mut self, name: &'static str, field: Field) -> Self {
        self.fields.insert(name, field);
        self
    }

    pub fn with_id(self, name: &'static str, id: Uuid) -> Self {
        self.with(name, Field::Id(id))
    }

    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    pub fn id(&self, name: &str) -> Option<Uuid> {
        match self.fields.get(name) {
            Some(Field::Id(id)) => Some(*id),
            _ => None,
        }
    }

    pub fn ids(&self, name: &str) -> Option<&[Uuid]> {
        match self.fields.get(name) {
            Some(Field::Ids(ids)) => Some(ids),
            _ => None,
        }
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        match self.fields.get(name) {
            Some(Field::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        match self.fields.get(name) {
            Some(Field::Int(i)) => Some(*i),
            _ => None,
        }
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        match self.fields.get(name) {
            Some(Field::Text(s)) => Some(s),
            _ => None,
        }
    }

    pub fn texts(&self, name: &str) -> Option<&[String]> {
        match self.fields.get(name) {
            Some(Field::Texts(v)) => Some(v),
            _ => None,
        }
    }

    pub fn time(&self, name: &str) -> Option<Timestamp> {
        match self.fields.get(name) {
            Some(Field::Time(t)) => Some(*t),
            _ => None,
        }
    }

    pub fn message(&self) -> Option<&Message> {
        match self.fields.get(fields::MESSAGE) {
            Some(Field::Message(m)) => Some(m),
            _ => None,
        }
    }

    pub fn parse_result(&self) -> Option<&ParseResult> {
        match self.fields.get(fields::PARSE_RESULT) {
            Some(Field::ParseResult(p)) => Some(p),
            _ => None,
        }
    }

    pub fn channel(&self) -> Option<&Channel> {
        match self.fields.get(fields::CHANNEL) {
            Some(Field::Channel(c)) => Some(c),
            _ => None,
        }
    }

    pub fn user(&self) -> Option<&User> {
        match self.fields.get(fields::USER) {
            Some(Field::User(u)) => Some(u),
            _ => None,
        }
    }

    pub fn stamp(&self) -> Option<&Stamp> {
        match self.fields.get(fields::STAMP) {
            Some(Field::Stamp(s)) => Some(s),
            _ => None,
        }
    }

    pub fn viewers(&self) -> Option<&[Viewer]> {
        match self.fields.get(fields::VIEWERS) {
            Some(Field::Viewers(v)) => Some(v),
            _ => None,
        }
    }

    /// The channel the event concerns, from either a channel id field, the
    /// carried channel, or the carried message.
    pub fn channel_id(&self) -> Option<Uuid> {
        self.id(fields::CHANNEL_ID)
            .or_else(|| self.channel().map(|c| c.id))
            .or_else(|| self.message().map(|m| m.channel_id))
    }
}
