//! Mapping of hub topics onto SSE event types and routing strategies.

use crate::error::NotificationError;
use crate::Result;
use serde_json::{json, Value};
use traq_hub::{fields, Event, Topic};
use uuid::Uuid;

/// How an event reaches SSE clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Every connected client.
    Broadcast,
    /// The clients of the users named by the event.
    UserMulticast,
    /// Clients whose heartbeat places them on the event's channel.
    ChannelViewerMulticast,
    /// Broadcast for public channels, channel members otherwise.
    ChannelScoped,
    /// Computed by the recipient router.
    MessageRecipients,
}

/// Where and under what name a topic is streamed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub event_type: &'static str,
    pub strategy: Strategy,
}

const fn route(event_type: &'static str, strategy: Strategy) -> Option<Route> {
    Some(Route { event_type, strategy })
}

/// The SSE route of a topic. Topics that only concern bots have none.
pub fn route_for(topic: Topic) -> Option<Route> {
    use Strategy::*;
    match topic {
        Topic::MessageCreated => route("MESSAGE_CREATED", MessageRecipients),
        Topic::MessageUpdated => route("MESSAGE_UPDATED", ChannelViewerMulticast),
        Topic::MessageDeleted => route("MESSAGE_DELETED", ChannelViewerMulticast),
        Topic::MessagePinned => route("MESSAGE_PINNED", ChannelViewerMulticast),
        Topic::MessageUnpinned => route("MESSAGE_UNPINNED", ChannelViewerMulticast),
        Topic::MessageStamped => route("MESSAGE_STAMPED", ChannelViewerMulticast),
        Topic::MessageUnstamped => route("MESSAGE_UNSTAMPED", ChannelViewerMulticast),

        Topic::ChannelCreated => route("CHANNEL_CREATED", ChannelScoped),
        Topic::ChannelUpdated => route("CHANNEL_UPDATED", ChannelScoped),
        Topic::ChannelDeleted => route("CHANNEL_DELETED", ChannelScoped),
        Topic::ChannelStared => route("CHANNEL_STARED", UserMulticast),
        Topic::ChannelUnstared => route("CHANNEL_UNSTARED", UserMulticast),
        Topic::ChannelMuted => route("CHANNEL_MUTED", UserMulticast),
        Topic::ChannelUnmuted => route("CHANNEL_UNMUTED", UserMulticast),
        Topic::ChannelRead => route("MESSAGE_READ", UserMulticast),
        Topic::ChannelViewersChanged => route("CHANNEL_VIEWERS_CHANGED", ChannelViewerMulticast),

        Topic::UserJoined => route("USER_JOINED", Broadcast),
        Topic::UserUpdated => route("USER_UPDATED", Broadcast),
        Topic::UserIconUpdated => route("USER_ICON_UPDATED", Broadcast),
        Topic::UserOnline => route("USER_ONLINE", Broadcast),
        Topic::UserOffline => route("USER_OFFLINE", Broadcast),
        Topic::UserTagAdded | Topic::UserTagRemoved => route("USER_TAGS_UPDATED", Broadcast),
        Topic::UserGroupCreated => route("USER_GROUP_CREATED", Broadcast),
        Topic::UserGroupUpdated => route("USER_GROUP_UPDATED", Broadcast),
        Topic::UserGroupDeleted => route("USER_GROUP_DELETED", Broadcast),
        Topic::UserWebRtcStateChanged => route("USER_WEBRTC_STATE_CHANGED", Broadcast),

        Topic::StampCreated => route("STAMP_CREATED", Broadcast),
        Topic::StampUpdated => route("STAMP_UPDATED", Broadcast),
        Topic::StampDeleted => route("STAMP_DELETED", Broadcast),

        Topic::ClipFolderCreated => route("CLIP_FOLDER_CREATED", UserMulticast),
        Topic::ClipFolderDeleted => route("CLIP_FOLDER_DELETED", UserMulticast),
        Topic::ClipFolderMessageAdded => route("CLIP_FOLDER_MESSAGE_ADDED", UserMulticast),
        Topic::ClipFolderMessageRemoved => route("CLIP_FOLDER_MESSAGE_DELETED", UserMulticast),

        Topic::ChannelTopicUpdated | Topic::BotJoined | Topic::BotLeft => None,
    }
}

fn require(event: &Event, name: &'static str) -> Result<Uuid> {
    event.id(name).ok_or(NotificationError::MissingField {
        topic: event.topic.as_str(),
        field: name,
    })
}

fn message_id(event: &Event) -> Result<Uuid> {
    event
        .id(fields::MESSAGE_ID)
        .or_else(|| event.message().map(|m| m.id))
        .ok_or(NotificationError::MissingField {
            topic: event.topic.as_str(),
            field: fields::MESSAGE_ID,
        })
}

/// The JSON body of the SSE frame for an event.
pub fn payload(event: &Event) -> Result<Value> {
    let value = match event.topic {
        Topic::MessageCreated | Topic::MessageUpdated | Topic::MessageDeleted => {
            json!({ "id": message_id(event)? })
        }
        Topic::MessagePinned | Topic::MessageUnpinned => json!({
            "message_id": message_id(event)?,
            "channel_id": require(event, fields::CHANNEL_ID)?,
        }),
        Topic::MessageStamped => json!({
            "message_id": message_id(event)?,
            "user_id": require(event, fields::USER_ID)?,
            "stamp_id": require(event, fields::STAMP_ID)?,
            "count": event.int(fields::COUNT).unwrap_or(1),
            "created_at": event.time(fields::TIME).map(|t| t.to_rfc3339()),
        }),
        Topic::MessageUnstamped => json!({
            "message_id": message_id(event)?,
            "user_id": require(event, fields::USER_ID)?,
            "stamp_id": require(event, fields::STAMP_ID)?,
        }),
        Topic::ChannelViewersChanged => {
            let viewers: Vec<Value> = event
                .viewers()
                .unwrap_or_default()
                .iter()
                .map(|v| {
                    json!({
                        "userId": v.user_id,
                        "state": v.status,
                        "updatedAt": v.updated_at.to_rfc3339(),
                    })
                })
                .collect();
            json!({ "id": require(event, fields::CHANNEL_ID)?, "viewers": viewers })
        }
        Topic::ChannelCreated
        | Topic::ChannelUpdated
        | Topic::ChannelDeleted
        | Topic::ChannelStared
        | Topic::ChannelUnstared
        | Topic::ChannelMuted
        | Topic::ChannelUnmuted
        | Topic::ChannelRead
        | Topic::ChannelTopicUpdated => json!({ "id": require(event, fields::CHANNEL_ID)? }),
        Topic::UserJoined
        | Topic::UserUpdated
        | Topic::UserIconUpdated
        | Topic::UserOnline
        | Topic::UserOffline
        | Topic::UserTagAdded
        | Topic::UserTagRemoved => json!({ "id": require(event, fields::USER_ID)? }),
        Topic::UserGroupCreated | Topic::UserGroupUpdated | Topic::UserGroupDeleted => {
            json!({ "id": require(event, fields::GROUP_ID)? })
        }
        Topic::UserWebRtcStateChanged => json!({
            "user_id": require(event, fields::USER_ID)?,
            "channel_id": require(event, fields::CHANNEL_ID)?,
            "states": event.texts(fields::STATES).unwrap_or_default(),
        }),
        Topic::StampCreated | Topic::StampUpdated | Topic::StampDeleted => {
            json!({ "id": require(event, fields::STAMP_ID)? })
        }
        Topic::ClipFolderCreated | Topic::ClipFolderDeleted => {
            json!({ "id": require(event, fields::FOLDER_ID)? })
        }
        Topic::ClipFolderMessageAdded | Topic::ClipFolderMessageRemoved => json!({
            "folder_id": require(event, fields::FOLDER_ID)?,
            "message_id": require(event, fields::MESSAGE_ID)?,
        }),
        Topic::BotJoined | Topic::BotLeft => json!({
            "id": require(event, fields::BOT_ID)?,
            "channel_id": require(event, fields::CHANNEL_ID)?,
        }),
    };
    Ok(value)
}
