//! Per-user WebRTC session state.

use crate::error::RealtimeError;
use crate::Result;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use traq_hub::{fields, Event, Field, Hub, Topic};
use traq_types::{ChannelId, UserId};

/// Maximum number of state labels a user may hold at once.
pub const MAX_WEBRTC_STATES: usize = 16;

/// Maximum length of a single state label.
pub const MAX_WEBRTC_STATE_LEN: usize = 64;

/// A user's current WebRTC state in one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebRtcUserState {
    pub user_id: UserId,
    pub channel_id: ChannelId,
    pub states: Vec<String>,
}

/// Tracks which call-related states each user currently advertises.
pub struct WebRtcManager {
    states: RwLock<HashMap<UserId, WebRtcUserState>>,
    hub: Arc<Hub>,
}

impl WebRtcManager {
    pub fn new(hub: Arc<Hub>) -> Self {
        Self {
            states: RwLock::new(HashMap::new()),
            hub,
        }
    }

    /// Replace a user's state set. An empty set clears the user's entry.
    pub fn set_state(&self, user_id: UserId, channel_id: ChannelId, states: Vec<String>) -> Result<()> {
        if states.len() > MAX_WEBRTC_STATES {
            return Err(RealtimeError::InvalidState(format!(
                "at most {} states are allowed",
                MAX_WEBRTC_STATES
            )));
        }
        let mut deduped: Vec<String> = Vec::with_capacity(states.len());
        for state in states {
            if state.is_empty() || state.len() > MAX_WEBRTC_STATE_LEN {
                return Err(RealtimeError::InvalidState(state));
            }
            if !deduped.contains(&state) {
                deduped.push(state);
            }
        }

        {
            let mut map = self.states.write();
            if deduped.is_empty() {
                map.remove(&user_id);
            } else {
                map.insert(
                    user_id,
                    WebRtcUserState {
                        user_id,
                        channel_id,
                        states: deduped.clone(),
                    },
                );
            }
        }
        self.publish(user_id, channel_id, deduped);
        Ok(())
    }

    pub fn get_state(&self, user_id: UserId) -> Option<WebRtcUserState> {
        self.states.read().get(&user_id).cloned()
    }

    pub fn all(&self) -> Vec<WebRtcUserState> {
        self.states.read().values().cloned().collect()
    }

    /// Drop a user's state, typically after their last connection closes.
    pub fn reset_user(&self, user_id: UserId) {
        let removed = self.states.write().remove(&user_id);
        if let Some(state) = removed {
            debug!(user_id = %user_id, "WebRTC state reset");
            self.publish(user_id, state.channel_id, Vec::new());
        }
    }

    fn publish(&self, user_id: UserId, channel_id: ChannelId, states: Vec<String>) {
        self.hub.publish(
            Event::new(Topic::UserWebRtcStateChanged)
                .with_id(fields::USER_ID, user_id)
                .with_id(fields::CHANNEL_ID, channel_id)
                .with(fields::STATES, Field::Texts(states)),
        );
    }
}
