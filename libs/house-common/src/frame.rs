//! Chat frames exchanged over the realtime socket.

use serde::{Deserialize, Serialize};

use crate::{unix_now, UserId};

/// Sender id used for frames originated by the server itself.
pub const SYSTEM_SENDER: UserId = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameKind {
    Chat,
    Receipt,
    Notification,
}

/// A frame as it is written to a client.
///
/// `sender_id` and `timestamp` are always filled in by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatFrame {
    #[serde(rename = "type")]
    pub kind: FrameKind,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub content: String,
    pub timestamp: i64,
}

impl ChatFrame {
    pub fn chat(sender_id: UserId, receiver_id: UserId, content: impl Into<String>) -> Self {
        Self {
            kind: FrameKind::Chat,
            sender_id,
            receiver_id,
            content: content.into(),
            timestamp: unix_now(),
        }
    }

    /// Delivery receipt echoed back to the sender of `frame`.
    pub fn receipt(frame: &ChatFrame) -> Self {
        Self {
            kind: FrameKind::Receipt,
            ..frame.clone()
        }
    }

    pub fn notification(receiver_id: UserId, content: impl Into<String>) -> Self {
        Self {
            kind: FrameKind::Notification,
            sender_id: SYSTEM_SENDER,
            receiver_id,
            content: content.into(),
            timestamp: unix_now(),
        }
    }
}

/// A frame as it arrives from a client.
///
/// Only the addressee and the body are taken from the client. Any `type`,
/// `sender_id` or `timestamp` in the payload is accepted and ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundFrame {
    pub receiver_id: UserId,
    pub content: String,
}

impl InboundFrame {
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Turn the client payload into a chat frame from `sender_id`, stamped now.
    pub fn stamp(self, sender_id: UserId) -> ChatFrame {
        ChatFrame::chat(sender_id, self.receiver_id, self.content)
    }
}
