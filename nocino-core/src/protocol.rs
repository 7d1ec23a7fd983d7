use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::selector::ReplyKind;

// --- 1. Inbound Message (from the transport) ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatKind {
    Private,
    #[default]
    Group,
    Supergroup,
    Channel,
}

/// Media attached to a message, as described by the chat service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub file_id: String,
    #[serde(default)]
    pub file_size: u64,
    #[serde(default)]
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub chat_id: i64,
    #[serde(default)]
    pub chat_kind: ChatKind,
    pub message_id: i64,
    pub sender_id: i64,
    #[serde(default)]
    pub sender_username: Option<String>,
    #[serde(default)]
    pub text: String,
    /// Username of the author of the message this one replies to.
    #[serde(default)]
    pub reply_to_username: Option<String>,
    #[serde(default)]
    pub sticker: Option<Attachment>,
    #[serde(default)]
    pub document: Option<Attachment>,
    /// When the transport took the message off the chat service. Defaults to
    /// the moment the frame is decoded.
    #[serde(default = "Utc::now")]
    pub received_at: DateTime<Utc>,
}

impl InboundMessage {
    /// Time elapsed between receipt and `now`. A `received_at` ahead of the
    /// local clock counts as no wait at all.
    pub fn waited(&self, now: DateTime<Utc>) -> Duration {
        (now - self.received_at).to_std().unwrap_or_default()
    }
}

// --- 2. Reply (to the transport) ---

/// Outbound payload, always a reply to the inbound message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum Reply {
    #[serde(rename = "text_reply")]
    Text {
        chat_id: i64,
        reply_to_message_id: i64,
        text: String,
        elapsed_ms: u64,
    },

    /// Upload of a hoarded sticker file.
    #[serde(rename = "sticker_reply")]
    Sticker {
        chat_id: i64,
        reply_to_message_id: i64,
        path: PathBuf,
    },

    /// Upload of a hoarded clip file.
    #[serde(rename = "clip_reply")]
    Clip {
        chat_id: i64,
        reply_to_message_id: i64,
        path: PathBuf,
    },
}

impl Reply {
    pub fn kind(&self) -> ReplyKind {
        match self {
            Reply::Text { .. } => ReplyKind::Text,
            Reply::Sticker { .. } => ReplyKind::Sticker,
            Reply::Clip { .. } => ReplyKind::Clip,
        }
    }

    pub fn chat_id(&self) -> i64 {
        match self {
            Reply::Text { chat_id, .. }
            | Reply::Sticker { chat_id, .. }
            | Reply::Clip { chat_id, .. } => *chat_id,
        }
    }
}
