use nocino_core::Reply;
use serde::Serialize;

// --- Frames sent back to the transport bridge ---
#[derive(Debug, Serialize, Clone)]
#[serde(untagged)]
pub enum OutboundFrame {
    // text_reply / sticker_reply / clip_reply
    Reply(Reply),

    // For problems with a frame the bridge sent (e.g., malformed JSON)
    Status(StatusUpdate),
}

#[derive(Debug, Serialize, Clone)]
#[serde(tag = "type", rename = "status_update")]
pub struct StatusUpdate {
    pub status: String,
    pub details: Option<String>,
}

impl OutboundFrame {
    pub fn status(status: &str, details: Option<String>) -> Self {
        OutboundFrame::Status(StatusUpdate {
            status: status.to_string(),
            details,
        })
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            "{\"type\":\"status_update\",\"status\":\"serialization_error\"}".to_string()
        })
    }
}
