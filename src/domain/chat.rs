use serde::{Deserialize, Serialize};

/// Kind of conversation a summary refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ChatKind {
    /// Private 1-to-1 conversation with a user; the chat id is the peer's id.
    #[default]
    Direct,
    /// Group conversation; the chat id is the group's id.
    Group,
}

/// Content kind of a message, matching the server's numeric wire codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MessageKind {
    #[default]
    Text,
    Image,
    Voice,
}

impl MessageKind {
    /// Maps a server wire code to a message kind, or None for unknown codes.
    pub fn from_wire(code: u8) -> Option<Self> {
        match code {
            1 => Some(MessageKind::Text),
            2 => Some(MessageKind::Image),
            3 => Some(MessageKind::Voice),
            _ => None,
        }
    }
}

/// Snapshot of the most recent message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastMessage {
    pub id: String,
    pub sender_id: String,
    pub body: String,
    pub kind: MessageKind,
    pub created_at_ms: i64,
}

/// One entry of the per-account conversation list.
///
/// `last_activity_ms` drives the descending sort order of the list. It equals
/// `last_message.created_at_ms` when a message is known, otherwise the instant
/// the conversation was opened locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSummary {
    pub chat_id: String,
    pub chat_kind: ChatKind,
    /// Cached display name; refreshed lazily by the UI, never by this core.
    pub display_name: Option<String>,
    pub last_message: Option<LastMessage>,
    pub last_activity_ms: i64,
    /// True when the last known message was authored by someone else and the
    /// conversation has not been opened since it arrived.
    pub unread: bool,
}
