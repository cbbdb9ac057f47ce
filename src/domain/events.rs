use crate::domain::chat::{ChatKind, LastMessage};

/// Normalized message event: the single fold input shared by the snapshot
/// sweep and the realtime adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageEvent {
    pub chat_id: String,
    pub chat_kind: ChatKind,
    pub message: LastMessage,
}

impl MessageEvent {
    pub fn new(chat_id: impl Into<String>, chat_kind: ChatKind, message: LastMessage) -> Self {
        Self {
            chat_id: chat_id.into(),
            chat_kind,
            message,
        }
    }
}
