use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::store::{Message, MessageKind};

/// Events a client sends over the socket. The `type` tag and field casing
/// match what the browser client emits.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    Join {
        room_id: String,
        display_name: String,
    },
    SendMessage {
        body: String,
        #[serde(default)]
        kind: MessageKind,
    },
    Typing {
        is_typing: bool,
    },
    MarkSeen {
        message_id: Uuid,
    },
}

/// Events the server pushes to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    RoomSnapshot {
        messages: Vec<Message>,
        users: Vec<String>,
    },
    UserJoined {
        display_name: String,
        timestamp: i64,
    },
    UserLeft {
        display_name: String,
        timestamp: i64,
    },
    NewMessage {
        message: Message,
    },
    /// `display_name: None` means "stopped typing".
    TypingSignal {
        display_name: Option<String>,
    },
    Error {
        code: String,
        message: String,
    },
}

impl ServerEvent {
    pub(crate) fn error(code: &str, message: impl Into<String>) -> Self {
        ServerEvent::Error {
            code: code.to_owned(),
            message: message.into(),
        }
    }
}
