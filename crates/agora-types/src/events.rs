use serde::{Deserialize, Serialize};

use crate::api::MessageRead;

/// Events sent over a conversation's WebSocket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ChatEvent {
    /// Server confirms the socket is attached to the conversation
    Ready {
        conversation_id: i64,
        user_id: i64,
        username: String,
    },

    /// A message was persisted in the conversation
    MessageCreate { message: MessageRead },

    /// A command from this client was rejected
    Error { detail: String },
}

/// Commands sent FROM client TO server over the conversation's WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ChatCommand {
    SendMessage { content: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_message_command_uses_tagged_layout() {
        let raw = r#"{"type":"SendMessage","data":{"content":"hi"}}"#;
        let ChatCommand::SendMessage { content } = serde_json::from_str(raw).unwrap();
        assert_eq!(content, "hi");
    }

    #[test]
    fn error_event_serializes_with_detail() {
        let json = serde_json::to_value(ChatEvent::Error {
            detail: "nope".into(),
        })
        .unwrap();
        assert_eq!(json["type"], "Error");
        assert_eq!(json["data"]["detail"], "nope");
    }
}
