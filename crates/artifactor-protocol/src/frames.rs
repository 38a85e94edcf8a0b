use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The full set of WebSocket message types the collaboration hub understands,
/// both inbound (client → server) and outbound (server → client).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    CursorMove,
    SelectionChange,
    TypingStart,
    TypingStop,
    ArtifactEdit,
    CommentAdd,
    CommentUpdate,
    CommentDelete,
    UserJoin,
    UserLeave,
    RoomState,
    Notification,
    Error,
}

impl MessageType {
    /// Durable message types are persisted (comment + activity write) before
    /// being broadcast; all others are fire-and-forget.
    pub fn is_durable(self) -> bool {
        matches!(
            self,
            MessageType::CommentAdd | MessageType::CommentUpdate | MessageType::CommentDelete
        )
    }
}

/// Client → Server message.
/// Wire: `{ "type": "cursor_move", "data": {...}, "timestamp": "..." }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientMessage {
    #[serde(rename = "type")]
    pub message_type: MessageType,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Server → Client message.
/// Wire: `{ "type": "cursor_move", "user_id": "...", "data": {...}, "timestamp": "..." }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerMessage {
    #[serde(rename = "type")]
    pub message_type: MessageType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

impl ServerMessage {
    pub fn new(message_type: MessageType, user_id: Option<String>, data: Value) -> Self {
        Self {
            message_type,
            user_id,
            data,
            timestamp: Utc::now(),
        }
    }

    pub fn error(code: &str, message: &str) -> Self {
        Self::new(
            MessageType::Error,
            None,
            serde_json::json!({ "code": code, "message": message }),
        )
    }

    pub fn room_state(snapshot: Value) -> Self {
        Self::new(MessageType::RoomState, None, snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_message_round_trips_cursor_move() {
        let json = r#"{"type":"cursor_move","data":{"line":3,"column":7}}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.message_type, MessageType::CursorMove);
        assert_eq!(msg.data["line"], 3);
    }

    #[test]
    fn durable_types_are_the_comment_trio() {
        assert!(MessageType::CommentAdd.is_durable());
        assert!(MessageType::CommentUpdate.is_durable());
        assert!(MessageType::CommentDelete.is_durable());
        assert!(!MessageType::CursorMove.is_durable());
        assert!(!MessageType::ArtifactEdit.is_durable());
    }

    #[test]
    fn server_message_error_has_no_user_id() {
        let msg = ServerMessage::error("NOT_FOUND", "comment not found");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(!json.contains("user_id"));
        assert!(json.contains("NOT_FOUND"));
    }
}
