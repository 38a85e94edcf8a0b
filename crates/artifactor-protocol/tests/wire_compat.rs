// Verifies the WebSocket wire format matches what collaboration clients
// expect. These tests ensure protocol compatibility is never broken silently.

use artifactor_protocol::frames::{ClientMessage, MessageType, ServerMessage};
use artifactor_protocol::handshake::ConnectParams;

#[test]
fn client_message_cursor_move_round_trip() {
    let json = r#"{"type":"cursor_move","data":{"line":3,"column":7}}"#;
    let msg: ClientMessage = serde_json::from_str(json).unwrap();
    assert_eq!(msg.message_type, MessageType::CursorMove);
    assert_eq!(msg.data["line"], 3);
}

#[test]
fn client_message_comment_add_carries_mentions() {
    let json = r#"{"type":"comment_add","data":{"content":"hi @bob","mentions":["@bob"]}}"#;
    let msg: ClientMessage = serde_json::from_str(json).unwrap();
    assert_eq!(msg.message_type, MessageType::CommentAdd);
    assert_eq!(msg.data["mentions"][0], "@bob");
}

#[test]
fn server_message_serializes_user_id_when_present() {
    let msg = ServerMessage::new(
        MessageType::CursorMove,
        Some("user-a".to_string()),
        serde_json::json!({"line": 1, "column": 2}),
    );
    let json = serde_json::to_string(&msg).unwrap();
    assert!(json.contains(r#""type":"cursor_move""#));
    assert!(json.contains(r#""user_id":"user-a""#));
}

#[test]
fn server_message_omits_user_id_when_absent() {
    let msg = ServerMessage::room_state(serde_json::json!({"users": []}));
    let json = serde_json::to_string(&msg).unwrap();
    assert!(!json.contains("user_id"));
    assert!(json.contains(r#""type":"room_state""#));
}

#[test]
fn unknown_message_type_fails_to_parse() {
    let json = r#"{"type":"bogus","data":{}}"#;
    let result: Result<ClientMessage, _> = serde_json::from_str(json);
    assert!(result.is_err());
}

#[test]
fn connect_params_parses_query_shape() {
    let json = r#"{"artifact_id":"art-1","token":"secret-123"}"#;
    let params: ConnectParams = serde_json::from_str(json).unwrap();
    assert_eq!(params.artifact_id, "art-1");
    assert_eq!(params.token, "secret-123");
}
