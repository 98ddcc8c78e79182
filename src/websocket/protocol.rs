use crate::db::models::Message;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Frames sent by the browser, as `{ "type": ..., "payload": ... }`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload")]
pub enum ClientMessage {
    #[serde(rename = "join_room")]
    JoinRoom { room_id: String },
    #[serde(rename = "leave_room")]
    LeaveRoom { room_id: String },
    #[serde(rename = "send_message")]
    SendMessage { chat_id: Uuid, content: String },
    #[serde(rename = "typing")]
    Typing { chat_id: Uuid },
    #[serde(rename = "ping")]
    Ping,
    #[serde(rename = "pong")]
    Pong,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ServerMessage {
    #[serde(rename = "online_users")]
    OnlineUsers { user_ids: Vec<Uuid> },
    #[serde(rename = "new_message")]
    NewMessage { message: Message },
    #[serde(rename = "typing")]
    Typing { chat_id: Uuid, user_id: Uuid },
    #[serde(rename = "joined")]
    Joined { room_id: String },
    #[serde(rename = "error")]
    Error { message: String },
    #[serde(rename = "ping")]
    Ping,
    #[serde(rename = "pong")]
    Pong,
}

impl ServerMessage {
    pub fn to_json(&self) -> String {
        // Every variant holds plain data, serialization cannot fail
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"type":"error"}"#.to_string())
    }
}
