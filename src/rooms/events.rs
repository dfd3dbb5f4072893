//! Socket frames. Each text frame is one `{"event": ..., "data": ...}` object.

use serde::{Deserialize, Serialize};

use super::msg::RoomMessage;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    JoinRoom(JoinRoom),
    LeaveRoom(String),
    Typing(RoomRef),
    SendMessage(SendMessage),
}

/// Either a bare room id or an object carrying a password.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum JoinRoom {
    Plain(String),
    WithPassword(RoomWithPassword),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomWithPassword {
    pub room_id: String,
    #[serde(default)]
    pub password: Option<String>,
}

impl JoinRoom {
    /// An empty password counts as none.
    pub fn into_parts(self) -> (String, Option<String>) {
        match self {
            JoinRoom::Plain(room_id) => (room_id, None),
            JoinRoom::WithPassword(RoomWithPassword { room_id, password }) => {
                (room_id, password.filter(|x| !x.is_empty()))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomRef {
    pub room_id: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessage {
    #[serde(default)]
    pub room_id: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub reply_to: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    UsernameAssigned(String),
    RoomUsersUpdate(Vec<String>),
    ReceiveMessage(RoomMessage),
    UserTyping { username: String },
    PasswordRequired(RoomRef),
    JoinError { error: String },
    MessageError { error: String },
}

impl ServerEvent {
    pub fn join_error(error: impl Into<String>) -> ServerEvent {
        ServerEvent::JoinError { error: error.into() }
    }

    pub fn message_error(error: impl Into<String>) -> ServerEvent {
        ServerEvent::MessageError { error: error.into() }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
