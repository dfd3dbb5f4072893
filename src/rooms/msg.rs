use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// A persisted chat message as it goes over the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: Uuid,
    pub text: String,
    pub sender_id: String,
    pub sender_email: Option<String>,
    pub sender_username: String,
    pub room_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub reply_to: Option<String>,
}

/// A chat message before the store has assigned its id.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub text: String,
    pub sender_id: String,
    pub sender_email: Option<String>,
    pub sender_username: String,
    pub room_id: String,
    pub created_at: OffsetDateTime,
    pub reply_to: Option<String>,
}

impl NewMessage {
    pub fn with_id(self, id: Uuid) -> ChatMessage {
        let NewMessage { text, sender_id, sender_email, sender_username, room_id, created_at, reply_to } = self;
        ChatMessage { id, text, sender_id, sender_email, sender_username, room_id, created_at, reply_to }
    }
}

/// Join/leave announcements. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemMessage {
    pub id: Uuid,
    pub text: String,
    pub sender_email: String,
    pub room_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub is_system: bool,
}

impl SystemMessage {
    pub fn new(room_id: &str, text: String) -> SystemMessage {
        SystemMessage {
            id: Uuid::now_v7(),
            text,
            sender_email: "system".to_owned(),
            room_id: room_id.to_owned(),
            created_at: OffsetDateTime::now_utc(),
            is_system: true,
        }
    }

    pub fn entered(room_id: &str, username: &str) -> SystemMessage {
        Self::new(room_id, format!("{username} HAS ENTERED THE CHAT"))
    }

    pub fn left(room_id: &str, username: &str) -> SystemMessage {
        Self::new(room_id, format!("{username} HAS LEFT THE CHAT"))
    }

    pub fn disconnected(room_id: &str, username: &str) -> SystemMessage {
        Self::new(room_id, format!("{username} DISCONNECTED"))
    }
}

/// Payload of `receive_message`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RoomMessage {
    System(SystemMessage),
    Chat(ChatMessage),
}

impl From<ChatMessage> for RoomMessage {
    fn from(msg: ChatMessage) -> Self {
        RoomMessage::Chat(msg)
    }
}

impl From<SystemMessage> for RoomMessage {
    fn from(msg: SystemMessage) -> Self {
        RoomMessage::System(msg)
    }
}
