use std::collections::HashMap;

use time::OffsetDateTime;
use uuid::Uuid;

use crate::{auth::Identity, db::MessageStore, names};

use super::{
    events::{ClientEvent, JoinRoom, RoomRef, SendMessage, ServerEvent},
    hub::{ConnId, Hub, JoinRejected, Participant},
    msg::{NewMessage, SystemMessage},
};

const ANONYMOUS: &str = "Anonymous";

/// Lowercased, trimmed, and stripped to `[a-z0-9_-]`.
pub fn sanitize_room_id(room_id: &str) -> String {
    room_id.trim()
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect()
}

/// One authenticated socket: its per-room usernames and the room it is looking at.
pub struct Connection {
    id: ConnId,
    identity: Identity,
    usernames: HashMap<String, String>,
    active_room: Option<String>,

    hub: Hub,
    store: MessageStore,
    max_message_length: usize,
}

impl Connection {
    pub fn new(identity: Identity, hub: Hub, store: MessageStore, max_message_length: usize) -> Connection {
        Connection {
            id: Uuid::now_v7(),
            identity,
            usernames: HashMap::new(),
            active_room: None,
            hub,
            store,
            max_message_length,
        }
    }

    pub fn id(&self) -> ConnId {
        self.id
    }

    pub fn active_room(&self) -> Option<&str> {
        self.active_room.as_deref()
    }

    pub fn username(&self, room_id: &str) -> &str {
        self.usernames.get(room_id).map(String::as_str).unwrap_or(ANONYMOUS)
    }

    pub async fn handle(&mut self, event: ClientEvent) {
        match event {
            ClientEvent::JoinRoom(join) => self.join_room(join).await,
            ClientEvent::LeaveRoom(room_id) => self.leave_room(&room_id).await,
            ClientEvent::Typing(RoomRef { room_id }) => self.typing(&room_id).await,
            ClientEvent::SendMessage(msg) => self.send_message(msg).await,
        }
    }

    async fn join_room(&mut self, join: JoinRoom) {
        let (room_id, password) = join.into_parts();
        let room_id = sanitize_room_id(&room_id);
        if room_id.is_empty() {
            self.hub.send_to(self.id, ServerEvent::join_error("Invalid room name")).await;
            return;
        }

        let username = names::random_username();
        let participant = Participant {
            conn_id: self.id,
            username: username.clone(),
            email: self.identity.email.clone(),
        };

        let users = match self.hub.join(&room_id, password.as_deref(), participant).await {
            Ok(users) => users,
            Err(JoinRejected::PasswordRequired) => {
                self.hub.send_to(self.id, ServerEvent::PasswordRequired(RoomRef { room_id })).await;
                return;
            }
            Err(JoinRejected::WrongPassword) => {
                self.hub.send_to(self.id, ServerEvent::join_error("Incorrect room password")).await;
                return;
            }
        };

        self.usernames.insert(room_id.clone(), username.clone());
        self.active_room = Some(room_id.clone());

        tracing::info!(uid = %self.identity.uid, room_id = %room_id, username = %username, "joined room");

        self.hub.send_to(self.id, ServerEvent::UsernameAssigned(username.clone())).await;
        self.hub.broadcast(&room_id, ServerEvent::RoomUsersUpdate(users)).await;
        self.hub.broadcast(&room_id, ServerEvent::ReceiveMessage(SystemMessage::entered(&room_id, &username).into())).await;
    }

    async fn leave_room(&mut self, room_id: &str) {
        let room_id = sanitize_room_id(room_id);
        if !self.hub.is_member(&room_id, self.id).await {
            tracing::debug!(uid = %self.identity.uid, room_id = %room_id, "leave for a room not joined");
            return;
        }
        let username = self.username(&room_id).to_owned();

        // The leaver sees its own announcement.
        self.hub.broadcast(&room_id, ServerEvent::ReceiveMessage(SystemMessage::left(&room_id, &username).into())).await;

        if let Some(users) = self.hub.leave(&room_id, self.id).await {
            self.hub.broadcast(&room_id, ServerEvent::RoomUsersUpdate(users)).await;
        }

        tracing::info!(uid = %self.identity.uid, room_id = %room_id, username = %username, "left room");

        self.usernames.remove(&room_id);
        self.active_room = None;
    }

    async fn typing(&self, room_id: &str) {
        let room_id = sanitize_room_id(room_id);
        if !self.hub.is_member(&room_id, self.id).await {
            return;
        }

        let username = self.username(&room_id).to_owned();
        self.hub.broadcast_except(&room_id, self.id, ServerEvent::UserTyping { username }).await;
    }

    async fn send_message(&self, SendMessage { room_id, text, reply_to }: SendMessage) {
        let room_id = sanitize_room_id(&room_id);
        if room_id.is_empty() || text.trim().is_empty() {
            return;
        }

        if !self.hub.is_member(&room_id, self.id).await {
            self.hub.send_to(self.id, ServerEvent::message_error("Join the room before sending messages")).await;
            return;
        }

        if text.chars().count() > self.max_message_length {
            self.hub.send_to(
                self.id,
                ServerEvent::message_error(format!("Message too long! Maximum {} characters.", self.max_message_length)),
            ).await;
            return;
        }

        let msg = NewMessage {
            text,
            sender_id: self.identity.uid.clone(),
            sender_email: self.identity.email.clone(),
            sender_username: self.username(&room_id).to_owned(),
            room_id: room_id.clone(),
            created_at: OffsetDateTime::now_utc(),
            reply_to: reply_to.filter(|x| !x.is_empty()),
        };

        match self.store.add(msg).await {
            Ok(msg) => {
                tracing::info!(uid = %self.identity.uid, room_id = %room_id, id = %msg.id, "message sent");
                self.hub.broadcast(&room_id, ServerEvent::ReceiveMessage(msg.into())).await;
            }
            Err(e) => {
                tracing::error!(uid = %self.identity.uid, room_id = %room_id, error = %e, "failed to save message");
                self.hub.send_to(self.id, ServerEvent::message_error("Failed to send message")).await;
            }
        }
    }

    /// Announces the departure in every room the socket still sat in.
    pub async fn disconnect(self) {
        let removed = self.hub.unregister(self.id).await;

        tracing::info!(uid = %self.identity.uid, conn_id = %self.id, "disconnected");

        for (room_id, username, users) in removed {
            self.hub.broadcast(&room_id, ServerEvent::RoomUsersUpdate(users)).await;
            self.hub.broadcast(&room_id, ServerEvent::ReceiveMessage(SystemMessage::disconnected(&room_id, &username).into())).await;
        }
    }
}
