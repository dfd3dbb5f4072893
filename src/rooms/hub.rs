use std::{collections::HashMap, sync::Arc};

use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use super::events::ServerEvent;

pub type ConnId = Uuid;

#[derive(Debug, Clone, PartialEq)]
pub struct Participant {
    pub conn_id: ConnId,
    pub username: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinRejected {
    PasswordRequired,
    WrongPassword,
}

#[derive(Debug, Default)]
struct Room {
    password: Option<String>,
    participants: Vec<Participant>,
}

impl Room {
    fn usernames(&self) -> Vec<String> {
        self.participants.iter().map(|p| p.username.clone()).collect()
    }

    fn is_disposable(&self) -> bool {
        self.participants.is_empty() && self.password.is_none()
    }
}

#[derive(Debug, Default)]
struct HubInner {
    peers: HashMap<ConnId, mpsc::UnboundedSender<ServerEvent>>,
    rooms: HashMap<String, Room>,
}

impl HubInner {
    fn send(&self, conn_id: &ConnId, event: ServerEvent) {
        if let Some(tx) = self.peers.get(conn_id) {
            let _ = tx.send(event);
        }
    }

    fn broadcast(&self, room_id: &str, except: Option<ConnId>, event: &ServerEvent) {
        let Some(room) = self.rooms.get(room_id) else {
            return;
        };
        for participant in &room.participants {
            if Some(participant.conn_id) != except {
                self.send(&participant.conn_id, event.clone());
            }
        }
    }

    fn remove(&mut self, room_id: &str, conn_id: ConnId) -> Option<(Participant, Vec<String>)> {
        let room = self.rooms.get_mut(room_id)?;
        let index = room.participants.iter().position(|p| p.conn_id == conn_id)?;
        let participant = room.participants.remove(index);
        let users = room.usernames();
        if room.is_disposable() {
            self.rooms.remove(room_id);
        }
        Some((participant, users))
    }
}

/// Who is connected and which rooms they sit in. Clones share the same table.
#[derive(Clone, Debug, Default)]
pub struct Hub {
    inner: Arc<Mutex<HubInner>>,
}

impl Hub {
    pub fn new() -> Hub {
        Hub::default()
    }

    /// Adds a peer and returns the stream of events addressed to it.
    pub async fn register(&self, conn_id: ConnId) -> mpsc::UnboundedReceiver<ServerEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.lock().await.peers.insert(conn_id, tx);
        rx
    }

    /// Drops a peer from every room it sat in. Returns `(room, username, remaining users)`
    /// for each room it was removed from.
    pub async fn unregister(&self, conn_id: ConnId) -> Vec<(String, String, Vec<String>)> {
        let mut inner = self.inner.lock().await;
        inner.peers.remove(&conn_id);

        let room_ids: Vec<String> = inner.rooms.iter()
            .filter(|(_, room)| room.participants.iter().any(|p| p.conn_id == conn_id))
            .map(|(room_id, _)| room_id.clone())
            .collect();

        room_ids.into_iter()
            .filter_map(|room_id| {
                let (participant, users) = inner.remove(&room_id, conn_id)?;
                Some((room_id, participant.username, users))
            })
            .collect()
    }

    /// Adds `participant` to the room, replacing any earlier entry for the same connection.
    /// The first joiner to give a password sets it for the room.
    pub async fn join(&self, room_id: &str, password: Option<&str>, participant: Participant) -> Result<Vec<String>, JoinRejected> {
        let mut inner = self.inner.lock().await;
        let room = inner.rooms.entry(room_id.to_owned()).or_default();

        if let Some(expected) = &room.password {
            match password {
                None => return Err(JoinRejected::PasswordRequired),
                Some(given) if expected.as_str() != given => return Err(JoinRejected::WrongPassword),
                Some(_) => {}
            }
        } else if let Some(given) = password {
            room.password = Some(given.to_owned());
            tracing::info!(room_id, "password set for room");
        }

        room.participants.retain(|p| p.conn_id != participant.conn_id);
        room.participants.push(participant);
        Ok(room.usernames())
    }

    /// Removes the connection from the room. `None` if it was not there.
    pub async fn leave(&self, room_id: &str, conn_id: ConnId) -> Option<Vec<String>> {
        self.inner.lock().await
            .remove(room_id, conn_id)
            .map(|(_, users)| users)
    }

    pub async fn users(&self, room_id: &str) -> Vec<String> {
        self.inner.lock().await
            .rooms
            .get(room_id)
            .map(Room::usernames)
            .unwrap_or_default()
    }

    pub async fn is_member(&self, room_id: &str, conn_id: ConnId) -> bool {
        self.inner.lock().await
            .rooms
            .get(room_id)
            .is_some_and(|room| room.participants.iter().any(|p| p.conn_id == conn_id))
    }

    /// `true` when the room is open or the password matches.
    pub async fn check_password(&self, room_id: &str, password: Option<&str>) -> bool {
        match self.inner.lock().await.rooms.get(room_id).and_then(|room| room.password.as_deref()) {
            Some(expected) => password == Some(expected),
            None => true,
        }
    }

    pub async fn send_to(&self, conn_id: ConnId, event: ServerEvent) {
        self.inner.lock().await.send(&conn_id, event);
    }

    pub async fn broadcast(&self, room_id: &str, event: ServerEvent) {
        self.inner.lock().await.broadcast(room_id, None, &event);
    }

    pub async fn broadcast_except(&self, room_id: &str, except: ConnId, event: ServerEvent) {
        self.inner.lock().await.broadcast(room_id, Some(except), &event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn participant(conn_id: ConnId, username: &str) -> Participant {
        Participant { conn_id, username: username.to_owned(), email: None }
    }

    #[tokio::test]
    async fn join_and_leave_track_usernames() {
        let hub = Hub::new();
        let (a, b) = (Uuid::now_v7(), Uuid::now_v7());

        assert_eq!(hub.join("lobby", None, participant(a, "A")).await, Ok(vec!["A".to_owned()]));
        assert_eq!(hub.join("lobby", None, participant(b, "B")).await, Ok(vec!["A".to_owned(), "B".to_owned()]));
        assert!(hub.is_member("lobby", a).await);

        assert_eq!(hub.leave("lobby", a).await, Some(vec!["B".to_owned()]));
        assert!(!hub.is_member("lobby", a).await);
        assert_eq!(hub.leave("lobby", a).await, None);
        assert_eq!(hub.users("lobby").await, vec!["B".to_owned()]);
    }

    #[tokio::test]
    async fn rejoin_replaces_entry() {
        let hub = Hub::new();
        let a = Uuid::now_v7();

        hub.join("lobby", None, participant(a, "First")).await.unwrap();
        let users = hub.join("lobby", None, participant(a, "Second")).await.unwrap();
        assert_eq!(users, vec!["Second".to_owned()]);
    }

    #[tokio::test]
    async fn first_password_guards_room() {
        let hub = Hub::new();
        let (a, b, c) = (Uuid::now_v7(), Uuid::now_v7(), Uuid::now_v7());

        hub.join("vault", Some("pw"), participant(a, "A")).await.unwrap();
        assert_eq!(hub.join("vault", None, participant(b, "B")).await, Err(JoinRejected::PasswordRequired));
        assert_eq!(hub.join("vault", Some("nope"), participant(b, "B")).await, Err(JoinRejected::WrongPassword));
        assert!(hub.join("vault", Some("pw"), participant(c, "C")).await.is_ok());

        assert!(hub.check_password("vault", Some("pw")).await);
        assert!(!hub.check_password("vault", None).await);
        assert!(hub.check_password("open", None).await);
    }

    #[tokio::test]
    async fn password_outlives_empty_room() {
        let hub = Hub::new();
        let a = Uuid::now_v7();

        hub.join("vault", Some("pw"), participant(a, "A")).await.unwrap();
        hub.leave("vault", a).await;
        assert_eq!(hub.join("vault", None, participant(a, "A")).await, Err(JoinRejected::PasswordRequired));
    }

    #[tokio::test]
    async fn broadcast_reaches_members_only() {
        let hub = Hub::new();
        let (a, b, c) = (Uuid::now_v7(), Uuid::now_v7(), Uuid::now_v7());
        let mut rx_a = hub.register(a).await;
        let mut rx_b = hub.register(b).await;
        let mut rx_c = hub.register(c).await;

        hub.join("lobby", None, participant(a, "A")).await.unwrap();
        hub.join("lobby", None, participant(b, "B")).await.unwrap();

        hub.broadcast_except("lobby", a, ServerEvent::UserTyping { username: "A".to_owned() }).await;
        hub.broadcast("lobby", ServerEvent::RoomUsersUpdate(vec![])).await;

        assert_eq!(rx_a.try_recv().unwrap(), ServerEvent::RoomUsersUpdate(vec![]));
        assert!(rx_a.try_recv().is_err());
        assert_eq!(rx_b.try_recv().unwrap(), ServerEvent::UserTyping { username: "A".to_owned() });
        assert_eq!(rx_b.try_recv().unwrap(), ServerEvent::RoomUsersUpdate(vec![]));
        assert!(rx_c.try_recv().is_err());
    }

    #[tokio::test]
    async fn unregister_clears_every_room() {
        let hub = Hub::new();
        let (a, b) = (Uuid::now_v7(), Uuid::now_v7());
        let _rx = hub.register(a).await;

        hub.join("one", None, participant(a, "A1")).await.unwrap();
        hub.join("two", None, participant(a, "A2")).await.unwrap();
        hub.join("two", None, participant(b, "B")).await.unwrap();

        let mut removed = hub.unregister(a).await;
        removed.sort();
        assert_eq!(removed, vec![
            ("one".to_owned(), "A1".to_owned(), vec![]),
            ("two".to_owned(), "A2".to_owned(), vec!["B".to_owned()]),
        ]);
        assert!(hub.users("one").await.is_empty());
        hub.send_to(a, ServerEvent::UsernameAssigned("gone".to_owned())).await;
    }
}
