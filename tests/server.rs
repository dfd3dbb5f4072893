use std::{sync::Arc, time::Duration};

use anonychat::{
    auth::{AuthError, Clients, Identity, SessionTokens, VerifyToken},
    config::Config,
    db::MessageStore,
    rooms::{hub::Participant, Hub},
    session::FIREBASE_TOKENS,
    AppState,
};
use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header::{AUTHORIZATION, COOKIE, LOCATION}, Request, StatusCode},
    Router,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio_tungstenite::tungstenite::{self, Message};
use tower::ServiceExt;
use tower_sessions::{session::{Id, Record}, MemoryStore, SessionManagerLayer, SessionStore};

/// Accepts `good-<uid>` as the token of `<uid>`.
struct StubVerifier;

#[async_trait]
impl VerifyToken for StubVerifier {
    async fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        token.strip_prefix("good-")
            .map(|uid| Identity { uid: uid.to_owned(), email: Some(format!("{uid}@example.com")) })
            .ok_or(AuthError::InvalidToken)
    }
}

async fn state() -> AppState {
    let config = Config::from_lookup(|key| match key {
        "FIREBASE_PROJECT_ID" => Some("test-project".to_owned()),
        _ => None,
    }).unwrap();

    AppState {
        store: MessageStore::memory().await.unwrap(),
        hub: Hub::new(),
        verifier: Arc::new(StubVerifier),
        clients: Clients::default(),
        config: Arc::new(config),
    }
}

fn app(state: AppState) -> Router {
    app_with_sessions(state, MemoryStore::default())
}

fn app_with_sessions(state: AppState, sessions: MemoryStore) -> Router {
    anonychat::router()
        .with_state(state)
        .layer(SessionManagerLayer::new(sessions))
}

async fn get(app: Router, uri: &str, token: Option<&str>) -> (StatusCode, String) {
    let mut request = Request::builder().uri(uri);
    if let Some(token) = token {
        request = request.header(AUTHORIZATION, format!("Bearer {token}"));
    }
    let response = app.oneshot(request.body(Body::empty()).unwrap()).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

#[tokio::test]
async fn health() {
    let (status, body) = get(app(state().await), "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "ok");
}

#[tokio::test]
async fn me_requires_a_valid_token() {
    let state = state().await;

    let (status, body) = get(app(state.clone()), "/me", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, "Authentication error: No token provided");

    let (status, body) = get(app(state.clone()), "/me", Some("forged")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, "Authentication error: Invalid token");

    let (status, body) = get(app(state.clone()), "/me?token=good-carol", None).await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body, json!({"uid": "carol", "email": "carol@example.com"}));
}

#[tokio::test]
async fn socket_upgrade_rejects_missing_token() {
    let (status, _) = get(app(state().await), "/ws", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn login_without_configured_provider_fails() {
    let (status, body) = get(app(state().await), "/login/google", None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body.contains("Google"));
}

#[tokio::test]
async fn history_is_served_oldest_first() {
    let state = state().await;
    for text in ["one", "two", "three"] {
        state.store.add(anonychat::rooms::msg::NewMessage {
            text: text.to_owned(),
            sender_id: "alice".to_owned(),
            sender_email: None,
            sender_username: "WildWolf111".to_owned(),
            room_id: "lobby".to_owned(),
            created_at: time::OffsetDateTime::now_utc(),
            reply_to: None,
        }).await.unwrap();
    }

    let (status, body) = get(app(state.clone()), "/rooms/Lobby/messages?limit=2", Some("good-bob")).await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_str(&body).unwrap();
    let texts: Vec<&str> = body.as_array().unwrap().iter().map(|m| m["text"].as_str().unwrap()).collect();
    assert_eq!(texts, vec!["two", "three"]);

    let (status, _) = get(app(state), "/rooms/lobby/messages", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn history_of_password_room_needs_password() {
    let state = state().await;
    let owner = Participant { conn_id: uuid::Uuid::now_v7(), username: "BoldTiger123".to_owned(), email: None };
    state.hub.join("vault", Some("hunter2"), owner).await.unwrap();

    let (status, body) = get(app(state.clone()), "/rooms/vault/messages", Some("good-bob")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body, "Incorrect room password");

    let (status, _) = get(app(state.clone()), "/rooms/vault/messages?password=guess", Some("good-bob")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = get(app(state.clone()), "/rooms/vault/messages?password=hunter2", Some("good-bob")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "[]");

    let (status, _) = get(app(state), "/rooms/!!!/messages", Some("good-bob")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn session_token_authenticates() {
    let sessions = MemoryStore::default();
    let tokens = SessionTokens {
        id_token: "good-dana".to_owned(),
        refresh_token: "refresh".to_owned(),
        expires_at: time::OffsetDateTime::now_utc().unix_timestamp() + 3600,
    };
    let mut record = Record {
        id: Id::default(),
        data: [(FIREBASE_TOKENS.to_owned(), serde_json::to_value(&tokens).unwrap())].into(),
        expiry_date: time::OffsetDateTime::now_utc() + time::Duration::hours(1),
    };
    sessions.create(&mut record).await.unwrap();

    let request = Request::builder()
        .uri("/me")
        .header(COOKIE, format!("id={}", record.id))
        .body(Body::empty())
        .unwrap();
    let response = app_with_sessions(state().await, sessions).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body, json!({"uid": "dana", "email": "dana@example.com"}));
}

#[tokio::test]
async fn logout_never_redirects_offsite() {
    let state = state().await;
    for (uri, target) in [
        ("/logout?return_url=https://evil.example", "/"),
        ("/logout?return_url=//evil.example", "/"),
        ("/logout?return_url=/rooms", "/rooms"),
        ("/logout?return_url=http://localhost:5173/chat", "http://localhost:5173/chat"),
    ] {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let response = app(state.clone()).oneshot(request).await.unwrap();
        assert!(response.status().is_redirection(), "{uri}");
        assert_eq!(response.headers()[LOCATION], target, "{uri}");
    }
}

type Socket = tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

async fn serve(state: AppState) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app(state)).await.unwrap();
    });
    format!("ws://{addr}/ws")
}

async fn connect(url: &str, uid: &str) -> Socket {
    let (socket, _) = tokio_tungstenite::connect_async(format!("{url}?token=good-{uid}")).await.unwrap();
    socket
}

async fn emit(socket: &mut Socket, event: Value) {
    socket.send(Message::text(event.to_string())).await.unwrap();
}

async fn next_event(socket: &mut Socket) -> Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("timed out waiting for event")
            .unwrap()
            .unwrap();
        if let Message::Text(text) = frame {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

#[tokio::test]
async fn socket_rejects_forged_token() {
    let url = serve(state().await).await;
    let err = tokio_tungstenite::connect_async(format!("{url}?token=forged")).await.unwrap_err();
    let tungstenite::Error::Http(response) = err else { panic!("expected an http error") };
    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
async fn chat_over_sockets() {
    let state = state().await;
    let url = serve(state.clone()).await;

    let mut alice = connect(&url, "alice").await;
    emit(&mut alice, json!({"event": "join_room", "data": "lobby"})).await;
    let assigned = next_event(&mut alice).await;
    assert_eq!(assigned["event"], "username_assigned");
    let alice_name = assigned["data"].as_str().unwrap().to_owned();
    assert_eq!(next_event(&mut alice).await, json!({"event": "room_users_update", "data": [alice_name]}));
    assert_eq!(next_event(&mut alice).await["data"]["text"], format!("{alice_name} HAS ENTERED THE CHAT"));

    let mut bob = connect(&url, "bob").await;
    emit(&mut bob, json!({"event": "join_room", "data": {"roomId": "lobby", "password": null}})).await;
    let bob_name = next_event(&mut bob).await["data"].as_str().unwrap().to_owned();
    assert_eq!(next_event(&mut alice).await["data"], json!([alice_name, bob_name]));
    next_event(&mut alice).await;
    next_event(&mut bob).await;
    next_event(&mut bob).await;

    emit(&mut bob, json!({"event": "typing", "data": {"roomId": "lobby"}})).await;
    assert_eq!(next_event(&mut alice).await, json!({"event": "user_typing", "data": {"username": bob_name}}));

    emit(&mut alice, json!({"event": "send_message", "data": {"roomId": "lobby", "text": "hi bob", "replyTo": null}})).await;
    for socket in [&mut alice, &mut bob] {
        let event = next_event(socket).await;
        assert_eq!(event["event"], "receive_message");
        assert_eq!(event["data"]["text"], "hi bob");
        assert_eq!(event["data"]["senderUsername"], alice_name.as_str());
        assert_eq!(event["data"]["senderEmail"], "alice@example.com");
    }
    assert_eq!(state.store.recent("lobby", 10).await.unwrap().len(), 1);

    alice.close(None).await.unwrap();
    assert_eq!(next_event(&mut bob).await["data"], json!([bob_name]));
    assert_eq!(next_event(&mut bob).await["data"]["text"], format!("{alice_name} DISCONNECTED"));
}
