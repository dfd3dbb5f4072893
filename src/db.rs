use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::rooms::msg::{ChatMessage, NewMessage};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS messages (
    id TEXT PRIMARY KEY NOT NULL,
    room_id TEXT NOT NULL,
    sender_id TEXT NOT NULL,
    sender_email TEXT,
    sender_username TEXT NOT NULL,
    text TEXT NOT NULL,
    created_at TEXT NOT NULL,
    reply_to TEXT
);
CREATE INDEX IF NOT EXISTS messages_room ON messages (room_id);
"#;

type MessageRow = (String, String, String, Option<String>, String, String, OffsetDateTime, Option<String>);

/// Chat message persistence. Clones share the pool.
#[derive(Clone, Debug)]
pub struct MessageStore {
    db_pool: SqlitePool,
}

impl MessageStore {
    pub async fn connect(database_url: &str) -> sqlx::Result<MessageStore> {
        let db_pool = SqlitePoolOptions::new()
            .max_connections(16)
            .connect(database_url)
            .await?;

        Self::from_pool(db_pool).await
    }

    /// Private in-memory database. A single connection that never expires, since every
    /// `sqlite::memory:` connection would otherwise open its own empty database.
    pub async fn memory() -> sqlx::Result<MessageStore> {
        let db_pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        Self::from_pool(db_pool).await
    }

    pub async fn from_pool(db_pool: SqlitePool) -> sqlx::Result<MessageStore> {
        sqlx::raw_sql(SCHEMA).execute(&db_pool).await?;
        Ok(MessageStore { db_pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.db_pool
    }

    pub async fn add(&self, msg: NewMessage) -> sqlx::Result<ChatMessage> {
        let id = Uuid::now_v7();
        sqlx::query("INSERT INTO messages (id,room_id,sender_id,sender_email,sender_username,text,created_at,reply_to) VALUES (?,?,?,?,?,?,?,?)")
            .bind(id.to_string())
            .bind(&msg.room_id)
            .bind(&msg.sender_id)
            .bind(&msg.sender_email)
            .bind(&msg.sender_username)
            .bind(&msg.text)
            .bind(msg.created_at)
            .bind(&msg.reply_to)
            .execute(&self.db_pool)
            .await?;

        Ok(msg.with_id(id))
    }

    /// The last `limit` messages of a room, oldest first.
    pub async fn recent(&self, room_id: &str, limit: u32) -> sqlx::Result<Vec<ChatMessage>> {
        let rows: Vec<MessageRow> = sqlx::query_as(
            r#"SELECT id,text,sender_id,sender_email,sender_username,room_id,created_at,reply_to FROM (
                SELECT rowid AS seq,* FROM messages WHERE room_id=? ORDER BY rowid DESC LIMIT ?
            ) ORDER BY seq ASC"#,
        )
            .bind(room_id)
            .bind(limit)
            .fetch_all(&self.db_pool)
            .await?;

        rows.into_iter()
            .map(|(id, text, sender_id, sender_email, sender_username, room_id, created_at, reply_to)| {
                Ok(ChatMessage {
                    id: Uuid::parse_str(&id).map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
                    text,
                    sender_id,
                    sender_email,
                    sender_username,
                    room_id,
                    created_at,
                    reply_to,
                })
            })
            .collect()
    }
}
