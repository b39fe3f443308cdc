use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{ChatError, ChatResult};

/// Default history window replayed into a room snapshot.
pub const HISTORY_LIMIT: u32 = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
    Image,
    File,
}

impl MessageKind {
    fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Image => "image",
            MessageKind::File => "file",
        }
    }

    fn from_str(s: &str) -> Self {
        match s {
            "image" => MessageKind::Image,
            "file" => MessageKind::File,
            _ => MessageKind::Text,
        }
    }
}

/// One persisted chat utterance. Everything but `seen_by` is immutable
/// once `append` returns.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub room_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_connection_id: Option<Uuid>,
    pub sender_name: String,
    pub body: String,
    pub kind: MessageKind,
    pub created_at: i64,
    pub seen_by: Vec<Uuid>,
}

/// What a caller hands to `append`; id and timestamp get assigned on insert.
#[derive(Debug, Clone)]
pub struct MessageDraft {
    pub room_id: String,
    pub sender_connection_id: Option<Uuid>,
    pub sender_name: String,
    pub body: String,
    pub kind: MessageKind,
}

pub(crate) fn now_millis() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

#[derive(Clone)]
pub struct MessageStore {
    pub db_pool: SqlitePool,
}

impl MessageStore {
    pub fn new(db_pool: SqlitePool) -> Self {
        Self { db_pool }
    }

    pub async fn migrate(&self) -> ChatResult<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                room_id TEXT NOT NULL,
                sender_connection_id TEXT,
                sender_name TEXT NOT NULL,
                body TEXT NOT NULL,
                kind TEXT NOT NULL DEFAULT 'text',
                created_at INTEGER NOT NULL,
                seen_by TEXT NOT NULL DEFAULT '[]'
            )",
        )
        .execute(&self.db_pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS messages_room_time
             ON messages (room_id, created_at, id)",
        )
        .execute(&self.db_pool)
        .await?;

        Ok(())
    }

    /// Assigns id and timestamp, writes durably, returns the stored record.
    /// The write is visible to `list_by_room` as soon as this returns.
    pub async fn append(&self, draft: MessageDraft) -> ChatResult<Message> {
        if draft.room_id.is_empty() {
            return Err(ChatError::validation("roomId must not be empty"));
        }
        if draft.sender_name.is_empty() {
            return Err(ChatError::validation("senderName must not be empty"));
        }
        if draft.body.is_empty() {
            return Err(ChatError::validation("body must not be empty"));
        }

        let message = Message {
            id: Uuid::now_v7(),
            room_id: draft.room_id,
            sender_connection_id: draft.sender_connection_id,
            sender_name: draft.sender_name,
            body: draft.body,
            kind: draft.kind,
            created_at: now_millis(),
            seen_by: Vec::new(),
        };

        sqlx::query(
            "INSERT INTO messages (id,room_id,sender_connection_id,sender_name,body,kind,created_at,seen_by)
             VALUES (?,?,?,?,?,?,?,'[]')",
        )
        .bind(message.id.to_string())
        .bind(&message.room_id)
        .bind(message.sender_connection_id.as_ref().map(Uuid::to_string))
        .bind(&message.sender_name)
        .bind(&message.body)
        .bind(message.kind.as_str())
        .bind(message.created_at)
        .execute(&self.db_pool)
        .await?;

        Ok(message)
    }

    /// Oldest-first, at most `limit`, ties on `created_at` broken by id.
    pub async fn list_by_room(&self, room_id: &str, limit: u32) -> ChatResult<Vec<Message>> {
        let rows: Vec<(String, String, Option<String>, String, String, String, i64, String)> =
            sqlx::query_as(
                "SELECT id,room_id,sender_connection_id,sender_name,body,kind,created_at,seen_by
                 FROM messages WHERE room_id=?
                 ORDER BY created_at ASC, id ASC
                 LIMIT ?",
            )
            .bind(room_id)
            .bind(limit)
            .fetch_all(&self.db_pool)
            .await?;

        rows.into_iter().map(row_to_message).collect()
    }

    /// Idempotent; a mark against a message that no longer exists is logged
    /// and swallowed so a stale client can't fault the caller.
    pub async fn mark_seen(&self, message_id: Uuid, connection_id: Uuid) -> ChatResult<()> {
        let mut tx = self.db_pool.begin().await?;

        let row: Option<(String,)> = sqlx::query_as("SELECT seen_by FROM messages WHERE id=?")
            .bind(message_id.to_string())
            .fetch_optional(&mut *tx)
            .await?;

        let Some((seen_by,)) = row else {
            tracing::warn!(%message_id, "mark_seen against unknown message");
            return Ok(());
        };

        let mut seen_by: Vec<Uuid> = serde_json::from_str(&seen_by).unwrap_or_default();
        if seen_by.contains(&connection_id) {
            return Ok(());
        }
        seen_by.push(connection_id);

        sqlx::query("UPDATE messages SET seen_by=? WHERE id=?")
            .bind(serde_json::to_string(&seen_by).unwrap_or_else(|_| "[]".to_owned()))
            .bind(message_id.to_string())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

fn row_to_message(
    (id, room_id, sender_connection_id, sender_name, body, kind, created_at, seen_by): (
        String,
        String,
        Option<String>,
        String,
        String,
        String,
        i64,
        String,
    ),
) -> ChatResult<Message> {
    Ok(Message {
        id: Uuid::parse_str(&id).map_err(decode_err)?,
        room_id,
        sender_connection_id: match sender_connection_id {
            Some(x) => Some(Uuid::parse_str(&x).map_err(decode_err)?),
            None => None,
        },
        sender_name,
        body,
        kind: MessageKind::from_str(&kind),
        created_at,
        seen_by: serde_json::from_str(&seen_by).map_err(decode_err)?,
    })
}

fn decode_err<E: std::error::Error + Send + Sync + 'static>(e: E) -> ChatError {
    ChatError::Persistence(sqlx::Error::Decode(Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> MessageStore {
        // one connection, or every pooled conn gets its own :memory: db
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = MessageStore::new(pool);
        store.migrate().await.unwrap();
        store
    }

    fn draft(room: &str, body: &str) -> MessageDraft {
        MessageDraft {
            room_id: room.to_owned(),
            sender_connection_id: None,
            sender_name: "Alice".to_owned(),
            body: body.to_owned(),
            kind: MessageKind::Text,
        }
    }

    #[tokio::test]
    async fn list_is_ascending_and_capped() {
        let store = store().await;
        for i in 0..5 {
            store.append(draft("lobby", &format!("msg {i}"))).await.unwrap();
        }
        store.append(draft("other", "elsewhere")).await.unwrap();

        let msgs = store.list_by_room("lobby", 3).await.unwrap();
        assert_eq!(msgs.len(), 3);
        assert!(msgs.windows(2).all(|w| {
            (w[0].created_at, w[0].id) <= (w[1].created_at, w[1].id)
        }));
        assert!(msgs.iter().all(|m| m.room_id == "lobby"));
    }

    #[tokio::test]
    async fn append_rejects_empty_fields() {
        let store = store().await;
        for bad in [
            draft("", "hi"),
            draft("lobby", ""),
            MessageDraft {
                sender_name: String::new(),
                ..draft("lobby", "hi")
            },
        ] {
            assert!(matches!(
                store.append(bad).await,
                Err(ChatError::Validation(_))
            ));
        }
        assert!(store.list_by_room("lobby", 100).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn mark_seen_is_idempotent_and_tolerates_unknown_ids() {
        let store = store().await;
        let msg = store.append(draft("lobby", "hi")).await.unwrap();
        let conn = Uuid::now_v7();

        store.mark_seen(msg.id, conn).await.unwrap();
        store.mark_seen(msg.id, conn).await.unwrap();
        // stale mark, message never existed
        store.mark_seen(Uuid::now_v7(), conn).await.unwrap();

        let msgs = store.list_by_room("lobby", 100).await.unwrap();
        assert_eq!(msgs[0].seen_by, vec![conn]);
    }

    #[tokio::test]
    async fn kind_defaults_to_text_round_trip() {
        let store = store().await;
        let mut d = draft("lobby", "pic");
        d.kind = MessageKind::Image;
        store.append(d).await.unwrap();

        let msgs = store.list_by_room("lobby", 100).await.unwrap();
        assert_eq!(msgs[0].kind, MessageKind::Image);
    }
}
