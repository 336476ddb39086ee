//! SQLite persistence for chats and messages.
//!
//! A chat row is written once, at the end of successful ingestion; its existence
//! means the document is ready to query. Message rows are written in pairs per
//! conversation turn (user first, then assistant) inside one transaction, so a
//! failed turn never leaves half a pair behind. Nothing is ever updated in place
//! or deleted.

use serde::{Serialize, Serializer};
use sqlx::{Pool, Row, Sqlite, SqlitePool};
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

/// Errors raised by the persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database connection or statement execution failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Message author role as persisted on the wire.
///
/// Assistant turns are stored with the `system` role, matching the conversation
/// schema the UI consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// A message written by the chat owner.
    User,
    /// A reply produced by the assistant.
    System,
}

impl Role {
    /// Wire representation stored in the database.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::System => "system",
        }
    }

    fn from_db(value: &str) -> Self {
        match value {
            "system" => Self::System,
            _ => Self::User,
        }
    }
}

/// One document-bound conversation.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRecord {
    /// Unique, immutable chat identifier; also the vector-store partition key.
    pub id: String,
    /// Display name of the uploaded PDF.
    pub pdf_name: String,
    /// Storage path of the uploaded file.
    pub pdf_path: String,
    /// Resolvable URL of the uploaded file.
    pub pdf_url: String,
    /// Opaque verified id of the owning user.
    pub user_id: String,
    /// Storage identifier of the uploaded file.
    pub file_key: String,
    /// Creation time (unix nanoseconds, rendered RFC3339 over the wire).
    #[serde(serialize_with = "serialize_unix_nanos")]
    pub created_at: i64,
    /// Last update time; only ever touched by the schema, never by this crate.
    #[serde(serialize_with = "serialize_unix_nanos")]
    pub updated_at: i64,
}

impl ChatRecord {
    /// Build a fresh chat record with a new id and current timestamps.
    pub fn new(
        pdf_name: String,
        pdf_path: String,
        pdf_url: String,
        user_id: String,
        file_key: String,
    ) -> Self {
        let now = now_unix_nanos();
        Self {
            id: Uuid::new_v4().to_string(),
            pdf_name,
            pdf_path,
            pdf_url,
            user_id,
            file_key,
            created_at: now,
            updated_at: now,
        }
    }
}

/// One turn in a chat.
#[derive(Debug, Clone, Serialize)]
pub struct MessageRecord {
    /// Unique message identifier.
    pub id: String,
    /// Chat the message belongs to.
    pub chat_id: String,
    /// Message text.
    pub content: String,
    /// Author role (`user` or `system`).
    pub role: Role,
    /// Creation time (unix nanoseconds, rendered RFC3339 over the wire).
    #[serde(serialize_with = "serialize_unix_nanos")]
    pub created_at: i64,
}

/// Connection pool and query surface for chat persistence.
#[derive(Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    /// Connect to the database, creating the file and schema when missing.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        // Ensure SQLite creates the database file if it doesn't exist
        let connection_options = if database_url.starts_with("sqlite:") && !database_url.contains('?')
        {
            format!("{database_url}?mode=rwc")
        } else {
            database_url.to_string()
        };

        let pool = SqlitePool::connect(&connection_options).await?;
        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS chats (
                id TEXT PRIMARY KEY,
                pdf_name TEXT NOT NULL,
                pdf_path TEXT NOT NULL,
                pdf_url TEXT NOT NULL,
                user_id TEXT NOT NULL,
                file_key TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                chat_id TEXT NOT NULL REFERENCES chats(id),
                content TEXT NOT NULL,
                role TEXT NOT NULL DEFAULT 'user',
                created_at INTEGER NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chats_user_id ON chats(user_id)")
            .execute(&self.pool)
            .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_messages_chat_created ON messages(chat_id, created_at)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Persist a chat row; the durability commit point of ingestion.
    pub async fn insert_chat(&self, chat: &ChatRecord) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO chats (id, pdf_name, pdf_path, pdf_url, user_id, file_key, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(&chat.id)
        .bind(&chat.pdf_name)
        .bind(&chat.pdf_path)
        .bind(&chat.pdf_url)
        .bind(&chat.user_id)
        .bind(&chat.file_key)
        .bind(chat.created_at)
        .bind(chat.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Return every chat owned by the given user, newest first.
    pub async fn chats_for_user(&self, user_id: &str) -> Result<Vec<ChatRecord>, StoreError> {
        let rows = sqlx::query(
            r"
            SELECT id, pdf_name, pdf_path, pdf_url, user_id, file_key, created_at, updated_at
            FROM chats WHERE user_id = ? ORDER BY created_at DESC
            ",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(chat_from_row).collect()
    }

    /// Insert a conversation turn: the user row, then the assistant row, in one
    /// transaction. Returns both records.
    pub async fn insert_message_pair(
        &self,
        chat_id: &str,
        user_content: &str,
        assistant_content: &str,
    ) -> Result<(MessageRecord, MessageRecord), StoreError> {
        let user_message = MessageRecord {
            id: Uuid::new_v4().to_string(),
            chat_id: chat_id.to_string(),
            content: user_content.to_string(),
            role: Role::User,
            created_at: now_unix_nanos(),
        };
        let assistant_message = MessageRecord {
            id: Uuid::new_v4().to_string(),
            chat_id: chat_id.to_string(),
            content: assistant_content.to_string(),
            role: Role::System,
            created_at: now_unix_nanos(),
        };

        let mut tx = self.pool.begin().await?;
        for message in [&user_message, &assistant_message] {
            sqlx::query(
                "INSERT INTO messages (id, chat_id, content, role, created_at) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&message.id)
            .bind(&message.chat_id)
            .bind(&message.content)
            .bind(message.role.as_str())
            .bind(message.created_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok((user_message, assistant_message))
    }

    /// Return every message for a chat ordered by creation time ascending.
    pub async fn messages_for_chat(&self, chat_id: &str) -> Result<Vec<MessageRecord>, StoreError> {
        let rows = sqlx::query(
            r"
            SELECT id, chat_id, content, role, created_at
            FROM messages WHERE chat_id = ? ORDER BY created_at ASC, rowid ASC
            ",
        )
        .bind(chat_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(message_from_row).collect()
    }
}

fn chat_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<ChatRecord, StoreError> {
    Ok(ChatRecord {
        id: row.try_get("id")?,
        pdf_name: row.try_get("pdf_name")?,
        pdf_path: row.try_get("pdf_path")?,
        pdf_url: row.try_get("pdf_url")?,
        user_id: row.try_get("user_id")?,
        file_key: row.try_get("file_key")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn message_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<MessageRecord, StoreError> {
    let role: String = row.try_get("role")?;
    Ok(MessageRecord {
        id: row.try_get("id")?,
        chat_id: row.try_get("chat_id")?,
        content: row.try_get("content")?,
        role: Role::from_db(&role),
        created_at: row.try_get("created_at")?,
    })
}

/// Current time as unix nanoseconds.
pub(crate) fn now_unix_nanos() -> i64 {
    let nanos = OffsetDateTime::now_utc().unix_timestamp_nanos();
    i64::try_from(nanos).unwrap_or(i64::MAX)
}

fn serialize_unix_nanos<S: Serializer>(nanos: &i64, serializer: S) -> Result<S::Ok, S::Error> {
    let formatted = OffsetDateTime::from_unix_timestamp_nanos(i128::from(*nanos))
        .ok()
        .and_then(|ts| ts.format(&Rfc3339).ok())
        .unwrap_or_else(|| nanos.to_string());
    serializer.serialize_str(&formatted)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_db() -> Database {
        let url = format!(
            "sqlite:file:{}?mode=memory&cache=shared",
            Uuid::new_v4().simple()
        );
        Database::connect(&url).await.expect("database")
    }

    fn chat_for(user_id: &str) -> ChatRecord {
        ChatRecord::new(
            "report.pdf".into(),
            "docchat/u/report.pdf".into(),
            "http://localhost/files/docchat/u/report.pdf".into(),
            user_id.into(),
            "file-key".into(),
        )
    }

    #[tokio::test]
    async fn chats_are_scoped_to_their_owner() {
        let db = test_db().await;
        let mine = chat_for("user-a");
        let theirs = chat_for("user-b");
        db.insert_chat(&mine).await.expect("insert");
        db.insert_chat(&theirs).await.expect("insert");

        let chats = db.chats_for_user("user-a").await.expect("chats");
        assert_eq!(chats.len(), 1);
        assert_eq!(chats[0].id, mine.id);
        assert_eq!(chats[0].pdf_name, "report.pdf");
    }

    #[tokio::test]
    async fn message_pair_keeps_user_before_assistant() {
        let db = test_db().await;
        let chat = chat_for("user-a");
        db.insert_chat(&chat).await.expect("insert chat");

        let (user_msg, assistant_msg) = db
            .insert_message_pair(&chat.id, "What is this?", "A summary.")
            .await
            .expect("pair");

        assert_eq!(user_msg.role, Role::User);
        assert_eq!(assistant_msg.role, Role::System);
        assert!(user_msg.created_at <= assistant_msg.created_at);

        let history = db.messages_for_chat(&chat.id).await.expect("history");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[0].content, "What is this?");
        assert_eq!(history[1].role, Role::System);
        assert_eq!(history[1].content, "A summary.");
    }

    #[tokio::test]
    async fn history_orders_multiple_turns_by_creation_time() {
        let db = test_db().await;
        let chat = chat_for("user-a");
        db.insert_chat(&chat).await.expect("insert chat");

        db.insert_message_pair(&chat.id, "first?", "first.")
            .await
            .expect("pair");
        db.insert_message_pair(&chat.id, "second?", "second.")
            .await
            .expect("pair");

        let history = db.messages_for_chat(&chat.id).await.expect("history");
        let contents: Vec<&str> = history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["first?", "first.", "second?", "second."]);
        assert!(history.windows(2).all(|w| w[0].created_at <= w[1].created_at));
    }

    #[tokio::test]
    async fn message_pair_requires_an_existing_chat() {
        let db = test_db().await;
        let result = db
            .insert_message_pair("missing-chat", "hello?", "reply")
            .await;
        assert!(matches!(result, Err(StoreError::Database(_))));
    }

    #[test]
    fn timestamps_serialize_as_rfc3339() {
        let chat = chat_for("user-a");
        let json = serde_json::to_value(&chat).expect("json");
        let created = json["created_at"].as_str().expect("string timestamp");
        assert!(created.contains('T'));
    }
}
