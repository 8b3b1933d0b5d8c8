//! SQLite-backed [`FlashcardStore`].
//!
//! Timestamps are stored as RFC 3339 text. The schema is created on open
//! with `CREATE TABLE IF NOT EXISTS`; there are no migrations.

use super::{validate_topic_name, FlashcardStore, StoreError};
use crate::output::{PersistedFlashcard, Topic, TopicRef, UserRef};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

const SCHEMA: &str = "
    PRAGMA foreign_keys = ON;
    CREATE TABLE IF NOT EXISTS topics (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        name        TEXT NOT NULL,
        username    TEXT NOT NULL,
        created_at  TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS flashcards (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        topic_id    INTEGER NOT NULL REFERENCES topics(id) ON DELETE CASCADE,
        username    TEXT NOT NULL,
        question    TEXT NOT NULL,
        answer      TEXT NOT NULL,
        created_at  TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_flashcards_topic ON flashcards(topic_id);
";

/// A SQLite database holding topics and flashcards.
///
/// Cheap to clone; clones share one connection. Every query runs on the
/// blocking pool.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA busy_timeout = 5000;")?;
        debug!("Opened flashcard database {}", path.display());
        Self::init(conn)
    }

    /// A private database that disappears with the value.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().unwrap_or_else(PoisonError::into_inner);
            f(&guard)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }

    /// Look up a topic by id.
    pub async fn topic(&self, id: i64) -> Result<Option<Topic>, StoreError> {
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT id, name, username, created_at FROM topics WHERE id = ?1",
                params![id],
                topic_from_row,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    /// Flashcards under `topic` owned by `user`, in insertion order.
    pub async fn flashcards_for_topic(
        &self,
        topic: TopicRef,
        user: &UserRef,
    ) -> Result<Vec<PersistedFlashcard>, StoreError> {
        let user = user.clone();
        self.with_conn(move |conn| {
            check_owner(conn, topic, &user)?;
            let mut stmt = conn.prepare(
                "SELECT id, topic_id, username, question, answer, created_at
                 FROM flashcards WHERE topic_id = ?1 ORDER BY id",
            )?;
            let cards = stmt
                .query_map(params![topic.id], flashcard_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(cards)
        })
        .await
    }
}

impl FlashcardStore for SqliteStore {
    fn create_topic<'a>(
        &'a self,
        user: &'a UserRef,
        name: &'a str,
    ) -> BoxFuture<'a, Result<Topic, StoreError>> {
        let user = user.clone();
        let name = name.to_string();
        Box::pin(async move {
            validate_topic_name(&name)?;
            self.with_conn(move |conn| {
                let created_at = Utc::now();
                conn.execute(
                    "INSERT INTO topics (name, username, created_at) VALUES (?1, ?2, ?3)",
                    params![name, user.as_str(), created_at.to_rfc3339()],
                )?;
                Ok(Topic {
                    id: conn.last_insert_rowid(),
                    name,
                    user,
                    created_at,
                })
            })
            .await
        })
    }

    fn create_flashcard<'a>(
        &'a self,
        topic: TopicRef,
        user: &'a UserRef,
        question: &'a str,
        answer: &'a str,
    ) -> BoxFuture<'a, Result<PersistedFlashcard, StoreError>> {
        let user = user.clone();
        let question = question.to_string();
        let answer = answer.to_string();
        Box::pin(self.with_conn(move |conn| {
            check_owner(conn, topic, &user)?;
            let created_at = Utc::now();
            conn.execute(
                "INSERT INTO flashcards (topic_id, username, question, answer, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![topic.id, user.as_str(), question, answer, created_at.to_rfc3339()],
            )?;
            Ok(PersistedFlashcard {
                id: conn.last_insert_rowid(),
                topic_id: topic.id,
                user,
                question,
                answer,
                created_at,
            })
        }))
    }
}

fn check_owner(conn: &Connection, topic: TopicRef, user: &UserRef) -> Result<(), StoreError> {
    let owner: Option<String> = conn
        .query_row(
            "SELECT username FROM topics WHERE id = ?1",
            params![topic.id],
            |row| row.get(0),
        )
        .optional()?;
    match owner {
        None => Err(StoreError::TopicNotFound { id: topic.id }),
        Some(owner) if owner != user.as_str() => Err(StoreError::TopicOwnership {
            id: topic.id,
            owner,
            user: user.to_string(),
        }),
        Some(_) => Ok(()),
    }
}

fn timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn topic_from_row(row: &Row<'_>) -> rusqlite::Result<Topic> {
    Ok(Topic {
        id: row.get(0)?,
        name: row.get(1)?,
        user: UserRef(row.get(2)?),
        created_at: timestamp(row, 3)?,
    })
}

fn flashcard_from_row(row: &Row<'_>) -> rusqlite::Result<PersistedFlashcard> {
    Ok(PersistedFlashcard {
        id: row.get(0)?,
        topic_id: row.get(1)?,
        user: UserRef(row.get(2)?),
        question: row.get(3)?,
        answer: row.get(4)?,
        created_at: timestamp(row, 5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_topic_and_flashcards() {
        let store = SqliteStore::open_in_memory().unwrap();
        let ada = UserRef::new("ada");
        let topic = store.create_topic(&ada, "Geography").await.unwrap();

        store
            .create_flashcard(topic.reference(), &ada, "What is the capital of France?", "Paris")
            .await
            .unwrap();
        store
            .create_flashcard(topic.reference(), &ada, "What is the capital of Italy?", "Rome")
            .await
            .unwrap();

        let cards = store.flashcards_for_topic(topic.reference(), &ada).await.unwrap();
        let answers: Vec<_> = cards.iter().map(|c| c.answer.as_str()).collect();
        assert_eq!(answers, vec!["Paris", "Rome"]);
        assert!(cards.iter().all(|c| c.topic_id == topic.id && c.user == ada));

        let loaded = store.topic(topic.id).await.unwrap().unwrap();
        assert_eq!(loaded.name, "Geography");
        assert_eq!(loaded.created_at.timestamp(), topic.created_at.timestamp());
    }

    #[tokio::test]
    async fn enforces_topic_ownership() {
        let store = SqliteStore::open_in_memory().unwrap();
        let topic = store.create_topic(&UserRef::new("ada"), "Maths").await.unwrap();
        let err = store
            .create_flashcard(topic.reference(), &UserRef::new("bob"), "Q", "A")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::TopicOwnership { .. }), "got: {err:?}");

        let err = store
            .create_flashcard(TopicRef { id: 999 }, &UserRef::new("ada"), "Q", "A")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::TopicNotFound { id: 999 }));
    }

    #[tokio::test]
    async fn reopening_file_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cards.db");
        let ada = UserRef::new("ada");

        let topic = {
            let store = SqliteStore::open(&path).unwrap();
            let topic = store.create_topic(&ada, "History").await.unwrap();
            store.create_flashcard(topic.reference(), &ada, "Q", "A").await.unwrap();
            topic
        };

        let store = SqliteStore::open(&path).unwrap();
        let cards = store.flashcards_for_topic(topic.reference(), &ada).await.unwrap();
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].question, "Q");
    }

    #[tokio::test]
    async fn rejects_empty_topic_name() {
        let store = SqliteStore::open_in_memory().unwrap();
        let err = store.create_topic(&UserRef::new("ada"), "").await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidTopicName(_)));
    }
}
