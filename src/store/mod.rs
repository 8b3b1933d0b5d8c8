//! Persistence collaborator: topics and flashcards owned by a user.
//!
//! The pipeline writes through [`FlashcardStore`] and never looks at how
//! records are kept. [`MemoryStore`] keeps everything in process memory
//! (tests, one-shot tools); [`SqliteStore`] writes to a SQLite file.
//!
//! Both implementations check that a flashcard's topic exists and belongs to
//! the same user before inserting it.

mod sqlite;

pub use sqlite::SqliteStore;

use crate::output::{PersistedFlashcard, Topic, TopicRef, UserRef};
use chrono::Utc;
use futures::future::BoxFuture;
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

/// Longest accepted topic name, in characters.
pub const MAX_TOPIC_NAME_CHARS: usize = 255;

/// Errors raised by a [`FlashcardStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Topic {id} does not exist")]
    TopicNotFound { id: i64 },

    #[error("Topic {id} belongs to '{owner}', not '{user}'")]
    TopicOwnership { id: i64, owner: String, user: String },

    #[error("Invalid topic name: {0}")]
    InvalidTopicName(String),

    /// A blocking database task panicked or was cancelled.
    #[error("Store task failed: {0}")]
    Task(String),
}

/// Where generated flashcards go.
///
/// Object-safe so the pipeline can hold an `Arc<dyn FlashcardStore>`.
pub trait FlashcardStore: Send + Sync {
    /// Create a topic named `name` owned by `user`.
    fn create_topic<'a>(
        &'a self,
        user: &'a UserRef,
        name: &'a str,
    ) -> BoxFuture<'a, Result<Topic, StoreError>>;

    /// Insert one flashcard under `topic`, which must belong to `user`.
    fn create_flashcard<'a>(
        &'a self,
        topic: TopicRef,
        user: &'a UserRef,
        question: &'a str,
        answer: &'a str,
    ) -> BoxFuture<'a, Result<PersistedFlashcard, StoreError>>;
}

pub(crate) fn validate_topic_name(name: &str) -> Result<(), StoreError> {
    if name.trim().is_empty() {
        return Err(StoreError::InvalidTopicName("name must not be empty".into()));
    }
    let chars = name.chars().count();
    if chars > MAX_TOPIC_NAME_CHARS {
        return Err(StoreError::InvalidTopicName(format!(
            "name is {} characters (limit is {})",
            chars, MAX_TOPIC_NAME_CHARS
        )));
    }
    Ok(())
}

// ── In-memory store ──────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct MemoryState {
    topics: Vec<Topic>,
    flashcards: Vec<PersistedFlashcard>,
}

/// Process-local store. Ids start at 1 and increase per table.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        // Every mutation is a single push, so a poisoned lock still holds
        // consistent data.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of all topics, in creation order.
    pub fn topics(&self) -> Vec<Topic> {
        self.lock().topics.clone()
    }

    /// Snapshot of all flashcards, in creation order.
    pub fn flashcards(&self) -> Vec<PersistedFlashcard> {
        self.lock().flashcards.clone()
    }

    /// Flashcards under `topic`, in creation order.
    pub fn flashcards_for_topic(&self, topic: TopicRef) -> Vec<PersistedFlashcard> {
        self.lock()
            .flashcards
            .iter()
            .filter(|f| f.topic_id == topic.id)
            .cloned()
            .collect()
    }

    fn insert_topic(&self, user: &UserRef, name: &str) -> Result<Topic, StoreError> {
        validate_topic_name(name)?;
        let mut state = self.lock();
        let topic = Topic {
            id: state.topics.len() as i64 + 1,
            name: name.to_string(),
            user: user.clone(),
            created_at: Utc::now(),
        };
        state.topics.push(topic.clone());
        Ok(topic)
    }

    fn insert_flashcard(
        &self,
        topic: TopicRef,
        user: &UserRef,
        question: &str,
        answer: &str,
    ) -> Result<PersistedFlashcard, StoreError> {
        let mut state = self.lock();
        let owner = state
            .topics
            .iter()
            .find(|t| t.id == topic.id)
            .map(|t| t.user.clone())
            .ok_or(StoreError::TopicNotFound { id: topic.id })?;
        if &owner != user {
            return Err(StoreError::TopicOwnership {
                id: topic.id,
                owner: owner.0,
                user: user.to_string(),
            });
        }

        let card = PersistedFlashcard {
            id: state.flashcards.len() as i64 + 1,
            topic_id: topic.id,
            user: user.clone(),
            question: question.to_string(),
            answer: answer.to_string(),
            created_at: Utc::now(),
        };
        state.flashcards.push(card.clone());
        Ok(card)
    }
}

impl FlashcardStore for MemoryStore {
    fn create_topic<'a>(
        &'a self,
        user: &'a UserRef,
        name: &'a str,
    ) -> BoxFuture<'a, Result<Topic, StoreError>> {
        Box::pin(async move { self.insert_topic(user, name) })
    }

    fn create_flashcard<'a>(
        &'a self,
        topic: TopicRef,
        user: &'a UserRef,
        question: &'a str,
        answer: &'a str,
    ) -> BoxFuture<'a, Result<PersistedFlashcard, StoreError>> {
        Box::pin(async move { self.insert_flashcard(topic, user, question, answer) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_assigns_sequential_ids() {
        let store = MemoryStore::new();
        let ada = UserRef::new("ada");
        let topic = store.create_topic(&ada, "Geography").await.unwrap();
        assert_eq!(topic.id, 1);
        assert_eq!(topic.user, ada);

        let a = store.create_flashcard(topic.reference(), &ada, "Q1", "A1").await.unwrap();
        let b = store.create_flashcard(topic.reference(), &ada, "Q2", "A2").await.unwrap();
        assert_eq!((a.id, b.id), (1, 2));
        assert_eq!(store.flashcards_for_topic(topic.reference()).len(), 2);
    }

    #[tokio::test]
    async fn memory_store_rejects_unknown_topic() {
        let store = MemoryStore::new();
        let err = store
            .create_flashcard(TopicRef { id: 42 }, &UserRef::new("ada"), "Q", "A")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::TopicNotFound { id: 42 }));
        assert!(store.flashcards().is_empty());
    }

    #[tokio::test]
    async fn memory_store_rejects_foreign_topic() {
        let store = MemoryStore::new();
        let topic = store.create_topic(&UserRef::new("ada"), "Maths").await.unwrap();
        let err = store
            .create_flashcard(topic.reference(), &UserRef::new("bob"), "Q", "A")
            .await
            .unwrap_err();
        match err {
            StoreError::TopicOwnership { owner, user, .. } => {
                assert_eq!(owner, "ada");
                assert_eq!(user, "bob");
            }
            other => panic!("expected TopicOwnership, got {other:?}"),
        }
    }

    #[test]
    fn topic_name_validation() {
        assert!(validate_topic_name("History").is_ok());
        assert!(validate_topic_name("   ").is_err());
        assert!(validate_topic_name(&"x".repeat(MAX_TOPIC_NAME_CHARS)).is_ok());
        assert!(validate_topic_name(&"x".repeat(MAX_TOPIC_NAME_CHARS + 1)).is_err());
    }
}
