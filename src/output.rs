//! Data types produced and consumed by the flashcard pipeline.

use crate::media::MediaType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Plain text pulled out of an upload, tagged with the format it came from.
///
/// Lives only for the duration of one pipeline run; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedDocument {
    pub text: String,
    pub media_type: MediaType,
}

impl ExtractedDocument {
    pub fn new(text: impl Into<String>, media_type: MediaType) -> Self {
        Self {
            text: text.into(),
            media_type,
        }
    }

    /// Number of Unicode scalar values in the text.
    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// A question/answer pair parsed from the model reply, not yet persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlashcardDraft {
    pub question: String,
    pub answer: String,
}

impl FlashcardDraft {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
        }
    }
}

/// The user a topic or flashcard belongs to.
///
/// Identity is verified by the caller before the pipeline runs; the pipeline
/// only passes it through to the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserRef(pub String);

impl UserRef {
    pub fn new(username: impl Into<String>) -> Self {
        Self(username.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Handle to an existing topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TopicRef {
    pub id: i64,
}

/// A named group of flashcards owned by one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    pub id: i64,
    pub name: String,
    pub user: UserRef,
    pub created_at: DateTime<Utc>,
}

impl Topic {
    pub fn reference(&self) -> TopicRef {
        TopicRef { id: self.id }
    }
}

/// A flashcard accepted by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedFlashcard {
    pub id: i64,
    pub topic_id: i64,
    pub user: UserRef,
    pub question: String,
    pub answer: String,
    pub created_at: DateTime<Utc>,
}
