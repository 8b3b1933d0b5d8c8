//! Error types for the edgequake-flashcards library.
//!
//! Two layers reflect two questions a caller asks about a failure:
//!
//! * [`FlashcardError`]: **what** went wrong (oversized upload, unsupported
//!   format, garbage from the model, database refused the insert). Every
//!   component returns this type.
//!
//! * [`PipelineError`]: **where** it went wrong. The orchestrator wraps each
//!   component failure with the [`Stage`] that produced it, so a request
//!   handler can tell "bad upload" from "AI provider unavailable" from "AI
//!   returned garbage" by matching on `stage` instead of parsing messages.

use crate::media::MediaType;
use crate::store::StoreError;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the flashcard components.
#[derive(Debug, Error)]
pub enum FlashcardError {
    // ── Upload errors ─────────────────────────────────────────────────────
    /// The upload exceeds the configured size ceiling.
    #[error("File too large: {actual} bytes (limit is {limit} bytes)")]
    FileTooLarge { actual: u64, limit: u64 },

    /// The detected (or declared) media type has no extractor.
    #[error("Unsupported file type: '{media_type}'\nSupported: text/plain, application/pdf, .docx")]
    UnsupportedType { media_type: String },

    // ── Extraction errors ─────────────────────────────────────────────────
    /// A format-specific extractor could not read the document.
    #[error("Failed to extract text from {media_type} document: {detail}")]
    Extraction {
        media_type: MediaType,
        detail: String,
    },

    /// Plain text was not valid UTF-8.
    #[error("Text is not valid UTF-8 (first invalid byte at offset {valid_up_to})")]
    Decode { valid_up_to: usize },

    // ── Model errors ──────────────────────────────────────────────────────
    /// The model reply does not match the required JSON shape.
    #[error("Malformed model response: {reason}\nResponse began with: {excerpt:?}")]
    MalformedResponse { reason: String, excerpt: String },

    /// The transport or provider failed.
    #[error("Model call to '{model}' failed: {detail}")]
    ModelCall { model: String, detail: String },

    /// The model call exceeded the configured timeout.
    #[error("Model call to '{model}' timed out after {secs}s")]
    ModelTimeout { model: String, secs: u64 },

    /// The configured provider could not be constructed (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Persistence errors ────────────────────────────────────────────────
    /// Delegated failure from the persistence collaborator.
    #[error("Persistence failed: {0}")]
    Persistence(#[from] StoreError),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Reading or writing a local file failed.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error (e.g. a blocking task panicked).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// The pipeline step in which a failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Upload validation (size ceiling).
    Validate,
    /// Writing the upload to its temporary file.
    Stage,
    /// Media-type detection and text extraction.
    Extract,
    /// Prompting the generative model.
    Model,
    /// Parsing the model reply.
    Parse,
    /// Persisting flashcards.
    Persist,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Validate => "validate",
            Stage::Stage => "stage",
            Stage::Extract => "extract",
            Stage::Model => "model",
            Stage::Parse => "parse",
            Stage::Persist => "persist",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A [`FlashcardError`] tagged with the [`Stage`] that raised it.
///
/// Returned by every [`crate::FlashcardPipeline`] entry point.
#[derive(Debug, Error)]
#[error("Flashcard generation failed at stage '{stage}': {cause}")]
pub struct PipelineError {
    pub stage: Stage,
    #[source]
    pub cause: FlashcardError,
}

impl PipelineError {
    pub fn new(stage: Stage, cause: FlashcardError) -> Self {
        Self { stage, cause }
    }
}
