//! # edgequake-flashcards
//!
//! Turn uploaded study material (plain text, PDF, Word) into question/answer
//! flashcards with a generative model, and persist them under a user's topic.
//!
//! ## Why this crate?
//!
//! Uploads are untrusted and model replies are unreliable. The crate
//! identifies formats from content rather than file extension, prompts the
//! model for a strict JSON shape, tolerates the markdown fence models add
//! anyway, and rejects anything else instead of guessing. Temporary files are
//! cleaned up on every exit path, and every failure says which stage produced
//! it.
//!
//! ## Pipeline Overview
//!
//! ```text
//! upload (bytes + declared content type)
//!  │
//!  ├─ 1. Validate  size ceiling (10 MiB default)
//!  ├─ 2. Stage     scoped temporary file, removed on drop
//!  ├─ 3. Extract   content sniffing + text/PDF/DOCX extraction (spawn_blocking)
//!  ├─ 4. Model     one prompt → one reply (Gemini or any edgequake-llm provider)
//!  ├─ 5. Parse     strip ```json fence, strict JSON array of {question, answer}
//!  └─ 6. Persist   one flashcard at a time under the caller's topic and user
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_flashcards::{FlashcardPipeline, GenerationConfig, ModelConfig, SqliteStore, UserRef};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = GenerationConfig::builder()
//!         .model(ModelConfig::new(std::env::var("GEMINI_API_KEY")?, "gemini-2.0-flash"))
//!         .build()?;
//!     let store = Arc::new(SqliteStore::open("flashcards.db".as_ref())?);
//!     let pipeline = FlashcardPipeline::with_gemini(config, store)?;
//!
//!     let bytes = std::fs::read("notes.pdf")?;
//!     let user = UserRef::new("ada");
//!     let (topic, cards) = pipeline
//!         .run_for_new_topic(&bytes, "application/pdf", "Geography", &user)
//!         .await?;
//!     for card in cards {
//!         println!("[{}] {} → {}", topic.name, card.question, card.answer);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `flashcards` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-flashcards = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod generate;
pub mod media;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod store;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{GenerationConfig, GenerationConfigBuilder, ModelConfig};
pub use error::{FlashcardError, PipelineError, Stage};
pub use generate::{inspect, FlashcardPipeline};
pub use media::{detect, sniff, MediaType};
pub use output::{ExtractedDocument, FlashcardDraft, PersistedFlashcard, Topic, TopicRef, UserRef};
pub use pipeline::extract::{extract, extract_limited, extract_path};
pub use pipeline::llm::{GeminiModel, GenerativeModel, ProviderModel};
pub use pipeline::parse::{parse_flashcards, strip_code_fence};
pub use progress::{GenerationProgressCallback, NoopProgressCallback, ProgressCallback};
pub use prompts::build_prompt;
pub use store::{FlashcardStore, MemoryStore, SqliteStore, StoreError};
