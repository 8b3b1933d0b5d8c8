//! Flashcard generation entry points.
//!
//! [`FlashcardPipeline`] drives one upload through every stage:
//!
//! ```text
//! validate ──▶ stage ──▶ extract ──▶ model ──▶ parse ──▶ persist
//! ```
//!
//! A run executes to completion before returning; there is no background
//! queue. The staged temporary file is owned by the run and removed on every
//! exit path. Failures come back as a [`PipelineError`] naming the stage, so
//! callers can tell "bad upload" from "model unavailable" from "model
//! returned garbage" without parsing messages.
//!
//! Persistence is not transactional: if the store rejects the third of five
//! flashcards, the first two stay persisted and the run fails at `persist`.

use crate::config::GenerationConfig;
use crate::error::{FlashcardError, PipelineError, Stage};
use crate::output::{ExtractedDocument, PersistedFlashcard, Topic, TopicRef, UserRef};
use crate::pipeline::extract;
use crate::pipeline::llm::{GeminiModel, GenerativeModel};
use crate::pipeline::parse;
use crate::pipeline::staging::StagedUpload;
use crate::progress::GenerationProgressCallback;
use crate::prompts;
use crate::store::FlashcardStore;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Generates flashcards from uploaded documents.
///
/// `Send + Sync`; share one behind an `Arc` across request handlers.
/// Concurrent runs are independent.
pub struct FlashcardPipeline {
    config: GenerationConfig,
    model: Arc<dyn GenerativeModel>,
    store: Arc<dyn FlashcardStore>,
}

impl FlashcardPipeline {
    pub fn new(
        config: GenerationConfig,
        model: Arc<dyn GenerativeModel>,
        store: Arc<dyn FlashcardStore>,
    ) -> Self {
        Self {
            config,
            model,
            store,
        }
    }

    /// Build a pipeline that calls Gemini with `config.model`.
    ///
    /// # Errors
    /// [`FlashcardError::ProviderNotConfigured`] when no API key is set.
    pub fn with_gemini(
        config: GenerationConfig,
        store: Arc<dyn FlashcardStore>,
    ) -> Result<Self, FlashcardError> {
        let model = GeminiModel::new(config.model.clone())?;
        Ok(Self::new(config, Arc::new(model), store))
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    pub fn model(&self) -> &Arc<dyn GenerativeModel> {
        &self.model
    }

    pub fn store(&self) -> &Arc<dyn FlashcardStore> {
        &self.store
    }

    /// Generate and persist flashcards for one upload.
    ///
    /// # Arguments
    /// * `bytes`: the uploaded file
    /// * `declared`: content type claimed by the client; consulted only
    ///   when content sniffing is ambiguous
    /// * `topic`: existing topic owned by `user`
    /// * `user`: already-authenticated owner
    ///
    /// # Returns
    /// The persisted flashcards in the order the model produced them. An
    /// empty array from the model yields `Ok(vec![])`.
    pub async fn run(
        &self,
        bytes: &[u8],
        declared: &str,
        topic: TopicRef,
        user: &UserRef,
    ) -> Result<Vec<PersistedFlashcard>, PipelineError> {
        let total_start = Instant::now();
        info!(
            "Starting flashcard run: {} bytes (declared '{}') for topic {} / user '{}'",
            bytes.len(),
            declared,
            topic.id,
            user
        );

        // ── Steps 1-3: Validate, stage, extract ──────────────────────────────
        let (staged, document) = stage_and_extract(&self.config, bytes, declared).await?;

        // ── Step 4: Prompt the model ─────────────────────────────────────────
        notify(&self.config, |cb| cb.on_stage_start(Stage::Model));
        let prompt = prompts::build_prompt(&document.text);
        let model_start = Instant::now();
        let reply = self
            .call_model(&prompt)
            .await
            .map_err(|e| fail(&self.config, Stage::Model, e))?;
        debug!(
            "Model '{}' replied with {} chars in {:?}",
            self.model.model_name(),
            reply.len(),
            model_start.elapsed()
        );
        notify(&self.config, |cb| cb.on_stage_complete(Stage::Model));

        // ── Step 5: Parse the reply ──────────────────────────────────────────
        notify(&self.config, |cb| cb.on_stage_start(Stage::Parse));
        let drafts =
            parse::parse_flashcards(&reply).map_err(|e| fail(&self.config, Stage::Parse, e))?;
        info!("Model produced {} flashcards", drafts.len());
        notify(&self.config, |cb| cb.on_stage_complete(Stage::Parse));

        // ── Step 6: Persist, one card at a time ──────────────────────────────
        notify(&self.config, |cb| cb.on_stage_start(Stage::Persist));
        let total = drafts.len();
        let mut saved = Vec::with_capacity(total);
        for (i, draft) in drafts.iter().enumerate() {
            let card = self
                .store
                .create_flashcard(topic, user, &draft.question, &draft.answer)
                .await
                .map_err(|e| {
                    if !saved.is_empty() {
                        warn!(
                            "{} of {} flashcards were persisted before the store failed",
                            saved.len(),
                            total
                        );
                    }
                    fail(&self.config, Stage::Persist, e.into())
                })?;
            saved.push(card);
            notify(&self.config, |cb| cb.on_flashcard_saved(i + 1, total));
        }
        notify(&self.config, |cb| cb.on_stage_complete(Stage::Persist));

        staged.remove();
        notify(&self.config, |cb| cb.on_run_complete(saved.len()));
        info!(
            "Flashcard run complete: {} saved to topic {} in {:?}",
            saved.len(),
            topic.id,
            total_start.elapsed()
        );
        Ok(saved)
    }

    /// [`run`](Self::run) on a local file.
    ///
    /// The size limit is checked against file metadata before reading.
    pub async fn run_file(
        &self,
        path: &Path,
        declared: &str,
        topic: TopicRef,
        user: &UserRef,
    ) -> Result<Vec<PersistedFlashcard>, PipelineError> {
        let bytes = read_input(&self.config, path).await?;
        self.run(&bytes, declared, topic, user).await
    }

    /// Create a topic named `topic_name`, then [`run`](Self::run) into it.
    ///
    /// The topic is created first and is not removed if the run fails.
    pub async fn run_for_new_topic(
        &self,
        bytes: &[u8],
        declared: &str,
        topic_name: &str,
        user: &UserRef,
    ) -> Result<(Topic, Vec<PersistedFlashcard>), PipelineError> {
        let topic = self
            .store
            .create_topic(user, topic_name)
            .await
            .map_err(|e| fail(&self.config, Stage::Persist, e.into()))?;
        info!("Created topic {} '{}' for user '{}'", topic.id, topic.name, user);

        let cards = self.run(bytes, declared, topic.reference(), user).await?;
        Ok((topic, cards))
    }

    /// Detect and extract without calling the model. See [`inspect`].
    pub async fn inspect(
        &self,
        bytes: &[u8],
        declared: &str,
    ) -> Result<ExtractedDocument, PipelineError> {
        inspect(&self.config, bytes, declared).await
    }

    async fn call_model(&self, prompt: &str) -> Result<String, FlashcardError> {
        let call = self.model.generate(prompt);
        match self.config.model_timeout_secs {
            None => call.await,
            Some(secs) => tokio::time::timeout(Duration::from_secs(secs), call)
                .await
                .map_err(|_| FlashcardError::ModelTimeout {
                    model: self.model.model_name().to_string(),
                    secs,
                })?,
        }
    }
}

/// Run the validate, stage, and extract stages only.
///
/// Needs no model or store, so it works without credentials. The staged
/// file is removed before returning.
pub async fn inspect(
    config: &GenerationConfig,
    bytes: &[u8],
    declared: &str,
) -> Result<ExtractedDocument, PipelineError> {
    let (staged, document) = stage_and_extract(config, bytes, declared).await?;
    staged.remove();
    Ok(document)
}

/// Read a local file for a run, rejecting it by metadata if it is too large.
pub async fn read_input(config: &GenerationConfig, path: &Path) -> Result<Vec<u8>, PipelineError> {
    let io_error = |source| FlashcardError::Io {
        path: path.to_path_buf(),
        source,
    };

    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|e| fail(config, Stage::Validate, io_error(e)))?;
    check_size(config, meta.len())?;

    tokio::fs::read(path)
        .await
        .map_err(|e| fail(config, Stage::Validate, io_error(e)))
}

fn check_size(config: &GenerationConfig, len: u64) -> Result<(), PipelineError> {
    let limit = config.max_file_size;
    if len > limit {
        return Err(fail(
            config,
            Stage::Validate,
            FlashcardError::FileTooLarge { actual: len, limit },
        ));
    }
    Ok(())
}

async fn stage_and_extract(
    config: &GenerationConfig,
    bytes: &[u8],
    declared: &str,
) -> Result<(StagedUpload, ExtractedDocument), PipelineError> {
    // ── Step 1: Validate ─────────────────────────────────────────────────────
    notify(config, |cb| cb.on_stage_start(Stage::Validate));
    check_size(config, bytes.len() as u64)?;
    notify(config, |cb| cb.on_stage_complete(Stage::Validate));

    // ── Step 2: Stage to a temporary file ────────────────────────────────────
    notify(config, |cb| cb.on_stage_start(Stage::Stage));
    let owned = bytes.to_vec();
    let dir = config.staging_dir.clone();
    let staged = blocking(move || StagedUpload::write(&owned, dir.as_deref()))
        .await
        .map_err(|e| fail(config, Stage::Stage, e))?;
    notify(config, |cb| cb.on_stage_complete(Stage::Stage));

    // ── Step 3: Detect and extract ───────────────────────────────────────────
    // From here on an early return drops `staged`, which deletes the file.
    notify(config, |cb| cb.on_stage_start(Stage::Extract));
    let document = extract::detect_and_extract(
        staged.path(),
        declared,
        config.sniff_window,
        config.max_extracted_bytes,
    )
    .await
    .map_err(|e| fail(config, Stage::Extract, e))?;

    if config.reject_blank_text && document.is_blank() {
        return Err(fail(
            config,
            Stage::Extract,
            FlashcardError::Extraction {
                media_type: document.media_type.clone(),
                detail: "document contains no text".to_string(),
            },
        ));
    }
    info!(
        "Extracted {} chars of {} text",
        document.char_count(),
        document.media_type
    );
    notify(config, |cb| cb.on_stage_complete(Stage::Extract));

    Ok((staged, document))
}

/// Run blocking `f` on the blocking pool.
async fn blocking<T, F>(f: F) -> Result<T, FlashcardError>
where
    F: FnOnce() -> Result<T, FlashcardError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| FlashcardError::Internal(format!("Blocking task failed: {}", e)))?
}

fn notify(config: &GenerationConfig, event: impl FnOnce(&dyn GenerationProgressCallback)) {
    if let Some(ref cb) = config.progress_callback {
        event(cb.as_ref());
    }
}

/// Tag `cause` with `stage`, logging and reporting it on the way out.
fn fail(config: &GenerationConfig, stage: Stage, cause: FlashcardError) -> PipelineError {
    warn!("Flashcard run failed at stage '{}': {}", stage, cause);
    notify(config, |cb| cb.on_stage_error(stage, &cause.to_string()));
    PipelineError::new(stage, cause)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MediaType;
    use crate::store::MemoryStore;
    use futures::future::BoxFuture;

    struct FixedReply(&'static str);

    impl GenerativeModel for FixedReply {
        fn model_name(&self) -> &str {
            "fixed"
        }

        fn generate<'a>(
            &'a self,
            _prompt: &'a str,
        ) -> BoxFuture<'a, Result<String, FlashcardError>> {
            Box::pin(async move { Ok::<_, FlashcardError>(self.0.to_string()) })
        }
    }

    fn pipeline_with(
        reply: &'static str,
        config: GenerationConfig,
    ) -> (FlashcardPipeline, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let pipeline = FlashcardPipeline::new(config, Arc::new(FixedReply(reply)), store.clone());
        (pipeline, store)
    }

    #[tokio::test]
    async fn run_for_new_topic_creates_topic_and_cards() {
        let (pipeline, store) = pipeline_with(
            r#"[{"question": "What is the capital of France?", "answer": "Paris"}]"#,
            GenerationConfig::default(),
        );
        let ada = UserRef::new("ada");
        let (topic, cards) = pipeline
            .run_for_new_topic(b"Paris is the capital of France.", "text/plain", "Geography", &ada)
            .await
            .unwrap();

        assert_eq!(topic.name, "Geography");
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].topic_id, topic.id);
        assert_eq!(store.topics().len(), 1);
    }

    #[tokio::test]
    async fn topic_survives_failed_run() {
        let (pipeline, store) = pipeline_with("not json", GenerationConfig::default());
        let err = pipeline
            .run_for_new_topic(b"some text", "text/plain", "Kept", &UserRef::new("ada"))
            .await
            .unwrap_err();
        assert_eq!(err.stage, Stage::Parse);
        assert_eq!(store.topics().len(), 1);
        assert!(store.flashcards().is_empty());
    }

    #[tokio::test]
    async fn blank_text_is_rejected_when_configured() {
        let config = GenerationConfig::builder().reject_blank_text(true).build().unwrap();
        let (pipeline, _) = pipeline_with("[]", config);
        let err = pipeline.inspect(b"   \n\t", "text/plain").await.unwrap_err();
        assert_eq!(err.stage, Stage::Extract);
    }

    #[tokio::test]
    async fn blank_text_passes_by_default() {
        let doc = inspect(&GenerationConfig::default(), b"  \n", "text/plain").await.unwrap();
        assert_eq!(doc.media_type, MediaType::PlainText);
        assert!(doc.is_blank());
    }

    #[tokio::test]
    async fn empty_reply_array_saves_nothing() {
        let (pipeline, store) = pipeline_with("[]", GenerationConfig::default());
        let topic = store.create_topic(&UserRef::new("ada"), "T").await.unwrap();
        let cards = pipeline
            .run(b"text", "text/plain", topic.reference(), &UserRef::new("ada"))
            .await
            .unwrap();
        assert!(cards.is_empty());
    }

    #[tokio::test]
    async fn read_input_rejects_oversized_file_by_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.txt");
        std::fs::write(&path, vec![b'a'; 4096]).unwrap();

        let config = GenerationConfig::builder().max_file_size(4095).build().unwrap();
        let err = read_input(&config, &path).await.unwrap_err();
        assert_eq!(err.stage, Stage::Validate);
        assert!(matches!(
            err.cause,
            FlashcardError::FileTooLarge {
                actual: 4096,
                limit: 4095
            }
        ));
    }

    #[tokio::test]
    async fn read_input_missing_file_is_validate_io_error() {
        let err = read_input(&GenerationConfig::default(), Path::new("/no/such/upload.txt"))
            .await
            .unwrap_err();
        assert_eq!(err.stage, Stage::Validate);
        assert!(matches!(err.cause, FlashcardError::Io { .. }));
    }
}
