//! Configuration types for flashcard generation.
//!
//! All pipeline behaviour is controlled through [`GenerationConfig`], built
//! via [`GenerationConfigBuilder`]. Model credentials travel inside
//! [`ModelConfig`] and are handed to the pipeline explicitly; the library
//! never reads API keys from the environment on its own.

use crate::error::FlashcardError;
use crate::media::DEFAULT_SNIFF_WINDOW;
use crate::progress::ProgressCallback;
use std::fmt;
use std::path::PathBuf;

/// Upload size ceiling: 10 MiB.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// How many times the upload limit extracted text may grow to when
/// [`GenerationConfigBuilder::max_extracted_bytes`] is not set.
pub const EXTRACTED_BYTES_FACTOR: u64 = 4;

/// Extracted-text ceiling for the default upload limit: 40 MiB.
pub const DEFAULT_MAX_EXTRACTED_BYTES: u64 = DEFAULT_MAX_FILE_SIZE * EXTRACTED_BYTES_FACTOR;

/// Model used when none is configured.
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Google Generative Language API root.
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Smallest and largest accepted sniff windows, in bytes.
pub const SNIFF_WINDOW_RANGE: std::ops::RangeInclusive<usize> = 2048..=4096;

/// Credentials and model selection for the generative-model collaborator.
#[derive(Clone)]
pub struct ModelConfig {
    /// Provider API key. Never printed by `Debug`.
    pub api_key: String,

    /// Model identifier, e.g. `gemini-2.0-flash`.
    pub model_name: String,

    /// REST endpoint root. Override for proxies or local fakes.
    pub base_url: String,

    /// Sampling temperature. `None` keeps the provider default.
    pub temperature: Option<f32>,
}

impl ModelConfig {
    pub fn new(api_key: impl Into<String>, model_name: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model_name: model_name.into(),
            ..Self::default()
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_temperature(mut self, t: f32) -> Self {
        self.temperature = Some(t.clamp(0.0, 2.0));
        self
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model_name: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            temperature: None,
        }
    }
}

impl fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let key = if self.api_key.is_empty() {
            "<unset>"
        } else {
            "<redacted>"
        };
        f.debug_struct("ModelConfig")
            .field("api_key", &key)
            .field("model_name", &self.model_name)
            .field("base_url", &self.base_url)
            .field("temperature", &self.temperature)
            .finish()
    }
}

/// Configuration for a [`crate::FlashcardPipeline`].
///
/// # Example
/// ```rust
/// use edgequake_flashcards::{GenerationConfig, ModelConfig};
///
/// let config = GenerationConfig::builder()
///     .model(ModelConfig::new("my-key", "gemini-2.0-flash"))
///     .max_file_size(5 * 1024 * 1024)
///     .model_timeout_secs(60)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_file_size, 5 * 1024 * 1024);
/// ```
#[derive(Clone)]
pub struct GenerationConfig {
    /// Largest accepted upload in bytes. Default: 10 MiB.
    ///
    /// An upload of exactly this size is accepted; one byte more is rejected
    /// before anything touches the disk.
    pub max_file_size: u64,

    /// Largest amount of decoded document data extraction may produce.
    /// Default: 4 × `max_file_size`.
    ///
    /// Compressed containers (DOCX parts, PDF content streams) can inflate far
    /// beyond the upload size. Exceeding this fails the extract stage.
    pub max_extracted_bytes: u64,

    /// Leading bytes inspected for media-type detection. Range: 2048–4096.
    /// Default: 4096.
    pub sniff_window: usize,

    /// Timeout for the model call in seconds. Default: none.
    pub model_timeout_secs: Option<u64>,

    /// Directory for temporary upload files. Default: the OS temp dir.
    pub staging_dir: Option<PathBuf>,

    /// Fail the extract stage when the document yields only whitespace.
    /// Default: false (the model is prompted with empty content).
    pub reject_blank_text: bool,

    /// Model credentials used by [`crate::FlashcardPipeline::with_gemini`].
    pub model: ModelConfig,

    /// Stage progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            max_extracted_bytes: DEFAULT_MAX_EXTRACTED_BYTES,
            sniff_window: DEFAULT_SNIFF_WINDOW,
            model_timeout_secs: None,
            staging_dir: None,
            reject_blank_text: false,
            model: ModelConfig::default(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for GenerationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationConfig")
            .field("max_file_size", &self.max_file_size)
            .field("max_extracted_bytes", &self.max_extracted_bytes)
            .field("sniff_window", &self.sniff_window)
            .field("model_timeout_secs", &self.model_timeout_secs)
            .field("staging_dir", &self.staging_dir)
            .field("reject_blank_text", &self.reject_blank_text)
            .field("model", &self.model)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn GenerationProgressCallback>"),
            )
            .finish()
    }
}

impl GenerationConfig {
    pub fn builder() -> GenerationConfigBuilder {
        GenerationConfigBuilder {
            config: Self::default(),
            max_extracted_bytes: None,
        }
    }
}

/// Builder for [`GenerationConfig`].
#[derive(Debug)]
pub struct GenerationConfigBuilder {
    config: GenerationConfig,
    max_extracted_bytes: Option<u64>,
}

impl GenerationConfigBuilder {
    pub fn max_file_size(mut self, bytes: u64) -> Self {
        self.config.max_file_size = bytes;
        self
    }

    pub fn max_extracted_bytes(mut self, bytes: u64) -> Self {
        self.max_extracted_bytes = Some(bytes);
        self
    }

    pub fn sniff_window(mut self, bytes: usize) -> Self {
        self.config.sniff_window = bytes;
        self
    }

    pub fn model_timeout_secs(mut self, secs: u64) -> Self {
        self.config.model_timeout_secs = Some(secs);
        self
    }

    pub fn staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.staging_dir = Some(dir.into());
        self
    }

    pub fn reject_blank_text(mut self, v: bool) -> Self {
        self.config.reject_blank_text = v;
        self
    }

    pub fn model(mut self, model: ModelConfig) -> Self {
        self.config.model = model;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(mut self) -> Result<GenerationConfig, FlashcardError> {
        let derived = self.config.max_file_size.saturating_mul(EXTRACTED_BYTES_FACTOR);
        self.config.max_extracted_bytes = self.max_extracted_bytes.unwrap_or(derived);

        let c = &self.config;
        if c.max_file_size == 0 {
            return Err(FlashcardError::InvalidConfig(
                "max_file_size must be ≥ 1 byte".into(),
            ));
        }
        if c.max_extracted_bytes == 0 {
            return Err(FlashcardError::InvalidConfig(
                "max_extracted_bytes must be ≥ 1 byte".into(),
            ));
        }
        if !SNIFF_WINDOW_RANGE.contains(&c.sniff_window) {
            return Err(FlashcardError::InvalidConfig(format!(
                "sniff_window must be 2048–4096 bytes, got {}",
                c.sniff_window
            )));
        }
        if c.model_timeout_secs == Some(0) {
            return Err(FlashcardError::InvalidConfig(
                "model_timeout_secs must be ≥ 1".into(),
            ));
        }
        if c.model.model_name.trim().is_empty() {
            return Err(FlashcardError::InvalidConfig(
                "model_name must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}
