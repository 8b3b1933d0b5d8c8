//! Generative-model collaborator: one prompt in, one reply string out.
//!
//! The pipeline only sees [`GenerativeModel`]. Two implementations ship with
//! the crate:
//!
//! * [`GeminiModel`] talks to the Google Generative Language REST API
//!   (`models/{model}:generateContent`) directly over `reqwest`.
//! * [`ProviderModel`] adapts any `edgequake_llm` [`LLMProvider`] (OpenAI,
//!   Anthropic, Ollama, ...).
//!
//! Tests substitute their own implementation. Nothing here retries: a failed
//! call fails the run.

use crate::config::ModelConfig;
use crate::error::FlashcardError;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// A text-generation backend.
///
/// Object-safe so the pipeline can hold an `Arc<dyn GenerativeModel>`.
pub trait GenerativeModel: Send + Sync {
    /// Model identifier used in logs and errors.
    fn model_name(&self) -> &str;

    /// Send `prompt` and return the raw reply text.
    fn generate<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, Result<String, FlashcardError>>;
}

// ── Gemini REST ──────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<RequestContent<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationSettings>,
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    role: &'a str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct GenerationSettings {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ReplyPart>,
}

#[derive(Debug, Deserialize)]
struct ReplyPart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

fn build_request<'a>(prompt: &'a str, temperature: Option<f32>) -> GenerateContentRequest<'a> {
    GenerateContentRequest {
        contents: vec![RequestContent {
            role: "user",
            parts: vec![RequestPart { text: prompt }],
        }],
        generation_config: temperature.map(|temperature| GenerationSettings { temperature }),
    }
}

/// Concatenate the text parts of the first candidate.
fn reply_text(response: GenerateContentResponse) -> Result<String, String> {
    let Some(candidate) = response.candidates.into_iter().next() else {
        let reason = response
            .prompt_feedback
            .and_then(|f| f.block_reason)
            .unwrap_or_else(|| "unknown".to_string());
        return Err(format!("response contained no candidates (block reason: {})", reason));
    };

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.is_empty() {
        if let Some(reason) = candidate.finish_reason {
            debug!("Gemini candidate has no text (finish reason: {})", reason);
        }
    }
    Ok(text)
}

/// Google Gemini over the Generative Language REST API.
pub struct GeminiModel {
    client: Client,
    config: ModelConfig,
}

impl GeminiModel {
    /// Create a client for `config`. Fails when no API key is set.
    pub fn new(config: ModelConfig) -> Result<Self, FlashcardError> {
        Self::with_client(Client::new(), config)
    }

    /// Like [`GeminiModel::new`] with a caller-supplied `reqwest` client
    /// (proxies, custom TLS, connection pooling shared with the host app).
    pub fn with_client(client: Client, config: ModelConfig) -> Result<Self, FlashcardError> {
        if config.api_key.trim().is_empty() {
            return Err(FlashcardError::ProviderNotConfigured {
                provider: "gemini".to_string(),
                hint: "No API key configured. Set GEMINI_API_KEY or pass --api-key.".to_string(),
            });
        }
        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model_name
        )
    }

    fn call_failed(&self, detail: String) -> FlashcardError {
        FlashcardError::ModelCall {
            model: self.config.model_name.clone(),
            detail,
        }
    }

    async fn call(&self, prompt: &str) -> Result<String, FlashcardError> {
        let start = Instant::now();
        let request = build_request(prompt, self.config.temperature);

        debug!(
            "Requesting completion from {} for {} prompt chars",
            self.config.model_name,
            prompt.len()
        );

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.call_failed(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(self.call_failed(format!("HTTP {}: {}", status, error_text)));
        }

        let body: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| self.call_failed(format!("unreadable response body: {}", e)))?;

        let text = reply_text(body).map_err(|detail| self.call_failed(detail))?;
        debug!(
            "{} replied with {} chars in {:?}",
            self.config.model_name,
            text.len(),
            start.elapsed()
        );
        Ok(text)
    }
}

impl GenerativeModel for GeminiModel {
    fn model_name(&self) -> &str {
        &self.config.model_name
    }

    fn generate<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, Result<String, FlashcardError>> {
        Box::pin(self.call(prompt))
    }
}

// ── edgequake-llm adapter ────────────────────────────────────────────────────

/// Any `edgequake_llm` provider as a [`GenerativeModel`].
pub struct ProviderModel {
    provider: Arc<dyn LLMProvider>,
    model: String,
    temperature: Option<f32>,
}

impl ProviderModel {
    /// Wrap a pre-built provider. `model` is only used for logs and errors.
    pub fn new(provider: Arc<dyn LLMProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: None,
        }
    }

    /// Instantiate a named provider (`"openai"`, `"anthropic"`, `"ollama"`, ...)
    /// through [`ProviderFactory::create_llm_provider`], which reads that
    /// provider's API key from its usual environment variable.
    pub fn from_factory(provider_name: &str, model: &str) -> Result<Self, FlashcardError> {
        let provider = ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
            FlashcardError::ProviderNotConfigured {
                provider: provider_name.to_string(),
                hint: format!("{e}"),
            }
        })?;
        Ok(Self::new(provider, model))
    }

    pub fn with_temperature(mut self, t: f32) -> Self {
        self.temperature = Some(t.clamp(0.0, 2.0));
        self
    }

    fn build_options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: self.temperature,
            ..Default::default()
        }
    }

    async fn call(&self, prompt: &str) -> Result<String, FlashcardError> {
        let start = Instant::now();
        let messages = vec![ChatMessage::user(prompt)];
        let options = self.build_options();

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| FlashcardError::ModelCall {
                model: self.model.clone(),
                detail: format!("{}", e),
            })?;

        debug!(
            "{}: {} input tokens, {} output tokens, {:?}",
            self.model,
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );
        Ok(response.content)
    }
}

impl GenerativeModel for ProviderModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn generate<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, Result<String, FlashcardError>> {
        Box::pin(self.call(prompt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_body_matches_generate_content_shape() {
        let body = serde_json::to_value(build_request("Hello", Some(0.2))).unwrap();
        assert_eq!(
            body,
            json!({
                "contents": [{"role": "user", "parts": [{"text": "Hello"}]}],
                "generationConfig": {"temperature": 0.2f32}
            })
        );
    }

    #[test]
    fn request_body_omits_generation_config_by_default() {
        let body = serde_json::to_value(build_request("Hello", None)).unwrap();
        assert!(body.get("generationConfig").is_none());
    }

    #[test]
    fn reply_text_joins_parts_of_first_candidate() {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [
                {"content": {"role": "model", "parts": [{"text": "[{\"question\":"}, {"text": "\"Q\",\"answer\":\"A\"}]"}]},
                 "finishReason": "STOP"},
                {"content": {"parts": [{"text": "ignored"}]}}
            ],
            "usageMetadata": {"promptTokenCount": 10}
        }))
        .unwrap();
        assert_eq!(
            reply_text(response).unwrap(),
            "[{\"question\":\"Q\",\"answer\":\"A\"}]"
        );
    }

    #[test]
    fn reply_text_reports_block_reason() {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "promptFeedback": {"blockReason": "SAFETY"}
        }))
        .unwrap();
        let err = reply_text(response).unwrap_err();
        assert!(err.contains("SAFETY"), "got: {err}");
    }

    #[test]
    fn gemini_requires_api_key() {
        let err = GeminiModel::new(ModelConfig::new("  ", "gemini-2.0-flash"))
            .err()
            .expect("missing key must fail");
        assert!(matches!(err, FlashcardError::ProviderNotConfigured { .. }));
    }

    #[test]
    fn endpoint_joins_base_url_and_model() {
        let config = ModelConfig::new("key", "gemini-2.0-flash")
            .with_base_url("http://localhost:8080/v1beta/");
        let model = GeminiModel::new(config).unwrap();
        assert_eq!(
            model.endpoint(),
            "http://localhost:8080/v1beta/models/gemini-2.0-flash:generateContent"
        );
        assert_eq!(model.model_name(), "gemini-2.0-flash");
    }
}
