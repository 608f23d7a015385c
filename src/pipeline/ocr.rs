//! OCR calls: send one form image to a multimodal model and return its text.
//!
//! [`OcrClient`] is the seam between the pipeline and the network. The
//! production implementation, [`LlmOcrClient`], wraps any
//! `edgequake_llm::LLMProvider`; tests script responses in-process.
//!
//! Each call is a single request bounded by a timeout. There is no retry and
//! no backoff: a failed image is skipped by the caller and the run moves on.

use crate::config::ExtractionConfig;
use crate::error::OcrError;
use crate::extract::resolve_provider;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use futures::future::BoxFuture;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tokio::time::Duration;
use tracing::debug;

/// Raw model answer for one image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OcrResponse {
    /// Response text, unsanitised.
    pub content: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

impl OcrResponse {
    /// A response with text only; token counts are zero.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }
}

/// Turns one image into raw response text.
pub trait OcrClient: Send + Sync {
    fn recognise(&self, image: ImageData) -> BoxFuture<'_, Result<OcrResponse, OcrError>>;
}

/// [`OcrClient`] backed by an LLM provider.
///
/// The provider is resolved on the first call, so uploads that never reach
/// OCR (no images, unreadable files) report their own error instead of a
/// missing API key.
pub struct LlmOcrClient {
    provider: OnceCell<Arc<dyn LLMProvider>>,
    config: ExtractionConfig,
    prompt: String,
    options: CompletionOptions,
    timeout_secs: u64,
}

impl LlmOcrClient {
    /// Client for an already-built provider.
    pub fn new(provider: Arc<dyn LLMProvider>, config: &ExtractionConfig) -> Self {
        Self {
            provider: OnceCell::from(provider),
            ..Self::from_config(config)
        }
    }

    /// Client whose provider is resolved from `config` on first use.
    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self {
            provider: OnceCell::new(),
            config: config.clone(),
            prompt: config.prompt(),
            options: build_options(config),
            timeout_secs: config.api_timeout_secs,
        }
    }

    async fn provider(&self) -> Result<&Arc<dyn LLMProvider>, OcrError> {
        self.provider
            .get_or_try_init(|| resolve_provider(&self.config))
            .await
            .map_err(|e| OcrError::Api(e.to_string()))
    }
}

impl OcrClient for LlmOcrClient {
    fn recognise(&self, image: ImageData) -> BoxFuture<'_, Result<OcrResponse, OcrError>> {
        Box::pin(async move {
            let provider = self.provider().await?;

            // The instruction and the image travel in the same user turn.
            let messages = vec![ChatMessage::user_with_images(&self.prompt, vec![image])];
            let call = provider.chat(&messages, Some(&self.options));

            let response = tokio::time::timeout(Duration::from_secs(self.timeout_secs), call)
                .await
                .map_err(|_| OcrError::Timeout {
                    secs: self.timeout_secs,
                })?
                .map_err(|e| OcrError::Api(e.to_string()))?;

            debug!(
                "OCR answer: {} input tokens, {} output tokens, {} chars",
                response.prompt_tokens,
                response.completion_tokens,
                response.content.len()
            );

            Ok(OcrResponse {
                content: response.content,
                input_tokens: response.prompt_tokens,
                output_tokens: response.completion_tokens,
            })
        })
    }
}

/// Build `CompletionOptions` from the extraction config.
fn build_options(config: &ExtractionConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_options_defaults() {
        let config = ExtractionConfig::default();
        let opts = build_options(&config);
        assert_eq!(opts.temperature, Some(0.0));
        assert_eq!(opts.max_tokens, Some(1024));
    }

    #[test]
    fn build_options_follow_builder() {
        let config = ExtractionConfig::builder()
            .temperature(0.3)
            .max_tokens(2048)
            .build()
            .unwrap();
        let opts = build_options(&config);
        assert_eq!(opts.temperature, Some(0.3));
        assert_eq!(opts.max_tokens, Some(2048));
    }

    #[tokio::test]
    async fn unknown_provider_fails_the_call_not_the_constructor() {
        let config = ExtractionConfig::builder()
            .provider_name("definitely-not-a-provider")
            .build()
            .unwrap();
        let client = LlmOcrClient::from_config(&config);

        let image = ImageData::new("aGVsbG8=", "image/png");
        let err = client.recognise(image).await.unwrap_err();
        assert!(matches!(err, OcrError::Api(ref detail) if detail.contains("definitely-not-a-provider")));
    }

    #[test]
    fn text_response_has_no_tokens() {
        let r = OcrResponse::text("{}");
        assert_eq!(r.content, "{}");
        assert_eq!(r.input_tokens + r.output_tokens, 0);
    }
}
