//! Extraction entry points: upload in, combined record and autofill out.
//!
//! [`run_pipeline`] does the work against any [`OcrClient`]; the
//! `extract_*` functions resolve an LLM provider from the configuration and
//! call it. Images are sent one at a time, in extraction order, and a failed
//! image never stops the run.

use crate::config::{ExtractionConfig, DEFAULT_MODEL, DEFAULT_PROVIDER};
use crate::error::{FormExtractError, ImageError, OcrError};
use crate::output::{ExtractionOutput, ExtractionStats, ImageResult};
use crate::pipeline::input::Upload;
use crate::pipeline::ocr::{LlmOcrClient, OcrClient};
use crate::pipeline::images::{self, ExtractedImage};
use crate::pipeline::{encode, sanitize};
use crate::reconcile::{merge, FieldReconciler};
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Extract form fields from a file on disk.
///
/// # Errors
/// Returns `Err(FormExtractError)` only for fatal errors:
/// - unsupported, empty, missing or unreadable file
/// - corrupt PDF or DOCX
/// - no images in the upload, or no image produced usable data
///
/// The LLM provider is resolved when the first image is sent; a missing
/// provider therefore shows up as every image failing.
pub async fn extract_fields(
    path: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, FormExtractError> {
    let upload = Upload::from_path(path).await?;
    let client = ocr_client(config);
    run_pipeline(&upload, &client, config).await
}

/// Extract form fields from in-memory file contents.
pub async fn extract_from_bytes(
    bytes: Vec<u8>,
    file_name: &str,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, FormExtractError> {
    let upload = Upload::new(file_name, None, bytes)?;
    let client = ocr_client(config);
    run_pipeline(&upload, &client, config).await
}

/// Synchronous wrapper around [`extract_fields`].
///
/// Creates a temporary tokio runtime internally.
pub fn extract_fields_sync(
    path: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, FormExtractError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| FormExtractError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(extract_fields(path, config))
}

/// Build the production OCR client for `config`.
pub fn ocr_client(config: &ExtractionConfig) -> LlmOcrClient {
    match config.provider {
        Some(ref provider) => LlmOcrClient::new(Arc::clone(provider), config),
        None => LlmOcrClient::from_config(config),
    }
}

/// Run every stage after upload classification.
///
/// Error-sentinel and not-a-form answers are kept in
/// [`ExtractionOutput::images`] for inspection but never reach the merge.
pub async fn run_pipeline(
    upload: &Upload,
    client: &dyn OcrClient,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, FormExtractError> {
    let total_start = Instant::now();
    info!("Starting extraction: {} ({})", upload.name(), upload.kind());

    // ── Step 1: Pull images out of the container ─────────────────────────
    let extract_start = Instant::now();
    let found = images::extract_images(upload).await?;
    let extract_duration_ms = extract_start.elapsed().as_millis() as u64;
    if found.is_empty() {
        return Err(FormExtractError::NoImagesFound {
            name: upload.name().to_string(),
        });
    }
    let total = found.len();

    if let Some(ref cb) = config.progress_callback {
        cb.on_extraction_start(total);
    }

    // ── Step 2: OCR each image in order ──────────────────────────────────
    let ocr_start = Instant::now();
    let mut results = Vec::with_capacity(total);
    for (idx, extracted) in found.iter().enumerate() {
        let image = idx + 1;
        if let Some(ref cb) = config.progress_callback {
            cb.on_image_start(image, total);
        }

        let result = match extracted {
            ExtractedImage::Encoded(blob) => process_image(client, image, blob).await,
            ExtractedImage::Unsupported { page, detail } => {
                unsupported_image(image, *page, detail.clone())
            }
        };

        if let Some(ref cb) = config.progress_callback {
            match (&result.error, &result.record) {
                (None, Some(record)) => cb.on_image_complete(image, total, record.len()),
                (Some(e), _) => cb.on_image_error(image, total, &e.to_string()),
                (None, None) => {}
            }
        }
        results.push(result);
    }
    let ocr_duration_ms = ocr_start.elapsed().as_millis() as u64;

    // ── Step 3: Merge and reconcile ──────────────────────────────────────
    let usable = results.iter().filter(|r| r.is_usable()).count();
    if let Some(ref cb) = config.progress_callback {
        cb.on_extraction_complete(total, usable);
    }

    if usable == 0 {
        let first_error = results
            .iter()
            .find_map(|r| r.error.as_ref())
            .map(|e| e.to_string())
            .unwrap_or_else(|| "Unknown error".to_string());
        return Err(FormExtractError::AllImagesFailed { total, first_error });
    }

    let combined = merge(
        results
            .iter()
            .filter(|r| r.is_usable())
            .filter_map(|r| r.record.as_ref()),
    );
    let reconciler = FieldReconciler::new(config.fields());
    let autofill = reconciler.reconcile(&combined);

    let stats = ExtractionStats {
        total_images: total,
        usable_images: usable,
        failed_images: total - usable,
        matched_fields: autofill.matched_count(),
        total_fields: autofill.len(),
        total_input_tokens: results.iter().map(|r| r.input_tokens as u64).sum(),
        total_output_tokens: results.iter().map(|r| r.output_tokens as u64).sum(),
        extract_duration_ms,
        ocr_duration_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };

    info!(
        "Extraction complete: {}/{} images usable, {}/{} fields matched, {}ms total",
        usable, total, stats.matched_fields, stats.total_fields, stats.total_duration_ms
    );

    Ok(ExtractionOutput {
        file_name: upload.name().to_string(),
        kind: upload.kind(),
        images: results,
        combined,
        autofill,
        stats,
    })
}

/// Encode, recognise and sanitise one image. Never fails; problems are
/// recorded in the result.
async fn process_image(client: &dyn OcrClient, image: usize, blob: &[u8]) -> ImageResult {
    let start = Instant::now();
    let mut result = ImageResult {
        image,
        raw_response: String::new(),
        record: None,
        error: None,
        duration_ms: 0,
        input_tokens: 0,
        output_tokens: 0,
    };

    let data = match encode::encode_image(blob) {
        Ok(data) => data,
        Err(detail) => {
            warn!("Image {}: encoding failed: {}", image, detail);
            result.error = Some(ImageError::EncodeFailed { image, detail });
            return result;
        }
    };

    match client.recognise(data).await {
        Ok(response) => {
            result.input_tokens = response.input_tokens;
            result.output_tokens = response.output_tokens;
            result.raw_response = sanitize::sanitize_response(&response.content);
            result.record = sanitize::parse_record(&result.raw_response);

            result.error = match result.record {
                None => Some(ImageError::InvalidJson { image }),
                Some(ref r) if sanitize::is_error_sentinel(r) => {
                    Some(ImageError::InvalidJson { image })
                }
                Some(ref r) if sanitize::is_not_a_form(r) => {
                    Some(ImageError::NotAMerchantForm { image })
                }
                Some(_) => None,
            };
        }
        Err(OcrError::Timeout { secs }) => {
            result.error = Some(ImageError::Timeout { image, secs });
        }
        Err(OcrError::Api(detail)) => {
            result.error = Some(ImageError::OcrFailed { image, detail });
        }
    }

    result.duration_ms = start.elapsed().as_millis() as u64;
    match result.error {
        Some(ref e) => warn!("Skipping image: {}", e),
        None => debug!(
            "Image {}: {} keys in {}ms",
            image,
            result.record.as_ref().map_or(0, |r| r.len()),
            result.duration_ms
        ),
    }
    result
}

/// Result for an image that was found but cannot be sent to the model.
fn unsupported_image(image: usize, page: u32, detail: String) -> ImageResult {
    let error = ImageError::Unsupported {
        image,
        page,
        detail,
    };
    warn!("Skipping image: {}", error);
    ImageResult {
        image,
        raw_response: String::new(),
        record: None,
        error: Some(error),
        duration_ms: 0,
        input_tokens: 0,
        output_tokens: 0,
    }
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Instantiate a named provider with the given model.
fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, FormExtractError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        FormExtractError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`), used as-is.
/// 2. **Named provider + model** (`config.provider_name`), created through
///    [`ProviderFactory::create_llm_provider`], which reads the matching API
///    key from the environment.
/// 3. **Environment pair** (`FORMEXTRACT_LLM_PROVIDER` + `FORMEXTRACT_MODEL`),
///    honoured only when both are set.
/// 4. **OpenRouter** when `OPENROUTER_API_KEY` is present.
/// 5. **Full auto-detection** via [`ProviderFactory::from_env`].
pub async fn resolve_provider(
    config: &ExtractionConfig,
) -> Result<Arc<dyn LLMProvider>, FormExtractError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        return create_vision_provider(name, config.model());
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("FORMEXTRACT_LLM_PROVIDER"),
        std::env::var("FORMEXTRACT_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_vision_provider(&prov, &model);
        }
    }

    if let Ok(key) = std::env::var("OPENROUTER_API_KEY") {
        if !key.is_empty() {
            return create_vision_provider(DEFAULT_PROVIDER, config.model());
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| FormExtractError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENROUTER_API_KEY (model {}), OPENAI_API_KEY, or configure a provider.\n\
                Error: {}",
                DEFAULT_MODEL, e
            ),
        })?;

    Ok(llm_provider)
}
