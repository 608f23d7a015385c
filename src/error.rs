//! Error types for the formextract library.
//!
//! Failures fall into three groups:
//!
//! * [`FormExtractError`]: **fatal for one run**. The upload is rejected,
//!   the container holds no images, or no image produced a usable record.
//!   Returned as `Err(FormExtractError)` from the top-level `extract*`
//!   functions and from [`crate::session::FormSession`] transitions.
//!
//! * [`ImageError`]: **non-fatal**. A single image failed (API error,
//!   timeout, malformed JSON). Stored inside [`crate::output::ImageResult`];
//!   the image is left out of the merge and the remaining images continue.
//!
//! * [`PersistError`]: the submitted record could not be stored. Reported
//!   inside [`crate::session::Submission`]; the submitted values are still
//!   returned to the caller.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the formextract library.
#[derive(Debug, Error)]
pub enum FormExtractError {
    // ── Upload errors ─────────────────────────────────────────────────────
    /// The file type is not one of jpg, jpeg, png, pdf, docx.
    #[error("Unsupported file type for '{name}'\nAccepted: jpg, jpeg, png, pdf, docx.")]
    UnsupportedUpload { name: String },

    /// The uploaded file contains no bytes.
    #[error("Uploaded file '{name}' is empty")]
    EmptyUpload { name: String },

    /// Input file was not found at the given path.
    #[error("File not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// PDF or DOCX container could not be parsed.
    #[error("{kind} '{name}' is corrupt: {detail}")]
    CorruptDocument {
        kind: &'static str,
        name: String,
        detail: String,
    },

    /// The container parsed fine but has no embedded raster images.
    #[error("No images found in '{name}'")]
    NoImagesFound { name: String },

    /// Every image failed; there is nothing to autofill from.
    #[error("None of the {total} image(s) produced usable form data.\nFirst error: {first_error}")]
    AllImagesFailed { total: usize, first_error: String },

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Config / schema errors ────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A canonical field list is empty or has duplicate entries.
    #[error("Invalid field list: {0}")]
    InvalidSchema(String),

    /// A form edit named a field that is not in the canonical list.
    #[error("Unknown form field '{field}'")]
    UnknownField { field: String },

    /// A session transition was requested from the wrong state.
    #[error("Cannot {action} while the session is {state}")]
    InvalidState {
        action: &'static str,
        state: &'static str,
    },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single image.
///
/// The image contributes nothing to the combined record; extraction carries
/// on with the next image.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum ImageError {
    /// A PDF image uses an encoding that cannot be turned into JPEG or PNG.
    #[error("Image {image}: unsupported image on page {page}: {detail}")]
    Unsupported {
        image: usize,
        page: u32,
        detail: String,
    },

    /// The image bytes could not be prepared for transport.
    #[error("Image {image}: encoding failed: {detail}")]
    EncodeFailed { image: usize, detail: String },

    /// The OCR API call failed.
    #[error("Image {image}: OCR call failed: {detail}")]
    OcrFailed { image: usize, detail: String },

    /// The OCR API call did not answer within the timeout.
    #[error("Image {image}: OCR call timed out after {secs}s")]
    Timeout { image: usize, secs: u64 },

    /// The response carried no parseable JSON object.
    #[error("Image {image}: response was not a valid JSON object")]
    InvalidJson { image: usize },

    /// The model reported that the image is not a merchant application form.
    #[error("Image {image}: not a merchant application form")]
    NotAMerchantForm { image: usize },
}

impl ImageError {
    /// 1-indexed position of the failing image.
    pub fn image(&self) -> usize {
        match self {
            ImageError::Unsupported { image, .. }
            | ImageError::EncodeFailed { image, .. }
            | ImageError::OcrFailed { image, .. }
            | ImageError::Timeout { image, .. }
            | ImageError::InvalidJson { image }
            | ImageError::NotAMerchantForm { image } => *image,
        }
    }
}

/// Failure raised by an [`crate::pipeline::ocr::OcrClient`] for one call.
#[derive(Debug, Clone, Error)]
pub enum OcrError {
    /// Network, HTTP or provider-side failure.
    #[error("{0}")]
    Api(String),

    /// No answer within the configured timeout.
    #[error("timed out after {secs}s")]
    Timeout { secs: u64 },
}

/// Failures of the persistence sink.
#[derive(Debug, Error)]
pub enum PersistError {
    /// Neither the primary nor the fallback target could be opened.
    #[error("Failed to connect to the form database: {detail}")]
    Connect { detail: String },

    /// The connection succeeded but the insert failed.
    #[error("Failed to save form to database: {0}")]
    Write(#[from] rusqlite::Error),

    /// The submitted record could not be serialised as a document.
    #[error("Failed to serialise form document: {0}")]
    Serialize(#[from] serde_json::Error),

    /// A previous panic left the connection lock poisoned.
    #[error("Database connection lock poisoned")]
    Poisoned,
}
