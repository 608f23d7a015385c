//! # formextract
//!
//! Digitise scanned and handwritten merchant application forms with a
//! multimodal language model.
//!
//! A user hands in an image, a PDF or a DOCX file. The crate pulls the
//! embedded images out, asks a vision model to transcribe each one as a JSON
//! object, merges the per-image objects and maps the model's free-text keys
//! onto a fixed list of form fields. The result prefills an editable form;
//! on submission the values can be stored in a local document database.
//!
//! ## Pipeline Overview
//!
//! ```text
//! upload
//!  │
//!  ├─ 1. Classify   image / PDF / DOCX, anything else rejected
//!  ├─ 2. Extract    embedded images (lopdf, zip; spawn_blocking)
//!  ├─ 3. Encode     base64 ImageData with sniffed MIME type
//!  ├─ 4. OCR        one sequential VLM call per image, no retries
//!  ├─ 5. Sanitise   cut the JSON object out of each answer
//!  ├─ 6. Merge      first filled value per key wins
//!  └─ 7. Reconcile  fuzzy key matching onto the canonical field list
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use formextract::{extract_fields, ExtractionConfig, FormVariant};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENROUTER_API_KEY / OPENAI_API_KEY / …
//!     let config = ExtractionConfig::builder()
//!         .variant(FormVariant::Basic)
//!         .build()?;
//!     let output = extract_fields("application.pdf", &config).await?;
//!     for (field, value) in output.autofill.iter() {
//!         println!("{field}: {value}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `formextract` binary (clap + anyhow + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod accuracy;
pub mod config;
pub mod error;
pub mod extract;
pub mod form;
pub mod output;
pub mod persist;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod reconcile;
pub mod schema;
pub mod session;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use accuracy::AccuracyReport;
pub use config::{ExtractionConfig, ExtractionConfigBuilder, PersistenceConfig};
pub use error::{FormExtractError, ImageError, OcrError, PersistError};
pub use extract::{extract_fields, extract_fields_sync, extract_from_bytes, run_pipeline};
pub use form::{DraftFile, FormDraft, SubmittedRecord};
pub use output::{ExtractionOutput, ExtractionStats, ImageResult};
pub use persist::{RecordSink, SqliteSink};
pub use pipeline::images::ExtractedImage;
pub use pipeline::input::{Upload, UploadKind};
pub use pipeline::ocr::{LlmOcrClient, OcrClient, OcrResponse};
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use reconcile::{merge, reconcile, AutofillMapping, FieldReconciler, Record};
pub use schema::{CanonicalFieldList, FormVariant};
pub use session::{FormSession, Persisted, SessionState, Submission};
