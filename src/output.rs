//! Result types produced by an extraction run.

use crate::error::ImageError;
use crate::pipeline::input::UploadKind;
use crate::reconcile::{AutofillMapping, Record};
use serde::Serialize;

/// Outcome for one image of the upload.
#[derive(Debug, Clone, Serialize)]
pub struct ImageResult {
    /// 1-indexed position in extraction order.
    pub image: usize,
    /// Sanitised response text; the error sentinel when the answer held no
    /// JSON object, empty when the call itself failed.
    pub raw_response: String,
    /// Parsed record when the image is usable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<Record>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ImageError>,
    pub duration_ms: u64,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

impl ImageResult {
    pub fn is_usable(&self) -> bool {
        self.record.is_some() && self.error.is_none()
    }
}

/// Counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtractionStats {
    pub total_images: usize,
    pub usable_images: usize,
    pub failed_images: usize,
    /// Canonical fields that received a value.
    pub matched_fields: usize,
    pub total_fields: usize,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub extract_duration_ms: u64,
    pub ocr_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Everything an extraction run produced.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionOutput {
    pub file_name: String,
    pub kind: UploadKind,
    /// Per-image outcomes in extraction order.
    pub images: Vec<ImageResult>,
    /// Union of the usable records, first filled value per key.
    pub combined: Record,
    /// Combined record mapped onto the canonical field list.
    pub autofill: AutofillMapping,
    pub stats: ExtractionStats,
}

impl ExtractionOutput {
    /// Parsed records of the usable images, in order.
    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.images
            .iter()
            .filter(|r| r.is_usable())
            .filter_map(|r| r.record.as_ref())
    }

    /// Non-fatal errors, in image order.
    pub fn errors(&self) -> impl Iterator<Item = &ImageError> {
        self.images.iter().filter_map(|r| r.error.as_ref())
    }
}
