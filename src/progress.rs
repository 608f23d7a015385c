//! Progress-callback trait for per-image extraction events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to receive
//! events while the pipeline works through the images of an upload.
//!
//! # Example
//!
//! ```rust
//! use formextract::{ExtractionConfig, ExtractionProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: Arc<AtomicUsize>,
//! }
//!
//! impl ExtractionProgressCallback for CountingCallback {
//!     fn on_image_complete(&self, image: usize, total_images: usize, fields: usize) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("Image {}/{} read ({} fields)", image, total_images, fields);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback {
//!     completed: Arc::new(AtomicUsize::new(0)),
//! });
//!
//! let config = ExtractionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ExtractionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the extraction pipeline as it processes each image.
///
/// Images are processed one at a time, so calls never overlap within one
/// run. The trait is still `Send + Sync` because the callback lives inside
/// [`crate::config::ExtractionConfig`], which is shared across tasks.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called once after image extraction, before the first OCR call.
    fn on_extraction_start(&self, total_images: usize) {
        let _ = total_images;
    }

    /// Called just before the OCR request for an image (1-indexed).
    fn on_image_start(&self, image: usize, total_images: usize) {
        let _ = (image, total_images);
    }

    /// Called when an image produced a usable record with `fields` keys.
    fn on_image_complete(&self, image: usize, total_images: usize, fields: usize) {
        let _ = (image, total_images, fields);
    }

    /// Called when an image is skipped.
    fn on_image_error(&self, image: usize, total_images: usize, error: &str) {
        let _ = (image, total_images, error);
    }

    /// Called once after every image has been attempted.
    fn on_extraction_complete(&self, total_images: usize, usable_images: usize) {
        let _ = (total_images, usable_images);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;
