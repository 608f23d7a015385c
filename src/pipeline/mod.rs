//! Pipeline stages for form extraction.
//!
//! Each submodule implements exactly one transformation step, so each can be
//! tested on its own and the network-facing step can be swapped for a
//! scripted one.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ images ──▶ encode ──▶ ocr ──▶ sanitize
//! (kind)    (blobs)    (base64)   (VLM)   (JSON object)
//! ```
//!
//! 1. [`input`]: classify the upload as image, PDF or DOCX
//! 2. [`images`]: pull the embedded images out; runs in `spawn_blocking`
//! 3. [`encode`]: base64-wrap each blob with a sniffed MIME type
//! 4. [`ocr`]: one model call per image; the only stage with network I/O
//! 5. [`sanitize`]: cut the JSON object out of the answer or return the
//!    error sentinel
//!
//! Merging and key reconciliation live in [`crate::reconcile`].

pub mod encode;
pub mod images;
pub mod input;
pub mod ocr;
pub mod sanitize;
