//! Upload classification: decide what kind of file the user handed in.
//!
//! Only three kinds are accepted: a plain image (jpg, jpeg, png), a PDF, or
//! a DOCX document. Anything else is rejected before any image is extracted
//! or any API call is made.

use crate::error::FormExtractError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::debug;

/// Extensions accepted as plain images.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// MIME types accepted as plain images when the name has no extension.
pub const IMAGE_CONTENT_TYPES: &[&str] = &["image/jpeg", "image/jpg", "image/png"];

/// The container format of an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadKind {
    Image,
    Pdf,
    Docx,
}

impl UploadKind {
    /// Classify an upload from its file name and optional MIME type.
    ///
    /// A JPEG or PNG content type classifies a name without an extension; a
    /// name with an extension must carry one of the accepted extensions.
    pub fn detect(file_name: &str, content_type: Option<&str>) -> Result<Self, FormExtractError> {
        let extension = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        let is_image_type = content_type
            .and_then(|ct| ct.split(';').next())
            .map(|ct| ct.trim().to_ascii_lowercase())
            .is_some_and(|ct| IMAGE_CONTENT_TYPES.contains(&ct.as_str()));

        let kind = match extension.as_deref() {
            Some(ext) if IMAGE_EXTENSIONS.contains(&ext) => Some(UploadKind::Image),
            Some("pdf") => Some(UploadKind::Pdf),
            Some("docx") => Some(UploadKind::Docx),
            None if is_image_type => Some(UploadKind::Image),
            _ => None,
        };

        kind.ok_or_else(|| FormExtractError::UnsupportedUpload {
            name: file_name.to_string(),
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            UploadKind::Image => "image",
            UploadKind::Pdf => "PDF",
            UploadKind::Docx => "DOCX",
        }
    }
}

impl fmt::Display for UploadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated file handed in by the user.
#[derive(Clone)]
pub struct Upload {
    name: String,
    kind: UploadKind,
    bytes: Vec<u8>,
}

impl fmt::Debug for Upload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Upload")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

impl Upload {
    /// Validate and wrap in-memory file contents.
    pub fn new(
        name: impl Into<String>,
        content_type: Option<&str>,
        bytes: Vec<u8>,
    ) -> Result<Self, FormExtractError> {
        let name = name.into();
        let kind = UploadKind::detect(&name, content_type)?;
        if bytes.is_empty() {
            return Err(FormExtractError::EmptyUpload { name });
        }
        debug!("Accepted {} upload '{}' ({} bytes)", kind, name, bytes.len());
        Ok(Self { name, kind, bytes })
    }

    /// Read an upload from the local file system.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, FormExtractError> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        // Reject by extension before touching the disk.
        UploadKind::detect(&name, None)?;

        let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => FormExtractError::FileNotFound {
                path: path.to_path_buf(),
            },
            std::io::ErrorKind::PermissionDenied => FormExtractError::PermissionDenied {
                path: path.to_path_buf(),
            },
            _ => FormExtractError::Internal(format!("Failed to read {}: {}", path.display(), e)),
        })?;

        Self::new(name, None, bytes)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> UploadKind {
        self.kind
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}
