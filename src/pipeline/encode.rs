//! Image encoding: raw image blob → base64 `ImageData` for the OCR request.
//!
//! Blobs are sent exactly as extracted; nothing is re-compressed. The MIME
//! type is sniffed from the leading bytes, and anything that is not
//! recognisably PNG is labelled `image/jpeg`, the type every scanner and
//! phone camera produces.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use tracing::debug;

/// MIME type for an image blob.
pub fn sniff_mime(bytes: &[u8]) -> &'static str {
    match image::guess_format(bytes) {
        Ok(image::ImageFormat::Png) => "image/png",
        Ok(image::ImageFormat::Jpeg) => "image/jpeg",
        Ok(image::ImageFormat::WebP) => "image/webp",
        Ok(image::ImageFormat::Gif) => "image/gif",
        _ => "image/jpeg",
    }
}

/// Wrap an image blob as a base64 attachment.
///
/// Fails only for an empty blob, which no API would accept.
pub fn encode_image(bytes: &[u8]) -> Result<ImageData, String> {
    if bytes.is_empty() {
        return Err("image is empty".to_string());
    }
    let mime = sniff_mime(bytes);
    let b64 = STANDARD.encode(bytes);
    debug!("Encoded {} bytes as {} → {} bytes base64", bytes.len(), mime, b64.len());

    Ok(ImageData::new(b64, mime).with_detail("high"))
}
