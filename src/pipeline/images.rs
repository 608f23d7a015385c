//! Image extraction: pull the raster images out of an upload.
//!
//! * Plain images pass through untouched.
//! * PDFs are walked page by page with `lopdf`; every image XObject a page
//!   references, directly or through form XObjects, is collected once per
//!   page, in document order. Transport filters (Flate, LZW) are undone
//!   first. JPEG (`DCTDecode`) data is a complete JPEG file and is returned
//!   as-is; raw samples in grey, RGB, CMYK or indexed colour at any bit depth
//!   are re-encoded as PNG. JPEG 2000, CCITT fax and JBIG2 data cannot be
//!   decoded here and come back as [`ExtractedImage::Unsupported`].
//! * DOCX files are zip archives; their `word/media/` entries with an image
//!   extension are unpacked into a scratch directory and read back in
//!   archive order.
//!
//! Parsing is CPU-bound, so [`extract_images`] runs on the blocking pool.

use crate::error::FormExtractError;
use crate::pipeline::input::{Upload, UploadKind};
use image::{DynamicImage, GrayImage, RgbImage};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::{Cursor, Read, Write};
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// Parent-chain depth limit when looking up inherited page resources.
const MAX_PAGE_TREE_DEPTH: usize = 32;

/// Nesting limit for form XObjects inside form XObjects.
const MAX_FORM_DEPTH: usize = 8;

/// Filters that are image codecs rather than byte transports.
const IMAGE_CODECS: &[&[u8]] = &[b"DCTDecode", b"JPXDecode", b"CCITTFaxDecode", b"JBIG2Decode"];

static RE_DOCX_MEDIA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^word/media/[^/]+\.(?:jpe?g|png)$").unwrap());

/// One image found in an upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractedImage {
    /// Bytes of a complete JPEG or PNG file.
    Encoded(Vec<u8>),
    /// A PDF image whose encoding cannot be turned into JPEG or PNG.
    Unsupported { page: u32, detail: String },
}

impl ExtractedImage {
    pub fn bytes(&self) -> Option<&[u8]> {
        match self {
            ExtractedImage::Encoded(data) => Some(data),
            ExtractedImage::Unsupported { .. } => None,
        }
    }
}

/// Extract every image of `upload`, in document order.
///
/// An empty result is not an error here; the caller decides how to report
/// an upload without images.
pub async fn extract_images(upload: &Upload) -> Result<Vec<ExtractedImage>, FormExtractError> {
    let upload = upload.clone();
    tokio::task::spawn_blocking(move || extract_images_blocking(&upload))
        .await
        .map_err(|e| FormExtractError::Internal(format!("Image extraction task panicked: {e}")))?
}

/// Blocking implementation of [`extract_images`].
pub fn extract_images_blocking(upload: &Upload) -> Result<Vec<ExtractedImage>, FormExtractError> {
    let images = match upload.kind() {
        UploadKind::Image => vec![ExtractedImage::Encoded(upload.bytes().to_vec())],
        UploadKind::Pdf => images_from_pdf(upload.name(), upload.bytes())?,
        UploadKind::Docx => images_from_docx(upload.name(), upload.bytes())?
            .into_iter()
            .map(ExtractedImage::Encoded)
            .collect(),
    };
    info!(
        "Found {} image(s) in {} '{}'",
        images.len(),
        upload.kind(),
        upload.name()
    );
    Ok(images)
}

// ── PDF ──────────────────────────────────────────────────────────────────

fn images_from_pdf(name: &str, bytes: &[u8]) -> Result<Vec<ExtractedImage>, FormExtractError> {
    let document = Document::load_mem(bytes).map_err(|e| FormExtractError::CorruptDocument {
        kind: "PDF",
        name: name.to_string(),
        detail: e.to_string(),
    })?;

    let mut images = Vec::new();
    for (page_num, page_id) in document.get_pages() {
        let Some(resources) = page_resources(&document, page_id) else {
            continue;
        };

        let mut found = Vec::new();
        let mut visited = Vec::new();
        collect_image_ids(&document, resources, 0, &mut visited, &mut found);

        for id in found {
            let Ok(stream) = document.get_object(id).and_then(Object::as_stream) else {
                continue;
            };
            match decode_pdf_image(&document, stream) {
                Ok(data) => {
                    debug!("Page {}: image {:?} → {} bytes", page_num, id, data.len());
                    images.push(ExtractedImage::Encoded(data));
                }
                Err(detail) => {
                    warn!("Page {}: cannot decode image {:?}: {}", page_num, id, detail);
                    images.push(ExtractedImage::Unsupported {
                        page: page_num,
                        detail,
                    });
                }
            }
        }
    }

    Ok(images)
}

/// The page's `/Resources`, following `/Parent` links for inherited ones.
fn page_resources(document: &Document, page_id: ObjectId) -> Option<&Dictionary> {
    let mut node = document.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_PAGE_TREE_DEPTH {
        if let Ok(resources) = node.get(b"Resources") {
            return resolve(document, resources).and_then(|o| o.as_dict().ok());
        }
        let parent = node.get(b"Parent").ok()?.as_reference().ok()?;
        node = document.get_dictionary(parent).ok()?;
    }
    None
}

/// Image XObjects reachable from `resources`, descending into form XObjects.
/// `visited` holds every XObject already seen on this page.
fn collect_image_ids(
    document: &Document,
    resources: &Dictionary,
    depth: usize,
    visited: &mut Vec<ObjectId>,
    found: &mut Vec<ObjectId>,
) {
    let Some(xobjects) = resources
        .get(b"XObject")
        .ok()
        .and_then(|o| resolve(document, o))
        .and_then(|o| o.as_dict().ok())
    else {
        return;
    };

    for (_, entry) in xobjects.iter() {
        let Ok(id) = entry.as_reference() else {
            continue;
        };
        if visited.contains(&id) {
            continue;
        }
        visited.push(id);

        let Ok(stream) = document.get_object(id).and_then(Object::as_stream) else {
            continue;
        };
        if has_name(&stream.dict, b"Subtype", b"Image") {
            found.push(id);
        } else if has_name(&stream.dict, b"Subtype", b"Form") {
            if depth >= MAX_FORM_DEPTH {
                debug!("Form XObject {:?} nested too deeply; not descending", id);
                continue;
            }
            let nested = stream
                .dict
                .get(b"Resources")
                .ok()
                .and_then(|o| resolve(document, o))
                .and_then(|o| o.as_dict().ok());
            if let Some(nested) = nested {
                collect_image_ids(document, nested, depth + 1, visited, found);
            }
        }
    }
}

fn resolve<'a>(document: &'a Document, object: &'a Object) -> Option<&'a Object> {
    match object {
        Object::Reference(id) => document.get_object(*id).ok(),
        other => Some(other),
    }
}

fn has_name(dict: &Dictionary, key: &[u8], expected: &[u8]) -> bool {
    matches!(dict.get(key).and_then(Object::as_name), Ok(name) if name == expected)
}

/// Names of the stream's filters, outermost first.
fn filters(dict: &Dictionary) -> Vec<Vec<u8>> {
    match dict.get(b"Filter") {
        Ok(Object::Name(name)) => vec![name.clone()],
        Ok(Object::Array(items)) => items
            .iter()
            .filter_map(|o| o.as_name().ok().map(<[u8]>::to_vec))
            .collect(),
        _ => Vec::new(),
    }
}

fn decode_pdf_image(document: &Document, stream: &Stream) -> Result<Vec<u8>, String> {
    let mut transport = filters(&stream.dict);
    let is_codec = transport
        .last()
        .is_some_and(|f| IMAGE_CODECS.contains(&f.as_slice()));
    let codec = if is_codec { transport.pop() } else { None };
    let data = undo_filters(document, stream, &transport)?;

    match codec.as_deref() {
        Some(b"DCTDecode") => {
            if data.starts_with(&[0xFF, 0xD8]) {
                Ok(data)
            } else {
                Err("DCTDecode data is not a JPEG file".to_string())
            }
        }
        Some(other) => Err(format!(
            "{} images are not supported",
            String::from_utf8_lossy(other)
        )),
        None => samples_to_png(document, &stream.dict, &data),
    }
}

/// Undo byte-level filters (`FlateDecode`, `LZWDecode`) in order.
///
/// `lopdf` refuses to decompress streams marked `/Subtype /Image`, so the
/// filters run on a copy that carries only `Filter` and `DecodeParms`.
fn undo_filters(
    document: &Document,
    stream: &Stream,
    filters: &[Vec<u8>],
) -> Result<Vec<u8>, String> {
    if filters.is_empty() {
        return Ok(stream.content.clone());
    }

    let mut dict = Dictionary::new();
    dict.set(
        "Filter",
        Object::Array(filters.iter().cloned().map(Object::Name).collect()),
    );
    if let Some(params) = decode_parms(document, &stream.dict) {
        dict.set("DecodeParms", Object::Dictionary(params.clone()));
    }

    Stream::new(dict, stream.content.clone())
        .decompressed_content()
        .map_err(|e| {
            let names: Vec<_> = filters.iter().map(|f| String::from_utf8_lossy(f)).collect();
            format!("cannot undo {} filter: {}", names.join("+"), e)
        })
}

/// Decode parameters of the first filter.
fn decode_parms<'a>(document: &'a Document, dict: &'a Dictionary) -> Option<&'a Dictionary> {
    let params = resolve(document, dict.get(b"DecodeParms").ok()?)?;
    match params {
        Object::Dictionary(d) => Some(d),
        Object::Array(items) => resolve(document, items.first()?)?.as_dict().ok(),
        _ => None,
    }
}

/// Colour spaces whose samples can be turned into RGB or grey pixels.
#[derive(Debug, Clone, PartialEq)]
enum ColourSpace {
    Gray,
    Rgb,
    Cmyk,
    Indexed {
        base: Box<ColourSpace>,
        hival: usize,
        lookup: Vec<u8>,
    },
}

impl ColourSpace {
    fn components(&self) -> usize {
        match self {
            ColourSpace::Gray | ColourSpace::Indexed { .. } => 1,
            ColourSpace::Rgb => 3,
            ColourSpace::Cmyk => 4,
        }
    }

    /// One pixel of 8-bit base-space values as RGB.
    fn to_rgb(&self, values: &[u8]) -> [u8; 3] {
        match (self, values) {
            (ColourSpace::Gray, [g, ..]) => [*g, *g, *g],
            (ColourSpace::Rgb, [r, g, b, ..]) => [*r, *g, *b],
            (ColourSpace::Cmyk, [c, m, y, k, ..]) => cmyk_to_rgb(*c, *m, *y, *k),
            _ => [0, 0, 0],
        }
    }
}

fn cmyk_to_rgb(c: u8, m: u8, y: u8, k: u8) -> [u8; 3] {
    let channel = |v: u8| ((255 - u32::from(v)) * (255 - u32::from(k)) / 255) as u8;
    [channel(c), channel(m), channel(y)]
}

fn colour_space(document: &Document, object: &Object, nested: bool) -> Result<ColourSpace, String> {
    let object = resolve(document, object).ok_or("dangling colour space reference")?;
    match object {
        Object::Name(name) => match name.as_slice() {
            b"DeviceGray" | b"G" | b"CalGray" => Ok(ColourSpace::Gray),
            b"DeviceRGB" | b"RGB" | b"CalRGB" => Ok(ColourSpace::Rgb),
            b"DeviceCMYK" | b"CMYK" => Ok(ColourSpace::Cmyk),
            other => Err(format!(
                "{} colour space is not supported",
                String::from_utf8_lossy(other)
            )),
        },
        Object::Array(items) => {
            let family = items
                .first()
                .and_then(|o| o.as_name().ok())
                .ok_or("malformed colour space")?;
            match family {
                b"CalGray" => Ok(ColourSpace::Gray),
                b"CalRGB" => Ok(ColourSpace::Rgb),
                b"ICCBased" => {
                    let profile = items
                        .get(1)
                        .and_then(|o| resolve(document, o))
                        .and_then(|o| o.as_stream().ok())
                        .ok_or("ICCBased colour space without a profile")?;
                    match profile.dict.get(b"N").and_then(Object::as_i64) {
                        Ok(1) => Ok(ColourSpace::Gray),
                        Ok(3) => Ok(ColourSpace::Rgb),
                        Ok(4) => Ok(ColourSpace::Cmyk),
                        _ => Err("ICCBased profile with unsupported component count".to_string()),
                    }
                }
                b"Indexed" | b"I" if !nested => {
                    let base = colour_space(
                        document,
                        items.get(1).ok_or("indexed colour space without a base")?,
                        true,
                    )?;
                    let hival = items
                        .get(2)
                        .and_then(|o| o.as_i64().ok())
                        .and_then(|v| usize::try_from(v).ok())
                        .filter(|v| *v <= 255)
                        .ok_or("indexed colour space with a bad hival")?;
                    let lookup = lookup_table(
                        document,
                        items.get(3).ok_or("indexed colour space without a lookup table")?,
                    )?;
                    Ok(ColourSpace::Indexed {
                        base: Box::new(base),
                        hival,
                        lookup,
                    })
                }
                other => Err(format!(
                    "{} colour space is not supported",
                    String::from_utf8_lossy(other)
                )),
            }
        }
        _ => Err("malformed colour space".to_string()),
    }
}

fn lookup_table(document: &Document, object: &Object) -> Result<Vec<u8>, String> {
    match resolve(document, object) {
        Some(Object::String(bytes, _)) => Ok(bytes.clone()),
        Some(Object::Stream(stream)) => undo_filters(document, stream, &filters(&stream.dict)),
        _ => Err("malformed indexed lookup table".to_string()),
    }
}

fn dimension(dict: &Dictionary, key: &str) -> Result<u32, String> {
    dict.get(key.as_bytes())
        .and_then(Object::as_i64)
        .ok()
        .and_then(|v| u32::try_from(v).ok())
        .filter(|v| *v > 0)
        .ok_or_else(|| format!("image without a valid {key}"))
}

fn number(object: &Object) -> Option<f64> {
    match object {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(f64::from(*r)),
        _ => None,
    }
}

/// `/Decode [1 0]` on a one-component image swaps black and white.
fn decode_inverted(dict: &Dictionary) -> bool {
    let Ok(items) = dict.get(b"Decode").and_then(Object::as_array) else {
        return false;
    };
    matches!(
        (items.first().and_then(number), items.get(1).and_then(number)),
        (Some(lo), Some(hi)) if lo > hi
    )
}

/// Split packed rows into one value per component. Rows are padded to a
/// whole byte; 16-bit values are big-endian.
fn unpack_samples(
    data: &[u8],
    width: u32,
    height: u32,
    components: usize,
    bits: u32,
) -> Result<Vec<u16>, String> {
    let per_row = width as usize * components;
    let stride = (per_row * bits as usize).div_ceil(8);
    let needed = stride * height as usize;
    if data.len() < needed {
        return Err(format!(
            "image data is short: {} of {} bytes",
            data.len(),
            needed
        ));
    }

    let mut samples = Vec::with_capacity(per_row * height as usize);
    for row in data[..needed].chunks_exact(stride) {
        match bits {
            8 => samples.extend(row.iter().map(|&b| u16::from(b))),
            16 => samples.extend(row.chunks_exact(2).map(|p| u16::from_be_bytes([p[0], p[1]]))),
            _ => {
                let per_byte = (8 / bits) as usize;
                let mask = (1u16 << bits) - 1;
                for i in 0..per_row {
                    let shift = 8 - bits * (i % per_byte + 1) as u32;
                    samples.push((u16::from(row[i / per_byte]) >> shift) & mask);
                }
            }
        }
    }
    Ok(samples)
}

/// Re-encode raw image samples as PNG.
fn samples_to_png(document: &Document, dict: &Dictionary, data: &[u8]) -> Result<Vec<u8>, String> {
    let width = dimension(dict, "Width")?;
    let height = dimension(dict, "Height")?;

    let image_mask = matches!(dict.get(b"ImageMask"), Ok(Object::Boolean(true)));
    let (space, bits) = if image_mask {
        (ColourSpace::Gray, 1)
    } else {
        let space = colour_space(
            document,
            dict.get(b"ColorSpace").map_err(|_| "image without a colour space")?,
            false,
        )?;
        let bits = dict
            .get(b"BitsPerComponent")
            .and_then(Object::as_i64)
            .map_err(|_| "image without BitsPerComponent")?;
        (space, bits)
    };
    if ![1, 2, 4, 8, 16].contains(&bits) {
        return Err(format!("unsupported bit depth {bits}"));
    }
    let bits = bits as u32;

    let samples = unpack_samples(data, width, height, space.components(), bits)?;
    let max = (1u32 << bits) - 1;
    let scale = |v: u16| (u32::from(v) * 255 / max) as u8;

    let image = match &space {
        ColourSpace::Gray => {
            let invert = decode_inverted(dict);
            let pixels = samples
                .iter()
                .map(|&v| if invert { 255 - scale(v) } else { scale(v) })
                .collect();
            GrayImage::from_raw(width, height, pixels).map(DynamicImage::ImageLuma8)
        }
        ColourSpace::Rgb => {
            let pixels = samples.iter().map(|&v| scale(v)).collect();
            RgbImage::from_raw(width, height, pixels).map(DynamicImage::ImageRgb8)
        }
        ColourSpace::Cmyk => {
            let scaled: Vec<u8> = samples.iter().map(|&v| scale(v)).collect();
            let pixels = scaled
                .chunks_exact(4)
                .flat_map(|p| cmyk_to_rgb(p[0], p[1], p[2], p[3]))
                .collect();
            RgbImage::from_raw(width, height, pixels).map(DynamicImage::ImageRgb8)
        }
        ColourSpace::Indexed {
            base,
            hival,
            lookup,
        } => {
            let n = base.components();
            let pixels = samples
                .iter()
                .flat_map(|&v| {
                    let index = usize::from(v).min(*hival);
                    lookup
                        .get(index * n..(index + 1) * n)
                        .map_or([0, 0, 0], |entry| base.to_rgb(entry))
                })
                .collect();
            RgbImage::from_raw(width, height, pixels).map(DynamicImage::ImageRgb8)
        }
    }
    .ok_or("sample count does not match the image size")?;

    let mut buf = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| format!("PNG encoding failed: {e}"))?;
    Ok(buf)
}

// ── DOCX ─────────────────────────────────────────────────────────────────

fn images_from_docx(name: &str, bytes: &[u8]) -> Result<Vec<Vec<u8>>, FormExtractError> {
    let corrupt = |detail: String| FormExtractError::CorruptDocument {
        kind: "DOCX",
        name: name.to_string(),
        detail,
    };

    let mut archive =
        zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| corrupt(e.to_string()))?;
    let scratch = TempDir::new().map_err(|e| FormExtractError::Internal(format!("tempdir: {e}")))?;

    let mut unpacked = Vec::new();
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|e| corrupt(e.to_string()))?;
        if !entry.is_file() || !RE_DOCX_MEDIA.is_match(entry.name()) {
            continue;
        }
        let Some(file_name) = entry
            .enclosed_name()
            .and_then(|p| p.file_name().map(|f| f.to_os_string()))
        else {
            continue;
        };

        let target = scratch.path().join(format!("{:04}-{}", i, file_name.to_string_lossy()));
        let mut out = std::fs::File::create(&target)
            .map_err(|e| FormExtractError::Internal(format!("scratch write: {e}")))?;
        std::io::copy(&mut entry, &mut out).map_err(|e| corrupt(e.to_string()))?;
        out.flush()
            .map_err(|e| FormExtractError::Internal(format!("scratch write: {e}")))?;
        unpacked.push(target);
    }

    let mut images = Vec::with_capacity(unpacked.len());
    for path in unpacked {
        let mut data = Vec::new();
        std::fs::File::open(&path)
            .and_then(|mut f| f.read_to_end(&mut data))
            .map_err(|e| FormExtractError::Internal(format!("scratch read: {e}")))?;
        images.push(data);
    }

    // `scratch` is dropped (and the directory removed) here.
    Ok(images)
}
