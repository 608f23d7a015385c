//! Shared helpers for integration tests: a scripted OCR client and
//! in-memory document fixtures.

#![allow(dead_code)]

use edgequake_llm::ImageData;
use formextract::{OcrClient, OcrError, OcrResponse};
use futures::future::BoxFuture;
use image::{DynamicImage, Rgb, RgbImage};
use lopdf::{dictionary, Dictionary, Document, Object, Stream};
use std::collections::VecDeque;
use std::io::{Cursor, Write};
use std::sync::Mutex;

/// Answers OCR calls from a fixed script, in order.
#[derive(Default)]
pub struct ScriptedOcr {
    script: Mutex<VecDeque<Result<OcrResponse, OcrError>>>,
    seen: Mutex<Vec<String>>,
}

impl ScriptedOcr {
    pub fn new<I>(answers: I) -> Self
    where
        I: IntoIterator<Item = Result<OcrResponse, OcrError>>,
    {
        Self {
            script: Mutex::new(answers.into_iter().collect()),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// A client whose every answer is a successful text response.
    pub fn texts<'a>(answers: impl IntoIterator<Item = &'a str>) -> Self {
        Self::new(answers.into_iter().map(|a| Ok(OcrResponse::text(a))))
    }

    /// MIME types of the images received so far.
    pub fn seen_mime_types(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

impl OcrClient for ScriptedOcr {
    fn recognise(&self, image: ImageData) -> BoxFuture<'_, Result<OcrResponse, OcrError>> {
        self.seen.lock().unwrap().push(image.mime_type.clone());
        let next = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(OcrError::Api("script exhausted".into())));
        Box::pin(async move { next })
    }
}

/// A small JPEG; `shade` makes images distinguishable.
pub fn jpeg(shade: u8) -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(6, 6, Rgb([shade, shade, 255])));
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Jpeg)
        .unwrap();
    buf
}

/// A small PNG.
pub fn png() -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(6, 6, Rgb([10, 200, 10])));
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    buf
}

/// An image XObject carrying `data` as a 6×6 JPEG.
pub fn jpeg_stream(data: Vec<u8>) -> Stream {
    Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => 6,
            "Height" => 6,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
            "Filter" => "DCTDecode",
        },
        data,
    )
}

/// A CCITT fax-encoded image XObject, as fax-to-PDF scanners produce.
pub fn fax_stream() -> Stream {
    Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => 1728,
            "Height" => 8,
            "ColorSpace" => "DeviceGray",
            "BitsPerComponent" => 1,
            "Filter" => "CCITTFaxDecode",
        },
        vec![0u8; 32],
    )
}

/// A PDF with one page per JPEG, each page showing its image.
pub fn pdf_with_jpegs(images: &[Vec<u8>]) -> Vec<u8> {
    pdf_with_streams(images.iter().cloned().map(jpeg_stream).collect())
}

/// A PDF with one page per image stream.
pub fn pdf_with_streams(images: Vec<Stream>) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut kids = Vec::new();

    for stream in images {
        let image_id = doc.add_object(stream);
        let mut xobjects = Dictionary::new();
        xobjects.set("Im0", Object::Reference(image_id));
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            b"q 100 0 0 100 0 0 cm /Im0 Do Q".to_vec(),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => dictionary! { "XObject" => xobjects },
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        });
        kids.push(Object::Reference(page_id));
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buf = Vec::new();
    doc.save_to(&mut buf).unwrap();
    buf
}

/// A minimal DOCX archive carrying `images` under `word/media/`.
pub fn docx_with_images(images: &[Vec<u8>]) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut buf);
        let options = zip::write::SimpleFileOptions::default();
        writer.start_file("[Content_Types].xml", options).unwrap();
        writer.write_all(b"<Types/>").unwrap();
        writer.start_file("word/document.xml", options).unwrap();
        writer.write_all(b"<w:document/>").unwrap();
        for (i, data) in images.iter().enumerate() {
            writer
                .start_file(format!("word/media/image{}.jpeg", i + 1), options)
                .unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap();
    }
    buf.into_inner()
}
