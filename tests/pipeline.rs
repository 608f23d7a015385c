//! Extraction pipeline tests against a scripted OCR client.

mod common;

use common::{
    docx_with_images, fax_stream, jpeg, jpeg_stream, pdf_with_jpegs, pdf_with_streams, png,
    ScriptedOcr,
};
use formextract::{
    run_pipeline, CanonicalFieldList, ExtractionConfig, ExtractionProgressCallback,
    FormExtractError, FormVariant, ImageError, OcrError, OcrResponse, Upload, UploadKind,
};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn config_for(fields: &[&str]) -> ExtractionConfig {
    ExtractionConfig::builder()
        .fields(CanonicalFieldList::new(fields.iter().copied()).unwrap())
        .build()
        .unwrap()
}

#[tokio::test]
async fn two_page_pdf_merges_and_reconciles() {
    let pdf = pdf_with_jpegs(&[jpeg(10), jpeg(200)]);
    let upload = Upload::new("application.pdf", None, pdf).unwrap();
    let client = ScriptedOcr::texts([
        r#"{"Date": "2025-07-09", "City": null}"#,
        r#"{"City": "Karachi", "Telephone": "021-111"}"#,
    ]);
    let config = config_for(&["Date", "City", "Telephone / Cell"]);

    let output = run_pipeline(&upload, &client, &config).await.unwrap();

    assert_eq!(client.calls(), 2);
    assert_eq!(client.seen_mime_types(), ["image/jpeg", "image/jpeg"]);
    assert_eq!(output.kind, UploadKind::Pdf);
    assert_eq!(
        serde_json::Value::Object(output.combined.clone()),
        json!({"Date": "2025-07-09", "City": "Karachi", "Telephone": "021-111"})
    );

    assert_eq!(output.autofill.get("Date"), Some(&json!("2025-07-09")));
    assert_eq!(output.autofill.get("City"), Some(&json!("Karachi")));
    // "telephone" does not contain "telephone/cell"; the slash survives
    // normalisation, so the broader canonical name stays unmatched.
    assert_eq!(output.autofill.get("Telephone / Cell"), None);
    assert!(output.autofill.contains_field("Telephone / Cell"));

    assert_eq!(output.stats.total_images, 2);
    assert_eq!(output.stats.usable_images, 2);
    assert_eq!(output.stats.matched_fields, 2);
    assert_eq!(output.stats.total_fields, 3);
}

#[tokio::test]
async fn slash_keys_match_when_the_model_keeps_the_slash() {
    let upload = Upload::new("scan.jpg", None, jpeg(0)).unwrap();
    let client = ScriptedOcr::texts([r#"{"Telephone / Cell": "021-111"}"#]);
    let config = config_for(&["Telephone / Cell"]);

    let output = run_pipeline(&upload, &client, &config).await.unwrap();
    assert_eq!(
        output.autofill.get("Telephone / Cell"),
        Some(&json!("021-111"))
    );
}

#[tokio::test]
async fn chatter_is_sanitised_before_merge() {
    let upload = Upload::new("scan.png", None, png()).unwrap();
    let client = ScriptedOcr::texts([
        "Sure! Here is the data: {\"Date\": \"2025-07-09\"} Hope this helps!",
    ]);
    let config = config_for(&["Date"]);

    let output = run_pipeline(&upload, &client, &config).await.unwrap();
    assert_eq!(client.seen_mime_types(), ["image/png"]);
    assert_eq!(output.images[0].raw_response, r#"{"Date": "2025-07-09"}"#);
    assert_eq!(output.autofill.get("Date"), Some(&json!("2025-07-09")));
}

#[tokio::test]
async fn failed_images_are_skipped_and_the_rest_continue() {
    let docx = docx_with_images(&[jpeg(1), jpeg(2), jpeg(3), jpeg(4)]);
    let upload = Upload::new("application.docx", None, docx).unwrap();
    let client = ScriptedOcr::new([
        Err(OcrError::Timeout { secs: 60 }),
        Ok(OcrResponse::text("I could not read this form.")),
        Err(OcrError::Api("HTTP 502".into())),
        Ok(OcrResponse::text(r#"{"City": "Lahore"}"#)),
    ]);
    let config = config_for(&["City"]);

    let output = run_pipeline(&upload, &client, &config).await.unwrap();

    assert_eq!(output.stats.total_images, 4);
    assert_eq!(output.stats.usable_images, 1);
    assert_eq!(output.stats.failed_images, 3);
    let errors: Vec<&ImageError> = output.errors().collect();
    assert!(matches!(errors[0], ImageError::Timeout { image: 1, secs: 60 }));
    assert!(matches!(errors[1], ImageError::InvalidJson { image: 2 }));
    assert!(matches!(errors[2], ImageError::OcrFailed { image: 3, .. }));
    assert_eq!(output.autofill.get("City"), Some(&json!("Lahore")));
}

#[tokio::test]
async fn error_sentinel_and_not_a_form_never_reach_the_merge() {
    let pdf = pdf_with_jpegs(&[jpeg(1), jpeg(2), jpeg(3)]);
    let upload = Upload::new("application.pdf", None, pdf).unwrap();
    let client = ScriptedOcr::texts([
        r#"{"error": "Could not extract valid JSON from image or API error."}"#,
        r#"{"form_type": "not_merchant_form"}"#,
        r#"{"Merchant City Name": "Quetta"}"#,
    ]);
    let config = config_for(&["City", "error", "form_type"]);

    let output = run_pipeline(&upload, &client, &config).await.unwrap();

    assert_eq!(output.combined.len(), 1);
    assert_eq!(output.autofill.get("City"), Some(&json!("Quetta")));
    assert_eq!(output.autofill.get("error"), None);
    assert_eq!(output.autofill.get("form_type"), None);
    assert!(matches!(
        output.images[1].error,
        Some(ImageError::NotAMerchantForm { image: 2 })
    ));
    assert_eq!(output.records().count(), 1);
}

#[tokio::test]
async fn all_images_failing_is_fatal() {
    let pdf = pdf_with_jpegs(&[jpeg(1), jpeg(2)]);
    let upload = Upload::new("application.pdf", None, pdf).unwrap();
    let client = ScriptedOcr::texts(["no json here", "[1, 2, 3]"]);
    let config = config_for(&["City"]);

    let err = run_pipeline(&upload, &client, &config).await.unwrap_err();
    match err {
        FormExtractError::AllImagesFailed { total, first_error } => {
            assert_eq!(total, 2);
            assert!(first_error.contains("Image 1"), "got {first_error}");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn upload_without_images_is_reported_before_any_call() {
    let docx = docx_with_images(&[]);
    let upload = Upload::new("letter.docx", None, docx).unwrap();
    let client = ScriptedOcr::texts(std::iter::empty());
    let config = config_for(&["City"]);

    let err = run_pipeline(&upload, &client, &config).await.unwrap_err();
    assert!(matches!(err, FormExtractError::NoImagesFound { .. }), "got {err}");
    assert_eq!(client.calls(), 0);
}

#[tokio::test]
async fn undecodable_pdf_image_is_reported_and_the_rest_continue() {
    let pdf = pdf_with_streams(vec![fax_stream(), jpeg_stream(jpeg(7))]);
    let upload = Upload::new("faxed.pdf", None, pdf).unwrap();
    let client = ScriptedOcr::texts([r#"{"City": "Hyderabad"}"#]);
    let config = config_for(&["City"]);

    let output = run_pipeline(&upload, &client, &config).await.unwrap();

    assert_eq!(client.calls(), 1);
    assert_eq!(output.stats.total_images, 2);
    assert_eq!(output.stats.usable_images, 1);
    match &output.images[0].error {
        Some(ImageError::Unsupported {
            image: 1,
            page: 1,
            detail,
        }) => assert!(detail.contains("CCITTFaxDecode"), "got {detail}"),
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(output.autofill.get("City"), Some(&json!("Hyderabad")));
}

#[tokio::test]
async fn only_undecodable_pdf_images_fail_without_model_calls() {
    let pdf = pdf_with_streams(vec![fax_stream()]);
    let upload = Upload::new("faxed.pdf", None, pdf).unwrap();
    let client = ScriptedOcr::texts(std::iter::empty());
    let config = config_for(&["City"]);

    let err = run_pipeline(&upload, &client, &config).await.unwrap_err();
    match err {
        FormExtractError::AllImagesFailed { total, first_error } => {
            assert_eq!(total, 1);
            assert!(first_error.contains("unsupported image"), "got {first_error}");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(client.calls(), 0);
}

#[tokio::test]
async fn corrected_full_list_matches_residence_and_payment_separately() {
    let upload = Upload::new("scan.jpg", None, jpeg(9)).unwrap();
    let client = ScriptedOcr::texts([
        r#"{"Residence Address": "House 4, Street 9", "Payment Mode": "Cheque"}"#,
    ]);
    let config = ExtractionConfig::builder()
        .variant(FormVariant::Full)
        .build()
        .unwrap();

    let output = run_pipeline(&upload, &client, &config).await.unwrap();
    assert_eq!(output.autofill.len(), 42);
    assert_eq!(
        output.autofill.get("Residence Address"),
        Some(&json!("House 4, Street 9"))
    );
    assert_eq!(output.autofill.get("Payment Mode"), Some(&json!("Cheque")));
}

#[derive(Default)]
struct Counting {
    started: AtomicUsize,
    completed: AtomicUsize,
    failed: AtomicUsize,
    total: AtomicUsize,
    usable: AtomicUsize,
}

impl ExtractionProgressCallback for Counting {
    fn on_extraction_start(&self, total_images: usize) {
        self.total.store(total_images, Ordering::SeqCst);
    }
    fn on_image_start(&self, _image: usize, _total: usize) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }
    fn on_image_complete(&self, _image: usize, _total: usize, _fields: usize) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }
    fn on_image_error(&self, _image: usize, _total: usize, _error: &str) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }
    fn on_extraction_complete(&self, _total: usize, usable: usize) {
        self.usable.store(usable, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn progress_callback_sees_every_image() {
    let pdf = pdf_with_jpegs(&[jpeg(1), jpeg(2), jpeg(3)]);
    let upload = Upload::new("application.pdf", None, pdf).unwrap();
    let client = ScriptedOcr::texts([r#"{"City": "Lahore"}"#, "oops", r#"{"Date": "1 Jan"}"#]);

    let counter = Arc::new(Counting::default());
    let config = ExtractionConfig::builder()
        .fields(CanonicalFieldList::new(["City", "Date"]).unwrap())
        .progress_callback(counter.clone() as Arc<dyn ExtractionProgressCallback>)
        .build()
        .unwrap();

    run_pipeline(&upload, &client, &config).await.unwrap();

    assert_eq!(counter.total.load(Ordering::SeqCst), 3);
    assert_eq!(counter.started.load(Ordering::SeqCst), 3);
    assert_eq!(counter.completed.load(Ordering::SeqCst), 2);
    assert_eq!(counter.failed.load(Ordering::SeqCst), 1);
    assert_eq!(counter.usable.load(Ordering::SeqCst), 2);
}

#[test]
fn pipeline_runs_under_block_on() {
    let upload = Upload::new("scan.jpg", None, jpeg(5)).unwrap();
    let client = ScriptedOcr::texts([r#"{"MID": "778"}"#]);
    let config = config_for(&["MID"]);

    let output = tokio_test::block_on(run_pipeline(&upload, &client, &config)).unwrap();
    assert_eq!(output.autofill.get("MID"), Some(&json!("778")));
}
