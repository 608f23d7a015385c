//! Extraction instructions sent with every form image.
//!
//! The prompt is assembled from the canonical field list so the names the
//! model is told to use can never drift from the names reconciliation looks
//! for. Callers can replace it via
//! [`crate::config::ExtractionConfig::system_prompt`].

use crate::schema::CanonicalFieldList;

/// Key of the object a gated prompt asks for when the image is not a form.
pub const FORM_TYPE_KEY: &str = "form_type";

/// Value paired with [`FORM_TYPE_KEY`] for images that are not merchant forms.
pub const NOT_MERCHANT_FORM: &str = "not_merchant_form";

const ROLE: &str = "<role>You are an expert OCR and form data extraction specialist.</role>";

const TASK_UNGATED: &str = r#"<task>
Extract ALL visible information from this form image and return it as a valid JSON object with key-value pairs.
</task>"#;

const TASK_GATED: &str = r#"<task>
First decide whether this image shows a **Merchant Application Form**.
Only if it does, extract **all visible information** from it and return it as a valid JSON object with key-value pairs.

If the image does **not** show a Merchant Application Form, return exactly this JSON:
{"form_type": "not_merchant_form"}
</task>

<form_identification>
A Merchant Application Form usually carries keywords such as:
- "Merchant Application Form"
- "Merchant Name", "Business Address", "Account", "NIC", "Legal Structure"
- a layout of labelled fields with handwritten or typed answers
Treat anything else as an unrelated document or image.
</form_identification>"#;

const RULES: &str = r#"<instructions>
1. Your response MUST be a single valid JSON object: no markdown, no text before or after it
2. Read handwritten and printed text alike
3. For checkboxes and tick marks, report the selected option
4. Keep phone numbers, dates and identification numbers exactly as written
5. Capture a complete address as one string value
6. If a field is missing or unreadable, set its value to null
</instructions>

<formatting>
- NEVER use markdown code blocks or backticks
- NEVER hallucinate or infer values that are not visible in the image
- ALWAYS use double quotes for keys and strings
- ALWAYS use null when uncertain
</formatting>

<examples>
Good response: {"Date": "2025-07-09", "Merchant Name Commercial": "ABC Store", "City": "Karachi"}
Bad response: json {"Date": "2025-07-09"} or "Here is the extracted data: {..."
</examples>"#;

/// Build the extraction instruction for `fields`.
///
/// `gated` adds the merchant-form check and the
/// `{"form_type": "not_merchant_form"}` answer for unrelated images.
pub fn extraction_prompt(fields: &CanonicalFieldList, gated: bool) -> String {
    let mut prompt = String::with_capacity(2048 + fields.len() * 48);
    prompt.push_str(ROLE);
    prompt.push('\n');
    prompt.push_str(if gated { TASK_GATED } else { TASK_UNGATED });
    prompt.push_str("\n\n<field_names>\nWhen any of these fields is present, use exactly this key name:\n");
    for field in fields {
        // JSON-quote the name so embedded quotes cannot break the list.
        let quoted = serde_json::to_string(field).unwrap_or_else(|_| format!("\"{field}\""));
        prompt.push_str("- ");
        prompt.push_str(&quoted);
        prompt.push('\n');
    }
    prompt.push_str("</field_names>\n\n");
    prompt.push_str(RULES);
    prompt
}
