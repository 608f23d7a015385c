//! Response sanitising: recover the JSON object from a model answer.
//!
//! Models wrap their JSON in chatter ("Sure! Here is ...") or markdown
//! fences despite being told not to. The cleanup is deliberately narrow:
//! cut from the first `{` to the last `}` and require the result to parse
//! as a JSON object. Nothing is repaired. Anything else becomes
//! [`ERROR_SENTINEL`], which the pipeline then leaves out of the merge.

use crate::prompts::{FORM_TYPE_KEY, NOT_MERCHANT_FORM};
use crate::reconcile::Record;
use serde_json::Value;

/// Returned in place of a response that holds no valid JSON object.
pub const ERROR_SENTINEL: &str =
    r#"{"error": "Could not extract valid JSON from image or API error."}"#;

const ERROR_KEY: &str = "error";
const ERROR_MESSAGE: &str = "Could not extract valid JSON from image or API error.";

/// Reduce a raw answer to a JSON object string, or [`ERROR_SENTINEL`].
///
/// A missing `{` keeps the start of the text and a missing `}` keeps its
/// end; the strict parse then decides.
pub fn sanitize_response(raw: &str) -> String {
    let text = raw.trim();
    let start = text.find('{').unwrap_or(0);
    let end = text.rfind('}').map(|i| i + 1).unwrap_or(text.len());

    let candidate = if start < end { &text[start..end] } else { "" };

    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(_)) => candidate.to_string(),
        _ => ERROR_SENTINEL.to_string(),
    }
}

/// Parse sanitised text into a record. `None` for anything but an object.
pub fn parse_record(text: &str) -> Option<Record> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// `true` for the record produced from [`ERROR_SENTINEL`].
pub fn is_error_sentinel(record: &Record) -> bool {
    record.len() == 1
        && record.get(ERROR_KEY).and_then(Value::as_str) == Some(ERROR_MESSAGE)
}

/// `true` when the model reported that the image is not a merchant form.
pub fn is_not_a_form(record: &Record) -> bool {
    record.get(FORM_TYPE_KEY).and_then(Value::as_str) == Some(NOT_MERCHANT_FORM)
}
