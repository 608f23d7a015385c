//! How close the autofilled form was to what the user finally submitted.
//!
//! Two scores per submission: the share of fields the user did not have to
//! touch, and a character-level similarity per field (Ratcliff/Obershelp,
//! the "gestalt pattern matching" ratio).

use crate::form::{display_value, SubmittedRecord};
use crate::reconcile::AutofillMapping;
use serde::Serialize;
use serde_json::{Map, Value};

/// Scores for one submission. Percentages are rounded to two decimals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccuracyReport {
    /// Percentage of fields whose extracted value was kept unchanged.
    pub field_accuracy: f64,
    /// Mean of the per-field character scores.
    pub average_char_accuracy: f64,
    /// Field → character similarity percentage, in submission order.
    pub char_scores: Map<String, Value>,
    pub exact_matches: usize,
    pub total_fields: usize,
}

impl AccuracyReport {
    /// Compare extracted values against submitted ones, field by field.
    ///
    /// Both sides are trimmed; an unmatched field counts as empty.
    pub fn compare(autofill: &AutofillMapping, submitted: &SubmittedRecord) -> Self {
        let total_fields = submitted.values.len();
        let mut exact_matches = 0;
        let mut char_scores = Map::with_capacity(total_fields);
        let mut score_sum = 0.0;

        for (field, value) in &submitted.values {
            let extracted = autofill.get(field).map(display_value).unwrap_or_default();
            let extracted = extracted.trim();
            let corrected = display_value(value);
            let corrected = corrected.trim();

            if extracted == corrected {
                exact_matches += 1;
            }
            let score = round2(similarity(extracted, corrected) * 100.0);
            score_sum += score;
            char_scores.insert(field.clone(), Value::from(score));
        }

        let (field_accuracy, average_char_accuracy) = if total_fields == 0 {
            (0.0, 0.0)
        } else {
            (
                round2(exact_matches as f64 / total_fields as f64 * 100.0),
                round2(score_sum / total_fields as f64),
            )
        };

        Self {
            field_accuracy,
            average_char_accuracy,
            char_scores,
            exact_matches,
            total_fields,
        }
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Ratcliff/Obershelp similarity of two strings, in `0.0..=1.0`.
///
/// `2 * M / (|a| + |b|)`, where `M` counts the characters in matching blocks
/// found by recursively taking the longest common substring. Two empty
/// strings are identical.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * matching_chars(&a, &b) as f64 / total as f64
}

fn matching_chars(a: &[char], b: &[char]) -> usize {
    let (i, j, len) = longest_common_block(a, b);
    if len == 0 {
        return 0;
    }
    len + matching_chars(&a[..i], &b[..j]) + matching_chars(&a[i + len..], &b[j + len..])
}

/// Start in `a`, start in `b` and length of the longest common substring.
/// Ties go to the earliest block in `a`, then in `b`.
fn longest_common_block(a: &[char], b: &[char]) -> (usize, usize, usize) {
    let mut best = (0, 0, 0);
    let mut prev = vec![0usize; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        let mut row = vec![0usize; b.len() + 1];
        for (j, cb) in b.iter().enumerate() {
            if ca == cb {
                let len = prev[j] + 1;
                row[j + 1] = len;
                if len > best.2 {
                    best = (i + 1 - len, j + 1 - len, len);
                }
            }
        }
        prev = row;
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::reconcile;
    use crate::schema::CanonicalFieldList;
    use serde_json::json;

    #[test]
    fn similarity_matches_gestalt_examples() {
        assert_eq!(similarity("", ""), 1.0);
        assert_eq!(similarity("abc", ""), 0.0);
        assert_eq!(similarity("Lahore", "Lahore"), 1.0);
        // "abcd" vs "bcde": block "bcd" → 2*3/8
        assert!((similarity("abcd", "bcde") - 0.75).abs() < 1e-9);
        // Recursion on both sides of the first block: "ab" + "d".
        assert!((similarity("abxd", "abyd") - 0.75).abs() < 1e-9);
    }

    #[test]
    fn report_scores_fields() {
        let canonical = CanonicalFieldList::new(["Date", "City", "MID", "TID"]).unwrap();
        let combined = json!({"Date": "2025-07-09", "City": "Lahor ", "MID": "778"});
        let autofill = reconcile(combined.as_object().unwrap(), &canonical);

        let submitted = SubmittedRecord {
            variant: "custom".into(),
            values: json!({
                "Date": "2025-07-09",
                "City": "Lahore",
                "MID": "  778",
                "TID": ""
            })
            .as_object()
            .unwrap()
            .clone(),
        };

        let report = AccuracyReport::compare(&autofill, &submitted);
        assert_eq!(report.total_fields, 4);
        // Date, MID (after trimming) and the empty TID match; City does not.
        assert_eq!(report.exact_matches, 3);
        assert_eq!(report.field_accuracy, 75.0);
        // "Lahor" vs "Lahore": 2*5/11
        assert_eq!(report.char_scores["City"], json!(90.91));
        assert_eq!(report.char_scores["TID"], json!(100.0));
        assert!((report.average_char_accuracy - 97.73).abs() < 0.011);
    }

    #[test]
    fn empty_submission_scores_zero() {
        let canonical = CanonicalFieldList::new(["Date"]).unwrap();
        let autofill = AutofillMapping::empty(&canonical);
        let submitted = SubmittedRecord {
            variant: "custom".into(),
            values: Map::new(),
        };
        let report = AccuracyReport::compare(&autofill, &submitted);
        assert_eq!(report.field_accuracy, 0.0);
        assert_eq!(report.average_char_accuracy, 0.0);
    }
}
