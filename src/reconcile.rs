//! Field reconciliation: fold per-image records together, then map the
//! model's free-text keys onto a canonical field list.
//!
//! Keys returned by the OCR model are uncontrolled: the same box on the form
//! may come back as `"Telephone / Cell"`, `"telephone/cell"` or
//! `"Telephone/Cell (Mobile)"`. Reconciliation is therefore fuzzy and runs in
//! two steps:
//!
//! 1. [`merge`] unions the per-image records. The first non-empty value seen
//!    for a key is kept and never overwritten, so a later blurry page cannot
//!    erase what an earlier sharp page already read. Raw keys are not unified
//!    here; near-duplicates survive as separate entries.
//! 2. [`FieldReconciler::reconcile`] walks the canonical list in order and,
//!    for each field, takes the value of the first raw key (in insertion
//!    order) whose normalised form *contains* the field's normalised form.
//!
//! Containment is one-directional: the raw key may be broader than the
//! canonical name (`"Merchant City Name"` satisfies `"City"`) but never
//! narrower (`"City"` does not satisfy `"Merchant City Name"`).

use crate::schema::CanonicalFieldList;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One JSON object returned by the OCR model, or the union of several.
///
/// Backed by an insertion-ordered map; key order decides which raw key wins
/// when several contain the same canonical name.
pub type Record = Map<String, Value>;

/// Normalise a field label for matching.
///
/// Lowercases and removes spaces, parentheses and `+`. Every other
/// character (slashes, ampersands, hyphens, commas) is significant.
pub fn normalize_key(key: &str) -> String {
    key.to_lowercase()
        .chars()
        .filter(|c| !matches!(c, ' ' | '(' | ')' | '+'))
        .collect()
}

/// `true` when a value counts as filled in: neither null nor an empty string.
pub fn is_filled(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

/// Union `records` left to right; the first filled value per key wins.
///
/// Keys that only ever carry null or `""` do not appear in the result.
pub fn merge<'a, I>(records: I) -> Record
where
    I: IntoIterator<Item = &'a Record>,
{
    let mut combined = Record::new();
    for record in records {
        for (key, value) in record {
            if !is_filled(value) {
                continue;
            }
            let vacant = combined.get(key).map_or(true, |current| !is_filled(current));
            if vacant {
                combined.insert(key.clone(), value.clone());
            }
        }
    }
    combined
}

/// Values for exactly the fields of one canonical list.
///
/// Every canonical field is present, in canonical order; unmatched fields
/// hold `null`. Matched values are copied from the combined record verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AutofillMapping {
    values: Map<String, Value>,
}

impl AutofillMapping {
    /// A mapping with every field of `canonical` set to `null`.
    pub fn empty(canonical: &CanonicalFieldList) -> Self {
        Self {
            values: canonical
                .iter()
                .map(|field| (field.to_string(), Value::Null))
                .collect(),
        }
    }

    /// Matched value for `field`; `None` when unmatched or not a canonical field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field).filter(|v| !v.is_null())
    }

    /// Whether `field` belongs to the mapping's domain.
    pub fn contains_field(&self, field: &str) -> bool {
        self.values.contains_key(field)
    }

    /// Number of fields that received a value.
    pub fn matched_count(&self) -> usize {
        self.values.values().filter(|v| !v.is_null()).count()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// `(field, value)` pairs in canonical order, `null` included.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.values
    }
}

/// Reconciler bound to one canonical field list.
#[derive(Debug, Clone)]
pub struct FieldReconciler {
    canonical: CanonicalFieldList,
    normalized: Vec<String>,
}

impl FieldReconciler {
    pub fn new(canonical: CanonicalFieldList) -> Self {
        let normalized = canonical.iter().map(normalize_key).collect();
        Self {
            canonical,
            normalized,
        }
    }

    pub fn canonical(&self) -> &CanonicalFieldList {
        &self.canonical
    }

    /// Map a combined record onto the canonical list.
    pub fn reconcile(&self, combined: &Record) -> AutofillMapping {
        let mut autofill = AutofillMapping::empty(&self.canonical);
        if combined.is_empty() {
            return autofill;
        }

        let raw: Vec<(String, &Value)> = combined
            .iter()
            .map(|(k, v)| (normalize_key(k), v))
            .collect();

        for (field, wanted) in self.canonical.iter().zip(&self.normalized) {
            if let Some((_, value)) = raw.iter().find(|(key, _)| key.contains(wanted.as_str())) {
                autofill.values.insert(field.to_string(), (*value).clone());
            }
        }

        autofill
    }
}

/// Reconcile `combined` against `canonical` without keeping a reconciler around.
pub fn reconcile(combined: &Record, canonical: &CanonicalFieldList) -> AutofillMapping {
    FieldReconciler::new(canonical.clone()).reconcile(combined)
}
