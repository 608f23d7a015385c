//! The editable form: one text value per canonical field.
//!
//! A [`FormDraft`] starts blank or prefilled from an [`AutofillMapping`] and
//! is edited field by field. Submission turns it into a [`SubmittedRecord`].
//! [`DraftFile`] is the on-disk shape the CLI uses so a draft can be edited
//! in any text editor between extraction and submission.

use crate::error::FormExtractError;
use crate::reconcile::AutofillMapping;
use crate::schema::{CanonicalFieldList, FormVariant};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// Text shown in the form for an autofilled value.
///
/// `null` becomes empty, strings are taken as-is and any other JSON value is
/// shown as its JSON text.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Current form contents, in canonical order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormDraft {
    fields: CanonicalFieldList,
    values: Vec<String>,
}

impl FormDraft {
    /// Every field empty.
    pub fn blank(fields: CanonicalFieldList) -> Self {
        let values = vec![String::new(); fields.len()];
        Self { fields, values }
    }

    /// Prefill from `autofill`; fields it lacks stay empty.
    pub fn from_autofill(fields: CanonicalFieldList, autofill: &AutofillMapping) -> Self {
        let values = fields
            .iter()
            .map(|f| autofill.get(f).map(display_value).unwrap_or_default())
            .collect();
        Self { fields, values }
    }

    pub fn fields(&self) -> &CanonicalFieldList {
        &self.fields
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.position(field).map(|i| self.values[i].as_str())
    }

    /// Replace one value. Field names must match the canonical list exactly.
    pub fn set(&mut self, field: &str, value: impl Into<String>) -> Result<(), FormExtractError> {
        let i = self
            .position(field)
            .ok_or_else(|| FormExtractError::UnknownField {
                field: field.to_string(),
            })?;
        self.values[i] = value.into();
        Ok(())
    }

    /// `(field, value)` pairs in canonical order.
    pub fn values(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields
            .iter()
            .zip(self.values.iter().map(String::as_str))
    }

    /// Number of non-blank values.
    pub fn filled_count(&self) -> usize {
        self.values.iter().filter(|v| !v.trim().is_empty()).count()
    }

    /// Snapshot as an ordered field → string map.
    pub fn to_map(&self) -> Map<String, Value> {
        self.values()
            .map(|(f, v)| (f.to_string(), Value::String(v.to_string())))
            .collect()
    }

    fn position(&self, field: &str) -> Option<usize> {
        self.fields.iter().position(|f| f == field)
    }
}

/// The values handed to persistence on submit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmittedRecord {
    pub variant: String,
    /// Canonical field → edited value, same keys and order as the form.
    pub values: Map<String, Value>,
}

impl SubmittedRecord {
    pub fn from_draft(variant: impl Into<String>, draft: &FormDraft) -> Self {
        Self {
            variant: variant.into(),
            values: draft.to_map(),
        }
    }

    /// Submitted text for `field`; empty when absent.
    pub fn value(&self, field: &str) -> &str {
        self.values
            .get(field)
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    /// Flat document: `form_variant` followed by the field values.
    pub fn to_document(&self) -> Map<String, Value> {
        let mut doc = Map::with_capacity(self.values.len() + 1);
        doc.insert("form_variant".to_string(), Value::String(self.variant.clone()));
        for (k, v) in &self.values {
            doc.insert(k.clone(), v.clone());
        }
        doc
    }
}

/// Editable draft on disk.
///
/// `autofill` keeps what the model read so accuracy can be measured after
/// the values have been corrected by hand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftFile {
    pub variant: FormVariant,
    /// Set when the draft uses a custom field list instead of the variant's.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<CanonicalFieldList>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub autofill: AutofillMapping,
    pub values: Map<String, Value>,
}

impl DraftFile {
    pub fn new(
        variant: FormVariant,
        custom_fields: Option<CanonicalFieldList>,
        source: Option<String>,
        autofill: AutofillMapping,
        draft: &FormDraft,
    ) -> Self {
        Self {
            variant,
            fields: custom_fields,
            source,
            autofill,
            values: draft.to_map(),
        }
    }

    /// Canonical list the draft was made for.
    pub fn canonical(&self) -> CanonicalFieldList {
        self.fields
            .clone()
            .unwrap_or_else(|| self.variant.fields())
    }

    /// Rebuild the form. Unknown keys are rejected; missing ones stay empty.
    pub fn to_draft(&self) -> Result<FormDraft, FormExtractError> {
        let mut draft = FormDraft::blank(self.canonical());
        for (field, value) in &self.values {
            draft.set(field, display_value(value))?;
        }
        Ok(draft)
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self, FormExtractError> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => FormExtractError::FileNotFound {
                path: path.to_path_buf(),
            },
            _ => FormExtractError::Internal(format!("Failed to read {}: {}", path.display(), e)),
        })?;
        serde_json::from_str(&text).map_err(|e| {
            FormExtractError::InvalidConfig(format!("{} is not a valid draft: {}", path.display(), e))
        })
    }

    /// Write atomically (temp file + rename).
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<(), FormExtractError> {
        let path = path.as_ref();
        let write_err = |source| FormExtractError::OutputWriteFailed {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| FormExtractError::Internal(format!("draft serialisation: {e}")))?;
        let tmp_path: PathBuf = path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, json).await.map_err(write_err)?;
        tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;
        Ok(())
    }
}
