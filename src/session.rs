//! The form session: one user working through upload, extraction, editing
//! and submission.
//!
//! ```text
//!         upload              extract               ok
//!  Idle ──────────▶ FileUploaded ───────▶ Extracting ─────▶ AutofillReady
//!                      ▲    ▲                 │ fail            │   │
//!                      │    └─────────────────┘                 │   │ submit
//!                      └──────────── upload / re-extract ───────┘   ▼
//!                                                               Submitted
//! ```
//!
//! The form stays editable in every state, so a user can type a form in by
//! hand without ever extracting. Session data is owned by the caller; there
//! is no locking and no concurrent use.

use crate::config::ExtractionConfig;
use crate::error::{FormExtractError, PersistError};
use crate::extract::run_pipeline;
use crate::form::{FormDraft, SubmittedRecord};
use crate::output::ExtractionOutput;
use crate::persist::RecordSink;
use crate::pipeline::input::Upload;
use crate::pipeline::ocr::OcrClient;
use crate::reconcile::{AutofillMapping, FieldReconciler, Record};
use crate::schema::CanonicalFieldList;
use serde::Serialize;
use std::fmt;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    FileUploaded,
    Extracting,
    AutofillReady,
    Submitted,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::FileUploaded => "file uploaded",
            SessionState::Extracting => "extracting",
            SessionState::AutofillReady => "autofill ready",
            SessionState::Submitted => "submitted",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened to the record on submit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Persisted {
    Saved { id: String },
    Failed { reason: String },
    /// Persistence was not requested.
    Skipped,
}

/// Result of [`FormSession::submit_with`]. The values are always returned,
/// saved or not.
#[derive(Debug, Clone)]
pub struct Submission {
    pub record: SubmittedRecord,
    pub persisted: Persisted,
}

/// One user's form session.
pub struct FormSession {
    id: Uuid,
    state: SessionState,
    variant: String,
    reconciler: FieldReconciler,
    upload: Option<Upload>,
    output: Option<ExtractionOutput>,
    extracted_records: Vec<Record>,
    form: FormDraft,
    last_error: Option<String>,
}

impl fmt::Debug for FormSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormSession")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("variant", &self.variant)
            .field("upload", &self.upload)
            .field("extracted_records", &self.extracted_records.len())
            .field("last_error", &self.last_error)
            .finish()
    }
}

impl FormSession {
    /// A fresh session bound to `fields`. `variant` is stored with every
    /// submission.
    pub fn new(variant: impl Into<String>, fields: CanonicalFieldList) -> Self {
        Self {
            id: Uuid::new_v4(),
            state: SessionState::Idle,
            variant: variant.into(),
            form: FormDraft::blank(fields.clone()),
            reconciler: FieldReconciler::new(fields),
            upload: None,
            output: None,
            extracted_records: Vec::new(),
            last_error: None,
        }
    }

    /// Session bound to the configuration's field list.
    pub fn from_config(config: &ExtractionConfig) -> Self {
        let variant = match config.fields {
            Some(_) => "custom".to_string(),
            None => config.variant.to_string(),
        };
        Self::new(variant, config.fields())
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn upload_ref(&self) -> Option<&Upload> {
        self.upload.as_ref()
    }

    /// Output of the latest successful extraction.
    pub fn output(&self) -> Option<&ExtractionOutput> {
        self.output.as_ref()
    }

    /// Latest autofill mapping, if any extraction succeeded.
    pub fn autofill(&self) -> Option<&AutofillMapping> {
        self.output.as_ref().map(|o| &o.autofill)
    }

    /// Every record parsed during this session, in arrival order, across
    /// all extraction runs.
    pub fn extracted_records(&self) -> &[Record] {
        &self.extracted_records
    }

    pub fn form(&self) -> &FormDraft {
        &self.form
    }

    /// The form is editable in every state.
    pub fn form_mut(&mut self) -> &mut FormDraft {
        &mut self.form
    }

    /// Message of the most recent failed operation.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Accept a new file. A rejected file leaves the state unchanged.
    pub fn upload(
        &mut self,
        name: &str,
        content_type: Option<&str>,
        bytes: Vec<u8>,
    ) -> Result<(), FormExtractError> {
        match Upload::new(name, content_type, bytes) {
            Ok(upload) => self.accept(upload),
            Err(e) => {
                warn!("Upload rejected: {}", e);
                self.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Accept an upload that was already validated.
    pub fn accept(&mut self, upload: Upload) -> Result<(), FormExtractError> {
        if self.state == SessionState::Extracting {
            return Err(self.invalid("upload"));
        }
        info!("Session {}: received {} '{}'", self.id, upload.kind(), upload.name());
        self.upload = Some(upload);
        self.last_error = None;
        self.state = SessionState::FileUploaded;
        Ok(())
    }

    /// Run extraction on the current upload and prefill the form.
    ///
    /// On failure the session goes back to `FileUploaded` and the previous
    /// form contents are kept. The same happens when the returned future is
    /// dropped before it completes, e.g. under `tokio::time::timeout`.
    pub async fn extract(
        &mut self,
        client: &dyn OcrClient,
        config: &ExtractionConfig,
    ) -> Result<&ExtractionOutput, FormExtractError> {
        if !matches!(
            self.state,
            SessionState::FileUploaded | SessionState::AutofillReady
        ) {
            return Err(self.invalid("extract"));
        }
        let Some(upload) = self.upload.clone() else {
            return Err(self.invalid("extract"));
        };

        let guard = ExtractingGuard::enter(&mut self.state, &mut self.last_error);
        let result = run_pipeline(&upload, client, config).await;
        guard.finish();

        match result {
            Ok(mut output) => {
                self.extracted_records
                    .extend(output.images.iter().filter_map(|r| r.record.clone()));
                output.autofill = self.reconciler.reconcile(&output.combined);
                output.stats.matched_fields = output.autofill.matched_count();
                output.stats.total_fields = output.autofill.len();
                self.form =
                    FormDraft::from_autofill(self.reconciler.canonical().clone(), &output.autofill);
                self.last_error = None;
                self.state = SessionState::AutofillReady;
                let output = self.output.insert(output);
                Ok(&*output)
            }
            Err(e) => {
                warn!("Session {}: extraction failed: {}", self.id, e);
                self.last_error = Some(e.to_string());
                self.state = SessionState::FileUploaded;
                Err(e)
            }
        }
    }

    /// Submit the form and store it through the sink returned by `connect`.
    ///
    /// The sink is connected only now. A connection or write failure is
    /// reported in [`Submission::persisted`]; the submission itself still
    /// succeeds and the session moves to `Submitted`.
    pub fn submit_with<S, F>(&mut self, connect: F) -> Result<Submission, FormExtractError>
    where
        S: RecordSink,
        F: FnOnce() -> Result<S, PersistError>,
    {
        let record = self.begin_submit()?;
        let persisted = match connect().and_then(|sink| sink.insert(&record)) {
            Ok(id) => {
                info!("Session {}: form saved as {}", self.id, id);
                Persisted::Saved { id }
            }
            Err(e) => {
                warn!("Session {}: form not saved: {}", self.id, e);
                self.last_error = Some(e.to_string());
                Persisted::Failed {
                    reason: e.to_string(),
                }
            }
        };
        self.state = SessionState::Submitted;
        Ok(Submission { record, persisted })
    }

    /// Submit without storing anything.
    pub fn submit_unsaved(&mut self) -> Result<Submission, FormExtractError> {
        let record = self.begin_submit()?;
        self.state = SessionState::Submitted;
        Ok(Submission {
            record,
            persisted: Persisted::Skipped,
        })
    }

    fn begin_submit(&self) -> Result<SubmittedRecord, FormExtractError> {
        if matches!(
            self.state,
            SessionState::Extracting | SessionState::Submitted
        ) {
            return Err(self.invalid("submit"));
        }
        Ok(SubmittedRecord::from_draft(self.variant.clone(), &self.form))
    }

    /// Start over with a blank form, keeping the field list.
    pub fn reset(&mut self) {
        let fields = self.reconciler.canonical().clone();
        self.state = SessionState::Idle;
        self.upload = None;
        self.output = None;
        self.form = FormDraft::blank(fields);
        self.last_error = None;
    }

    fn invalid(&self, action: &'static str) -> FormExtractError {
        FormExtractError::InvalidState {
            action,
            state: self.state.as_str(),
        }
    }
}

/// Holds a session in `Extracting` for the length of one pipeline run.
/// Dropped without [`ExtractingGuard::finish`], it puts the session back to
/// `FileUploaded`.
struct ExtractingGuard<'a> {
    state: &'a mut SessionState,
    last_error: &'a mut Option<String>,
    finished: bool,
}

impl<'a> ExtractingGuard<'a> {
    fn enter(state: &'a mut SessionState, last_error: &'a mut Option<String>) -> Self {
        *state = SessionState::Extracting;
        Self {
            state,
            last_error,
            finished: false,
        }
    }

    fn finish(mut self) {
        self.finished = true;
    }
}

impl Drop for ExtractingGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            warn!("Extraction was interrupted before it finished");
            *self.state = SessionState::FileUploaded;
            *self.last_error = Some("Extraction was interrupted".to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::SqliteSink;

    fn session() -> FormSession {
        FormSession::new("custom", CanonicalFieldList::new(["Date", "City"]).unwrap())
    }

    #[test]
    fn starts_idle_with_blank_form() {
        let s = session();
        assert_eq!(s.state(), SessionState::Idle);
        assert_eq!(s.form().get("Date"), Some(""));
        assert!(s.autofill().is_none());
    }

    #[test]
    fn extracting_guard_resets_only_when_dropped_early() {
        let mut state = SessionState::FileUploaded;
        let mut last_error = None;
        drop(ExtractingGuard::enter(&mut state, &mut last_error));
        assert_eq!(state, SessionState::FileUploaded);
        assert_eq!(last_error.as_deref(), Some("Extraction was interrupted"));

        let mut state = SessionState::AutofillReady;
        let mut last_error = None;
        let guard = ExtractingGuard::enter(&mut state, &mut last_error);
        guard.finish();
        assert_eq!(state, SessionState::Extracting);
        assert!(last_error.is_none());
    }

    #[test]
    fn rejected_upload_keeps_state() {
        let mut s = session();
        assert!(s.upload("notes.txt", None, b"hello".to_vec()).is_err());
        assert_eq!(s.state(), SessionState::Idle);
        assert!(s.last_error().unwrap().contains("notes.txt"));

        s.upload("scan.png", None, b"png".to_vec()).unwrap();
        assert_eq!(s.state(), SessionState::FileUploaded);
        assert!(s.upload("form.doc", None, b"doc".to_vec()).is_err());
        assert_eq!(s.state(), SessionState::FileUploaded);
        assert_eq!(s.upload_ref().unwrap().name(), "scan.png");
    }

    #[test]
    fn manual_entry_and_submit_without_extraction() {
        let mut s = session();
        s.form_mut().set("City", "Multan").unwrap();
        let submission = s.submit_unsaved().unwrap();
        assert_eq!(submission.record.value("City"), "Multan");
        assert_eq!(submission.persisted, Persisted::Skipped);
        assert_eq!(s.state(), SessionState::Submitted);
    }

    #[test]
    fn cannot_submit_twice() {
        let mut s = session();
        s.submit_unsaved().unwrap();
        let err = s.submit_unsaved().unwrap_err();
        assert!(matches!(err, FormExtractError::InvalidState { action: "submit", .. }));
    }

    #[test]
    fn persistence_failure_still_returns_values() {
        let mut s = session();
        s.form_mut().set("Date", "2025-07-09").unwrap();
        let submission = s
            .submit_with(|| -> Result<SqliteSink, PersistError> {
                Err(PersistError::Connect {
                    detail: "refused".into(),
                })
            })
            .unwrap();
        assert_eq!(submission.record.value("Date"), "2025-07-09");
        assert!(matches!(submission.persisted, Persisted::Failed { .. }));
        assert_eq!(s.state(), SessionState::Submitted);
    }

    #[test]
    fn submit_saves_through_sink() {
        let mut s = session();
        let sink = SqliteSink::open_target(":memory:").unwrap();
        let submission = s.submit_with(|| Ok(&sink)).unwrap();
        let Persisted::Saved { id } = submission.persisted else {
            panic!("expected a saved submission");
        };
        assert!(sink.fetch(&id).unwrap().is_some());
    }

    #[test]
    fn reset_returns_to_idle() {
        let mut s = session();
        s.upload("scan.png", None, b"png".to_vec()).unwrap();
        s.form_mut().set("City", "Sukkur").unwrap();
        s.reset();
        assert_eq!(s.state(), SessionState::Idle);
        assert_eq!(s.form().get("City"), Some(""));
        assert!(s.upload_ref().is_none());
    }
}
