//! Persistence of submitted forms.
//!
//! [`RecordSink`] is the seam; [`SqliteSink`] stores each submission as one
//! flat JSON document in a `submitted_forms` table. Connecting tries the
//! configured primary target first and falls back to the local database.
//! One insert per submission, no deduplication: submitting twice stores two
//! rows.

use crate::config::PersistenceConfig;
use crate::error::PersistError;
use crate::form::SubmittedRecord;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info, warn};

/// Somewhere submitted forms can be written.
pub trait RecordSink {
    /// Store `record`; returns the id of the new document.
    fn insert(&self, record: &SubmittedRecord) -> Result<String, PersistError>;
}

impl<T: RecordSink + ?Sized> RecordSink for &T {
    fn insert(&self, record: &SubmittedRecord) -> Result<String, PersistError> {
        (**self).insert(record)
    }
}

/// SQLite-backed document store.
pub struct SqliteSink {
    conn: Mutex<Connection>,
    target: String,
}

impl std::fmt::Debug for SqliteSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteSink")
            .field("target", &self.target)
            .finish()
    }
}

impl SqliteSink {
    /// Open the primary target, or the fallback when the primary is unset or
    /// cannot be opened.
    pub fn connect(config: &PersistenceConfig) -> Result<Self, PersistError> {
        if let Some(ref primary) = config.primary {
            match Self::open_target(primary) {
                Ok(sink) => return Ok(sink),
                Err(e) => warn!("Primary database '{}' unavailable ({}); using fallback", primary, e),
            }
        }

        Self::open_target(&config.fallback).map_err(|e| PersistError::Connect {
            detail: format!("{}: {}", config.fallback, e),
        })
    }

    /// Open a single target: a path, `sqlite://path`, or `:memory:`.
    pub fn open_target(target: &str) -> Result<Self, PersistError> {
        let conn = match target_path(target) {
            None => Connection::open_in_memory()?,
            Some(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent).map_err(|e| PersistError::Connect {
                        detail: format!("{}: {}", parent.display(), e),
                    })?;
                }
                Connection::open(&path)?
            }
        };

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS submitted_forms (
                id TEXT PRIMARY KEY,
                variant TEXT NOT NULL,
                submitted_at TEXT NOT NULL,
                document TEXT NOT NULL
            );
            ",
        )?;

        info!("Connected to form database '{}'", target);
        Ok(Self {
            conn: Mutex::new(conn),
            target: target.to_string(),
        })
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Number of stored submissions.
    pub fn count(&self) -> Result<usize, PersistError> {
        let conn = self.conn.lock().map_err(|_| PersistError::Poisoned)?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM submitted_forms", [], |r| r.get(0))?;
        Ok(n as usize)
    }

    /// Load a stored submission by id.
    pub fn fetch(&self, id: &str) -> Result<Option<SubmittedRecord>, PersistError> {
        let conn = self.conn.lock().map_err(|_| PersistError::Poisoned)?;
        let row: Option<(String, String)> = conn
            .query_row(
                "SELECT variant, document FROM submitted_forms WHERE id = ?1",
                params![id],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?;

        let Some((variant, document)) = row else {
            return Ok(None);
        };
        let document: Map<String, Value> = serde_json::from_str(&document)?;
        let values = document
            .into_iter()
            .filter(|(k, _)| k != "form_variant")
            .collect();
        Ok(Some(SubmittedRecord { variant, values }))
    }
}

impl RecordSink for SqliteSink {
    fn insert(&self, record: &SubmittedRecord) -> Result<String, PersistError> {
        let id = uuid::Uuid::new_v4().to_string();
        let document = serde_json::to_string(&record.to_document())?;
        let submitted_at = chrono::Utc::now().to_rfc3339();

        let conn = self.conn.lock().map_err(|_| PersistError::Poisoned)?;
        conn.execute(
            "INSERT INTO submitted_forms (id, variant, submitted_at, document) VALUES (?1, ?2, ?3, ?4)",
            params![id, record.variant, submitted_at, document],
        )?;
        debug!("Stored submission {} in '{}'", id, self.target);
        Ok(id)
    }
}

/// `None` for an in-memory target, otherwise the database file path.
fn target_path(target: &str) -> Option<PathBuf> {
    let t = target.trim();
    let t = t.strip_prefix("sqlite://").unwrap_or(t);
    if t == ":memory:" {
        None
    } else {
        Some(Path::new(t).to_path_buf())
    }
}
