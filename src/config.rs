//! Configuration types for form extraction and persistence.
//!
//! Extraction behaviour is controlled through [`ExtractionConfig`], built via
//! [`ExtractionConfigBuilder`]. Persistence targets live in
//! [`PersistenceConfig`], which is read from the environment once at
//! start-up. The canonical field list, the OCR backend and the persistence
//! target are all injected here rather than fixed in code, so one pipeline
//! serves every form layout.

use crate::error::FormExtractError;
use crate::progress::ProgressCallback;
use crate::prompts::extraction_prompt;
use crate::schema::{CanonicalFieldList, FormVariant};
use edgequake_llm::LLMProvider;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Provider used when nothing else is configured.
pub const DEFAULT_PROVIDER: &str = "openrouter";

/// Vision model used when no model is configured.
pub const DEFAULT_MODEL: &str = "meta-llama/llama-4-scout";

/// Environment variable holding the primary database target.
pub const DB_URL_ENV: &str = "FORMEXTRACT_DB_URL";

/// Configuration for one extraction run.
///
/// # Example
/// ```rust
/// use formextract::{ExtractionConfig, FormVariant};
///
/// let config = ExtractionConfig::builder()
///     .variant(FormVariant::Extended)
///     .model("meta-llama/llama-4-scout")
///     .api_timeout_secs(30)
///     .build()
///     .unwrap();
/// assert_eq!(config.fields().len(), 25);
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Built-in form layout. Default: [`FormVariant::Full`].
    pub variant: FormVariant,

    /// Custom canonical list; replaces the variant's list when set.
    pub fields: Option<CanonicalFieldList>,

    /// LLM model identifier. If None, uses [`DEFAULT_MODEL`].
    pub model: Option<String>,

    /// LLM provider name (e.g. "openrouter", "openai", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.0.
    ///
    /// Transcription must be faithful to the page; any creativity shows up as
    /// invented field values.
    pub temperature: f32,

    /// Maximum tokens the model may generate per image. Default: 1024.
    pub max_tokens: usize,

    /// Per-OCR-call timeout in seconds. Default: 60.
    ///
    /// The only bound on a stuck call; there is no retry after it fires.
    pub api_timeout_secs: u64,

    /// Custom extraction instruction. If None, built from the field list.
    pub system_prompt: Option<String>,

    /// Optional progress callback for per-image events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            variant: FormVariant::default(),
            fields: None,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.0,
            max_tokens: 1024,
            api_timeout_secs: 60,
            system_prompt: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("variant", &self.variant)
            .field("fields", &self.fields.as_ref().map(CanonicalFieldList::len))
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("system_prompt", &self.system_prompt.as_ref().map(|p| p.len()))
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ExtractionProgressCallback>"),
            )
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }

    /// The canonical field list in effect.
    pub fn fields(&self) -> CanonicalFieldList {
        self.fields
            .clone()
            .unwrap_or_else(|| self.variant.fields())
    }

    /// Model identifier in effect.
    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    /// The instruction text sent with every image.
    pub fn prompt(&self) -> String {
        match self.system_prompt {
            Some(ref prompt) => prompt.clone(),
            None => extraction_prompt(&self.fields(), self.variant.gates_form_type()),
        }
    }
}

/// Builder for [`ExtractionConfig`].
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl fmt::Debug for ExtractionConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl ExtractionConfigBuilder {
    pub fn variant(mut self, variant: FormVariant) -> Self {
        self.config.variant = variant;
        self
    }

    pub fn fields(mut self, fields: CanonicalFieldList) -> Self {
        self.config.fields = Some(fields);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, FormExtractError> {
        let c = &self.config;
        if c.max_tokens == 0 {
            return Err(FormExtractError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        if c.api_timeout_secs == 0 {
            return Err(FormExtractError::InvalidConfig(
                "api_timeout_secs must be ≥ 1".into(),
            ));
        }
        if let Some(ref prompt) = c.system_prompt {
            if prompt.trim().is_empty() {
                return Err(FormExtractError::InvalidConfig(
                    "system prompt must not be blank".into(),
                ));
            }
        }
        Ok(self.config)
    }
}

// ── Persistence ──────────────────────────────────────────────────────────

/// Where submitted forms are stored.
///
/// The primary target comes from `FORMEXTRACT_DB_URL`; when that is unset,
/// left as a template placeholder, or cannot be opened, the local fallback
/// database is used instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistenceConfig {
    /// Configured target, already filtered for placeholders.
    pub primary: Option<String>,
    /// Local default target.
    pub fallback: String,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            primary: None,
            fallback: default_database_path().to_string_lossy().into_owned(),
        }
    }
}

impl PersistenceConfig {
    /// Build from explicit values; `primary` placeholders are discarded.
    pub fn new(primary: Option<String>, fallback: Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            primary: primary.filter(|p| !is_placeholder(p)),
            fallback: fallback
                .filter(|f| !is_placeholder(f))
                .unwrap_or(defaults.fallback),
        }
    }

    /// Read the primary target from `FORMEXTRACT_DB_URL`.
    pub fn from_env() -> Self {
        Self::new(std::env::var(DB_URL_ENV).ok(), None)
    }
}

/// `true` for empty values and unfilled templates such as
/// `sqlite://<path-to-database>`.
pub fn is_placeholder(target: &str) -> bool {
    let t = target.trim();
    t.is_empty() || (t.contains('<') && t.contains('>'))
}

/// `$DATA_DIR/formextract/formextract.db`, or `./formextract.db` when the
/// platform has no data directory.
pub fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("formextract").join("formextract.db"))
        .unwrap_or_else(|| PathBuf::from("formextract.db"))
}
