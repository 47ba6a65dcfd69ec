//! Configuration for the document-to-calendar pipeline.
//!
//! Every knob lives in [`PipelineConfig`], built once at startup (via
//! [`PipelineConfig::builder()`] or [`PipelineConfig::from_env()`]) and handed
//! to the [`crate::Coordinator`]. No stage reads the environment on its own.

use crate::error::PipelineError;
use crate::pipeline::analyze::LanguageModel;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Default Google Calendar API v3 root.
pub const DEFAULT_CALENDAR_BASE_URL: &str = "https://www.googleapis.com/calendar/v3";

/// Configuration for one [`crate::Coordinator`].
///
/// # Example
/// ```rust
/// use doc2cal::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .calendar_id("team@group.calendar.google.com")
///     .model("gemini-1.5-flash")
///     .api_timeout_secs(30)
///     .build()
///     .unwrap();
/// assert_eq!(config.api_timeout_secs, 30);
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// LLM provider name passed to the edgequake-llm factory. Default: "gemini".
    pub provider_name: Option<String>,

    /// LLM model identifier. Default: "gemini-1.5-flash".
    pub model: Option<String>,

    /// Pre-constructed language model. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LanguageModel>>,

    /// Sampling temperature for the analysis call. Default: 0.1.
    ///
    /// Event extraction is transcription, not writing; low temperature keeps
    /// dates and times faithful to the document.
    pub temperature: f32,

    /// Maximum tokens the model may generate. Default: 2048.
    pub max_tokens: usize,

    /// Timeout for the language-model call in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Target calendar. Default: "primary".
    pub calendar_id: String,

    /// Calendar API root URL. Default: [`DEFAULT_CALENDAR_BASE_URL`].
    pub calendar_base_url: String,

    /// Timeout for each calendar insertion in seconds. Default: 30.
    pub calendar_timeout_secs: u64,

    /// What the event sink does when one insertion fails.
    pub insertion_policy: InsertionPolicy,

    /// Root directory for short-lived upload copies.
    /// Default: `<system temp>/doc2cal-uploads`.
    pub scratch_dir: PathBuf,

    /// Largest accepted upload in bytes. Default: 20 MiB.
    pub max_upload_bytes: usize,

    /// OCR executable. Default: "tesseract".
    pub tesseract_cmd: String,

    /// Tesseract language pack(s), e.g. "eng+deu". Default: engine default.
    pub ocr_language: Option<String>,

    /// Timeout for one OCR run in seconds. Default: 120.
    pub ocr_timeout_secs: u64,

    /// Directory containing the pdfium shared library.
    /// If None, the system library search path is used.
    pub pdfium_lib_path: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            provider_name: None,
            model: None,
            provider: None,
            temperature: 0.1,
            max_tokens: 2048,
            api_timeout_secs: 60,
            calendar_id: "primary".to_string(),
            calendar_base_url: DEFAULT_CALENDAR_BASE_URL.to_string(),
            calendar_timeout_secs: 30,
            insertion_policy: InsertionPolicy::default(),
            scratch_dir: std::env::temp_dir().join("doc2cal-uploads"),
            max_upload_bytes: 20 * 1024 * 1024,
            tesseract_cmd: "tesseract".to_string(),
            ocr_language: None,
            ocr_timeout_secs: 120,
            pdfium_lib_path: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("provider_name", &self.provider_name)
            .field("model", &self.model)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LanguageModel>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("calendar_id", &self.calendar_id)
            .field("calendar_base_url", &self.calendar_base_url)
            .field("insertion_policy", &self.insertion_policy)
            .field("scratch_dir", &self.scratch_dir)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("tesseract_cmd", &self.tesseract_cmd)
            .field("pdfium_lib_path", &self.pdfium_lib_path)
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// Build a configuration from process environment variables.
    ///
    /// | Variable | Field |
    /// |----------|-------|
    /// | `DOC2CAL_PROVIDER` | `provider_name` |
    /// | `DOC2CAL_MODEL` | `model` |
    /// | `DOC2CAL_API_TIMEOUT` | `api_timeout_secs` |
    /// | `GOOGLE_CALENDAR_ID` | `calendar_id` |
    /// | `DOC2CAL_SCRATCH_DIR` | `scratch_dir` |
    /// | `TESSERACT_CMD` | `tesseract_cmd` |
    /// | `PDFIUM_LIB_PATH` | `pdfium_lib_path` |
    ///
    /// The model API key itself is read by the provider factory
    /// (`GEMINI_API_KEY`, `OPENAI_API_KEY`, …).
    pub fn from_env() -> Result<Self, PipelineError> {
        let mut builder = Self::builder();
        if let Some(v) = env_var("DOC2CAL_PROVIDER") {
            builder = builder.provider_name(v);
        }
        if let Some(v) = env_var("DOC2CAL_MODEL") {
            builder = builder.model(v);
        }
        if let Some(v) = env_var("DOC2CAL_API_TIMEOUT") {
            let secs = v.parse().map_err(|_| {
                PipelineError::InvalidConfig(format!("DOC2CAL_API_TIMEOUT must be seconds, got '{v}'"))
            })?;
            builder = builder.api_timeout_secs(secs);
        }
        if let Some(v) = env_var("GOOGLE_CALENDAR_ID") {
            builder = builder.calendar_id(v);
        }
        if let Some(v) = env_var("DOC2CAL_SCRATCH_DIR") {
            builder = builder.scratch_dir(v);
        }
        if let Some(v) = env_var("TESSERACT_CMD") {
            builder = builder.tesseract_cmd(v);
        }
        if let Some(v) = env_var("PDFIUM_LIB_PATH") {
            builder = builder.pdfium_lib_path(v);
        }
        builder.build()
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LanguageModel>) -> Self {
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

    pub fn calendar_id(mut self, id: impl Into<String>) -> Self {
        self.config.calendar_id = id.into();
        self
    }

    pub fn calendar_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.calendar_base_url = url.into();
        self
    }

    pub fn calendar_timeout_secs(mut self, secs: u64) -> Self {
        self.config.calendar_timeout_secs = secs;
        self
    }

    pub fn insertion_policy(mut self, policy: InsertionPolicy) -> Self {
        self.config.insertion_policy = policy;
        self
    }

    pub fn scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.scratch_dir = dir.into();
        self
    }

    pub fn max_upload_bytes(mut self, n: usize) -> Self {
        self.config.max_upload_bytes = n;
        self
    }

    pub fn tesseract_cmd(mut self, cmd: impl Into<String>) -> Self {
        self.config.tesseract_cmd = cmd.into();
        self
    }

    pub fn ocr_language(mut self, lang: impl Into<String>) -> Self {
        self.config.ocr_language = Some(lang.into());
        self
    }

    pub fn ocr_timeout_secs(mut self, secs: u64) -> Self {
        self.config.ocr_timeout_secs = secs;
        self
    }

    pub fn pdfium_lib_path(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_path = Some(dir.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, PipelineError> {
        let c = &self.config;
        if c.calendar_id.trim().is_empty() {
            return Err(PipelineError::InvalidConfig(
                "calendar_id must not be empty".into(),
            ));
        }
        if c.api_timeout_secs == 0 || c.calendar_timeout_secs == 0 || c.ocr_timeout_secs == 0 {
            return Err(PipelineError::InvalidConfig(
                "timeouts must be ≥ 1 second".into(),
            ));
        }
        if c.max_upload_bytes == 0 {
            return Err(PipelineError::InvalidConfig(
                "max_upload_bytes must be ≥ 1".into(),
            ));
        }
        if !(c.calendar_base_url.starts_with("http://") || c.calendar_base_url.starts_with("https://")) {
            return Err(PipelineError::InvalidConfig(format!(
                "calendar_base_url must be an HTTP(S) URL, got '{}'",
                c.calendar_base_url
            )));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// How the event sink reacts to a failed insertion.
///
/// Insertions are never rolled back: events created before a failure stay
/// in the calendar under either policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum InsertionPolicy {
    /// Stop at the first failure and report it as an error. (default)
    #[default]
    AbortOnFirstFailure,
    /// Try every event and report a partial-success summary.
    ContinueOnFailure,
}
