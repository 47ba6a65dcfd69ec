//! Pipeline coordinator: one upload in, one plain-text response out.
//!
//! ```text
//! receive ─▶ persist (scratch) ─▶ extract ─▶ [delete scratch] ─▶ analyze ─▶ insert
//! ```
//!
//! Every stage short-circuits on failure. Nothing is retried and a run
//! cannot be resumed. The scratch copy is deleted as soon as extraction
//! returns, whatever the outcome.

use crate::auth::AuthorizationContext;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, StatusClass};
use crate::model::{InsertionSummary, UploadedFile};
use crate::pipeline::analyze::{resolve_model, Analyzer, LanguageModel};
use crate::pipeline::extract::Extractor;
use crate::pipeline::insert::{CalendarService, EventSink, GoogleCalendar};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// Final answer for one upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseMessage {
    pub status: StatusClass,
    pub body: String,
}

impl ResponseMessage {
    fn from_result(result: Result<InsertionSummary, PipelineError>) -> Self {
        match result {
            Ok(summary) => Self {
                status: StatusClass::Success,
                body: summary.message(),
            },
            Err(e) => Self {
                status: e.status(),
                body: e.to_string(),
            },
        }
    }
}

/// Runs Extract → Analyze → Insert for uploaded documents.
///
/// Holds no per-request state; one instance serves concurrent uploads.
pub struct Coordinator {
    config: PipelineConfig,
    extractor: Extractor,
    analyzer: Analyzer,
    sink: EventSink,
}

impl Coordinator {
    /// Build a coordinator with the configured model and Google Calendar.
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        let model = resolve_model(&config)?;
        let calendar = GoogleCalendar::from_config(&config).map_err(|e| {
            PipelineError::InvalidConfig(format!("cannot build calendar client: {e}"))
        })?;
        Ok(Self::with_parts(config, model, Arc::new(calendar)))
    }

    /// Build a coordinator around an explicit model and calendar.
    pub fn with_parts(
        config: PipelineConfig,
        model: Arc<dyn LanguageModel>,
        calendar: Arc<dyn CalendarService>,
    ) -> Self {
        Self {
            extractor: Extractor::from_config(&config),
            analyzer: Analyzer::new(model, &config),
            sink: EventSink::new(calendar, &config),
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Handle one upload and render the outcome as a response.
    pub async fn handle_upload(
        &self,
        file: Option<UploadedFile>,
        auth: &AuthorizationContext,
    ) -> ResponseMessage {
        let response = ResponseMessage::from_result(self.run(file, auth).await);
        match response.status {
            StatusClass::Success => info!("Upload processed: {}", response.body),
            _ => warn!("Upload failed ({}): {}", response.status.code(), response.body),
        }
        response
    }

    /// Handle one upload, keeping the typed outcome.
    pub async fn run(
        &self,
        file: Option<UploadedFile>,
        auth: &AuthorizationContext,
    ) -> Result<InsertionSummary, PipelineError> {
        let file = file.ok_or(PipelineError::NoFileProvided)?;
        if file.bytes.len() > self.config.max_upload_bytes {
            return Err(PipelineError::FileTooLarge {
                size: file.bytes.len(),
                limit: self.config.max_upload_bytes,
            });
        }
        info!("Received '{}' ({} bytes)", file.file_name, file.bytes.len());

        let start = Instant::now();
        let scratch = ScratchFile::store(&self.config.scratch_dir, &file).await?;
        let extracted = self.extractor.extract(scratch.path(), file.extension()).await;
        scratch.release().await;
        let text = extracted.inspect_err(|e| warn!("Extraction failed [{}]", e.kind()))?;

        let summary = self.analyze_and_insert(&text, auth).await?;
        debug!("Pipeline finished in {:?}", start.elapsed());
        Ok(summary)
    }

    /// Run the pipeline on a local file. The file is read in place and
    /// left untouched.
    pub async fn process_path(
        &self,
        path: &Path,
        auth: &AuthorizationContext,
    ) -> Result<InsertionSummary, PipelineError> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let text = self.extractor.extract(path, ext).await?;
        self.analyze_and_insert(&text, auth).await
    }

    async fn analyze_and_insert(
        &self,
        text: &str,
        auth: &AuthorizationContext,
    ) -> Result<InsertionSummary, PipelineError> {
        let payload = self.analyzer.analyze(text).await?;
        Ok(self.sink.insert_events(&payload, auth).await?)
    }
}

/// An upload copied into its own private directory under the scratch root.
///
/// Each upload gets a fresh directory, so two uploads with the same file
/// name never touch each other's copy.
struct ScratchFile {
    dir: TempDir,
    path: PathBuf,
}

impl ScratchFile {
    async fn store(root: &Path, file: &UploadedFile) -> Result<Self, PipelineError> {
        tokio::fs::create_dir_all(root)
            .await
            .map_err(|source| PipelineError::ScratchIo {
                path: root.to_path_buf(),
                source,
            })?;

        let dir = tempfile::Builder::new()
            .prefix("upload-")
            .tempdir_in(root)
            .map_err(|source| PipelineError::ScratchIo {
                path: root.to_path_buf(),
                source,
            })?;

        let path = dir.path().join(file.safe_file_name());
        tokio::fs::write(&path, &file.bytes)
            .await
            .map_err(|source| PipelineError::ScratchIo {
                path: path.clone(),
                source,
            })?;
        debug!("Stored upload at {}", path.display());

        Ok(Self { dir, path })
    }

    fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the copy and its directory.
    async fn release(self) {
        if let Err(e) = tokio::fs::remove_file(&self.path).await {
            warn!("Failed to remove scratch file {}: {}", self.path.display(), e);
        }
        let dir = self.dir.path().to_path_buf();
        if let Err(e) = self.dir.close() {
            warn!("Failed to remove scratch dir {}: {}", dir.display(), e);
        }
    }
}
