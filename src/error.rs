//! Error types for the doc2cal pipeline.
//!
//! Every stage owns its failure type so the failing stage is visible in the
//! type, not in a string prefix:
//!
//! * [`ExtractionFailure`]: the document could not be turned into text.
//! * [`AnalysisFailure`]: the language model could not be called, or replied
//!   with something that is not a JSON array.
//! * [`InsertionFailure`]: the event payload could not be decoded, or the
//!   calendar rejected an insertion.
//!
//! [`PipelineError`] wraps all three plus the request-level failures, and
//! knows which HTTP status class each maps to. Its `Display` output is the
//! plain-text message returned to the uploader.

use std::path::PathBuf;
use thiserror::Error;

/// Text extraction failed for a supported document type.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExtractionFailure {
    /// pdfium could not load or read the PDF (or could not be bound at all).
    #[error("Error extracting text from PDF: {detail}")]
    PdfParseError { detail: String },

    /// The DOCX archive or its `word/document.xml` part is unreadable.
    #[error("Error extracting text from DOCX: {detail}")]
    DocxParseError { detail: String },

    /// Image decoding or the OCR engine failed.
    ///
    /// The message always names the OCR dependency, since a missing
    /// `tesseract` binary is by far the most common cause.
    #[error("Error performing OCR on image: {detail}. Make sure Tesseract is installed and in your PATH.")]
    OcrError { detail: String },
}

impl ExtractionFailure {
    /// Short machine-readable tag for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ExtractionFailure::PdfParseError { .. } => "pdf_parse_error",
            ExtractionFailure::DocxParseError { .. } => "docx_parse_error",
            ExtractionFailure::OcrError { .. } => "ocr_error",
        }
    }
}

/// The language-model stage failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AnalysisFailure {
    /// The model answered, but not with a bare JSON array.
    #[error("Error from AI analysis: AI did not return a valid JSON array. Response was: {raw_response}")]
    MalformedModelOutput { raw_response: String },

    /// Transport, auth, rate-limit or timeout failure talking to the model.
    #[error("Error from AI analysis: {detail}")]
    ModelInvocationError { detail: String },
}

/// The calendar-insertion stage failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InsertionFailure {
    /// The analyzer payload is not a JSON array of complete events.
    #[error("Error parsing AI response to JSON: {detail}")]
    JsonDecodeError { detail: String },

    /// The calendar service rejected event number `attempted`.
    ///
    /// Insertions are not transactional: `created` events (all those before
    /// the failing one) remain in the calendar.
    #[error("Error creating calendar event: {detail}")]
    CalendarApiError {
        created: usize,
        attempted: usize,
        detail: String,
    },
}

/// HTTP status class of a pipeline outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// 200
    Success,
    /// 400
    ClientError,
    /// 500
    ServerError,
}

impl StatusClass {
    /// Numeric HTTP status code for this class.
    pub fn code(self) -> u16 {
        match self {
            StatusClass::Success => 200,
            StatusClass::ClientError => 400,
            StatusClass::ServerError => 500,
        }
    }
}

/// All errors that end a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    // ── Request errors ────────────────────────────────────────────────────
    /// The request carried no `file` field.
    #[error("No file part")]
    NoFileProvided,

    /// The upload exceeds the configured size limit.
    #[error("File too large: {size} bytes (limit {limit} bytes)")]
    FileTooLarge { size: usize, limit: usize },

    // ── Stage errors ──────────────────────────────────────────────────────
    #[error(transparent)]
    Extraction(#[from] ExtractionFailure),

    #[error(transparent)]
    Analysis(#[from] AnalysisFailure),

    #[error(transparent)]
    Insertion(#[from] InsertionFailure),

    // ── Infrastructure errors ─────────────────────────────────────────────
    /// The uploaded bytes could not be written to scratch storage.
    #[error("Failed to store upload in '{path}': {source}")]
    ScratchIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The language model provider could not be created.
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl PipelineError {
    /// Status class the inbound endpoint should answer with.
    pub fn status(&self) -> StatusClass {
        match self {
            PipelineError::NoFileProvided | PipelineError::FileTooLarge { .. } => {
                StatusClass::ClientError
            }
            _ => StatusClass::ServerError,
        }
    }
}
