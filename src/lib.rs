//! # doc2cal
//!
//! Turn documents into Google Calendar events.
//!
//! A user uploads a PDF, a Word document or a photo of a flyer. The text is
//! extracted locally, a language model lists the dated events it finds, and
//! each event is inserted into a calendar. The uploader gets back one
//! plain-text message: a success count or the reason the run failed.
//!
//! ## Pipeline Overview
//!
//! ```text
//! upload
//!  │
//!  ├─ 1. Receive   reject missing or oversized files (400)
//!  ├─ 2. Persist   private scratch copy, deleted right after step 3
//!  ├─ 3. Extract   pdfium / DOCX XML / tesseract OCR → plain text
//!  ├─ 4. Analyze   one LLM call → bare JSON array of events
//!  └─ 5. Insert    one Calendar API call per event, in order
//! ```
//!
//! Any failing stage ends the run with a 500 and its own message. Unknown
//! file types are not an error: they yield no text, and usually no events.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use doc2cal::{AuthorizationContext, Coordinator, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Model key from GEMINI_API_KEY, calendar token from GOOGLE_ACCESS_TOKEN.
//!     let coordinator = Coordinator::new(PipelineConfig::from_env()?)?;
//!     let auth = AuthorizationContext::from_env()?;
//!     let summary = coordinator
//!         .process_path(std::path::Path::new("flyer.png"), &auth)
//!         .await?;
//!     println!("{}", summary.message());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `doc2cal` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! ## External tools
//!
//! * **pdfium** shared library for PDFs (system path or `PDFIUM_LIB_PATH`).
//! * **tesseract** on `PATH` for images (or `TESSERACT_CMD`).

// ── Modules ──────────────────────────────────────────────────────────────

pub mod auth;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod prompts;
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use auth::{AuthLoadError, AuthorizationContext};
pub use config::{InsertionPolicy, PipelineConfig, PipelineConfigBuilder};
pub use coordinator::{Coordinator, ResponseMessage};
pub use error::{AnalysisFailure, ExtractionFailure, InsertionFailure, PipelineError, StatusClass};
pub use model::{CandidateEvent, EventPayload, FailedInsertion, InsertionSummary, UploadedFile};
pub use pipeline::analyze::{Analyzer, LanguageModel, ProviderModel};
pub use pipeline::extract::{DocumentKind, Extractor};
pub use pipeline::insert::{
    CalendarError, CalendarService, EventBody, EventDateTime, EventSink, GoogleCalendar,
    InsertedEvent,
};
