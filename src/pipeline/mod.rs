//! Pipeline stages for document-to-calendar conversion.
//!
//! Each submodule implements exactly one stage and owns its failure type.
//! None of them knows about the others; [`crate::coordinator`] sequences them.
//!
//! ## Data Flow
//!
//! ```text
//! file ──▶ extract ──▶ analyze ──▶ insert
//! (path)   (text)      (JSON [..])  (calendar)
//! ```
//!
//! 1. [`extract`]: PDF (pdfium), DOCX (zip + XML), image (tesseract OCR);
//!    unknown extensions yield empty text
//! 2. [`analyze`]: one language-model call; the reply must be a bare JSON
//!    array
//! 3. [`insert`] : decode the array and insert events one by one through the
//!    calendar API

pub mod analyze;
pub mod extract;
pub mod insert;
