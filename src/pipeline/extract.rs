//! Text extraction: turn a stored document into plain text.
//!
//! Dispatch is purely on the declared extension, never on content sniffing:
//!
//! | Extension | Backend |
//! |-----------|---------|
//! | `pdf` | pdfium, page texts concatenated in page order |
//! | `docx` | `word/document.xml` read from the zip, paragraphs joined by `\n` |
//! | `jpg` `jpeg` `png` `gif` | decoded with `image`, text read by the `tesseract` CLI |
//! | anything else | empty text, not an error |
//!
//! pdfium and image decoding are blocking and CPU-bound, so they run under
//! `spawn_blocking`. Tesseract runs as a child process with a timeout and is
//! killed if the timeout elapses.
//!
//! The extractor only reads the file. Creating and deleting it is the
//! coordinator's job.

use crate::config::PipelineConfig;
use crate::error::ExtractionFailure;
use pdfium_render::prelude::*;
use quick_xml::events::Event;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};

/// Document families the extractor distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Docx,
    /// jpg, jpeg, png, gif
    RasterImage,
    /// Any other extension, including none.
    Unrecognized,
}

impl DocumentKind {
    /// Classify a declared extension, case-insensitively, with or without
    /// the leading dot.
    pub fn from_extension(ext: &str) -> Self {
        let ext = ext.trim().trim_start_matches('.').to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => DocumentKind::Pdf,
            "docx" => DocumentKind::Docx,
            "jpg" | "jpeg" | "png" | "gif" => DocumentKind::RasterImage,
            _ => DocumentKind::Unrecognized,
        }
    }
}

/// Text extractor configured from a [`PipelineConfig`].
#[derive(Debug, Clone)]
pub struct Extractor {
    tesseract_cmd: String,
    ocr_language: Option<String>,
    ocr_timeout: Duration,
    pdfium_lib_path: Option<PathBuf>,
}

impl Default for Extractor {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

impl Extractor {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            tesseract_cmd: config.tesseract_cmd.clone(),
            ocr_language: config.ocr_language.clone(),
            ocr_timeout: Duration::from_secs(config.ocr_timeout_secs),
            pdfium_lib_path: config.pdfium_lib_path.clone(),
        }
    }

    /// Extract the text of `path`, treating it as a `declared_extension` file.
    ///
    /// Returns `Ok("")` for unrecognized extensions. For supported types, any
    /// backend error becomes the matching [`ExtractionFailure`] variant.
    pub async fn extract(
        &self,
        path: &Path,
        declared_extension: &str,
    ) -> Result<String, ExtractionFailure> {
        let kind = DocumentKind::from_extension(declared_extension);
        debug!("Extracting {} as {:?}", path.display(), kind);

        let text = match kind {
            DocumentKind::Pdf => self.extract_pdf(path).await?,
            DocumentKind::Docx => extract_docx(path).await?,
            DocumentKind::RasterImage => self.extract_image(path).await?,
            DocumentKind::Unrecognized => {
                info!(
                    "Unrecognized extension '{}', treating as no text",
                    declared_extension
                );
                return Ok(String::new());
            }
        };

        info!("Extracted {} chars from {:?} document", text.len(), kind);
        Ok(text)
    }

    // ── PDF ──────────────────────────────────────────────────────────────

    async fn extract_pdf(&self, path: &Path) -> Result<String, ExtractionFailure> {
        let path = path.to_path_buf();
        let lib_dir = self.pdfium_lib_path.clone();

        tokio::task::spawn_blocking(move || extract_pdf_blocking(&path, lib_dir.as_deref()))
            .await
            .map_err(|e| ExtractionFailure::PdfParseError {
                detail: format!("PDF task panicked: {e}"),
            })?
    }

    // ── Images ───────────────────────────────────────────────────────────

    async fn extract_image(&self, path: &Path) -> Result<String, ExtractionFailure> {
        // Decode first: a corrupt image is reported as such instead of as
        // whatever tesseract prints for it.
        let owned = path.to_path_buf();
        let (width, height) = tokio::task::spawn_blocking(move || decode_image_dimensions(&owned))
            .await
            .map_err(|e| ExtractionFailure::OcrError {
                detail: format!("image task panicked: {e}"),
            })??;
        debug!("Decoded image {}x{} px", width, height);

        self.run_tesseract(path).await
    }

    async fn run_tesseract(&self, path: &Path) -> Result<String, ExtractionFailure> {
        let mut cmd = Command::new(&self.tesseract_cmd);
        cmd.arg(path).arg("stdout");
        if let Some(ref lang) = self.ocr_language {
            cmd.arg("-l").arg(lang);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|e| {
            let detail = if e.kind() == std::io::ErrorKind::NotFound {
                format!("OCR engine '{}' not found ({e})", self.tesseract_cmd)
            } else {
                format!("failed to start OCR engine '{}': {e}", self.tesseract_cmd)
            };
            warn!("{}", detail);
            ExtractionFailure::OcrError { detail }
        })?;

        let output = match timeout(self.ocr_timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(ExtractionFailure::OcrError {
                    detail: format!("failed to wait for OCR engine: {e}"),
                })
            }
            Err(_) => {
                return Err(ExtractionFailure::OcrError {
                    detail: format!(
                        "OCR timed out after {} seconds",
                        self.ocr_timeout.as_secs()
                    ),
                })
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractionFailure::OcrError {
                detail: format!("OCR engine exited with {}: {}", output.status, stderr.trim()),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Bind pdfium, preferring an explicit library directory.
fn bind_pdfium(lib_dir: Option<&Path>) -> Result<Pdfium, PdfiumError> {
    let bindings = match lib_dir {
        Some(dir) => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir))?,
        None => Pdfium::bind_to_system_library()?,
    };
    Ok(Pdfium::new(bindings))
}

fn extract_pdf_blocking(path: &Path, lib_dir: Option<&Path>) -> Result<String, ExtractionFailure> {
    let pdfium = bind_pdfium(lib_dir).map_err(|e| ExtractionFailure::PdfParseError {
        detail: format!("could not load the pdfium library: {e:?}"),
    })?;

    let document =
        pdfium
            .load_pdf_from_file(path, None)
            .map_err(|e| ExtractionFailure::PdfParseError {
                detail: format!("{e:?}"),
            })?;

    let pages = document.pages();
    debug!("PDF loaded: {} pages", pages.len());

    let mut text = String::new();
    for (idx, page) in pages.iter().enumerate() {
        let page_text = page.text().map_err(|e| ExtractionFailure::PdfParseError {
            detail: format!("page {}: {e:?}", idx + 1),
        })?;
        text.push_str(&page_text.all());
    }

    Ok(text)
}

fn decode_image_dimensions(path: &Path) -> Result<(u32, u32), ExtractionFailure> {
    let img = image::ImageReader::open(path)
        .and_then(|r| r.with_guessed_format())
        .map_err(|e| ExtractionFailure::OcrError {
            detail: format!("cannot open image: {e}"),
        })?
        .decode()
        .map_err(|e| ExtractionFailure::OcrError {
            detail: format!("cannot decode image: {e}"),
        })?;
    Ok((img.width(), img.height()))
}

// ── DOCX ─────────────────────────────────────────────────────────────────

async fn extract_docx(path: &Path) -> Result<String, ExtractionFailure> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || extract_docx_blocking(&path))
        .await
        .map_err(|e| ExtractionFailure::DocxParseError {
            detail: format!("DOCX task panicked: {e}"),
        })?
}

/// Walk `word/document.xml`, collecting `<w:t>` runs per `<w:p>` paragraph.
fn extract_docx_blocking(path: &Path) -> Result<String, ExtractionFailure> {
    let docx_err = |detail: String| ExtractionFailure::DocxParseError { detail };

    let file = std::fs::File::open(path).map_err(|e| docx_err(format!("{e}")))?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| docx_err(format!("not a DOCX archive: {e}")))?;
    let part = archive
        .by_name("word/document.xml")
        .map_err(|e| docx_err(format!("missing word/document.xml: {e}")))?;

    let mut reader = quick_xml::Reader::from_reader(BufReader::new(part));
    let mut buf = Vec::new();
    let mut paragraphs: Vec<String> = Vec::new();
    let mut in_text_run = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"p" => paragraphs.push(String::new()),
                b"t" => in_text_run = true,
                _ => {}
            },
            Ok(Event::Empty(ref e)) => match e.local_name().as_ref() {
                b"p" => paragraphs.push(String::new()),
                b"tab" => push_to_last(&mut paragraphs, "\t"),
                b"br" | b"cr" => push_to_last(&mut paragraphs, "\n"),
                _ => {}
            },
            Ok(Event::End(ref e)) => {
                if e.local_name().as_ref() == b"t" {
                    in_text_run = false;
                }
            }
            Ok(Event::Text(ref e)) if in_text_run => {
                let s = e
                    .unescape()
                    .map_err(|err| docx_err(format!("bad XML text: {err}")))?;
                push_to_last(&mut paragraphs, &s);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(docx_err(format!("XML error: {e}"))),
            _ => {}
        }
        buf.clear();
    }

    Ok(paragraphs.join("\n"))
}

fn push_to_last(paragraphs: &mut Vec<String>, s: &str) {
    match paragraphs.last_mut() {
        Some(p) => p.push_str(s),
        None => paragraphs.push(s.to_string()),
    }
}
