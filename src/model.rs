//! Data passed between pipeline stages.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// One user-submitted document, as received by the upload endpoint.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Original file name supplied by the client.
    pub file_name: String,
    /// Raw file content.
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes: bytes.into(),
        }
    }

    /// Declared extension (without the dot, as written by the client).
    ///
    /// Empty when the name has no extension.
    pub fn extension(&self) -> &str {
        Path::new(&self.file_name)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
    }

    /// File name reduced to its final path component.
    ///
    /// Clients may send names such as `../../etc/passwd` or `C:\x\y.pdf`;
    /// only the last component is ever used on disk.
    pub fn safe_file_name(&self) -> String {
        let last = self
            .file_name
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or("")
            .trim();
        match last {
            "" | "." | ".." => "upload".to_string(),
            name => name.to_string(),
        }
    }
}

/// A proposed calendar entry produced from document text.
///
/// All three fields are required and must be non-empty. Times are ISO-8601
/// date-times in UTC (`YYYY-MM-DDTHH:MM:SSZ`), as requested from the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateEvent {
    pub summary: String,
    pub start_time: String,
    pub end_time: String,
}

impl CandidateEvent {
    /// Name of the first missing-or-blank field, if any.
    pub fn blank_field(&self) -> Option<&'static str> {
        if self.summary.trim().is_empty() {
            Some("summary")
        } else if self.start_time.trim().is_empty() {
            Some("start_time")
        } else if self.end_time.trim().is_empty() {
            Some("end_time")
        } else {
            None
        }
    }
}

/// Model output that passed the bracket-shape check.
///
/// Holds the trimmed response text. It starts with `[` and ends with `]`
/// but has not been JSON-decoded yet; decoding happens in the event sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventPayload(String);

impl EventPayload {
    /// Accept `raw` if its trimmed form is bracket-delimited.
    pub fn from_model_output(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.starts_with('[') && trimmed.ends_with(']') {
            Some(Self(trimmed.to_string()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

/// One event the calendar refused while the sink kept going.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedInsertion {
    /// 1-based position in the candidate list.
    pub index: usize,
    pub summary: String,
    pub detail: String,
}

/// Outcome of the insertion loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InsertionSummary {
    /// Events the calendar accepted.
    pub created: usize,
    /// Events the sink tried to insert.
    pub attempted: usize,
    /// Per-event failures (only populated with `ContinueOnFailure`).
    pub failures: Vec<FailedInsertion>,
}

impl InsertionSummary {
    /// Human-readable message returned to the uploader.
    pub fn message(&self) -> String {
        if self.attempted == 0 {
            return "Success! No events were found in your document, so no events were created."
                .to_string();
        }
        if self.failures.is_empty() {
            return format!(
                "Success! Created {} events in your Google Calendar.",
                self.created
            );
        }
        let details: Vec<String> = self
            .failures
            .iter()
            .map(|f| format!("#{} '{}': {}", f.index, f.summary, f.detail))
            .collect();
        format!(
            "Created {} of {} events in your Google Calendar; {} failed: {}",
            self.created,
            self.attempted,
            self.failures.len(),
            details.join("; ")
        )
    }
}
