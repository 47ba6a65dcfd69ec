//! Integration tests for the upload pipeline.
//!
//! The language model is scripted and the calendar is either an in-memory
//! recorder or a mockito server, so these tests need no API keys. The PDF
//! scenario needs the pdfium library and skips itself when it is missing.
//!
//! Run with:
//!   cargo test --test pipeline -- --nocapture

use async_trait::async_trait;
use doc2cal::{
    AnalysisFailure, AuthorizationContext, CalendarError, CalendarService, Coordinator,
    EventBody, GoogleCalendar, InsertedEvent, InsertionFailure, InsertionPolicy, LanguageModel,
    PipelineConfig, PipelineError, StatusClass, UploadedFile,
};
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ── Test doubles ─────────────────────────────────────────────────────────────

struct ScriptedModel {
    reply: String,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, prompt: &str) -> Result<String, String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(self.reply.clone())
    }
}

/// Accepts every event except call number `fail_on` (1-based).
#[derive(Default)]
struct RecordingCalendar {
    fail_on: Option<usize>,
    calls: Mutex<usize>,
    committed: Mutex<Vec<EventBody>>,
}

#[async_trait]
impl CalendarService for RecordingCalendar {
    async fn insert_event(
        &self,
        _calendar_id: &str,
        event: &EventBody,
        _auth: &AuthorizationContext,
    ) -> Result<InsertedEvent, CalendarError> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            *calls
        };
        if self.fail_on == Some(call) {
            return Err(CalendarError::ApiError {
                status: 503,
                message: "backendError".into(),
            });
        }
        self.committed.lock().unwrap().push(event.clone());
        Ok(InsertedEvent {
            id: format!("evt{call}"),
            html_link: None,
        })
    }
}

// ── Fixtures ─────────────────────────────────────────────────────────────────

const BOB_EVENT: &str = r#"[{"summary":"Meeting with Bob","start_time":"2025-03-01T15:00:00Z","end_time":"2025-03-01T16:00:00Z"}]"#;

fn config(scratch: &Path) -> PipelineConfig {
    PipelineConfig::builder()
        .scratch_dir(scratch)
        .tesseract_cmd("doc2cal-missing-tesseract")
        .build()
        .unwrap()
}

fn auth() -> AuthorizationContext {
    AuthorizationContext::bearer("integration-token")
}

fn scratch_is_empty(dir: &Path) -> bool {
    std::fs::read_dir(dir)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(true)
}

fn events_json(n: usize) -> String {
    let items: Vec<String> = (1..=n)
        .map(|i| {
            format!(
                r#"{{"summary":"Session {i}","start_time":"2025-05-{i:02}T12:00:00Z","end_time":"2025-05-{i:02}T13:00:00Z"}}"#
            )
        })
        .collect();
    format!("[{}]", items.join(","))
}

/// One-page PDF whose only text is `text`, set in Helvetica.
fn minimal_pdf(text: &str) -> Vec<u8> {
    let content = format!("BT /F1 12 Tf 72 720 Td ({text}) Tj ET");
    let objects = [
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
         /Resources << /Font << /F1 4 0 R >> >> /Contents 5 0 R >>"
            .to_string(),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
        format!(
            "<< /Length {} >>\nstream\n{}\nendstream",
            content.len(),
            content
        ),
    ];

    let mut pdf = Vec::new();
    pdf.extend_from_slice(b"%PDF-1.4\n");
    let mut offsets = Vec::new();
    for (i, body) in objects.iter().enumerate() {
        offsets.push(pdf.len());
        write!(pdf, "{} 0 obj\n{}\nendobj\n", i + 1, body).unwrap();
    }
    let xref_at = pdf.len();
    write!(pdf, "xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1).unwrap();
    for off in offsets {
        write!(pdf, "{off:010} 00000 n \n").unwrap();
    }
    write!(
        pdf,
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
        objects.len() + 1,
        xref_at
    )
    .unwrap();
    pdf
}

fn minimal_docx(paragraphs: &[&str]) -> Vec<u8> {
    let body: String = paragraphs
        .iter()
        .map(|p| format!("<w:p><w:r><w:t>{p}</w:t></w:r></w:p>"))
        .collect();
    let xml = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{body}</w:body></w:document>"#
    );

    let mut buf = Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut buf);
        writer.start_file(
            "word/document.xml",
            zip::write::SimpleFileOptions::default(),
        )
        .unwrap();
        writer.write_all(xml.as_bytes()).unwrap();
        writer.finish().unwrap();
    }
    buf.into_inner()
}

fn small_png() -> Vec<u8> {
    let img = image::RgbImage::from_pixel(16, 16, image::Rgb([255, 255, 255]));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
    buf.into_inner()
}

// ── Scenarios ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn pdf_with_one_meeting_creates_one_event() {
    let scratch = tempfile::tempdir().unwrap();
    let model = ScriptedModel::new(BOB_EVENT);
    let calendar = Arc::new(RecordingCalendar::default());
    let coordinator = Coordinator::with_parts(config(scratch.path()), model.clone(), calendar.clone());

    let upload = UploadedFile::new(
        "meeting.pdf",
        minimal_pdf("Meeting with Bob on 2025-03-01 at 3pm"),
    );
    let result = coordinator.run(Some(upload), &auth()).await;

    if let Err(PipelineError::Extraction(ref e)) = result {
        if e.to_string().contains("could not load the pdfium library") {
            println!("SKIP: pdfium library not available");
            return;
        }
    }

    let summary = result.unwrap();
    assert_eq!(
        summary.message(),
        "Success! Created 1 events in your Google Calendar."
    );
    assert!(model.prompts.lock().unwrap()[0].contains("Meeting with Bob on 2025-03-01 at 3pm"));
    let committed = calendar.committed.lock().unwrap();
    assert_eq!(committed.len(), 1);
    assert_eq!(committed[0].start.date_time, "2025-03-01T15:00:00Z");
    assert!(scratch_is_empty(scratch.path()));
}

#[tokio::test]
async fn docx_with_one_meeting_creates_one_event() {
    let scratch = tempfile::tempdir().unwrap();
    let model = ScriptedModel::new(BOB_EVENT);
    let calendar = Arc::new(RecordingCalendar::default());
    let coordinator = Coordinator::with_parts(config(scratch.path()), model.clone(), calendar.clone());

    let upload = UploadedFile::new(
        "meeting.docx",
        minimal_docx(&["Agenda", "Meeting with Bob on 2025-03-01 at 3pm"]),
    );
    let resp = coordinator.handle_upload(Some(upload), &auth()).await;

    assert_eq!(resp.status, StatusClass::Success);
    assert_eq!(resp.body, "Success! Created 1 events in your Google Calendar.");
    assert!(model.prompts.lock().unwrap()[0].contains("Agenda\nMeeting with Bob"));
    assert_eq!(calendar.committed.lock().unwrap()[0].summary, "Meeting with Bob");
    assert!(scratch_is_empty(scratch.path()));
}

#[tokio::test]
async fn no_file_is_client_error_without_running_stages() {
    let scratch = tempfile::tempdir().unwrap();
    let model = ScriptedModel::new(BOB_EVENT);
    let calendar = Arc::new(RecordingCalendar::default());
    let coordinator = Coordinator::with_parts(config(scratch.path()), model.clone(), calendar.clone());

    let resp = coordinator.handle_upload(None, &auth()).await;

    assert_eq!(resp.status, StatusClass::ClientError);
    assert_eq!(resp.status.code(), 400);
    assert_eq!(resp.body, "No file part");
    assert_eq!(model.calls(), 0);
    assert_eq!(*calendar.calls.lock().unwrap(), 0);
    assert!(scratch_is_empty(scratch.path()));
}

#[tokio::test]
async fn png_without_ocr_engine_is_server_error_and_scratch_is_removed() {
    let scratch = tempfile::tempdir().unwrap();
    let model = ScriptedModel::new(BOB_EVENT);
    let calendar = Arc::new(RecordingCalendar::default());
    let coordinator = Coordinator::with_parts(config(scratch.path()), model.clone(), calendar.clone());

    let resp = coordinator
        .handle_upload(Some(UploadedFile::new("flyer.png", small_png())), &auth())
        .await;

    assert_eq!(resp.status, StatusClass::ServerError);
    assert!(resp.body.starts_with("Error performing OCR on image:"), "got: {}", resp.body);
    assert!(resp.body.contains("doc2cal-missing-tesseract"), "got: {}", resp.body);
    assert!(resp.body.contains("Make sure Tesseract is installed"));
    assert_eq!(model.calls(), 0);
    assert!(scratch_is_empty(scratch.path()));
}

#[tokio::test]
async fn conversational_reply_is_malformed_and_nothing_is_inserted() {
    let scratch = tempfile::tempdir().unwrap();
    let calendar = Arc::new(RecordingCalendar::default());
    let coordinator = Coordinator::with_parts(
        config(scratch.path()),
        ScriptedModel::new("Sure! Here are the events: [...]"),
        calendar.clone(),
    );

    let upload = UploadedFile::new("agenda.docx", minimal_docx(&["Lunch on Friday"]));
    let err = coordinator.run(Some(upload), &auth()).await.unwrap_err();

    assert_eq!(err.status(), StatusClass::ServerError);
    assert!(matches!(
        err,
        PipelineError::Analysis(AnalysisFailure::MalformedModelOutput { ref raw_response })
            if raw_response == "Sure! Here are the events: [...]"
    ));
    assert_eq!(*calendar.calls.lock().unwrap(), 0);
}

#[tokio::test]
async fn empty_array_is_zero_event_success() {
    let scratch = tempfile::tempdir().unwrap();
    let calendar = Arc::new(RecordingCalendar::default());
    let coordinator =
        Coordinator::with_parts(config(scratch.path()), ScriptedModel::new("[]"), calendar.clone());

    let resp = coordinator
        .handle_upload(Some(UploadedFile::new("notes.txt", b"nothing here".to_vec())), &auth())
        .await;

    assert_eq!(resp.status, StatusClass::Success);
    assert_eq!(
        resp.body,
        "Success! No events were found in your document, so no events were created."
    );
    assert_eq!(*calendar.calls.lock().unwrap(), 0);
}

#[tokio::test]
async fn failure_on_third_of_five_leaves_two_committed() {
    let scratch = tempfile::tempdir().unwrap();
    let calendar = Arc::new(RecordingCalendar {
        fail_on: Some(3),
        ..Default::default()
    });
    let coordinator = Coordinator::with_parts(
        config(scratch.path()),
        ScriptedModel::new(&events_json(5)),
        calendar.clone(),
    );

    let upload = UploadedFile::new("schedule.docx", minimal_docx(&["five sessions"]));
    let err = coordinator.run(Some(upload), &auth()).await.unwrap_err();

    match err {
        PipelineError::Insertion(InsertionFailure::CalendarApiError {
            created,
            attempted,
            ref detail,
        }) => {
            assert_eq!((created, attempted), (2, 3));
            assert!(detail.contains("503"));
        }
        ref other => panic!("unexpected {other:?}"),
    }
    assert_eq!(err.status(), StatusClass::ServerError);

    let committed = calendar.committed.lock().unwrap();
    let names: Vec<&str> = committed.iter().map(|e| e.summary.as_str()).collect();
    assert_eq!(names, vec!["Session 1", "Session 2"]);
    assert_eq!(*calendar.calls.lock().unwrap(), 3);
}

#[tokio::test]
async fn continue_policy_reports_partial_result() {
    let scratch = tempfile::tempdir().unwrap();
    let calendar = Arc::new(RecordingCalendar {
        fail_on: Some(2),
        ..Default::default()
    });
    let config = PipelineConfig::builder()
        .scratch_dir(scratch.path())
        .insertion_policy(InsertionPolicy::ContinueOnFailure)
        .build()
        .unwrap();
    let coordinator =
        Coordinator::with_parts(config, ScriptedModel::new(&events_json(3)), calendar.clone());

    let resp = coordinator
        .handle_upload(Some(UploadedFile::new("notes.txt", b"x".to_vec())), &auth())
        .await;

    assert_eq!(resp.status, StatusClass::Success);
    assert!(resp.body.starts_with("Created 2 of 3 events"), "got: {}", resp.body);
    assert!(resp.body.contains("#2 'Session 2'"));
    assert_eq!(calendar.committed.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn events_reach_google_calendar_api() {
    let mut server = mockito::Server::new_async().await;
    let insert = server
        .mock("POST", "/calendars/primary/events")
        .match_header("authorization", "Bearer integration-token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id":"created"}"#)
        .expect(2)
        .create_async()
        .await;

    let scratch = tempfile::tempdir().unwrap();
    let config = PipelineConfig::builder()
        .scratch_dir(scratch.path())
        .calendar_base_url(server.url())
        .build()
        .unwrap();
    let calendar = GoogleCalendar::new(server.url(), Duration::from_secs(5)).unwrap();
    let coordinator =
        Coordinator::with_parts(config, ScriptedModel::new(&events_json(2)), Arc::new(calendar));

    let resp = coordinator
        .handle_upload(Some(UploadedFile::new("notes.txt", b"x".to_vec())), &auth())
        .await;

    assert_eq!(resp.body, "Success! Created 2 events in your Google Calendar.");
    insert.assert_async().await;
}

#[tokio::test]
async fn expired_token_aborts_with_calendar_error() {
    let mut server = mockito::Server::new_async().await;
    let _expired = server
        .mock("POST", "/calendars/primary/events")
        .with_status(401)
        .create_async()
        .await;

    let scratch = tempfile::tempdir().unwrap();
    let calendar = GoogleCalendar::new(server.url(), Duration::from_secs(5)).unwrap();
    let coordinator = Coordinator::with_parts(
        config(scratch.path()),
        ScriptedModel::new(BOB_EVENT),
        Arc::new(calendar),
    );

    let resp = coordinator
        .handle_upload(Some(UploadedFile::new("notes.txt", b"x".to_vec())), &auth())
        .await;

    assert_eq!(resp.status, StatusClass::ServerError);
    assert_eq!(
        resp.body,
        "Error creating calendar event: Token expired or revoked"
    );
}
