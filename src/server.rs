//! HTTP upload endpoint.
//!
//! | Route | Method | Response |
//! |-------|--------|----------|
//! | `/` | GET | HTML upload form |
//! | `/`, `/upload` | POST | multipart field `file`; plain-text result |
//! | `/healthz` | GET | `ok` |
//!
//! Status codes: 200 on success, 400 when no file was sent (or it is too
//! large), 500 when any pipeline stage fails.

use crate::auth::AuthorizationContext;
use crate::coordinator::{Coordinator, ResponseMessage};
use crate::model::UploadedFile;
use axum::extract::multipart::MultipartRejection;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

/// Room for multipart boundaries and part headers on top of the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

const UPLOAD_FORM: &str = r#"<!doctype html>
<html>
  <head><meta charset="utf-8"><title>doc2cal</title></head>
  <body>
    <h1>Add events from a document</h1>
    <p>PDF, DOCX, JPG, PNG or GIF.</p>
    <form method="post" enctype="multipart/form-data">
      <input type="file" name="file">
      <button type="submit">Upload</button>
    </form>
  </body>
</html>
"#;

/// Shared state for all requests.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<Coordinator>,
    pub auth: Arc<AuthorizationContext>,
}

impl AppState {
    pub fn new(coordinator: Coordinator, auth: AuthorizationContext) -> Self {
        Self {
            coordinator: Arc::new(coordinator),
            auth: Arc::new(auth),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let body_limit = state
        .coordinator
        .config()
        .max_upload_bytes
        .saturating_add(MULTIPART_OVERHEAD);

    Router::new()
        .route("/", get(upload_form).post(upload))
        .route("/upload", axum::routing::post(upload))
        .route("/healthz", get(healthz))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `addr` and serve until Ctrl-C.
pub async fn serve(addr: SocketAddr, state: AppState) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await
}

async fn upload_form() -> Html<&'static str> {
    Html(UPLOAD_FORM)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn upload(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let file = match multipart {
        Ok(multipart) => match read_file_field(multipart).await {
            Ok(file) => file,
            Err(resp) => return resp,
        },
        Err(rejection) => {
            debug!("Not a multipart request: {}", rejection);
            None
        }
    };

    let response = state.coordinator.handle_upload(file, &state.auth).await;
    into_http(response)
}

/// Pull the `file` field out of the form.
///
/// A field with an empty file name counts as absent: that is what browsers
/// send when the form is submitted without choosing a file.
async fn read_file_field(mut multipart: Multipart) -> Result<Option<UploadedFile>, Response> {
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => return Ok(None),
            Err(e) => return Err((e.status(), e.body_text()).into_response()),
        };
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| (e.status(), e.body_text()).into_response())?;

        if file_name.is_empty() {
            return Ok(None);
        }
        return Ok(Some(UploadedFile::new(file_name, bytes.to_vec())));
    }
}

fn into_http(response: ResponseMessage) -> Response {
    let status = StatusCode::from_u16(response.status.code())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, response.body).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::pipeline::analyze::tests::ScriptedModel;
    use crate::pipeline::insert::tests::RecordingCalendar;
    use axum::body::Body;
    use axum::http::{header, Request};
    use tower::ServiceExt;

    const BOUNDARY: &str = "doc2cal-test-boundary";

    fn app(scratch: &std::path::Path, reply: &str) -> Router {
        let config = PipelineConfig::builder()
            .scratch_dir(scratch)
            .build()
            .unwrap();
        let coordinator = Coordinator::with_parts(
            config,
            ScriptedModel::ok(reply),
            Arc::new(RecordingCalendar::default()),
        );
        router(AppState::new(
            coordinator,
            AuthorizationContext::bearer("test-token"),
        ))
    }

    fn multipart_body(field: &str, file_name: &str, content: &str) -> String {
        format!(
            "--{BOUNDARY}\r\n\
             Content-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n\
             {content}\r\n\
             --{BOUNDARY}--\r\n"
        )
    }

    fn post(uri: &str, body: String) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn body_text(resp: Response) -> String {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn form_and_health() {
        let tmp = tempfile::tempdir().unwrap();
        let app = app(tmp.path(), "[]");

        let resp = app
            .clone()
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(body_text(resp).await.contains("name=\"file\""));

        let resp = app
            .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(body_text(resp).await, "ok");
    }

    #[tokio::test]
    async fn missing_file_field_is_400() {
        let tmp = tempfile::tempdir().unwrap();
        let resp = app(tmp.path(), "[]")
            .oneshot(post("/", multipart_body("other", "a.pdf", "x")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_text(resp).await, "No file part");
    }

    #[tokio::test]
    async fn non_multipart_post_is_400() {
        let tmp = tempfile::tempdir().unwrap();
        let req = Request::builder()
            .method("POST")
            .uri("/upload")
            .body(Body::empty())
            .unwrap();
        let resp = app(tmp.path(), "[]").oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_text(resp).await, "No file part");
    }

    #[tokio::test]
    async fn unrecognized_file_with_no_events_is_200() {
        let tmp = tempfile::tempdir().unwrap();
        let resp = app(tmp.path(), "[]")
            .oneshot(post("/upload", multipart_body("file", "notes.txt", "hello")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(body_text(resp).await.contains("No events were found"));
    }

    #[tokio::test]
    async fn stage_failure_is_500() {
        let tmp = tempfile::tempdir().unwrap();
        let resp = app(tmp.path(), "Sure! Here are the events: [...]")
            .oneshot(post("/", multipart_body("file", "notes.txt", "hello")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body_text(resp)
            .await
            .starts_with("Error from AI analysis: AI did not return a valid JSON array."));
    }
}
