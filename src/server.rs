//! Browser admin panel and upload API.
//!
//! Serves a small HTML page with one card per knowledge base (upload +
//! delete forms) and the JSON endpoints behind it.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Static admin panel |
//! | `POST` | `/upload` | Multipart upload of one or more documents |
//! | `POST` | `/delete` | Delete one document by filename |
//! | `GET`  | `/documents?agent_type=` | List stored filenames |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! Error responses are JSON:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "unknown agent type" } }
//! ```
//!
//! A batch upload never fails as a whole because of one file: unsupported
//! extensions are skipped and per-file extraction or ingestion errors are
//! reported next to the successes.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Multipart, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::engine::RetrievalEngine;
use crate::extract;
use crate::models::AgentType;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    engines: Arc<HashMap<AgentType, Arc<RetrievalEngine>>>,
}

impl AppState {
    pub fn new(engines: HashMap<AgentType, Arc<RetrievalEngine>>) -> Self {
        Self {
            engines: Arc::new(engines),
        }
    }

    fn engine(&self, agent_type: AgentType) -> Result<&Arc<RetrievalEngine>, AppError> {
        self.engines.get(&agent_type).ok_or_else(|| {
            bad_request(format!("no knowledge base configured for {}", agent_type))
        })
    }
}

/// Builds the panel router. Split out from [`run_server`] so tests can drive
/// it in-process.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_panel))
        .route("/upload", post(handle_upload))
        .route("/delete", post(handle_delete))
        .route("/documents", get(handle_documents))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Starts the admin panel server. Runs until the process is terminated.
pub async fn run_server(bind_addr: &str, state: AppState) -> anyhow::Result<()> {
    let app = build_router(state);
    info!(addr = bind_addr, "admin panel listening");
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn internal_error(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

// ============ GET / ============

const PANEL_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>docpilot — document admin</title>
<style>
  body { font-family: system-ui, sans-serif; max-width: 960px; margin: 2rem auto; }
  .card { border: 1px solid #ccc; border-radius: 8px; padding: 1rem 1.5rem; margin-bottom: 1.5rem; }
  h2 { margin-top: 0; }
  form { margin: 0.75rem 0; }
  input[type="text"] { width: 18rem; }
</style>
</head>
<body>
<h1>docpilot</h1>
<p>Upload PDF or DOCX documents into a knowledge base, or remove a document by filename.</p>

<div class="card">
  <h2>Standards</h2>
  <form action="/upload" method="post" enctype="multipart/form-data">
    <input type="hidden" name="agent_type" value="standards">
    <input type="file" name="files" accept=".pdf,.docx" multiple required>
    <button type="submit">Upload</button>
  </form>
  <form action="/delete" method="post">
    <input type="hidden" name="agent_type" value="standards">
    <input type="text" name="filename" placeholder="filename to delete" required>
    <button type="submit">Delete</button>
  </form>
  <p><a href="/documents?agent_type=standards">List stored documents</a></p>
</div>

<div class="card">
  <h2>Contracts</h2>
  <form action="/upload" method="post" enctype="multipart/form-data">
    <input type="hidden" name="agent_type" value="contracts">
    <input type="file" name="files" accept=".pdf,.docx" multiple required>
    <button type="submit">Upload</button>
  </form>
  <form action="/delete" method="post">
    <input type="hidden" name="agent_type" value="contracts">
    <input type="text" name="filename" placeholder="filename to delete" required>
    <button type="submit">Delete</button>
  </form>
  <p><a href="/documents?agent_type=contracts">List stored documents</a></p>
</div>
</body>
</html>
"#;

async fn handle_panel() -> Html<&'static str> {
    Html(PANEL_HTML)
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /upload ============

#[derive(Serialize)]
struct UploadResponse {
    processed: usize,
    chunks: usize,
    skipped: Vec<String>,
    errors: Vec<FileError>,
}

#[derive(Serialize)]
struct FileError {
    filename: String,
    error: String,
}

/// Handler for `POST /upload`.
///
/// Reads every part before processing because the browser may send the
/// `agent_type` field after the file parts.
async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let mut agent_type: Option<AgentType> = None;
    let mut files: Vec<(String, Vec<u8>)> = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("malformed multipart body: {}", e)))?
    {
        match field.name() {
            Some("agent_type") => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| bad_request(format!("invalid agent_type field: {}", e)))?;
                agent_type = Some(value.parse().map_err(|e| bad_request(format!("{}", e)))?);
            }
            Some("files") => {
                let filename = field.file_name().unwrap_or_default().to_string();
                if filename.is_empty() {
                    continue;
                }
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| bad_request(format!("failed to read upload: {}", e)))?;
                files.push((filename, bytes.to_vec()));
            }
            _ => {}
        }
    }

    let agent_type = agent_type.ok_or_else(|| bad_request("agent_type field is required"))?;
    let engine = state.engine(agent_type)?.clone();
    if files.is_empty() {
        return Err(bad_request("no files in upload"));
    }

    let mut response = UploadResponse {
        processed: 0,
        chunks: 0,
        skipped: Vec::new(),
        errors: Vec::new(),
    };

    for (filename, bytes) in files {
        if !extract::is_supported(&filename) {
            response.skipped.push(filename);
            continue;
        }
        let source = format!("upload/{}", filename);
        let doc = match extract::extract_from_bytes(&filename, &source, &bytes) {
            Ok(doc) => doc,
            Err(e) => {
                error!(%filename, error = %e, "extraction failed");
                response.errors.push(FileError {
                    filename,
                    error: e.to_string(),
                });
                continue;
            }
        };
        match engine.ingest(&doc).await {
            Ok(chunks) => {
                response.processed += 1;
                response.chunks += chunks;
            }
            Err(e) => {
                error!(%filename, error = %e, "ingestion failed");
                response.errors.push(FileError {
                    filename,
                    error: format!("{:#}", e),
                });
            }
        }
    }

    Ok(Json(response))
}

// ============ POST /delete ============

#[derive(Deserialize)]
struct DeleteRequest {
    agent_type: String,
    filename: String,
}

async fn handle_delete(
    State(state): State<AppState>,
    Form(request): Form<DeleteRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let agent_type: AgentType = request
        .agent_type
        .parse()
        .map_err(|e| bad_request(format!("{}", e)))?;
    if request.filename.is_empty() {
        return Err(bad_request("filename must not be empty"));
    }
    let engine = state.engine(agent_type)?;
    engine
        .delete_document(&request.filename)
        .await
        .map_err(|e| internal_error(format!("{:#}", e)))?;
    Ok(Json(serde_json::json!({ "deleted": request.filename })))
}

// ============ GET /documents ============

#[derive(Deserialize)]
struct DocumentsQuery {
    agent_type: String,
}

async fn handle_documents(
    State(state): State<AppState>,
    Query(query): Query<DocumentsQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let agent_type: AgentType = query
        .agent_type
        .parse()
        .map_err(|e| bad_request(format!("{}", e)))?;
    let engine = state.engine(agent_type)?;
    let documents = engine
        .list_documents()
        .await
        .map_err(|e| internal_error(format!("{:#}", e)))?;
    Ok(Json(serde_json::json!({ "documents": documents })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::Chunker;
    use crate::embedding::{Embedder, InputType};
    use crate::generation::Generator;
    use crate::store::memory::InMemoryIndex;
    use crate::store::ScopedIndex;
    use anyhow::Result;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    struct StubEmbedder;

    #[async_trait]
    impl Embedder for StubEmbedder {
        async fn embed_batch(
            &self,
            texts: &[String],
            _input_type: InputType,
        ) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }
        fn dims(&self) -> usize {
            2
        }
    }

    struct StubGenerator;

    #[async_trait]
    impl Generator for StubGenerator {
        async fn complete(&self, _system: &str, _user: &str) -> Result<String> {
            Ok("answer".to_string())
        }
    }

    fn test_state() -> AppState {
        let index = Arc::new(InMemoryIndex::new());
        let mut engines = HashMap::new();
        for agent in AgentType::ALL {
            engines.insert(
                agent,
                Arc::new(RetrievalEngine::new(
                    agent,
                    Arc::new(StubEmbedder),
                    Arc::new(StubGenerator),
                    ScopedIndex::new(index.clone(), Some(agent)),
                    Chunker::new(100, 20).unwrap(),
                    5,
                    100,
                )),
            );
        }
        AppState::new(engines)
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), 1 << 20)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn panel_lists_both_knowledge_bases() {
        let app = build_router(test_state());
        let response = app
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), 1 << 20)
            .await
            .unwrap();
        let html = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(html.contains("Standards"));
        assert!(html.contains("Contracts"));
        assert!(html.contains("/upload"));
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let app = build_router(test_state());
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn documents_requires_known_agent_type() {
        let app = build_router(test_state());
        let response = app
            .oneshot(
                Request::get("/documents?agent_type=legal")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "bad_request");
    }

    #[tokio::test]
    async fn documents_starts_empty() {
        let app = build_router(test_state());
        let response = app
            .oneshot(
                Request::get("/documents?agent_type=standards")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["documents"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn delete_accepts_form_and_returns_filename() {
        let app = build_router(test_state());
        let response = app
            .oneshot(
                Request::post("/delete")
                    .header("content-type", "application/x-www-form-urlencoded")
                    .body(Body::from("agent_type=contracts&filename=dogovor.pdf"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["deleted"], "dogovor.pdf");
    }

    fn multipart_body(boundary: &str, agent_type: &str, files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{b}\r\ncontent-disposition: form-data; name=\"agent_type\"\r\n\r\n{a}\r\n",
                b = boundary,
                a = agent_type
            )
            .as_bytes(),
        );
        for (filename, bytes) in files {
            body.extend_from_slice(
                format!(
                    "--{b}\r\ncontent-disposition: form-data; name=\"files\"; filename=\"{f}\"\r\n\
                     content-type: application/octet-stream\r\n\r\n",
                    b = boundary,
                    f = filename
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());
        body
    }

    #[tokio::test]
    async fn upload_skips_unsupported_and_reports_bad_files() {
        let app = build_router(test_state());
        let boundary = "testboundary";
        let body = multipart_body(
            boundary,
            "standards",
            &[("notes.txt", b"plain text"), ("broken.pdf", b"not a pdf")],
        );
        let response = app
            .oneshot(
                Request::post("/upload")
                    .header(
                        "content-type",
                        format!("multipart/form-data; boundary={}", boundary),
                    )
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["processed"], 0);
        assert_eq!(json["skipped"], serde_json::json!(["notes.txt"]));
        assert_eq!(json["errors"][0]["filename"], "broken.pdf");
    }

    #[tokio::test]
    async fn upload_without_agent_type_is_rejected() {
        let app = build_router(test_state());
        let boundary = "testboundary";
        let body = format!(
            "--{b}\r\ncontent-disposition: form-data; name=\"files\"; filename=\"a.pdf\"\r\n\r\nx\r\n--{b}--\r\n",
            b = boundary
        );
        let response = app
            .oneshot(
                Request::post("/upload")
                    .header(
                        "content-type",
                        format!("multipart/form-data; boundary={}", boundary),
                    )
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
