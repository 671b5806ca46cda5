//! HTTP API.
//!
//! - POST /upload          - multipart `files`; rebuilds the knowledge base
//! - POST /generate-tests  - form `query`; returns a test plan
//! - POST /generate-script - form `test_case`, `html_filename`; returns a Selenium script

use std::sync::Arc;

use anyhow::Context as _;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Form, Json, Router};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::agents::QaAgents;
use crate::knowledge::{KnowledgeBase, DEFAULT_TOP_K};
use crate::store::ContentStore;

const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub store: ContentStore,
    pub knowledge: Arc<RwLock<KnowledgeBase>>,
    pub agents: QaAgents,
    pub top_k: usize,
}

impl AppState {
    pub fn new(store: ContentStore, agents: QaAgents) -> Self {
        Self {
            store,
            knowledge: Arc::new(RwLock::new(KnowledgeBase::new())),
            agents,
            top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_knowledge_base(mut self, knowledge: KnowledgeBase) -> Self {
        self.knowledge = Arc::new(RwLock::new(knowledge));
        self
    }
}

#[derive(Debug, Deserialize)]
pub struct GenerateTestsForm {
    pub query: String,
}

#[derive(Debug, Deserialize)]
pub struct GenerateScriptForm {
    pub test_case: String,
    pub html_filename: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/upload", post(upload))
        .route("/generate-tests", post(generate_tests))
        .route("/generate-script", post(generate_script))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

/// Clear the knowledge base, store every uploaded file, and index them.
///
/// POST /upload
async fn upload(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    let mut saved = Vec::new();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "malformed multipart upload");
                return error_response(StatusCode::BAD_REQUEST, e.to_string());
            }
        };
        if field.name() != Some("files") {
            continue;
        }
        let Some(filename) = field.file_name().map(String::from) else {
            continue;
        };
        let bytes = match field.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
        };
        if let Err(e) = state.store.save(&filename, &bytes) {
            error!(file = %filename, error = %e, "failed to store upload");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}"));
        }
        saved.push(filename);
    }

    if saved.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "No files uploaded.");
    }

    let mut knowledge = state.knowledge.write().await;
    knowledge.clear();
    let mut chunks = 0;
    for filename in &saved {
        match state.store.read(filename) {
            Ok(content) => chunks += knowledge.ingest(filename, &content),
            Err(e) => warn!(file = %filename, error = %e, "skipping unreadable upload"),
        }
    }

    info!(files = saved.len(), chunks = chunks, "knowledge base built");
    Json(json!({ "message": "Knowledge Base Built", "chunks": chunks })).into_response()
}

/// Draft a test plan from the indexed documentation.
///
/// POST /generate-tests
async fn generate_tests(
    State(state): State<AppState>,
    Form(form): Form<GenerateTestsForm>,
) -> Response {
    let chunks = state.knowledge.read().await.search(&form.query, state.top_k);

    match state.agents.generate_test_plan(&form.query, &chunks).await {
        Ok(plan) => Json(plan).into_response(),
        Err(e) => {
            error!(error = %e, "test plan generation failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// Draft a Selenium script for one test case against a stored HTML upload.
///
/// POST /generate-script
async fn generate_script(
    State(state): State<AppState>,
    Form(form): Form<GenerateScriptForm>,
) -> Response {
    if !state.store.exists(&form.html_filename) {
        return error_response(StatusCode::NOT_FOUND, "HTML file not found.");
    }
    let html = match state.store.read(&form.html_filename) {
        Ok(html) => html,
        Err(e) => return error_response(StatusCode::NOT_FOUND, e.to_string()),
    };

    match state.agents.generate_script(&form.test_case, &html).await {
        Ok(script) => Json(json!({ "script": script })).into_response(),
        Err(e) => {
            error!(file = %form.html_filename, error = %e, "script generation failed");
            error_response(StatusCode::BAD_GATEWAY, e.to_string())
        }
    }
}

/// Serve the API until Ctrl-C.
pub async fn run_server(state: AppState, host: &str, port: u16) -> anyhow::Result<()> {
    let ct = CancellationToken::new();
    let shutdown = ct.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
            shutdown.cancel();
        }
    });

    let bind_addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {bind_addr}"))?;

    info!(addr = %bind_addr, "API listening on http://{bind_addr}");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { ct.cancelled().await })
        .await
        .context("HTTP server error")?;

    info!("API server shut down");
    Ok(())
}
