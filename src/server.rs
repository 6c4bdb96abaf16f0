//! HTTP server exposing the knowledge base.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/extract` | Wipe and rebuild the knowledge base from a wiki |
//! | `POST` | `/ask` | Answer a question with hybrid retrieval |
//! | `POST` | `/search` | Semantic search returning raw ranked fragments |
//! | `GET`  | `/status` | Document/chunk counts and readiness |
//! | `GET`  | `/documents` | List all indexed documents |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "question is required" } }
//! ```
//!
//! Error codes: `bad_request` (400), `auth_failed` (401), `not_found` (404),
//! `internal` (500). Internal errors return a generic message; the detail is
//! logged server-side only.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser-based
//! clients.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::answer::{ExtractiveSynthesizer, Synthesizer};
use crate::config::Config;
use crate::db;
use crate::index::VectorIndex;
use crate::ingest::{self, ExtractError};
use crate::migrate;
use crate::models::RankedChunk;
use crate::qa;
use crate::retrieval;
use crate::status;

/// Shared application state. The vector index (and with it the embedding
/// backend) is constructed once at startup and shared by `Arc` — the
/// process-wide singleton services, owned explicitly rather than hidden in
/// globals.
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    pool: sqlx::SqlitePool,
    index: Arc<VectorIndex>,
    synthesizer: Arc<dyn Synthesizer>,
}

/// Start the HTTP server. Binds to `[server].bind` and runs until the
/// process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pool = db::connect(&config.db.path).await?;
    migrate::create_relational_schema(&pool).await?;

    let index = Arc::new(VectorIndex::open(config).await?);

    let state = AppState {
        config: Arc::new(config.clone()),
        pool,
        index,
        synthesizer: Arc::new(ExtractiveSynthesizer),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/extract", post(handle_extract))
        .route("/ask", post(handle_ask))
        .route("/search", post(handle_search))
        .route("/status", get(handle_status))
        .route("/documents", get(handle_documents))
        .layer(cors)
        .with_state(state);

    info!("wikidex listening on http://{}", config.server.bind);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
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

fn auth_failed(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::UNAUTHORIZED,
        code: "auth_failed".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

/// 500 with a generic message; the detail goes to the log only.
fn internal(err: anyhow::Error) -> AppError {
    error!(error = %err, "internal server error");
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: "An unexpected error occurred".to_string(),
    }
}

fn map_extract_error(err: ExtractError) -> AppError {
    match err {
        ExtractError::MissingUrl => bad_request(err.to_string()),
        ExtractError::AuthFailed => auth_failed(err.to_string()),
        ExtractError::NoContent => not_found(err.to_string()),
        ExtractError::Internal(e) => internal(e),
    }
}

// ============ POST /extract ============

#[derive(Deserialize)]
struct ExtractRequest {
    wiki_url: Option<String>,
}

#[derive(Serialize)]
struct ExtractResponse {
    message: String,
    documents_processed: u64,
    total_chunks_created: u64,
    total_pages_found: u64,
}

async fn handle_extract(
    State(state): State<AppState>,
    Json(req): Json<ExtractRequest>,
) -> Result<Json<ExtractResponse>, AppError> {
    let wiki_url = req
        .wiki_url
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| bad_request("wiki_url is required"))?;

    let report = ingest::run_extract(&state.config, &state.pool, &state.index, &wiki_url)
        .await
        .map_err(map_extract_error)?;

    Ok(Json(ExtractResponse {
        message: "Content extracted and indexed successfully".to_string(),
        documents_processed: report.documents_processed,
        total_chunks_created: report.total_chunks_created,
        total_pages_found: report.total_pages_found,
    }))
}

// ============ POST /ask ============

#[derive(Deserialize)]
struct AskRequest {
    question: Option<String>,
}

async fn handle_ask(
    State(state): State<AppState>,
    Json(req): Json<AskRequest>,
) -> Result<Json<qa::AskOutcome>, AppError> {
    let question = req
        .question
        .filter(|q| !q.trim().is_empty())
        .ok_or_else(|| bad_request("question is required"))?;

    let outcome = qa::answer_question(
        &state.config,
        &state.pool,
        &state.index,
        state.synthesizer.as_ref(),
        &question,
    )
    .await
    .map_err(internal)?;

    Ok(Json(outcome))
}

// ============ POST /search ============

#[derive(Deserialize)]
struct SearchRequest {
    query: Option<String>,
    limit: Option<usize>,
}

#[derive(Serialize)]
struct SearchResponse {
    query: String,
    results: Vec<RankedChunk>,
}

/// Semantic-only search: no numeric-code keyword pass, raw ranked fragments.
async fn handle_search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    let query = req
        .query
        .filter(|q| !q.trim().is_empty())
        .ok_or_else(|| bad_request("query is required"))?;

    let limit = req.limit.unwrap_or(state.config.retrieval.search_limit);

    let results = retrieval::retrieve(
        &state.index,
        &query,
        limit,
        None,
        state.config.retrieval.candidate_pool,
    )
    .await;

    Ok(Json(SearchResponse { query, results }))
}

// ============ GET /status ============

async fn handle_status(
    State(state): State<AppState>,
) -> Result<Json<status::StatusReport>, AppError> {
    let report = status::knowledge_base_status(&state.pool)
        .await
        .map_err(internal)?;
    Ok(Json(report))
}

// ============ GET /documents ============

#[derive(Serialize)]
struct DocumentsResponse {
    documents: Vec<status::DocumentSummary>,
}

async fn handle_documents(
    State(state): State<AppState>,
) -> Result<Json<DocumentsResponse>, AppError> {
    let documents = status::list_documents(&state.pool)
        .await
        .map_err(internal)?;
    Ok(Json(DocumentsResponse { documents }))
}
