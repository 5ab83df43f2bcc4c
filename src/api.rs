//! HTTP surface for the PDF RAG service.
//!
//! This module exposes an Axum router with the following endpoints:
//!
//! - `GET /health` – Liveness probe.
//! - `POST /ask` – Answer a prompt with the completion model alone.
//! - `POST /chat` – Answer a user prompt under a system prompt.
//! - `POST /stream` – Stream the answer to a prompt as `text/plain`.
//! - `POST /rag/ingest` – Load, chunk, embed, and index a PDF from a server-side path.
//! - `POST /rag/query` – Answer a question from the indexed documents.
//! - `POST /rag/compare` – Answer a question with and without retrieval.
//! - `GET /rag/stats` – Index size and activity counters.
//! - `GET /commands` – Machine-readable command catalog for quick discovery by tools/hosts.
//!
//! Every JSON response is wrapped in `{ "message", "status_code", "data" }`; `data` is `null` on
//! errors. Each request carries an `X-Request-ID`, taken from the caller or generated.

use crate::completion::{CompletionClient, CompletionError};
use crate::config::Config;
use crate::index::IndexError;
use crate::processing::DocumentError;
use crate::rag::{RagApi, RagError};
use axum::{
    Extension, Json, Router,
    body::Body,
    extract::{Request, State, rejection::JsonRejection},
    http::{HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::convert::Infallible;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::Instrument;
use uuid::Uuid;

const REQUEST_ID_HEADER: &str = "x-request-id";
const MAX_REQUEST_TIMEOUT_SECS: u64 = 300;
const MAX_STREAM_TIMEOUT_SECS: u64 = 600;

/// Input limits enforced by the HTTP handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestLimits {
    /// Largest prompt or query, in characters.
    pub max_message_length: usize,
    /// Largest system prompt, in characters.
    pub max_system_message_length: usize,
    /// Top-K applied when a RAG request omits it.
    pub default_top_k: usize,
}

impl RequestLimits {
    /// Limits taken from the runtime configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_message_length: config.max_message_length,
            max_system_message_length: config.max_system_message_length,
            default_top_k: config.default_top_k,
        }
    }
}

impl Default for RequestLimits {
    fn default() -> Self {
        Self {
            max_message_length: 10_000,
            max_system_message_length: 5_000,
            default_top_k: 3,
        }
    }
}

/// Shared handler state.
struct AppState<S> {
    rag: Arc<S>,
    llm: Arc<dyn CompletionClient>,
    limits: RequestLimits,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            rag: Arc::clone(&self.rag),
            llm: Arc::clone(&self.llm),
            limits: self.limits,
        }
    }
}

/// Build the HTTP router exposing the completion and RAG endpoints.
pub fn create_router<S>(
    rag: Arc<S>,
    llm: Arc<dyn CompletionClient>,
    limits: RequestLimits,
) -> Router
where
    S: RagApi + 'static,
{
    let state = AppState { rag, llm, limits };
    Router::new()
        .route("/health", get(health))
        .route("/ask", post(ask::<S>))
        .route("/chat", post(chat::<S>))
        .route("/stream", post(stream_completion::<S>))
        .route("/rag/ingest", post(rag_ingest::<S>))
        .route("/rag/query", post(rag_query::<S>))
        .route("/rag/compare", post(rag_compare::<S>))
        .route("/rag/stats", get(rag_stats::<S>))
        .route("/commands", get(get_commands))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(middleware::from_fn(assign_request_id))
        .with_state(state)
}

/// Identifier attached to every request.
#[derive(Debug, Clone)]
struct RequestId(String);

async fn assign_request_id(mut request: Request, next: Next) -> Response {
    let id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let span = tracing::info_span!(
        "request",
        request_id = %id,
        method = %request.method(),
        path = %request.uri().path()
    );
    request.extensions_mut().insert(RequestId(id.clone()));

    let mut response = next.run(request).instrument(span).await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Response envelope shared by every JSON endpoint.
#[derive(Serialize)]
struct Envelope<T> {
    message: String,
    status_code: u16,
    data: Option<T>,
}

fn success<T: Serialize>(message: &str, data: T) -> Json<Envelope<T>> {
    Json(Envelope {
        message: message.to_string(),
        status_code: StatusCode::OK.as_u16(),
        data: Some(data),
    })
}

async fn health() -> Json<Envelope<serde_json::Value>> {
    success(
        "Service is healthy",
        json!({ "status": "ok", "service": "PDF RAG API" }),
    )
}

#[derive(Deserialize)]
struct AskRequest {
    prompt: String,
    #[serde(default)]
    timeout: Option<u64>,
}

#[derive(Deserialize)]
struct ChatRequest {
    system_prompt: String,
    user_prompt: String,
    #[serde(default)]
    timeout: Option<u64>,
}

#[derive(Deserialize)]
struct StreamRequest {
    prompt: String,
    #[serde(default)]
    system_prompt: Option<String>,
    #[serde(default)]
    timeout: Option<u64>,
}

/// Body of `/ask` and `/chat` responses.
#[derive(Serialize)]
struct CompletionData {
    response: String,
    model: String,
}

async fn ask<S>(
    State(state): State<AppState<S>>,
    payload: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Json<Envelope<CompletionData>>, ApiError>
where
    S: RagApi,
{
    let Json(request) = payload?;
    let prompt = validate_text("prompt", &request.prompt, state.limits.max_message_length)?;
    let timeout = validate_timeout(request.timeout, MAX_REQUEST_TIMEOUT_SECS)?;

    let response = state.llm.ask(prompt, timeout).await?;
    Ok(success(
        "Response generated successfully",
        CompletionData {
            response,
            model: state.llm.model().to_string(),
        },
    ))
}

async fn chat<S>(
    State(state): State<AppState<S>>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<Envelope<CompletionData>>, ApiError>
where
    S: RagApi,
{
    let Json(request) = payload?;
    let system_prompt = validate_text(
        "system_prompt",
        &request.system_prompt,
        state.limits.max_system_message_length,
    )?;
    let user_prompt = validate_text(
        "user_prompt",
        &request.user_prompt,
        state.limits.max_message_length,
    )?;
    let timeout = validate_timeout(request.timeout, MAX_REQUEST_TIMEOUT_SECS)?;

    let response = state.llm.chat(system_prompt, user_prompt, timeout).await?;
    Ok(success(
        "Chat response generated successfully",
        CompletionData {
            response,
            model: state.llm.model().to_string(),
        },
    ))
}

/// Stream the answer as plain text. Failures after the response started are appended to the
/// body as `\n[Error: ...]` because the status line has already been sent.
async fn stream_completion<S>(
    State(state): State<AppState<S>>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    payload: Result<Json<StreamRequest>, JsonRejection>,
) -> Result<Response, ApiError>
where
    S: RagApi,
{
    let Json(request) = payload?;
    let prompt =
        validate_text("prompt", &request.prompt, state.limits.max_message_length)?.to_string();
    let system_prompt = request
        .system_prompt
        .as_deref()
        .map(|system| {
            validate_text(
                "system_prompt",
                system,
                state.limits.max_system_message_length,
            )
            .map(str::to_string)
        })
        .transpose()?;
    let timeout = validate_timeout(request.timeout, MAX_STREAM_TIMEOUT_SECS)?;

    let llm = Arc::clone(&state.llm);
    let body = async_stream::stream! {
        match llm.stream(&prompt, system_prompt.as_deref(), timeout).await {
            Ok(mut fragments) => {
                let mut count = 0usize;
                while let Some(item) = fragments.next().await {
                    match item {
                        Ok(fragment) => {
                            count += 1;
                            yield Ok::<String, Infallible>(fragment);
                        }
                        Err(err) => {
                            tracing::error!(request_id = %request_id, error = %err, "Stream failed");
                            yield Ok(format!("\n[Error: {err}]"));
                            break;
                        }
                    }
                }
                tracing::info!(request_id = %request_id, fragments = count, "Stream completed");
            }
            Err(err) => {
                tracing::error!(request_id = %request_id, error = %err, "Stream failed to start");
                yield Ok(format!("\n[Error: {err}]"));
            }
        }
    };

    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(body),
    )
        .into_response())
}

#[derive(Deserialize)]
struct IngestRequest {
    pdf_path: String,
}

#[derive(Deserialize)]
struct RagQueryRequest {
    query: String,
    #[serde(default)]
    top_k: Option<usize>,
}

async fn rag_ingest<S>(
    State(state): State<AppState<S>>,
    payload: Result<Json<IngestRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError>
where
    S: RagApi,
{
    let Json(request) = payload?;
    let path = request.pdf_path.trim();
    if path.is_empty() {
        return Err(ApiError::bad_request("pdf_path cannot be empty"));
    }

    let outcome = state
        .rag
        .ingest_document(Path::new(path))
        .await
        .map_err(|err| ApiError::rag("Failed to ingest document", err))?;
    Ok(success("Document ingested successfully", outcome))
}

async fn rag_query<S>(
    State(state): State<AppState<S>>,
    payload: Result<Json<RagQueryRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError>
where
    S: RagApi,
{
    let Json(request) = payload?;
    let top_k = request.top_k.unwrap_or(state.limits.default_top_k);
    let outcome = state
        .rag
        .query(&request.query, top_k)
        .await
        .map_err(|err| ApiError::rag("Failed to process query", err))?;
    Ok(success("Query processed successfully", outcome))
}

async fn rag_compare<S>(
    State(state): State<AppState<S>>,
    payload: Result<Json<RagQueryRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError>
where
    S: RagApi,
{
    let Json(request) = payload?;
    let top_k = request.top_k.unwrap_or(state.limits.default_top_k);
    let outcome = state
        .rag
        .compare(&request.query, top_k)
        .await
        .map_err(|err| ApiError::rag("Failed to compare", err))?;
    Ok(success("Comparison completed successfully", outcome))
}

async fn rag_stats<S>(State(state): State<AppState<S>>) -> impl IntoResponse
where
    S: RagApi,
{
    success("RAG statistics retrieved successfully", state.rag.stats().await)
}

/// Descriptor for a single command in the discovery catalog.
#[derive(Serialize)]
struct CommandDescriptor {
    name: &'static str,
    method: &'static str,
    path: &'static str,
    description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_example: Option<serde_json::Value>,
}

/// Response body for `GET /commands`.
#[derive(Serialize)]
struct CommandsResponse {
    commands: Vec<CommandDescriptor>,
}

/// Enumerate supported HTTP commands for discovery/UX in hosts and tools.
async fn get_commands() -> Json<Envelope<CommandsResponse>> {
    success(
        "Commands retrieved successfully",
        CommandsResponse {
            commands: vec![
                CommandDescriptor {
                    name: "health",
                    method: "GET",
                    path: "/health",
                    description: "Report that the service is up.",
                    request_example: None,
                },
                CommandDescriptor {
                    name: "ask",
                    method: "POST",
                    path: "/ask",
                    description: "Answer a prompt with the completion model, without retrieval.",
                    request_example: Some(json!({ "prompt": "What is a vector index?", "timeout": 30 })),
                },
                CommandDescriptor {
                    name: "chat",
                    method: "POST",
                    path: "/chat",
                    description: "Answer a user prompt under a system prompt.",
                    request_example: Some(json!({
                        "system_prompt": "You are a concise assistant.",
                        "user_prompt": "Explain chunk overlap.",
                    })),
                },
                CommandDescriptor {
                    name: "stream",
                    method: "POST",
                    path: "/stream",
                    description: "Stream the answer to a prompt as plain text.",
                    request_example: Some(json!({ "prompt": "Tell me a story", "timeout": 120 })),
                },
                CommandDescriptor {
                    name: "rag_ingest",
                    method: "POST",
                    path: "/rag/ingest",
                    description: "Load a PDF from a server-side path, chunk it, embed the chunks, and add them to the index.",
                    request_example: Some(json!({ "pdf_path": "docs/report.pdf" })),
                },
                CommandDescriptor {
                    name: "rag_query",
                    method: "POST",
                    path: "/rag/query",
                    description: "Answer a question from the most relevant indexed chunks and list their sources.",
                    request_example: Some(json!({ "query": "Who wrote the report?", "top_k": 3 })),
                },
                CommandDescriptor {
                    name: "rag_compare",
                    method: "POST",
                    path: "/rag/compare",
                    description: "Answer a question with and without retrieval, side by side.",
                    request_example: Some(json!({ "query": "Who wrote the report?", "top_k": 3 })),
                },
                CommandDescriptor {
                    name: "rag_stats",
                    method: "GET",
                    path: "/rag/stats",
                    description: "Return index size, similarity threshold, and activity counters.",
                    request_example: None,
                },
            ],
        },
    )
}

fn validate_text<'a>(field: &str, value: &'a str, max_chars: usize) -> Result<&'a str, ApiError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ApiError::bad_request(format!("{field} cannot be empty")));
    }
    if value.chars().count() > max_chars {
        return Err(ApiError::bad_request(format!(
            "{field} exceeds maximum length of {max_chars} characters"
        )));
    }
    Ok(value)
}

fn validate_timeout(timeout: Option<u64>, max_secs: u64) -> Result<Option<Duration>, ApiError> {
    match timeout {
        None => Ok(None),
        Some(secs) if (1..=max_secs).contains(&secs) => Ok(Some(Duration::from_secs(secs))),
        Some(_) => Err(ApiError::bad_request(format!(
            "timeout must be between 1 and {max_secs} seconds"
        ))),
    }
}

/// Error rendered as an enveloped JSON response.
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn rag(context: &str, error: RagError) -> Self {
        let status = rag_status(&error);
        let message = if status.is_server_error() && status != StatusCode::GATEWAY_TIMEOUT {
            format!("{context}: {error}")
        } else {
            error.to_string()
        };
        Self { status, message }
    }
}

fn completion_status(error: &CompletionError) -> StatusCode {
    match error {
        CompletionError::InvalidPrompt(_) => StatusCode::BAD_REQUEST,
        CompletionError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        CompletionError::EmptyResponse | CompletionError::Api(_) => StatusCode::BAD_GATEWAY,
    }
}

fn rag_status(error: &RagError) -> StatusCode {
    match error {
        RagError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        RagError::Document(DocumentError::NotFound(_)) | RagError::NoDocuments(_) => {
            StatusCode::NOT_FOUND
        }
        RagError::Document(DocumentError::Chunking(_)) => StatusCode::BAD_REQUEST,
        RagError::Index(IndexError::Empty) => StatusCode::CONFLICT,
        RagError::Embedding(_) => StatusCode::BAD_GATEWAY,
        RagError::Completion(inner) => completion_status(inner),
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<CompletionError> for ApiError {
    fn from(error: CompletionError) -> Self {
        Self {
            status: completion_status(&error),
            message: error.to_string(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(format!("Validation error: {}", rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = self.status.as_u16(), error = %self.message, "Request failed");
        } else {
            tracing::warn!(status = self.status.as_u16(), error = %self.message, "Request rejected");
        }
        let body = Envelope::<()> {
            message: self.message,
            status_code: self.status.as_u16(),
            data: None,
        };
        (self.status, Json(body)).into_response()
    }
}
