//! HTTP API v1: sessions, runs and tools.
//!
//! Endpoints:
//!
//! - `POST   /v1/sessions`: Create a session
//! - `GET    /v1/sessions/{id}`: Transcript and status
//! - `DELETE /v1/sessions/{id}`: Drop a session
//! - `POST   /v1/sessions/{id}/run`: Run one turn, wait for the result
//! - `POST   /v1/sessions/{id}/run/stream`: Run one turn, SSE of run events
//! - `POST   /v1/sessions/{id}/reset`: Clear state and transcript
//! - `GET    /v1/tools`: List available tools

use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    response::sse::{Event as SseEvent, Sse},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use sidekick_agent::{HaltReason, RunFailure, RunOutcome};
use sidekick_core::error::Error;
use sidekick_core::event::{EventSink, RunEvent};
use sidekick_core::state::{ConversationState, SuccessCriteria};

use crate::SharedState;
use crate::session::{CommitError, Session, TranscriptEntry};

/// Build the v1 API router. Nest this under "/v1" in the main router.
pub fn v1_router(state: SharedState) -> Router {
    Router::new()
        .route("/sessions", post(create_session_handler))
        .route(
            "/sessions/{id}",
            get(get_session_handler).delete(delete_session_handler),
        )
        .route("/sessions/{id}/run", post(run_handler))
        .route("/sessions/{id}/run/stream", post(run_stream_handler))
        .route("/sessions/{id}/reset", post(reset_handler))
        .route("/tools", get(list_tools_handler))
        .with_state(state)
}

// ── Request / Response types ──────────────────────────────────────────────

#[derive(Deserialize)]
struct RunRequest {
    message: String,
    #[serde(default, alias = "criteria")]
    success_criteria: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct CreateSessionResponse {
    session_id: String,
    created_at: String,
}

#[derive(Serialize)]
struct SessionResponse {
    session_id: String,
    transcript: Vec<TranscriptEntry>,
    needs_user_input: bool,
    success_criteria: String,
    message_count: usize,
    updated_at: String,
}

impl SessionResponse {
    fn from_session(id: &str, session: &Session) -> Self {
        Self {
            session_id: id.to_string(),
            transcript: session.transcript.clone(),
            needs_user_input: session.state.needs_user_input,
            success_criteria: session.state.success_criteria.to_string(),
            message_count: session.state.messages.len(),
            updated_at: session.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Serialize)]
struct RunResponse {
    session_id: String,
    reply: String,
    feedback: String,
    needs_user_input: bool,
    halt_reason: HaltReason,
    iterations: u32,
    transcript: Vec<TranscriptEntry>,
}

#[derive(Serialize, Deserialize)]
struct ToolListResponse {
    tools: Vec<ToolDto>,
    count: usize,
}

#[derive(Serialize, Deserialize)]
struct ToolDto {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

fn session_not_found(id: &str) -> ApiError {
    api_error(StatusCode::NOT_FOUND, format!("Session not found: {id}"))
}

/// Status code for a run that failed inside the loop.
fn failure_status(failure: &RunFailure) -> StatusCode {
    match &failure.source {
        Error::Provider(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn commit_error(id: &str, err: CommitError) -> ApiError {
    match err {
        CommitError::NotFound => session_not_found(id),
        CommitError::Stale | CommitError::Cancelled => {
            api_error(StatusCode::CONFLICT, err.to_string())
        }
    }
}

// ── Handlers ──────────────────────────────────────────────────────────────

async fn create_session_handler(
    State(state): State<SharedState>,
) -> (StatusCode, Json<CreateSessionResponse>) {
    let mut sessions = state.sessions.write().await;
    let id = sessions.create();
    let created_at = sessions
        .get(&id)
        .map(|s| s.created_at.to_rfc3339())
        .unwrap_or_default();
    info!(session = %id, "Session created");

    (
        StatusCode::CREATED,
        Json(CreateSessionResponse {
            session_id: id,
            created_at,
        }),
    )
}

async fn get_session_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<SessionResponse>, ApiError> {
    let sessions = state.sessions.read().await;
    let session = sessions.get(&id).ok_or_else(|| session_not_found(&id))?;
    Ok(Json(SessionResponse::from_session(&id, session)))
}

async fn delete_session_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let mut sessions = state.sessions.write().await;
    sessions
        .remove(&id)
        .map(|_| StatusCode::NO_CONTENT)
        .ok_or_else(|| session_not_found(&id))
}

async fn reset_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<SessionResponse>, ApiError> {
    let mut sessions = state.sessions.write().await;
    let session = sessions.get_mut(&id).ok_or_else(|| session_not_found(&id))?;
    session.reset();
    info!(session = %id, "Session reset");
    Ok(Json(SessionResponse::from_session(&id, session)))
}

/// What a run starts from: a copy of the session state, the revision it
/// must commit against and a token the session cancels on reset or delete.
struct Checkout {
    prior: ConversationState,
    revision: u64,
    cancel: CancellationToken,
}

/// Snapshot the state a run will start from. The lock is released before
/// the run begins.
async fn checkout(
    state: &SharedState,
    id: &str,
    payload: &RunRequest,
) -> Result<Checkout, ApiError> {
    if payload.message.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "message must not be empty"));
    }
    let sessions = state.sessions.read().await;
    let session = sessions.get(id).ok_or_else(|| session_not_found(id))?;
    Ok(Checkout {
        prior: session.state.clone(),
        revision: session.revision(),
        cancel: session.run_token(),
    })
}

fn criteria(payload: &RunRequest) -> SuccessCriteria {
    SuccessCriteria::new(payload.success_criteria.clone().unwrap_or_default())
}

async fn run_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(payload): Json<RunRequest>,
) -> Result<Json<RunResponse>, ApiError> {
    let Checkout {
        prior,
        revision,
        cancel,
    } = checkout(&state, &id, &payload).await?;
    info!(session = %id, message_len = payload.message.len(), "v1/run request");

    // Dropping this handler (client gone) drops the run with it
    let outcome = state
        .orchestrator
        .run_cancellable(
            &payload.message,
            criteria(&payload),
            Some(prior),
            &EventSink::none(),
            &cancel,
        )
        .await
        .map_err(|failure| {
            warn!(session = %id, error = %failure, "Run failed");
            api_error(failure_status(&failure), failure.to_string())
        })?;

    let mut sessions = state.sessions.write().await;
    let session = sessions
        .commit(&id, revision, &payload.message, &outcome)
        .map_err(|e| commit_error(&id, e))?;

    Ok(Json(run_response(&id, outcome, session)))
}

fn run_response(id: &str, outcome: RunOutcome, session: &Session) -> RunResponse {
    RunResponse {
        session_id: id.to_string(),
        reply: outcome.reply,
        feedback: outcome.feedback,
        needs_user_input: outcome.needs_user_input,
        halt_reason: outcome.halt_reason,
        iterations: outcome.iterations,
        transcript: session.transcript.clone(),
    }
}

// ── SSE Streaming ─────────────────────────────────────────────────────────

/// `POST /v1/sessions/{id}/run/stream`: run a turn, streaming `RunEvent`s.
///
/// The run is committed to the session the same way as a blocking run. It
/// is cancelled when the client closes the stream or the session is reset
/// or deleted; a cancelled run is not committed.
async fn run_stream_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(payload): Json<RunRequest>,
) -> Result<Sse<impl futures::Stream<Item = Result<SseEvent, Infallible>>>, ApiError> {
    let Checkout {
        prior,
        revision,
        cancel,
    } = checkout(&state, &id, &payload).await?;
    info!(session = %id, message_len = payload.message.len(), "v1/run/stream SSE request");

    let (sink, rx) = EventSink::channel(64);
    let criteria = criteria(&payload);

    tokio::spawn(async move {
        let disconnect = tokio::spawn({
            let sink = sink.clone();
            let cancel = cancel.clone();
            async move {
                sink.closed().await;
                cancel.cancel();
            }
        });

        let result = state
            .orchestrator
            .run_cancellable(&payload.message, criteria, Some(prior), &sink, &cancel)
            .await;
        disconnect.abort();

        match result {
            Ok(outcome) => {
                let committed = state
                    .sessions
                    .write()
                    .await
                    .commit(&id, revision, &payload.message, &outcome)
                    .map(|_| ());
                if let Err(e) = committed {
                    warn!(session = %id, error = ?e, "Streamed run not committed");
                    sink.emit(RunEvent::Error {
                        message: e.to_string(),
                    })
                    .await;
                }
            }
            // Already reported to the stream by the orchestrator
            Err(failure) => warn!(session = %id, error = %failure, "Streamed run failed"),
        }
    });

    let stream = ReceiverStream::new(rx).map(|event| {
        let event_type = event.event_type();
        let data = serde_json::to_string(&event).unwrap_or_default();
        Ok(SseEvent::default().event(event_type).data(data))
    });

    Ok(Sse::new(stream))
}

async fn list_tools_handler(State(state): State<SharedState>) -> Json<ToolListResponse> {
    let defs = state.orchestrator.tools().definitions();
    let count = defs.len();

    Json(ToolListResponse {
        tools: defs
            .into_iter()
            .map(|d| ToolDto {
                name: d.name,
                description: d.description,
                parameters: d.parameters,
            })
            .collect(),
        count,
    })
}
