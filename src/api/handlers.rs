//! HTTP request handlers

use super::types::{
    ChatRequest, ChatResponse, ErrorResponse, RespondRequest, RespondResponse, SessionResponse,
    SuccessResponse, SuggestionsResponse, VersionResponse,
};
use super::AppState;
use crate::chat::SUGGESTIONS;
use crate::session::SessionError;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Widget chrome
        .route("/api/chat/suggestions", get(list_suggestions))
        // Caller-held history
        .route("/api/chat/respond", post(respond))
        // Server-held history
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/:id", get(get_session).delete(delete_session))
        .route("/api/sessions/:id/chat", post(send_chat))
        .route("/version", get(get_version))
        .with_state(state)
}

// ============================================================
// Stateless chat
// ============================================================

async fn list_suggestions() -> Json<SuggestionsResponse> {
    Json(SuggestionsResponse {
        suggestions: SUGGESTIONS.to_vec(),
    })
}

async fn respond(
    State(state): State<AppState>,
    Json(req): Json<RespondRequest>,
) -> Result<Json<RespondResponse>, AppError> {
    require_text(&req.message)?;

    let reply = state
        .sessions
        .responder()
        .respond(&req.history, &req.message)
        .await;

    Ok(Json(RespondResponse { reply }))
}

// ============================================================
// Sessions
// ============================================================

async fn create_session(State(state): State<AppState>) -> Json<SessionResponse> {
    let session = state.sessions.create().await;
    Json(SessionResponse { session })
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionResponse>, AppError> {
    let session = state.sessions.get(&id).await?;
    Ok(Json(SessionResponse { session }))
}

async fn send_chat(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    require_text(&req.text)?;

    let result = state.sessions.send(&id, &req.text).await?;

    Ok(Json(ChatResponse {
        reply: result.reply,
        session: result.session,
    }))
}

async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>, AppError> {
    state.sessions.remove(&id).await?;
    Ok(Json(SuccessResponse { success: true }))
}

async fn get_version(State(state): State<AppState>) -> Json<VersionResponse> {
    Json(VersionResponse {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        model: state.sessions.responder().model_id().to_string(),
    })
}

/// The widget never sends blank input; reject it rather than spend a call
fn require_text(text: &str) -> Result<(), AppError> {
    if text.trim().is_empty() {
        return Err(AppError::BadRequest("Message must not be empty".to_string()));
    }
    Ok(())
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
enum AppError {
    BadRequest(String),
    NotFound(String),
}

impl From<SessionError> for AppError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::NotFound(_) => AppError::NotFound(e.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}
