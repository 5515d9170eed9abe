//! API request and response types

use crate::chat::ConversationTurn;
use crate::session::SessionSnapshot;
use serde::{Deserialize, Serialize};

/// Stateless reply request: the caller owns the history
#[derive(Debug, Deserialize)]
pub struct RespondRequest {
    #[serde(default)]
    pub history: Vec<ConversationTurn>,
    pub message: String,
}

/// Message sent on a session
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct RespondResponse {
    pub reply: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub reply: String,
    pub session: SessionSnapshot,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub session: SessionSnapshot,
}

#[derive(Debug, Serialize)]
pub struct SuggestionsResponse {
    pub suggestions: Vec<&'static str>,
}

#[derive(Debug, Serialize)]
pub struct VersionResponse {
    pub name: &'static str,
    pub version: &'static str,
    pub model: String,
}

/// Response for lifecycle actions
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
