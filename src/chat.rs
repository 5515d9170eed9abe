//! EcoloBot chat responder
//!
//! Answers from the keyword table when a trigger matches, otherwise asks
//! the generation service. Never fails: every error path resolves to a
//! fixed reply string.

mod keywords;
mod prompt;

#[cfg(test)]
mod proptests;

pub use keywords::{match_keyword, KeywordRule, KEYWORD_RULES};
pub use prompt::{EMPTY_REPLY, FAILURE_REPLY, GREETING, SAMPLING, SUGGESTIONS, SYSTEM_INSTRUCTION};

use crate::llm::{LlmMessage, LlmRequest, LlmService};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Speaker of a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    #[serde(alias = "model")]
    Assistant,
}

/// One message of a conversation. Fields are private so a turn cannot
/// change after it is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    role: Role,
    text: String,
}

impl ConversationTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
        }
    }

    #[cfg(test)]
    pub fn role(&self) -> Role {
        self.role
    }

    #[cfg(test)]
    pub fn text(&self) -> &str {
        &self.text
    }

    fn to_llm_message(&self) -> LlmMessage {
        match self.role {
            Role::User => LlmMessage::user(self.text.clone()),
            Role::Assistant => LlmMessage::assistant(self.text.clone()),
        }
    }
}

/// Produces EcoloBot replies. Cheap to clone; the service is shared.
#[derive(Clone)]
pub struct ChatResponder {
    llm: Arc<dyn LlmService>,
    rules: &'static [KeywordRule],
}

impl ChatResponder {
    pub fn new(llm: Arc<dyn LlmService>) -> Self {
        Self {
            llm,
            rules: KEYWORD_RULES,
        }
    }

    pub fn model_id(&self) -> &str {
        self.llm.model_id()
    }

    /// Reply to `message` given the turns that preceded it.
    ///
    /// `message` must not already be in `history`; it is appended as the
    /// final user turn of the generation request.
    pub async fn respond(&self, history: &[ConversationTurn], message: &str) -> String {
        if let Some(rule) = match_keyword(self.rules, message) {
            tracing::debug!(trigger = rule.trigger, "Answered from keyword table");
            return rule.reply.to_string();
        }

        let request = build_request(history, message);
        match self.llm.complete(&request).await {
            Ok(response) => match response.non_empty_text() {
                Some(text) => text.to_string(),
                None => {
                    tracing::warn!(
                        finish_reason = response.finish_reason.as_deref().unwrap_or("none"),
                        "Generation service returned no text"
                    );
                    EMPTY_REPLY.to_string()
                }
            },
            Err(e) => {
                tracing::error!(kind = %e.kind, error = %e.message, "Generation service error");
                FAILURE_REPLY.to_string()
            }
        }
    }
}

fn build_request(history: &[ConversationTurn], message: &str) -> LlmRequest {
    let messages = history
        .iter()
        .map(ConversationTurn::to_llm_message)
        .chain(std::iter::once(LlmMessage::user(message)))
        .collect();

    LlmRequest {
        system: Some(SYSTEM_INSTRUCTION.to_string()),
        messages,
        sampling: SAMPLING,
        max_tokens: None,
    }
}
