//! Generation service configuration

use super::{GeminiService, LlmError, LlmService, LoggingService};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_MODEL: &str = "gemini-3-flash-preview";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Configuration for the generation service
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub model: String,
    /// Gateway base URL; when set the gateway handles authentication
    pub gateway: Option<String>,
    pub timeout: Duration,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            gateway: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl LlmConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        Self {
            api_key: non_empty("API_KEY").or_else(|| non_empty("GEMINI_API_KEY")),
            model: non_empty("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            gateway: non_empty("LLM_GATEWAY"),
            timeout: non_empty("LLM_TIMEOUT_SECS")
                .and_then(|s| s.parse().ok())
                .map_or(DEFAULT_TIMEOUT, Duration::from_secs),
        }
    }

    /// Build the logging-wrapped service. A missing key is not an error
    /// here; it surfaces as a failed call.
    pub fn build_service(&self) -> Result<Arc<dyn LlmService>, LlmError> {
        if self.gateway.is_none() && self.api_key.is_none() {
            tracing::warn!(
                "No generation API key configured. Set API_KEY or LLM_GATEWAY; \
                 messages without a keyword match will get the fallback reply."
            );
        }

        let service = GeminiService::new(
            self.api_key.as_deref(),
            &self.model,
            self.gateway.as_deref(),
            self.timeout,
        )?;

        Ok(Arc::new(LoggingService::new(Arc::new(service))))
    }
}
