//! Google Gemini `generateContent` client

use super::types::{LlmMessage, LlmRequest, LlmResponse, MessageRole, Usage};
use super::{LlmError, LlmService};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const PUBLIC_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Gemini service implementation
pub struct GeminiService {
    client: Client,
    url: String,
    api_key: Option<String>,
    model_id: String,
}

impl GeminiService {
    /// Build a client for `model`.
    ///
    /// With a gateway the gateway authenticates and no key is attached.
    /// Without one, `api_key` is sent in the `x-goog-api-key` header; a
    /// missing key is left for the provider to reject at call time.
    pub fn new(
        api_key: Option<&str>,
        model: &str,
        gateway: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        match gateway {
            Some(gw) => Self::with_url(
                format!(
                    "{}/gemini/v1beta/models/{model}:generateContent",
                    gw.trim_end_matches('/')
                ),
                None,
                model,
                timeout,
            ),
            None => Self::with_url(
                format!("{PUBLIC_BASE_URL}/v1beta/models/{model}:generateContent"),
                api_key,
                model,
                timeout,
            ),
        }
    }

    fn with_url(
        url: String,
        api_key: Option<&str>,
        model: &str,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::unknown(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            url,
            api_key: api_key.map(str::to_string),
            model_id: model.to_string(),
        })
    }

    pub(super) fn translate_request(request: &LlmRequest) -> GeminiRequest {
        let system_instruction = request
            .system
            .as_ref()
            .filter(|s| !s.is_empty())
            .map(|text| GeminiContent {
                role: None,
                parts: vec![GeminiPart::text(text.clone())],
            });

        let contents = request.messages.iter().map(translate_message).collect();

        GeminiRequest {
            contents,
            system_instruction,
            generation_config: GeminiGenerationConfig {
                max_output_tokens: request.max_tokens,
                temperature: request.sampling.temperature,
                top_p: request.sampling.top_p,
                top_k: request.sampling.top_k,
            },
        }
    }

    /// Collapse the first candidate into plain text. Thought parts are
    /// skipped. No candidates, or only empty parts, is a valid response
    /// with no text.
    pub(super) fn normalize_response(resp: GeminiResponse) -> LlmResponse {
        let usage = resp
            .usage_metadata
            .map(|u| Usage {
                input_tokens: u64::from(u.prompt_token_count),
                output_tokens: u64::from(u.candidates_token_count),
            })
            .unwrap_or_default();

        let Some(candidate) = resp.candidates.into_iter().next() else {
            return LlmResponse {
                text: None,
                finish_reason: None,
                usage,
            };
        };

        let text: String = candidate
            .content
            .map(|c| c.parts)
            .unwrap_or_default()
            .into_iter()
            .filter(|p| p.thought != Some(true))
            .map(|p| p.text)
            .collect();

        LlmResponse {
            text: (!text.is_empty()).then_some(text),
            finish_reason: candidate.finish_reason,
            usage,
        }
    }
}

fn translate_message(msg: &LlmMessage) -> GeminiContent {
    let role = match msg.role {
        MessageRole::User => "user",
        MessageRole::Assistant => "model",
    };
    GeminiContent {
        role: Some(role.to_string()),
        parts: vec![GeminiPart::text(msg.text.clone())],
    }
}

fn classify_error(status: StatusCode, body: &str) -> LlmError {
    let Ok(error_resp) = serde_json::from_str::<GeminiErrorResponse>(body) else {
        return match status.as_u16() {
            401 | 403 => LlmError::auth(format!("HTTP {status}: {body}")),
            429 => LlmError::rate_limit(format!("HTTP {status}: {body}")),
            500..=599 => LlmError::server_error(format!("HTTP {status}: {body}")),
            _ => LlmError::unknown(format!("HTTP {status} error: {body}")),
        };
    };

    let message = error_resp.error.message;
    match status.as_u16() {
        400 => LlmError::invalid_request(format!("Invalid request: {message}")),
        401 | 403 => LlmError::auth(format!("Authentication failed: {message}")),
        429 => LlmError::rate_limit(format!("Rate limit exceeded: {message}")),
        500..=599 => LlmError::server_error(format!("Server error: {message}")),
        _ => LlmError::unknown(format!("HTTP {status}: {message}")),
    }
}

#[async_trait]
impl LlmService for GeminiService {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let gemini_request = Self::translate_request(request);

        let mut builder = self.client.post(&self.url).json(&gemini_request);
        if let Some(key) = &self.api_key {
            builder = builder.header(API_KEY_HEADER, key);
        }

        // Error text must not echo the request URL
        let response = builder
            .send()
            .await
            .map_err(|e| {
                let e = e.without_url();
                if e.is_timeout() {
                    LlmError::network(format!("Request timeout: {e}"))
                } else if e.is_connect() {
                    LlmError::network(format!("Connection failed: {e}"))
                } else {
                    LlmError::unknown(format!("Request failed: {e}"))
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| LlmError::network(format!("Failed to read response: {}", e.without_url())))?;

        if !status.is_success() {
            return Err(classify_error(status, &body));
        }

        let gemini_response: GeminiResponse = serde_json::from_str(&body).map_err(|e| {
            LlmError::malformed(format!("Failed to parse response: {e} - body: {body}"))
        })?;

        Ok(Self::normalize_response(gemini_response))
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

// Gemini API types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    /// Absent on non-text parts such as function calls
    #[serde(default)]
    text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    thought: Option<bool>,
}

impl GeminiPart {
    fn text(text: String) -> Self {
        Self {
            text,
            thought: None,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    usage_metadata: Option<GeminiUsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorResponse {
    error: GeminiError,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmErrorKind, SamplingParams};
    use axum::http::{HeaderMap, StatusCode as AxumStatus, Uri};
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::sync::{Arc, Mutex};

    fn sample_request() -> LlmRequest {
        LlmRequest {
            system: Some("Be brief.".to_string()),
            messages: vec![
                LlmMessage::assistant("Hello!"),
                LlmMessage::user("What are the bricks made of?"),
            ],
            sampling: SamplingParams {
                temperature: Some(0.7),
                top_p: Some(0.8),
                top_k: Some(40),
            },
            max_tokens: None,
        }
    }

    fn parse(body: Value) -> LlmResponse {
        GeminiService::normalize_response(serde_json::from_value(body).unwrap())
    }

    /// Serve `body` with `status` on every path, recording request bodies.
    async fn spawn_stub(
        status: AxumStatus,
        body: &'static str,
        delay: Duration,
    ) -> (String, Arc<Mutex<Vec<Value>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let captured = seen.clone();
        let app = Router::new().fallback(move |Json(req): Json<Value>| {
            let captured = captured.clone();
            async move {
                captured.lock().unwrap().push(req);
                tokio::time::sleep(delay).await;
                (status, body)
            }
        });
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), seen)
    }

    #[test]
    fn test_translate_request_wire_shape() {
        let wire = serde_json::to_value(GeminiService::translate_request(&sample_request())).unwrap();

        assert_eq!(
            wire,
            json!({
                "contents": [
                    { "role": "model", "parts": [{ "text": "Hello!" }] },
                    { "role": "user", "parts": [{ "text": "What are the bricks made of?" }] }
                ],
                "systemInstruction": { "parts": [{ "text": "Be brief." }] },
                "generationConfig": { "temperature": 0.7, "topP": 0.8, "topK": 40 }
            })
        );
    }

    #[test]
    fn test_translate_request_omits_empty_system() {
        let mut request = sample_request();
        request.system = Some(String::new());
        request.sampling = SamplingParams::default();
        request.max_tokens = Some(256);

        let wire = serde_json::to_value(GeminiService::translate_request(&request)).unwrap();
        assert!(wire.get("systemInstruction").is_none());
        assert_eq!(wire["generationConfig"], json!({ "maxOutputTokens": 256 }));
    }

    #[test]
    fn test_normalize_joins_text_and_skips_thoughts() {
        let response = parse(json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [
                        { "text": "planning...", "thought": true },
                        { "text": "Coffee waste " },
                        { "text": "and palm leaves." }
                    ]
                },
                "finishReason": "STOP"
            }],
            "usageMetadata": { "promptTokenCount": 12, "candidatesTokenCount": 5, "totalTokenCount": 17 }
        }));

        assert_eq!(response.text.as_deref(), Some("Coffee waste and palm leaves."));
        assert_eq!(response.finish_reason.as_deref(), Some("STOP"));
        assert_eq!(response.usage.input_tokens, 12);
        assert_eq!(response.usage.output_tokens, 5);
    }

    #[test]
    fn test_normalize_missing_text_is_none() {
        assert!(parse(json!({})).text.is_none());
        assert!(parse(json!({ "candidates": [] })).text.is_none());
        assert!(parse(json!({ "candidates": [{ "finishReason": "SAFETY" }] })).text.is_none());
        assert!(parse(json!({
            "candidates": [{ "content": { "parts": [{ "text": "" }] } }]
        }))
        .text
        .is_none());
    }

    #[test]
    fn test_classify_error_statuses() {
        let body = r#"{"error":{"code":400,"message":"bad","status":"INVALID_ARGUMENT"}}"#;
        let cases = [
            (StatusCode::BAD_REQUEST, LlmErrorKind::InvalidRequest),
            (StatusCode::UNAUTHORIZED, LlmErrorKind::Auth),
            (StatusCode::FORBIDDEN, LlmErrorKind::Auth),
            (StatusCode::TOO_MANY_REQUESTS, LlmErrorKind::RateLimit),
            (StatusCode::SERVICE_UNAVAILABLE, LlmErrorKind::ServerError),
            (StatusCode::IM_A_TEAPOT, LlmErrorKind::Unknown),
        ];
        for (status, kind) in cases {
            assert_eq!(classify_error(status, body).kind, kind, "status {status}");
        }

        assert_eq!(
            classify_error(StatusCode::TOO_MANY_REQUESTS, "slow down").kind,
            LlmErrorKind::RateLimit
        );
        assert_eq!(
            classify_error(StatusCode::BAD_GATEWAY, "<html>").kind,
            LlmErrorKind::ServerError
        );
    }

    #[test]
    fn test_direct_url_keeps_key_out_of_query() {
        let service = GeminiService::new(
            Some("secret"),
            "gemini-3-flash-preview",
            None,
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(
            service.url,
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-3-flash-preview:generateContent"
        );
        assert_eq!(service.api_key.as_deref(), Some("secret"));
        assert_eq!(service.model_id(), "gemini-3-flash-preview");
    }

    #[tokio::test]
    async fn test_key_sent_as_header() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let captured = seen.clone();
        let app = Router::new().fallback(move |uri: Uri, headers: HeaderMap| {
            let captured = captured.clone();
            async move {
                let key = headers
                    .get(API_KEY_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                captured.lock().unwrap().push((uri.to_string(), key));
                (AxumStatus::OK, r#"{"candidates":[]}"#)
            }
        });
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        let service = GeminiService::with_url(
            format!("http://{addr}/v1beta/models/m:generateContent"),
            Some("SECRETKEY123"),
            "m",
            Duration::from_secs(5),
        )
        .unwrap();

        service.complete(&sample_request()).await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(!seen[0].0.contains("SECRETKEY123"), "key in {}", seen[0].0);
        assert_eq!(seen[0].1.as_deref(), Some("SECRETKEY123"));
    }

    #[tokio::test]
    async fn test_transport_error_does_not_expose_key() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let service = GeminiService::with_url(
            format!("http://{addr}/v1beta/models/m:generateContent"),
            Some("SECRETKEY123"),
            "m",
            Duration::from_secs(5),
        )
        .unwrap();

        let err = service.complete(&sample_request()).await.unwrap_err();
        assert_eq!(err.kind, LlmErrorKind::Network);
        assert!(!err.message.contains("SECRETKEY123"), "{}", err.message);
        assert!(!err.message.contains("generateContent"), "{}", err.message);
    }

    #[test]
    fn test_gateway_url_has_no_key() {
        let service = GeminiService::new(
            Some("secret"),
            "gemini-3-flash-preview",
            Some("http://gateway.local/llm/"),
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(
            service.url,
            "http://gateway.local/llm/gemini/v1beta/models/gemini-3-flash-preview:generateContent"
        );        assert!(service.api_key.is_none());
    }

    #[tokio::test]
    async fn test_complete_round_trip_through_gateway() {
        let (base, seen) = spawn_stub(
            AxumStatus::OK,
            r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Carbon-negative bricks."}]},"finishReason":"STOP"}]}"#,
            Duration::ZERO,
        )
        .await;
        let service = GeminiService::new(None, "test-model", Some(&base), Duration::from_secs(5)).unwrap();

        let response = service.complete(&sample_request()).await.unwrap();

        assert_eq!(response.text.as_deref(), Some("Carbon-negative bricks."));
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0]["generationConfig"]["topK"], json!(40));
        assert_eq!(seen[0]["contents"][1]["role"], json!("user"));
    }

    #[tokio::test]
    async fn test_complete_classifies_http_error() {
        let (base, _) = spawn_stub(
            AxumStatus::FORBIDDEN,
            r#"{"error":{"code":403,"message":"API key not valid","status":"PERMISSION_DENIED"}}"#,
            Duration::ZERO,
        )
        .await;
        let service = GeminiService::new(None, "test-model", Some(&base), Duration::from_secs(5)).unwrap();

        let err = service.complete(&sample_request()).await.unwrap_err();
        assert_eq!(err.kind, LlmErrorKind::Auth);
        assert!(err.message.contains("API key not valid"));
    }

    #[tokio::test]
    async fn test_complete_rejects_malformed_body() {
        let (base, _) = spawn_stub(AxumStatus::OK, "not json", Duration::ZERO).await;
        let service = GeminiService::new(None, "test-model", Some(&base), Duration::from_secs(5)).unwrap();

        let err = service.complete(&sample_request()).await.unwrap_err();
        assert_eq!(err.kind, LlmErrorKind::MalformedResponse);
    }

    #[tokio::test]
    async fn test_complete_times_out() {
        let (base, _) = spawn_stub(AxumStatus::OK, "{}", Duration::from_secs(5)).await;
        let service =
            GeminiService::new(None, "test-model", Some(&base), Duration::from_millis(100)).unwrap();

        let err = service.complete(&sample_request()).await.unwrap_err();
        assert_eq!(err.kind, LlmErrorKind::Network);
    }

    #[tokio::test]
    async fn test_complete_connection_refused() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let service = GeminiService::new(
            None,
            "test-model",
            Some(&format!("http://{addr}")),
            Duration::from_secs(5),
        )
        .unwrap();

        let err = service.complete(&sample_request()).await.unwrap_err();
        assert_eq!(err.kind, LlmErrorKind::Network);
    }
}
