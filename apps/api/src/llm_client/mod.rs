//! LLM Client: the single point of entry for all Gemini API calls in JobMatch.
//!
//! ARCHITECTURAL RULE: No other module may call the Generative Language API directly.
//! All LLM interactions MUST go through this module.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::Config;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[source] reqwest::Error),

    #[error("Request timed out")]
    Timeout,

    #[error("Authentication rejected (status {status}): {message}")]
    Auth { status: u16, message: String },

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Rate limited after {attempts} attempts")]
    RateLimited { attempts: u32 },

    #[error("Malformed response: {0}")]
    Parse(String),

    #[error("Prompt blocked by safety filters: {0}")]
    Blocked(String),

    #[error("LLM returned empty content")]
    EmptyContent,
}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            LlmError::Timeout
        } else if e.is_decode() {
            LlmError::Parse(e.to_string())
        } else {
            LlmError::Http(e)
        }
    }
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<RequestContent<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    role: &'a str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    pub prompt_feedback: Option<PromptFeedback>,
    pub usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub content: Option<CandidateContent>,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CandidateContent {
    #[serde(default)]
    pub parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
pub struct CandidatePart {
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    pub block_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    #[serde(default)]
    pub prompt_token_count: u32,
    #[serde(default)]
    pub candidates_token_count: u32,
}

impl GenerateContentResponse {
    /// Concatenates the text parts of the first candidate.
    pub fn text(&self) -> Option<String> {
        let parts = &self.candidates.first()?.content.as_ref()?.parts;
        let text: String = parts.iter().filter_map(|p| p.text.as_deref()).collect();
        Some(text)
    }
}

#[derive(Debug, Deserialize)]
struct GoogleError {
    error: GoogleErrorBody,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorBody {
    message: String,
    #[serde(default)]
    status: String,
}

/// Connection settings for the Gemini API.
#[derive(Debug, Clone)]
pub struct GeminiSettings {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
    pub max_attempts: u32,
    /// First backoff delay; doubled on each further attempt.
    pub retry_base_delay: Duration,
}

impl GeminiSettings {
    /// Returns `None` when no API key is configured.
    pub fn from_config(config: &Config) -> Option<Self> {
        let api_key = config.gemini_api_key.clone()?;
        Some(Self {
            api_key,
            model: config.gemini_model.clone(),
            base_url: config.gemini_base_url.clone(),
            timeout: config.gemini_timeout,
            max_attempts: config.gemini_max_attempts.max(1),
            retry_base_delay: Duration::from_secs(1),
        })
    }
}

/// Wraps the `generateContent` endpoint with bounded retry on 429 / 5xx.
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    settings: GeminiSettings,
}

impl GeminiClient {
    pub fn new(settings: GeminiSettings) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(LlmError::Http)?;
        Ok(Self { client, settings })
    }

    pub fn model(&self) -> &str {
        &self.settings.model
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.settings.base_url.trim_end_matches('/'),
            self.settings.model
        )
    }

    /// Sends a single-turn prompt and returns the full response object.
    pub async fn call(&self, prompt: &str) -> Result<GenerateContentResponse, LlmError> {
        let request_body = GenerateContentRequest {
            contents: vec![RequestContent {
                role: "user",
                parts: vec![RequestPart { text: prompt }],
            }],
        };
        let endpoint = self.endpoint();
        let max_attempts = self.settings.max_attempts.max(1);

        let mut last_error: Option<LlmError> = None;

        for attempt in 0..max_attempts {
            if attempt > 0 {
                let delay = self.settings.retry_base_delay * (1 << (attempt - 1));
                warn!(
                    "Gemini call attempt {} failed, retrying after {}ms...",
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let response = self
                .client
                .post(&endpoint)
                .header("x-goog-api-key", &self.settings.api_key)
                .json(&request_body)
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    let err = LlmError::from(e);
                    // Timeouts are not retried; the budget is already spent.
                    if matches!(err, LlmError::Timeout) {
                        return Err(err);
                    }
                    last_error = Some(err);
                    continue;
                }
            };

            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS {
                warn!("Gemini API rate limited (attempt {})", attempt + 1);
                last_error = Some(LlmError::RateLimited {
                    attempts: attempt + 1,
                });
                continue;
            }

            if status.is_server_error() {
                let body = response.text().await.unwrap_or_default();
                warn!("Gemini API returned {}: {}", status, body);
                last_error = Some(LlmError::Api {
                    status: status.as_u16(),
                    message: error_message(&body).0,
                });
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(classify_client_error(status, &body));
            }

            let body = response.text().await?;
            let parsed: GenerateContentResponse =
                serde_json::from_str(&body).map_err(|e| LlmError::Parse(e.to_string()))?;

            if let Some(usage) = &parsed.usage_metadata {
                debug!(
                    "Gemini call succeeded: prompt_tokens={}, candidate_tokens={}",
                    usage.prompt_token_count, usage.candidates_token_count
                );
            }

            return Ok(parsed);
        }

        Err(last_error.unwrap_or(LlmError::RateLimited {
            attempts: max_attempts,
        }))
    }

    /// Calls the model and returns its text, trimmed. Blocked prompts and
    /// candidates with no text are reported as errors.
    pub async fn generate_text(&self, prompt: &str) -> Result<String, LlmError> {
        let response = self.call(prompt).await?;

        if let Some(reason) = response
            .prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.clone())
        {
            return Err(LlmError::Blocked(reason));
        }

        let text = response.text().unwrap_or_default();
        let text = text.trim();
        if text.is_empty() {
            let finish_reason = response
                .candidates
                .first()
                .and_then(|c| c.finish_reason.as_deref())
                .unwrap_or("none");
            debug!("Gemini returned no text (finish_reason={finish_reason})");
            return Err(LlmError::EmptyContent);
        }
        Ok(text.to_string())
    }
}

/// Extracts `(message, status)` from a Google error body, falling back to the raw body.
fn error_message(body: &str) -> (String, String) {
    serde_json::from_str::<GoogleError>(body)
        .map(|e| (e.error.message, e.error.status))
        .unwrap_or_else(|_| (body.to_string(), String::new()))
}

fn classify_client_error(status: StatusCode, body: &str) -> LlmError {
    let (message, google_status) = error_message(body);
    // An invalid key comes back as 400 INVALID_ARGUMENT rather than 401.
    let bad_key = status == StatusCode::BAD_REQUEST
        && google_status == "INVALID_ARGUMENT"
        && message.contains("API key");

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN || bad_key {
        LlmError::Auth {
            status: status.as_u16(),
            message,
        }
    } else {
        LlmError::Api {
            status: status.as_u16(),
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const GENERATE_PATH: &str = "/v1beta/models/gemini-2.5-flash:generateContent";

    fn test_client(base_url: &str, max_attempts: u32) -> GeminiClient {
        GeminiClient::new(GeminiSettings {
            api_key: "test-api-key".to_string(),
            model: "gemini-2.5-flash".to_string(),
            base_url: base_url.to_string(),
            timeout: Duration::from_secs(5),
            max_attempts,
            retry_base_delay: Duration::from_millis(10),
        })
        .unwrap()
    }

    fn mock_gemini_response(text: &str) -> serde_json::Value {
        json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [{ "text": text }]
                },
                "finishReason": "STOP"
            }],
            "usageMetadata": {
                "promptTokenCount": 42,
                "candidatesTokenCount": 17,
                "totalTokenCount": 59
            }
        })
    }

    #[tokio::test]
    async fn test_generate_text_success() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .and(header("x-goog-api-key", "test-api-key"))
            .and(body_partial_json(json!({
                "contents": [{ "role": "user", "parts": [{ "text": "Hello" }] }]
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(mock_gemini_response("  Hi there!\n")),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = test_client(&mock_server.uri(), 1);
        let text = client.generate_text("Hello").await.unwrap();
        assert_eq!(text, "Hi there!");
    }

    #[tokio::test]
    async fn test_multiple_parts_are_concatenated() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": { "parts": [{ "text": "Part one. " }, { "text": "Part two." }] }
                }]
            })))
            .mount(&mock_server)
            .await;

        let client = test_client(&mock_server.uri(), 1);
        assert_eq!(
            client.generate_text("x").await.unwrap(),
            "Part one. Part two."
        );
    }

    #[tokio::test]
    async fn test_unauthorized_maps_to_auth_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "error": { "code": 403, "message": "Permission denied", "status": "PERMISSION_DENIED" }
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = test_client(&mock_server.uri(), 3);
        let err = client.generate_text("x").await.unwrap_err();
        match err {
            LlmError::Auth { status, message } => {
                assert_eq!(status, 403);
                assert_eq!(message, "Permission denied");
            }
            other => panic!("expected Auth, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_invalid_key_400_maps_to_auth_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {
                    "code": 400,
                    "message": "API key not valid. Please pass a valid API key.",
                    "status": "INVALID_ARGUMENT"
                }
            })))
            .mount(&mock_server)
            .await;

        let client = test_client(&mock_server.uri(), 1);
        assert!(matches!(
            client.generate_text("x").await,
            Err(LlmError::Auth { status: 400, .. })
        ));
    }

    #[tokio::test]
    async fn test_bad_request_maps_to_api_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": { "code": 400, "message": "Invalid JSON payload", "status": "INVALID_ARGUMENT" }
            })))
            .mount(&mock_server)
            .await;

        let client = test_client(&mock_server.uri(), 1);
        match client.generate_text("x").await.unwrap_err() {
            LlmError::Api { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "Invalid JSON payload");
            }
            other => panic!("expected Api, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_server_error_is_retried_until_success() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .up_to_n_times(1)
            .expect(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(mock_gemini_response("ok")))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = test_client(&mock_server.uri(), 2);
        assert_eq!(client.generate_text("x").await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn test_single_attempt_does_not_retry() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .respond_with(ResponseTemplate::new(429))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = test_client(&mock_server.uri(), 1);
        assert!(matches!(
            client.generate_text("x").await,
            Err(LlmError::RateLimited { attempts: 1 })
        ));
    }

    #[tokio::test]
    async fn test_blocked_prompt_is_reported() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "promptFeedback": { "blockReason": "SAFETY" }
            })))
            .mount(&mock_server)
            .await;

        let client = test_client(&mock_server.uri(), 1);
        match client.generate_text("x").await.unwrap_err() {
            LlmError::Blocked(reason) => assert_eq!(reason, "SAFETY"),
            other => panic!("expected Blocked, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_candidates_is_empty_content() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "candidates": [] })))
            .mount(&mock_server)
            .await;

        let client = test_client(&mock_server.uri(), 1);
        assert!(matches!(
            client.generate_text("x").await,
            Err(LlmError::EmptyContent)
        ));
    }

    #[tokio::test]
    async fn test_non_json_body_is_parse_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&mock_server)
            .await;

        let client = test_client(&mock_server.uri(), 1);
        assert!(matches!(
            client.generate_text("x").await,
            Err(LlmError::Parse(_))
        ));
    }

    #[test]
    fn test_endpoint_strips_trailing_slash() {
        let client = test_client("https://example.test/", 1);
        assert_eq!(
            client.endpoint(),
            "https://example.test/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }

    #[test]
    fn test_settings_absent_without_key() {
        let config = Config::from_lookup(|_| None).unwrap();
        assert!(GeminiSettings::from_config(&config).is_none());
    }
}
