//! Inference backend: an OpenAI-compatible chat completions client.
//!
//! The default target is Groq. Errors are classified so the enricher can
//! decide between retrying, re-prompting, and degrading.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, header};
use serde_json::{Value, json};
use tracing::debug;

use noirmap_shared::{DegradationReason, EnrichmentConfig, MapperError, Result};

/// User-Agent string for inference requests.
const USER_AGENT: &str = concat!("noirmap/", env!("CARGO_PKG_VERSION"));

/// Longest error body kept in a [`InferenceError::Client`] message.
const MAX_ERROR_BODY: usize = 300;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Classified failure of a single completion call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InferenceError {
    #[error("rate limited by inference service")]
    RateLimited { retry_after: Option<Duration> },

    #[error("inference request timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("inference service error (HTTP {status})")]
    Server { status: u16 },

    #[error("request rejected (HTTP {status}): {message}")]
    Client { status: u16, message: String },

    #[error("invalid model output: {0}")]
    InvalidOutput(String),

    #[error("no inference credential configured")]
    MissingCredential,
}

impl InferenceError {
    /// Whether the same request may succeed if sent again later.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::Timeout | Self::Transport(_) | Self::Server { .. }
        )
    }

    /// Server-requested wait before the next attempt.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Warning category recorded when this error exhausts enrichment.
    pub fn degradation_reason(&self) -> DegradationReason {
        match self {
            Self::RateLimited { .. } => DegradationReason::QuotaExceeded,
            Self::Timeout => DegradationReason::Timeout,
            Self::Transport(_) | Self::Server { .. } => DegradationReason::Transport,
            Self::Client { .. } => DegradationReason::ClientError,
            Self::InvalidOutput(_) => DegradationReason::InvalidOutput,
            Self::MissingCredential => DegradationReason::MissingCredential,
        }
    }
}

// ---------------------------------------------------------------------------
// Backend trait
// ---------------------------------------------------------------------------

/// One chat completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    /// JSON schema the answer must follow, sent as a strict `response_format`.
    pub schema: Option<Value>,
}

/// A service that turns a prompt into text.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Send one completion request. No retries happen at this level.
    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> std::result::Result<String, InferenceError>;

    /// Model identifier, for logs.
    fn model(&self) -> &str;
}

// ---------------------------------------------------------------------------
// GroqClient
// ---------------------------------------------------------------------------

/// Chat completions client for Groq or any OpenAI-compatible endpoint.
#[derive(Debug, Clone)]
pub struct GroqClient {
    http: Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
}

impl GroqClient {
    /// Build a client from runtime config. A missing key is not an error here;
    /// every call then fails with [`InferenceError::MissingCredential`].
    pub fn new(config: &EnrichmentConfig, api_key: Option<String>) -> Result<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.timeout)
            .build()
            .map_err(|e| MapperError::config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }

    fn request_body(&self, request: &CompletionRequest) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.user },
            ],
            "temperature": self.temperature,
            "stream": false,
        });
        if let Some(schema) = &request.schema {
            body["response_format"] = json!({
                "type": "json_schema",
                "json_schema": {
                    "name": "endpoint_enrichment",
                    "schema": schema,
                    "strict": true,
                },
            });
        }
        body
    }
}

#[async_trait]
impl InferenceBackend for GroqClient {
    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> std::result::Result<String, InferenceError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(InferenceError::MissingCredential)?;

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&self.request_body(request))
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);
            return Err(InferenceError::RateLimited { retry_after });
        }
        if status.is_server_error() {
            return Err(InferenceError::Server {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message: String = text.chars().take(MAX_ERROR_BODY).collect();
            return Err(InferenceError::Client {
                status: status.as_u16(),
                message,
            });
        }

        let payload: Value = response.json().await.map_err(|e| {
            if e.is_timeout() {
                InferenceError::Timeout
            } else {
                InferenceError::InvalidOutput(format!("response is not JSON: {e}"))
            }
        })?;

        let content = payload
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(str::trim)
            .unwrap_or_default();
        if content.is_empty() {
            return Err(InferenceError::InvalidOutput("empty completion".into()));
        }

        debug!(chars = content.len(), "completion received");
        Ok(content.to_string())
    }

    fn model(&self) -> &str {
        &self.model
    }
}

fn classify_transport(err: reqwest::Error) -> InferenceError {
    if err.is_timeout() {
        InferenceError::Timeout
    } else {
        InferenceError::Transport(err.to_string())
    }
}

/// `Retry-After` in delta-seconds form. HTTP-date values are ignored.
fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    value
        .parse::<f64>()
        .ok()
        .filter(|s| s.is_finite() && *s >= 0.0)
        .map(Duration::from_secs_f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use noirmap_shared::AppConfig;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, key: Option<&str>) -> GroqClient {
        let mut config = EnrichmentConfig::from(&AppConfig::default());
        config.endpoint = format!("{}/openai/v1/chat/completions", server.uri());
        config.timeout = Duration::from_millis(500);
        GroqClient::new(&config, key.map(String::from)).unwrap()
    }

    fn request() -> CompletionRequest {
        CompletionRequest {
            system: "sys".into(),
            user: "GET /users".into(),
            schema: Some(json!({"type": "object"})),
        }
    }

    fn completion(content: &str) -> Value {
        json!({ "choices": [ { "message": { "role": "assistant", "content": content } } ] })
    }

    #[tokio::test]
    async fn sends_strict_schema_and_bearer_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/openai/v1/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(json!({
                "model": "openai/gpt-oss-120b",
                "response_format": { "type": "json_schema", "json_schema": { "strict": true } }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("{\"ok\":true}")))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, Some("test-key"));
        let text = client.complete(&request()).await.unwrap();
        assert_eq!(text, "{\"ok\":true}");
    }

    #[tokio::test]
    async fn classifies_rate_limit_with_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
            .mount(&server)
            .await;

        let err = client_for(&server, Some("k"))
            .complete(&request())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            InferenceError::RateLimited {
                retry_after: Some(Duration::from_secs(7))
            }
        );
        assert!(err.is_transient());
        assert_eq!(err.degradation_reason(), DegradationReason::QuotaExceeded);
    }

    #[tokio::test]
    async fn classifies_server_and_client_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("authorization", "Bearer five"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(header("authorization", "Bearer four"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
            .mount(&server)
            .await;

        let err = client_for(&server, Some("five"))
            .complete(&request())
            .await
            .unwrap_err();
        assert_eq!(err, InferenceError::Server { status: 503 });
        assert!(err.is_transient());

        let err = client_for(&server, Some("four"))
            .complete(&request())
            .await
            .unwrap_err();
        assert!(matches!(err, InferenceError::Client { status: 401, ref message } if message.contains("invalid api key")));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn slow_service_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(completion("{}"))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let err = client_for(&server, Some("k"))
            .complete(&request())
            .await
            .unwrap_err();
        assert_eq!(err, InferenceError::Timeout);
    }

    #[tokio::test]
    async fn empty_completion_is_invalid_output() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
            .mount(&server)
            .await;

        let err = client_for(&server, Some("k"))
            .complete(&request())
            .await
            .unwrap_err();
        assert!(matches!(err, InferenceError::InvalidOutput(_)));
    }

    #[tokio::test]
    async fn missing_key_fails_without_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = client_for(&server, Some("  "))
            .complete(&request())
            .await
            .unwrap_err();
        assert_eq!(err, InferenceError::MissingCredential);
    }

    #[test]
    fn retry_after_forms() {
        assert_eq!(parse_retry_after("3"), Some(Duration::from_secs(3)));
        assert_eq!(parse_retry_after("1.5"), Some(Duration::from_millis(1500)));
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
    }
}
