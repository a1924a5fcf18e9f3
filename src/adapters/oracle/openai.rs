//! OpenAI-compatible chat completions oracle.
//!
//! Works against any endpoint that speaks the `/chat/completions` protocol.
//! HTTP failures are classified so the gateway knows what to retry:
//! - 401/403: `Auth`
//! - 408, 429, 5xx, connection failures, timeouts: `Transient`
//! - any other status, empty content, non-JSON content: `Malformed`

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::domain::errors::OracleError;
use crate::domain::models::OracleConfig;
use crate::domain::ports::{GenerationOracle, OracleRequest};

const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Oracle backed by an OpenAI-compatible HTTP API.
pub struct OpenAiOracle {
    config: OracleConfig,
    api_key: Option<String>,
    client: reqwest::Client,
    limiter: Option<Arc<DefaultDirectRateLimiter>>,
}

impl OpenAiOracle {
    /// Build the oracle. The API key comes from the config or, failing that,
    /// from `OPENAI_API_KEY`. A missing key surfaces as an `Auth` failure on
    /// the first request.
    pub fn new(config: OracleConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var(API_KEY_ENV).ok());

        let limiter = NonZeroU32::new(config.requests_per_second)
            .map(|rps| Arc::new(RateLimiter::direct(Quota::per_second(rps))));

        Ok(Self {
            config,
            api_key,
            client,
            limiter,
        })
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }

    fn build_body<'a>(&'a self, request: &'a OracleRequest) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.role_instructions,
                },
                ChatMessage {
                    role: "user",
                    content: &request.payload,
                },
            ],
            temperature: request.temperature,
            max_tokens: self.config.max_tokens,
            response_format: request.json_reply.then_some(ResponseFormat {
                kind: "json_object",
            }),
        }
    }
}

#[async_trait]
impl GenerationOracle for OpenAiOracle {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn submit(&self, request: &OracleRequest) -> Result<Value, OracleError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            OracleError::Auth(format!(
                "API key not set. Set {API_KEY_ENV} or configure oracle.api_key."
            ))
        })?;

        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }

        debug!(
            model = %self.config.model,
            role = request.role.as_str(),
            payload_chars = request.payload.len(),
            "sending chat completion request"
        );

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(api_key)
            .json(&self.build_body(request))
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read response body".to_string());
            let err = classify_status(status, &body);
            warn!(status = status.as_u16(), error = %err, "oracle request rejected");
            return Err(err);
        }

        let completion: ChatResponse = response
            .json()
            .await
            .map_err(|e| OracleError::Malformed(format!("unreadable completion: {e}")))?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| OracleError::Malformed("empty completion content".to_string()))?;

        if request.json_reply {
            parse_json_content(&content)
        } else {
            Ok(Value::String(content))
        }
    }
}

/// Map a non-success HTTP status to an oracle error.
fn classify_status(status: StatusCode, body: &str) -> OracleError {
    let snippet: String = body.chars().take(200).collect();
    let message = format!("HTTP {status}: {snippet}");
    match status.as_u16() {
        401 | 403 => OracleError::Auth(message),
        408 | 429 => OracleError::Transient(message),
        code if code >= 500 => OracleError::Transient(message),
        _ => OracleError::Malformed(message),
    }
}

fn classify_transport(err: reqwest::Error) -> OracleError {
    if err.is_decode() || err.is_builder() {
        OracleError::Malformed(err.to_string())
    } else {
        OracleError::Transient(err.to_string())
    }
}

/// Parse JSON reply content, tolerating a surrounding Markdown code fence.
fn parse_json_content(content: &str) -> Result<Value, OracleError> {
    let trimmed = content.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))
        .unwrap_or(trimmed);

    serde_json::from_str(unfenced.trim())
        .map_err(|e| OracleError::Malformed(format!("reply is not valid JSON: {e}")))
}

// -- Chat completions request/response types --

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ChatReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::Role;

    fn config(base_url: String) -> OracleConfig {
        OracleConfig {
            base_url,
            api_key: Some("test-key".to_string()),
            requests_per_second: 0,
            ..OracleConfig::default()
        }
    }

    fn request() -> OracleRequest {
        OracleRequest::json(Role::Drafting, "Reply in JSON.", "Extract requirements.")
    }

    fn completion(content: &str) -> String {
        serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": content}}]
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_successful_json_reply() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer test-key")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(completion(r#"{"requirements": []}"#))
            .create_async()
            .await;

        let oracle = OpenAiOracle::new(config(server.url())).unwrap();
        let value = oracle.submit(&request()).await.unwrap();

        assert_eq!(value, serde_json::json!({"requirements": []}));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_status_classification() {
        let cases = [
            (401, "auth"),
            (403, "auth"),
            (429, "transient"),
            (503, "transient"),
            (400, "malformed"),
        ];
        for (status, expected) in cases {
            let mut server = mockito::Server::new_async().await;
            let _mock = server
                .mock("POST", "/chat/completions")
                .with_status(status)
                .with_body("nope")
                .create_async()
                .await;

            let oracle = OpenAiOracle::new(config(server.url())).unwrap();
            let err = oracle.submit(&request()).await.unwrap_err();
            let kind = match err {
                OracleError::Auth(_) => "auth",
                OracleError::Transient(_) => "transient",
                OracleError::Malformed(_) => "malformed",
            };
            assert_eq!(kind, expected, "status {status}");
        }
    }

    #[tokio::test]
    async fn test_non_json_content_is_malformed() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(completion("Sure! Here are the requirements..."))
            .create_async()
            .await;

        let oracle = OpenAiOracle::new(config(server.url())).unwrap();
        assert!(matches!(
            oracle.submit(&request()).await,
            Err(OracleError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_content_is_malformed() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices": []}"#)
            .create_async()
            .await;

        let oracle = OpenAiOracle::new(config(server.url())).unwrap();
        assert!(matches!(
            oracle.submit(&request()).await,
            Err(OracleError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_api_key_is_auth_failure() {
        let oracle = temp_env::with_var_unset(API_KEY_ENV, || {
            OpenAiOracle::new(OracleConfig {
                api_key: None,
                ..OracleConfig::default()
            })
            .unwrap()
        });
        assert!(!oracle.has_api_key());
        assert!(matches!(
            oracle.submit(&request()).await,
            Err(OracleError::Auth(_))
        ));
    }

    #[test]
    fn test_parse_json_content_strips_fence() {
        let value = parse_json_content("```json\n{\"a\": 1}\n```").unwrap();
        assert_eq!(value["a"], 1);
        assert!(parse_json_content("{broken").is_err());
    }

    #[test]
    fn test_request_body_shape() {
        let oracle = OpenAiOracle::new(config("http://localhost".into())).unwrap();
        let req = request();
        let body = serde_json::to_value(oracle.build_body(&req)).unwrap();
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "Extract requirements.");
        assert_eq!(body["response_format"]["type"], "json_object");
    }
}
