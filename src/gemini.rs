//! Gemini API client
//!
//! A single synchronous-style `generateContent` call per run.
//! Failures are fatal for the run; nothing is retried.

use crate::config::Config;
use crate::error::AgentError;
use crate::models::{Generation, TokenUsage};
use crate::Result;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{error, info, warn};

const PROVIDER: &str = "Gemini";

/// Anything that turns a prompt into model text
#[async_trait]
pub trait TextGenerator: Send + Sync {
    fn model(&self) -> &str;
    async fn generate(&self, system_instruction: &str, prompt: &str) -> Result<Generation>;
}

/// Gemini client bound to one model
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_output_tokens: u32,
}

impl GeminiClient {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.gemini_timeout)
            .build()
            .map_err(|e| AgentError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key: config.google_api_key.clone(),
            base_url: config.gemini_base_url.trim_end_matches('/').to_string(),
            model: config.gemini_model.clone(),
            max_output_tokens: config.max_output_tokens,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }

    fn build_request(&self, system_instruction: &str, prompt: &str) -> GeminiRequest {
        GeminiRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.3,
                top_p: 0.9,
                top_k: 40,
                max_output_tokens: self.max_output_tokens,
            },
            system_instruction: SystemInstruction {
                parts: vec![Part {
                    text: system_instruction.to_string(),
                }],
            },
        }
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, system_instruction: &str, prompt: &str) -> Result<Generation> {
        if self.api_key.trim().is_empty() {
            return Err(AgentError::Config(
                "GOOGLE_API_KEY not configured".to_string(),
            ));
        }

        let request = self.build_request(system_instruction, prompt);
        let start = Instant::now();

        info!(model = %self.model, prompt_chars = prompt.len(), "Calling Gemini API");

        let response = self
            .client
            .post(self.endpoint())
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                let e = e.without_url();
                error!("Gemini API request failed: {}", e);
                AgentError::Llm(format!("Gemini API request failed: {}", e))
            })?;

        let status = response.status();

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!(status = %status, "Gemini API error response");
            return Err(classify_status(status, &error_text));
        }

        let gemini_response: GeminiResponse = response.json().await.map_err(|e| {
            error!("Failed to parse Gemini response: {}", e.without_url());
            AgentError::Llm("Gemini returned an unreadable response".to_string())
        })?;

        let generation = into_generation(gemini_response, &self.model)?;

        info!(
            model = %self.model,
            finish_reason = ?generation.finish_reason,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Gemini response received"
        );

        Ok(generation)
    }
}

/// Extract the answer from a decoded response, rejecting blocked or empty output
fn into_generation(response: GeminiResponse, model: &str) -> Result<Generation> {
    if let Some(reason) = response
        .prompt_feedback
        .as_ref()
        .and_then(|f| f.block_reason.clone())
    {
        warn!(reason = %reason, "Prompt blocked by Gemini");
        return Err(AgentError::Blocked(reason));
    }

    let usage = response.usage_metadata.map(|u| TokenUsage {
        prompt_tokens: u.prompt_token_count,
        output_tokens: u.candidates_token_count,
    });

    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| AgentError::EmptyResponse("No candidates from Gemini API".to_string()))?;

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(match candidate.finish_reason.as_deref() {
            Some(reason @ ("SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT")) => {
                AgentError::Blocked(reason.to_string())
            }
            reason => AgentError::EmptyResponse(format!(
                "Gemini returned no text (finish reason: {})",
                reason.unwrap_or("unknown")
            )),
        });
    }

    if candidate.finish_reason.as_deref() == Some("MAX_TOKENS") {
        warn!("Gemini response truncated at max output tokens");
    }

    Ok(Generation {
        text: text.trim().to_string(),
        model: model.to_string(),
        finish_reason: candidate.finish_reason,
        usage,
    })
}

fn classify_status(status: StatusCode, body: &str) -> AgentError {
    let parsed: Option<ErrorEnvelope> = serde_json::from_str(body).ok();
    let detail = parsed
        .as_ref()
        .map(|e| e.error.message.clone())
        .unwrap_or_else(|| body.chars().take(300).collect());
    let api_status = parsed
        .as_ref()
        .and_then(|e| e.error.status.clone())
        .unwrap_or_default();

    let key_rejected = detail.contains("API_KEY_INVALID")
        || detail.to_lowercase().contains("api key not valid")
        || api_status == "UNAUTHENTICATED"
        || api_status == "PERMISSION_DENIED";

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AgentError::Auth {
            provider: PROVIDER,
            detail,
        },
        StatusCode::BAD_REQUEST if key_rejected => AgentError::Auth {
            provider: PROVIDER,
            detail,
        },
        StatusCode::TOO_MANY_REQUESTS => AgentError::RateLimited {
            provider: PROVIDER,
            detail,
        },
        _ => AgentError::Llm(format!("Gemini API returned {}: {}", status, detail)),
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
    system_instruction: SystemInstruction,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: i32,
    max_output_tokens: u32,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
    status: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{unreachable_base_url, CannedServer};

    fn client_for(base_url: &str, api_key: &str) -> GeminiClient {
        let config = Config {
            google_api_key: api_key.to_string(),
            gemini_base_url: base_url.to_string(),
            ..Config::default()
        };
        GeminiClient::new(&config).unwrap()
    }

    #[test]
    fn test_request_serialization() {
        let client = client_for("http://localhost", "k");
        let request = client.build_request("You are a financial analyst", "What is RSI?");

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["contents"][0]["parts"][0]["text"], "What is RSI?");
        assert_eq!(json["contents"][0]["role"], "user");
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 2048);
        assert_eq!(
            json["systemInstruction"]["parts"][0]["text"],
            "You are a financial analyst"
        );
    }

    #[tokio::test]
    async fn test_generate_success() {
        let server = CannedServer::start(
            200,
            r#"{
                "candidates": [{
                    "content": {"role": "model", "parts": [{"text": "AAPL trades near "}, {"text": "its 50-day average."}]},
                    "finishReason": "STOP"
                }],
                "usageMetadata": {"promptTokenCount": 120, "candidatesTokenCount": 12, "totalTokenCount": 132}
            }"#,
        )
        .await;

        let generation = client_for(&server.base_url, "g-key")
            .generate("system", "prompt")
            .await
            .unwrap();

        assert_eq!(generation.text, "AAPL trades near its 50-day average.");
        assert_eq!(generation.finish_reason.as_deref(), Some("STOP"));
        assert_eq!(generation.usage.unwrap().prompt_tokens, 120);

        let requests = server.requests();
        let line = requests[0].request_line();
        assert!(line.starts_with("POST /v1beta/models/gemini-2.0-flash:generateContent?key=g-key"));
        assert!(requests[0].body.contains("\"systemInstruction\""));
    }

    #[tokio::test]
    async fn test_invalid_key_is_auth_error() {
        let server = CannedServer::start(
            400,
            r#"{"error": {"code": 400, "message": "API key not valid. Please pass a valid API key.", "status": "INVALID_ARGUMENT"}}"#,
        )
        .await;

        let err = client_for(&server.base_url, "bad")
            .generate("system", "prompt")
            .await
            .unwrap_err();

        assert!(matches!(err, AgentError::Auth { provider: "Gemini", .. }));
    }

    #[tokio::test]
    async fn test_quota_is_rate_limited() {
        let server = CannedServer::start(
            429,
            r#"{"error": {"code": 429, "message": "Resource has been exhausted", "status": "RESOURCE_EXHAUSTED"}}"#,
        )
        .await;

        let err = client_for(&server.base_url, "g")
            .generate("system", "prompt")
            .await
            .unwrap_err();

        assert!(matches!(err, AgentError::RateLimited { .. }));
    }

    #[tokio::test]
    async fn test_blocked_prompt() {
        let server =
            CannedServer::start(200, r#"{"promptFeedback": {"blockReason": "SAFETY"}}"#).await;

        let err = client_for(&server.base_url, "g")
            .generate("system", "prompt")
            .await
            .unwrap_err();

        assert!(matches!(err, AgentError::Blocked(ref r) if r == "SAFETY"));
    }

    #[tokio::test]
    async fn test_empty_candidate_is_error() {
        let server = CannedServer::start(
            200,
            r#"{"candidates": [{"content": {"parts": [{"text": "  "}]}, "finishReason": "MAX_TOKENS"}]}"#,
        )
        .await;

        let err = client_for(&server.base_url, "g")
            .generate("system", "prompt")
            .await
            .unwrap_err();

        assert!(matches!(err, AgentError::EmptyResponse(_)));
    }

    async fn generate_with(status: u16, body: &str) -> AgentError {
        let server = CannedServer::start(status, body).await;
        client_for(&server.base_url, "g")
            .generate("system", "prompt")
            .await
            .unwrap_err()
    }

    #[tokio::test]
    async fn test_unauthorized_and_forbidden_are_auth_errors() {
        for status in [401, 403] {
            let err = generate_with(
                status,
                r#"{"error": {"code": 403, "message": "Method doesn't allow unregistered callers.", "status": "PERMISSION_DENIED"}}"#,
            )
            .await;

            assert!(matches!(err, AgentError::Auth { provider: "Gemini", .. }), "{}", status);
        }
    }

    #[tokio::test]
    async fn test_server_error_is_llm_error() {
        let err = generate_with(
            500,
            r#"{"error": {"code": 500, "message": "An internal error has occurred.", "status": "INTERNAL"}}"#,
        )
        .await;

        assert!(matches!(err, AgentError::Llm(ref m) if m.contains("An internal error has occurred.")));
    }

    #[tokio::test]
    async fn test_safety_stop_without_text_is_blocked() {
        let err = generate_with(
            200,
            r#"{"candidates": [{"content": {"parts": []}, "finishReason": "SAFETY"}]}"#,
        )
        .await;

        assert!(matches!(err, AgentError::Blocked(ref r) if r == "SAFETY"));
    }

    #[tokio::test]
    async fn test_unreadable_body_is_llm_error() {
        let err = generate_with(200, "not json at all").await;
        assert!(matches!(err, AgentError::Llm(_)));
    }

    #[tokio::test]
    async fn test_missing_api_key() {
        let err = client_for("http://localhost", "")
            .generate("system", "prompt")
            .await
            .unwrap_err();

        assert!(matches!(err, AgentError::Config(_)));
        assert!(err.to_string().contains("GOOGLE_API_KEY"));
    }

    #[tokio::test]
    async fn test_unreachable_does_not_leak_key() {
        let base_url = unreachable_base_url().await;

        let err = client_for(&base_url, "secret-key")
            .generate("system", "prompt")
            .await
            .unwrap_err();

        assert!(matches!(err, AgentError::Llm(_)));
        assert!(!err.to_string().contains("secret-key"));
    }
}
