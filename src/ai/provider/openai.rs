//! OpenAI-compatible chat-completions provider.
//!
//! Speaks the `/chat/completions` schema shared by hosted OpenAI and most
//! self-hosted gateways (vLLM, LiteLLM, Ollama's OpenAI-compatible mode).

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::{LlmProvider, LlmResponse, ProviderConfig, ResponseMetadata, ResponseTiming, TokenUsage};
use crate::ai::decode::decode_json;
use crate::types::{ErrorClassifier, PipelineError, Result};

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

pub struct OpenAiProvider {
    api_key: SecretString,
    api_base: String,
    model: String,
    max_tokens: usize,
    client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("api_key", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl OpenAiProvider {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let api_key_str = config
            .api_key
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .ok_or_else(|| {
                PipelineError::Config(
                    "no LLM API key: set llm.api_key or OPENAI_API_KEY".to_string(),
                )
            })?;

        let api_base = config.api_base.unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        let model = config.model.unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let timeout_secs = if config.timeout_secs == 0 { 60 } else { config.timeout_secs };
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| PipelineError::upstream("llm", format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            api_key: SecretString::from(api_key_str),
            api_base,
            model,
            max_tokens: if config.max_tokens == 0 { 4096 } else { config.max_tokens },
            client,
        })
    }

    fn build_request(&self, prompt: &str, schema: &Value, temperature: f32) -> ChatCompletionRequest {
        let system_content = if schema.is_null() {
            "You are a study-materials assistant. Respond with plain text unless told otherwise.".to_string()
        } else {
            let schema_str = serde_json::to_string_pretty(schema).unwrap_or_else(|_| "{}".to_string());
            format!(
                "Respond ONLY with valid JSON matching this schema, no explanation:\n\n```json\n{}\n```",
                schema_str
            )
        };

        ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage { role: "system".to_string(), content: system_content },
                ChatMessage { role: "user".to_string(), content: prompt.to_string() },
            ],
            temperature,
            max_tokens: Some(self.max_tokens),
            response_format: if schema.is_null() {
                None
            } else {
                Some(ResponseFormat { format_type: "json_object".to_string() })
            },
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn generate(&self, prompt: &str, schema: &Value, temperature: f32) -> Result<LlmResponse> {
        debug!(model = %self.model, temperature, "generating completion");

        let start_time = Instant::now();
        let request = self.build_request(prompt, schema, temperature);
        let url = format!("{}/chat/completions", self.api_base);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key.expose_secret()))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| ErrorClassifier::classify("llm", &e.to_string()))?;

        let elapsed = start_time.elapsed();
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ErrorClassifier::classify_http_status("llm", status.as_u16(), &body));
        }

        let response_body: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::upstream("llm", format!("malformed response body: {e}")))?;

        let usage = response_body
            .usage
            .map(|u| TokenUsage::from_usage(u.prompt_tokens, u.completion_tokens))
            .unwrap_or_default();

        let content_str = response_body
            .choices
            .first()
            .and_then(|c| c.message.content.as_ref())
            .ok_or_else(|| PipelineError::upstream("llm", "no content in response"))?;

        let content = if schema.is_null() {
            Value::String(content_str.clone())
        } else {
            decode_json(content_str)?
        };

        Ok(LlmResponse::with_metrics(
            content,
            usage,
            ResponseTiming::from_duration(elapsed),
            ResponseMetadata { model: self.model.clone(), provider: "openai".to_string() },
        ))
    }

    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/models", self.api_base);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key.expose_secret()))
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => Ok(true),
            Ok(resp) => {
                warn!(status = %resp.status(), "llm health check failed");
                Ok(false)
            }
            Err(e) => {
                warn!(error = %e, "llm health check failed");
                Ok(false)
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    usage: Option<UsageInfo>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsageInfo {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_usage_totals_input_and_output() {
        let usage = TokenUsage::from_usage(100, 50);
        assert_eq!(usage.total(), 150);
    }

    #[test]
    fn missing_api_key_is_a_config_error() {
        let config = ProviderConfig {
            api_key: None,
            ..Default::default()
        };
        // SAFETY: test is single-threaded with respect to this var.
        unsafe {
            std::env::remove_var("OPENAI_API_KEY");
        }
        let result = OpenAiProvider::new(config);
        assert!(result.is_err());
    }
}
