//! LLM provider abstraction: one OpenAI-compatible chat-completion endpoint,
//! reached through a trait so the gateway never depends on the transport.

mod openai;

pub use openai::OpenAiProvider;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::types::Result;

pub type SharedProvider = Arc<dyn LlmProvider + Send + Sync>;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl TokenUsage {
    pub fn from_usage(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            input_tokens: prompt_tokens,
            output_tokens: completion_tokens,
        }
    }

    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ResponseTiming {
    pub elapsed_ms: u64,
}

impl ResponseTiming {
    pub fn from_duration(d: Duration) -> Self {
        Self {
            elapsed_ms: d.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseMetadata {
    pub model: String,
    pub provider: String,
}

/// One completion from a provider, decoded JSON plus enough metadata for
/// cost/latency observability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    pub content: Value,
    pub usage: TokenUsage,
    pub timing: ResponseTiming,
    pub metadata: ResponseMetadata,
}

impl LlmResponse {
    pub fn with_metrics(
        content: Value,
        usage: TokenUsage,
        timing: ResponseTiming,
        metadata: ResponseMetadata,
    ) -> Self {
        Self {
            content,
            usage,
            timing,
            metadata,
        }
    }
}

/// Connection parameters for an LLM provider.
///
/// `api_key` is excluded from both `Debug` output and serialization —
/// config dumps and log lines must never leak it.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    pub api_base: Option<String>,
    pub model: Option<String>,
    pub temperature: f32,
    pub max_tokens: usize,
    pub timeout_secs: u64,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// A chat-completion backend capable of generating JSON matching a schema.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Generate a response to `prompt`. When `schema` is non-null, the
    /// provider is instructed to produce JSON matching it; the caller still
    /// decodes and validates the result.
    async fn generate(&self, prompt: &str, schema: &Value, temperature: f32) -> Result<LlmResponse>;

    fn name(&self) -> &str;

    fn model(&self) -> &str;

    async fn health_check(&self) -> Result<bool>;
}

/// Construct the configured provider. Only one transport is supported: an
/// HTTP endpoint speaking the OpenAI chat-completions schema, which covers
/// both hosted OpenAI and the many self-hosted gateways that mirror it.
pub fn create_provider(config: ProviderConfig) -> Result<SharedProvider> {
    Ok(Arc::new(OpenAiProvider::new(config)?))
}
