//! LLM Gateway: the single chokepoint every agent calls through.
//!
//! Wraps a [`SharedProvider`] with uniform retry, decode, and one-shot
//! "return only JSON" repair escalation. Agents never talk to a provider
//! directly.

use serde_json::Value;
use tracing::warn;

use super::decode::decode_json;
use super::provider::SharedProvider;
use super::retry::with_retry;
use crate::types::{PipelineError, Result};

pub struct LlmGateway {
    provider: SharedProvider,
}

impl LlmGateway {
    pub fn new(provider: SharedProvider) -> Self {
        Self { provider }
    }

    /// Plain-text completion. Retries transient upstream failures; does not
    /// attempt JSON decoding.
    pub async fn chat(&self, prompt: &str, temperature: f32) -> Result<String> {
        let response = with_retry("llm.chat", || {
            self.provider.generate(prompt, &Value::Null, temperature)
        })
        .await?;

        match response.content {
            Value::String(s) => Ok(s),
            other => Ok(other.to_string()),
        }
    }

    /// Structured completion: same retry discipline, plus a decode stage.
    /// On decode failure, retries once with an appended "JSON only"
    /// directive before giving up with a [`PipelineError::Decode`].
    pub async fn structured(&self, prompt: &str, shape: &Value, temperature: f32) -> Result<Value> {
        let first = with_retry("llm.structured", || {
            self.provider.generate(prompt, shape, temperature)
        })
        .await;

        match first {
            Ok(response) => Ok(response.content),
            Err(err) if err.category() == crate::types::ErrorCategory::DecodeFailure => {
                warn!("structured decode failed, retrying once with a stricter directive");
                let retry_prompt = format!(
                    "{prompt}\n\nReturn ONLY valid JSON matching the schema. No prose, no code fences."
                );
                let response = with_retry("llm.structured.retry", || {
                    self.provider.generate(&retry_prompt, shape, temperature)
                })
                .await?;
                Ok(response.content)
            }
            Err(err) => Err(err),
        }
    }

    pub fn model(&self) -> &str {
        self.provider.model()
    }

    pub async fn health_check(&self) -> Result<bool> {
        self.provider.health_check().await
    }
}

/// Decode and validate a raw text blob that did not come through
/// [`LlmGateway::structured`] (e.g. a provider returning plain text for a
/// schema-bearing prompt). Most call sites should prefer `structured`, which
/// already runs this internally.
pub fn decode_or_fail(raw: &str) -> Result<Value> {
    decode_json(raw).map_err(|e| match e {
        PipelineError::Decode { raw_text, reason } => PipelineError::Decode { raw_text, reason },
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::provider::{LlmProvider, LlmResponse, ResponseMetadata, ResponseTiming, TokenUsage};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    struct FlakyProvider {
        fail_times: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl LlmProvider for FlakyProvider {
        async fn generate(&self, _prompt: &str, _schema: &Value, _temperature: f32) -> Result<LlmResponse> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_times {
                return Err(PipelineError::upstream("llm", "503 server error"));
            }
            Ok(LlmResponse::with_metrics(
                Value::String("ok".into()),
                TokenUsage::default(),
                ResponseTiming::from_duration(Duration::from_millis(1)),
                ResponseMetadata { model: "test".into(), provider: "test".into() },
            ))
        }

        fn name(&self) -> &str {
            "test"
        }

        fn model(&self) -> &str {
            "test"
        }

        async fn health_check(&self) -> Result<bool> {
            Ok(true)
        }
    }

    #[tokio::test]
    async fn chat_retries_through_transient_failures() {
        let provider: SharedProvider = Arc::new(FlakyProvider { fail_times: 2, calls: AtomicU32::new(0) });
        let gateway = LlmGateway::new(provider);
        let result = gateway.chat("hello", 0.0).await.unwrap();
        assert_eq!(result, "ok");
    }

    #[tokio::test]
    async fn chat_gives_up_after_exhausting_retries() {
        let provider: SharedProvider = Arc::new(FlakyProvider { fail_times: 10, calls: AtomicU32::new(0) });
        let gateway = LlmGateway::new(provider);
        assert!(gateway.chat("hello", 0.0).await.is_err());
    }
}
