//! Configuration types.
//!
//! One section struct per configuration-surface group named in the external
//! interfaces design, each with its own `Default`, mirroring the root
//! `Config` composed of section structs.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::types::{PipelineError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
    pub retrieval: RetrievalConfig,
    pub expansion: ExpansionConfig,
    pub streaming: StreamingConfig,
    pub vector_store: VectorStoreConfig,
    pub storage: StorageConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm: LlmConfig::default(),
            embedding: EmbeddingConfig::default(),
            retrieval: RetrievalConfig::default(),
            expansion: ExpansionConfig::default(),
            streaming: StreamingConfig::default(),
            vector_store: VectorStoreConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.llm.base_url.trim().is_empty() {
            return Err(PipelineError::Config("llm.base_url must not be empty".into()));
        }
        if self.llm.model.trim().is_empty() {
            return Err(PipelineError::Config("llm.model must not be empty".into()));
        }
        if self.llm.timeout_secs == 0 {
            return Err(PipelineError::Config("llm.timeout_secs must be > 0".into()));
        }
        if self.embedding.timeout_secs == 0 {
            return Err(PipelineError::Config("embedding.timeout_secs must be > 0".into()));
        }
        if self.retrieval.timeout_secs == 0 {
            return Err(PipelineError::Config("retrieval.timeout_secs must be > 0".into()));
        }
        if self.retrieval.max_results == 0 {
            return Err(PipelineError::Config("retrieval.max_results must be > 0".into()));
        }
        if !(0.0..=1.0).contains(&self.retrieval.min_score) {
            return Err(PipelineError::Config(
                "retrieval.min_score must be between 0.0 and 1.0".into(),
            ));
        }
        if self.expansion.max_revisions > 10 {
            return Err(PipelineError::Config(
                "expansion.max_revisions unreasonably large (> 10)".into(),
            ));
        }
        if !(1..=5).contains(&self.expansion.min_gap_priority) {
            return Err(PipelineError::Config(
                "expansion.min_gap_priority must be between 1 and 5".into(),
            ));
        }
        if !(0.0..=2.0).contains(&self.expansion.temperature) {
            return Err(PipelineError::Config(
                "expansion.temperature must be between 0.0 and 2.0".into(),
            ));
        }
        if self.vector_store.chunk_size == 0 {
            return Err(PipelineError::Config("vector_store.chunk_size must be > 0".into()));
        }
        if self.vector_store.chunk_overlap >= self.vector_store.chunk_size {
            return Err(PipelineError::Config(
                "vector_store.chunk_overlap must be smaller than chunk_size".into(),
            ));
        }
        Ok(())
    }

    /// `llm.embedding_base_url` falls back to `llm.base_url` when unset —
    /// most OpenAI-compatible gateways serve both chat and embeddings from
    /// the same host.
    pub fn embedding_base_url(&self) -> &str {
        self.embedding
            .base_url
            .as_deref()
            .unwrap_or(&self.llm.base_url)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Defaults to `llm.base_url` when absent; see [`Config::embedding_base_url`].
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            model: "text-embedding-3-small".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub preferred_sources: Vec<String>,
    pub max_results: usize,
    pub local_rag_priority: bool,
    pub min_score: f32,
    pub timeout_secs: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            preferred_sources: vec![
                "academic".to_string(),
                "encyclopedia".to_string(),
                "web_search".to_string(),
            ],
            max_results: 5,
            local_rag_priority: true,
            min_score: 0.6,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpansionConfig {
    pub max_revisions: u32,
    pub min_gap_priority: u8,
    pub temperature: f32,
}

impl Default for ExpansionConfig {
    fn default() -> Self {
        Self {
            max_revisions: 2,
            min_gap_priority: 3,
            temperature: 0.6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    pub enabled: bool,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorStoreConfig {
    pub path: PathBuf,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub embedding_model: String,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(".deckmind/vectors.db"),
            chunk_size: 1200,
            chunk_overlap: 200,
            embedding_model: "text-embedding-3-small".to_string(),
        }
    }
}

/// Not part of the spec's enumerated configuration surface, but needed to
/// point the Persistence Store at a database file the same way
/// `vector_store.path` points the Vector Store at one — they may share a
/// single SQLite file in practice.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(".deckmind/pipeline.db"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn rejects_empty_base_url() {
        let mut cfg = Config::default();
        cfg.llm.base_url = "".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_overlap_ge_chunk_size() {
        let mut cfg = Config::default();
        cfg.vector_store.chunk_overlap = cfg.vector_store.chunk_size;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn embedding_base_url_falls_back_to_llm_base_url() {
        let cfg = Config::default();
        assert_eq!(cfg.embedding_base_url(), cfg.llm.base_url);
    }

    #[test]
    fn embedding_base_url_override_takes_precedence() {
        let mut cfg = Config::default();
        cfg.embedding.base_url = Some("https://embeddings.example.com".into());
        assert_eq!(cfg.embedding_base_url(), "https://embeddings.example.com");
    }
}
