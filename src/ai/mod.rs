//! AI integration layer: LLM and embedding gateways sitting in front of a
//! single OpenAI-compatible upstream, plus the decode/retry machinery they
//! share.

pub mod decode;
pub mod embedding;
pub mod gateway;
pub mod provider;
pub mod retry;

pub use embedding::EmbeddingGateway;
pub use gateway::LlmGateway;
pub use provider::{LlmProvider, ProviderConfig, SharedProvider, create_provider};
