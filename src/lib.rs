//! deckmind - lecture-deck analysis pipeline.
//!
//! Turns an ingested slide deck or PDF into a document-level summary and
//! per-slide study notes, produced by a two-tier agent pipeline: a global
//! pass (`GlobalStructure`, `KnowledgeClustering`) over the whole document,
//! then a per-page pass (`PageClusterer → Noter → GapFinder → {Expander ∥
//! Retriever} → Checker → Organizer`) that clusters concepts, surfaces
//! knowledge gaps, expands the highest-priority ones, retrieves supporting
//! references, and checks the result for fabrication before persisting.
//!
//! ## Modules
//!
//! - [`types`]: the shared data model and the crate-wide error type
//! - [`config`]: layered configuration resolution
//! - [`ai`]: the LLM Gateway (retry, decode/repair) and embedding gateway
//! - [`storage`]: SQLite-backed persistence, pooled and panic-safe
//! - [`vectorstore`]: the local Vector Store (chunking, cosine search)
//! - [`retrieval`]: the External Retrieval Router and its sources
//! - [`agents`]: the nine pipeline agents
//! - [`orchestrator`]: the two entry points and the agent graph

#![recursion_limit = "256"]

pub mod agents;
pub mod ai;
pub mod cli;
pub mod config;
pub mod orchestrator;
pub mod retrieval;
pub mod storage;
pub mod types;
pub mod vectorstore;

pub use config::{Config, ConfigLoader};
pub use orchestrator::PipelineOrchestrator;
pub use retrieval::Router;
pub use storage::{Database, PoolConfig, SharedDatabase};
pub use types::{ErrorCategory, PipelineError, Result, ResultExt};
pub use vectorstore::VectorStore;
