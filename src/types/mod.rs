//! Core data model: the entities in the analysis pipeline's data model, the
//! crate-wide error type, and the streaming progress event.

pub mod analysis;
pub mod document;
pub mod error;
pub mod event;
pub mod page_analysis;

pub use analysis::{Chapter, GlobalAnalysis, KnowledgeUnit};
pub use document::{BulletPoint, Document, DocumentId, FileKind, Page, content_hash, truncate_chars};
pub use error::{ErrorCategory, ErrorClassifier, PipelineError, Result, ResultExt};
pub use event::{ProgressEvent, Stage};
pub use page_analysis::{
    CheckResult, CheckStatus, ConceptCluster, ExpandedContent, GapKind, KnowledgeGap,
    PageAnalysis, Reference,
};
