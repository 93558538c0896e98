//! Document-scoped (global-pass) entities: `GlobalAnalysis` and
//! `KnowledgeUnit`.

use serde::{Deserialize, Serialize};

/// One chapter in the document's chapter structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    pub title: String,
    pub page_numbers: Vec<u32>,
    pub key_concepts: Vec<String>,
}

/// A cross-page bundle of related concepts. Advisory: `unit_id` is not
/// required to be stable across force-recomputes (see design notes).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeUnit {
    pub unit_id: String,
    pub title: String,
    pub page_numbers: Vec<u32>,
    pub core_concepts: Vec<String>,
}

impl KnowledgeUnit {
    /// Per the data-model invariant: non-empty `page_numbers`, each within
    /// `[1..=total_pages]`, and non-empty `core_concepts`.
    pub fn is_valid(&self, total_pages: u32) -> bool {
        !self.title.trim().is_empty()
            && !self.page_numbers.is_empty()
            && self.page_numbers.iter().all(|&p| p >= 1 && p <= total_pages)
            && !self.core_concepts.is_empty()
    }
}

/// Document-scoped output of the global pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalAnalysis {
    pub main_topic: String,
    pub chapters: Vec<Chapter>,
    pub knowledge_flow: String,
    #[serde(default)]
    pub knowledge_units: Vec<KnowledgeUnit>,
    pub total_pages: u32,
}

impl GlobalAnalysis {
    pub const MAX_KNOWLEDGE_UNITS: usize = 15;

    /// `main_topic` non-empty and not the literal "unknown" (case-sensitive
    /// per the spec's literal wording).
    pub fn has_valid_main_topic(&self) -> bool {
        !self.main_topic.trim().is_empty() && self.main_topic.trim() != "unknown"
    }
}
