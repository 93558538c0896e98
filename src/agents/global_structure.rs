//! GlobalStructure agent: the document-wide opening call of the global
//! pass. Produces `{main_topic, chapters, knowledge_flow}` with a
//! best-effort degradation path so it never raises.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use crate::ai::LlmGateway;
use crate::types::{Chapter, Document, GlobalAnalysis, Result};

use super::sample_pages;

const SAMPLE_THRESHOLD: usize = 20;
const FULL_PAGE_CAP: usize = 800;
const SAMPLED_PAGE_CAP: usize = 400;
const TEMPERATURE: f32 = 0.0;

pub struct GlobalStructureAgent {
    llm: Arc<LlmGateway>,
}

impl GlobalStructureAgent {
    pub fn new(llm: Arc<LlmGateway>) -> Self {
        Self { llm }
    }

    pub async fn run(&self, document: &Document) -> Result<GlobalAnalysis> {
        let total_pages = document.total_pages() as u32;
        let cap = if document.pages.len() > SAMPLE_THRESHOLD { SAMPLED_PAGE_CAP } else { FULL_PAGE_CAP };
        let sampled = sample_pages(&document.pages, SAMPLE_THRESHOLD, cap);

        let prompt = build_prompt(&sampled);
        let shape = json!({
            "type": "object",
            "properties": {
                "main_topic": {"type": "string"},
                "chapters": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "title": {"type": "string"},
                            "page_numbers": {"type": "array", "items": {"type": "integer"}},
                            "key_concepts": {"type": "array", "items": {"type": "string"}}
                        },
                        "required": ["title", "page_numbers", "key_concepts"]
                    }
                },
                "knowledge_flow": {"type": "string"}
            },
            "required": ["main_topic", "chapters", "knowledge_flow"]
        });

        match self.llm.structured(&prompt, &shape, TEMPERATURE).await {
            Ok(value) => match serde_json::from_value::<RawGlobalStructure>(value) {
                Ok(raw) if guard_rails_pass(&raw) => Ok(GlobalAnalysis {
                    main_topic: raw.main_topic,
                    chapters: raw.chapters,
                    knowledge_flow: raw.knowledge_flow,
                    knowledge_units: vec![],
                    total_pages,
                }),
                Ok(raw) => {
                    warn!(main_topic = %raw.main_topic, "global structure violated guard rails, degrading");
                    Ok(degrade(document, total_pages))
                }
                Err(e) => {
                    warn!(error = %e, "global structure response did not match declared shape, degrading");
                    Ok(degrade(document, total_pages))
                }
            },
            Err(e) => {
                warn!(error = %e, "global structure call failed, degrading");
                Ok(degrade(document, total_pages))
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawGlobalStructure {
    main_topic: String,
    #[serde(default)]
    chapters: Vec<Chapter>,
    #[serde(default)]
    knowledge_flow: String,
}

fn guard_rails_pass(raw: &RawGlobalStructure) -> bool {
    let topic = raw.main_topic.trim();
    !topic.is_empty() && topic != "unknown" && !raw.chapters.is_empty()
}

/// Best-effort fallback: first non-empty page title as `main_topic`, no
/// chapters, no knowledge flow. Never fails.
fn degrade(document: &Document, total_pages: u32) -> GlobalAnalysis {
    let main_topic = document
        .pages
        .iter()
        .map(|p| p.title.trim())
        .find(|t| !t.is_empty())
        .unwrap_or("untitled deck")
        .to_string();

    GlobalAnalysis {
        main_topic,
        chapters: vec![],
        knowledge_flow: String::new(),
        knowledge_units: vec![],
        total_pages,
    }
}

fn build_prompt(sampled: &[(u32, String)]) -> String {
    let mut body = String::from(
        "You are analyzing a lecture deck. Identify the main topic, a chapter \
         breakdown across the sampled pages, and a short description of the \
         knowledge flow from beginning to end.\n\n",
    );
    for (page_number, text) in sampled {
        body.push_str(&format!("--- page {page_number} ---\n{text}\n\n"));
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Document, DocumentId, FileKind, Page};

    fn document_with_titles(titles: &[&str]) -> Document {
        Document {
            id: DocumentId::generate(),
            file_name: "deck.pptx".into(),
            file_kind: FileKind::Deck,
            content_hash: "h".into(),
            pages: titles
                .iter()
                .enumerate()
                .map(|(i, t)| Page {
                    page_number: i as u32 + 1,
                    title: t.to_string(),
                    raw_text: "content".into(),
                    bullet_points: vec![],
                    image_descriptions: vec![],
                })
                .collect(),
            global_analysis: None,
        }
    }

    #[test]
    fn degrade_picks_first_nonempty_title() {
        let doc = document_with_titles(&["", "Intro to Attention", "More"]);
        let ga = degrade(&doc, 3);
        assert_eq!(ga.main_topic, "Intro to Attention");
        assert!(ga.chapters.is_empty());
    }

    #[test]
    fn degrade_falls_back_when_all_titles_empty() {
        let doc = document_with_titles(&["", ""]);
        let ga = degrade(&doc, 2);
        assert_eq!(ga.main_topic, "untitled deck");
        assert!(ga.has_valid_main_topic());
    }

    #[test]
    fn guard_rails_reject_literal_unknown() {
        let raw = RawGlobalStructure { main_topic: "unknown".into(), chapters: vec![], knowledge_flow: "".into() };
        assert!(!guard_rails_pass(&raw));
    }
}
