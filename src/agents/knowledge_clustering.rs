//! KnowledgeClustering agent: the second half of the global pass. Produces
//! cross-page `KnowledgeUnit`s, grounded in the `GlobalAnalysis` chapters.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use crate::ai::LlmGateway;
use crate::types::{Document, GlobalAnalysis, KnowledgeUnit, Result};

use super::sample_pages;

const SAMPLE_THRESHOLD: usize = 15;
const FULL_PAGE_CAP: usize = 1000;
const SAMPLED_PAGE_CAP: usize = 500;
const TEMPERATURE: f32 = 0.0;

pub struct KnowledgeClusteringAgent {
    llm: Arc<LlmGateway>,
}

impl KnowledgeClusteringAgent {
    pub fn new(llm: Arc<LlmGateway>) -> Self {
        Self { llm }
    }

    pub async fn run(&self, document: &Document, global: &GlobalAnalysis) -> Result<Vec<KnowledgeUnit>> {
        let total_pages = document.total_pages() as u32;
        let cap = if document.pages.len() > SAMPLE_THRESHOLD { SAMPLED_PAGE_CAP } else { FULL_PAGE_CAP };
        let sampled = sample_pages(&document.pages, SAMPLE_THRESHOLD, cap);

        let prompt = build_prompt(global, &sampled);
        let shape = json!({
            "type": "object",
            "properties": {
                "knowledge_units": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "unit_id": {"type": "string"},
                            "title": {"type": "string"},
                            "page_numbers": {"type": "array", "items": {"type": "integer"}},
                            "core_concepts": {"type": "array", "items": {"type": "string"}}
                        },
                        "required": ["unit_id", "title", "page_numbers", "core_concepts"]
                    }
                }
            },
            "required": ["knowledge_units"]
        });

        let value = match self.llm.structured(&prompt, &shape, TEMPERATURE).await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "knowledge clustering call failed, returning no units");
                return Ok(vec![]);
            }
        };

        let raw: RawUnits = match serde_json::from_value(value) {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "knowledge clustering response did not match declared shape, returning no units");
                return Ok(vec![]);
            }
        };

        let valid: Vec<KnowledgeUnit> = raw
            .knowledge_units
            .into_iter()
            .filter(|u| u.is_valid(total_pages))
            .take(GlobalAnalysis::MAX_KNOWLEDGE_UNITS)
            .collect();

        Ok(valid)
    }
}

#[derive(Debug, Deserialize)]
struct RawUnits {
    #[serde(default)]
    knowledge_units: Vec<KnowledgeUnit>,
}

fn build_prompt(global: &GlobalAnalysis, sampled: &[(u32, String)]) -> String {
    let mut body = format!(
        "The document's main topic is \"{}\". Chapters:\n",
        global.main_topic
    );
    for chapter in &global.chapters {
        body.push_str(&format!("- {} (pages {:?})\n", chapter.title, chapter.page_numbers));
    }
    body.push_str(
        "\nIdentify cross-page knowledge units: groups of pages that together \
         teach one coherent concept. Each unit needs a non-empty title, the \
         pages it spans, and its core concepts.\n\n",
    );
    for (page_number, text) in sampled {
        body.push_str(&format!("--- page {page_number} ---\n{text}\n\n"));
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_units_deserializes_empty_array() {
        let raw: RawUnits = serde_json::from_value(json!({"knowledge_units": []})).unwrap();
        assert!(raw.knowledge_units.is_empty());
    }
}
