//! Noter agent: two sequential calls producing study notes and a compact
//! structural extraction of the page.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use crate::ai::LlmGateway;
use crate::types::{truncate_chars, GlobalAnalysis, Page, Result};

const PAGE_TEXT_CAP: usize = 1000;
const GLOBAL_SNIPPET_CAP: usize = 800;
const NOTES_TEMPERATURE: f32 = 0.5;
const STRUCTURE_TEMPERATURE: f32 = 0.0;
pub const MAX_NOTES_CHARS: usize = 300;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PageStructure {
    pub page_number: u32,
    pub title: String,
    #[serde(default)]
    pub main_concepts: Vec<String>,
    #[serde(default)]
    pub key_points: Vec<String>,
}

pub struct Noter {
    llm: Arc<LlmGateway>,
}

impl Noter {
    pub fn new(llm: Arc<LlmGateway>) -> Self {
        Self { llm }
    }

    /// Runs both calls and returns `(notes, page_structure)`. `notes` is
    /// truncated to [`MAX_NOTES_CHARS`] as a backstop if the model
    /// overruns the limit stated in the prompt.
    pub async fn run(&self, page: &Page, global: Option<&GlobalAnalysis>) -> Result<(String, PageStructure)> {
        let notes = self.generate_notes(page, global).await?;
        let structure = self.extract_structure(page).await?;
        Ok((notes, structure))
    }

    async fn generate_notes(&self, page: &Page, global: Option<&GlobalAnalysis>) -> Result<String> {
        let mut prompt = format!(
            "Write markdown study notes for this slide, at most {MAX_NOTES_CHARS} \
             characters total. Structure: a \"## <title>\" heading, a core-concept \
             list, a key-point list, and a short focus paragraph.\n\n"
        );
        if let Some(global) = global {
            prompt.push_str(&format!(
                "Document context: {}\n\n",
                truncate_chars(&global.knowledge_flow, GLOBAL_SNIPPET_CAP)
            ));
        }
        prompt.push_str(&format!("Slide title: {}\n", page.title));
        prompt.push_str(&format!("Slide text:\n{}\n", page.truncated_text(PAGE_TEXT_CAP)));

        let notes = self.llm.chat(&prompt, NOTES_TEMPERATURE).await?;
        Ok(truncate_chars(notes.trim(), MAX_NOTES_CHARS).to_string())
    }

    async fn extract_structure(&self, page: &Page) -> Result<PageStructure> {
        let prompt = format!(
            "Extract this slide's structure as JSON: page_number, title, \
             main_concepts (list), key_points (list).\n\n\
             Slide title: {}\nSlide text:\n{}\n",
            page.title,
            page.truncated_text(PAGE_TEXT_CAP)
        );
        let shape = json!({
            "type": "object",
            "properties": {
                "page_number": {"type": "integer"},
                "title": {"type": "string"},
                "main_concepts": {"type": "array", "items": {"type": "string"}},
                "key_points": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["page_number", "title"]
        });

        let mut structure = match self.llm.structured(&prompt, &shape, STRUCTURE_TEMPERATURE).await {
            Ok(value) => match serde_json::from_value::<PageStructure>(value) {
                Ok(structure) => structure,
                Err(e) => {
                    warn!(error = %e, "page structure response did not match declared shape, degrading");
                    degraded_structure(page)
                }
            },
            Err(e) => {
                warn!(error = %e, "page structure call failed, degrading");
                degraded_structure(page)
            }
        };
        structure.page_number = page.page_number;
        Ok(structure)
    }
}

/// Best-effort fallback when the structure extraction call fails or its
/// response doesn't decode: the slide's own title, no concepts or points.
fn degraded_structure(page: &Page) -> PageStructure {
    PageStructure {
        page_number: page.page_number,
        title: page.title.clone(),
        main_concepts: vec![],
        key_points: vec![],
    }
}
