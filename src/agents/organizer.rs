//! Organizer agent: the final per-page stage. Merges notes and surviving
//! expansions into one markdown block.

use std::sync::Arc;

use crate::ai::LlmGateway;
use crate::types::{truncate_chars, ExpandedContent, Result};

const TEMPERATURE: f32 = 0.5;
pub const MAX_FINAL_NOTES_CHARS: usize = 300;

pub struct Organizer {
    llm: Arc<LlmGateway>,
}

impl Organizer {
    pub fn new(llm: Arc<LlmGateway>) -> Self {
        Self { llm }
    }

    pub async fn run(&self, notes: &str, expansions: &[ExpandedContent]) -> Result<String> {
        let prompt = build_prompt(notes, expansions);
        let final_notes = self.llm.chat(&prompt, TEMPERATURE).await?;
        Ok(truncate_chars(final_notes.trim(), MAX_FINAL_NOTES_CHARS).to_string())
    }
}

fn build_prompt(notes: &str, expansions: &[ExpandedContent]) -> String {
    let mut body = format!(
        "Integrate the study notes below with the surviving expansions into a \
         single markdown block of at most {MAX_FINAL_NOTES_CHARS} characters. \
         This is not a reference list — weave the expansions into the notes' \
         prose. Merge any expansions that cover the same concept rather than \
         repeating them.\n\n"
    );
    body.push_str(&format!("Notes:\n{notes}\n\n"));
    if expansions.is_empty() {
        body.push_str("No surviving expansions.\n");
    } else {
        body.push_str("Expansions:\n");
        for expansion in expansions {
            body.push_str(&format!("- {}: {}\n", expansion.concept, expansion.body));
        }
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GapKind;

    #[test]
    fn prompt_notes_empty_expansions_list() {
        let prompt = build_prompt("## Intro\nsome notes", &[]);
        assert!(prompt.contains("No surviving expansions."));
    }

    #[test]
    fn prompt_includes_all_expansions() {
        let expansions = vec![
            ExpandedContent { concept: "a".into(), gap_kind: GapKind::Intuition, body: "body a".into(), sources: vec![] },
            ExpandedContent { concept: "b".into(), gap_kind: GapKind::Example, body: "body b".into(), sources: vec![] },
        ];
        let prompt = build_prompt("notes", &expansions);
        assert!(prompt.contains("body a"));
        assert!(prompt.contains("body b"));
    }
}
