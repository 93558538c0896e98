//! Checker agent: the consistency gate between Expander/Retriever and
//! Organizer. Fails open on decode failure so the revision loop always
//! terminates.

use std::sync::Arc;

use serde_json::json;
use tracing::warn;

use crate::ai::LlmGateway;
use crate::types::{truncate_chars, CheckResult, ExpandedContent, Page, Reference, Result};

const PAGE_TEXT_CAP: usize = 600;
const MAX_REFERENCES_IN_PROMPT: usize = 3;
const TEMPERATURE: f32 = 0.0;

pub struct Checker {
    llm: Arc<LlmGateway>,
}

impl Checker {
    pub fn new(llm: Arc<LlmGateway>) -> Self {
        Self { llm }
    }

    pub async fn run(&self, page: &Page, expansions: &[ExpandedContent], references: &[Reference]) -> Result<CheckResult> {
        let prompt = build_prompt(page, expansions, references);
        let shape = json!({
            "type": "object",
            "properties": {
                "status": {"type": "string", "enum": ["pass", "revise"]},
                "issues": {"type": "array", "items": {"type": "string"}},
                "suggestions": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["status"]
        });

        let value = match self.llm.structured(&prompt, &shape, TEMPERATURE).await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "checker call failed, failing open");
                return Ok(CheckResult::fail_open(e.to_string()));
            }
        };

        match serde_json::from_value::<CheckResult>(value) {
            Ok(result) if result.is_valid() => Ok(result),
            Ok(result) => {
                warn!(?result, "checker returned revise with no issues, failing open");
                Ok(CheckResult::fail_open("revise verdict with no recorded issues"))
            }
            Err(e) => {
                warn!(error = %e, "checker response did not match declared shape, failing open");
                Ok(CheckResult::fail_open(e.to_string()))
            }
        }
    }
}

fn build_prompt(page: &Page, expansions: &[ExpandedContent], references: &[Reference]) -> String {
    let mut body = String::from(
        "Verify this page's expansions against its source text and references. \
         Enforce four rules: (1) no fabrication — expansions may not introduce \
         concepts absent from the text and references; (2) grounded — every \
         assertion must trace to the text or a reference; (3) mark speculation \
         explicitly; (4) flag contradictions by returning status=revise with \
         at least one issue.\n\n",
    );
    body.push_str(&format!("Slide text:\n{}\n\n", truncate_chars(&page.raw_text, PAGE_TEXT_CAP)));

    body.push_str("Expansions:\n");
    for expansion in expansions {
        body.push_str(&format!("- [{}] {}: {}\n", expansion.gap_kind.as_str(), expansion.concept, expansion.body));
    }

    body.push_str("\nReferences:\n");
    for reference in references.iter().take(MAX_REFERENCES_IN_PROMPT) {
        body.push_str(&format!("- {} ({}): {}\n", reference.title, reference.url, reference.snippet));
    }

    body
}
