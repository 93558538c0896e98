//! GapFinder agent: identifies missing context a learner would need,
//! optionally reasoning about cross-page prerequisites when global context
//! is available.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use crate::ai::LlmGateway;
use crate::types::{GlobalAnalysis, KnowledgeGap, Page, Result};

const PAGE_TEXT_CAP: usize = 1000;
const TEMPERATURE: f32 = 0.2;

pub struct GapFinder {
    llm: Arc<LlmGateway>,
}

impl GapFinder {
    pub fn new(llm: Arc<LlmGateway>) -> Self {
        Self { llm }
    }

    pub async fn run(&self, page: &Page, global: Option<&GlobalAnalysis>) -> Result<Vec<KnowledgeGap>> {
        let prompt = build_prompt(page, global);
        let shape = json!({
            "type": "object",
            "properties": {
                "gaps": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "concept": {"type": "string"},
                            "gap_kind": {"type": "string", "enum": ["intuition", "example", "prerequisite", "derivation"]},
                            "priority": {"type": "integer"}
                        },
                        "required": ["concept", "gap_kind", "priority"]
                    }
                }
            },
            "required": ["gaps"]
        });

        let raw = match self.llm.structured(&prompt, &shape, TEMPERATURE).await {
            Ok(value) => match serde_json::from_value::<RawGaps>(value) {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(error = %e, "gap finder response did not match declared shape, degrading to no gaps");
                    return Ok(vec![]);
                }
            },
            Err(e) => {
                warn!(error = %e, "gap finder call failed, degrading to no gaps");
                return Ok(vec![]);
            }
        };

        let gaps = raw
            .gaps
            .into_iter()
            .map(|g| g.clamp_priority())
            .filter(|g| g.is_valid())
            .take(KnowledgeGap::MAX_PER_PAGE)
            .collect();

        Ok(gaps)
    }
}

#[derive(Debug, Deserialize)]
struct RawGaps {
    #[serde(default)]
    gaps: Vec<KnowledgeGap>,
}

fn build_prompt(page: &Page, global: Option<&GlobalAnalysis>) -> String {
    let mut body = format!(
        "Identify up to {} knowledge gaps on this slide: concepts a learner \
         would struggle with because something is missing (intuition, a \
         worked example, a prerequisite, or a derivation). Rate each gap's \
         priority 1-5 (5 most urgent).\n\n",
        KnowledgeGap::MAX_PER_PAGE
    );
    if let Some(global) = global {
        body.push_str(
            "The document has cross-page structure; consider whether a gap \
             is actually a missing prerequisite taught on an earlier page.\n",
        );
        body.push_str(&format!("Document topic: {}\n\n", global.main_topic));
    }
    body.push_str(&format!("Slide title: {}\n", page.title));
    body.push_str(&format!("Slide text:\n{}\n", page.truncated_text(PAGE_TEXT_CAP)));
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::provider::{LlmProvider, LlmResponse};
    use crate::types::GapKind;
    use async_trait::async_trait;

    #[test]
    fn clamps_out_of_range_priority() {
        let raw: RawGaps = serde_json::from_value(json!({
            "gaps": [{"concept": "softmax", "gap_kind": "intuition", "priority": 42}]
        }))
        .unwrap();
        let gap = raw.gaps.into_iter().next().unwrap().clamp_priority();
        assert_eq!(gap.priority, 5);
        assert_eq!(gap.gap_kind, GapKind::Intuition);
    }

    struct AlwaysFailingProvider;

    #[async_trait]
    impl LlmProvider for AlwaysFailingProvider {
        async fn generate(&self, _prompt: &str, _schema: &serde_json::Value, _temperature: f32) -> Result<LlmResponse> {
            Err(crate::types::PipelineError::upstream("llm", "503 server error"))
        }

        fn name(&self) -> &str {
            "test"
        }

        fn model(&self) -> &str {
            "test"
        }

        async fn health_check(&self) -> Result<bool> {
            Ok(true)
        }
    }

    /// A decode/upstream failure never aborts the page pass: `run` degrades
    /// to an empty gap list instead of propagating an error (spec §7).
    #[tokio::test]
    async fn run_degrades_to_empty_gaps_on_upstream_failure() {
        let provider: std::sync::Arc<dyn LlmProvider + Send + Sync> = std::sync::Arc::new(AlwaysFailingProvider);
        let llm = Arc::new(LlmGateway::new(provider));
        let finder = GapFinder::new(llm);
        let page = Page { page_number: 1, title: "t".into(), raw_text: "x".into(), bullet_points: vec![], image_descriptions: vec![] };

        let gaps = finder.run(&page, None).await.unwrap();
        assert!(gaps.is_empty());
    }
}
