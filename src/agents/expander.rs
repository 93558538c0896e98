//! Expander agent: elaborates the highest-priority knowledge gaps into
//! short, gap-kind-conditioned explanations.

use std::sync::Arc;

use crate::ai::LlmGateway;
use crate::types::{ExpandedContent, GapKind, KnowledgeGap, Page, Result};

const PAGE_TEXT_CAP: usize = 1000;
const TEMPERATURE: f32 = 0.6;

pub struct Expander {
    llm: Arc<LlmGateway>,
    min_gap_priority: u8,
}

impl Expander {
    pub fn new(llm: Arc<LlmGateway>, min_gap_priority: u8) -> Self {
        Self { llm, min_gap_priority }
    }

    /// Selects gaps meeting *both* `min_gap_priority` and the page's top-3
    /// (by priority), then expands each with one call.
    pub async fn run(&self, page: &Page, gaps: &[KnowledgeGap]) -> Result<Vec<ExpandedContent>> {
        let selected = self.select_gaps(gaps);
        let mut expansions = Vec::with_capacity(selected.len());
        for gap in selected {
            expansions.push(self.expand_one(page, gap).await?);
        }
        Ok(expansions)
    }

    fn select_gaps<'a>(&self, gaps: &'a [KnowledgeGap]) -> Vec<&'a KnowledgeGap> {
        let mut ranked: Vec<&KnowledgeGap> = gaps.iter().collect();
        ranked.sort_by(|a, b| b.priority.cmp(&a.priority));
        ranked
            .into_iter()
            .take(ExpandedContent::MAX_EXPANSIONS)
            .filter(|g| g.priority >= self.min_gap_priority)
            .collect()
    }

    async fn expand_one(&self, page: &Page, gap: &KnowledgeGap) -> Result<ExpandedContent> {
        let style = match gap.gap_kind {
            GapKind::Intuition => "a short, plain-language intuition",
            GapKind::Example => "one single concrete worked example",
            GapKind::Prerequisite => "a concise definition of the missing prerequisite",
            GapKind::Derivation => "the missing derivation steps, in order",
        };
        let prompt = format!(
            "The concept \"{}\" has a knowledge gap of kind \"{}\" on this slide. \
             Write {} in at most {} characters, grounded only in the slide text \
             below. Do not invent facts not supported by it.\n\n\
             Slide title: {}\nSlide text:\n{}\n",
            gap.concept,
            gap.gap_kind.as_str(),
            style,
            ExpandedContent::MAX_BODY_CHARS,
            page.title,
            page.truncated_text(PAGE_TEXT_CAP)
        );

        let body = self.llm.chat(&prompt, TEMPERATURE).await?;
        let body = crate::types::truncate_chars(body.trim(), ExpandedContent::MAX_BODY_CHARS).to_string();

        Ok(ExpandedContent {
            concept: gap.concept.clone(),
            gap_kind: gap.gap_kind,
            body,
            sources: vec![],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::provider::{LlmProvider, LlmResponse, ResponseMetadata, ResponseTiming, TokenUsage};
    use async_trait::async_trait;
    use serde_json::Value;
    use std::time::Duration;

    struct EchoProvider;

    #[async_trait]
    impl LlmProvider for EchoProvider {
        async fn generate(&self, _prompt: &str, _schema: &Value, _temperature: f32) -> Result<LlmResponse> {
            Ok(LlmResponse::with_metrics(
                Value::String("a".repeat(500)),
                TokenUsage::default(),
                ResponseTiming::from_duration(Duration::from_millis(1)),
                ResponseMetadata { model: "t".into(), provider: "t".into() },
            ))
        }
        fn name(&self) -> &str {
            "t"
        }
        fn model(&self) -> &str {
            "t"
        }
        async fn health_check(&self) -> Result<bool> {
            Ok(true)
        }
    }

    fn gap(priority: u8) -> KnowledgeGap {
        KnowledgeGap { concept: "softmax".into(), gap_kind: GapKind::Intuition, priority }
    }

    #[test]
    fn select_gaps_takes_intersection_of_top3_and_threshold() {
        let llm = Arc::new(LlmGateway::new(Arc::new(EchoProvider)));
        let expander = Expander::new(llm, 3);
        let gaps = vec![gap(5), gap(4), gap(2), gap(1)];
        let selected = expander.select_gaps(&gaps);
        assert_eq!(selected.len(), 2);
        assert!(selected.iter().all(|g| g.priority >= 3));
    }

    #[tokio::test]
    async fn expand_one_truncates_body_to_max_chars() {
        let llm = Arc::new(LlmGateway::new(Arc::new(EchoProvider)));
        let expander = Expander::new(llm, 3);
        let page = Page {
            page_number: 1,
            title: "t".into(),
            raw_text: "x".into(),
            bullet_points: vec![],
            image_descriptions: vec![],
        };
        let expansion = expander.expand_one(&page, &gap(5)).await.unwrap();
        assert!(expansion.body.chars().count() <= ExpandedContent::MAX_BODY_CHARS);
    }
}
