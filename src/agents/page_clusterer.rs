//! PageClusterer agent: the first stage of the per-page pass. Identifies
//! the concepts on a single page and scores how difficult each one is.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use crate::ai::LlmGateway;
use crate::types::{ConceptCluster, GlobalAnalysis, Page, Result};

const PAGE_TEXT_CAP: usize = 1000;
const TEMPERATURE: f32 = 0.3;

pub struct PageClusterer {
    llm: Arc<LlmGateway>,
}

impl PageClusterer {
    pub fn new(llm: Arc<LlmGateway>) -> Self {
        Self { llm }
    }

    pub async fn run(&self, page: &Page, global: Option<&GlobalAnalysis>) -> Result<Vec<ConceptCluster>> {
        let prompt = build_prompt(page, global);
        let shape = json!({
            "type": "object",
            "properties": {
                "clusters": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "concept": {"type": "string"},
                            "difficulty": {"type": "integer"},
                            "why_difficult": {"type": "string"},
                            "related_concepts": {"type": "array", "items": {"type": "string"}},
                            "global_context": {"type": ["string", "null"]}
                        },
                        "required": ["concept", "difficulty", "why_difficult"]
                    }
                }
            },
            "required": ["clusters"]
        });

        let raw = match self.llm.structured(&prompt, &shape, TEMPERATURE).await {
            Ok(value) => match serde_json::from_value::<RawClusters>(value) {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(error = %e, "page clusterer response did not match declared shape, degrading to no clusters");
                    return Ok(vec![]);
                }
            },
            Err(e) => {
                warn!(error = %e, "page clusterer call failed, degrading to no clusters");
                return Ok(vec![]);
            }
        };

        let clusters = raw
            .clusters
            .into_iter()
            .map(|c| c.clamp_difficulty())
            .filter(|c| c.is_valid())
            .take(ConceptCluster::MAX_PER_PAGE)
            .collect();

        Ok(clusters)
    }
}

#[derive(Debug, Deserialize)]
struct RawClusters {
    #[serde(default)]
    clusters: Vec<ConceptCluster>,
}

fn build_prompt(page: &Page, global: Option<&GlobalAnalysis>) -> String {
    let mut body = format!(
        "Identify up to {} distinct concepts taught on this slide and rate how \
         difficult each is on a 1-5 scale (1 easiest). Explain briefly why.\n\n",
        ConceptCluster::MAX_PER_PAGE
    );
    if let Some(global) = global {
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
    use async_trait::async_trait;

    #[test]
    fn raw_clusters_with_out_of_range_difficulty_is_fixed_by_clamp() {
        let raw: RawClusters = serde_json::from_value(json!({
            "clusters": [{"concept": "attention", "difficulty": 9, "why_difficult": "math"}]
        }))
        .unwrap();
        let clamped = raw.clusters.into_iter().next().unwrap().clamp_difficulty();
        assert_eq!(clamped.difficulty, 5);
        assert!(clamped.is_valid());
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
    /// to an empty cluster list instead of propagating an error (spec §7).
    #[tokio::test]
    async fn run_degrades_to_empty_clusters_on_upstream_failure() {
        let provider: std::sync::Arc<dyn LlmProvider + Send + Sync> = std::sync::Arc::new(AlwaysFailingProvider);
        let llm = Arc::new(LlmGateway::new(provider));
        let clusterer = PageClusterer::new(llm);
        let page = Page { page_number: 1, title: "t".into(), raw_text: "x".into(), bullet_points: vec![], image_descriptions: vec![] };

        let clusters = clusterer.run(&page, None).await.unwrap();
        assert!(clusters.is_empty());
    }
}
