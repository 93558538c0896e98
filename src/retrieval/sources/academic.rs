//! Academic-paper index source, backed by the Semantic Scholar Graph API.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

use super::super::source::ExternalSource;
use crate::types::{PipelineError, Reference, Result};

const DEFAULT_API_BASE: &str = "https://api.semanticscholar.org/graph/v1";

pub struct AcademicSource {
    api_base: String,
    client: reqwest::Client,
}

impl AcademicSource {
    pub fn new(timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| PipelineError::upstream("academic", format!("failed to build HTTP client: {e}")))?;
        Ok(Self { api_base: DEFAULT_API_BASE.to_string(), client })
    }
}

#[async_trait]
impl ExternalSource for AcademicSource {
    fn name(&self) -> &str {
        "academic"
    }

    async fn probe(&self) -> bool {
        let url = format!("{}/paper/search?query=test&limit=1", self.api_base);
        match self.client.get(&url).send().await {
            Ok(resp) => resp.status().is_success() || resp.status().as_u16() == 429,
            Err(e) => {
                warn!(error = %e, "academic source unreachable");
                false
            }
        }
    }

    async fn search(&self, query: &str) -> Result<Vec<Reference>> {
        let url = format!(
            "{}/paper/search?query={}&limit=5&fields=title,url,abstract",
            self.api_base,
            url::form_urlencoded::byte_serialize(query.as_bytes()).collect::<String>()
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| PipelineError::upstream("academic", e.to_string()))?;

        if !response.status().is_success() {
            return Err(PipelineError::SourceUnavailable {
                source: "academic".into(),
                reason: format!("status {}", response.status()),
            });
        }

        let body: SemanticScholarResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::upstream("academic", format!("malformed response: {e}")))?;

        Ok(body
            .data
            .into_iter()
            .map(|paper| Reference {
                title: paper.title.unwrap_or_default(),
                url: paper.url.unwrap_or_default(),
                source_tag: "academic".into(),
                snippet: paper.abstract_text.unwrap_or_default(),
            })
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct SemanticScholarResponse {
    #[serde(default)]
    data: Vec<SemanticScholarPaper>,
}

#[derive(Debug, Deserialize)]
struct SemanticScholarPaper {
    title: Option<String>,
    url: Option<String>,
    #[serde(rename = "abstract")]
    abstract_text: Option<String>,
}
