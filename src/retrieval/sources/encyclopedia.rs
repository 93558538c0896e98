//! Encyclopedia source, backed by the Wikipedia search API.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

use super::super::source::ExternalSource;
use crate::types::{PipelineError, Reference, Result};

const DEFAULT_API_BASE: &str = "https://en.wikipedia.org/w/api.php";

pub struct EncyclopediaSource {
    api_base: String,
    client: reqwest::Client,
}

impl EncyclopediaSource {
    pub fn new(timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| PipelineError::upstream("encyclopedia", format!("failed to build HTTP client: {e}")))?;
        Ok(Self { api_base: DEFAULT_API_BASE.to_string(), client })
    }

    fn article_url(title: &str) -> String {
        format!(
            "https://en.wikipedia.org/wiki/{}",
            title.replace(' ', "_")
        )
    }
}

#[async_trait]
impl ExternalSource for EncyclopediaSource {
    fn name(&self) -> &str {
        "encyclopedia"
    }

    async fn probe(&self) -> bool {
        let url = format!("{}?action=query&meta=siteinfo&format=json", self.api_base);
        match self.client.get(&url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                warn!(error = %e, "encyclopedia source unreachable");
                false
            }
        }
    }

    async fn search(&self, query: &str) -> Result<Vec<Reference>> {
        let url = format!(
            "{}?action=query&list=search&srsearch={}&srlimit=5&format=json",
            self.api_base,
            url::form_urlencoded::byte_serialize(query.as_bytes()).collect::<String>()
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| PipelineError::upstream("encyclopedia", e.to_string()))?;

        if !response.status().is_success() {
            return Err(PipelineError::SourceUnavailable {
                source: "encyclopedia".into(),
                reason: format!("status {}", response.status()),
            });
        }

        let body: WikipediaResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::upstream("encyclopedia", format!("malformed response: {e}")))?;

        Ok(body
            .query
            .search
            .into_iter()
            .map(|hit| Reference {
                url: Self::article_url(&hit.title),
                title: hit.title,
                source_tag: "encyclopedia".into(),
                snippet: strip_html(&hit.snippet),
            })
            .collect())
    }
}

fn strip_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_tag = false;
    for ch in s.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out
}

#[derive(Debug, Deserialize)]
struct WikipediaResponse {
    query: WikipediaQuery,
}

#[derive(Debug, Deserialize)]
struct WikipediaQuery {
    search: Vec<WikipediaHit>,
}

#[derive(Debug, Deserialize)]
struct WikipediaHit {
    title: String,
    #[serde(default)]
    snippet: String,
}
