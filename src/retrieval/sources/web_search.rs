//! General web-search source, backed by a configurable SearXNG-compatible
//! JSON search API. Unlike the other two sources, this one requires an
//! endpoint + optional API key from configuration since there is no single
//! canonical free web-search API.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

use super::super::source::ExternalSource;
use crate::types::{PipelineError, Reference, Result};

pub struct WebSearchSource {
    api_base: String,
    api_key: Option<SecretString>,
    client: reqwest::Client,
}

impl WebSearchSource {
    pub fn new(api_base: String, api_key: Option<String>, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| PipelineError::upstream("web_search", format!("failed to build HTTP client: {e}")))?;
        Ok(Self { api_base, api_key: api_key.map(SecretString::from), client })
    }

    fn request(&self, url: &str) -> reqwest::RequestBuilder {
        let mut req = self.client.get(url);
        if let Some(key) = &self.api_key {
            req = req.header("Authorization", format!("Bearer {}", key.expose_secret()));
        }
        req
    }
}

#[async_trait]
impl ExternalSource for WebSearchSource {
    fn name(&self) -> &str {
        "web_search"
    }

    async fn probe(&self) -> bool {
        let url = format!("{}/search?q=test&format=json", self.api_base);
        match self.request(&url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                warn!(error = %e, "web search source unreachable");
                false
            }
        }
    }

    async fn search(&self, query: &str) -> Result<Vec<Reference>> {
        let url = format!(
            "{}/search?q={}&format=json",
            self.api_base,
            url::form_urlencoded::byte_serialize(query.as_bytes()).collect::<String>()
        );

        let response = self
            .request(&url)
            .send()
            .await
            .map_err(|e| PipelineError::upstream("web_search", e.to_string()))?;

        if !response.status().is_success() {
            return Err(PipelineError::SourceUnavailable {
                source: "web_search".into(),
                reason: format!("status {}", response.status()),
            });
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::upstream("web_search", format!("malformed response: {e}")))?;

        Ok(body
            .results
            .into_iter()
            .map(|hit| Reference {
                title: hit.title,
                url: hit.url,
                source_tag: "web_search".into(),
                snippet: hit.content.unwrap_or_default(),
            })
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    title: String,
    url: String,
    content: Option<String>,
}
