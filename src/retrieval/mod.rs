//! External Retrieval Router: probes a named set of [`ExternalSource`]s
//! once, then fans a query out to whichever are available, merging in
//! preferred order.

pub mod source;
pub mod sources;

pub use source::ExternalSource;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::warn;

use crate::types::Reference;

pub struct Router {
    sources: Vec<Arc<dyn ExternalSource>>,
    availability: RwLock<HashMap<String, bool>>,
}

impl Router {
    /// Probe every source once and cache availability.
    pub async fn new(sources: Vec<Arc<dyn ExternalSource>>) -> Self {
        let mut availability = HashMap::new();
        for source in &sources {
            let available = source.probe().await;
            if !available {
                warn!(source = source.name(), "external source unavailable at startup");
            }
            availability.insert(source.name().to_string(), available);
        }
        Self {
            sources,
            availability: RwLock::new(availability),
        }
    }

    pub async fn any_available(&self) -> bool {
        self.availability.read().await.values().any(|&v| v)
    }

    /// Query every available source, in `preferred_order`, merging hits and
    /// capping at `max_results`. Per-source failures are logged and
    /// contribute no hits; they never propagate.
    pub async fn search(&self, query: &str, preferred_order: &[String], max_results: usize) -> Vec<Reference> {
        let availability = self.availability.read().await;
        let mut merged = Vec::new();
        let mut seen_urls = HashSet::new();

        for name in preferred_order {
            if merged.len() >= max_results {
                break;
            }
            if !availability.get(name).copied().unwrap_or(false) {
                continue;
            }
            let Some(source) = self.sources.iter().find(|s| s.name() == name) else {
                continue;
            };

            match source.search(query).await {
                Ok(hits) => {
                    for hit in hits {
                        if merged.len() >= max_results {
                            break;
                        }
                        if hit.is_placeholder() {
                            continue;
                        }
                        if !seen_urls.insert(hit.url.clone()) {
                            continue;
                        }
                        merged.push(hit);
                    }
                }
                Err(e) => {
                    warn!(source = name.as_str(), error = %e, "retrieval source search failed, skipping");
                }
            }
        }

        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::types::Result;

    struct StubSource {
        name: &'static str,
        available: bool,
        hits: Vec<Reference>,
    }

    #[async_trait]
    impl ExternalSource for StubSource {
        fn name(&self) -> &str {
            self.name
        }

        async fn probe(&self) -> bool {
            self.available
        }

        async fn search(&self, _query: &str) -> Result<Vec<Reference>> {
            Ok(self.hits.clone())
        }
    }

    fn reference(url: &str) -> Reference {
        Reference {
            title: "t".into(),
            url: url.into(),
            source_tag: "stub".into(),
            snippet: "s".into(),
        }
    }

    #[tokio::test]
    async fn skips_unavailable_sources() {
        let sources: Vec<Arc<dyn ExternalSource>> = vec![
            Arc::new(StubSource { name: "a", available: false, hits: vec![reference("https://a.example")] }),
            Arc::new(StubSource { name: "b", available: true, hits: vec![reference("https://b.example")] }),
        ];
        let router = Router::new(sources).await;
        let results = router.search("query", &["a".into(), "b".into()], 10).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].url, "https://b.example");
    }

    #[tokio::test]
    async fn dedups_by_url_across_sources() {
        let sources: Vec<Arc<dyn ExternalSource>> = vec![
            Arc::new(StubSource { name: "a", available: true, hits: vec![reference("https://same.example")] }),
            Arc::new(StubSource { name: "b", available: true, hits: vec![reference("https://same.example")] }),
        ];
        let router = Router::new(sources).await;
        let results = router.search("query", &["a".into(), "b".into()], 10).await;
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn drops_placeholder_hits() {
        let sources: Vec<Arc<dyn ExternalSource>> = vec![Arc::new(StubSource {
            name: "a",
            available: true,
            hits: vec![reference(""), reference("https://real.example")],
        })];
        let router = Router::new(sources).await;
        let results = router.search("query", &["a".into()], 10).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].url, "https://real.example");
    }

    #[tokio::test]
    async fn caps_at_max_results() {
        let sources: Vec<Arc<dyn ExternalSource>> = vec![Arc::new(StubSource {
            name: "a",
            available: true,
            hits: (0..10).map(|i| reference(&format!("https://example.com/{i}"))).collect(),
        })];
        let router = Router::new(sources).await;
        let results = router.search("query", &["a".into()], 3).await;
        assert_eq!(results.len(), 3);
    }

    #[tokio::test]
    async fn all_unavailable_returns_empty() {
        let sources: Vec<Arc<dyn ExternalSource>> = vec![Arc::new(StubSource { name: "a", available: false, hits: vec![] })];
        let router = Router::new(sources).await;
        assert!(!router.any_available().await);
        let results = router.search("query", &["a".into()], 10).await;
        assert!(results.is_empty());
    }
}
