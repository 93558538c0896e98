//! Retriever agent: gathers supporting references for high-priority gaps,
//! preferring the local Vector Store before falling back to the External
//! Retrieval Router.

use std::collections::HashSet;
use std::sync::Arc;

use crate::retrieval::Router;
use crate::types::{truncate_chars, KnowledgeGap, Page, Reference, Result};
use crate::vectorstore::{SearchFilter, VectorStore};

const HIGH_PRIORITY_THRESHOLD: u8 = 4;
const MERGED_QUERY_CAP: usize = 800;

pub struct Retriever {
    vector_store: Arc<VectorStore>,
    router: Arc<Router>,
    max_results: usize,
    min_score: f32,
    local_rag_priority: bool,
}

impl Retriever {
    pub fn new(
        vector_store: Arc<VectorStore>,
        router: Arc<Router>,
        max_results: usize,
        min_score: f32,
        local_rag_priority: bool,
    ) -> Self {
        Self { vector_store, router, max_results, min_score, local_rag_priority }
    }

    pub async fn run(
        &self,
        page: &Page,
        gaps: &[KnowledgeGap],
        preferred_sources: &[String],
        previous_local_hits: &[Reference],
    ) -> Result<Vec<Reference>> {
        let high_priority: Vec<&KnowledgeGap> =
            gaps.iter().filter(|g| g.priority >= HIGH_PRIORITY_THRESHOLD).collect();

        if high_priority.is_empty() && previous_local_hits.is_empty() {
            return Ok(vec![]);
        }

        let query = merged_query(page, &high_priority);

        let local_hits = self
            .vector_store
            .search(&query, self.max_results, Some(SearchFilter::default()), Some(self.min_score))
            .await?;

        let mut merged = Vec::new();
        let mut seen_urls = HashSet::new();

        let local_references: Vec<Reference> = local_hits
            .into_iter()
            .map(|hit| Reference {
                title: hit.metadata.slide_title.clone(),
                url: format!("local://{}#page-{}", hit.metadata.document_id, hit.metadata.page_number),
                source_tag: "vector_store".into(),
                snippet: truncate_chars(&hit.text, 280).to_string(),
            })
            .collect();

        let have_enough_local = self.local_rag_priority && local_references.len() >= self.max_results;

        for reference in local_references {
            if reference.is_placeholder() || !seen_urls.insert(reference.url.clone()) {
                continue;
            }
            merged.push(reference);
        }

        if !have_enough_local && merged.len() < self.max_results && self.router.any_available().await {
            let remaining = self.max_results - merged.len();
            let external = self.router.search(&query, preferred_sources, remaining).await;
            for reference in external {
                if merged.len() >= self.max_results {
                    break;
                }
                if reference.is_placeholder() || !seen_urls.insert(reference.url.clone()) {
                    continue;
                }
                merged.push(reference);
            }
        }

        merged.truncate(self.max_results);
        Ok(merged)
    }
}

fn merged_query(page: &Page, gaps: &[&KnowledgeGap]) -> String {
    let mut query = String::new();
    for gap in gaps {
        if !query.is_empty() {
            query.push_str("; ");
        }
        query.push_str(&gap.concept);
    }
    if query.is_empty() {
        query.push_str(&page.title);
    }
    truncate_chars(&query, MERGED_QUERY_CAP).to_string()
}
