//! The nine pipeline agents. Each is a pure function of its inputs wrapping
//! exactly one remote call; the orchestrator composes them with explicit
//! edges rather than a shared inheritance hierarchy.

pub mod checker;
pub mod expander;
pub mod gap_finder;
pub mod global_structure;
pub mod knowledge_clustering;
pub mod noter;
pub mod organizer;
pub mod page_clusterer;
pub mod retriever;

use crate::types::Page;

/// Sampling policy shared by GlobalStructure and KnowledgeClustering: full
/// per-page text under the threshold, a sampled summary (first 5, last 5,
/// every 5th middle page) above it.
pub fn sample_pages(pages: &[Page], threshold: usize, per_page_cap: usize) -> Vec<(u32, String)> {
    if pages.len() <= threshold {
        return pages
            .iter()
            .map(|p| (p.page_number, p.truncated_text(per_page_cap).to_string()))
            .collect();
    }

    let mut sampled = Vec::new();
    let n = pages.len();
    let mut indices: Vec<usize> = (0..n.min(5)).collect();
    indices.extend((n.saturating_sub(5)..n).collect::<Vec<_>>());
    indices.extend((0..n).step_by(5));
    indices.sort_unstable();
    indices.dedup();

    for i in indices {
        if let Some(page) = pages.get(i) {
            sampled.push((page.page_number, page.truncated_text(per_page_cap).to_string()));
        }
    }
    sampled
}
