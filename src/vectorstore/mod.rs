//! Vector Store: persistent `(text, metadata, vector)` collection backed by
//! the same SQLite database as the Persistence Store, with cosine
//! similarity computed in-process.

use std::collections::HashMap;

use rusqlite::params;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::ai::EmbeddingGateway;
use crate::storage::SharedDatabase;
use crate::types::{Page, PipelineError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub document_id: String,
    pub file_name: String,
    pub file_kind: String,
    pub page_number: u32,
    pub slide_title: String,
    pub chunk_kind: ChunkKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    FullPage,
    Window,
}

#[derive(Debug, Clone)]
pub struct Chunk {
    pub document_id: String,
    pub page_number: u32,
    pub chunk_index: u32,
    pub text: String,
    pub metadata: ChunkMetadata,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone)]
pub struct SearchHit {
    pub text: String,
    pub metadata: ChunkMetadata,
    pub score: f32,
}

#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    pub file_name: Option<String>,
}

/// In-process cosine-similarity vector store over SQLite-persisted chunks.
pub struct VectorStore {
    db: SharedDatabase,
    embeddings: EmbeddingGateway,
    chunk_size: usize,
    chunk_overlap: usize,
}

impl VectorStore {
    pub fn new(db: SharedDatabase, embeddings: EmbeddingGateway, chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            db,
            embeddings,
            chunk_size,
            chunk_overlap,
        }
    }

    /// Split `page` into chunks per the chunking policy: one chunk covering
    /// the whole page by default, or overlapping windows when the page
    /// exceeds `chunk_size`.
    pub fn chunk_page(&self, document_id: &str, file_name: &str, file_kind: &str, page: &Page) -> Vec<(String, ChunkMetadata)> {
        let metadata = |kind: ChunkKind| ChunkMetadata {
            document_id: document_id.to_string(),
            file_name: file_name.to_string(),
            file_kind: file_kind.to_string(),
            page_number: page.page_number,
            slide_title: page.title.clone(),
            chunk_kind: kind,
        };

        if page.raw_text.chars().count() <= self.chunk_size {
            return vec![(page.raw_text.clone(), metadata(ChunkKind::FullPage))];
        }

        let chars: Vec<char> = page.raw_text.chars().collect();
        let stride = self.chunk_size.saturating_sub(self.chunk_overlap).max(1);
        let mut windows = Vec::new();
        let mut start = 0;
        while start < chars.len() {
            let end = (start + self.chunk_size).min(chars.len());
            windows.push((chars[start..end].iter().collect::<String>(), metadata(ChunkKind::Window)));
            if end == chars.len() {
                break;
            }
            start += stride;
        }
        windows
    }

    /// Embed and persist chunks for `page`. Idempotent by
    /// `(document_id, page_number, chunk_index)`: re-upserting the same page
    /// overwrites rather than duplicates.
    pub async fn upsert_page(&self, document_id: &str, file_name: &str, file_kind: &str, page: &Page) -> Result<()> {
        let texts = self.chunk_page(document_id, file_name, file_kind, page);
        if texts.is_empty() {
            return Ok(());
        }

        let raw_texts: Vec<String> = texts.iter().map(|(t, _)| t.clone()).collect();
        let vectors = self.embeddings.embed_batch(&raw_texts).await?;

        let conn = self.db.connection()?;
        for (chunk_index, ((text, metadata), embedding)) in texts.into_iter().zip(vectors).enumerate() {
            let metadata_json = serde_json::to_string(&metadata)?;
            let embedding_bytes = embedding_to_bytes(&embedding);
            conn.execute(
                "INSERT INTO vector_chunks
                    (document_id, page_number, chunk_index, chunk_kind, file_name, slide_title, text, metadata_json, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(document_id, page_number, chunk_index) DO UPDATE SET
                    chunk_kind = excluded.chunk_kind,
                    text = excluded.text,
                    metadata_json = excluded.metadata_json,
                    embedding = excluded.embedding",
                params![
                    document_id,
                    page.page_number,
                    chunk_index as u32,
                    format!("{:?}", metadata.chunk_kind),
                    file_name,
                    metadata.slide_title,
                    text,
                    metadata_json,
                    embedding_bytes,
                ],
            )
            .map_err(PipelineError::from)?;
        }

        Ok(())
    }

    pub fn delete_by_file(&self, document_id: &str) -> Result<()> {
        let conn = self.db.connection()?;
        conn.execute("DELETE FROM vector_chunks WHERE document_id = ?1", params![document_id])
            .map_err(PipelineError::from)?;
        Ok(())
    }

    /// Nearest-neighbor search with optional file-name filter and
    /// cosine-similarity floor. Deduplicates to at most one hit per
    /// `(document_id, page_number)`, keeping the highest score.
    pub async fn search(&self, query: &str, k: usize, filter: Option<SearchFilter>, min_score: Option<f32>) -> Result<Vec<SearchHit>> {
        match self.search_vector(query, k, filter.clone(), min_score).await {
            Ok(hits) => Ok(hits),
            Err(e) => {
                warn!(error = %e, "vector search failed, degrading to substring match");
                self.search_substring(query, k, filter)
            }
        }
    }

    async fn search_vector(&self, query: &str, k: usize, filter: Option<SearchFilter>, min_score: Option<f32>) -> Result<Vec<SearchHit>> {
        let query_vec = self.embeddings.embed(query).await?;
        let candidates = self.load_candidates(filter.as_ref())?;

        let mut scored: Vec<SearchHit> = candidates
            .into_iter()
            .map(|c| SearchHit {
                score: cosine_similarity(&query_vec, &c.embedding),
                text: c.text,
                metadata: c.metadata,
            })
            .filter(|hit| min_score.is_none_or(|min| hit.score >= min))
            .collect();

        dedup_best_per_page(&mut scored);
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(k);
        Ok(scored)
    }

    fn search_substring(&self, query: &str, k: usize, filter: Option<SearchFilter>) -> Result<Vec<SearchHit>> {
        let query_lower = query.to_lowercase();
        let candidates = self.load_candidates(filter.as_ref())?;

        let mut hits: Vec<SearchHit> = candidates
            .into_iter()
            .filter(|c| c.text.to_lowercase().contains(&query_lower))
            .map(|c| SearchHit { text: c.text, metadata: c.metadata, score: 0.0 })
            .collect();

        dedup_best_per_page(&mut hits);
        hits.truncate(k);
        Ok(hits)
    }

    fn load_candidates(&self, filter: Option<&SearchFilter>) -> Result<Vec<Chunk>> {
        let conn = self.db.connection()?;

        let (sql, file_name_param) = match filter.and_then(|f| f.file_name.as_deref()) {
            Some(name) => (
                "SELECT document_id, page_number, chunk_index, text, metadata_json, embedding
                 FROM vector_chunks WHERE file_name = ?1",
                Some(name.to_string()),
            ),
            None => (
                "SELECT document_id, page_number, chunk_index, text, metadata_json, embedding
                 FROM vector_chunks",
                None,
            ),
        };

        let mut stmt = conn.prepare(sql).map_err(PipelineError::from)?;
        let rows = match &file_name_param {
            Some(name) => stmt
                .query_map(params![name], row_to_chunk)
                .map_err(PipelineError::from)?
                .collect::<std::result::Result<Vec<_>, _>>(),
            None => stmt
                .query_map(params![], row_to_chunk)
                .map_err(PipelineError::from)?
                .collect::<std::result::Result<Vec<_>, _>>(),
        };
        rows.map_err(PipelineError::from)
    }
}

fn row_to_chunk(row: &rusqlite::Row) -> rusqlite::Result<Chunk> {
    let document_id: String = row.get(0)?;
    let page_number: u32 = row.get(1)?;
    let chunk_index: u32 = row.get(2)?;
    let text: String = row.get(3)?;
    let metadata_json: String = row.get(4)?;
    let embedding_bytes: Vec<u8> = row.get(5)?;

    let metadata: ChunkMetadata = serde_json::from_str(&metadata_json).unwrap_or(ChunkMetadata {
        document_id: document_id.clone(),
        file_name: String::new(),
        file_kind: String::new(),
        page_number,
        slide_title: String::new(),
        chunk_kind: ChunkKind::FullPage,
    });

    Ok(Chunk {
        document_id,
        page_number,
        chunk_index,
        text,
        metadata,
        embedding: bytes_to_embedding(&embedding_bytes),
    })
}

fn dedup_best_per_page(hits: &mut Vec<SearchHit>) {
    let mut best: HashMap<(String, u32), usize> = HashMap::new();
    for (i, hit) in hits.iter().enumerate() {
        let key = (hit.metadata.document_id.clone(), hit.metadata.page_number);
        match best.get(&key) {
            Some(&existing) if hits[existing].score >= hit.score => {}
            _ => {
                best.insert(key, i);
            }
        }
    }
    let mut keep: Vec<usize> = best.into_values().collect();
    keep.sort_unstable();
    let mut kept = Vec::with_capacity(keep.len());
    for i in keep {
        kept.push(hits[i].clone());
    }
    *hits = kept;
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes.chunks_exact(4).map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]])).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_similarity_identical_vectors_is_one() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_orthogonal_vectors_is_zero() {
        assert!((cosine_similarity(&[1.0, 0.0], &[0.0, 1.0])).abs() < 1e-6);
    }

    #[test]
    fn embedding_byte_round_trip() {
        let original = vec![0.5_f32, -1.25, 3.0];
        let bytes = embedding_to_bytes(&original);
        let back = bytes_to_embedding(&bytes);
        assert_eq!(original, back);
    }

    #[test]
    fn dedup_keeps_highest_score_per_page() {
        let mut hits = vec![
            SearchHit {
                text: "a".into(),
                metadata: ChunkMetadata {
                    document_id: "d1".into(),
                    file_name: "f".into(),
                    file_kind: "deck".into(),
                    page_number: 1,
                    slide_title: "s".into(),
                    chunk_kind: ChunkKind::FullPage,
                },
                score: 0.3,
            },
            SearchHit {
                text: "b".into(),
                metadata: ChunkMetadata {
                    document_id: "d1".into(),
                    file_name: "f".into(),
                    file_kind: "deck".into(),
                    page_number: 1,
                    slide_title: "s".into(),
                    chunk_kind: ChunkKind::Window,
                },
                score: 0.8,
            },
        ];
        dedup_best_per_page(&mut hits);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "b");
    }

    #[test]
    fn chunk_page_splits_long_text_into_overlapping_windows() {
        let db = std::sync::Arc::new(crate::storage::Database::open_in_memory().unwrap());
        let embeddings = crate::ai::EmbeddingGateway::new(
            "k".into(),
            "https://api.openai.com/v1".into(),
            "text-embedding-3-small".into(),
            30,
        )
        .unwrap();
        let store = VectorStore::new(db, embeddings, 10, 3);
        let page = Page {
            page_number: 1,
            title: "t".into(),
            raw_text: "a".repeat(25),
            bullet_points: vec![],
            image_descriptions: vec![],
        };
        let chunks = store.chunk_page("doc1", "f.pptx", "deck", &page);
        assert!(chunks.len() > 1);
    }

    #[test]
    fn chunk_page_keeps_short_pages_whole() {
        let db = std::sync::Arc::new(crate::storage::Database::open_in_memory().unwrap());
        let embeddings = crate::ai::EmbeddingGateway::new(
            "k".into(),
            "https://api.openai.com/v1".into(),
            "text-embedding-3-small".into(),
            30,
        )
        .unwrap();
        let store = VectorStore::new(db, embeddings, 1200, 200);
        let page = Page {
            page_number: 1,
            title: "t".into(),
            raw_text: "short page".into(),
            bullet_points: vec![],
            image_descriptions: vec![],
        };
        let chunks = store.chunk_page("doc1", "f.pptx", "deck", &page);
        assert_eq!(chunks.len(), 1);
    }
}
