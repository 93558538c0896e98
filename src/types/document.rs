//! Document and page entities.
//!
//! `Document` and `Page` are produced upstream by the deck/PDF parser (out
//! of scope here — see the module docs) and handed to the pipeline fully
//! populated. The pipeline only ever mutates a `Document` by attaching a
//! `GlobalAnalysis`; `Page`s are immutable once attached.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::analysis::GlobalAnalysis;

/// Opaque, unique document identifier. A thin wrapper over `String` (a UUID
/// in practice) so it can't be confused with a page number or a content
/// hash at a call site.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for DocumentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for DocumentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Deck,
    Pdf,
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deck => write!(f, "deck"),
            Self::Pdf => write!(f, "pdf"),
        }
    }
}

/// A single text node in a page's bullet-point tree. `depth` is 0-indexed;
/// a top-level bullet has `depth = 0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulletPoint {
    pub depth: u8,
    pub text: String,
}

/// One page (slide) of a document. Immutable once attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    /// 1-indexed, unique within the document.
    pub page_number: u32,
    pub title: String,
    pub raw_text: String,
    #[serde(default)]
    pub bullet_points: Vec<BulletPoint>,
    #[serde(default)]
    pub image_descriptions: Vec<String>,
}

impl Page {
    /// Truncate `raw_text` to at most `max_chars`, never splitting inside a
    /// UTF-8 code point. Used throughout the agent prompts to respect the
    /// per-call input-length budgets in the component design.
    pub fn truncated_text(&self, max_chars: usize) -> &str {
        truncate_chars(&self.raw_text, max_chars)
    }
}

/// Truncate a string to at most `max_chars` *characters* (not bytes),
/// landing on a char boundary.
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &s[..byte_idx],
        None => s,
    }
}

/// A document: an ordered set of pages plus an optional global analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub file_name: String,
    pub file_kind: FileKind,
    /// SHA-256 of the raw source bytes, hex-encoded. Globally unique;
    /// drives content-addressed deduplication on ingest.
    pub content_hash: String,
    pub pages: Vec<Page>,
    pub global_analysis: Option<GlobalAnalysis>,
}

impl Document {
    pub fn total_pages(&self) -> usize {
        self.pages.len()
    }

    pub fn page(&self, page_number: u32) -> Option<&Page> {
        self.pages.iter().find(|p| p.page_number == page_number)
    }
}

/// Compute the content hash used for dedup: SHA-256 of the raw bytes,
/// lower-hex encoded.
pub fn content_hash(raw_bytes: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(raw_bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_is_stable_and_input_sensitive() {
        let a = content_hash(b"hello world");
        let b = content_hash(b"hello world");
        let c = content_hash(b"hello there");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn truncated_text_respects_char_boundaries() {
        let page = Page {
            page_number: 1,
            title: "t".into(),
            raw_text: "héllo wörld".into(),
            bullet_points: vec![],
            image_descriptions: vec![],
        };
        // Should not panic even though non-ASCII chars are multi-byte.
        let truncated = page.truncated_text(3);
        assert_eq!(truncated.chars().count(), 3);
    }

    #[test]
    fn document_looks_up_pages_by_number() {
        let doc = Document {
            id: DocumentId::generate(),
            file_name: "deck.pptx".into(),
            file_kind: FileKind::Deck,
            content_hash: content_hash(b"x"),
            pages: vec![Page {
                page_number: 2,
                title: "second".into(),
                raw_text: "".into(),
                bullet_points: vec![],
                image_descriptions: vec![],
            }],
            global_analysis: None,
        };
        assert!(doc.page(2).is_some());
        assert!(doc.page(1).is_none());
    }
}
