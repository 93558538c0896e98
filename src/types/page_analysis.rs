//! Per-page-pass entities: clusters, gaps, expansions, references, check
//! results, and the `PageAnalysis` that bundles them.

use serde::{Deserialize, Serialize};

/// A page-local bundle pairing a concept with a difficulty score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptCluster {
    pub concept: String,
    pub difficulty: u8,
    pub why_difficult: String,
    #[serde(default)]
    pub related_concepts: Vec<String>,
    #[serde(default)]
    pub global_context: Option<String>,
}

impl ConceptCluster {
    pub const MAX_PER_PAGE: usize = 10;

    /// Coerce an out-of-range difficulty into `[1..=5]`, matching the
    /// PageClusterer's documented coercion rule rather than rejecting the
    /// cluster outright.
    pub fn clamp_difficulty(mut self) -> Self {
        self.difficulty = self.difficulty.clamp(1, 5);
        self
    }

    pub fn is_valid(&self) -> bool {
        !self.concept.trim().is_empty() && (1..=5).contains(&self.difficulty)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GapKind {
    Intuition,
    Example,
    Prerequisite,
    Derivation,
}

impl GapKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Intuition => "intuition",
            Self::Example => "example",
            Self::Prerequisite => "prerequisite",
            Self::Derivation => "derivation",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "intuition" => Some(Self::Intuition),
            "example" => Some(Self::Example),
            "prerequisite" => Some(Self::Prerequisite),
            "derivation" => Some(Self::Derivation),
            _ => None,
        }
    }
}

/// A missing piece of context a learner would need.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeGap {
    pub concept: String,
    pub gap_kind: GapKind,
    pub priority: u8,
}

impl KnowledgeGap {
    pub const MAX_PER_PAGE: usize = 5;

    pub fn clamp_priority(mut self) -> Self {
        self.priority = self.priority.clamp(1, 5);
        self
    }

    pub fn is_valid(&self) -> bool {
        !self.concept.trim().is_empty() && (1..=5).contains(&self.priority)
    }
}

/// A short, gap-specific elaboration, only produced for the top-3
/// highest-priority gaps that meet `expansion.min_gap_priority`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpandedContent {
    pub concept: String,
    pub gap_kind: GapKind,
    /// Bounded to 150 characters; enforced by the Expander, not the type.
    pub body: String,
    #[serde(default)]
    pub sources: Vec<String>,
}

impl ExpandedContent {
    pub const MAX_EXPANSIONS: usize = 3;
    pub const MAX_BODY_CHARS: usize = 150;
}

/// A retrieved reference, from the local vector store or an external
/// source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    pub title: String,
    pub url: String,
    pub source_tag: String,
    pub snippet: String,
}

impl Reference {
    /// A reference is a "placeholder" — dropped during merge — when its
    /// `url` is empty or its body contains a literal "not found" marker.
    pub fn is_placeholder(&self) -> bool {
        self.url.trim().is_empty() || self.snippet.to_lowercase().contains("not found")
    }

    pub fn is_well_formed_url(&self) -> bool {
        url::Url::parse(&self.url).is_ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Pass,
    Revise,
}

/// The consistency checker's verdict for one revision cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub status: CheckStatus,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

impl CheckResult {
    /// Per the data-model invariant: at least one issue when `status =
    /// revise`.
    pub fn is_valid(&self) -> bool {
        match self.status {
            CheckStatus::Pass => true,
            CheckStatus::Revise => !self.issues.is_empty(),
        }
    }

    pub fn pass() -> Self {
        Self {
            status: CheckStatus::Pass,
            issues: vec![],
            suggestions: vec![],
        }
    }

    /// A fail-open result recorded when decoding the checker's response
    /// fails: the revision loop still terminates, but the reason is kept.
    pub fn fail_open(reason: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Pass,
            issues: vec![format!("checker decode failure: {}", reason.into())],
            suggestions: vec![],
        }
    }

    /// Heuristic used by the orchestrator to decide whether a revision
    /// cycle should also re-run the Retriever (open question #2 in the
    /// design notes): true when any issue mentions references/citations.
    pub fn suggests_retrieval_change(&self) -> bool {
        self.issues
            .iter()
            .any(|i| i.to_lowercase().contains("reference") || i.to_lowercase().contains("citation"))
    }
}

/// The full per-page result, as persisted and as replayed on a cache hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageAnalysis {
    pub page_number: u32,
    pub clusters: Vec<ConceptCluster>,
    /// Markdown, bounded to 300 characters.
    pub notes: String,
    pub gaps: Vec<KnowledgeGap>,
    pub expansions: Vec<ExpandedContent>,
    pub references: Vec<Reference>,
    pub check_result: CheckResult,
    /// Markdown, bounded to 300 characters.
    pub final_notes: String,
    pub revision_count: u32,
}

impl PageAnalysis {
    pub const MAX_NOTES_CHARS: usize = 300;

    /// The §8 invariant set, checked together for convenience in tests.
    pub fn check_invariants(&self, max_references: usize, max_revisions: u32) -> Vec<String> {
        let mut violations = Vec::new();
        if self.clusters.len() > ConceptCluster::MAX_PER_PAGE {
            violations.push(format!("too many clusters: {}", self.clusters.len()));
        }
        if self.gaps.len() > KnowledgeGap::MAX_PER_PAGE {
            violations.push(format!("too many gaps: {}", self.gaps.len()));
        }
        if self.expansions.len() > ExpandedContent::MAX_EXPANSIONS {
            violations.push(format!("too many expansions: {}", self.expansions.len()));
        }
        if self.references.len() > max_references {
            violations.push(format!("too many references: {}", self.references.len()));
        }
        if self.references.iter().any(|r| r.url.trim().is_empty()) {
            violations.push("reference with empty url".into());
        }
        if self.revision_count > max_revisions {
            violations.push(format!(
                "revision_count {} exceeds max_revisions {}",
                self.revision_count, max_revisions
            ));
        }
        violations
    }
}
