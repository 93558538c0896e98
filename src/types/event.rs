//! The streaming protocol's unit of progress: `ProgressEvent`.

use serde::{Deserialize, Serialize};

/// Canonical stage tags, in emission order. `Expansion` may repeat after a
/// revision cycle; every other stage fires exactly once per page pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Clustering,
    Understanding,
    Gaps,
    Expansion,
    Retrieval,
    Complete,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Clustering => "clustering",
            Self::Understanding => "understanding",
            Self::Gaps => "gaps",
            Self::Expansion => "expansion",
            Self::Retrieval => "retrieval",
            Self::Complete => "complete",
        }
    }
}

/// One element of the lazy sequence emitted by `analyze_page`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub stage: Stage,
    pub data: serde_json::Value,
    pub message: String,
}

impl ProgressEvent {
    pub fn new(stage: Stage, data: serde_json::Value, message: impl Into<String>) -> Self {
        Self {
            stage,
            data,
            message: message.into(),
        }
    }

    pub fn complete(page_analysis: &crate::types::PageAnalysis) -> Self {
        Self {
            stage: Stage::Complete,
            data: serde_json::to_value(page_analysis).unwrap_or(serde_json::Value::Null),
            message: "analysis complete".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_str_matches_serde_rename() {
        assert_eq!(Stage::Clustering.as_str(), "clustering");
        let json = serde_json::to_string(&Stage::Expansion).unwrap();
        assert_eq!(json, "\"expansion\"");
    }
}
