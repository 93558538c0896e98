//! Unified error type system.
//!
//! One enum for the whole crate, one variant family per taxonomy kind from
//! the error handling design: transient upstream, decode failure, source
//! unavailable, invariant violation, cancellation, fatal storage. Agents
//! never propagate decode failures or invariant violations — they degrade —
//! so those two kinds mostly surface as logged warnings rather than
//! [`PipelineError`] values, but the variants exist for the call sites that
//! do need to hand one to a caller (e.g. recording the reason a degradation
//! happened).

use std::time::Duration;
use thiserror::Error;

/// Broad routing category for an error, independent of its exact variant.
///
/// Agents and the gateway ask `category()` rather than matching on
/// [`PipelineError`] variants directly, so new variants can be added inside
/// an existing category without touching call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Recoverable network/timeout/rate-limit failure from an upstream call.
    Transient,
    /// LLM output didn't match the declared JSON shape.
    DecodeFailure,
    /// An external retrieval source is unreachable or failed mid-search.
    SourceUnavailable,
    /// An agent's output violates a data-model invariant.
    InvariantViolation,
    /// Caller-requested cancellation.
    Cancellation,
    /// Persistence write failed in a way that cannot be retried.
    FatalStorage,
}

impl ErrorCategory {
    /// Whether the gateway should retry the call that produced this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Transient)
    }

    /// Whether the calling agent should degrade rather than propagate.
    pub fn should_degrade(&self) -> bool {
        matches!(self, Self::DecodeFailure | Self::InvariantViolation)
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Transient => "TRANSIENT",
            Self::DecodeFailure => "DECODE_FAILURE",
            Self::SourceUnavailable => "SOURCE_UNAVAILABLE",
            Self::InvariantViolation => "INVARIANT_VIOLATION",
            Self::Cancellation => "CANCELLATION",
            Self::FatalStorage => "FATAL_STORAGE",
        };
        write!(f, "{s}")
    }
}

/// Crate-wide error type.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("upstream error calling {endpoint}: {message}")]
    Upstream {
        endpoint: String,
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("operation timed out after {duration:?}: {operation}")]
    Timeout { operation: String, duration: Duration },

    #[error("decode failure: {reason}")]
    Decode { raw_text: String, reason: String },

    #[error("retrieval source '{source}' unavailable: {reason}")]
    SourceUnavailable { source: String, reason: String },

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("cancelled: {0}")]
    Cancelled(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

impl PipelineError {
    pub fn upstream(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Upstream {
            endpoint: endpoint.into(),
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn upstream_with_retry(
        endpoint: impl Into<String>,
        message: impl Into<String>,
        retry_after: Duration,
    ) -> Self {
        Self::Upstream {
            endpoint: endpoint.into(),
            message: message.into(),
            retry_after: Some(retry_after),
        }
    }

    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    pub fn decode(raw_text: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Decode {
            raw_text: raw_text.into(),
            reason: reason.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Upstream { .. } | Self::Timeout { .. } | Self::Http(_) => {
                ErrorCategory::Transient
            }
            Self::Decode { .. } | Self::Json(_) => ErrorCategory::DecodeFailure,
            Self::SourceUnavailable { .. } => ErrorCategory::SourceUnavailable,
            Self::InvariantViolation(_) => ErrorCategory::InvariantViolation,
            Self::Cancelled(_) => ErrorCategory::Cancellation,
            Self::Storage(_) | Self::Pool(_) | Self::Io(_) | Self::Config(_) => {
                ErrorCategory::FatalStorage
            }
        }
    }

    pub fn is_recoverable(&self) -> bool {
        self.category().is_recoverable()
    }

    pub fn should_degrade(&self) -> bool {
        self.category().should_degrade()
    }
}

/// Classifies raw transport/status errors into [`PipelineError`] variants.
///
/// Mirrors the gateway's need to decide "retry or give up" from a plain
/// string or HTTP status without re-deriving the taxonomy at each call
/// site.
pub struct ErrorClassifier;

impl ErrorClassifier {
    /// Classify a raw error message from an HTTP call.
    pub fn classify(endpoint: &str, message: &str) -> PipelineError {
        let lower = message.to_lowercase();

        if lower.contains("rate limit") || lower.contains("429") || lower.contains("too many requests")
        {
            return PipelineError::upstream_with_retry(endpoint, message, Duration::from_secs(30));
        }
        if lower.contains("timeout") || lower.contains("timed out") {
            return PipelineError::timeout(endpoint, Duration::from_secs(60));
        }
        if lower.contains("connection")
            || lower.contains("network")
            || lower.contains("dns")
            || lower.contains("unreachable")
        {
            return PipelineError::upstream_with_retry(endpoint, message, Duration::from_secs(5));
        }
        if lower.contains("502") || lower.contains("503") || lower.contains("504") || lower.contains("server error")
        {
            return PipelineError::upstream_with_retry(endpoint, message, Duration::from_secs(5));
        }

        // Anything else (4xx other than 429, malformed request, auth failure)
        // is treated as non-transient: retrying would not help.
        PipelineError::upstream(endpoint, message)
    }

    /// Classify by HTTP status code directly, more reliable than string
    /// matching when the code is known.
    pub fn classify_http_status(endpoint: &str, status: u16, message: &str) -> PipelineError {
        match status {
            429 => PipelineError::upstream_with_retry(endpoint, message, Duration::from_secs(30)),
            500 | 502 | 503 | 504 => {
                PipelineError::upstream_with_retry(endpoint, message, Duration::from_secs(5))
            }
            _ => PipelineError::upstream(endpoint, message),
        }
    }

    /// Whether a raw error message describes a transient condition and thus
    /// merits a gateway retry.
    pub fn is_transient(endpoint: &str, message: &str) -> bool {
        Self::classify(endpoint, message).is_recoverable()
    }
}

/// Context-attachment helper, mirroring the ergonomics of `anyhow::Context`
/// but returning the crate's own error type.
pub trait ResultExt<T> {
    fn with_context<C: Into<String>>(self, context: C) -> Result<T>;
}

impl<T, E: std::error::Error> ResultExt<T> for std::result::Result<T, E> {
    fn with_context<C: Into<String>>(self, context: C) -> Result<T> {
        self.map_err(|e| PipelineError::Config(format!("{}: {}", context.into(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_rate_limit_is_transient_with_backoff() {
        let err = ErrorClassifier::classify("llm", "429 Too Many Requests");
        assert!(err.is_recoverable());
        assert_eq!(err.category(), ErrorCategory::Transient);
    }

    #[test]
    fn classify_auth_failure_is_not_transient() {
        let err = ErrorClassifier::classify("llm", "401 invalid api key");
        assert!(!err.is_recoverable());
    }

    #[test]
    fn decode_failure_should_degrade() {
        let err = PipelineError::decode("not json", "no balanced object found");
        assert!(err.should_degrade());
        assert!(!err.is_recoverable());
    }

    #[test]
    fn invariant_violation_should_degrade() {
        let err = PipelineError::InvariantViolation("main_topic empty".into());
        assert!(err.should_degrade());
    }

    #[test]
    fn cancellation_is_its_own_category() {
        let err = PipelineError::Cancelled("user requested stop".into());
        assert_eq!(err.category(), ErrorCategory::Cancellation);
        assert!(!err.is_recoverable());
        assert!(!err.should_degrade());
    }

    #[test]
    fn http_status_classification_matches_string_classification() {
        let by_status = ErrorClassifier::classify_http_status("llm", 503, "service unavailable");
        assert!(by_status.is_recoverable());
    }
}
