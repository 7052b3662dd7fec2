//! Error kinds for the pipeline.
//!
//! Only [`ConfigError`] is fatal to a run. The per-call errors are contained
//! inside the category that raised them and classified so the retry policy
//! can tell transient transport failures from permanent ones.

use super::parser::ValidationError;
use std::fmt;
use std::path::PathBuf;

/// Malformed registry or run configuration. Aborts before any category runs.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse error in {origin}: {message}")]
    Parse { origin: String, message: String },

    #[error("{} validation error(s): {}", .0.len(), join_errors(.0))]
    Invalid(Vec<ValidationError>),

    #[error("missing required setting: {0}")]
    Missing(&'static str),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors a retry policy can classify.
pub trait Transient {
    /// True for failures worth one more attempt (network, throttling, 5xx).
    fn is_transient(&self) -> bool;
}

// ============================================================================
// Inventory
// ============================================================================

/// Inventory failure class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// Credentials missing or rejected
    Auth,
    /// The service rejected the query text
    MalformedQuery,
    /// Network, timeout, or throttling
    Transient,
    /// The inventory tool is missing, or failed in an unrecognized way
    Unavailable,
    /// Output could not be decoded
    InvalidResponse,
}

impl fmt::Display for QueryErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auth => write!(f, "auth"),
            Self::MalformedQuery => write!(f, "malformed_query"),
            Self::Transient => write!(f, "transient"),
            Self::Unavailable => write!(f, "unavailable"),
            Self::InvalidResponse => write!(f, "invalid_response"),
        }
    }
}

/// Inventory retrieval failed for one category.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("query failed ({kind}): {reason}")]
pub struct QueryError {
    pub kind: QueryErrorKind,
    pub reason: String,
}

impl QueryError {
    pub fn new(kind: QueryErrorKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
        }
    }
}

impl Transient for QueryError {
    fn is_transient(&self) -> bool {
        self.kind == QueryErrorKind::Transient
    }
}

// ============================================================================
// Narrative generation
// ============================================================================

/// Generation failure class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationErrorKind {
    Auth,
    RateLimited,
    Server,
    Network,
    InvalidRequest,
    /// The model refused the prompt
    Blocked,
    /// A response with no text
    Empty,
    InvalidResponse,
}

impl fmt::Display for GenerationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auth => write!(f, "auth"),
            Self::RateLimited => write!(f, "rate_limited"),
            Self::Server => write!(f, "server"),
            Self::Network => write!(f, "network"),
            Self::InvalidRequest => write!(f, "invalid_request"),
            Self::Blocked => write!(f, "blocked"),
            Self::Empty => write!(f, "empty"),
            Self::InvalidResponse => write!(f, "invalid_response"),
        }
    }
}

/// Narrative generation failed for one category.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("generation failed ({kind}): {reason}")]
pub struct GenerationError {
    pub kind: GenerationErrorKind,
    pub reason: String,
}

impl GenerationError {
    pub fn new(kind: GenerationErrorKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
        }
    }

    /// Classify an HTTP error status.
    pub fn from_status(status: u16, body: String) -> Self {
        let kind = match status {
            401 | 403 => GenerationErrorKind::Auth,
            429 => GenerationErrorKind::RateLimited,
            400 | 404 | 413 | 422 => GenerationErrorKind::InvalidRequest,
            s if s >= 500 => GenerationErrorKind::Server,
            _ => GenerationErrorKind::InvalidResponse,
        };
        Self::new(kind, format!("HTTP {status}: {body}"))
    }
}

impl Transient for GenerationError {
    fn is_transient(&self) -> bool {
        matches!(
            self.kind,
            GenerationErrorKind::RateLimited
                | GenerationErrorKind::Server
                | GenerationErrorKind::Network
        )
    }
}

// ============================================================================
// Document conversion
// ============================================================================

/// Optional document conversion failed. The Markdown report is unaffected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConversionError {
    #[error("converter unavailable: {0}")]
    Unavailable(String),

    #[error("converter exited with code {code}: {stderr}")]
    Failed { code: i32, stderr: String },

    #[error("conversion I/O error: {0}")]
    Io(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_error_transient() {
        assert!(QueryError::new(QueryErrorKind::Transient, "timeout").is_transient());
        assert!(!QueryError::new(QueryErrorKind::Auth, "login").is_transient());
        assert!(!QueryError::new(QueryErrorKind::MalformedQuery, "bad kql").is_transient());
    }

    #[test]
    fn test_generation_error_from_status() {
        assert_eq!(
            GenerationError::from_status(401, "no".into()).kind,
            GenerationErrorKind::Auth
        );
        assert_eq!(
            GenerationError::from_status(429, "slow".into()).kind,
            GenerationErrorKind::RateLimited
        );
        assert_eq!(
            GenerationError::from_status(503, "busy".into()).kind,
            GenerationErrorKind::Server
        );
        assert_eq!(
            GenerationError::from_status(400, "bad".into()).kind,
            GenerationErrorKind::InvalidRequest
        );
    }

    #[test]
    fn test_generation_error_transient() {
        assert!(GenerationError::from_status(429, String::new()).is_transient());
        assert!(GenerationError::from_status(500, String::new()).is_transient());
        assert!(!GenerationError::from_status(403, String::new()).is_transient());
        assert!(!GenerationError::new(GenerationErrorKind::Blocked, "SAFETY").is_transient());
    }

    #[test]
    fn test_config_error_invalid_lists_all() {
        let err = ConfigError::Invalid(vec![
            ValidationError {
                message: "duplicate category 'A'".into(),
            },
            ValidationError {
                message: "category 'B' has no query".into(),
            },
        ]);
        let msg = err.to_string();
        assert!(msg.starts_with("2 validation error(s)"));
        assert!(msg.contains("duplicate category 'A'"));
        assert!(msg.contains("has no query"));
    }

    #[test]
    fn test_error_display() {
        let e = QueryError::new(QueryErrorKind::Auth, "run az login");
        assert_eq!(e.to_string(), "query failed (auth): run az login");
        let c = ConversionError::Failed {
            code: 2,
            stderr: "bad input".into(),
        };
        assert_eq!(c.to_string(), "converter exited with code 2: bad input");
    }
}
