use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Shared error taxonomy for the whole workspace.
///
/// State machines and validation return `Result` instead of panicking;
/// retry policies key off [`Error::is_retryable`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invalid transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("source authentication failed: {0}")]
    SourceAuth(String),

    #[error("source not found: {0}")]
    SourceNotFound(String),

    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("rate limited by source host")]
    RateLimited { retry_after: Option<Duration> },

    #[error("transient dependency failure: {0}")]
    TransientDependency(String),

    #[error("permanent dependency failure: {0}")]
    PermanentDependency(String),

    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("timed out: {0}")]
    Timeout(String),
}

impl Error {
    pub fn validation<S: std::fmt::Display>(msg: S) -> Self {
        Self::Validation(msg.to_string())
    }

    pub fn not_found<S: std::fmt::Display>(msg: S) -> Self {
        Self::NotFound(msg.to_string())
    }

    pub fn conflict<S: std::fmt::Display>(msg: S) -> Self {
        Self::Conflict(msg.to_string())
    }

    pub fn transient<S: std::fmt::Display>(msg: S) -> Self {
        Self::TransientDependency(msg.to_string())
    }

    pub fn permanent<S: std::fmt::Display>(msg: S) -> Self {
        Self::PermanentDependency(msg.to_string())
    }

    pub fn invalid_transition(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::InvalidTransition {
            from: from.into(),
            to: to.into(),
        }
    }

    /// Errors eligible for the exponential-backoff retry policy.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::TransientDependency(_)
                | Error::SourceUnavailable(_)
                | Error::RateLimited { .. }
                | Error::Timeout(_)
        )
    }

    /// Backoff hint from the dependency, when it provided one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Error::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Short machine-readable tag used in diagnostic events.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation",
            Error::InvalidTransition { .. } => "invalid_transition",
            Error::NotFound(_) => "not_found",
            Error::Conflict(_) => "conflict",
            Error::SourceAuth(_) => "source_auth",
            Error::SourceNotFound(_) => "source_not_found",
            Error::SourceUnavailable(_) => "source_unavailable",
            Error::RateLimited { .. } => "rate_limited",
            Error::TransientDependency(_) => "transient_dependency",
            Error::PermanentDependency(_) => "permanent_dependency",
            Error::QuotaExceeded(_) => "quota_exceeded",
            Error::Timeout(_) => "timeout",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(Error::transient("llm 503").is_retryable());
        assert!(Error::SourceUnavailable("down".into()).is_retryable());
        assert!(Error::Timeout("30s elapsed".into()).is_retryable());
        assert!(Error::RateLimited { retry_after: None }.is_retryable());

        assert!(!Error::validation("bad url").is_retryable());
        assert!(!Error::SourceAuth("401".into()).is_retryable());
        assert!(!Error::permanent("bad deployment").is_retryable());
        assert!(!Error::QuotaExceeded("daily budget".into()).is_retryable());
    }

    #[test]
    fn test_retry_after_hint() {
        let err = Error::RateLimited {
            retry_after: Some(Duration::from_secs(7)),
        };
        assert_eq!(err.retry_after(), Some(Duration::from_secs(7)));
        assert_eq!(Error::Timeout("x".into()).retry_after(), None);
    }

    #[test]
    fn test_kind_tags_are_stable() {
        assert_eq!(Error::validation("x").kind(), "validation");
        assert_eq!(
            Error::invalid_transition("ready", "connected").kind(),
            "invalid_transition"
        );
        assert_eq!(Error::QuotaExceeded("x".into()).kind(), "quota_exceeded");
    }
}
