//! Fetch error taxonomy for the remote tracker.

use thiserror::Error;

/// Errors produced while fetching from the remote tracker.
///
/// `Clone` on purpose: a promise memoizes its terminal failure and hands the
/// same error to every claimant.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// The issue does not exist on the remote. Never retried.
    #[error("issue not found: {key}")]
    NotFound { key: String },

    /// Network or service failure that may succeed on retry.
    #[error("transient tracker error: {0}")]
    Transient(String),

    /// The remote answered with something the client cannot decode, or
    /// rejected the request outright. Never retried.
    #[error("tracker request rejected: {0}")]
    Rejected(String),

    /// A transient failure survived every retry attempt. Fatal: a report
    /// silently missing issues is worse than a failed run.
    #[error("tracker fetch failed after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: usize, last: String },

    /// A fetch task died before producing a result. Fatal.
    #[error("tracker fetch task failed: {0}")]
    Internal(String),
}

impl FetchError {
    /// Whether the retry loop should attempt this fetch again.
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transient(_))
    }
}

/// Convenience result alias.
pub type FetchResult<T> = std::result::Result<T, FetchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transient_errors_are_retryable() {
        assert!(FetchError::Transient("503".into()).is_transient());
        assert!(!FetchError::NotFound { key: "JDK-1".into() }.is_transient());
        assert!(!FetchError::Rejected("bad query".into()).is_transient());
        assert!(!FetchError::RetriesExhausted {
            attempts: 5,
            last: "503".into()
        }
        .is_transient());
        assert!(!FetchError::Internal("join error".into()).is_transient());
    }

    #[test]
    fn test_exhaustion_error_displays_attempt_count() {
        let err = FetchError::RetriesExhausted {
            attempts: 5,
            last: "connection reset".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("5"));
        assert!(msg.contains("connection reset"));
    }
}
