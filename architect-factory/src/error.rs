//! Error taxonomy shared by every component of the factory.

use std::time::Duration;

/// Errors raised by the clients, the agents and the orchestration engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed constructor or call arguments. Raised before any network call.
    #[error("invalid input: {0}")]
    Validation(String),

    /// The text-generation backend failed or returned an unusable envelope.
    #[error("completion failed: {0}")]
    Completion(String),

    /// The remote record store or the local fallback store failed.
    #[error("database operation failed: {0}")]
    Store(String),

    /// Structured output from an agent did not parse.
    #[error("malformed {role} output: {message}")]
    Parse { role: &'static str, message: String },

    /// The cycle was cancelled through its shutdown token.
    #[error("cancelled")]
    Cancelled,

    /// The cycle exceeded its configured time budget.
    #[error("cycle exceeded {0:?}")]
    Timeout(Duration),
}

impl Error {
    /// True if the error came from a cancellation rather than a real failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_backend_message() {
        let e = Error::Store("timeout".to_string());
        assert_eq!(e.to_string(), "database operation failed: timeout");

        let e = Error::Parse {
            role: "scout",
            message: "expected value at line 1 column 1".to_string(),
        };
        assert_eq!(
            e.to_string(),
            "malformed scout output: expected value at line 1 column 1"
        );
    }

    #[test]
    fn only_cancelled_reports_cancelled() {
        assert!(Error::Cancelled.is_cancelled());
        assert!(!Error::Completion("boom".into()).is_cancelled());
        assert!(!Error::Timeout(Duration::from_secs(1)).is_cancelled());
    }
}
