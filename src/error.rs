//! Error types for repl-tunnel.

use thiserror::Error;

use crate::session::SessionStatus;

/// Main error type for repl-tunnel operations.
#[derive(Error, Debug)]
pub enum ReplError {
    /// No session is registered under the given id.
    #[error("unknown session: {0}")]
    UnknownSession(String),

    /// The session exists but cannot accept submissions.
    #[error("invalid status for session {id}: {status}")]
    InvalidStatus { id: String, status: SessionStatus },

    /// The session's transport closed while a response was pending.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// A submission is already outstanding on this session.
    #[error("submission already pending on session {0}")]
    SubmissionPending(String),

    /// A command registration was rejected.
    #[error("invalid-cmd: {0}")]
    InvalidCommand(String),

    /// A built-in command received argument text of the wrong shape.
    #[error("ERROR: expected {0}")]
    CommandArgument(String),

    /// Script fallback evaluation failed.
    #[error("{0}")]
    Evaluation(String),

    /// A listening transport could not bind its address.
    #[error("failed to bind {address}: {source}")]
    TransportBind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// The host rejected a message or persistence operation.
    #[error("host error: {0}")]
    Host(#[from] crate::host::HostError),

    /// Structured text could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),

    /// One or more sessions failed to tear down cleanly.
    #[error("teardown failed for {} session(s): {}", .0.len(), .0.join("; "))]
    Teardown(Vec<String>),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal lock was poisoned.
    #[error("internal lock poisoned")]
    LockPoisoned,
}

/// Convenience Result type for repl-tunnel operations.
pub type Result<T> = std::result::Result<T, ReplError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_session_display() {
        let err = ReplError::UnknownSession("nonexistent".into());
        assert!(err.to_string().contains("nonexistent"));
        assert!(err.to_string().contains("unknown session"));
    }

    #[test]
    fn test_invalid_status_display() {
        let err = ReplError::InvalidStatus {
            id: "web".into(),
            status: SessionStatus::Closed,
        };
        assert_eq!(err.to_string(), "invalid status for session web: closed");
    }

    #[test]
    fn test_command_argument_display() {
        let err = ReplError::CommandArgument("set <path> <value>".into());
        assert_eq!(err.to_string(), "ERROR: expected set <path> <value>");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use");
        let err: ReplError = io_err.into();
        assert!(matches!(err, ReplError::Io(_)));
        assert!(err.to_string().contains("I/O error"));
    }

    #[test]
    fn test_teardown_display() {
        let err = ReplError::Teardown(vec!["a: boom".into(), "b: bang".into()]);
        let text = err.to_string();
        assert!(text.contains("2 session(s)"));
        assert!(text.contains("a: boom; b: bang"));
    }
}
