//! Session status state machine.

use std::fmt;

use crate::error::ReplError;

/// Lifecycle status of a REPL session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionStatus {
    /// Streams attached, evaluator not yet running.
    #[default]
    Init,
    /// Accepting input.
    Open,
    /// Torn down; a new session may reuse the id.
    Closed,
}

impl SessionStatus {
    /// Check if transition to target status is valid.
    ///
    /// Valid transitions:
    /// - Init -> Open
    /// - Init -> Closed
    /// - Open -> Closed
    pub fn can_transition_to(&self, target: SessionStatus) -> bool {
        use SessionStatus::*;
        matches!((*self, target), (Init, Open) | (Init, Closed) | (Open, Closed))
    }

    /// Attempt to transition to a new status.
    pub fn transition_to(&mut self, id: &str, target: SessionStatus) -> crate::Result<()> {
        if self.can_transition_to(target) {
            *self = target;
            Ok(())
        } else {
            Err(ReplError::InvalidStatus {
                id: id.to_string(),
                status: *self,
            })
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, SessionStatus::Open)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Closed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Init => "init",
            SessionStatus::Open => "open",
            SessionStatus::Closed => "closed",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_transitions() {
        let mut status = SessionStatus::Init;
        assert!(status.transition_to("s", SessionStatus::Open).is_ok());
        assert_eq!(status, SessionStatus::Open);
        assert!(status.transition_to("s", SessionStatus::Closed).is_ok());
        assert!(status.is_terminal());
    }

    #[test]
    fn test_invalid_from_closed() {
        let mut status = SessionStatus::Closed;
        let err = status.transition_to("s", SessionStatus::Open).unwrap_err();
        assert!(matches!(
            err,
            ReplError::InvalidStatus {
                status: SessionStatus::Closed,
                ..
            }
        ));
        assert_eq!(status, SessionStatus::Closed);
    }

    #[test]
    fn test_open_cannot_reopen() {
        let mut status = SessionStatus::Open;
        assert!(status.transition_to("s", SessionStatus::Open).is_err());
        assert!(status.transition_to("s", SessionStatus::Init).is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(SessionStatus::Init.to_string(), "init");
        assert_eq!(SessionStatus::Open.to_string(), "open");
        assert_eq!(SessionStatus::default(), SessionStatus::Init);
    }
}
