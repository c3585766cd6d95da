use thiserror::Error;

use super::SessionState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionAction {
    Start,
    Pause,
    Configure,
}

impl std::fmt::Display for SessionAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionAction::Start => f.write_str("start"),
            SessionAction::Pause => f.write_str("pause"),
            SessionAction::Configure => f.write_str("reconfigure"),
        }
    }
}

/// Refused lifecycle request. Never fatal; the session is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("cannot {action} a {} mission: {reason}", .from.as_str())]
    InvalidTransition {
        from: SessionState,
        action: SessionAction,
        reason: &'static str,
    },
}

impl TransitionError {
    pub(crate) fn invalid(from: SessionState, action: SessionAction, reason: &'static str) -> Self {
        TransitionError::InvalidTransition {
            from,
            action,
            reason,
        }
    }
}
