// Consumer Loop Lifecycle

use serde::Serialize;

use super::error::{DomainError, Result};

/// Lifecycle of one consumer loop.
///
/// Forward-only: Connecting -> Declaring -> Subscribed -> Draining -> Stopped.
/// Any state may jump straight to Stopped on a fatal error. Stopped is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoopState {
    Connecting,
    Declaring,
    Subscribed,
    Draining,
    Stopped,
}

impl LoopState {
    pub fn can_transition_to(self, next: LoopState) -> bool {
        use LoopState::*;
        matches!(
            (self, next),
            (Connecting, Declaring)
                | (Declaring, Subscribed)
                | (Subscribed, Draining)
                | (Connecting | Declaring | Subscribed | Draining, Stopped)
        )
    }

    /// Checked transition
    pub fn transition(self, next: LoopState) -> Result<LoopState> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(DomainError::InvalidStateTransition {
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }

    pub fn is_terminal(self) -> bool {
        self == LoopState::Stopped
    }
}

impl std::fmt::Display for LoopState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoopState::Connecting => write!(f, "CONNECTING"),
            LoopState::Declaring => write!(f, "DECLARING"),
            LoopState::Subscribed => write!(f, "SUBSCRIBED"),
            LoopState::Draining => write!(f, "DRAINING"),
            LoopState::Stopped => write!(f, "STOPPED"),
        }
    }
}
