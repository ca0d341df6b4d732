use thiserror::Error;

use crate::session::SessionState;

/// Track recorder error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrackerError {
    #[error("Session already running")]
    AlreadyRunning,

    #[error("Session not running")]
    NotRunning,

    #[error("Invalid transition: cannot {event} while {state:?}")]
    InvalidTransition {
        event: &'static str,
        state: SessionState,
    },

    /// The monotonic time source went backwards. The live session is force-stopped.
    #[error("Clock regression: {current:.3}s after previous reading {previous:.3}s")]
    ClockRegression { previous: f64, current: f64 },

    #[error("Location provider failed: {0}")]
    Provider(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Engine unavailable: {0}")]
    EngineClosed(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TrackerError {
    /// True for caller misuse that leaves engine state untouched
    pub fn is_transition_error(&self) -> bool {
        matches!(
            self,
            TrackerError::AlreadyRunning
                | TrackerError::NotRunning
                | TrackerError::InvalidTransition { .. }
        )
    }
}

/// Result type for engine operations
pub type TResult<T> = Result<T, TrackerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = TrackerError::InvalidTransition {
            event: "pause",
            state: SessionState::Idle,
        };
        assert_eq!(err.to_string(), "Invalid transition: cannot pause while Idle");

        let err = TrackerError::ClockRegression {
            previous: 12.0,
            current: 11.5,
        };
        assert!(err.to_string().contains("11.500s"));
    }

    #[test]
    fn test_transition_classification() {
        assert!(TrackerError::AlreadyRunning.is_transition_error());
        assert!(TrackerError::NotRunning.is_transition_error());
        assert!(!TrackerError::ClockRegression {
            previous: 1.0,
            current: 0.0
        }
        .is_transition_error());
    }
}
