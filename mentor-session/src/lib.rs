use std::fmt;

use thiserror::Error;
use uuid::Uuid;

use mentor_transport::TransportError;
use mentor_types::SessionStatus;

pub mod api;
pub use api::{HttpSessionApi, SessionApi};

pub mod supervisor;
pub use supervisor::{PollOutcome, SessionSupervisor, SessionView, SupervisorConfig};

/// A learner-initiated action against a running session.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum SessionAction {
    Pause,
    Resume,
    Stop,
    Answer,
}

impl SessionAction {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionAction::Pause => "pause",
            SessionAction::Resume => "resume",
            SessionAction::Stop => "stop",
            SessionAction::Answer => "answer",
        }
    }

    /// Local status to assume when the acknowledgement carries none.
    pub fn expected_status(self) -> Option<SessionStatus> {
        match self {
            SessionAction::Pause => Some(SessionStatus::Paused),
            SessionAction::Resume => Some(SessionStatus::Running),
            SessionAction::Stop => Some(SessionStatus::Completed),
            SessionAction::Answer => None,
        }
    }
}

impl fmt::Display for SessionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("autopilot failed to start: {source}")]
    StartFailed { source: TransportError },
    #[error("autopilot {action} rejected: {source}")]
    SessionActionRejected {
        action: SessionAction,
        source: TransportError,
    },
    #[error("no autopilot session has been started")]
    NotStarted,
    #[error("autopilot session {session_id} is still active")]
    AlreadyActive { session_id: String },
}

/// Fresh client-side session id.
pub fn new_session_id() -> String {
    format!("autopilot-{}", Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_ids_are_prefixed_and_unique() {
        let a = new_session_id();
        let b = new_session_id();
        assert!(a.starts_with("autopilot-"));
        assert_eq!(a.len(), "autopilot-".len() + 32);
        assert_ne!(a, b);
    }
}
