use thiserror::Error;

use mentor_transport::TransportError;

pub mod diff;
pub use diff::VersionDiff;

pub mod orchestrator;
pub use orchestrator::{coverage_percent, CorrectionOrchestrator, RunOutcome, RunState, RunView};

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("generation stream failed: {0}")]
    Transport(#[from] TransportError),
    #[error("generation stream ended without a final result ({versions_seen} versions seen)")]
    IncompleteStream { versions_seen: usize },
    #[error("generation cancelled")]
    Cancelled,
}
