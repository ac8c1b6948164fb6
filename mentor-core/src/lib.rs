use thiserror::Error;

use mentor_plan::PlanError;
use mentor_session::SessionError;
use mentor_transport::TransportError;

pub mod client;
pub use client::{GeneratedPlan, MentorClient};

pub mod config;
pub use config::{ClientConfig, ConfigError};

pub mod context;
pub use context::SessionContext;

pub mod syllabus;
pub use syllabus::{default_syllabus, with_default_syllabus};

#[derive(Debug, Error)]
pub enum MentorError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Plan(#[from] PlanError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("no study plan in this session; generate one first")]
    NoStudyPlan,
}
