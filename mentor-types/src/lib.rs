pub mod plan;
pub mod session;
pub mod stream;
pub mod tutor;

pub use plan::{DailyPlan, PlanRequest, PlanVersion, StudyPlan, Topic};
pub use session::{
    step_label, ActionAck, SessionPhase, SessionQuestion, SessionSnapshot, SessionStatus,
    SessionStep, StartAck, StartConfig, TopicMastery,
};
pub use stream::{FinalResult, StreamEvent, VerificationResult, VerificationSummary};
pub use tutor::{AnswerSubmission, ExplainRequest, QuizRequest};
