use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_DIFFICULTY: &str = "medium";

/// Explanation request for `/api/tutor/explain` and `/api/tutor/stream`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExplainRequest {
    pub topic: String,
    pub context: String,
    pub difficulty: String,
    /// Earlier turns; only the non-streaming endpoint reads them.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attached_context: Option<String>,
}

impl ExplainRequest {
    pub fn new(topic: impl Into<String>, context: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            context: context.into(),
            difficulty: DEFAULT_DIFFICULTY.into(),
            history: Vec::new(),
            attached_context: None,
        }
    }

    pub fn with_difficulty(mut self, difficulty: impl Into<String>) -> Self {
        self.difficulty = difficulty.into();
        self
    }

    /// Blank text is not sent.
    pub fn with_attached_context(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        self.attached_context = (!text.trim().is_empty()).then_some(text);
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuizRequest {
    pub topic: String,
    pub context: String,
    pub num_questions: u32,
    pub difficulty: String,
}

impl QuizRequest {
    pub fn new(topic: impl Into<String>, context: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            context: context.into(),
            num_questions: 5,
            difficulty: DEFAULT_DIFFICULTY.into(),
        }
    }
}

/// A learner's answer to one question, for grading or misconception analysis.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AnswerSubmission {
    pub question_id: String,
    pub question_text: String,
    pub options: Vec<String>,
    pub correct_option_index: usize,
    pub student_answer_index: usize,
    pub concept_tested: String,
    pub topic_context: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl AnswerSubmission {
    pub fn is_correct(&self) -> bool {
        self.correct_option_index == self.student_answer_index
    }
}
