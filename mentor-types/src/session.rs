use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Lifecycle of a remote autopilot session.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Idle,
    Running,
    Paused,
    #[serde(alias = "stopped")]
    Completed,
    /// The remote run crashed; nothing more will happen.
    #[serde(rename = "error")]
    Errored,
}

impl SessionStatus {
    /// Whether polling can still observe progress in this status.
    pub fn is_observable(self) -> bool {
        matches!(self, SessionStatus::Running | SessionStatus::Paused)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Errored)
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    #[default]
    SelectingTopic,
    Teaching,
    Quizzing,
    Analyzing,
    #[serde(other)]
    Other,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicMastery {
    pub topic: String,
    pub score: f64,
    pub attempts: u32,
}

/// One entry of the remote run log.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionStep {
    pub timestamp: String,
    pub action: String,
    pub data: serde_json::Value,
    pub reasoning: String,
    pub duration_ms: Option<u64>,
}

impl SessionStep {
    pub fn label(&self) -> &str {
        step_label(&self.action)
    }
}

/// Human label for a run-log action; unknown actions fall back to their raw name.
pub fn step_label(action: &str) -> &str {
    match action {
        "session_started" => "Session Started",
        "topic_selected" => "Topic Selected",
        "lesson_started" => "Lesson Started",
        "lesson_completed" => "Lesson Complete",
        "quiz_generated" => "Quiz Generated",
        "answer_evaluated" => "Answer Evaluated",
        "misconception_detected" => "Misconception Found",
        "misconception_busted" => "Misconception Fixed",
        "topic_completed" => "Topic Mastered",
        "plan_updated" => "Plan Updated",
        "session_paused" => "Session Paused",
        "session_completed" => "Session Complete",
        "self_correction" => "Self-Correction",
        other => other,
    }
}

/// A blocking question put to the learner.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionQuestion {
    pub id: String,
    pub text: String,
    pub options: Vec<String>,
    pub concept_tested: Option<String>,
}

/// Authoritative session state as reported by the status endpoint.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub status: SessionStatus,
    pub current_phase: SessionPhase,
    pub current_topic: Option<String>,
    pub topics_completed: u32,
    pub elapsed_seconds: u64,
    pub target_duration_minutes: u32,
    pub topic_mastery: BTreeMap<String, TopicMastery>,
    pub steps: Vec<SessionStep>,
    pub current_content: Option<String>,
    pub current_question: Option<SessionQuestion>,
    pub awaiting_input: bool,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
}

impl SessionSnapshot {
    pub fn question_id(&self) -> Option<&str> {
        self.current_question.as_ref().map(|q| q.id.as_str())
    }

    /// Mean mastery score across topics, 0 when nothing has been scored yet.
    pub fn average_mastery(&self) -> f64 {
        if self.topic_mastery.is_empty() {
            return 0.0;
        }
        let total: f64 = self.topic_mastery.values().map(|m| m.score).sum();
        total / self.topic_mastery.len() as f64
    }
}

/// Body of the "begin session" call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StartConfig {
    pub study_plan: serde_json::Value,
    pub exam_type: String,
    pub duration_minutes: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StartAck {
    pub session_id: String,
    pub status: SessionStatus,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub target_duration_minutes: u32,
}

/// Acknowledgement of pause / resume / stop / answer.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionAck {
    pub session_id: Option<String>,
    pub status: Option<SessionStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_tolerates_sparse_payloads() {
        let snap: SessionSnapshot = serde_json::from_str(
            r#"{"session_id":"s1","status":"running","current_phase":"reviewing","steps":[{"action":"session_started"}]}"#,
        )
        .unwrap();
        assert_eq!(snap.status, SessionStatus::Running);
        assert_eq!(snap.current_phase, SessionPhase::Other);
        assert_eq!(snap.steps[0].label(), "Session Started");
        assert!(!snap.awaiting_input);
    }

    #[test]
    fn error_status_is_terminal() {
        let status: SessionStatus = serde_json::from_str(r#""error""#).unwrap();
        assert_eq!(status, SessionStatus::Errored);
        assert!(status.is_terminal());
        assert!(!SessionStatus::Idle.is_observable());
    }

    #[test]
    fn average_mastery_over_topics() {
        let mut snap = SessionSnapshot::default();
        assert_eq!(snap.average_mastery(), 0.0);
        for (topic, score) in [("Genetics", 80.0), ("Ecology", 40.0)] {
            snap.topic_mastery.insert(
                topic.into(),
                TopicMastery {
                    topic: topic.into(),
                    score,
                    attempts: 1,
                },
            );
        }
        assert_eq!(snap.average_mastery(), 60.0);
    }
}
