use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use mentor_session::{SessionAction, SessionApi, SessionSupervisor, SupervisorConfig};
use mentor_transport::TransportError;
use mentor_types::{
    ActionAck, SessionPhase, SessionQuestion, SessionSnapshot, SessionStatus, SessionStep, StartAck,
    StartConfig,
};

/// Remote whose status endpoint keeps reporting a running quiz, even after stop.
struct LaggingRemote {
    snapshot: Mutex<SessionSnapshot>,
    status_calls: AtomicUsize,
    stop_calls: AtomicUsize,
}

impl LaggingRemote {
    fn new() -> Self {
        Self {
            snapshot: Mutex::new(SessionSnapshot::default()),
            status_calls: AtomicUsize::new(0),
            stop_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl SessionApi for LaggingRemote {
    async fn start(&self, session_id: &str, config: &StartConfig) -> Result<StartAck, TransportError> {
        let mut snapshot = self.snapshot.lock().unwrap();
        *snapshot = SessionSnapshot {
            session_id: session_id.to_string(),
            status: SessionStatus::Running,
            current_phase: SessionPhase::Quizzing,
            current_topic: Some("Cell Biology".into()),
            target_duration_minutes: config.duration_minutes,
            steps: vec![
                SessionStep {
                    action: "session_started".into(),
                    ..SessionStep::default()
                },
                SessionStep {
                    action: "quiz_generated".into(),
                    ..SessionStep::default()
                },
            ],
            current_question: Some(SessionQuestion {
                id: "q-1".into(),
                text: "Which organelle produces ATP?".into(),
                options: vec!["Nucleus".into(), "Mitochondrion".into(), "Golgi body".into()],
                concept_tested: Some("cell energy".into()),
            }),
            awaiting_input: true,
            ..SessionSnapshot::default()
        };
        Ok(StartAck {
            session_id: session_id.to_string(),
            status: SessionStatus::Running,
            started_at: Some("2026-03-01T09:00:00Z".into()),
            target_duration_minutes: config.duration_minutes,
        })
    }

    async fn status(&self, _session_id: &str) -> Result<SessionSnapshot, TransportError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.snapshot.lock().unwrap().clone())
    }

    async fn control(&self, _session_id: &str, action: SessionAction) -> Result<ActionAck, TransportError> {
        assert_eq!(action, SessionAction::Stop);
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        Ok(ActionAck {
            session_id: None,
            status: Some(SessionStatus::Completed),
        })
    }

    async fn answer(&self, _session_id: &str, _answer_index: usize) -> Result<ActionAck, TransportError> {
        Ok(ActionAck::default())
    }
}

#[tokio::test(start_paused = true)]
async fn stop_during_quiz_keeps_acknowledged_status() {
    let remote = Arc::new(LaggingRemote::new());
    let supervisor = SessionSupervisor::new(
        remote.clone(),
        SupervisorConfig {
            poll_interval: Duration::from_millis(2000),
        },
    );
    let config = StartConfig {
        study_plan: serde_json::json!({"exam_name": "NEET", "total_days": 7}),
        exam_type: "NEET".into(),
        duration_minutes: 5,
    };

    let session_id = supervisor.start(None, config).await.unwrap();
    assert!(session_id.starts_with("autopilot-"));

    tokio::time::sleep(Duration::from_millis(2500)).await;
    let view = supervisor.view();
    let snapshot = view.snapshot.as_ref().unwrap();
    assert_eq!(snapshot.status, SessionStatus::Running);
    assert_eq!(snapshot.current_phase, SessionPhase::Quizzing);
    assert!(snapshot.awaiting_input);
    assert_eq!(snapshot.target_duration_minutes, 5);
    assert_eq!(snapshot.steps[1].label(), "Quiz Generated");
    assert!(supervisor.is_polling());

    supervisor.stop().await.unwrap();
    assert!(!supervisor.is_polling());
    assert_eq!(remote.stop_calls.load(Ordering::SeqCst), 1);

    let calls = remote.status_calls.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(remote.status_calls.load(Ordering::SeqCst), calls);
    let view = supervisor.view();
    assert_eq!(view.status(), SessionStatus::Completed);
    assert!(!view.snapshot.unwrap().awaiting_input);
    assert!(!supervisor.submit_answer(1).await.unwrap());
}
