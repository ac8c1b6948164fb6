use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use mentor_types::{SessionPhase, SessionSnapshot, SessionStatus, StartConfig};

use crate::{new_session_id, SessionAction, SessionApi, SessionError};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);

#[derive(Clone, Debug)]
pub struct SupervisorConfig {
    pub poll_interval: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Read model published to observers.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SessionView {
    pub snapshot: Option<SessionSnapshot>,
    /// Bumped on every applied update.
    pub revision: u64,
    pub answer_in_flight: bool,
    pub average_mastery: f64,
}

impl SessionView {
    pub fn status(&self) -> SessionStatus {
        self.snapshot.as_ref().map(|s| s.status).unwrap_or_default()
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PollOutcome {
    Updated,
    Unchanged,
    /// Local status is idle or terminal; nothing was fetched.
    Skipped,
    Failed,
}

#[derive(Default)]
struct Local {
    snapshot: Option<SessionSnapshot>,
    answer_in_flight: bool,
    revision: u64,
    poller: Option<CancellationToken>,
    stopped: bool,
    /// Every handle is gone; nothing may start polling again.
    detached: bool,
}

struct Shared {
    api: Arc<dyn SessionApi>,
    config: SupervisorConfig,
    local: Mutex<Local>,
    // Serializes polls and the actions that re-poll.
    poll_gate: tokio::sync::Mutex<()>,
    view: watch::Sender<SessionView>,
}

/// Drives one autopilot session: start, control, answer and background polling.
///
/// The remote snapshot is authoritative. Locally the supervisor only seeds a
/// snapshot on start, applies acknowledged statuses, and clears
/// `awaiting_input` after a successful answer.
#[derive(Clone)]
pub struct SessionSupervisor {
    shared: Arc<Shared>,
    _detach: Arc<Detach>,
}

/// Shared by all handles; cancels the poll loop when the last one drops.
struct Detach(Arc<Shared>);

impl Drop for Detach {
    fn drop(&mut self) {
        let mut local = self.0.lock();
        local.detached = true;
        if let Some(token) = local.poller.take() {
            token.cancel();
            debug!("supervisor dropped, poll loop cancelled");
        }
    }
}

impl fmt::Debug for SessionSupervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let local = self.shared.lock();
        f.debug_struct("SessionSupervisor")
            .field("session_id", &local.snapshot.as_ref().map(|s| s.session_id.as_str()))
            .field("polling", &local.poller.is_some())
            .finish()
    }
}

impl SessionSupervisor {
    pub fn new(api: Arc<dyn SessionApi>, config: SupervisorConfig) -> Self {
        let (view, _) = watch::channel(SessionView::default());
        let shared = Arc::new(Shared {
            api,
            config,
            local: Mutex::new(Local::default()),
            poll_gate: tokio::sync::Mutex::new(()),
            view,
        });
        Self {
            _detach: Arc::new(Detach(Arc::clone(&shared))),
            shared,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.shared.view.subscribe()
    }

    pub fn view(&self) -> SessionView {
        self.shared.view.borrow().clone()
    }

    pub fn session_id(&self) -> Option<String> {
        self.shared.lock().snapshot.as_ref().map(|s| s.session_id.clone())
    }

    pub fn is_polling(&self) -> bool {
        self.shared.lock().poller.is_some()
    }

    /// Begin a remote session and start polling it. Generates an id when none is given.
    pub async fn start(&self, session_id: Option<String>, config: StartConfig) -> Result<String, SessionError> {
        {
            let local = self.shared.lock();
            if let Some(current) = &local.snapshot {
                if !local.stopped && current.status.is_observable() {
                    return Err(SessionError::AlreadyActive {
                        session_id: current.session_id.clone(),
                    });
                }
            }
        }

        let requested = session_id.unwrap_or_else(new_session_id);
        let ack = self
            .shared
            .api
            .start(&requested, &config)
            .await
            .map_err(|source| {
                warn!(session_id = %requested, error = %source, "autopilot start failed");
                SessionError::StartFailed { source }
            })?;

        let session_id = if ack.session_id.is_empty() {
            requested
        } else {
            ack.session_id
        };
        let status = match ack.status {
            SessionStatus::Idle => SessionStatus::Running,
            other => other,
        };
        info!(session_id = %session_id, duration_minutes = config.duration_minutes, "autopilot started");

        {
            let mut local = self.shared.lock();
            local.snapshot = Some(SessionSnapshot {
                session_id: session_id.clone(),
                status,
                current_phase: SessionPhase::SelectingTopic,
                target_duration_minutes: if ack.target_duration_minutes == 0 {
                    config.duration_minutes
                } else {
                    ack.target_duration_minutes
                },
                started_at: ack.started_at,
                ..SessionSnapshot::default()
            });
            local.answer_in_flight = false;
            local.stopped = false;
            local.revision += 1;
            self.shared.publish(&local);
        }

        self.shared.reschedule();
        self.shared.poll().await;
        Ok(session_id)
    }

    /// Fetch the remote snapshot once. Waits for an outstanding poll.
    pub async fn poll(&self) -> PollOutcome {
        self.shared.poll().await
    }

    pub async fn pause(&self) -> Result<(), SessionError> {
        self.control(SessionAction::Pause).await
    }

    pub async fn resume(&self) -> Result<(), SessionError> {
        self.control(SessionAction::Resume).await
    }

    /// Stop the session and its poll loop. The acknowledged status is final.
    pub async fn stop(&self) -> Result<(), SessionError> {
        self.control(SessionAction::Stop).await
    }

    async fn control(&self, action: SessionAction) -> Result<(), SessionError> {
        let session_id = self.session_id().ok_or(SessionError::NotStarted)?;
        let _gate = self.shared.poll_gate.lock().await;

        let ack = self
            .shared
            .api
            .control(&session_id, action)
            .await
            .map_err(|source| {
                warn!(session_id = %session_id, %action, error = %source, "session action rejected");
                SessionError::SessionActionRejected { action, source }
            })?;

        {
            let mut local = self.shared.lock();
            if let Some(status) = ack.status.or_else(|| action.expected_status()) {
                if let Some(snapshot) = local.snapshot.as_mut() {
                    snapshot.status = status;
                    if status != SessionStatus::Running {
                        snapshot.awaiting_input = false;
                    }
                }
            }
            if action == SessionAction::Stop {
                local.stopped = true;
            }
            local.revision += 1;
            self.shared.publish(&local);
        }
        info!(session_id = %session_id, %action, "session action applied");

        self.shared.reschedule();
        self.shared.poll_locked().await;
        Ok(())
    }

    /// Answer the pending question.
    ///
    /// Returns `Ok(false)` without calling out when no input is awaited or an
    /// answer is already in flight.
    pub async fn submit_answer(&self, choice_index: usize) -> Result<bool, SessionError> {
        let session_id = {
            let mut local = self.shared.lock();
            let (session_id, awaiting) = match &local.snapshot {
                Some(s) => (s.session_id.clone(), s.awaiting_input),
                None => return Err(SessionError::NotStarted),
            };
            if !awaiting || local.answer_in_flight {
                debug!(session_id = %session_id, "answer ignored");
                return Ok(false);
            }
            local.answer_in_flight = true;
            self.shared.publish(&local);
            session_id
        };

        let result = self.shared.api.answer(&session_id, choice_index).await;

        let _gate = self.shared.poll_gate.lock().await;
        {
            let mut local = self.shared.lock();
            local.answer_in_flight = false;
            if result.is_ok() {
                if let Some(snapshot) = local.snapshot.as_mut() {
                    snapshot.awaiting_input = false;
                }
                local.revision += 1;
            }
            self.shared.publish(&local);
        }

        if let Err(source) = result {
            warn!(session_id = %session_id, error = %source, "answer rejected");
            return Err(SessionError::SessionActionRejected {
                action: SessionAction::Answer,
                source,
            });
        }
        debug!(session_id = %session_id, choice_index, "answer submitted");

        self.shared.poll_locked().await;
        Ok(true)
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Local> {
        self.local.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, local: &Local) {
        let average_mastery = local
            .snapshot
            .as_ref()
            .map(SessionSnapshot::average_mastery)
            .unwrap_or_default();
        self.view.send_replace(SessionView {
            snapshot: local.snapshot.clone(),
            revision: local.revision,
            answer_in_flight: local.answer_in_flight,
            average_mastery,
        });
    }

    async fn poll(self: &Arc<Self>) -> PollOutcome {
        let _gate = self.poll_gate.lock().await;
        self.poll_locked().await
    }

    /// Caller holds `poll_gate`.
    async fn poll_locked(self: &Arc<Self>) -> PollOutcome {
        let session_id = {
            let local = self.lock();
            match &local.snapshot {
                Some(s) if s.status.is_observable() => s.session_id.clone(),
                _ => return PollOutcome::Skipped,
            }
        };

        let fetched = match self.api.status(&session_id).await {
            Ok(snapshot) => normalize(snapshot),
            Err(err) => {
                warn!(session_id = %session_id, error = %err, "status poll failed");
                return PollOutcome::Failed;
            }
        };

        let outcome = {
            let mut local = self.lock();
            // Status may have moved on while the request was out.
            let changed = match &local.snapshot {
                Some(current) if current.session_id == session_id && current.status.is_observable() => {
                    Some(significant_change(current, &fetched))
                }
                _ => None,
            };
            match changed {
                Some(true) => {
                    local.snapshot = Some(fetched);
                    local.revision += 1;
                    self.publish(&local);
                    PollOutcome::Updated
                }
                Some(false) => PollOutcome::Unchanged,
                None => PollOutcome::Skipped,
            }
        };

        if outcome == PollOutcome::Updated {
            self.reschedule();
        }
        outcome
    }

    /// Start the poll loop while running, cancel it otherwise.
    fn reschedule(self: &Arc<Self>) {
        let mut local = self.lock();
        let running = !local.stopped
            && !local.detached
            && local
                .snapshot
                .as_ref()
                .map_or(false, |s| s.status == SessionStatus::Running);

        if running && local.poller.is_none() {
            let token = CancellationToken::new();
            local.poller = Some(token.clone());
            debug!(interval_ms = self.config.poll_interval.as_millis() as u64, "poll loop started");
            tokio::spawn(poll_loop(Arc::clone(self), token));
        } else if !running {
            if let Some(token) = local.poller.take() {
                token.cancel();
                debug!("poll loop cancelled");
            }
        }
    }
}

async fn poll_loop(shared: Arc<Shared>, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(shared.config.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let Ok(_gate) = shared.poll_gate.try_lock() else {
            debug!("poll outstanding, skipping tick");
            continue;
        };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            outcome = shared.poll_locked() => debug!(?outcome, "poll tick"),
        }
    }
}

/// Input can only be awaited while running a quiz.
fn normalize(mut snapshot: SessionSnapshot) -> SessionSnapshot {
    if snapshot.status != SessionStatus::Running || snapshot.current_phase != SessionPhase::Quizzing {
        snapshot.awaiting_input = false;
    }
    snapshot
}

/// Whether a fetched snapshot is worth replacing the local one.
fn significant_change(current: &SessionSnapshot, fetched: &SessionSnapshot) -> bool {
    current.question_id() != fetched.question_id()
        || current.steps.len() != fetched.steps.len()
        || current.current_content != fetched.current_content
        || current.awaiting_input != fetched.awaiting_input
        || current.status != fetched.status
}
