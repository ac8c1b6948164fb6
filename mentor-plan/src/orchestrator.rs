use futures_util::StreamExt;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use mentor_stream::EventStream;
use mentor_types::{FinalResult, PlanVersion, StreamEvent, StudyPlan, VerificationSummary};

use crate::{PlanError, VersionDiff};

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum RunState {
    #[default]
    NoVersions,
    Drafting,
    Verifying,
    Fixing,
    /// Provisional after a passing verification, final after `complete`.
    Complete,
    Failed,
}

/// Snapshot published to observers after every applied event.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RunView {
    pub state: RunState,
    pub label: String,
    pub versions: Vec<PlanVersion>,
    pub summary: Option<VerificationSummary>,
    pub finished: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RunOutcome {
    pub final_plan: StudyPlan,
    pub versions: Vec<PlanVersion>,
    pub summary: VerificationSummary,
    pub self_correction_applied: bool,
}

/// Share of covered topics, rounded to a whole percent. 100 when there is nothing to cover.
pub fn coverage_percent(covered: usize, missing: usize) -> u32 {
    let total = covered + missing;
    if total == 0 {
        return 100;
    }
    (covered as f64 * 100.0 / total as f64).round() as u32
}

/// Tracks one draft → verify → fix run.
///
/// Versions are append-only and numbered from 1 without gaps. Events that
/// would break that (duplicate or skipped drafts, verification for anything
/// but the newest unverified version) are ignored. Only `complete` marks a
/// version accepted.
pub struct CorrectionOrchestrator {
    state: RunState,
    label: String,
    versions: Vec<PlanVersion>,
    iterations: u32,
    self_correction_applied: bool,
    final_plan: Option<StudyPlan>,
    view: watch::Sender<RunView>,
}

impl Default for CorrectionOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl CorrectionOrchestrator {
    pub fn new() -> Self {
        let (view, _) = watch::channel(RunView::default());
        Self {
            state: RunState::NoVersions,
            label: String::new(),
            versions: Vec::new(),
            iterations: 0,
            self_correction_applied: false,
            final_plan: None,
            view,
        }
    }

    /// A finished run built from a one-shot `final_result` payload.
    pub fn from_final_result(result: FinalResult) -> Self {
        let mut orchestrator = Self::new();
        orchestrator.apply(StreamEvent::Complete {
            final_result: result,
        });
        orchestrator
    }

    pub fn subscribe(&self) -> watch::Receiver<RunView> {
        self.view.subscribe()
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn versions(&self) -> &[PlanVersion] {
        &self.versions
    }

    pub fn is_finished(&self) -> bool {
        self.final_plan.is_some()
    }

    pub fn accepted(&self) -> Option<&PlanVersion> {
        self.versions.iter().find(|v| v.accepted)
    }

    pub fn diff(&self, from: u32, to: u32) -> Option<VersionDiff> {
        let a = self.versions.iter().find(|v| v.version == from)?;
        let b = self.versions.iter().find(|v| v.version == to)?;
        Some(VersionDiff::between(a, b))
    }

    /// Mark the request as sent.
    pub fn begin(&mut self) {
        if self.state == RunState::NoVersions {
            self.state = RunState::Drafting;
            self.publish();
        }
    }

    /// Apply one event. Returns whether it changed anything.
    pub fn apply(&mut self, event: StreamEvent) -> bool {
        if self.is_finished() {
            debug!("ignoring event after completion");
            return false;
        }

        let applied = match event {
            StreamEvent::Status { message } => {
                self.label = message;
                true
            }
            StreamEvent::Draft { version, plan } => self.on_draft(version, plan),
            StreamEvent::Verification { version, result } => {
                match self.versions.last_mut() {
                    Some(last) if last.version == version && last.verification.is_none() => {
                        self.state = if result.is_valid {
                            RunState::Complete
                        } else {
                            RunState::Fixing
                        };
                        debug!(version, is_valid = result.is_valid, "verification attached");
                        last.verification = Some(result);
                        true
                    }
                    _ => {
                        debug!(version, "ignoring verification for unknown or verified version");
                        false
                    }
                }
            }
            StreamEvent::Complete { final_result } => {
                self.on_complete(final_result);
                true
            }
        };

        if applied {
            self.publish();
        }
        applied
    }

    fn on_draft(&mut self, version: u32, plan: StudyPlan) -> bool {
        if self.versions.iter().any(|v| v.version == version) {
            debug!(version, "duplicate draft");
            return false;
        }
        let expected = self.versions.len() as u32 + 1;
        if version != expected {
            debug!(version, expected, "out of order draft");
            return false;
        }
        if version > 1 {
            self.self_correction_applied = true;
        }
        self.versions.push(PlanVersion::draft(version, plan));
        self.state = RunState::Verifying;
        true
    }

    fn on_complete(&mut self, result: FinalResult) {
        let FinalResult {
            final_plan,
            mut versions,
            total_iterations,
            self_correction_applied,
            ..
        } = result;

        if !versions.is_empty() {
            versions.sort_by_key(|v| v.version);
            self.versions = versions;
        }

        // Remote flag first, then whichever version carries the final plan.
        let chosen = self
            .versions
            .iter()
            .rposition(|v| v.accepted)
            .or_else(|| self.versions.iter().rposition(|v| v.plan == final_plan))
            .or_else(|| {
                self.versions
                    .iter()
                    .position(|v| total_iterations > 0 && v.version == total_iterations)
            })
            .or_else(|| self.versions.len().checked_sub(1));

        match chosen {
            Some(idx) => {
                for (i, v) in self.versions.iter_mut().enumerate() {
                    v.accepted = i == idx;
                }
            }
            None => {
                let mut only = PlanVersion::draft(1, final_plan.clone());
                only.accepted = true;
                self.versions.push(only);
            }
        }

        self.iterations = if total_iterations > 0 {
            total_iterations
        } else {
            self.versions.len() as u32
        };
        self.self_correction_applied |= self_correction_applied || self.versions.len() > 1;
        self.final_plan = Some(final_plan);
        self.state = RunState::Complete;
        info!(
            versions = self.versions.len(),
            iterations = self.iterations,
            "generation complete"
        );
    }

    /// Read model summary of the accepted version, once there is one.
    pub fn summary(&self) -> Option<VerificationSummary> {
        let accepted = self.accepted()?;
        let verification = accepted.verification.as_ref();

        if accepted.version == 1 && verification.map_or(true, |v| v.is_valid) {
            return Some(VerificationSummary {
                coverage_percent: 100,
                overloaded_days_count: 0,
                prerequisite_issues_count: 0,
                is_valid: true,
                iterations_used: 0,
            });
        }

        let covered = accepted.plan.topic_names().len();
        let (missing, overloaded, prerequisites, is_valid) = verification
            .map(|v| {
                (
                    v.missing_topics.len(),
                    v.overloaded_days.len(),
                    v.prerequisite_issues.len(),
                    v.is_valid,
                )
            })
            .unwrap_or((0, 0, 0, true));

        Some(VerificationSummary {
            coverage_percent: coverage_percent(covered, missing),
            overloaded_days_count: overloaded,
            prerequisite_issues_count: prerequisites,
            is_valid,
            iterations_used: self.iterations,
        })
    }

    pub fn outcome(&self) -> Option<RunOutcome> {
        Some(RunOutcome {
            final_plan: self.final_plan.clone()?,
            versions: self.versions.clone(),
            summary: self.summary()?,
            self_correction_applied: self.self_correction_applied,
        })
    }

    /// Consume a decoded stream until `complete`, failure or cancellation.
    pub async fn run(
        &mut self,
        mut events: EventStream,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, PlanError> {
        self.begin();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(versions = self.versions.len(), "generation view cancelled");
                    return Err(PlanError::Cancelled);
                }
                next = events.next() => next,
            };

            match next {
                Some(Ok(event)) => {
                    self.apply(event);
                    if self.is_finished() {
                        return self.outcome().ok_or(PlanError::IncompleteStream {
                            versions_seen: self.versions.len(),
                        });
                    }
                }
                Some(Err(err)) => {
                    warn!(error = %err, "generation stream failed");
                    self.fail();
                    return Err(PlanError::Transport(err));
                }
                None => {
                    warn!(versions = self.versions.len(), "generation stream ended early");
                    self.fail();
                    return Err(PlanError::IncompleteStream {
                        versions_seen: self.versions.len(),
                    });
                }
            }
        }
    }

    fn fail(&mut self) {
        self.state = RunState::Failed;
        self.publish();
    }

    fn publish(&self) {
        self.view.send_replace(RunView {
            state: self.state,
            label: self.label.clone(),
            versions: self.versions.clone(),
            summary: self.summary(),
            finished: self.is_finished(),
        });
    }
}
