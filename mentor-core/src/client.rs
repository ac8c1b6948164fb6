use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use mentor_cache::{FingerprintCache, InMemoryCacheStore, RestCacheStore};
use mentor_plan::{CorrectionOrchestrator, RunOutcome};
use mentor_session::{HttpSessionApi, SessionApi, SessionSupervisor, SupervisorConfig};
use mentor_stream::{decode_stream, decode_text, TextStream};
use mentor_transport::{RequestDescriptor, RetryingTransport, TransportError};
use mentor_types::{
    AnswerSubmission, ExplainRequest, FinalResult, PlanRequest, QuizRequest, StartConfig, StudyPlan,
};

use crate::config::ClientConfig;
use crate::context::SessionContext;
use crate::syllabus::with_default_syllabus;
use crate::MentorError;

/// A plan from the non-streaming endpoint.
#[derive(Clone, Debug, PartialEq)]
pub struct GeneratedPlan {
    pub plan: StudyPlan,
    pub from_cache: bool,
}

/// Entry point that wires transport, cache and session API from one config.
pub struct MentorClient {
    config: ClientConfig,
    transport: RetryingTransport,
    cache: FingerprintCache,
    sessions: Arc<dyn SessionApi>,
}

impl MentorClient {
    pub fn new(config: ClientConfig, transport: RetryingTransport, cache: FingerprintCache) -> Self {
        let sessions = Arc::new(
            HttpSessionApi::new(transport.clone(), config.api_base.clone())
                .with_retries(config.retries, config.retry_delay()),
        );
        Self {
            config,
            transport,
            cache,
            sessions,
        }
    }

    /// Production wiring: reqwest transport, REST cache when configured.
    pub fn from_config(config: ClientConfig) -> Self {
        let transport = RetryingTransport::reqwest();
        let cache = match &config.cache_url {
            Some(url) => {
                let mut store = RestCacheStore::new(transport.clone(), url.clone());
                if let Some(key) = &config.cache_key {
                    store = store.with_api_key(key.clone());
                }
                FingerprintCache::new(Arc::new(store))
            }
            None => FingerprintCache::new(Arc::new(InMemoryCacheStore::new())),
        };
        Self::new(config, transport, cache)
    }

    pub fn with_session_api(mut self, sessions: Arc<dyn SessionApi>) -> Self {
        self.sessions = sessions;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base.trim_end_matches('/'), path)
    }

    fn post<T: Serialize>(&self, path: &str, body: &T, retries: u32) -> Result<RequestDescriptor, MentorError> {
        let body = serde_json::to_value(body)
            .map_err(|e| TransportError::decode(format!("encode error: {e}")))?;
        Ok(RequestDescriptor::post(self.endpoint(path))
            .header("Content-Type", "application/json")
            .json(body)
            .retries(retries)
            .backoff_base(self.config.retry_delay()))
    }

    fn plan_request(&self, path: &str, request: &PlanRequest) -> Result<RequestDescriptor, MentorError> {
        self.post(path, request, self.config.retries)
    }

    async fn post_for_json<T: Serialize>(&self, path: &str, body: &T, retries: u32) -> Result<Value, MentorError> {
        let req = self.post(path, body, retries)?;
        Ok(self.transport.execute(&req).await?.json().await?)
    }

    /// Verified plan in one response, served from the cache when possible.
    pub async fn generate_plan(
        &self,
        ctx: &mut SessionContext,
        request: PlanRequest,
    ) -> Result<GeneratedPlan, MentorError> {
        // Keyed on the syllabus as given; the default is only what gets sent.
        let key = request.clone();
        let request = with_default_syllabus(request);

        if let Some(value) = self.cache.lookup(&key).await {
            match serde_json::from_value::<StudyPlan>(value.clone()) {
                Ok(plan) => {
                    info!(exam = %request.exam_type, days = request.days, "serving plan from cache");
                    ctx.set_plan(request.exam_type.clone(), value);
                    return Ok(GeneratedPlan {
                        plan,
                        from_cache: true,
                    });
                }
                Err(err) => warn!(error = %err, "ignoring unreadable cached plan"),
            }
        }

        let req = self.plan_request("/api/plan/generate-verified", &request)?;
        let body: Value = self.transport.execute(&req).await?.json().await?;
        // Either a bare plan or a `final_result`-style envelope.
        let value = match body.get("final_plan").cloned() {
            Some(plan) => plan,
            None => body,
        };
        let plan: StudyPlan = serde_json::from_value(value.clone())
            .map_err(|e| TransportError::decode(format!("plan parse error: {e}")))?;

        self.cache.store(&key, value.clone()).await;
        ctx.set_plan(request.exam_type.clone(), value);
        info!(exam = %request.exam_type, days = plan.total_days, "plan generated");
        Ok(GeneratedPlan {
            plan,
            from_cache: false,
        })
    }

    /// Verified plan with its full correction history, as a finished run.
    pub async fn generate_plan_with_history(
        &self,
        ctx: &mut SessionContext,
        request: PlanRequest,
    ) -> Result<CorrectionOrchestrator, MentorError> {
        let request = with_default_syllabus(request);
        let req = self.plan_request("/api/plan/generate-verified-with-history", &request)?;
        let result: FinalResult = self.transport.execute(&req).await?.json().await?;

        let orchestrator = CorrectionOrchestrator::from_final_result(result);
        if let Some(outcome) = orchestrator.outcome() {
            remember_plan(ctx, &request, &outcome.final_plan);
        }
        Ok(orchestrator)
    }

    /// Stream a correction run into `orchestrator` until it completes or `cancel` fires.
    pub async fn stream_plan(
        &self,
        ctx: &mut SessionContext,
        request: PlanRequest,
        orchestrator: &mut CorrectionOrchestrator,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, MentorError> {
        let request = with_default_syllabus(request);
        let req = self.plan_request("/api/plan/generate-verified-stream", &request)?;
        orchestrator.begin();

        let resp = self.transport.execute(&req).await?;
        let outcome = orchestrator.run(decode_stream(resp.into_byte_stream()), cancel).await?;

        remember_plan(ctx, &request, &outcome.final_plan);
        Ok(outcome)
    }

    /// Supervisor for the plan held in `ctx`, already started.
    pub async fn start_autopilot(
        &self,
        ctx: &SessionContext,
        duration_minutes: u32,
    ) -> Result<SessionSupervisor, MentorError> {
        let study_plan = ctx.study_plan.clone().ok_or(MentorError::NoStudyPlan)?;
        let exam_type = ctx.exam_type.clone().unwrap_or_else(|| "NEET".into());

        let supervisor = SessionSupervisor::new(
            self.sessions.clone(),
            SupervisorConfig {
                poll_interval: self.config.poll_interval(),
            },
        );
        supervisor
            .start(
                None,
                StartConfig {
                    study_plan,
                    exam_type,
                    duration_minutes,
                },
            )
            .await?;
        Ok(supervisor)
    }
}

/// Tutor and quiz endpoints. Responses are passed through as JSON.
impl MentorClient {
    pub async fn explain(&self, request: &ExplainRequest) -> Result<Value, MentorError> {
        self.post_for_json("/api/tutor/explain", request, self.config.retries)
            .await
    }

    /// Explanation text as it is generated. Sent once, like every stream.
    pub async fn stream_explanation(&self, request: &ExplainRequest) -> Result<TextStream, MentorError> {
        let body = ExplainRequest {
            history: Vec::new(),
            ..request.clone()
        };
        let req = self.post("/api/tutor/stream", &body, 0)?;
        let resp = self.transport.execute(&req).await?;
        Ok(decode_text(resp.into_byte_stream()))
    }

    pub async fn generate_quiz(&self, request: &QuizRequest) -> Result<Value, MentorError> {
        self.post_for_json("/api/quiz/generate", request, self.config.retries)
            .await
    }

    pub async fn evaluate_answer(&self, answer: &AnswerSubmission) -> Result<Value, MentorError> {
        let body = AnswerSubmission {
            session_id: None,
            user_id: None,
            ..answer.clone()
        };
        self.post_for_json("/api/quiz/evaluate", &body, self.config.retries)
            .await
    }

    /// Diagnose the misconception behind a wrong answer.
    pub async fn bust_misconception(&self, answer: &AnswerSubmission) -> Result<Value, MentorError> {
        self.post_for_json("/api/quiz/misconception", answer, self.config.retries.min(1))
            .await
    }
}

fn remember_plan(ctx: &mut SessionContext, request: &PlanRequest, plan: &StudyPlan) {
    match serde_json::to_value(plan) {
        Ok(value) => ctx.set_plan(request.exam_type.clone(), value),
        Err(err) => warn!(error = %err, "could not keep plan in session context"),
    }
}
