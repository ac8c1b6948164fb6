use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use mentor_transport::{RequestDescriptor, RetryingTransport, TransportError, DEFAULT_BACKOFF_BASE};
use mentor_types::{ActionAck, SessionSnapshot, StartAck, StartConfig};

use crate::SessionAction;

/// Remote autopilot surface.
#[async_trait]
pub trait SessionApi: Send + Sync {
    async fn start(&self, session_id: &str, config: &StartConfig) -> Result<StartAck, TransportError>;

    async fn status(&self, session_id: &str) -> Result<SessionSnapshot, TransportError>;

    /// Pause, resume or stop.
    async fn control(&self, session_id: &str, action: SessionAction) -> Result<ActionAck, TransportError>;

    async fn answer(&self, session_id: &str, answer_index: usize) -> Result<ActionAck, TransportError>;

    async fn pause(&self, session_id: &str) -> Result<ActionAck, TransportError> {
        self.control(session_id, SessionAction::Pause).await
    }

    async fn resume(&self, session_id: &str) -> Result<ActionAck, TransportError> {
        self.control(session_id, SessionAction::Resume).await
    }

    async fn stop(&self, session_id: &str) -> Result<ActionAck, TransportError> {
        self.control(session_id, SessionAction::Stop).await
    }
}

/// `SessionApi` over the `/api/autopilot` endpoints.
pub struct HttpSessionApi {
    transport: RetryingTransport,
    base_url: String,
    retries: u32,
    backoff_base: Duration,
}

impl HttpSessionApi {
    pub fn new(transport: RetryingTransport, base_url: impl Into<String>) -> Self {
        Self {
            transport,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            retries: 2,
            backoff_base: DEFAULT_BACKOFF_BASE,
        }
    }

    pub fn with_retries(mut self, retries: u32, backoff_base: Duration) -> Self {
        self.retries = retries;
        self.backoff_base = backoff_base;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/autopilot/{}", self.base_url, path)
    }

    fn post(&self, path: &str) -> RequestDescriptor {
        RequestDescriptor::post(self.url(path))
            .retries(self.retries)
            .backoff_base(self.backoff_base)
    }

    /// A repeated start or answer is not harmless, so it goes out exactly once.
    fn post_once(&self, path: &str) -> RequestDescriptor {
        RequestDescriptor::post(self.url(path)).retries(0)
    }

    /// Acks are informational; an unreadable body still counts as success.
    async fn ack(&self, req: RequestDescriptor) -> Result<ActionAck, TransportError> {
        let text = self.transport.execute(&req).await?.text().await?;
        Ok(serde_json::from_str(&text).unwrap_or_default())
    }
}

#[async_trait]
impl SessionApi for HttpSessionApi {
    async fn start(&self, session_id: &str, config: &StartConfig) -> Result<StartAck, TransportError> {
        let body = serde_json::to_value(config)
            .map_err(|e| TransportError::decode(format!("encode error: {e}")))?;
        let req = self
            .post_once(&format!("start?session_id={session_id}"))
            .json(body);
        self.transport.execute(&req).await?.json().await
    }

    async fn status(&self, session_id: &str) -> Result<SessionSnapshot, TransportError> {
        // The next tick is the retry.
        let req = RequestDescriptor::get(self.url(&format!("status/{session_id}"))).retries(0);
        self.transport.execute(&req).await?.json().await
    }

    async fn control(&self, session_id: &str, action: SessionAction) -> Result<ActionAck, TransportError> {
        self.ack(self.post(&format!("{action}/{session_id}"))).await
    }

    async fn answer(&self, session_id: &str, answer_index: usize) -> Result<ActionAck, TransportError> {
        let req = self
            .post_once(&format!("answer/{session_id}"))
            .json(json!({ "answer_index": answer_index }));
        self.ack(req).await
    }
}
