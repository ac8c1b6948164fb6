use async_trait::async_trait;
use futures_util::StreamExt;

use crate::{HttpBackend, RequestDescriptor, Response, TransportError};

/// `HttpBackend` over a shared reqwest client.
#[derive(Clone, Default)]
pub struct ReqwestBackend {
    client: reqwest::Client,
}

impl ReqwestBackend {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpBackend for ReqwestBackend {
    async fn send(&self, req: &RequestDescriptor) -> Result<Response, TransportError> {
        let mut builder = self.client.request(req.method.clone(), &req.target);
        for (name, value) in &req.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &req.body {
            builder = builder.json(body);
        }

        let resp = builder
            .send()
            .await
            .map_err(|e| TransportError::network(format!("HTTP error: {e}")))?;

        let status = resp.status();
        let body = resp
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| TransportError::network(format!("stream error: {e}"))));

        Ok(Response::new(status, Box::pin(body)))
    }
}
