use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use mentor_transport::{RequestDescriptor, RetryingTransport};

use crate::{CacheEntry, CacheError, CacheStore};

pub const DEFAULT_TABLE: &str = "plan_cache";

/// Cache rows in a PostgREST table `(cache_key, plan, expires_at)`.
pub struct RestCacheStore {
    transport: RetryingTransport,
    base_url: String,
    api_key: Option<String>,
    table: String,
}

#[derive(Serialize, Deserialize, Debug)]
struct CacheRow {
    cache_key: String,
    plan: serde_json::Value,
    expires_at: DateTime<Utc>,
}

impl RestCacheStore {
    pub fn new(transport: RetryingTransport, base_url: impl Into<String>) -> Self {
        Self {
            transport,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            table: DEFAULT_TABLE.to_string(),
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    fn authorize(&self, req: RequestDescriptor) -> RequestDescriptor {
        match &self.api_key {
            Some(key) => req
                .header("apikey", key.as_str())
                .header("Authorization", format!("Bearer {key}")),
            None => req,
        }
    }
}

#[async_trait]
impl CacheStore for RestCacheStore {
    async fn get(&self, key: &str, now: DateTime<Utc>) -> Result<Option<CacheEntry>, CacheError> {
        let url = format!(
            "{}/{}?select=cache_key,plan,expires_at&cache_key=eq.{}&expires_at=gt.{}&limit=1",
            self.base_url,
            self.table,
            key,
            now.to_rfc3339_opts(SecondsFormat::Millis, true)
        );
        // Cache reads sit on the request path; no retries.
        let req = self.authorize(RequestDescriptor::get(url).retries(0));
        let resp = self
            .transport
            .execute(&req)
            .await
            .map_err(|e| CacheError::new(format!("cache lookup error: {e}")))?;
        let rows: Vec<CacheRow> = resp
            .json()
            .await
            .map_err(|e| CacheError::new(format!("cache parse error: {e}")))?;

        Ok(rows.into_iter().next().map(|row| CacheEntry {
            key: row.cache_key,
            value: row.plan,
            expires_at: row.expires_at,
        }))
    }

    async fn upsert(&self, entry: CacheEntry) -> Result<(), CacheError> {
        let url = format!("{}/{}?on_conflict=cache_key", self.base_url, self.table);
        let row = CacheRow {
            cache_key: entry.key,
            plan: entry.value,
            expires_at: entry.expires_at,
        };
        let body = serde_json::to_value(&row)
            .map_err(|e| CacheError::new(format!("cache encode error: {e}")))?;
        let req = self.authorize(
            RequestDescriptor::post(url)
                .header("Prefer", "resolution=merge-duplicates")
                .json(body)
                .retries(0),
        );
        self.transport
            .execute(&req)
            .await
            .map_err(|e| CacheError::new(format!("cache upsert error: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use chrono::TimeZone;
    use mentor_transport::{HttpBackend, Method, Response, StatusCode, TransportError};
    use serde_json::json;

    use super::*;

    struct Recorder {
        seen: Mutex<Vec<RequestDescriptor>>,
        status: StatusCode,
        body: &'static str,
    }

    #[async_trait]
    impl HttpBackend for Recorder {
        async fn send(&self, req: &RequestDescriptor) -> Result<Response, TransportError> {
            self.seen.lock().unwrap().push(req.clone());
            Ok(Response::from_bytes(self.status, self.body))
        }
    }

    fn store(status: StatusCode, body: &'static str) -> (RestCacheStore, Arc<Recorder>) {
        let backend = Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
            status,
            body,
        });
        let store = RestCacheStore::new(RetryingTransport::new(backend.clone()), "https://db.test/rest/v1/")
            .with_api_key("anon");
        (store, backend)
    }

    #[tokio::test]
    async fn get_filters_by_key_and_expiry() {
        let (store, backend) = store(
            StatusCode::OK,
            r#"[{"cache_key":"plan-42","plan":{"exam_name":"JEE"},"expires_at":"2026-02-02T10:00:00Z"}]"#,
        );
        let now = Utc.with_ymd_and_hms(2026, 2, 1, 10, 0, 0).unwrap();

        let entry = store.get("plan-42", now).await.unwrap().unwrap();
        assert_eq!(entry.value, json!({"exam_name": "JEE"}));
        assert_eq!(entry.expires_at, now + chrono::Duration::hours(24));

        let seen = backend.seen.lock().unwrap();
        assert_eq!(seen[0].method, Method::GET);
        assert_eq!(
            seen[0].target,
            "https://db.test/rest/v1/plan_cache?select=cache_key,plan,expires_at&cache_key=eq.plan-42&expires_at=gt.2026-02-01T10:00:00.000Z&limit=1"
        );
        assert!(seen[0].headers.contains(&("Authorization".into(), "Bearer anon".into())));
    }

    #[tokio::test]
    async fn empty_result_is_a_miss() {
        let (store, _) = store(StatusCode::OK, "[]");
        assert!(store.get("plan-1", Utc::now()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn upsert_merges_duplicates() {
        let (store, backend) = store(StatusCode::CREATED, "");
        let expires_at = Utc.with_ymd_and_hms(2026, 2, 2, 0, 0, 0).unwrap();
        store
            .upsert(CacheEntry {
                key: "plan-7".into(),
                value: json!({"total_days": 7}),
                expires_at,
            })
            .await
            .unwrap();

        let seen = backend.seen.lock().unwrap();
        let req = &seen[0];
        assert_eq!(req.method, Method::POST);
        assert!(req.target.ends_with("/plan_cache?on_conflict=cache_key"));
        assert!(req
            .headers
            .contains(&("Prefer".into(), "resolution=merge-duplicates".into())));
        let body = req.body.as_ref().unwrap();
        assert_eq!(body["cache_key"], "plan-7");
        assert_eq!(body["plan"]["total_days"], 7);
    }

    #[tokio::test]
    async fn server_errors_become_cache_errors() {
        let (store, backend) = store(StatusCode::SERVICE_UNAVAILABLE, "down");
        let err = store.get("plan-1", Utc::now()).await.unwrap_err();
        assert!(err.message.contains("503"));
        assert_eq!(backend.seen.lock().unwrap().len(), 1);
    }
}
