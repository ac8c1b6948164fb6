use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::{CacheEntry, CacheError, CacheStore};

/// Process-local cache store. Expired rows stay until overwritten.
#[derive(Default)]
pub struct InMemoryCacheStore {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of physically stored rows, live or not.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, key: &str, now: DateTime<Utc>) -> Result<Option<CacheEntry>, CacheError> {
        let entries = self.entries.lock().await;
        Ok(entries.get(key).filter(|e| e.expires_at > now).cloned())
    }

    async fn upsert(&self, entry: CacheEntry) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().await;
        entries.insert(entry.key.clone(), entry);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn expired_rows_are_kept_but_not_served() {
        let store = InMemoryCacheStore::new();
        let now = Utc.with_ymd_and_hms(2026, 1, 10, 0, 0, 0).unwrap();
        store
            .upsert(CacheEntry {
                key: "plan-1".into(),
                value: json!({}),
                expires_at: now,
            })
            .await
            .unwrap();

        assert!(store.get("plan-1", now - Duration::seconds(1)).await.unwrap().is_some());
        assert!(store.get("plan-1", now).await.unwrap().is_none());
        assert_eq!(store.len().await, 1);
    }
}
