use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use mentor_types::PlanRequest;

pub mod mem;
pub use mem::InMemoryCacheStore;

pub mod rest;
pub use rest::RestCacheStore;

/// Characters of free text that take part in a fingerprint.
pub const FINGERPRINT_PREFIX_LEN: usize = 100;

pub fn default_ttl() -> Duration {
    Duration::hours(24)
}

#[derive(Debug, Error)]
#[error("cache store error: {message}")]
pub struct CacheError {
    pub message: String,
}

impl CacheError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// One stored artifact.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub value: serde_json::Value,
    pub expires_at: DateTime<Utc>,
}

/// Backing storage for fingerprinted artifacts.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Entry for `key` that is still live at `now`, if any.
    async fn get(&self, key: &str, now: DateTime<Utc>) -> Result<Option<CacheEntry>, CacheError>;

    /// Insert or overwrite the entry with the same key.
    async fn upsert(&self, entry: CacheEntry) -> Result<(), CacheError>;
}

/// Store for deployments without a cache; every call fails and the cache fails open.
pub struct NullCacheStore;

#[async_trait]
impl CacheStore for NullCacheStore {
    async fn get(&self, _key: &str, _now: DateTime<Utc>) -> Result<Option<CacheEntry>, CacheError> {
        Err(CacheError::new("no cache store configured"))
    }

    async fn upsert(&self, _entry: CacheEntry) -> Result<(), CacheError> {
        Err(CacheError::new("no cache store configured"))
    }
}

/// Anything that can be reduced to a cache key.
pub trait Fingerprinted {
    fn fingerprint(&self) -> String;
}

impl Fingerprinted for PlanRequest {
    fn fingerprint(&self) -> String {
        fingerprint(&self.exam_type, self.days, &self.syllabus_text)
    }
}

/// Lossy, order-sensitive digest of a request.
///
/// Folds `"{category}-{duration}-{prefix}"` with `h = h * 31 + unit` over UTF-16
/// code units in wrapping 32-bit arithmetic, where `prefix` is the first
/// [`FINGERPRINT_PREFIX_LEN`] units of `text`. Requests that differ only past
/// the prefix share a key.
pub fn fingerprint(category: &str, duration: u32, text: &str) -> String {
    let head = format!("{category}-{duration}-");
    let units = head
        .encode_utf16()
        .chain(text.encode_utf16().take(FINGERPRINT_PREFIX_LEN));

    let mut hash: i32 = 0;
    for unit in units {
        hash = hash
            .wrapping_shl(5)
            .wrapping_sub(hash)
            .wrapping_add(i32::from(unit));
    }
    format!("plan-{}", hash.unsigned_abs())
}

/// Read-before-write artifact cache with a fixed TTL. Never surfaces store failures.
#[derive(Clone)]
pub struct FingerprintCache {
    store: Arc<dyn CacheStore>,
    ttl: Duration,
}

impl FingerprintCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            store,
            ttl: default_ttl(),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryCacheStore::new()))
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn lookup<K: Fingerprinted + ?Sized>(&self, request: &K) -> Option<serde_json::Value> {
        self.lookup_at(request, Utc::now()).await
    }

    pub async fn lookup_at<K: Fingerprinted + ?Sized>(
        &self,
        request: &K,
        now: DateTime<Utc>,
    ) -> Option<serde_json::Value> {
        let key = request.fingerprint();
        match self.store.get(&key, now).await {
            // Stores may hand back rows that expired in flight.
            Ok(Some(entry)) if entry.expires_at > now => {
                debug!(key = %key, "cache hit");
                Some(entry.value)
            }
            Ok(_) => {
                debug!(key = %key, "cache miss");
                None
            }
            Err(err) => {
                warn!(key = %key, error = %err, "cache lookup failed, treating as miss");
                None
            }
        }
    }

    pub async fn store<K: Fingerprinted + ?Sized>(&self, request: &K, value: serde_json::Value) {
        self.store_at(request, value, Utc::now()).await
    }

    pub async fn store_at<K: Fingerprinted + ?Sized>(
        &self,
        request: &K,
        value: serde_json::Value,
        now: DateTime<Utc>,
    ) {
        let entry = CacheEntry {
            key: request.fingerprint(),
            value,
            expires_at: now + self.ttl,
        };
        let key = entry.key.clone();
        match self.store.upsert(entry).await {
            Ok(()) => debug!(key = %key, "cached artifact"),
            Err(err) => warn!(key = %key, error = %err, "cache store failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::TimeZone;
    use serde_json::json;
    use tokio::sync::Mutex;

    use super::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
    }

    fn request(syllabus: &str) -> PlanRequest {
        PlanRequest::new("neet", "Score 650+", 7).with_syllabus(syllabus)
    }

    /// Keeps expired rows around and returns them regardless of `now`.
    #[derive(Default)]
    struct RawStore {
        rows: Mutex<HashMap<String, CacheEntry>>,
    }

    #[async_trait]
    impl CacheStore for RawStore {
        async fn get(&self, key: &str, _now: DateTime<Utc>) -> Result<Option<CacheEntry>, CacheError> {
            Ok(self.rows.lock().await.get(key).cloned())
        }

        async fn upsert(&self, entry: CacheEntry) -> Result<(), CacheError> {
            self.rows.lock().await.insert(entry.key.clone(), entry);
            Ok(())
        }
    }

    #[test]
    fn fingerprint_matches_reference_fold() {
        assert_eq!(fingerprint("neet", 7, "Biology"), "plan-314451616");
        assert_eq!(request("Biology").fingerprint(), "plan-314451616");
    }

    #[test]
    fn fingerprint_is_order_sensitive() {
        assert_ne!(fingerprint("neet", 7, "ab"), fingerprint("neet", 7, "ba"));
        assert_ne!(fingerprint("neet", 7, "x"), fingerprint("jee", 7, "x"));
        assert_ne!(fingerprint("neet", 7, "x"), fingerprint("neet", 8, "x"));
    }

    #[test]
    fn text_past_the_prefix_is_ignored() {
        let base = "p".repeat(FINGERPRINT_PREFIX_LEN);
        let a = format!("{base} Unit 1: Cell Biology");
        let b = format!("{base} Unit 9: Thermodynamics");
        assert_eq!(fingerprint("neet", 30, &a), fingerprint("neet", 30, &b));
        assert_eq!(fingerprint("neet", 30, &a), fingerprint("neet", 30, &base));
    }

    #[tokio::test]
    async fn ttl_boundary() {
        let cache = FingerprintCache::new(Arc::new(RawStore::default()));
        let req = request("Physics, Chemistry");
        cache.store_at(&req, json!({"exam_name": "NEET"}), t0()).await;

        let almost = t0() + Duration::hours(23) + Duration::minutes(59);
        assert_eq!(cache.lookup_at(&req, almost).await, Some(json!({"exam_name": "NEET"})));

        let past = t0() + Duration::hours(24) + Duration::minutes(1);
        assert_eq!(cache.lookup_at(&req, past).await, None);
    }

    #[tokio::test]
    async fn later_write_wins_and_refreshes_ttl() {
        let cache = FingerprintCache::in_memory();
        let req = request("Genetics");
        cache.store_at(&req, json!({"v": 1}), t0()).await;
        cache.store_at(&req, json!({"v": 2}), t0() + Duration::hours(12)).await;

        let later = t0() + Duration::hours(30);
        assert_eq!(cache.lookup_at(&req, later).await, Some(json!({"v": 2})));
    }

    #[tokio::test]
    async fn store_failures_fail_open() {
        let cache = FingerprintCache::new(Arc::new(NullCacheStore));
        let req = request("Genetics");
        cache.store(&req, json!({"v": 1})).await;
        assert_eq!(cache.lookup(&req).await, None);
    }
}
