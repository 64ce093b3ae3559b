//! # Object Store
//!
//! The storage seam the engine reads artifacts from and writes markers to.
//!
//! ## Contract
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  list(prefix)  → every key under the prefix (all pages)                │
//! │  get(key)      → object body, NotFound if missing                      │
//! │  put(key, b)   → overwrite, idempotent                                 │
//! │  head(key)     → Ok(true) / Ok(false); never NotFound as an error      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Single-key reads are assumed atomic. Listings may lag behind writes.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{StoreError, StoreResult};

/// Storage backend for schema artifacts.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Lists every key starting with `prefix`.
    async fn list(&self, prefix: &str) -> StoreResult<Vec<String>>;

    /// Reads an object.
    async fn get(&self, key: &str) -> StoreResult<Bytes>;

    /// Writes an object, replacing any existing body.
    async fn put(&self, key: &str, body: Bytes) -> StoreResult<()>;

    /// Checks for an object without reading it.
    async fn head(&self, key: &str) -> StoreResult<bool>;
}

// =============================================================================
// Memory Store
// =============================================================================

/// Record of a store operation, for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    List { prefix: String },
    Get { key: String },
    Put { key: String, size: usize },
    Head { key: String },
}

/// In-memory object store.
///
/// Records every operation and supports injected failures, which makes it
/// the store of choice for driving a full cycle in tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryObjectStore {
    objects: Arc<Mutex<BTreeMap<String, Bytes>>>,
    operations: Arc<Mutex<Vec<StoreOp>>>,
    fail_list: Arc<Mutex<bool>>,
    fail_keys: Arc<Mutex<Vec<String>>>,
}

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding `keys`, each with an empty body.
    pub fn with_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let store = Self::new();
        for key in keys {
            store.insert(key, Bytes::new());
        }
        store
    }

    /// Inserts an object directly, bypassing operation recording.
    pub fn insert(&self, key: impl Into<String>, body: impl Into<Bytes>) {
        guard(&self.objects).insert(key.into(), body.into());
    }

    /// Returns the body stored at `key`.
    pub fn object(&self, key: &str) -> Option<Bytes> {
        guard(&self.objects).get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        guard(&self.objects).contains_key(key)
    }

    /// Returns all recorded operations.
    pub fn operations(&self) -> Vec<StoreOp> {
        guard(&self.operations).clone()
    }

    pub fn clear_operations(&self) {
        guard(&self.operations).clear();
    }

    /// Makes every listing fail until cleared.
    pub fn fail_listing(&self, fail: bool) {
        *guard(&self.fail_list) = fail;
    }

    /// Makes get/put/head fail for keys starting with `prefix`.
    pub fn inject_failure(&self, prefix: impl Into<String>) {
        guard(&self.fail_keys).push(prefix.into());
    }

    pub fn clear_failures(&self) {
        *guard(&self.fail_list) = false;
        guard(&self.fail_keys).clear();
    }

    fn record(&self, op: StoreOp) {
        guard(&self.operations).push(op);
    }

    fn check_failure(&self, operation: &'static str, key: &str) -> StoreResult<()> {
        if guard(&self.fail_keys).iter().any(|p| key.starts_with(p.as_str())) {
            return Err(StoreError::request(
                operation,
                key,
                "injected failure",
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn list(&self, prefix: &str) -> StoreResult<Vec<String>> {
        self.record(StoreOp::List {
            prefix: prefix.to_string(),
        });
        if *guard(&self.fail_list) {
            return Err(StoreError::request("list", prefix, "injected failure"));
        }
        Ok(guard(&self.objects)
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn get(&self, key: &str) -> StoreResult<Bytes> {
        self.record(StoreOp::Get {
            key: key.to_string(),
        });
        self.check_failure("get", key)?;
        self.object(key).ok_or_else(|| StoreError::not_found(key))
    }

    async fn put(&self, key: &str, body: Bytes) -> StoreResult<()> {
        self.record(StoreOp::Put {
            key: key.to_string(),
            size: body.len(),
        });
        self.check_failure("put", key)?;
        self.insert(key, body);
        Ok(())
    }

    async fn head(&self, key: &str) -> StoreResult<bool> {
        self.record(StoreOp::Head {
            key: key.to_string(),
        });
        self.check_failure("head", key)?;
        Ok(self.contains(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemoryObjectStore::new();
        store
            .put("s/v1/schema.sql", Bytes::from_static(b"CREATE TABLE t (id int);"))
            .await
            .unwrap();

        assert!(store.head("s/v1/schema.sql").await.unwrap());
        assert!(!store.head("s/v1/completed").await.unwrap());
        assert_eq!(
            store.get("s/v1/schema.sql").await.unwrap(),
            Bytes::from_static(b"CREATE TABLE t (id int);")
        );
        assert!(store.get("s/v2/schema.sql").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_memory_store_list_by_prefix() {
        let store = MemoryObjectStore::with_keys(["a/v1/schema.sql", "a/v2/schema.sql", "b/v1/schema.sql"]);
        let keys = store.list("a/").await.unwrap();
        assert_eq!(keys, vec!["a/v1/schema.sql", "a/v2/schema.sql"]);
    }

    #[tokio::test]
    async fn test_memory_store_failure_injection() {
        let store = MemoryObjectStore::with_keys(["s/v1/schema.sql"]);

        store.fail_listing(true);
        assert!(store.list("s/").await.is_err());

        store.inject_failure("s/v1/");
        let err = store.head("s/v1/completed").await.unwrap_err();
        assert!(!err.is_not_found());

        store.clear_failures();
        assert_eq!(store.list("s/").await.unwrap().len(), 1);
        assert!(store.head("s/v1/schema.sql").await.unwrap());
    }

    #[tokio::test]
    async fn test_memory_store_records_operations() {
        let store = MemoryObjectStore::new();
        let _ = store.list("s/").await;
        let _ = store.head("s/v1/completed").await;

        assert_eq!(
            store.operations(),
            vec![
                StoreOp::List { prefix: "s/".into() },
                StoreOp::Head {
                    key: "s/v1/completed".into()
                },
            ]
        );
    }
}
