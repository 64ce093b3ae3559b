//! # Artifact Resolver
//!
//! Lists the prefix once and hands the keys to the pure resolution logic in
//! `schema-sync-core`. Unparseable version tokens are logged here.

use std::sync::Arc;

use schema_sync_core::{resolve_latest, resolve_latest_completed, Resolution};
use tracing::{debug, warn};

use crate::error::{SyncError, SyncResult};
use crate::store::ObjectStore;

/// Finds the newest artifact under a prefix.
#[derive(Clone)]
pub struct ArtifactResolver {
    store: Arc<dyn ObjectStore>,
    prefix: String,
    schema_file: String,
}

impl ArtifactResolver {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        prefix: impl Into<String>,
        schema_file: impl Into<String>,
    ) -> Self {
        ArtifactResolver {
            store,
            prefix: prefix.into(),
            schema_file: schema_file.into(),
        }
    }

    /// Resolves the highest version carrying the schema file.
    ///
    /// ## Errors
    /// - `FetchFailed` if the listing fails
    /// - `Resolution` if nothing usable is found
    pub async fn latest(&self) -> SyncResult<Resolution> {
        let keys = self.list().await?;
        let resolution = resolve_latest(&keys, &self.prefix, &self.schema_file)?;
        self.report(&resolution);
        Ok(resolution)
    }

    /// Resolves the highest version that also carries `completed_file`.
    pub async fn latest_completed(&self, completed_file: &str) -> SyncResult<Resolution> {
        let keys = self.list().await?;
        let resolution =
            resolve_latest_completed(&keys, &self.prefix, &self.schema_file, completed_file)?;
        self.report(&resolution);
        Ok(resolution)
    }

    async fn list(&self) -> SyncResult<Vec<String>> {
        self.store
            .list(&self.prefix)
            .await
            .map_err(|e| SyncError::fetch(&self.prefix, e))
    }

    fn report(&self, resolution: &Resolution) {
        for token in &resolution.skipped {
            warn!(version = %token, "Failed to parse version, skipping");
        }
        debug!(version = %resolution.version, key = %resolution.key, "Resolved latest schema");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryObjectStore;

    fn resolver(store: &MemoryObjectStore, prefix: &str) -> ArtifactResolver {
        ArtifactResolver::new(Arc::new(store.clone()), prefix, "schema.sql")
    }

    #[tokio::test]
    async fn test_latest_from_listing() {
        let store = MemoryObjectStore::with_keys([
            "schemas/v1/schema.sql",
            "schemas/v2/schema.sql",
            "schemas/v3/schema.sql",
        ]);
        let r = resolver(&store, "schemas/").latest().await.unwrap();
        assert_eq!(r.key, "schemas/v3/schema.sql");
        assert_eq!(r.version, "v3");
    }

    #[tokio::test]
    async fn test_latest_completed_vs_latest() {
        let store = MemoryObjectStore::with_keys([
            "app/v1/schema.sql",
            "app/v1/completed",
            "app/v2/schema.sql",
        ]);
        let resolver = resolver(&store, "app/");

        let completed = resolver.latest_completed("completed").await.unwrap();
        assert_eq!(completed.key, "app/v1/schema.sql");
        assert_eq!(completed.version, "v1");

        let latest = resolver.latest().await.unwrap();
        assert_eq!(latest.version, "v2");
    }

    #[tokio::test]
    async fn test_listing_failure_is_fetch_error() {
        let store = MemoryObjectStore::with_keys(["s/v1/schema.sql"]);
        store.fail_listing(true);
        let err = resolver(&store, "s/").latest().await.unwrap_err();
        assert!(matches!(err, SyncError::FetchFailed { .. }));
        assert!(err.is_fetch_failure());
    }

    #[tokio::test]
    async fn test_empty_prefix_is_resolution_error() {
        let store = MemoryObjectStore::new();
        let err = resolver(&store, "s/").latest().await.unwrap_err();
        assert!(matches!(err, SyncError::Resolution(_)));
    }
}
