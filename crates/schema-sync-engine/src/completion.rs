//! # Completion Tracker
//!
//! An empty object next to the schema file proves a version was applied.
//! It is the only state that survives a restart.

use std::sync::Arc;

use bytes::Bytes;
use schema_sync_core::marker_key;
use tracing::debug;

use crate::error::{SyncError, SyncResult};
use crate::store::ObjectStore;

/// Reads and writes completion markers.
#[derive(Clone)]
pub struct CompletionTracker {
    store: Arc<dyn ObjectStore>,
    completed_file: String,
}

impl CompletionTracker {
    pub fn new(store: Arc<dyn ObjectStore>, completed_file: impl Into<String>) -> Self {
        CompletionTracker {
            store,
            completed_file: completed_file.into(),
        }
    }

    /// Marker key for an artifact.
    pub fn marker_key(&self, artifact_key: &str) -> String {
        marker_key(artifact_key, &self.completed_file)
    }

    /// Returns true if the artifact's marker exists.
    ///
    /// A missing marker is `Ok(false)`. Any other store failure is
    /// `MarkerFailed`.
    pub async fn exists(&self, artifact_key: &str) -> SyncResult<bool> {
        let key = self.marker_key(artifact_key);
        match self.store.head(&key).await {
            Ok(found) => Ok(found),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(SyncError::MarkerFailed(e.to_string())),
        }
    }

    /// Writes an empty marker. Re-marking is harmless.
    pub async fn mark(&self, artifact_key: &str) -> SyncResult<()> {
        let key = self.marker_key(artifact_key);
        self.store
            .put(&key, Bytes::new())
            .await
            .map_err(|e| SyncError::MarkerFailed(e.to_string()))?;
        debug!(key = %key, "Completion marker written");
        Ok(())
    }
}
