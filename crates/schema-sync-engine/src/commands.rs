//! # One-Shot Commands
//!
//! Read-only operations that never touch the target database:
//!
//! - [`fetch_completed_schema`]: body of the newest completed version
//! - [`plan_against_local`]: DDL that would turn the newest completed schema
//!   into a local desired schema
//!
//! For planning, the post-apply `exported.sql` is preferred because it
//! reflects the database as it was actually left. The original artifact is
//! the fallback.

use std::sync::Arc;

use bytes::Bytes;
use schema_sync_core::exported_key;
use tracing::{info, warn};

use crate::config::StoreSettings;
use crate::differ::Differ;
use crate::error::{SyncError, SyncResult};
use crate::resolver::ArtifactResolver;
use crate::store::ObjectStore;

/// The newest completed artifact and its body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedSchema {
    pub version: String,
    /// Key the body was read from.
    pub key: String,
    pub body: Bytes,
}

fn completed_resolver(
    store: &Arc<dyn ObjectStore>,
    settings: &StoreSettings,
) -> SyncResult<ArtifactResolver> {
    if !settings.markers_enabled() {
        return Err(SyncError::InvalidConfig(
            "completed file name is required to find completed schemas".into(),
        ));
    }
    Ok(ArtifactResolver::new(
        Arc::clone(store),
        &settings.path_prefix,
        &settings.schema_file,
    ))
}

/// Downloads the schema file of the newest completed version.
pub async fn fetch_completed_schema(
    store: Arc<dyn ObjectStore>,
    settings: &StoreSettings,
) -> SyncResult<CompletedSchema> {
    let resolution = completed_resolver(&store, settings)?
        .latest_completed(&settings.completed_file)
        .await?;

    info!(version = %resolution.version, key = %resolution.key, "Fetching completed schema");
    let body = store
        .get(&resolution.key)
        .await
        .map_err(|e| SyncError::fetch(&resolution.key, e))?;

    Ok(CompletedSchema {
        version: resolution.version,
        key: resolution.key,
        body,
    })
}

/// Plans `desired` against the newest completed schema without a database.
pub async fn plan_against_local(
    store: Arc<dyn ObjectStore>,
    differ: &dyn Differ,
    settings: &StoreSettings,
    desired: &[u8],
) -> SyncResult<String> {
    let resolution = completed_resolver(&store, settings)?
        .latest_completed(&settings.completed_file)
        .await?;

    let exported = exported_key(&resolution.key);
    let current = match store.get(&exported).await {
        Ok(body) => {
            info!(key = %exported, "Planning against exported schema");
            body
        }
        Err(e) => {
            if e.is_not_found() {
                info!(version = %resolution.version, "No exported schema, using original");
            } else {
                warn!(key = %exported, error = %e, "Failed to read exported schema, using original");
            }
            store
                .get(&resolution.key)
                .await
                .map_err(|e| SyncError::fetch(&resolution.key, e))?
        }
    };

    differ.offline_plan(&current, desired).await
}
