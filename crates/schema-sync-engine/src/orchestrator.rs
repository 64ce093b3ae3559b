//! # Sync Orchestrator
//!
//! Drives one synchronization cycle at a time and owns the only mutable
//! state of a running instance: the last applied version and the
//! consecutive failure counter.
//!
//! ## Cycle State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Resolve ──fail──► failure++ ──(≥ threshold)──► on-fetch-error ──► Err  │
//! │     │ failure counter resets here                                       │
//! │     ▼                                                                   │
//! │  Compare with last applied ──not newer──► Skipped(NotNewer)             │
//! │     │                                                                   │
//! │     ▼                                                                   │
//! │  Completion marker? ──present──► remember version ► Skipped(Completed)  │
//! │     │ (lookup errors only warn)                                         │
//! │     ▼                                                                   │
//! │  Download ──fail──► failure++ ──(≥ threshold)──► on-fetch-error ──► Err │
//! │     │ failure counter resets here                                       │
//! │     ▼                                                                   │
//! │  Try lock ──held elsewhere──► Skipped(LockHeld)                         │
//! │     │                                                                   │
//! │     ▼                                                                   │
//! │  Plan (dry run, warn on failure) ──► on-before-apply                    │
//! │     │                                                                   │
//! │     ▼                                                                   │
//! │  Apply ──fail──► on-apply-failed ──► release lock ──► Err               │
//! │     │                                                                   │
//! │     ▼                                                                   │
//! │  Remember version ─► export (opt) ─► mark completed ─► on-apply-        │
//! │  succeeded ─► release lock ─► Applied                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Export, marker, hook and release failures after a successful apply are
//! logged and never turn the cycle into an error.

use std::cmp::Ordering;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use schema_sync_core::{
    compare_versions, exported_key, FailureTracker, HookContext, HookEvent, Resolution,
};
use tracing::{debug, error, info, warn};

use crate::completion::CompletionTracker;
use crate::config::SyncConfig;
use crate::differ::{Differ, PsqldefDiffer};
use crate::error::{SyncError, SyncResult};
use crate::hooks::HookDispatcher;
use crate::lock::{ApplyLock, HeldLock, LockOutcome, PostgresApplyLock};
use crate::metrics;
use crate::resolver::ArtifactResolver;
use crate::s3::S3ObjectStore;
use crate::store::ObjectStore;

// =============================================================================
// Cycle Outcome
// =============================================================================

/// Why a cycle ended without applying anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The newest version is not newer than the last applied one.
    NotNewer,
    /// The newest version already carries a completion marker.
    AlreadyCompleted,
    /// Another instance holds the apply lock.
    LockHeld,
}

/// Successful end of a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Applied { version: String },
    Skipped { version: String, reason: SkipReason },
}

impl CycleOutcome {
    pub fn version(&self) -> &str {
        match self {
            CycleOutcome::Applied { version } | CycleOutcome::Skipped { version, .. } => version,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, CycleOutcome::Applied { .. })
    }
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Runs sync cycles against a set of collaborators.
pub struct SyncOrchestrator {
    store: Arc<dyn ObjectStore>,
    resolver: ArtifactResolver,
    /// None when completion markers are disabled.
    completion: Option<CompletionTracker>,
    /// None when locking is skipped.
    lock: Option<Arc<dyn ApplyLock>>,
    differ: Arc<dyn Differ>,
    hooks: HookDispatcher,
    base_context: HookContext,
    export_after_apply: bool,
    plan_before_apply: bool,
    failures: FailureTracker,
    last_applied: Option<String>,
    /// Version label this process last set on the version info gauge.
    reported_version: Option<String>,
}

impl SyncOrchestrator {
    /// Creates an orchestrator without an apply lock.
    ///
    /// Call [`SyncOrchestrator::with_lock`] unless locking is meant to be
    /// skipped.
    pub fn new(
        config: &SyncConfig,
        app_version: &str,
        store: Arc<dyn ObjectStore>,
        differ: Arc<dyn Differ>,
        hooks: HookDispatcher,
    ) -> Self {
        let settings = &config.store;
        let completion = settings
            .markers_enabled()
            .then(|| CompletionTracker::new(Arc::clone(&store), &settings.completed_file));

        SyncOrchestrator {
            resolver: ArtifactResolver::new(
                Arc::clone(&store),
                &settings.path_prefix,
                &settings.schema_file,
            ),
            store,
            completion,
            lock: None,
            differ,
            hooks,
            base_context: config.base_hook_context(app_version),
            export_after_apply: config.apply.export_after_apply,
            plan_before_apply: config.apply.plan_before_apply,
            failures: FailureTracker::default(),
            last_applied: None,
            reported_version: None,
        }
    }

    pub fn with_lock(mut self, lock: Arc<dyn ApplyLock>) -> Self {
        self.lock = Some(lock);
        self
    }

    /// Builds the production collaborators: S3, psqldef, the PostgreSQL
    /// advisory lock and shell hooks.
    pub async fn connect(config: &SyncConfig, app_version: &str) -> Self {
        let store: Arc<dyn ObjectStore> = Arc::new(S3ObjectStore::connect(&config.store).await);
        let differ = PsqldefDiffer::new(&config.apply.differ_bin, config.apply.differ_timeout)
            .with_database(config.database.clone());
        let hooks = HookDispatcher::shell(config.hooks.clone());

        let orchestrator = Self::new(config, app_version, store, Arc::new(differ), hooks);
        if config.apply.skip_lock {
            warn!("Advisory lock disabled, concurrent applies are possible");
            return orchestrator;
        }
        orchestrator.with_lock(Arc::new(PostgresApplyLock::new(
            config.database.db_config(),
        )))
    }

    /// Last version this instance applied or found completed.
    pub fn last_applied(&self) -> Option<&str> {
        self.last_applied.as_deref()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.failures.count()
    }

    /// Fires the on-start hook.
    pub async fn announce_start(&self) {
        self.hooks.fire(HookEvent::Start, &self.base_context).await;
    }

    // =========================================================================
    // Cycle
    // =========================================================================

    /// Runs one cycle.
    ///
    /// ## Errors
    /// - `FetchFailed` / `Resolution` when listing, resolving or downloading
    ///   fails
    /// - `LockFailed` when the lock infrastructure is unreachable
    /// - `ApplyFailed` when the differ rejects the schema
    pub async fn run_cycle(&mut self) -> SyncResult<CycleOutcome> {
        info!("Finding latest schema");
        metrics::record_fetch_attempt();

        let latest = match self.resolver.latest().await {
            Ok(resolution) => resolution,
            Err(e) => {
                self.fetch_failed(&e, None).await;
                return Err(e);
            }
        };
        self.fetch_succeeded();
        let version = latest.version.clone();

        if let Some(last) = self.last_applied.as_deref() {
            if compare_versions(&version, last) != Ordering::Greater {
                info!(version = %version, last_applied = %last, "No newer schema, skipping");
                return Ok(skipped(version, SkipReason::NotNewer));
            }
        }

        if self.is_completed(&latest).await {
            info!(version = %version, "Schema already applied, skipping");
            self.last_applied = Some(version.clone());
            return Ok(skipped(version, SkipReason::AlreadyCompleted));
        }

        info!(key = %latest.key, "Downloading schema");
        let schema = match self.store.get(&latest.key).await {
            Ok(body) => body,
            Err(e) => {
                let err = SyncError::fetch(&latest.key, e);
                self.fetch_failed(&err, Some(&version)).await;
                return Err(err);
            }
        };
        self.fetch_succeeded();

        let held = match &self.lock {
            Some(lock) => match lock.try_acquire().await? {
                LockOutcome::Acquired(held) => Some(held),
                LockOutcome::AlreadyHeld => {
                    info!(version = %version, "Another instance is applying, skipping");
                    return Ok(skipped(version, SkipReason::LockHeld));
                }
            },
            None => None,
        };

        let result = self.apply_locked(&latest, &schema).await;

        if let Some(held) = held {
            release(held).await;
        }
        result
    }

    /// Checks the completion marker. Lookup failures fall through to apply.
    async fn is_completed(&self, latest: &Resolution) -> bool {
        let Some(completion) = &self.completion else {
            return false;
        };
        match completion.exists(&latest.key).await {
            Ok(found) => found,
            Err(e) => {
                warn!(version = %latest.version, error = %e, "Failed to check completion marker");
                false
            }
        }
    }

    async fn apply_locked(
        &mut self,
        latest: &Resolution,
        schema: &Bytes,
    ) -> SyncResult<CycleOutcome> {
        let version = latest.version.as_str();

        let ddl = if self.plan_before_apply {
            match self.differ.plan(schema).await {
                Ok(ddl) => ddl,
                Err(e) => {
                    warn!(version = %version, error = %e, "Dry run failed");
                    e.plan_output().unwrap_or_default().to_string()
                }
            }
        } else {
            String::new()
        };

        let ctx = self.base_context.clone().with_version(version);
        self.hooks
            .fire(HookEvent::BeforeApply, &ctx.clone().with_dry_run(ddl))
            .await;

        info!(version = %version, "Applying schema");
        metrics::record_apply_attempt();

        let output = match self.differ.apply(schema).await {
            Ok(output) => output,
            Err(e) => {
                metrics::record_apply_error();
                error!(version = %version, error = %e, "Failed to apply schema");

                let mut failed = ctx.with_error(e.to_string());
                if let Some(output) = e.apply_output() {
                    failed = failed.with_output(&output.stdout, &output.stderr);
                }
                self.hooks.fire(HookEvent::ApplyFailed, &failed).await;
                return Err(e);
            }
        };

        metrics::record_apply_success(version, self.reported_version.as_deref());
        self.reported_version = Some(version.to_string());
        self.last_applied = Some(version.to_string());
        info!(version = %version, "Schema applied");

        if self.export_after_apply {
            self.export(latest).await;
        }

        if let Some(completion) = &self.completion {
            match completion.mark(&latest.key).await {
                Ok(()) => info!(key = %completion.marker_key(&latest.key), "Marked as completed"),
                Err(e) => warn!(version = %version, error = %e, "Failed to write completion marker"),
            }
        }

        let succeeded = ctx.with_output(output.stdout, output.stderr);
        self.hooks.fire(HookEvent::ApplySucceeded, &succeeded).await;

        Ok(CycleOutcome::Applied {
            version: version.to_string(),
        })
    }

    /// Uploads the post-apply schema dump next to the artifact.
    async fn export(&self, latest: &Resolution) {
        let key = exported_key(&latest.key);
        let dump = match self.differ.export().await {
            Ok(dump) => dump,
            Err(e) => {
                warn!(version = %latest.version, error = %e, "Failed to export schema");
                return;
            }
        };
        match self.store.put(&key, dump).await {
            Ok(()) => info!(key = %key, "Exported schema uploaded"),
            Err(e) => warn!(key = %key, error = %e, "Failed to upload exported schema"),
        }
    }

    // =========================================================================
    // Failure Counter
    // =========================================================================

    async fn fetch_failed(&mut self, err: &SyncError, version: Option<&str>) {
        let count = self.failures.record_failure();
        metrics::record_fetch_error();
        metrics::record_consecutive_failures(count);
        warn!(error = %err, consecutive_failures = count, "Fetch failed");

        if !self.failures.should_escalate() {
            return;
        }
        let mut ctx = self.base_context.clone().with_error(err.to_string());
        if let Some(version) = version {
            ctx = ctx.with_version(version);
        }
        self.hooks.fire(HookEvent::FetchError, &ctx).await;
    }

    fn fetch_succeeded(&mut self) {
        if self.failures.count() > 0 {
            debug!(previous = self.failures.count(), "Fetch recovered");
        }
        self.failures.record_success();
        metrics::record_consecutive_failures(0);
    }

    // =========================================================================
    // Watch Loop
    // =========================================================================

    /// Fires on-start, then runs cycles every `interval` until `shutdown`
    /// resolves.
    ///
    /// Cycle errors are logged and never stop the loop. Shutdown is only
    /// observed between cycles; an in-flight cycle runs to completion.
    pub async fn watch<F>(&mut self, interval: Duration, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        self.announce_start().await;

        loop {
            match self.run_cycle().await {
                Ok(outcome) => debug!(?outcome, "Cycle finished"),
                Err(e) => error!(error = %e, "Error in sync"),
            }

            info!(interval = %humantime::format_duration(interval), "Waiting before next poll");
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping watch loop");
                    break;
                }
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }
}

fn skipped(version: String, reason: SkipReason) -> CycleOutcome {
    CycleOutcome::Skipped { version, reason }
}

async fn release(held: Box<dyn HeldLock>) {
    match held.release().await {
        Ok(()) => debug!("Apply lock released"),
        Err(e) => warn!(error = %e, "Failed to release apply lock"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HookSettings;
    use crate::lock::MemoryApplyLock;
    use crate::store::{MemoryObjectStore, StoreOp};
    use crate::testing::{CountingLock, DifferCall, RecordingHookRunner, ScriptedDiffer};

    const PREFIX: &str = "schemas/";

    struct Harness {
        store: MemoryObjectStore,
        differ: Arc<ScriptedDiffer>,
        hooks: Arc<RecordingHookRunner>,
        lock: CountingLock,
        config: SyncConfig,
    }

    impl Harness {
        fn new(differ: ScriptedDiffer) -> Self {
            let mut config = SyncConfig::default();
            config.store.bucket = "bucket".into();
            config.store.path_prefix = PREFIX.into();
            config.hooks = HookSettings {
                on_start: "start".into(),
                on_fetch_error: "fetch-error".into(),
                on_before_apply: "before".into(),
                on_apply_failed: "failed".into(),
                on_apply_succeeded: "succeeded".into(),
                ..Default::default()
            };

            Harness {
                store: MemoryObjectStore::new(),
                differ: Arc::new(differ),
                hooks: Arc::new(RecordingHookRunner::default()),
                lock: CountingLock::new(MemoryApplyLock::new("db")),
                config,
            }
        }

        fn publish(&self, version: &str, schema: &str) {
            self.store
                .insert(format!("{PREFIX}{version}/schema.sql"), schema.to_string());
        }

        fn orchestrator(&self) -> SyncOrchestrator {
            let hooks = HookDispatcher::new(self.config.hooks.clone(), self.hooks.clone());
            SyncOrchestrator::new(
                &self.config,
                "1.2.3",
                Arc::new(self.store.clone()),
                self.differ.clone(),
                hooks,
            )
            .with_lock(Arc::new(self.lock.clone()))
        }

        fn gets(&self) -> usize {
            self.store
                .operations()
                .iter()
                .filter(|op| matches!(op, StoreOp::Get { .. }))
                .count()
        }
    }

    #[tokio::test]
    async fn test_cycle_applies_newest_version() {
        let h = Harness::new(ScriptedDiffer::default().planning("CREATE TABLE t3 ();"));
        h.publish("v1", "-- v1");
        h.publish("v2", "-- v2");
        h.publish("v3", "-- v3");
        let mut orchestrator = h.orchestrator();

        let outcome = orchestrator.run_cycle().await.unwrap();
        assert_eq!(outcome, CycleOutcome::Applied { version: "v3".into() });
        assert_eq!(orchestrator.last_applied(), Some("v3"));

        assert_eq!(h.differ.applied(), vec!["-- v3".to_string()]);
        assert!(h.store.contains("schemas/v3/completed"));
        assert!(!h.lock.inner.is_held());
        assert_eq!(h.lock.attempts(), 1);

        assert_eq!(h.hooks.commands(), vec!["before", "succeeded"]);
        let before = &h.hooks.calls()[0];
        assert_eq!(before.var("DB_SCHEMA_SYNC_VERSION"), Some("v3"));
        assert_eq!(before.var("DB_SCHEMA_SYNC_DRY_RUN"), Some("CREATE TABLE t3 ();"));
        assert_eq!(before.var("DB_SCHEMA_SYNC_S3_BUCKET"), Some("bucket"));
        assert_eq!(before.var("DB_SCHEMA_SYNC_APP_VERSION"), Some("1.2.3"));
    }

    #[tokio::test]
    async fn test_second_cycle_skips_not_newer() {
        let h = Harness::new(ScriptedDiffer::default());
        h.publish("v1", "-- v1");
        let mut orchestrator = h.orchestrator();
        orchestrator.run_cycle().await.unwrap();
        h.store.clear_operations();

        let outcome = orchestrator.run_cycle().await.unwrap();
        assert_eq!(
            outcome,
            CycleOutcome::Skipped {
                version: "v1".into(),
                reason: SkipReason::NotNewer
            }
        );
        assert_eq!(h.gets(), 0);
        assert_eq!(h.differ.applied().len(), 1);

        // A newer version is picked up on the next cycle.
        h.publish("v2", "-- v2");
        let outcome = orchestrator.run_cycle().await.unwrap();
        assert_eq!(outcome.version(), "v2");
        assert!(outcome.is_applied());
    }

    #[tokio::test]
    async fn test_listing_failures_escalate_at_threshold() {
        let h = Harness::new(ScriptedDiffer::default());
        h.publish("v1", "-- v1");
        h.store.fail_listing(true);
        let mut orchestrator = h.orchestrator();

        for expected in 1..=4u32 {
            let err = orchestrator.run_cycle().await.unwrap_err();
            assert!(err.is_fetch_failure());
            assert_eq!(orchestrator.consecutive_failures(), expected);
        }
        // Fired on the 3rd and 4th failure only.
        assert_eq!(h.hooks.count("fetch-error"), 2);
        let call = &h.hooks.calls()[0];
        assert!(call.var("DB_SCHEMA_SYNC_ERROR").is_some());
        assert_eq!(call.var("DB_SCHEMA_SYNC_PATH_PREFIX"), Some(PREFIX));

        h.store.fail_listing(false);
        orchestrator.run_cycle().await.unwrap();
        assert_eq!(orchestrator.consecutive_failures(), 0);

        h.store.fail_listing(true);
        orchestrator.run_cycle().await.unwrap_err();
        assert_eq!(orchestrator.consecutive_failures(), 1);
        assert_eq!(h.hooks.count("fetch-error"), 2);
    }

    #[tokio::test]
    async fn test_empty_prefix_counts_as_fetch_failure() {
        let h = Harness::new(ScriptedDiffer::default());
        let mut orchestrator = h.orchestrator();

        let err = orchestrator.run_cycle().await.unwrap_err();
        assert!(matches!(err, SyncError::Resolution(_)));
        assert_eq!(orchestrator.consecutive_failures(), 1);
    }

    #[tokio::test]
    async fn test_listing_success_resets_before_download_failure() {
        let h = Harness::new(ScriptedDiffer::default());
        h.publish("v1", "-- v1");
        h.store.fail_listing(true);
        let mut orchestrator = h.orchestrator();

        for _ in 0..2 {
            orchestrator.run_cycle().await.unwrap_err();
        }
        assert_eq!(orchestrator.consecutive_failures(), 2);

        h.store.fail_listing(false);
        h.store.inject_failure("schemas/v1/schema.sql");
        let err = orchestrator.run_cycle().await.unwrap_err();
        assert!(matches!(err, SyncError::FetchFailed { .. }));
        assert_eq!(orchestrator.consecutive_failures(), 1);
        assert_eq!(h.hooks.count("fetch-error"), 0);

        // Each cycle lists fine, so repeated download failures stay at 1.
        orchestrator.run_cycle().await.unwrap_err();
        orchestrator.run_cycle().await.unwrap_err();
        assert_eq!(orchestrator.consecutive_failures(), 1);
        assert_eq!(h.hooks.count("fetch-error"), 0);
        assert_eq!(h.lock.attempts(), 0);
    }

    #[tokio::test]
    async fn test_download_failure_escalates_with_version() {
        let h = Harness::new(ScriptedDiffer::default());
        h.publish("v1", "-- v1");
        h.store.inject_failure("schemas/v1/schema.sql");
        let mut orchestrator = h.orchestrator();
        orchestrator.failures = FailureTracker::new(1);

        let err = orchestrator.run_cycle().await.unwrap_err();
        assert!(matches!(err, SyncError::FetchFailed { .. }));
        assert_eq!(h.hooks.count("fetch-error"), 1);
        let call = h
            .hooks
            .calls()
            .into_iter()
            .find(|c| c.command == "fetch-error")
            .unwrap();
        assert_eq!(call.var("DB_SCHEMA_SYNC_VERSION"), Some("v1"));
        assert_eq!(h.lock.attempts(), 0);
    }

    #[tokio::test]
    async fn test_apply_failure_fires_hook_and_releases_lock() {
        let h = Harness::new(ScriptedDiffer::default().failing_apply("ERROR: syntax error"));
        h.publish("v1", "CREATE TABL x;");
        let mut orchestrator = h.orchestrator();

        let err = orchestrator.run_cycle().await.unwrap_err();
        assert!(matches!(err, SyncError::ApplyFailed { .. }));
        assert!(err.is_hard());

        assert_eq!(orchestrator.last_applied(), None);
        assert!(!h.store.contains("schemas/v1/completed"));
        assert!(!h.lock.inner.is_held());

        assert_eq!(h.hooks.commands(), vec!["before", "failed"]);
        let failed = &h.hooks.calls()[1];
        assert_eq!(failed.var("DB_SCHEMA_SYNC_VERSION"), Some("v1"));
        assert_eq!(failed.var("DB_SCHEMA_SYNC_STDERR"), Some("ERROR: syntax error"));
        assert!(failed.var("DB_SCHEMA_SYNC_ERROR").is_some());

        // Not remembered, so the next cycle retries.
        orchestrator.run_cycle().await.unwrap_err();
        assert_eq!(h.differ.applied().len(), 2);
    }

    #[tokio::test]
    async fn test_completed_marker_skips_without_download() {
        let h = Harness::new(ScriptedDiffer::default());
        h.publish("v1", "-- v1");
        h.store.insert("schemas/v1/completed", "");
        let mut orchestrator = h.orchestrator();

        let outcome = orchestrator.run_cycle().await.unwrap();
        assert_eq!(
            outcome,
            CycleOutcome::Skipped {
                version: "v1".into(),
                reason: SkipReason::AlreadyCompleted
            }
        );
        assert_eq!(orchestrator.last_applied(), Some("v1"));
        assert_eq!(h.gets(), 0);
        assert_eq!(h.lock.attempts(), 0);
        assert!(h.differ.calls().is_empty());
        assert!(h.hooks.calls().is_empty());
    }

    #[tokio::test]
    async fn test_lock_held_elsewhere_skips() {
        let h = Harness::new(ScriptedDiffer::default());
        h.publish("v1", "-- v1");
        let other = h.lock.inner.sibling("db");
        let held = match other.try_acquire().await.unwrap() {
            LockOutcome::Acquired(held) => held,
            LockOutcome::AlreadyHeld => panic!("lock should be free"),
        };
        let mut orchestrator = h.orchestrator();

        let outcome = orchestrator.run_cycle().await.unwrap();
        assert_eq!(
            outcome,
            CycleOutcome::Skipped {
                version: "v1".into(),
                reason: SkipReason::LockHeld
            }
        );
        assert!(h.differ.calls().is_empty());
        assert!(!h.store.contains("schemas/v1/completed"));
        assert_eq!(orchestrator.last_applied(), None);

        held.release().await.unwrap();
        assert!(orchestrator.run_cycle().await.unwrap().is_applied());
    }

    #[tokio::test]
    async fn test_plan_failure_does_not_block_apply() {
        let h = Harness::new(ScriptedDiffer::default().failing_plan());
        h.publish("v1", "-- v1");
        let mut orchestrator = h.orchestrator();

        assert!(orchestrator.run_cycle().await.unwrap().is_applied());
        let before = &h.hooks.calls()[0];
        assert_eq!(before.command, "before");
        assert_eq!(before.var("DB_SCHEMA_SYNC_DRY_RUN"), Some("connection refused"));
    }

    #[tokio::test]
    async fn test_plan_disabled_goes_straight_to_apply() {
        let mut h = Harness::new(ScriptedDiffer::default());
        h.config.apply.plan_before_apply = false;
        h.publish("v1", "-- v1");

        h.orchestrator().run_cycle().await.unwrap();
        assert_eq!(h.differ.calls(), vec![DifferCall::Apply("-- v1".into())]);
    }

    #[tokio::test]
    async fn test_export_uploaded_after_apply() {
        let mut h = Harness::new(ScriptedDiffer::default().exporting("CREATE TABLE t ();\n"));
        h.config.apply.export_after_apply = true;
        h.publish("v1", "-- v1");

        h.orchestrator().run_cycle().await.unwrap();
        assert_eq!(
            h.store.object("schemas/v1/exported.sql"),
            Some(Bytes::from("CREATE TABLE t ();\n"))
        );
        assert!(h.store.contains("schemas/v1/completed"));
    }

    #[tokio::test]
    async fn test_export_failure_still_marks_completed() {
        let mut h = Harness::new(ScriptedDiffer::default().failing_export());
        h.config.apply.export_after_apply = true;
        h.publish("v1", "-- v1");

        let outcome = h.orchestrator().run_cycle().await.unwrap();
        assert!(outcome.is_applied());
        assert!(!h.store.contains("schemas/v1/exported.sql"));
        assert!(h.store.contains("schemas/v1/completed"));
        assert_eq!(h.hooks.commands(), vec!["before", "succeeded"]);
    }

    #[tokio::test]
    async fn test_marker_check_error_falls_through_to_apply() {
        let h = Harness::new(ScriptedDiffer::default());
        h.publish("v1", "-- v1");
        h.store.inject_failure("schemas/v1/completed");
        let mut orchestrator = h.orchestrator();

        let outcome = orchestrator.run_cycle().await.unwrap();
        assert!(outcome.is_applied());
        // Marker write fails too, which only warns.
        assert!(!h.store.contains("schemas/v1/completed"));
        assert_eq!(orchestrator.last_applied(), Some("v1"));
    }

    #[tokio::test]
    async fn test_version_info_only_tracks_own_applies() {
        let h = Harness::new(ScriptedDiffer::default());
        h.publish("v1", "-- v1");
        h.store.insert("schemas/v1/completed", "");
        let mut orchestrator = h.orchestrator();

        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let _guard = ::metrics::set_default_local_recorder(&recorder);

        // v1 is learned from its marker, never applied here.
        orchestrator.run_cycle().await.unwrap();
        assert_eq!(orchestrator.last_applied(), Some("v1"));

        h.publish("v2", "-- v2");
        assert!(orchestrator.run_cycle().await.unwrap().is_applied());
        h.publish("v3", "-- v3");
        assert!(orchestrator.run_cycle().await.unwrap().is_applied());

        let rendered = handle.render();
        assert!(!rendered.contains(r#"version="v1""#));
        assert!(rendered.contains(r#"db_schema_sync_last_applied_version_info{version="v2"} 0"#));
        assert!(rendered.contains(r#"db_schema_sync_last_applied_version_info{version="v3"} 1"#));
    }

    #[tokio::test]
    async fn test_markers_disabled() {
        let mut h = Harness::new(ScriptedDiffer::default());
        h.config.store.completed_file = String::new();
        h.publish("v1", "-- v1");

        h.orchestrator().run_cycle().await.unwrap();
        let ops = h.store.operations();
        assert!(!ops.iter().any(|op| matches!(op, StoreOp::Head { .. })));
        assert!(!ops.iter().any(|op| matches!(op, StoreOp::Put { .. })));
    }

    #[tokio::test]
    async fn test_without_lock() {
        let h = Harness::new(ScriptedDiffer::default());
        h.publish("v1", "-- v1");
        let hooks = HookDispatcher::new(h.config.hooks.clone(), h.hooks.clone());
        let mut orchestrator = SyncOrchestrator::new(
            &h.config,
            "1.2.3",
            Arc::new(h.store.clone()),
            h.differ.clone(),
            hooks,
        );

        assert!(orchestrator.run_cycle().await.unwrap().is_applied());
        assert_eq!(h.lock.attempts(), 0);
    }

    #[tokio::test]
    async fn test_watch_fires_start_and_stops_on_shutdown() {
        let h = Harness::new(ScriptedDiffer::default());
        h.publish("v1", "-- v1");
        let mut orchestrator = h.orchestrator();

        orchestrator
            .watch(Duration::from_secs(3600), std::future::ready(()))
            .await;

        assert_eq!(h.hooks.commands(), vec!["start", "before", "succeeded"]);
        assert_eq!(orchestrator.last_applied(), Some("v1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_keeps_polling_after_errors() {
        let h = Harness::new(ScriptedDiffer::default());
        h.store.fail_listing(true);
        let mut orchestrator = h.orchestrator();

        orchestrator
            .watch(
                Duration::from_secs(60),
                tokio::time::sleep(Duration::from_secs(150)),
            )
            .await;

        // Cycles at t=0, 60, 120; shutdown observed during the sleep after.
        assert_eq!(orchestrator.consecutive_failures(), 3);
        assert_eq!(h.hooks.count("fetch-error"), 1);
    }
}
