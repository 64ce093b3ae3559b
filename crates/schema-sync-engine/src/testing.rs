//! Collaborator fakes shared by the engine's unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;

use crate::differ::{ApplyOutput, Differ};
use crate::error::{SyncError, SyncResult};
use crate::hooks::HookRunner;
use crate::lock::{ApplyLock, LockOutcome, MemoryApplyLock};

// =============================================================================
// Hooks
// =============================================================================

/// Records every hook run instead of spawning a shell.
#[derive(Default)]
pub struct RecordingHookRunner {
    calls: Mutex<Vec<HookCall>>,
}

#[derive(Debug, Clone)]
pub struct HookCall {
    pub command: String,
    pub env: Vec<(String, String)>,
}

impl HookCall {
    pub fn var(&self, name: &str) -> Option<&str> {
        self.env
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

impl RecordingHookRunner {
    pub fn calls(&self) -> Vec<HookCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn commands(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.command).collect()
    }

    pub fn count(&self, command: &str) -> usize {
        self.calls().iter().filter(|c| c.command == command).count()
    }
}

#[async_trait]
impl HookRunner for RecordingHookRunner {
    async fn run(&self, command: &str, env: &[(String, String)]) -> SyncResult<()> {
        self.calls.lock().unwrap().push(HookCall {
            command: command.to_string(),
            env: env.to_vec(),
        });
        Ok(())
    }
}

// =============================================================================
// Differ
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DifferCall {
    Plan(String),
    Apply(String),
    Export,
    OfflinePlan { current: String, desired: String },
}

/// Differ returning canned results.
pub struct ScriptedDiffer {
    pub plan: Mutex<Result<String, String>>,
    pub apply: Mutex<Result<ApplyOutput, ApplyOutput>>,
    pub export: Mutex<Result<String, String>>,
    calls: Mutex<Vec<DifferCall>>,
}

impl Default for ScriptedDiffer {
    fn default() -> Self {
        ScriptedDiffer {
            plan: Mutex::new(Ok(String::new())),
            apply: Mutex::new(Ok(ApplyOutput::default())),
            export: Mutex::new(Ok(String::new())),
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl ScriptedDiffer {
    pub fn planning(self, ddl: &str) -> Self {
        *self.plan.lock().unwrap() = Ok(ddl.to_string());
        self
    }

    pub fn failing_plan(self) -> Self {
        *self.plan.lock().unwrap() = Err("connection refused".to_string());
        self
    }

    pub fn failing_apply(self, stderr: &str) -> Self {
        *self.apply.lock().unwrap() = Err(ApplyOutput {
            stdout: String::new(),
            stderr: stderr.to_string(),
        });
        self
    }

    pub fn exporting(self, schema: &str) -> Self {
        *self.export.lock().unwrap() = Ok(schema.to_string());
        self
    }

    pub fn failing_export(self) -> Self {
        *self.export.lock().unwrap() = Err("permission denied".to_string());
        self
    }

    pub fn calls(&self) -> Vec<DifferCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn applied(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                DifferCall::Apply(schema) => Some(schema),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: DifferCall) {
        self.calls.lock().unwrap().push(call);
    }
}

fn text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

#[async_trait]
impl Differ for ScriptedDiffer {
    async fn plan(&self, schema: &[u8]) -> SyncResult<String> {
        self.record(DifferCall::Plan(text(schema)));
        self.plan
            .lock()
            .unwrap()
            .clone()
            .map_err(|output| SyncError::PlanFailed {
                message: "psqldef exited with exit status: 1".to_string(),
                output,
            })
    }

    async fn apply(&self, schema: &[u8]) -> SyncResult<ApplyOutput> {
        self.record(DifferCall::Apply(text(schema)));
        self.apply
            .lock()
            .unwrap()
            .clone()
            .map_err(|output| SyncError::ApplyFailed {
                message: "psqldef exited with exit status: 1".to_string(),
                output,
            })
    }

    async fn export(&self) -> SyncResult<Bytes> {
        self.record(DifferCall::Export);
        self.export
            .lock()
            .unwrap()
            .clone()
            .map(Bytes::from)
            .map_err(SyncError::ExportFailed)
    }

    async fn offline_plan(&self, current: &[u8], desired: &[u8]) -> SyncResult<String> {
        self.record(DifferCall::OfflinePlan {
            current: text(current),
            desired: text(desired),
        });
        self.plan
            .lock()
            .unwrap()
            .clone()
            .map_err(SyncError::DifferFailed)
    }
}

// =============================================================================
// Lock
// =============================================================================

/// Memory lock that counts attempts.
#[derive(Clone)]
pub struct CountingLock {
    pub inner: MemoryApplyLock,
    attempts: Arc<AtomicUsize>,
}

impl CountingLock {
    pub fn new(inner: MemoryApplyLock) -> Self {
        CountingLock {
            inner,
            attempts: Arc::default(),
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ApplyLock for CountingLock {
    async fn try_acquire(&self) -> SyncResult<LockOutcome> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.inner.try_acquire().await
    }
}
