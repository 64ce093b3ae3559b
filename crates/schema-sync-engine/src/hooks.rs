//! # Hook Dispatcher
//!
//! Runs operator commands at lifecycle points. A hook never fails a cycle:
//! errors and timeouts are logged and swallowed here.
//!
//! ## Dispatch
//! ```text
//! fire(event, ctx)
//!    │
//!    ├── no command configured ──► return
//!    │
//!    ▼
//! HookRunner::run(command, ctx.env_vars())    ShellHookRunner: sh -c <command>
//!    │                                        inherits env + stdio, bounded
//!    ├── Ok  ──► info
//!    └── Err ──► error log, cycle continues
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use schema_sync_core::{HookContext, HookEvent};
use tokio::process::Command;
use tracing::{error, info};

use crate::config::HookSettings;
use crate::error::{SyncError, SyncResult};

/// Executes one hook command with extra environment variables.
#[async_trait]
pub trait HookRunner: Send + Sync {
    async fn run(&self, command: &str, env: &[(String, String)]) -> SyncResult<()>;
}

// =============================================================================
// Shell Runner
// =============================================================================

/// Runs hooks through `sh -c`.
#[derive(Debug, Clone)]
pub struct ShellHookRunner {
    timeout: Duration,
}

impl ShellHookRunner {
    pub fn new(timeout: Duration) -> Self {
        ShellHookRunner { timeout }
    }
}

#[async_trait]
impl HookRunner for ShellHookRunner {
    async fn run(&self, command: &str, env: &[(String, String)]) -> SyncResult<()> {
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SyncError::HookFailed(format!("failed to start sh: {}", e)))?;

        let status = tokio::time::timeout(self.timeout, child.wait())
            .await
            .map_err(|_| {
                SyncError::HookFailed(format!(
                    "timed out after {}",
                    humantime::format_duration(self.timeout)
                ))
            })?
            .map_err(|e| SyncError::HookFailed(e.to_string()))?;

        if !status.success() {
            return Err(SyncError::HookFailed(format!("exited with {}", status)));
        }
        Ok(())
    }
}

// =============================================================================
// Dispatcher
// =============================================================================

/// Maps events to configured commands and runs them.
#[derive(Clone)]
pub struct HookDispatcher {
    settings: HookSettings,
    runner: Arc<dyn HookRunner>,
}

impl HookDispatcher {
    pub fn new(settings: HookSettings, runner: Arc<dyn HookRunner>) -> Self {
        HookDispatcher { settings, runner }
    }

    /// Dispatcher running real shell commands.
    pub fn shell(settings: HookSettings) -> Self {
        let runner = Arc::new(ShellHookRunner::new(settings.timeout));
        Self::new(settings, runner)
    }

    /// Runs the hook for `event`, if one is configured.
    pub async fn fire(&self, event: HookEvent, ctx: &HookContext) {
        let Some(command) = self.settings.command(event) else {
            return;
        };

        info!(hook = %event, "Running hook");
        match self.runner.run(command, &ctx.env_vars()).await {
            Ok(()) => info!(hook = %event, "Hook finished"),
            Err(e) => error!(hook = %event, error = %e, "Hook command failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingRunner {
        calls: Mutex<Vec<(String, Vec<(String, String)>)>>,
        fail: bool,
    }

    #[async_trait]
    impl HookRunner for RecordingRunner {
        async fn run(&self, command: &str, env: &[(String, String)]) -> SyncResult<()> {
            self.calls
                .lock()
                .unwrap()
                .push((command.to_string(), env.to_vec()));
            if self.fail {
                return Err(SyncError::HookFailed("exited with 1".into()));
            }
            Ok(())
        }
    }

    fn settings() -> HookSettings {
        HookSettings {
            on_apply_failed: "notify failed".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_fire_skips_unconfigured() {
        let runner = Arc::new(RecordingRunner::default());
        let dispatcher = HookDispatcher::new(settings(), runner.clone());

        dispatcher.fire(HookEvent::Start, &HookContext::default()).await;
        assert!(runner.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fire_passes_context_env() {
        let runner = Arc::new(RecordingRunner::default());
        let dispatcher = HookDispatcher::new(settings(), runner.clone());

        let ctx = HookContext::default()
            .with_version("v2")
            .with_error("boom");
        dispatcher.fire(HookEvent::ApplyFailed, &ctx).await;

        let calls = runner.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "notify failed");
        assert!(calls[0]
            .1
            .contains(&("DB_SCHEMA_SYNC_VERSION".to_string(), "v2".to_string())));
        assert!(calls[0]
            .1
            .contains(&("DB_SCHEMA_SYNC_ERROR".to_string(), "boom".to_string())));
    }

    #[tokio::test]
    async fn test_fire_swallows_failures() {
        let runner = Arc::new(RecordingRunner {
            fail: true,
            ..Default::default()
        });
        let dispatcher = HookDispatcher::new(settings(), runner.clone());
        dispatcher
            .fire(HookEvent::ApplyFailed, &HookContext::default())
            .await;
        assert_eq!(runner.calls.lock().unwrap().len(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_shell_runner_sees_env() {
        let dir = tempfile::TempDir::new().unwrap();
        let out = dir.path().join("out.txt");
        let command = format!("echo \"$DB_SCHEMA_SYNC_VERSION\" > {}", out.display());

        let runner = ShellHookRunner::new(Duration::from_secs(10));
        runner
            .run(
                &command,
                &[("DB_SCHEMA_SYNC_VERSION".to_string(), "v7".to_string())],
            )
            .await
            .unwrap();
        assert_eq!(std::fs::read_to_string(out).unwrap(), "v7\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_shell_runner_errors() {
        let runner = ShellHookRunner::new(Duration::from_millis(200));
        let err = runner.run("exit 3", &[]).await.unwrap_err();
        assert!(matches!(err, SyncError::HookFailed(_)));

        let err = runner.run("sleep 5", &[]).await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }
}
