//! # Schema Applier
//!
//! Runs the external schema differ (`psqldef`) as a subprocess.
//!
//! ## Invocations
//! ```text
//! ┌──────────────┬──────────────────────────────────────────────────────────┐
//! │ Mode         │ Command line                                             │
//! ├──────────────┼──────────────────────────────────────────────────────────┤
//! │ plan         │ psqldef -U u -h h -p p db --dry-run --file <tmp>         │
//! │ apply        │ psqldef -U u -h h -p p db --file <tmp>                   │
//! │ export       │ psqldef -U u -h h -p p db --export                       │
//! │ offline plan │ psqldef <current.sql>   (desired schema on stdin)        │
//! └──────────────┴──────────────────────────────────────────────────────────┘
//! ```
//!
//! The password travels in `PGPASSWORD`, never on the command line. Schema
//! text is written to a temporary file that is removed on every exit path.
//! Every invocation is bounded by the differ timeout; the child is killed
//! when it expires.

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tempfile::NamedTempFile;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::DatabaseSettings;
use crate::error::{SyncError, SyncResult};

/// Output captured from an apply run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyOutput {
    pub stdout: String,
    pub stderr: String,
}

/// The schema differencing tool.
#[async_trait]
pub trait Differ: Send + Sync {
    /// Returns the DDL an apply would run, without touching the database.
    /// A non-zero exit is `PlanFailed` carrying the combined output.
    async fn plan(&self, schema: &[u8]) -> SyncResult<String>;

    /// Applies `schema`. A non-zero exit is `ApplyFailed` carrying the output.
    async fn apply(&self, schema: &[u8]) -> SyncResult<ApplyOutput>;

    /// Dumps the live schema.
    async fn export(&self) -> SyncResult<Bytes>;

    /// Diffs two schema texts with no database involved.
    async fn offline_plan(&self, current: &[u8], desired: &[u8]) -> SyncResult<String>;
}

// =============================================================================
// psqldef
// =============================================================================

/// [`Differ`] backed by the `psqldef` executable.
#[derive(Debug, Clone)]
pub struct PsqldefDiffer {
    bin: String,
    database: Option<DatabaseSettings>,
    timeout: Duration,
}

impl PsqldefDiffer {
    /// A differ for offline plans only.
    pub fn new(bin: impl Into<String>, timeout: Duration) -> Self {
        PsqldefDiffer {
            bin: bin.into(),
            database: None,
            timeout,
        }
    }

    /// Targets a live database for plan, apply and export.
    pub fn with_database(mut self, database: DatabaseSettings) -> Self {
        self.database = Some(database);
        self
    }

    fn target_args(&self) -> SyncResult<Vec<String>> {
        let db = self.database.as_ref().ok_or_else(|| {
            SyncError::InvalidConfig("differ has no target database".into())
        })?;
        Ok(vec![
            "-U".into(),
            db.user.clone(),
            "-h".into(),
            db.host.clone(),
            "-p".into(),
            db.port.to_string(),
            db.name.clone(),
        ])
    }

    fn command(&self, args: &[String]) -> Command {
        let mut cmd = Command::new(&self.bin);
        cmd.args(args).kill_on_drop(true);
        if let Some(db) = self.database.as_ref().filter(|db| !db.password.is_empty()) {
            cmd.env("PGPASSWORD", &db.password);
        }
        cmd
    }

    /// Runs to completion with stdout and stderr captured.
    async fn run_captured(
        &self,
        args: &[String],
        stdin: Option<&[u8]>,
    ) -> SyncResult<CapturedRun> {
        let mut cmd = self.command(args);
        cmd.stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|e| SyncError::DifferFailed(format!("failed to start {}: {}", self.bin, e)))?;

        // Feed stdin concurrently so a chatty child cannot deadlock us.
        if let (Some(mut pipe), Some(input)) = (child.stdin.take(), stdin) {
            let input = input.to_vec();
            tokio::spawn(async move {
                if let Err(e) = pipe.write_all(&input).await {
                    debug!(error = %e, "Differ closed stdin early");
                }
            });
        }

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| SyncError::DifferFailed(self.timed_out()))??;

        Ok(CapturedRun {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    fn timed_out(&self) -> String {
        format!(
            "{} timed out after {}",
            self.bin,
            humantime::format_duration(self.timeout)
        )
    }
}

struct CapturedRun {
    status: ExitStatus,
    stdout: String,
    stderr: String,
}

impl CapturedRun {
    fn failure(&self, bin: &str) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            format!("{} exited with {}", bin, self.status)
        } else {
            format!("{} exited with {}: {}", bin, self.status, stderr)
        }
    }
}

/// Writes schema text to a temp file removed when the handle drops.
async fn materialize(prefix: &str, schema: &[u8]) -> SyncResult<NamedTempFile> {
    let file = tempfile::Builder::new()
        .prefix(prefix)
        .suffix(".sql")
        .tempfile()?;
    tokio::fs::write(file.path(), schema).await?;
    Ok(file)
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Copies a child stream to `sink`, keeping a copy in `captured`.
///
/// `captured` holds everything read so far even if the future is dropped.
async fn tee<R, W>(mut reader: R, mut sink: W, captured: &mut Vec<u8>) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = [0u8; 8192];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        captured.extend_from_slice(&buf[..n]);
        sink.write_all(&buf[..n]).await?;
        sink.flush().await?;
    }
}

#[async_trait]
impl Differ for PsqldefDiffer {
    async fn plan(&self, schema: &[u8]) -> SyncResult<String> {
        let file = materialize("schema-", schema).await?;
        let mut args = self.target_args()?;
        args.extend(["--dry-run".into(), "--file".into(), path_arg(file.path())]);

        let run = self.run_captured(&args, None).await?;
        if !run.status.success() {
            return Err(SyncError::PlanFailed {
                message: run.failure(&self.bin),
                output: format!("{}{}", run.stdout, run.stderr),
            });
        }
        Ok(run.stdout)
    }

    async fn apply(&self, schema: &[u8]) -> SyncResult<ApplyOutput> {
        let file = materialize("schema-", schema).await?;
        let mut args = self.target_args()?;
        args.extend(["--file".into(), path_arg(file.path())]);

        let apply_failed = |message: String, output: ApplyOutput| SyncError::ApplyFailed { message, output };

        let mut cmd = self.command(&args);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        info!(bin = %self.bin, "Applying schema");
        let mut child = cmd.spawn().map_err(|e| {
            apply_failed(format!("failed to start {}: {}", self.bin, e), ApplyOutput::default())
        })?;

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            return Err(apply_failed(
                "differ output pipes unavailable".into(),
                ApplyOutput::default(),
            ));
        };

        let mut out = Vec::new();
        let mut err = Vec::new();
        let run = async {
            tokio::try_join!(
                tee(stdout, tokio::io::stdout(), &mut out),
                tee(stderr, tokio::io::stderr(), &mut err),
                child.wait(),
            )
        };
        let finished = tokio::time::timeout(self.timeout, run).await;

        let output = ApplyOutput {
            stdout: String::from_utf8_lossy(&out).into_owned(),
            stderr: String::from_utf8_lossy(&err).into_owned(),
        };
        let status = match finished {
            Ok(Ok((_, _, status))) => status,
            Ok(Err(e)) => {
                return Err(apply_failed(format!("{} I/O error: {}", self.bin, e), output))
            }
            Err(_) => {
                if let Err(e) = child.kill().await {
                    debug!(error = %e, "Failed to kill timed out differ");
                }
                return Err(apply_failed(self.timed_out(), output));
            }
        };

        if !status.success() {
            return Err(apply_failed(
                format!("{} exited with {}", self.bin, status),
                output,
            ));
        }
        Ok(output)
    }

    async fn export(&self) -> SyncResult<Bytes> {
        let mut args = self.target_args()?;
        args.push("--export".into());

        let run = self
            .run_captured(&args, None)
            .await
            .map_err(|e| SyncError::ExportFailed(e.to_string()))?;
        if !run.status.success() {
            return Err(SyncError::ExportFailed(run.failure(&self.bin)));
        }
        Ok(Bytes::from(run.stdout))
    }

    async fn offline_plan(&self, current: &[u8], desired: &[u8]) -> SyncResult<String> {
        let file = materialize("current-", current).await?;
        let args = vec![path_arg(file.path())];

        let run = self.run_captured(&args, Some(desired)).await?;
        if !run.status.success() {
            return Err(SyncError::DifferFailed(run.failure(&self.bin)));
        }
        Ok(run.stdout)
    }
}
