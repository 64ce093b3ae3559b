//! # Hook Context
//!
//! The snapshot handed to lifecycle hooks and its environment mapping.
//!
//! ## Environment Variables
//! ```text
//! ┌──────────────────────────────────┬──────────────────────────────────┐
//! │ Variable                         │ Source                           │
//! ├──────────────────────────────────┼──────────────────────────────────┤
//! │ DB_SCHEMA_SYNC_S3_BUCKET         │ bucket                           │
//! │ DB_SCHEMA_SYNC_PATH_PREFIX       │ path_prefix                      │
//! │ DB_SCHEMA_SYNC_SCHEMA_FILE       │ schema_file                      │
//! │ DB_SCHEMA_SYNC_COMPLETED_FILE    │ completed_file                   │
//! │ DB_SCHEMA_SYNC_VERSION           │ version being applied            │
//! │ DB_SCHEMA_SYNC_ERROR             │ error text                       │
//! │ DB_SCHEMA_SYNC_APP_VERSION       │ engine version                   │
//! │ DB_SCHEMA_SYNC_STDOUT            │ captured differ stdout           │
//! │ DB_SCHEMA_SYNC_STDERR            │ captured differ stderr           │
//! │ DB_SCHEMA_SYNC_DRY_RUN           │ planned DDL                      │
//! └──────────────────────────────────┴──────────────────────────────────┘
//! ```
//!
//! Empty values are left out entirely.

use std::fmt;

/// Namespace shared by every hook variable.
pub const HOOK_ENV_PREFIX: &str = "DB_SCHEMA_SYNC_";

// =============================================================================
// Hook Event
// =============================================================================

/// Lifecycle points at which a hook may fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookEvent {
    Start,
    /// Fetch failed and the failure count is at or above the threshold.
    FetchError,
    BeforeApply,
    ApplyFailed,
    ApplySucceeded,
}

impl HookEvent {
    pub fn name(self) -> &'static str {
        match self {
            HookEvent::Start => "on-start",
            HookEvent::FetchError => "on-s3-fetch-error",
            HookEvent::BeforeApply => "on-before-apply",
            HookEvent::ApplyFailed => "on-apply-failed",
            HookEvent::ApplySucceeded => "on-apply-succeeded",
        }
    }
}

impl fmt::Display for HookEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Hook Context
// =============================================================================

/// Immutable snapshot passed to whichever hook fires.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HookContext {
    pub bucket: String,
    pub path_prefix: String,
    pub schema_file: String,
    pub completed_file: String,
    pub version: String,
    pub error: String,
    pub app_version: String,
    pub stdout: String,
    pub stderr: String,
    /// DDL reported by the plan step.
    pub dry_run: String,
}

impl HookContext {
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = error.into();
        self
    }

    pub fn with_output(mut self, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        self.stdout = stdout.into();
        self.stderr = stderr.into();
        self
    }

    pub fn with_dry_run(mut self, ddl: impl Into<String>) -> Self {
        self.dry_run = ddl.into();
        self
    }

    /// Maps the context to `(name, value)` pairs, skipping empty values.
    pub fn env_vars(&self) -> Vec<(String, String)> {
        [
            ("S3_BUCKET", &self.bucket),
            ("PATH_PREFIX", &self.path_prefix),
            ("SCHEMA_FILE", &self.schema_file),
            ("COMPLETED_FILE", &self.completed_file),
            ("VERSION", &self.version),
            ("ERROR", &self.error),
            ("APP_VERSION", &self.app_version),
            ("STDOUT", &self.stdout),
            ("STDERR", &self.stderr),
            ("DRY_RUN", &self.dry_run),
        ]
        .into_iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(name, value)| (format!("{HOOK_ENV_PREFIX}{name}"), value.clone()))
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup<'a>(vars: &'a [(String, String)], name: &str) -> Option<&'a str> {
        vars.iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn test_env_vars_skip_empty() {
        let ctx = HookContext {
            bucket: "my-bucket".into(),
            path_prefix: "schemas/".into(),
            schema_file: "schema.sql".into(),
            completed_file: "completed".into(),
            app_version: "1.0.0".into(),
            ..Default::default()
        };
        let vars = ctx.env_vars();

        assert_eq!(vars.len(), 5);
        assert_eq!(lookup(&vars, "DB_SCHEMA_SYNC_S3_BUCKET"), Some("my-bucket"));
        assert_eq!(lookup(&vars, "DB_SCHEMA_SYNC_PATH_PREFIX"), Some("schemas/"));
        assert_eq!(lookup(&vars, "DB_SCHEMA_SYNC_APP_VERSION"), Some("1.0.0"));
        assert_eq!(lookup(&vars, "DB_SCHEMA_SYNC_VERSION"), None);
        assert_eq!(lookup(&vars, "DB_SCHEMA_SYNC_ERROR"), None);
    }

    #[test]
    fn test_env_vars_apply_failure() {
        let ctx = HookContext::default()
            .with_version("v3")
            .with_error("psqldef exited with status 1")
            .with_output("", "syntax error")
            .with_dry_run("ALTER TABLE users ADD COLUMN age int;");
        let vars = ctx.env_vars();

        assert_eq!(lookup(&vars, "DB_SCHEMA_SYNC_VERSION"), Some("v3"));
        assert_eq!(
            lookup(&vars, "DB_SCHEMA_SYNC_ERROR"),
            Some("psqldef exited with status 1")
        );
        assert_eq!(lookup(&vars, "DB_SCHEMA_SYNC_STDERR"), Some("syntax error"));
        assert_eq!(lookup(&vars, "DB_SCHEMA_SYNC_STDOUT"), None);
        assert!(lookup(&vars, "DB_SCHEMA_SYNC_DRY_RUN").is_some());
    }

    #[test]
    fn test_event_names() {
        assert_eq!(HookEvent::Start.to_string(), "on-start");
        assert_eq!(HookEvent::FetchError.name(), "on-s3-fetch-error");
        assert_eq!(HookEvent::ApplySucceeded.name(), "on-apply-succeeded");
    }
}
