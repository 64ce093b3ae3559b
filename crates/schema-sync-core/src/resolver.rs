//! # Version Resolution
//!
//! Picks the highest-ordered artifact out of a flat key listing.
//!
//! ## Resolution Flow
//! ```text
//! listing ──► filter by basename ──► version token ──► find_max_version
//!                  │                     │                   │
//!                  │ (none left)         │ "." or "/"        │ (none parse)
//!                  ▼                     ▼ dropped           ▼
//!             NoCandidates                              NoValidVersions
//! ```
//!
//! The completed variant additionally requires the sibling marker key to be
//! present in the same listing.

use std::collections::HashSet;

use crate::error::{CoreError, CoreResult};
use crate::keys::{artifact_key, marker_key, version_token};
use crate::version::find_max_version;

/// Outcome of a successful resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Artifact key of the winning version.
    pub key: String,
    /// Version token (directory name) of the winning version.
    pub version: String,
    /// Tokens dropped because they did not parse.
    pub skipped: Vec<String>,
}

/// Resolves the latest version whose directory contains `schema_file`.
pub fn resolve_latest<S: AsRef<str>>(
    keys: &[S],
    prefix: &str,
    schema_file: &str,
) -> CoreResult<Resolution> {
    let tokens: Vec<&str> = keys
        .iter()
        .filter_map(|k| version_token(k.as_ref(), schema_file))
        .collect();
    rank(tokens, prefix, schema_file)
}

/// Resolves the latest version that also carries a completion marker.
pub fn resolve_latest_completed<S: AsRef<str>>(
    keys: &[S],
    prefix: &str,
    schema_file: &str,
    completed_file: &str,
) -> CoreResult<Resolution> {
    let present: HashSet<&str> = keys.iter().map(|k| k.as_ref()).collect();
    let tokens: Vec<&str> = keys
        .iter()
        .map(|k| k.as_ref())
        .filter(|k| present.contains(marker_key(k, completed_file).as_str()))
        .filter_map(|k| version_token(k, schema_file))
        .collect();
    rank(tokens, prefix, schema_file)
}

fn rank(tokens: Vec<&str>, prefix: &str, schema_file: &str) -> CoreResult<Resolution> {
    if tokens.is_empty() {
        return Err(CoreError::no_candidates(prefix, schema_file));
    }

    let max = find_max_version(&tokens)?;
    Ok(Resolution {
        key: artifact_key(prefix, &max.version, schema_file),
        version: max.version,
        skipped: max.skipped,
    })
}
