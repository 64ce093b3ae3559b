//! # Object Key Layout
//!
//! Every artifact lives in its own version directory under the prefix:
//!
//! ```text
//! {prefix}{version}/{schema_file}      # default schema_file = "schema.sql"
//! {prefix}{version}/{completed_file}   # default "completed", empty body
//! {prefix}{version}/exported.sql       # optional post-apply snapshot
//! ```
//!
//! Directory helpers follow slash-separated path semantics: the parent of a
//! key with no slash is `.` and the parent of `/x` is `/`.

/// File name of the post-apply snapshot.
pub const EXPORTED_FILE_NAME: &str = "exported.sql";

/// Ensures a non-empty prefix ends with `/`.
pub fn normalize_prefix(prefix: &str) -> String {
    if prefix.is_empty() || prefix.ends_with('/') {
        prefix.to_string()
    } else {
        format!("{prefix}/")
    }
}

/// Joins path segments with `/`, dropping empty segments and duplicate slashes.
///
/// A leading `/` on the first non-empty segment is kept.
fn join(segments: &[&str]) -> String {
    let rooted = segments
        .iter()
        .find(|s| !s.is_empty())
        .is_some_and(|s| s.starts_with('/'));
    let joined = segments
        .iter()
        .flat_map(|s| s.split('/'))
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/");
    if rooted {
        format!("/{joined}")
    } else {
        joined
    }
}

/// Returns the directory part of a key.
pub fn parent_dir(key: &str) -> &str {
    let trimmed = key.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) => "/",
        Some(idx) => trimmed[..idx].trim_end_matches('/'),
        None => ".",
    }
}

/// Returns the last segment of a path.
pub fn base_name(path: &str) -> &str {
    if path == "/" {
        return "/";
    }
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(idx) => &trimmed[idx + 1..],
        None => trimmed,
    }
}

/// Builds `prefix + version + schema_file`.
///
/// ## Example
/// ```rust
/// use schema_sync_core::keys::artifact_key;
///
/// assert_eq!(artifact_key("schemas/", "v3", "schema.sql"), "schemas/v3/schema.sql");
/// ```
pub fn artifact_key(prefix: &str, version: &str, schema_file: &str) -> String {
    join(&[prefix, version, schema_file])
}

/// Builds a sibling key in the artifact's version directory.
fn sibling_key(artifact_key: &str, file_name: &str) -> String {
    match parent_dir(artifact_key) {
        "." => join(&[file_name]),
        "/" => format!("/{}", join(&[file_name])),
        dir => join(&[dir, file_name]),
    }
}

/// Builds the completion marker key for an artifact.
///
/// Applying it to its own output yields the same key.
pub fn marker_key(artifact_key: &str, completed_file: &str) -> String {
    sibling_key(artifact_key, completed_file)
}

/// Builds the exported snapshot key for an artifact.
pub fn exported_key(artifact_key: &str) -> String {
    sibling_key(artifact_key, EXPORTED_FILE_NAME)
}

/// Extracts the version token from a key whose basename is `schema_file`.
///
/// Returns `None` for keys with another basename and for keys sitting at
/// the root (version `.` or `/`).
pub fn version_token<'a>(key: &'a str, schema_file: &str) -> Option<&'a str> {
    if base_name(key) != schema_file {
        return None;
    }
    match base_name(parent_dir(key)) {
        "." | "/" | "" => None,
        token => Some(token),
    }
}
