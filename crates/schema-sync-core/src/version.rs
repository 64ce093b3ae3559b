//! # Version Tokens
//!
//! Parsing and ordering of the directory segment that names an artifact
//! version.
//!
//! ## Accepted Grammar
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Version Token Grammar                              │
//! │                                                                         │
//! │  [v] SEGMENT ( . SEGMENT )* [ [-] PRERELEASE ] [ + METADATA ]          │
//! │  (the hyphen is optional when PRERELEASE starts with a letter)         │
//! │                                                                         │
//! │  v1              → [1]                                                  │
//! │  v10             → [10]                (v10 > v9, numeric)              │
//! │  1.10.0          → [1, 10, 0]          (1.10.0 > 1.9.0)                 │
//! │  v2.0.0-rc.1     → [2, 0, 0] pre "rc.1" (lower than v2.0.0)             │
//! │  v2beta          → [2] pre "beta"       (lower than v2)                 │
//! │  20240101120000  → [20240101120000]    (timestamps order naturally)     │
//! │  latest          → ✗ unparseable                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Two Failure Policies
//! - [`find_max_version`] drops unparseable tokens and reports them back as
//!   `skipped`; it only fails when nothing parses.
//! - [`compare_versions`] never fails: if either side is unparseable it
//!   orders the raw strings byte-wise.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{CoreError, CoreResult};

const VERSION_PATTERN: &str = concat!(
    r"^v?(?P<segments>[0-9]+(?:\.[0-9]+)*)",
    r"(?:-(?P<pre>[0-9A-Za-z\-~]+(?:\.[0-9A-Za-z\-~]+)*)",
    r"|(?P<bare_pre>[A-Za-z~][0-9A-Za-z\-~]*(?:\.[0-9A-Za-z\-~]+)*))?",
    r"(?:\+(?P<meta>[0-9A-Za-z\-~]+(?:\.[0-9A-Za-z\-~]+)*))?$",
);

fn version_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // The pattern is a compile-time constant covered by the tests below.
    RE.get_or_init(|| Regex::new(VERSION_PATTERN).expect("version pattern is valid"))
}

// =============================================================================
// Version
// =============================================================================

/// A parsed version token.
///
/// Equality and ordering ignore build metadata and trailing zero segments,
/// so `v1` and `1.0.0` compare equal.
#[derive(Debug, Clone)]
pub struct Version {
    /// Numeric release segments.
    segments: Vec<u64>,
    /// Dot-separated pre-release identifiers (empty for a release).
    prerelease: Vec<String>,
    /// Token exactly as it appeared in the object key.
    original: String,
}

impl Version {
    /// Parses a version token.
    ///
    /// ## Example
    /// ```rust
    /// use schema_sync_core::version::Version;
    ///
    /// let v10 = Version::parse("v10").unwrap();
    /// let v9 = Version::parse("v9").unwrap();
    /// assert!(v10 > v9);
    /// assert!(Version::parse("latest").is_err());
    /// ```
    pub fn parse(token: &str) -> CoreResult<Self> {
        let caps = version_regex()
            .captures(token)
            .ok_or_else(|| CoreError::InvalidVersion(token.to_string()))?;

        let segments = caps["segments"]
            .split('.')
            .map(|s| s.parse::<u64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| CoreError::InvalidVersion(token.to_string()))?;

        let prerelease = caps
            .name("pre")
            .or_else(|| caps.name("bare_pre"))
            .map(|m| m.as_str().split('.').map(str::to_string).collect())
            .unwrap_or_default();

        Ok(Version {
            segments,
            prerelease,
            original: token.to_string(),
        })
    }

    /// Returns the token as written.
    pub fn as_str(&self) -> &str {
        &self.original
    }

    /// Returns the numeric release segments.
    pub fn segments(&self) -> &[u64] {
        &self.segments
    }

    /// Returns true if the token carries a pre-release suffix.
    pub fn is_prerelease(&self) -> bool {
        !self.prerelease.is_empty()
    }
}

impl FromStr for Version {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Version::parse(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.original)
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.segments.len().max(other.segments.len());
        for i in 0..len {
            let a = self.segments.get(i).copied().unwrap_or(0);
            let b = other.segments.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }
        compare_prerelease(&self.prerelease, &other.prerelease)
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

/// A release sorts above any of its pre-releases.
fn compare_prerelease(a: &[String], b: &[String]) -> Ordering {
    match (a.is_empty(), b.is_empty()) {
        (true, true) => return Ordering::Equal,
        (true, false) => return Ordering::Greater,
        (false, true) => return Ordering::Less,
        (false, false) => {}
    }

    for (x, y) in a.iter().zip(b.iter()) {
        let ord = match (x.parse::<u64>(), y.parse::<u64>()) {
            (Ok(n), Ok(m)) => n.cmp(&m),
            // Numeric identifiers have lower precedence than alphanumeric ones.
            (Ok(_), Err(_)) => Ordering::Less,
            (Err(_), Ok(_)) => Ordering::Greater,
            (Err(_), Err(_)) => x.cmp(y),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.len().cmp(&b.len())
}

// =============================================================================
// Ranking
// =============================================================================

/// Result of ranking a set of version tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaxVersion {
    /// The highest parseable token, as written.
    pub version: String,
    /// Tokens that failed to parse and were left out of the ranking.
    pub skipped: Vec<String>,
}

/// Returns the highest version among `tokens`.
///
/// Unparseable tokens are excluded and reported in [`MaxVersion::skipped`].
///
/// ## Errors
/// - `NoValidVersions` if `tokens` is empty or nothing parses
pub fn find_max_version<I, S>(tokens: I) -> CoreResult<MaxVersion>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut best: Option<Version> = None;
    let mut skipped = Vec::new();
    let mut candidates = Vec::new();

    for token in tokens {
        let token = token.as_ref();
        candidates.push(token.to_string());
        match Version::parse(token) {
            Ok(parsed) => {
                if best.as_ref().map_or(true, |b| parsed > *b) {
                    best = Some(parsed);
                }
            }
            Err(_) => skipped.push(token.to_string()),
        }
    }

    match best {
        Some(v) => Ok(MaxVersion {
            version: v.original,
            skipped,
        }),
        None => Err(CoreError::NoValidVersions { candidates }),
    }
}

/// Compares two known version strings.
///
/// Falls back to byte-wise string order when either side does not parse,
/// so the comparison itself never fails.
///
/// ## Example
/// ```rust
/// use std::cmp::Ordering;
/// use schema_sync_core::version::compare_versions;
///
/// assert_eq!(compare_versions("v9", "v10"), Ordering::Less);
/// assert_eq!(compare_versions("invalid", "v1"), Ordering::Less); // 'i' < 'v'
/// ```
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    match (Version::parse(a), Version::parse(b)) {
        (Ok(va), Ok(vb)) => va.cmp(&vb),
        _ => a.as_bytes().cmp(b.as_bytes()),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
