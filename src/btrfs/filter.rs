//! Narrow subvolume paths down to snapshot names.

use crate::error::Result;
use regex::Regex;

/// Snapshot naming pattern that must match a whole base name.
#[derive(Debug, Clone)]
pub struct NamePattern {
    source: String,
    regex: Regex,
}

impl NamePattern {
    /// Compile `pattern`, anchored at both ends.
    pub fn new(pattern: &str) -> Result<Self> {
        let regex = Regex::new(&format!("^(?:{})$", pattern))?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    /// True if the whole of `name` matches.
    pub fn matches(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

/// Default pattern: `YYYY-MM-DD_HH-MM`
pub const DEFAULT_PATTERN: &str = r"\d{4}-\d{2}-\d{2}_\d{2}-\d{2}";

/// Canonical form of a snapshot directory: no trailing separator, `"."` is empty.
pub fn normalize_dir(dir: &str) -> &str {
    let dir = dir.trim_end_matches('/');
    if dir == "." {
        ""
    } else {
        dir
    }
}

/// Base names of `paths` that sit directly in `snapshot_dir` and match `pattern`.
///
/// Output follows input order.
pub fn filter_snapshots<S: AsRef<str>>(
    paths: &[S],
    snapshot_dir: &str,
    pattern: &NamePattern,
) -> Vec<String> {
    let dir = normalize_dir(snapshot_dir);

    paths
        .iter()
        .filter_map(|path| {
            let path = path.as_ref();
            let (parent, name) = match path.rsplit_once('/') {
                Some((parent, name)) => (parent, name),
                None => ("", path),
            };
            if parent == dir && pattern.matches(name) {
                Some(name.to_string())
            } else {
                None
            }
        })
        .collect()
}
