//! Path normalization and mount-key handling.
//!
//! All matching happens on the normalized form: scheme-qualified, no
//! trailing separator except on a bare `scheme://` root. Mount keys are the
//! same string in directory form (trailing `/`), so `vfs://dev` and
//! `vfs://dev/` register the same key.

use crate::error::{UrsError, UrsResult};

const SCHEME_SEP: &str = "://";

/// Normalize a caller path against the default scheme.
///
/// `/dev/null` becomes `vfs://dev/null`, `/` becomes `vfs://`, and one
/// trailing separator is dropped (`vfs://dev/` becomes `vfs://dev`).
pub fn normalize(path: &str, default_scheme: &str) -> UrsResult<String> {
    if path.is_empty() {
        return Err(UrsError::invalid_path("empty path"));
    }

    let mut normalized = if path.starts_with('/') {
        format!("{}{}", default_scheme, path.trim_start_matches('/'))
    } else {
        path.to_string()
    };

    if normalized.ends_with('/') && !normalized.ends_with(SCHEME_SEP) {
        normalized.pop();
    }
    Ok(normalized)
}

/// Offset just past `scheme://`, or 0 for unqualified paths.
fn root_end(path: &str) -> usize {
    path.find(SCHEME_SEP)
        .map(|i| i + SCHEME_SEP.len())
        .unwrap_or(0)
}

/// Directory form of a normalized path, as stored in the registry.
pub fn mount_key(normalized: &str) -> String {
    if normalized.ends_with('/') {
        normalized.to_string()
    } else {
        format!("{normalized}/")
    }
}

/// Candidate mount keys for a longest-prefix match, longest first.
///
/// The path itself (in directory form), then each ancestor directory, down
/// to the bare scheme root.
pub fn mount_candidates(normalized: &str) -> Vec<String> {
    let root = root_end(normalized);
    let mut candidates = vec![mount_key(normalized)];

    let mut current = normalized;
    while current.len() > root {
        let body = current[root..].trim_end_matches('/');
        current = match body.rfind('/') {
            Some(pos) => &current[..root + pos + 1],
            None => &current[..root],
        };
        if !current.is_empty() {
            candidates.push(current.to_string());
        }
    }
    candidates
}

/// The part of `normalized` below the mount `key`.
pub fn remainder<'a>(normalized: &'a str, key: &str) -> &'a str {
    normalized.get(key.len()..).unwrap_or("")
}

/// Whether a link target names a path from a namespace root rather than
/// from the link's own node.
pub fn is_absolute(path: &str) -> bool {
    path.starts_with('/') || path.contains(SCHEME_SEP)
}

/// Path components to hand to `lookup`, skipping empty and `.` entries.
pub fn components(rest: &str) -> impl Iterator<Item = &str> {
    rest.split('/').filter(|c| !c.is_empty() && *c != ".")
}
