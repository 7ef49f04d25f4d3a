//! Repo-relative path sets
//!
//! Sorted, deduplicated set operations over forward-slashed repo paths.

use std::collections::HashSet;
use std::path::Path;

use crate::utils::paths::{clean_path, relative_to, to_slash};

/// Normalize a repo-relative path: trim, clean, forward-slash. Returns
/// `None` for empty input and for the repo root itself.
pub fn normalize_rel_path(path: &str) -> Option<String> {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return None;
    }
    let cleaned = to_slash(&clean_path(Path::new(trimmed)));
    if cleaned.is_empty() || cleaned == "." {
        None
    } else {
        Some(cleaned)
    }
}

/// Normalize every path, drop invalid entries, then sort and deduplicate.
pub fn normalize_unique(paths: &[String]) -> Vec<String> {
    let mut out: Vec<String> = paths.iter().filter_map(|p| normalize_rel_path(p)).collect();
    out.sort();
    out.dedup();
    out
}

/// `a ∪ b`, sorted, deduplicated, without empty strings.
pub fn union_repo_paths(a: &[String], b: &[String]) -> Vec<String> {
    let mut combined: Vec<String> = a
        .iter()
        .chain(b.iter())
        .filter(|p| !p.is_empty())
        .cloned()
        .collect();
    combined.sort();
    combined.dedup();
    combined
}

/// `all − excluded`, preserving the order of `all`.
pub fn subtract_repo_paths(all: &[String], excluded: &[String]) -> Vec<String> {
    if all.is_empty() {
        return Vec::new();
    }
    let excluded: HashSet<&str> = excluded.iter().map(String::as_str).collect();
    all.iter()
        .filter(|p| !excluded.contains(p.as_str()))
        .cloned()
        .collect()
}

/// Files the session has read, relative to `working_dir`.
///
/// Paths equal to the working directory or escaping it are dropped; the
/// result is sorted and deduplicated.
pub fn session_chat_files<P: AsRef<Path>>(working_dir: &Path, read_paths: &[P]) -> Vec<String> {
    let mut files: Vec<String> = read_paths
        .iter()
        .filter_map(|p| {
            let p = p.as_ref();
            let rel = if working_dir.as_os_str().is_empty() {
                p.to_path_buf()
            } else {
                relative_to(working_dir, p).unwrap_or_else(|| p.to_path_buf())
            };
            let rel = to_slash(&rel);
            if rel.is_empty() || rel == "." || rel == ".." || rel.starts_with("../") {
                None
            } else {
                Some(rel)
            }
        })
        .collect();
    files.sort();
    files.dedup();
    files
}
