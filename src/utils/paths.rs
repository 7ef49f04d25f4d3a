//! Path Utilities
//!
//! Resolves the coordinator's data directory and normalizes repo-relative
//! paths.

use std::path::{Component, Path, PathBuf};

use crate::utils::error::{AppError, AppResult};

/// Get the user's home directory
pub fn home_dir() -> AppResult<PathBuf> {
    dirs::home_dir().ok_or_else(|| AppError::config("Could not determine home directory"))
}

/// Get the coordinator directory (~/.agent-coordinator/)
pub fn coordinator_dir() -> AppResult<PathBuf> {
    Ok(home_dir()?.join(".agent-coordinator"))
}

/// Get the config file path (~/.agent-coordinator/config.toml)
pub fn config_path() -> AppResult<PathBuf> {
    Ok(coordinator_dir()?.join("config.toml"))
}

/// Get the database file path (~/.agent-coordinator/data.db)
pub fn database_path() -> AppResult<PathBuf> {
    Ok(coordinator_dir()?.join("data.db"))
}

/// Ensure a directory exists, creating it if necessary
pub fn ensure_dir(path: &Path) -> AppResult<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

/// Get the coordinator directory, creating it if it doesn't exist
pub fn ensure_coordinator_dir() -> AppResult<PathBuf> {
    let path = coordinator_dir()?;
    ensure_dir(&path)?;
    Ok(path)
}

/// Lexically clean a path: drop `.` components and fold `..` where possible.
pub fn clean_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let can_pop = matches!(
                    out.components().next_back(),
                    Some(Component::Normal(_))
                );
                if can_pop {
                    out.pop();
                } else if !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        out
    }
}

/// Render a relative path with forward slashes.
pub fn to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Express `target` relative to `base`, both taken lexically.
///
/// Returns `None` when the two paths share no common root (e.g. one is
/// absolute and the other is not).
pub fn relative_to(base: &Path, target: &Path) -> Option<PathBuf> {
    let base = clean_path(base);
    let target = clean_path(target);
    if base.has_root() != target.has_root() {
        return None;
    }

    let base_parts: Vec<Component> = base
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect();
    let target_parts: Vec<Component> = target
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect();

    let common = base_parts
        .iter()
        .zip(target_parts.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut rel = PathBuf::new();
    for _ in common..base_parts.len() {
        rel.push("..");
    }
    for part in &target_parts[common..] {
        rel.push(part.as_os_str());
    }
    if rel.as_os_str().is_empty() {
        rel.push(".");
    }
    Some(rel)
}
