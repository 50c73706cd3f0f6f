//! Git metadata read from disk without spawning `git`.

use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::GitInfo;

/// Read branch and origin URL from the repository at `root`.
///
/// Returns `None` when `root` has no `.git` entry. Missing or unreadable
/// `HEAD`/`config` files leave the corresponding field empty.
pub fn read_git_info(root: &Path) -> Option<GitInfo> {
    let git_dir = resolve_git_dir(root)?;
    Some(GitInfo {
        branch: fs::read_to_string(git_dir.join("HEAD"))
            .ok()
            .and_then(|head| parse_head(&head)),
        remote_url: fs::read_to_string(common_dir(&git_dir).join("config"))
            .ok()
            .and_then(|config| parse_origin_url(&config)),
    })
}

/// Shared metadata directory; a worktree's `commondir` points back to it.
fn common_dir(git_dir: &Path) -> PathBuf {
    match fs::read_to_string(git_dir.join("commondir")) {
        Ok(pointer) => {
            let path = Path::new(pointer.trim());
            if path.is_absolute() {
                path.to_path_buf()
            } else {
                git_dir.join(path)
            }
        }
        Err(_) => git_dir.to_path_buf(),
    }
}

/// Locate the metadata directory, following `gitdir:` pointer files used by
/// worktrees and submodules.
fn resolve_git_dir(root: &Path) -> Option<PathBuf> {
    let dot_git = root.join(".git");
    if dot_git.is_dir() {
        return Some(dot_git);
    }
    let pointer = fs::read_to_string(&dot_git).ok()?;
    let target = pointer.trim().strip_prefix("gitdir:")?.trim();
    let path = Path::new(target);
    Some(if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    })
}

/// Branch name from a symbolic `HEAD`; detached heads yield `None`.
pub fn parse_head(content: &str) -> Option<String> {
    content
        .trim()
        .strip_prefix("ref: refs/heads/")
        .filter(|b| !b.is_empty())
        .map(str::to_string)
}

/// `url` of the `[remote "origin"]` section.
pub fn parse_origin_url(config: &str) -> Option<String> {
    let mut in_origin = false;
    for line in config.lines() {
        let line = line.trim();
        if line.starts_with('[') {
            if in_origin {
                return None;
            }
            in_origin = line == r#"[remote "origin"]"#;
            continue;
        }
        if !in_origin {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            if key.trim() == "url" {
                return Some(value.trim().to_string());
            }
        }
    }
    None
}
