//! Git integration utilities for capturing repository state.
//!
//! Thin wrappers over the `git` binary. Absence of a tag is reported as
//! `Ok(None)`, distinct from a command failure.

use std::path::Path;
use std::process::Command;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::domain::error::{DockhandError, Result};

/// Captured output of one git invocation.
struct GitOutput {
    success: bool,
    stdout: String,
    stderr: String,
}

fn git(repo_dir: &Path, args: &[&str]) -> Result<GitOutput> {
    debug!(?args, "running git");
    let output = Command::new("git")
        .args(args)
        .current_dir(repo_dir)
        .output()
        .map_err(|e| DockhandError::Git(format!("failed to run git: {e}")))?;

    Ok(GitOutput {
        success: output.status.success(),
        stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    })
}

/// Capture the HEAD commit id.
///
/// Runs `git rev-parse HEAD` in the given directory. Returns an error if the
/// directory is not inside a git repository or if git is not available.
pub fn head_commit(repo_dir: &Path) -> Result<String> {
    let out = git(repo_dir, &["rev-parse", "HEAD"])?;
    if !out.success {
        return Err(DockhandError::Git(format!(
            "git rev-parse HEAD failed: {}",
            out.stderr
        )));
    }
    if out.stdout.is_empty() {
        return Err(DockhandError::Git(
            "git rev-parse HEAD returned empty output".to_string(),
        ));
    }
    Ok(out.stdout)
}

/// Current branch name; `None` on a detached HEAD.
pub fn current_branch(repo_dir: &Path) -> Result<Option<String>> {
    let out = git(repo_dir, &["rev-parse", "--abbrev-ref", "HEAD"])?;
    if !out.success {
        return Err(DockhandError::Git(format!(
            "git rev-parse --abbrev-ref HEAD failed: {}",
            out.stderr
        )));
    }
    match out.stdout.as_str() {
        "" | "HEAD" => Ok(None),
        name => Ok(Some(name.to_string())),
    }
}

/// Nearest tag reachable from HEAD.
///
/// With a glob only matching tags count; without one, component tags
/// (`<scope>/...`) are skipped.
pub fn nearest_tag(repo_dir: &Path, pattern: Option<&str>) -> Result<Option<String>> {
    let mut args = vec!["describe", "--tags", "--abbrev=0"];
    push_tag_filter(&mut args, pattern);
    describe(repo_dir, &args)
}

/// Tag pointing exactly at HEAD, filtered like [`nearest_tag`].
pub fn exact_tag(repo_dir: &Path, pattern: Option<&str>) -> Result<Option<String>> {
    let mut args = vec!["describe", "--tags", "--exact-match"];
    push_tag_filter(&mut args, pattern);
    describe(repo_dir, &args)
}

fn push_tag_filter<'a>(args: &mut Vec<&'a str>, pattern: Option<&'a str>) {
    match pattern {
        Some(p) => args.extend(["--match", p]),
        None => args.extend(["--exclude", "*/*"]),
    }
}

fn describe(repo_dir: &Path, args: &[&str]) -> Result<Option<String>> {
    let out = git(repo_dir, args)?;
    if out.success {
        return Ok(Some(out.stdout).filter(|t| !t.is_empty()));
    }
    if is_no_tag_message(&out.stderr) {
        return Ok(None);
    }
    Err(DockhandError::Git(format!(
        "git {} failed: {}",
        args.join(" "),
        out.stderr
    )))
}

fn is_no_tag_message(stderr: &str) -> bool {
    let stderr = stderr.to_ascii_lowercase();
    stderr.contains("no names found")
        || stderr.contains("no tags can describe")
        || stderr.contains("no tag exactly matches")
        || stderr.contains("cannot describe")
}

/// Committer date of HEAD.
pub fn commit_date(repo_dir: &Path) -> Result<DateTime<Utc>> {
    let out = git(repo_dir, &["log", "-1", "--format=%cI", "HEAD"])?;
    if !out.success {
        return Err(DockhandError::Git(format!("git log failed: {}", out.stderr)));
    }
    DateTime::parse_from_rfc3339(&out.stdout)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| DockhandError::Git(format!("unparseable commit date {:?}: {e}", out.stdout)))
}
