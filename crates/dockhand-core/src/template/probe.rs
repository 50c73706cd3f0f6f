//! Source-control lookups needed by scoped, commit-date and project tokens.

use std::path::Path;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::detect::gitinfo::read_git_info;
use crate::domain::VersionInfo;
use crate::env::Environment;
use crate::git;
use crate::version::VersionDetector;

/// Repository facts the template resolver may ask for.
pub trait RepoProbe {
    /// Version of an independently tagged component (`<scope>/v1.2.3`).
    fn scoped_version(&self, scope: &str) -> Option<VersionInfo>;
    fn commit_date(&self) -> Option<DateTime<Utc>>;
    fn project_name(&self) -> Option<String>;
}

/// [`RepoProbe`] backed by a git working tree.
pub struct GitProbe<'a> {
    repo: &'a Path,
    env: &'a dyn Environment,
}

impl<'a> GitProbe<'a> {
    pub fn new(repo: &'a Path, env: &'a dyn Environment) -> Self {
        Self { repo, env }
    }
}

impl RepoProbe for GitProbe<'_> {
    fn scoped_version(&self, scope: &str) -> Option<VersionInfo> {
        VersionDetector::new(self.repo, self.env)
            .scoped(scope)
            .detect()
            .map_err(|e| warn!(scope, error = %e, "scoped version lookup failed"))
            .ok()
    }

    fn commit_date(&self) -> Option<DateTime<Utc>> {
        git::commit_date(self.repo)
            .map_err(|e| warn!(error = %e, "commit date lookup failed"))
            .ok()
    }

    fn project_name(&self) -> Option<String> {
        read_git_info(self.repo)
            .and_then(|info| info.remote_url)
            .and_then(|url| repo_name_from_url(&url))
            .or_else(|| {
                self.repo
                    .canonicalize()
                    .ok()?
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
            })
    }
}

/// Repository name from a clone URL (`git@host:org/app.git` -> `app`).
pub fn repo_name_from_url(url: &str) -> Option<String> {
    let trimmed = url.trim().trim_end_matches('/');
    let trimmed = trimmed.strip_suffix(".git").unwrap_or(trimmed);
    trimmed
        .rsplit(['/', ':'])
        .next()
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}
