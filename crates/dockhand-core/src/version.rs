//! Version derivation from git tags.
//!
//! Only the HEAD commit lookup is fatal. Branch, nearest tag and exact-tag
//! lookups degrade to "unknown" on failure.

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use crate::ci;
use crate::domain::{Result, VersionInfo};
use crate::env::{Environment, ProcessEnv};
use crate::git;

static SEMVER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^v?(\d+)\.(\d+)\.(\d+)(?:-([0-9A-Za-z.-]+))?(?:\+[0-9A-Za-z.-]+)?$")
        .expect("semver pattern is valid")
});

const SHORT_SHA_LEN: usize = 7;

/// Detect the version of the repository at `repo` using the process environment.
pub fn detect_version(repo: &Path) -> Result<VersionInfo> {
    VersionDetector::new(repo, &ProcessEnv).detect()
}

/// Derives a [`VersionInfo`] from git state.
pub struct VersionDetector<'a> {
    repo: &'a Path,
    env: &'a dyn Environment,
    scope: Option<&'a str>,
}

impl<'a> VersionDetector<'a> {
    pub fn new(repo: &'a Path, env: &'a dyn Environment) -> Self {
        Self {
            repo,
            env,
            scope: None,
        }
    }

    /// Restrict tags to the `<scope>/` namespace (monorepo components).
    pub fn scoped(mut self, scope: &'a str) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn detect(&self) -> Result<VersionInfo> {
        let commit = git::head_commit(self.repo)?;

        let branch = match git::current_branch(self.repo) {
            Ok(Some(name)) => name,
            Ok(None) => ci::ci_branch(self.env).unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "could not determine branch");
                ci::ci_branch(self.env).unwrap_or_default()
            }
        };

        let pattern = self.scope.map(|s| format!("{s}/*"));
        let nearest = git::nearest_tag(self.repo, pattern.as_deref()).unwrap_or_else(|e| {
            warn!(error = %e, "could not find nearest tag");
            None
        });

        let exact = match nearest {
            Some(_) => git::exact_tag(self.repo, pattern.as_deref()).unwrap_or_else(|e| {
                warn!(error = %e, "could not check exact tag");
                None
            }),
            None => None,
        };

        let info = derive_version(
            &commit,
            &branch,
            nearest.as_deref(),
            exact.as_deref(),
            self.scope,
        );
        debug!(version = %info.version, release = info.is_release, "version detected");
        Ok(info)
    }
}

/// Build a [`VersionInfo`] from already-collected git facts.
///
/// `exact` is the tag at HEAD, if any; when present it is the release tag.
pub fn derive_version(
    commit: &str,
    branch: &str,
    nearest: Option<&str>,
    exact: Option<&str>,
    scope: Option<&str>,
) -> VersionInfo {
    let sha: String = commit.chars().take(SHORT_SHA_LEN).collect();
    let mut info = VersionInfo {
        sha: sha.clone(),
        commit: commit.to_string(),
        branch: branch.to_string(),
        ..Default::default()
    };

    let Some(raw_tag) = exact.or(nearest) else {
        info.version = format!("0.0.0-dev+{sha}");
        info.base = "0.0.0".to_string();
        info.major = "0".to_string();
        info.minor = "0".to_string();
        info.patch = "0".to_string();
        return info;
    };

    let tag = match scope {
        Some(s) => raw_tag
            .strip_prefix(s)
            .and_then(|t| t.strip_prefix('/'))
            .unwrap_or(raw_tag),
        None => raw_tag,
    };

    if let Some(caps) = SEMVER.captures(tag) {
        info.major = caps[1].to_string();
        info.minor = caps[2].to_string();
        info.patch = caps[3].to_string();
        info.prerelease = caps.get(4).map(|m| m.as_str().to_string()).unwrap_or_default();
        info.base = format!("{}.{}.{}", info.major, info.minor, info.patch);
        info.version = if info.prerelease.is_empty() {
            info.base.clone()
        } else {
            format!("{}-{}", info.base, info.prerelease)
        };
        info.is_prerelease = !info.prerelease.is_empty();
    } else {
        let bare = tag.strip_prefix('v').unwrap_or(tag);
        info.version = bare.to_string();
        info.base = bare.to_string();
        info.major = "0".to_string();
        info.minor = "0".to_string();
        info.patch = "0".to_string();
    }

    if exact.is_some() {
        info.is_release = true;
        info.tag = Some(raw_tag.to_string());
    } else {
        info.version = format!("{}-dev+{sha}", info.version);
    }

    info
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::tests::{make_git_repo, run_git};
    use std::collections::HashMap;

    const COMMIT: &str = "abc1234def5678abc1234def5678abc1234def56";

    #[test]
    fn test_no_tags_synthesizes_dev_version() {
        let info = derive_version(COMMIT, "main", None, None, None);
        assert_eq!(info.version, "0.0.0-dev+abc1234");
        assert_eq!(info.base, "0.0.0");
        assert_eq!((info.major.as_str(), info.minor.as_str(), info.patch.as_str()), ("0", "0", "0"));
        assert!(!info.is_release);
        assert_eq!(info.sha, "abc1234");
    }

    #[test]
    fn test_exact_release_tag() {
        let info = derive_version(COMMIT, "main", Some("v2.1.0"), Some("v2.1.0"), None);
        assert_eq!(info.version, "2.1.0");
        assert_eq!(info.base, "2.1.0");
        assert!(info.is_release);
        assert!(!info.is_prerelease);
        assert_eq!(info.tag.as_deref(), Some("v2.1.0"));
    }

    #[test]
    fn test_tag_behind_head_gets_dev_suffix() {
        let info = derive_version(COMMIT, "main", Some("v2.1.0"), None, None);
        assert_eq!(info.version, "2.1.0-dev+abc1234");
        assert_eq!(info.base, "2.1.0");
        assert!(!info.is_release);
        assert_eq!(info.tag, None);
    }

    #[test]
    fn test_prerelease_tag() {
        let info = derive_version(COMMIT, "main", Some("1.4.0-rc.2"), Some("1.4.0-rc.2"), None);
        assert_eq!(info.version, "1.4.0-rc.2");
        assert_eq!(info.prerelease, "rc.2");
        assert!(info.is_prerelease);
        assert!(info.is_release);
    }

    #[test]
    fn test_non_semver_tag_used_verbatim() {
        let info = derive_version(COMMIT, "main", Some("vnext"), Some("vnext"), None);
        assert_eq!(info.version, "next");
        assert_eq!(info.base, "next");

        let behind = derive_version(COMMIT, "main", Some("release-7"), None, None);
        assert_eq!(behind.version, "release-7-dev+abc1234");
    }

    #[test]
    fn test_scoped_prefix_is_stripped() {
        let info = derive_version(COMMIT, "main", Some("api/v3.0.1"), Some("api/v3.0.1"), Some("api"));
        assert_eq!(info.version, "3.0.1");
        assert_eq!(info.major, "3");
        assert_eq!(info.tag.as_deref(), Some("api/v3.0.1"));
    }

    #[test]
    fn detect_release_at_head() {
        let repo = make_git_repo();
        run_git(repo.path(), &["tag", "v2.1.0"]);

        let info = detect_version(repo.path()).unwrap();
        assert!(info.is_release);
        assert_eq!(info.version, "2.1.0");
        assert_eq!(info.branch, "main");
    }

    #[test]
    fn detect_one_commit_after_tag() {
        let repo = make_git_repo();
        run_git(repo.path(), &["tag", "v2.1.0"]);
        run_git(repo.path(), &["commit", "-q", "--allow-empty", "-m", "more"]);

        let info = detect_version(repo.path()).unwrap();
        assert!(!info.is_release);
        assert!(info.version.ends_with(&format!("-dev+{}", info.sha)));
        assert!(info.version.starts_with("2.1.0-dev+"));
    }

    #[test]
    fn detect_without_tags() {
        let repo = make_git_repo();
        let info = detect_version(repo.path()).unwrap();
        assert_eq!(info.version, format!("0.0.0-dev+{}", info.sha));
        assert_eq!(info.major, "0");
    }

    #[test]
    fn detect_scoped_ignores_other_namespaces() {
        let repo = make_git_repo();
        run_git(repo.path(), &["tag", "v9.9.9"]);
        run_git(repo.path(), &["tag", "worker/v1.2.0"]);

        let env: HashMap<String, String> = HashMap::new();
        let info = VersionDetector::new(repo.path(), &env)
            .scoped("worker")
            .detect()
            .unwrap();
        assert_eq!(info.version, "1.2.0");
    }

    #[test]
    fn detect_detached_head_uses_ci_branch() {
        let repo = make_git_repo();
        let sha = git::head_commit(repo.path()).unwrap();
        run_git(repo.path(), &["checkout", "-q", "--detach", &sha]);

        let env: HashMap<String, String> =
            [("CI_COMMIT_BRANCH".to_string(), "release/1.x".to_string())]
                .into_iter()
                .collect();
        let info = VersionDetector::new(repo.path(), &env).detect().unwrap();
        assert_eq!(info.branch, "release/1.x");
    }

    #[test]
    fn detect_fails_outside_repo() {
        let dir = tempfile::tempdir().unwrap();
        assert!(detect_version(dir.path()).is_err());
    }
}
