//! Repository detection: build files, language and git metadata.
//!
//! Detection never fails. Each probe that cannot read what it needs
//! contributes an empty result.

pub mod buildfile;
pub mod gitinfo;
pub mod language;

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::domain::{BuildFileInfo, Detection};

pub use buildfile::ParseError;

/// Directories searched for build files, relative to the root.
pub const CANDIDATE_DIRS: &[&str] = &[".", "docker", "build", "deploy", ".devcontainer"];

/// Exact build file names.
pub const CANDIDATE_NAMES: &[&str] = &["Dockerfile", "Containerfile", "dockerfile"];

/// Inspect `root`.
pub fn detect(root: &Path) -> Detection {
    let build_files = discover_build_files(root)
        .into_iter()
        .map(|rel| load_build_file(root, rel))
        .collect::<Vec<_>>();
    let (language, lockfiles) = language::scan(root);
    let git = gitinfo::read_git_info(root);

    info!(
        root = %root.display(),
        build_files = build_files.len(),
        language = %language,
        git = git.is_some(),
        "repository detected"
    );

    Detection {
        root: root.to_path_buf(),
        build_files,
        language,
        lockfiles,
        git,
    }
}

/// Whether `name` looks like a build file.
pub fn is_build_file_name(name: &str) -> bool {
    if CANDIDATE_NAMES.contains(&name) || name.starts_with("Dockerfile.") {
        return true;
    }
    let lower = name.to_ascii_lowercase();
    lower.ends_with(".dockerfile") || lower.ends_with(".containerfile")
}

/// Build files under the candidate directories, as root-relative paths.
pub fn discover_build_files(root: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    for dir in CANDIDATE_DIRS {
        let abs = root.join(dir);
        let entries = match std::fs::read_dir(&abs) {
            Ok(entries) => entries,
            Err(_) => continue,
        };

        let mut names: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|name| is_build_file_name(name))
            .collect();
        names.sort_by(|a, b| {
            let rank = |n: &str| CANDIDATE_NAMES.iter().position(|c| *c == n).unwrap_or(usize::MAX);
            rank(a).cmp(&rank(b)).then_with(|| a.cmp(b))
        });

        for name in names {
            let rel = if *dir == "." {
                PathBuf::from(&name)
            } else {
                Path::new(dir).join(&name)
            };
            if !found.contains(&rel) {
                found.push(rel);
            }
        }
    }
    debug!(count = found.len(), "build files discovered");
    found
}

fn load_build_file(root: &Path, rel: PathBuf) -> BuildFileInfo {
    let parsed = std::fs::read_to_string(root.join(&rel))
        .map_err(|e| e.to_string())
        .and_then(|content| buildfile::parse(&rel, &content).map_err(|e| e.to_string()));

    match parsed {
        Ok(info) => info,
        Err(reason) => {
            warn!(path = %rel.display(), %reason, "build file not parsed");
            BuildFileInfo {
                path: rel,
                ..Default::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_is_build_file_name() {
        assert!(is_build_file_name("Dockerfile"));
        assert!(is_build_file_name("Containerfile"));
        assert!(is_build_file_name("Dockerfile.dev"));
        assert!(is_build_file_name("api.Dockerfile"));
        assert!(is_build_file_name("worker.containerfile"));
        assert!(!is_build_file_name("Dockerfile-notes.md"));
        assert!(!is_build_file_name("docker-compose.yml"));
    }

    #[test]
    fn test_discovery_order() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("Dockerfile.dev"), "FROM alpine\n").unwrap();
        fs::write(root.join("Dockerfile"), "FROM alpine\n").unwrap();
        fs::create_dir(root.join("docker")).unwrap();
        fs::write(root.join("docker").join("api.dockerfile"), "FROM alpine\n").unwrap();
        fs::write(root.join("docker").join("notes.txt"), "").unwrap();

        assert_eq!(
            discover_build_files(root),
            vec![
                PathBuf::from("Dockerfile"),
                PathBuf::from("Dockerfile.dev"),
                PathBuf::from("docker/api.dockerfile"),
            ]
        );
    }

    #[test]
    fn test_unparseable_file_is_kept_empty() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Containerfile"), "FROM\n").unwrap();

        let detection = detect(dir.path());
        assert_eq!(detection.build_files.len(), 1);
        assert_eq!(detection.build_files[0].path, PathBuf::from("Containerfile"));
        assert!(detection.build_files[0].stages.is_empty());
    }

    #[test]
    fn test_detect_full() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(
            root.join("Dockerfile"),
            "FROM golang:1.22 AS build\nARG VERSION\nFROM scratch\nEXPOSE 8080\n",
        )
        .unwrap();
        fs::write(root.join("go.mod"), "module x\n").unwrap();
        fs::create_dir(root.join(".git")).unwrap();
        fs::write(root.join(".git").join("HEAD"), "ref: refs/heads/main\n").unwrap();

        let detection = detect(root);
        assert_eq!(detection.language, "go");
        assert_eq!(detection.lockfiles, vec!["go.mod"]);
        assert_eq!(
            detection.git.as_ref().and_then(|g| g.branch.as_deref()),
            Some("main")
        );
        let file = detection.build_file(Path::new("Dockerfile")).unwrap();
        assert_eq!(file.stages.len(), 2);
        assert!(file.declares_arg("VERSION"));
        assert_eq!(file.ports, vec!["8080"]);
    }

    #[test]
    fn test_empty_root() {
        let dir = tempfile::tempdir().unwrap();
        let detection = detect(dir.path());
        assert!(detection.build_files.is_empty());
        assert!(detection.language.is_empty());
        assert!(detection.git.is_none());
    }
}
