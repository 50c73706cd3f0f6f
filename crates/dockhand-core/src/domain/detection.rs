//! Repository detection results.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Everything the repository detector learned about a root directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Detection {
    pub root: PathBuf,
    /// Discovered build files, in discovery order.
    pub build_files: Vec<BuildFileInfo>,
    /// Primary language identifier (empty when unknown).
    pub language: String,
    /// Manifest and lockfile names found at the root.
    pub lockfiles: Vec<String>,
    pub git: Option<GitInfo>,
}

impl Detection {
    /// Look up a discovered build file by its path relative to the root.
    pub fn build_file(&self, path: &std::path::Path) -> Option<&BuildFileInfo> {
        self.build_files.iter().find(|f| f.path == path)
    }
}

/// One discovered build file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BuildFileInfo {
    /// Path relative to the detection root.
    pub path: PathBuf,
    /// Stages in declaration order.
    pub stages: Vec<Stage>,
    /// Declared `ARG` names.
    pub args: Vec<String>,
    /// Exposed ports as written (`8080`, `53/udp`).
    pub ports: Vec<String>,
    /// Health-check command; `None` when absent or disabled with `NONE`.
    pub healthcheck: Option<String>,
}

impl BuildFileInfo {
    pub fn declares_arg(&self, name: &str) -> bool {
        self.args.iter().any(|a| a == name)
    }

    pub fn stage(&self, name: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.name == name)
    }
}

/// One stage of a build file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    /// Alias from `AS <name>`; empty for anonymous stages.
    pub name: String,
    /// Base image reference.
    pub base: String,
    pub platform: Option<String>,
    /// 1-based source line of the `FROM` directive.
    pub line: usize,
}

/// Git metadata read straight from the repository's metadata directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct GitInfo {
    pub remote_url: Option<String>,
    pub branch: Option<String>,
}
