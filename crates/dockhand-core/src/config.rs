//! Declarative build configuration (`dockhand.toml`).

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{DockhandError, ExtractRule, OutputMode, Result, RetentionPolicy};
use crate::template::ProjectInfo;

/// File names searched by [`Config::discover`], in order.
pub const CONFIG_FILE_NAMES: &[&str] = &["dockhand.toml", ".dockhand.toml"];

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub project: ProjectInfo,
    /// User variables for `{var:name}`.
    pub vars: BTreeMap<String, String>,
    /// Named branch/tag patterns referenced as `@name` in filters.
    pub patterns: BTreeMap<String, Vec<String>>,
    pub builds: Vec<BuildConfig>,
}

/// One `[[builds]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    pub id: String,
    /// Build file path relative to the root; discovered when absent.
    pub file: Option<PathBuf>,
    /// Build context relative to the root; defaults to the root.
    pub context: Option<PathBuf>,
    pub target: Option<String>,
    pub platforms: Vec<String>,
    /// Explicit build arguments (templates).
    pub args: BTreeMap<String, String>,
    /// Local tag templates. Bare tags are prefixed with `image`.
    pub tags: Vec<String>,
    /// Local image name (template); defaults to the project name.
    pub image: Option<String>,
    /// Only load into the local daemon.
    pub local: bool,
    /// Save the loaded image to this tarball path.
    pub save: Option<PathBuf>,
    pub output: OutputMode,
    pub extract: Vec<ExtractRule>,
    pub registries: Vec<RegistryConfig>,
}

/// One `[[builds.registries]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct RegistryConfig {
    /// Registry host (template), e.g. `ghcr.io`.
    pub url: String,
    /// Repository path (template), e.g. `acme/app`.
    pub path: String,
    /// Tag templates.
    pub tags: Vec<String>,
    /// Provider name; detected from `url` when absent.
    pub provider: Option<String>,
    /// Environment-variable prefix for credentials.
    pub credentials: Option<String>,
    pub on_branches: Vec<String>,
    pub on_tags: Vec<String>,
    pub retention: Option<RetentionPolicy>,
}

impl Config {
    /// Load and validate configuration from `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            DockhandError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
            .map_err(|e| DockhandError::Config(format!("{}: {e}", path.display())))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| DockhandError::Config(format!("invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load the first configuration file found at `root`, or defaults.
    pub fn discover(root: &Path) -> Result<Self> {
        for name in CONFIG_FILE_NAMES {
            let path = root.join(name);
            if path.is_file() {
                debug!(path = %path.display(), "loading configuration");
                return Self::load(&path);
            }
        }
        debug!(root = %root.display(), "no configuration file, using defaults");
        Ok(Self::default())
    }

    fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for (idx, build) in self.builds.iter().enumerate() {
            if build.id.trim().is_empty() {
                return Err(DockhandError::Config(format!("builds[{idx}] has no id")));
            }
            if !seen.insert(build.id.as_str()) {
                return Err(DockhandError::Config(format!(
                    "duplicate build id '{}'",
                    build.id
                )));
            }
            for (ridx, registry) in build.registries.iter().enumerate() {
                if registry.url.trim().is_empty() && registry.path.trim().is_empty() {
                    return Err(DockhandError::Config(format!(
                        "build '{}' registries[{ridx}] needs a url or path",
                        build.id
                    )));
                }
            }
            if build.local && !build.registries.is_empty() {
                debug!(build = %build.id, "local build ignores its registries");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[project]
name = "shop"
description = "Storefront service"

[vars]
org = "acme"

[patterns]
release = ["main", "release/*"]

[[builds]]
id = "api"
file = "docker/api.dockerfile"
platforms = ["linux/amd64", "linux/arm64"]
tags = ["{version}"]

[builds.args]
FEATURES = "full"

[[builds.registries]]
url = "ghcr.io"
path = "{var:org}/api"
tags = ["{version}", "latest"]
credentials = "GHCR"
on_branches = ["@release"]

[builds.registries.retention]
keep_last = 10

[[builds]]
id = "site"
output = { type = "local", dest = "out" }

[[builds.extract]]
from = "public"
to = "dist/public"
"#;

    #[test]
    fn test_parse_sample() {
        let config = Config::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.project.name, "shop");
        assert_eq!(config.vars["org"], "acme");
        assert_eq!(config.patterns["release"], vec!["main", "release/*"]);
        assert_eq!(config.builds.len(), 2);

        let api = &config.builds[0];
        assert_eq!(api.file.as_deref(), Some(Path::new("docker/api.dockerfile")));
        assert_eq!(api.platforms.len(), 2);
        assert_eq!(api.args["FEATURES"], "full");
        assert_eq!(api.output, OutputMode::Image);
        let reg = &api.registries[0];
        assert_eq!(reg.credentials.as_deref(), Some("GHCR"));
        assert_eq!(reg.retention.as_ref().and_then(|r| r.keep_last), Some(10));

        let site = &config.builds[1];
        assert_eq!(
            site.output,
            OutputMode::Local {
                dest: PathBuf::from("out")
            }
        );
        assert_eq!(site.extract[0].to, "dist/public");
    }

    #[test]
    fn test_empty_is_default() {
        assert_eq!(Config::from_toml_str("").unwrap(), Config::default());
    }

    #[test]
    fn test_rejects_duplicate_ids() {
        let err = Config::from_toml_str("[[builds]]\nid = \"a\"\n[[builds]]\nid = \"a\"\n")
            .unwrap_err();
        assert!(err.to_string().contains("duplicate build id 'a'"));
    }

    #[test]
    fn test_rejects_unknown_fields() {
        assert!(Config::from_toml_str("[[builds]]\nid = \"a\"\nplatfroms = []\n").is_err());
    }

    #[test]
    fn test_discover() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(Config::discover(dir.path()).unwrap(), Config::default());

        std::fs::write(
            dir.path().join(".dockhand.toml"),
            "[project]\nname = \"hidden\"\n",
        )
        .unwrap();
        assert_eq!(Config::discover(dir.path()).unwrap().project.name, "hidden");

        std::fs::write(dir.path().join("dockhand.toml"), "[project]\nname = \"plain\"\n").unwrap();
        assert_eq!(Config::discover(dir.path()).unwrap().project.name, "plain");
    }

    #[test]
    fn test_load_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dockhand.toml");
        std::fs::write(&path, "builds = 3\n").unwrap();
        let err = Config::load(&path).unwrap_err();
        assert!(err.to_string().contains("dockhand.toml"));
    }
}
