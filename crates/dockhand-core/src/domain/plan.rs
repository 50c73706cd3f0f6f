//! Build plan model: steps, registry targets and providers.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Ordered list of build steps, executed in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BuildPlan {
    pub steps: Vec<BuildStep>,
}

impl BuildPlan {
    /// Deterministic digest of the ordered step ids and their tags.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for step in &self.steps {
            hasher.update(step.id.as_bytes());
            hasher.update(b"\0");
            for tag in &step.tags {
                hasher.update(tag.as_bytes());
                hasher.update(b"\0");
            }
            hasher.update(b"\n");
        }
        hex::encode(hasher.finalize())
    }

    pub fn step(&self, id: &str) -> Option<&BuildStep> {
        self.steps.iter().find(|s| s.id == id)
    }
}

/// One invocation of the external builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildStep {
    pub id: String,
    pub build_file: PathBuf,
    pub context: PathBuf,
    pub target: Option<String>,
    pub platforms: Vec<String>,
    pub args: BTreeMap<String, String>,
    /// Every image reference the builder tags, local tags first.
    pub tags: Vec<String>,
    pub output: OutputMode,
    pub extract: Vec<ExtractRule>,
    pub registries: Vec<RegistryTarget>,
    pub load: bool,
    pub push: bool,
    pub save: Option<PathBuf>,
}

impl BuildStep {
    /// Targets that live in a remote registry.
    pub fn remote_registries(&self) -> impl Iterator<Item = &RegistryTarget> {
        self.registries.iter().filter(|r| r.is_remote())
    }

    /// All image references destined for remote registries.
    pub fn remote_references(&self) -> Vec<String> {
        self.remote_registries()
            .flat_map(|r| r.references())
            .collect()
    }
}

/// Where the builder puts its result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutputMode {
    #[default]
    Image,
    /// Export the final filesystem into a directory.
    Local { dest: PathBuf },
    /// Export the final filesystem as a tarball.
    Tar { dest: PathBuf },
}

/// Copy `from` (relative to the local export directory) to `to`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractRule {
    pub from: String,
    pub to: String,
}

/// Opaque retention settings handed to the registry client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RetentionPolicy {
    #[serde(default)]
    pub keep_last: Option<u32>,
    #[serde(default)]
    pub max_age_days: Option<u32>,
}

/// A resolved push destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryTarget {
    pub url: String,
    pub path: String,
    /// Resolved tags.
    pub tags: Vec<String>,
    /// Unresolved tag templates, kept for retention matching.
    pub tag_patterns: Vec<String>,
    /// Environment-variable prefix for `<PREFIX>_USER` / `<PREFIX>_PASS`.
    pub credentials: Option<String>,
    pub provider: Provider,
    pub retention: Option<RetentionPolicy>,
}

impl RegistryTarget {
    /// Repository reference without a tag, e.g. `ghcr.io/acme/app`.
    pub fn repository(&self) -> String {
        let url = self.url.trim_end_matches('/');
        let path = self.path.trim_matches('/');
        match (url.is_empty(), path.is_empty()) {
            (true, _) => path.to_string(),
            (false, true) => url.to_string(),
            (false, false) => format!("{url}/{path}"),
        }
    }

    /// Fully qualified references for every resolved tag.
    pub fn references(&self) -> Vec<String> {
        let repo = self.repository();
        self.tags.iter().map(|t| format!("{repo}:{t}")).collect()
    }

    pub fn is_remote(&self) -> bool {
        self.provider != Provider::Local
    }
}

/// Registry vendor. Unknown names map to [`Provider::Generic`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    DockerHub,
    Ghcr,
    Gitlab,
    Quay,
    Ecr,
    Gcr,
    Gar,
    Acr,
    Gitea,
    Harbor,
    Local,
    #[default]
    Generic,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::DockerHub => "dockerhub",
            Provider::Ghcr => "ghcr",
            Provider::Gitlab => "gitlab",
            Provider::Quay => "quay",
            Provider::Ecr => "ecr",
            Provider::Gcr => "gcr",
            Provider::Gar => "gar",
            Provider::Acr => "acr",
            Provider::Gitea => "gitea",
            Provider::Harbor => "harbor",
            Provider::Local => "local",
            Provider::Generic => "generic",
        }
    }

    /// Map a configured provider name onto the closed set.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "dockerhub" | "docker" | "docker.io" => Provider::DockerHub,
            "ghcr" | "github" => Provider::Ghcr,
            "gitlab" => Provider::Gitlab,
            "quay" => Provider::Quay,
            "ecr" | "aws" => Provider::Ecr,
            "gcr" => Provider::Gcr,
            "gar" | "artifact-registry" => Provider::Gar,
            "acr" | "azure" => Provider::Acr,
            "gitea" | "forgejo" => Provider::Gitea,
            "harbor" => Provider::Harbor,
            "local" => Provider::Local,
            _ => Provider::Generic,
        }
    }

    /// Infer the provider from a registry URL's hostname.
    pub fn detect(url: &str) -> Self {
        let host = registry_host(url);
        let host = host.split(':').next().unwrap_or_default();

        match host {
            "" | "docker.io" | "index.docker.io" | "registry-1.docker.io" => Provider::DockerHub,
            "ghcr.io" => Provider::Ghcr,
            "registry.gitlab.com" => Provider::Gitlab,
            "quay.io" => Provider::Quay,
            "public.ecr.aws" => Provider::Ecr,
            "gcr.io" => Provider::Gcr,
            h if h.contains(".dkr.ecr.") && h.ends_with(".amazonaws.com") => Provider::Ecr,
            h if h.ends_with(".gcr.io") => Provider::Gcr,
            h if h.ends_with("-docker.pkg.dev") => Provider::Gar,
            h if h.ends_with(".azurecr.io") => Provider::Acr,
            _ => Provider::Generic,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lowercased host[:port] portion of a registry URL.
pub fn registry_host(url: &str) -> String {
    let rest = url
        .trim()
        .trim_start_matches("https://")
        .trim_start_matches("http://");
    rest.split('/').next().unwrap_or_default().to_ascii_lowercase()
}
