//! Build plan assembly.
//!
//! Combines a [`Detection`], a [`VersionInfo`] and the declarative
//! [`Config`] into an ordered [`BuildPlan`]. Each step gets its build file,
//! templated arguments and tags, the registry targets whose filters pass,
//! and finally a load/push strategy.

pub mod filter;

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::ci;
use crate::config::{BuildConfig, Config, RegistryConfig};
use crate::detect::buildfile;
use crate::domain::{
    BuildFileInfo, BuildPlan, BuildStep, Detection, DockhandError, ExtractRule, OutputMode,
    Provider, RegistryTarget, Result, VersionInfo,
};
use crate::env::Environment;
use crate::obs;
use crate::template::{repo_name_from_url, RepoProbe, TemplateContext};

pub use filter::{target_applies, Filter};

/// Id of the build planned when the configuration lists none.
pub const DEFAULT_BUILD_ID: &str = "default";

static TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.-]{0,127}$").expect("tag pattern is valid")
});

/// Whether `tag` is a legal image tag.
pub fn is_valid_tag(tag: &str) -> bool {
    TAG.is_match(tag)
}

/// Which builds to plan and how.
#[derive(Debug, Clone, Default)]
pub struct PlanRequest {
    /// Build ids to include; empty plans every build.
    pub builds: Vec<String>,
    /// Load locally and never push.
    pub local: bool,
}

/// Assembles a [`BuildPlan`].
pub struct PlanAssembler<'a> {
    detection: &'a Detection,
    version: &'a VersionInfo,
    config: &'a Config,
    env: &'a dyn Environment,
    repo: Option<&'a dyn RepoProbe>,
    now: DateTime<Utc>,
}

impl<'a> PlanAssembler<'a> {
    pub fn new(
        detection: &'a Detection,
        version: &'a VersionInfo,
        config: &'a Config,
        env: &'a dyn Environment,
    ) -> Self {
        Self {
            detection,
            version,
            config,
            env,
            repo: None,
            now: Utc::now(),
        }
    }

    /// Enable scoped-version and commit-date tokens.
    pub fn with_repo(mut self, repo: &'a dyn RepoProbe) -> Self {
        self.repo = Some(repo);
        self
    }

    /// Pin the clock used for date tokens and build timestamps.
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    pub fn assemble(&self, request: &PlanRequest) -> Result<BuildPlan> {
        let implicit;
        let builds: &[BuildConfig] = if self.config.builds.is_empty() {
            implicit = [BuildConfig {
                id: DEFAULT_BUILD_ID.to_string(),
                ..Default::default()
            }];
            &implicit
        } else {
            &self.config.builds
        };

        for id in &request.builds {
            if !builds.iter().any(|b| &b.id == id) {
                return Err(DockhandError::UnknownBuild(id.clone()));
            }
        }

        let selected = builds
            .iter()
            .filter(|b| request.builds.is_empty() || request.builds.contains(&b.id));

        let mut plan = BuildPlan::default();
        for build in selected {
            let step = self.assemble_step(build, request.local)?;
            debug!(
                step = %step.id,
                tags = step.tags.len(),
                registries = step.registries.len(),
                load = step.load,
                push = step.push,
                "step planned"
            );
            plan.steps.push(step);
        }

        obs::emit_plan_assembled(&plan);
        Ok(plan)
    }

    fn context(&self) -> TemplateContext<'_> {
        let ctx = TemplateContext::new(self.version, self.env)
            .with_vars(&self.config.vars)
            .with_project(&self.config.project)
            .at(self.now);
        match self.repo {
            Some(repo) => ctx.with_repo(repo),
            None => ctx,
        }
    }

    fn assemble_step(&self, build: &BuildConfig, local: bool) -> Result<BuildStep> {
        let _span = obs::StepSpan::enter(&build.id);
        let root = &self.detection.root;
        let ctx = self.context();
        let file = self.resolve_build_file(build)?;

        let mut args: BTreeMap<String, String> = build
            .args
            .iter()
            .map(|(k, v)| (k.clone(), ctx.resolve(v)))
            .collect();
        self.inject_standard_args(&file, &mut args);

        let image = self.image_name(build, &ctx);
        let mut tags = Vec::new();
        for (index, template) in build.tags.iter().enumerate() {
            let resolved = ctx.resolve(template).replace('+', "-");
            let (repo, tag) = split_reference(&resolved);
            let (repo, tag) = match tag {
                Some(tag) => (repo.to_string(), tag.to_string()),
                None => (image.clone(), resolved.clone()),
            };
            if !is_valid_tag(&tag) {
                return Err(DockhandError::InvalidTag {
                    build: build.id.clone(),
                    index,
                    registry: Provider::Local.to_string(),
                    tag,
                });
            }
            tags.push(format!("{repo}:{tag}"));
        }

        let mut registries = Vec::new();
        for (index, registry) in build.registries.iter().enumerate() {
            if let Some(target) = self.resolve_target(build, index, registry, &ctx)? {
                registries.push(target);
            }
        }

        let mut step = BuildStep {
            id: build.id.clone(),
            build_file: root.join(&file.path),
            context: root.join(build.context.as_deref().unwrap_or(Path::new("."))),
            target: build.target.as_ref().map(|t| ctx.resolve(t)),
            platforms: build.platforms.clone(),
            args,
            tags,
            output: match &build.output {
                OutputMode::Image => OutputMode::Image,
                OutputMode::Local { dest } => OutputMode::Local {
                    dest: root.join(dest),
                },
                OutputMode::Tar { dest } => OutputMode::Tar {
                    dest: root.join(dest),
                },
            },
            extract: build
                .extract
                .iter()
                .map(|rule| ExtractRule {
                    from: rule.from.clone(),
                    to: root.join(&rule.to).to_string_lossy().into_owned(),
                })
                .collect(),
            registries,
            load: false,
            push: false,
            save: build.save.as_ref().map(|p| root.join(p)),
        };

        let default_tag = format!("{image}:{}", self.version.tag_safe_version());
        apply_strategy(&mut step, local || build.local, &default_tag);
        Ok(step)
    }

    /// Explicit path first, then the first discovered build file.
    fn resolve_build_file(&self, build: &BuildConfig) -> Result<BuildFileInfo> {
        let root = &self.detection.root;
        match &build.file {
            Some(path) => {
                if let Some(info) = self.detection.build_file(path) {
                    return Ok(info.clone());
                }
                let content = std::fs::read_to_string(root.join(path)).map_err(|e| {
                    DockhandError::NoBuildFile {
                        build: build.id.clone(),
                        reason: format!("{}: {e}", path.display()),
                    }
                })?;
                Ok(buildfile::parse(path, &content).unwrap_or_else(|e| {
                    warn!(build = %build.id, path = %path.display(), error = %e, "build file not parsed");
                    BuildFileInfo {
                        path: path.clone(),
                        ..Default::default()
                    }
                }))
            }
            None => self
                .detection
                .build_files
                .first()
                .cloned()
                .ok_or_else(|| DockhandError::NoBuildFile {
                    build: build.id.clone(),
                    reason: format!("none found under {}", root.display()),
                }),
        }
    }

    /// Add standard arguments the build file declares but the user did not set.
    fn inject_standard_args(&self, file: &BuildFileInfo, args: &mut BTreeMap<String, String>) {
        let timestamp = self.now.to_rfc3339_opts(SecondsFormat::Secs, true);
        let standard = [
            ("VERSION", self.version.version.clone()),
            ("COMMIT", self.version.sha.clone()),
            ("GIT_COMMIT", self.version.sha.clone()),
            ("GIT_SHA", self.version.sha.clone()),
            ("REVISION", self.version.sha.clone()),
            ("BUILD_DATE", timestamp.clone()),
            ("BUILD_TIMESTAMP", timestamp),
        ];
        for (name, value) in standard {
            if file.declares_arg(name) && !args.contains_key(name) {
                args.insert(name.to_string(), value);
            }
        }
    }

    fn image_name(&self, build: &BuildConfig, ctx: &TemplateContext<'_>) -> String {
        if let Some(image) = build.image.as_ref().map(|i| ctx.resolve(i)) {
            if !image.is_empty() {
                return image;
            }
        }
        if !self.config.project.name.is_empty() {
            return self.config.project.name.to_ascii_lowercase();
        }
        self.detection
            .git
            .as_ref()
            .and_then(|g| g.remote_url.as_deref())
            .and_then(repo_name_from_url)
            .or_else(|| {
                self.detection
                    .root
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
            })
            .map(|n| n.to_ascii_lowercase())
            .unwrap_or_else(|| build.id.clone())
    }

    fn current_branch(&self) -> Option<String> {
        Some(self.version.branch.clone())
            .filter(|b| !b.is_empty())
            .or_else(|| self.detection.git.as_ref().and_then(|g| g.branch.clone()))
    }

    fn current_tag(&self) -> Option<String> {
        self.version.tag.clone().or_else(|| ci::ci_tag(self.env))
    }

    fn resolve_target(
        &self,
        build: &BuildConfig,
        index: usize,
        registry: &RegistryConfig,
        ctx: &TemplateContext<'_>,
    ) -> Result<Option<RegistryTarget>> {
        let branch = self.current_branch();
        let tag = self.current_tag();
        if !target_applies(
            &registry.on_branches,
            &registry.on_tags,
            &self.config.patterns,
            branch.as_deref(),
            tag.as_deref(),
        ) {
            debug!(
                build = %build.id,
                registry = %registry.url,
                branch = ?branch,
                tag = ?tag,
                "registry target filtered out"
            );
            return Ok(None);
        }

        let url = ctx.resolve(&registry.url);
        let path = ctx.resolve(&registry.path);
        let templates = if registry.tags.is_empty() {
            vec!["{version}".to_string()]
        } else {
            registry.tags.clone()
        };

        let mut tags = Vec::with_capacity(templates.len());
        for template in &templates {
            let resolved = ctx.resolve(template).replace('+', "-");
            if !is_valid_tag(&resolved) {
                return Err(DockhandError::InvalidTag {
                    build: build.id.clone(),
                    index,
                    registry: if url.is_empty() { path.clone() } else { url.clone() },
                    tag: resolved,
                });
            }
            if !tags.contains(&resolved) {
                tags.push(resolved);
            }
        }

        let provider = registry
            .provider
            .as_deref()
            .map(Provider::from_name)
            .unwrap_or_else(|| Provider::detect(&url));

        Ok(Some(RegistryTarget {
            url,
            path,
            tags,
            tag_patterns: templates,
            credentials: registry.credentials.clone(),
            provider,
            retention: registry.retention.clone(),
        }))
    }
}

/// Split `repo:tag`; a colon that belongs to a registry port is not a tag.
fn split_reference(reference: &str) -> (&str, Option<&str>) {
    match reference.rsplit_once(':') {
        Some((repo, tag)) if !tag.contains('/') && !repo.is_empty() => (repo, Some(tag)),
        _ => (reference, None),
    }
}

/// Decide load/push for a step and finalise its tag list.
///
/// Precedence: non-image output, local-only, no registries, multi-platform,
/// then single-platform load-then-push.
pub fn apply_strategy(step: &mut BuildStep, local: bool, default_tag: &str) {
    if step.output != OutputMode::Image {
        step.load = false;
        step.push = false;
        step.tags = merge_tags(&step.tags, &step.remote_references());
        return;
    }

    if local {
        step.registries.clear();
    }

    if local || step.registries.is_empty() {
        if step.platforms.len() > 1 {
            warn!(
                step = %step.id,
                platforms = step.platforms.len(),
                "multi-platform image loaded locally; the builder may reject it"
            );
        }
        step.load = true;
        step.push = false;
        if step.tags.is_empty() {
            step.tags.push(default_tag.to_string());
        }
        info!(step = %step.id, "image will be loaded locally");
        return;
    }

    let remote = step.remote_references();
    if step.platforms.len() > 1 && !remote.is_empty() {
        // Every --tag is pushed, so only remote references may remain.
        let dropped: Vec<&String> = step.tags.iter().filter(|t| !remote.contains(t)).collect();
        if !dropped.is_empty() {
            warn!(step = %step.id, ?dropped, "local tags are not applied to pushed multi-platform images");
        }
        step.push = true;
        step.load = false;
        step.tags = remote;
        return;
    }

    if step.platforms.len() > 1 {
        warn!(
            step = %step.id,
            "no remote registry for multi-platform image; loading locally"
        );
    }
    step.load = true;
    step.push = false;
    step.tags = merge_tags(&step.tags, &all_references(step));
}

fn all_references(step: &BuildStep) -> Vec<String> {
    step.registries.iter().flat_map(|r| r.references()).collect()
}

fn merge_tags(local: &[String], remote: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(local.len() + remote.len());
    for tag in local.iter().chain(remote) {
        if !out.contains(tag) {
            out.push(tag.clone());
        }
    }
    out
}
