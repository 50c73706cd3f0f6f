//! Supported build engines and their command lines.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use dockhand_core::{BuildStep, OutputMode};
use serde::{Deserialize, Serialize};

/// External image builder.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum BuildEngine {
    /// docker buildx build
    #[default]
    Buildx,

    /// nerdctl build
    Nerdctl,
}

impl BuildEngine {
    pub fn name(&self) -> &'static str {
        match self {
            BuildEngine::Buildx => "buildx",
            BuildEngine::Nerdctl => "nerdctl",
        }
    }

    /// Executable used for build, push, save and login.
    pub fn program(&self) -> &'static str {
        match self {
            BuildEngine::Buildx => "docker",
            BuildEngine::Nerdctl => "nerdctl",
        }
    }

    fn build_subcommand(&self) -> &'static [&'static str] {
        match self {
            BuildEngine::Buildx => &["buildx", "build"],
            BuildEngine::Nerdctl => &["build"],
        }
    }

    /// Arguments for building `step`, without the program name.
    ///
    /// Order: file, target, platforms, build args, tags, output, context.
    pub fn build_args(&self, step: &BuildStep, plain_progress: bool) -> Vec<String> {
        let mut args: Vec<String> = self
            .build_subcommand()
            .iter()
            .map(|s| s.to_string())
            .collect();
        if plain_progress {
            args.push("--progress=plain".to_string());
        }

        args.push("--file".to_string());
        args.push(path_arg(&step.build_file));

        if let Some(target) = &step.target {
            args.push("--target".to_string());
            args.push(target.clone());
        }

        if !step.platforms.is_empty() {
            args.push("--platform".to_string());
            args.push(step.platforms.join(","));
        }

        for (name, value) in &step.args {
            args.push("--build-arg".to_string());
            args.push(format!("{name}={value}"));
        }

        for tag in &step.tags {
            args.push("--tag".to_string());
            args.push(tag.clone());
        }

        args.extend(self.output_args(step));
        args.push(path_arg(&step.context));
        args
    }

    fn output_args(&self, step: &BuildStep) -> Vec<String> {
        match &step.output {
            OutputMode::Local { dest } => vec![
                "--output".to_string(),
                format!("type=local,dest={}", dest.display()),
            ],
            OutputMode::Tar { dest } => vec![
                "--output".to_string(),
                format!("type=tar,dest={}", dest.display()),
            ],
            OutputMode::Image => match (self, step.push, step.load) {
                (BuildEngine::Buildx, true, _) => vec!["--push".to_string()],
                (BuildEngine::Buildx, false, true) => vec!["--load".to_string()],
                (BuildEngine::Nerdctl, true, _) => vec![
                    "--output".to_string(),
                    "type=image,push=true".to_string(),
                ],
                // nerdctl stores into containerd without a flag.
                _ => Vec::new(),
            },
        }
    }

    pub fn push_args(&self, reference: &str) -> Vec<String> {
        vec!["push".to_string(), reference.to_string()]
    }

    pub fn save_args(&self, path: &Path, reference: &str) -> Vec<String> {
        vec![
            "save".to_string(),
            "-o".to_string(),
            path_arg(path),
            reference.to_string(),
        ]
    }

    /// `login` reading the password from stdin. An empty host logs into the
    /// default registry.
    pub fn login_args(&self, host: &str, username: &str) -> Vec<String> {
        let mut args = vec![
            "login".to_string(),
            "--username".to_string(),
            username.to_string(),
            "--password-stdin".to_string(),
        ];
        if !host.is_empty() {
            args.push(host.to_string());
        }
        args
    }
}

impl fmt::Display for BuildEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BuildEngine {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buildx" | "docker" => Ok(BuildEngine::Buildx),
            "nerdctl" => Ok(BuildEngine::Nerdctl),
            other => Err(format!("unknown build engine '{other}' (expected buildx or nerdctl)")),
        }
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
