//! Dockhand Core Library
//!
//! The build pipeline up to execution: repository detection, version
//! derivation, template expansion and build plan assembly.
//!
//! root directory -> [`Detection`] -> [`VersionInfo`] -> [`BuildPlan`]

pub mod ci;
pub mod config;
pub mod detect;
pub mod domain;
pub mod env;
pub mod git;
pub mod obs;
pub mod plan;
pub mod telemetry;
pub mod template;
pub mod version;

pub use config::{BuildConfig, Config, RegistryConfig};

pub use detect::detect;

pub use domain::{
    BuildFileInfo, BuildPlan, BuildResult, BuildStep, Detection, DockhandError, ExtractRule,
    GitInfo, LayerEvent, OutputMode, Phase, Provider, RegistryTarget, Result, RetentionPolicy,
    Stage, StepError, StepResult, StepStatus, VersionInfo,
};

pub use env::{Environment, ProcessEnv};

pub use plan::{PlanAssembler, PlanRequest};

pub use template::{resolve, GitProbe, ProjectInfo, RepoProbe, TemplateContext};

pub use version::{detect_version, VersionDetector};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
