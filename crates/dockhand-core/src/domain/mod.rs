//! Domain models for Dockhand.
//!
//! Canonical definitions for the pipeline's data:
//! - `Detection`: what the repository contains
//! - `VersionInfo`: version identity derived from git
//! - `BuildPlan`: ordered build steps and their registry targets
//! - `BuildResult`: per-step outcomes and reconstructed layer events

pub mod detection;
pub mod error;
pub mod plan;
pub mod result;
pub mod version;

// Re-export main types and errors
pub use detection::{BuildFileInfo, Detection, GitInfo, Stage};
pub use error::{DockhandError, Result};
pub use plan::{
    BuildPlan, BuildStep, ExtractRule, OutputMode, Provider, RegistryTarget, RetentionPolicy,
};
pub use result::{BuildResult, LayerEvent, Phase, StepError, StepResult, StepStatus};
pub use version::VersionInfo;
