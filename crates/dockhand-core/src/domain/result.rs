//! Build outcomes and reconstructed layer events.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// One completed builder step reconstructed from the progress stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerEvent {
    /// Builder-assigned step number (`#N`).
    pub id: u32,
    /// Stage name; empty for anonymous stages.
    pub stage: String,
    /// Stage-step counter, e.g. `2/7`.
    pub step: String,
    /// Instruction keyword, e.g. `RUN`.
    pub instruction: String,
    /// Instruction text, truncated.
    pub detail: String,
    pub cached: bool,
    /// Zero for cache hits.
    pub duration: Duration,
    /// Base image reference for `FROM` steps.
    pub image: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Success,
    Failed,
    /// Succeeded with every layer served from cache.
    Cached,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StepStatus::Success => "success",
            StepStatus::Failed => "failed",
            StepStatus::Cached => "cached",
        })
    }
}

/// Which part of a step failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Login,
    Build,
    Push,
    Save,
    Extract,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Login => "login",
            Phase::Build => "build",
            Phase::Push => "push",
            Phase::Save => "save",
            Phase::Extract => "extract",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepError {
    pub phase: Phase,
    pub message: String,
}

impl fmt::Display for StepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.phase, self.message)
    }
}

/// Outcome of one build step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub id: String,
    pub status: StepStatus,
    /// Image references pushed to remote registries.
    pub pushed: Vec<String>,
    /// Extracted or saved artifact paths.
    pub artifacts: Vec<PathBuf>,
    pub layers: Vec<LayerEvent>,
    pub elapsed: Duration,
    pub error: Option<StepError>,
}

impl StepResult {
    /// A successful result, `Cached` when every layer was a cache hit.
    pub fn succeeded(id: &str, layers: Vec<LayerEvent>, elapsed: Duration) -> Self {
        let status = if !layers.is_empty() && layers.iter().all(|l| l.cached) {
            StepStatus::Cached
        } else {
            StepStatus::Success
        };
        Self {
            id: id.to_string(),
            status,
            pushed: Vec::new(),
            artifacts: Vec::new(),
            layers,
            elapsed,
            error: None,
        }
    }

    pub fn failed(
        id: &str,
        phase: Phase,
        message: impl Into<String>,
        layers: Vec<LayerEvent>,
        elapsed: Duration,
    ) -> Self {
        Self {
            id: id.to_string(),
            status: StepStatus::Failed,
            pushed: Vec::new(),
            artifacts: Vec::new(),
            layers,
            elapsed,
            error: Some(StepError {
                phase,
                message: message.into(),
            }),
        }
    }

    /// Mark an already-built step as failed in a later phase.
    pub fn fail(&mut self, phase: Phase, message: impl Into<String>) {
        self.status = StepStatus::Failed;
        self.error = Some(StepError {
            phase,
            message: message.into(),
        });
    }

    pub fn passed(&self) -> bool {
        self.status != StepStatus::Failed
    }
}

/// Aggregate of step results in plan order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct BuildResult {
    pub steps: Vec<StepResult>,
    pub elapsed: Duration,
}

impl BuildResult {
    pub fn success(&self) -> bool {
        self.steps.iter().all(StepResult::passed)
    }

    pub fn passed_count(&self) -> usize {
        self.steps.iter().filter(|s| s.passed()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.steps.iter().filter(|s| !s.passed()).count()
    }

    /// First failed step, if any.
    pub fn first_failure(&self) -> Option<&StepResult> {
        self.steps.iter().find(|s| !s.passed())
    }
}
