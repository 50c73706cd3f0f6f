//! Invokes the external builder for one [`BuildStep`].

use std::path::{Path, PathBuf};
use std::time::Instant;

use dockhand_core::{BuildStep, DockhandError, OutputMode, Phase, Result, StepResult};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::engine::BuildEngine;
use crate::process::{self, ProcessOutput};
use crate::progress::{parse_layers, LayerLogParser};

/// Lines of builder stderr kept in a failure message.
const FAILURE_TAIL_LINES: usize = 20;

/// Runs builds, pushes and saves through one engine's CLI.
#[derive(Debug, Clone)]
pub struct BuilderDriver {
    engine: BuildEngine,
    program: String,
}

impl BuilderDriver {
    pub fn new(engine: BuildEngine) -> Self {
        Self {
            engine,
            program: engine.program().to_string(),
        }
    }

    /// Use a different executable, keeping the engine's argument grammar.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn engine(&self) -> BuildEngine {
        self.engine
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn command(&self, args: &[String]) -> Command {
        let mut command = Command::new(&self.program);
        command.args(args);
        command
    }

    /// Build `step`, capturing the builder's output.
    ///
    /// A non-zero exit is a failed [`StepResult`] carrying whatever layers
    /// completed; `Err` is reserved for cancellation and spawn failures.
    pub async fn run_step(&self, step: &BuildStep, cancel: &CancellationToken) -> Result<StepResult> {
        let started = Instant::now();
        let args = self.engine.build_args(step, false);
        debug!(program = %self.program, args = ?args, "starting build");

        let output = process::run(&mut self.command(&args), None, cancel).await?;
        let layers = parse_layers(&output.stderr);
        self.finish_step(step, output, layers, started).await
    }

    /// Build `step` with plain progress, passing each progress line to
    /// `sink` while it runs.
    pub async fn run_step_streaming<F>(
        &self,
        step: &BuildStep,
        cancel: &CancellationToken,
        mut sink: F,
    ) -> Result<StepResult>
    where
        F: FnMut(&str),
    {
        let started = Instant::now();
        let args = self.engine.build_args(step, true);
        debug!(program = %self.program, args = ?args, "starting streaming build");

        let mut parser = LayerLogParser::new();
        let output = process::run_streaming(&mut self.command(&args), cancel, |line| {
            sink(line);
            parser.feed_line(line);
        })
        .await?;
        self.finish_step(step, output, parser.finish(), started).await
    }

    async fn finish_step(
        &self,
        step: &BuildStep,
        output: ProcessOutput,
        layers: Vec<dockhand_core::LayerEvent>,
        started: Instant,
    ) -> Result<StepResult> {
        if !output.success() {
            let message = DockhandError::ProcessFailed {
                program: output.program,
                code: output.code,
                stderr: process::tail(&output.stderr, FAILURE_TAIL_LINES),
            }
            .to_string();
            return Ok(StepResult::failed(
                &step.id,
                Phase::Build,
                message,
                layers,
                started.elapsed(),
            ));
        }

        let mut result = StepResult::succeeded(&step.id, layers, started.elapsed());
        match &step.output {
            OutputMode::Image => {}
            OutputMode::Tar { dest } => result.artifacts.push(dest.clone()),
            OutputMode::Local { dest } if step.extract.is_empty() => {
                result.artifacts.push(dest.clone())
            }
            OutputMode::Local { dest } => match extract(dest, step).await {
                Ok(paths) => result.artifacts.extend(paths),
                Err(err) => result.fail(Phase::Extract, err.to_string()),
            },
        }
        result.elapsed = started.elapsed();
        Ok(result)
    }

    /// Write `reference` to a tarball at `path`.
    pub async fn save(&self, path: &Path, reference: &str, cancel: &CancellationToken) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        info!(path = %path.display(), reference = %reference, "saving image");
        process::run(
            &mut self.command(&self.engine.save_args(path, reference)),
            None,
            cancel,
        )
        .await?
        .into_result()
        .map(|_| ())
    }
}

/// Copy every extraction rule's source out of the local export directory.
async fn extract(dest: &Path, step: &BuildStep) -> std::io::Result<Vec<PathBuf>> {
    let rules: Vec<(PathBuf, PathBuf)> = step
        .extract
        .iter()
        .map(|rule| (dest.join(rule.from.trim_start_matches('/')), PathBuf::from(&rule.to)))
        .collect();

    tokio::task::spawn_blocking(move || {
        let mut copied = Vec::with_capacity(rules.len());
        for (from, to) in rules {
            if !from.exists() {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("{} not found in build output", from.display()),
                ));
            }
            copy_recursive(&from, &to)?;
            copied.push(to);
        }
        Ok(copied)
    })
    .await
    .map_err(std::io::Error::other)?
}

fn copy_recursive(from: &Path, to: &Path) -> std::io::Result<()> {
    if from.is_dir() {
        std::fs::create_dir_all(to)?;
        for entry in std::fs::read_dir(from)? {
            let entry = entry?;
            copy_recursive(&entry.path(), &to.join(entry.file_name()))?;
        }
    } else {
        if let Some(parent) = to.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(from, to)?;
    }
    Ok(())
}
