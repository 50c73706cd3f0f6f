//! Sequential plan execution: login, build, push, save and retention for
//! each step in plan order.

use std::io::Write;
use std::sync::Arc;
use std::time::Instant;

use dockhand_core::obs;
use dockhand_core::{
    BuildPlan, BuildResult, BuildStep, DockhandError, Environment, Phase, RegistryTarget, Result,
    StepResult,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, Instrument};

use crate::driver::BuilderDriver;
use crate::registry::{resolve_credentials, Credentials, RegistryClients};

/// Runs a [`BuildPlan`] one step at a time.
pub struct Executor {
    driver: BuilderDriver,
    registries: RegistryClients,
    env: Arc<dyn Environment>,
    stream: bool,
}

/// Login needed before a step runs.
struct Login<'a> {
    target: &'a RegistryTarget,
    credentials: Credentials,
}

impl Executor {
    pub fn new(driver: BuilderDriver, registries: RegistryClients, env: Arc<dyn Environment>) -> Self {
        Self {
            driver,
            registries,
            env,
            stream: false,
        }
    }

    /// Echo builder progress to stderr while building.
    pub fn streaming(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    /// Execute every step of `plan` in order, stopping at the first failure.
    ///
    /// Credentials for every step are checked before anything runs. Failed
    /// steps are reported in the result; `Err` means a configuration error
    /// or cancellation.
    pub async fn execute(&self, plan: &BuildPlan, cancel: &CancellationToken) -> Result<BuildResult> {
        let started = Instant::now();
        let logins = plan
            .steps
            .iter()
            .map(|step| self.logins_for(step))
            .collect::<Result<Vec<_>>>()?;

        let mut result = BuildResult::default();
        for (step, logins) in plan.steps.iter().zip(logins) {
            if cancel.is_cancelled() {
                return Err(DockhandError::Cancelled);
            }
            let outcome = self
                .run_step(step, logins, cancel)
                .instrument(obs::step_span(&step.id))
                .await?;
            let failed = !outcome.passed();
            result.steps.push(outcome);
            if failed {
                break;
            }
        }
        result.elapsed = started.elapsed();

        info!(
            passed = result.passed_count(),
            failed = result.failed_count(),
            duration_ms = result.elapsed.as_millis() as u64,
            "plan finished"
        );
        Ok(result)
    }

    fn logins_for<'a>(&self, step: &'a BuildStep) -> Result<Vec<Login<'a>>> {
        if !step.push && !step.load {
            return Ok(Vec::new());
        }
        let mut logins = Vec::new();
        for target in step.remote_registries() {
            if let Some(credentials) = resolve_credentials(target, self.env.as_ref())? {
                logins.push(Login { target, credentials });
            }
        }
        Ok(logins)
    }

    async fn run_step(
        &self,
        step: &BuildStep,
        logins: Vec<Login<'_>>,
        cancel: &CancellationToken,
    ) -> Result<StepResult> {
        let started = Instant::now();
        obs::emit_step_started(&step.id, step.tags.len(), step.push, step.load);

        for login in &logins {
            let client = self.registries.get(login.target.provider);
            if let Err(err) = client.login(login.target, &login.credentials, cancel).await {
                let err = unless_cancelled(err)?;
                let result = StepResult::failed(
                    &step.id,
                    Phase::Login,
                    format!("{}: {err}", login.target.repository()),
                    Vec::new(),
                    started.elapsed(),
                );
                obs::emit_step_finished(&result);
                return Ok(result);
            }
        }

        let mut result = if self.stream {
            self.driver
                .run_step_streaming(step, cancel, |line| {
                    let _ = writeln!(std::io::stderr(), "{line}");
                })
                .await?
        } else {
            self.driver.run_step(step, cancel).await?
        };
        for layer in &result.layers {
            obs::emit_layer_completed(&step.id, layer);
        }

        if result.passed() {
            self.publish(step, &mut result, cancel).await?;
        }
        if result.passed() && step.load {
            self.save(step, &mut result, cancel).await?;
        }
        if result.passed() && !result.pushed.is_empty() {
            self.apply_retention(step, cancel).await?;
        }

        result.elapsed = started.elapsed();
        obs::emit_step_finished(&result);
        Ok(result)
    }

    /// Record what the builder pushed, or push loaded images explicitly.
    async fn publish(
        &self,
        step: &BuildStep,
        result: &mut StepResult,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if step.push {
            result.pushed = step.remote_references();
            return Ok(());
        }
        if !step.load {
            return Ok(());
        }

        for target in step.remote_registries() {
            let client = self.registries.get(target.provider);
            for reference in target.references() {
                let pushed_at = Instant::now();
                if let Err(err) = client.push(&reference, cancel).await {
                    let err = unless_cancelled(err)?;
                    result.fail(Phase::Push, format!("{reference}: {err}"));
                    return Ok(());
                }
                obs::emit_push_completed(&step.id, &reference, pushed_at.elapsed());
                result.pushed.push(reference);
            }
        }
        Ok(())
    }

    async fn save(
        &self,
        step: &BuildStep,
        result: &mut StepResult,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let (Some(path), Some(reference)) = (&step.save, step.tags.first()) else {
            return Ok(());
        };
        match self.driver.save(path, reference, cancel).await {
            Ok(()) => result.artifacts.push(path.clone()),
            Err(err) => {
                let err = unless_cancelled(err)?;
                result.fail(Phase::Save, err.to_string());
            }
        }
        Ok(())
    }

    /// Retention problems are logged; they never fail the step.
    async fn apply_retention(&self, step: &BuildStep, cancel: &CancellationToken) -> Result<()> {
        for target in step.remote_registries() {
            let Some(policy) = &target.retention else {
                continue;
            };
            let repository = target.repository();
            match self
                .registries
                .get(target.provider)
                .apply_retention(target, policy, cancel)
                .await
            {
                Ok(()) => obs::emit_retention_applied(&step.id, &repository),
                Err(err) => {
                    let err = unless_cancelled(err)?;
                    obs::emit_retention_skipped(&step.id, &repository, &err);
                }
            }
        }
        Ok(())
    }
}

/// Cancellation aborts the run; anything else becomes a step failure.
fn unless_cancelled(err: DockhandError) -> Result<DockhandError> {
    match err {
        DockhandError::Cancelled => Err(DockhandError::Cancelled),
        other => Ok(other),
    }
}
