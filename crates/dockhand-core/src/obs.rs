//! Structured observability hooks for build lifecycle events.
//!
//! This module provides:
//! - Step-scoped tracing spans via the `StepSpan` RAII guard
//! - Emission functions for plan assembly, step start/finish, layer
//!   completion, pushes and retention
//!
//! Events are emitted at `info!` level (filter with `RUST_LOG`).

use std::time::Duration;

use tracing::{info, warn};

use crate::domain::{BuildPlan, LayerEvent, StepResult};

/// Span carrying `step = <id>`; attach to async work with
/// `tracing::Instrument`.
pub fn step_span(step_id: &str) -> tracing::Span {
    tracing::info_span!("dockhand.step", step = %step_id)
}

/// RAII guard that enters a step-scoped tracing span.
///
/// Not `Send`; use [`step_span`] across `.await` points.
///
/// # Example
///
/// ```ignore
/// let _span = StepSpan::enter("api");
/// // every event logged now carries step = "api"
/// ```
pub struct StepSpan {
    _span: tracing::span::EnteredSpan,
}

impl StepSpan {
    pub fn enter(step_id: &str) -> Self {
        Self {
            _span: step_span(step_id).entered(),
        }
    }
}

/// Emit event: plan assembled.
pub fn emit_plan_assembled(plan: &BuildPlan) {
    let digest = plan.digest();
    info!(
        event = "plan.assembled",
        steps = plan.steps.len(),
        digest = %&digest[..12],
    );
}

pub fn emit_step_started(step_id: &str, tags: usize, push: bool, load: bool) {
    info!(
        event = "step.started",
        step = %step_id,
        tags = tags,
        push = push,
        load = load,
    );
}

/// Emit event: one reconstructed builder layer.
pub fn emit_layer_completed(step_id: &str, layer: &LayerEvent) {
    info!(
        event = "layer.completed",
        step = %step_id,
        layer = layer.id,
        instruction = %layer.instruction,
        cached = layer.cached,
        duration_ms = layer.duration.as_millis() as u64,
    );
}

/// Emit event: step finished with status and duration.
pub fn emit_step_finished(result: &StepResult) {
    let elapsed_ms = result.elapsed.as_millis() as u64;
    match &result.error {
        None => info!(
            event = "step.finished",
            step = %result.id,
            status = ?result.status,
            duration_ms = elapsed_ms,
            layers = result.layers.len(),
            pushed = result.pushed.len(),
        ),
        Some(err) => warn!(
            event = "step.failed",
            step = %result.id,
            phase = %err.phase,
            duration_ms = elapsed_ms,
            error = %err.message,
        ),
    }
}

pub fn emit_push_completed(step_id: &str, reference: &str, elapsed: Duration) {
    info!(
        event = "push.completed",
        step = %step_id,
        reference = %reference,
        duration_ms = elapsed.as_millis() as u64,
    );
}

pub fn emit_retention_applied(step_id: &str, repository: &str) {
    info!(event = "retention.applied", step = %step_id, repository = %repository);
}

/// Emit event: retention failed; the step still counts as successful.
pub fn emit_retention_skipped(step_id: &str, repository: &str, error: &dyn std::fmt::Display) {
    warn!(
        event = "retention.skipped",
        step = %step_id,
        repository = %repository,
        error = %error,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Phase;

    #[test]
    fn test_step_span_create() {
        let _span = StepSpan::enter("api");
    }

    #[test]
    fn test_emitters_accept_failed_results() {
        let result = StepResult::failed("api", Phase::Push, "denied", Vec::new(), Duration::ZERO);
        emit_step_finished(&result);
        emit_plan_assembled(&BuildPlan::default());
    }
}
