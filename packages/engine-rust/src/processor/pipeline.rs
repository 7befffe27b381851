//! Sequential step execution with failure short-circuiting.

use std::sync::Arc;

use switchyard_core::{Exchange, FailureOutcome, Processor, RouteError};
use tracing::debug;

/// How a pipeline run ended.
#[derive(Debug, Clone)]
pub enum PipelineOutcome {
    /// Every step ran without a failure (or every failure was continued).
    Completed,
    /// A failure was recovered and the exchange marked handled; the remaining
    /// steps were skipped.
    Handled,
    /// A failure was not recovered. The error is the one left in the
    /// exchange's exception slot.
    Failed(RouteError),
}

/// Ordered list of steps bound to a route.
///
/// Steps run strictly in registration order. On the first failure the
/// pipeline stops and forwards the error to the exchange's unit of work
/// instead of returning it, so the exception policy sees every failure before
/// the route's caller does.
#[derive(Clone, Default)]
pub struct Pipeline {
    steps: Vec<Arc<dyn Processor>>,
}

impl Pipeline {
    #[must_use]
    pub fn new(steps: Vec<Arc<dyn Processor>>) -> Self {
        Self { steps }
    }

    /// Appends a step.
    pub fn push(&mut self, step: Arc<dyn Processor>) {
        self.steps.push(step);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Runs the steps against `exchange`.
    ///
    /// After a failure the outcome of the unit of work's `fail` decides what
    /// happens: `Handled` stops the pipeline, `Continued` moves on to the next
    /// step, `Unhandled` stops with [`PipelineOutcome::Failed`]. A step that
    /// returns successfully after marking the exchange handled (its failure
    /// was recovered through a shared scope) also stops the pipeline.
    pub async fn run(&self, exchange: &mut Exchange) -> PipelineOutcome {
        for (index, step) in self.steps.iter().enumerate() {
            let handled_before = exchange.is_handled();
            match step.process(exchange).await {
                Ok(()) => {
                    if exchange.is_handled() && !handled_before {
                        debug!(
                            exchange_id = %exchange.id(),
                            step = step.label(),
                            index,
                            "exchange handled inside step, stopping pipeline"
                        );
                        return PipelineOutcome::Handled;
                    }
                }
                Err(error) => {
                    debug!(
                        exchange_id = %exchange.id(),
                        step = step.label(),
                        index,
                        %error,
                        "step failed"
                    );
                    let Some(uow) = exchange.unit_of_work().cloned() else {
                        exchange.set_exception(error.clone());
                        return PipelineOutcome::Failed(error);
                    };
                    let fallback = error.clone();
                    match uow.fail(exchange, error).await {
                        FailureOutcome::Handled => return PipelineOutcome::Handled,
                        FailureOutcome::Continued => {}
                        FailureOutcome::Unhandled => {
                            let error = exchange.exception().cloned().unwrap_or(fallback);
                            return PipelineOutcome::Failed(error);
                        }
                    }
                }
            }
        }
        PipelineOutcome::Completed
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let labels: Vec<&str> = self.steps.iter().map(|s| s.label()).collect();
        f.debug_struct("Pipeline").field("steps", &labels).finish()
    }
}

/// Runs `steps` in order without funneling failures anywhere: the first
/// failure is returned as-is. Used for recovery pipelines, whose failures
/// must not re-enter the policy that is running them.
///
/// # Errors
///
/// Returns the first step failure.
pub async fn run_steps(steps: &[Arc<dyn Processor>], exchange: &mut Exchange) -> Result<(), RouteError> {
    for step in steps {
        step.process(exchange).await?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
