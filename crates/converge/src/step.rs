//! The ordered step pipeline.
//!
//! Steps run in declared order; there is no dependency-graph scheduling. The
//! declarer orders steps consistently with their `depends_on` sets, which is
//! the right trade for a short linear bootstrap workflow. A soft failure is
//! recorded and execution continues; a hard failure stops the loop.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::identifiers::StepName;
use crate::types::GatewayId;

/// How one step ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    /// The step's effect is in place (including already-exists responses).
    Success,
    /// The step failed but the workflow can continue without it.
    SoftFailure {
        /// Why the step failed.
        reason: String,
    },
    /// A precondition violation severe enough to stop the workflow.
    HardFailure {
        /// Why the workflow cannot continue.
        reason: String,
    },
}

/// The record one step leaves behind.
///
/// Produced by exactly one step; later steps read it from the context by
/// step name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    /// Name of the step that produced this result.
    pub step: StepName,
    /// Server-assigned identifier the step obtained, if any.
    pub identifier: Option<GatewayId>,
    /// How the step ended.
    pub outcome: StepOutcome,
}

impl StepResult {
    /// A successful result with no identifier.
    pub fn success(step: StepName) -> Self {
        Self {
            step,
            identifier: None,
            outcome: StepOutcome::Success,
        }
    }

    /// A successful result carrying a server-assigned identifier.
    pub fn success_with_id(step: StepName, id: GatewayId) -> Self {
        Self {
            step,
            identifier: Some(id),
            outcome: StepOutcome::Success,
        }
    }

    /// A recoverable failure; the pipeline continues.
    pub fn soft_failure(step: StepName, reason: impl Into<String>) -> Self {
        Self {
            step,
            identifier: None,
            outcome: StepOutcome::SoftFailure {
                reason: reason.into(),
            },
        }
    }

    /// An unrecoverable failure; the pipeline stops.
    pub fn hard_failure(step: StepName, reason: impl Into<String>) -> Self {
        Self {
            step,
            identifier: None,
            outcome: StepOutcome::HardFailure {
                reason: reason.into(),
            },
        }
    }

    /// `true` for [`StepOutcome::Success`].
    pub fn is_success(&self) -> bool {
        self.outcome == StepOutcome::Success
    }
}

/// Accumulated results of the steps that have run so far.
///
/// Owned exclusively by the pipeline for the duration of one run and
/// discarded afterwards; steps see it read-only. Append-only: a step's
/// result is recorded once and never replaced.
#[derive(Debug, Default)]
pub struct PipelineContext {
    results: HashMap<StepName, StepResult>,
}

impl PipelineContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a step's result. The first record for a name wins.
    pub fn record(&mut self, result: StepResult) {
        debug_assert!(
            !self.results.contains_key(&result.step),
            "step results are recorded exactly once"
        );
        self.results.entry(result.step.clone()).or_insert(result);
    }

    /// The result of an earlier step, if it has run.
    pub fn result(&self, step: &StepName) -> Option<&StepResult> {
        self.results.get(step)
    }

    /// The identifier an earlier step obtained, if any.
    pub fn identifier(&self, step: &StepName) -> Option<&GatewayId> {
        self.results.get(step).and_then(|r| r.identifier.as_ref())
    }
}

/// One provisioning or verification action in the pipeline.
#[async_trait]
pub trait PipelineStep: Send + Sync {
    /// Unique step name; later steps reference this result by it.
    fn name(&self) -> StepName;

    /// Names of earlier steps whose results this step reads.
    fn depends_on(&self) -> Vec<StepName> {
        Vec::new()
    }

    /// Performs the step. Remote failures must be folded into the returned
    /// [`StepResult`], never propagated as errors.
    async fn execute(&self, ctx: &PipelineContext) -> StepResult;
}

/// Runs an ordered sequence of steps, continuing past soft failures.
pub struct StepPipeline {
    steps: Vec<Box<dyn PipelineStep>>,
}

impl StepPipeline {
    pub fn new(steps: Vec<Box<dyn PipelineStep>>) -> Self {
        Self { steps }
    }

    /// Executes every step in declared order.
    ///
    /// The context is created here and dropped with the returned report;
    /// nothing persists across runs.
    pub async fn run(&self) -> PipelineReport {
        let mut ctx = PipelineContext::new();
        let mut results = Vec::with_capacity(self.steps.len());

        for step in &self.steps {
            let name = step.name();
            for dependency in step.depends_on() {
                let satisfied = ctx
                    .result(&dependency)
                    .is_some_and(StepResult::is_success);
                if !satisfied {
                    tracing::warn!(
                        step = %name,
                        dependency = %dependency,
                        "dependency did not succeed; step falls back to declared names"
                    );
                }
            }

            tracing::info!(step = %name, "running step");
            let result = step.execute(&ctx).await;
            let stop = match &result.outcome {
                StepOutcome::Success => {
                    tracing::info!(step = %name, "step completed");
                    false
                }
                StepOutcome::SoftFailure { reason } => {
                    tracing::warn!(step = %name, %reason, "step failed; continuing");
                    false
                }
                StepOutcome::HardFailure { reason } => {
                    tracing::error!(step = %name, %reason, "step failed; stopping pipeline");
                    true
                }
            };
            ctx.record(result.clone());
            results.push(result);
            if stop {
                break;
            }
        }

        PipelineReport { results }
    }
}

/// Results of every step that ran, in execution order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    /// One entry per executed step.
    pub results: Vec<StepResult>,
}

impl PipelineReport {
    /// `true` when any step ended in [`StepOutcome::HardFailure`].
    pub fn has_hard_failure(&self) -> bool {
        self.results
            .iter()
            .any(|r| matches!(r.outcome, StepOutcome::HardFailure { .. }))
    }

    /// Number of steps that ended in [`StepOutcome::SoftFailure`].
    pub fn soft_failure_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, StepOutcome::SoftFailure { .. }))
            .count()
    }
}
