//! Ordered step execution with per-step failure tolerance.
//!
//! Steps run strictly in declaration order. A failed step that does not
//! tolerate failure halts the sequence and every remaining step is recorded as
//! skipped. Which failures decide the process exit code is a separate policy,
//! expressed by [`ExitGate`].

use camino::Utf8Path;
use tracing::{info, warn};

use crate::invoke::{CommandRunner, InvokeError, ToolInvoker};

mod gate;
mod step;

pub use gate::{ExitGate, GateVerdict};
pub use step::{Guard, Step, StepOutcome, StepResult, StepState};

/// Overall result of a run.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RunOutcome {
    /// Every executed step succeeded.
    Success,
    /// Only tolerated, non-gating steps failed.
    PartialFailure,
    /// A required step halted the sequence or a gating step failed.
    Failure,
}

impl RunOutcome {
    /// Combines the sequencer's view with the exit gate's verdict.
    #[must_use]
    pub const fn resolve(sequence: Self, verdict: &GateVerdict) -> Self {
        match (sequence, verdict) {
            (Self::Failure, _) | (_, GateVerdict::Fail { .. }) => Self::Failure,
            (Self::PartialFailure, GateVerdict::Pass) => Self::PartialFailure,
            (Self::Success, GateVerdict::Pass) => Self::Success,
        }
    }

    /// Returns the process exit status for this outcome.
    #[must_use]
    pub const fn exit_code(self) -> i32 {
        match self {
            Self::Success | Self::PartialFailure => 0,
            Self::Failure => 1,
        }
    }

    /// Returns the label used in reports and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::PartialFailure => "partial failure",
            Self::Failure => "failure",
        }
    }
}

/// Step results in declaration order.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SequenceReport {
    steps: Vec<StepResult>,
    halted_at: Option<String>,
}

impl SequenceReport {
    /// Returns every step result in declaration order.
    #[must_use]
    pub fn steps(&self) -> &[StepResult] {
        &self.steps
    }

    /// Looks up a step result by name.
    #[must_use]
    pub fn step(&self, name: &str) -> Option<&StepResult> {
        self.steps.iter().find(|result| result.name == name)
    }

    /// Returns the required step that halted the sequence, if any.
    #[must_use]
    pub fn halted_at(&self) -> Option<&str> {
        self.halted_at.as_deref()
    }

    /// Returns the sequencer's outcome, ignoring any gating policy.
    #[must_use]
    pub fn outcome(&self) -> RunOutcome {
        if self.halted_at.is_some() {
            RunOutcome::Failure
        } else if self.steps.iter().any(StepResult::failed) {
            RunOutcome::PartialFailure
        } else {
            RunOutcome::Success
        }
    }
}

/// Executes steps through a [`ToolInvoker`] in a fixed directory.
#[derive(Debug)]
pub struct StepSequencer<'a, R: CommandRunner> {
    invoker: &'a ToolInvoker<R>,
    cwd: &'a Utf8Path,
}

impl<'a, R: CommandRunner> StepSequencer<'a, R> {
    /// Creates a sequencer running every step inside `cwd`.
    #[must_use]
    pub const fn new(invoker: &'a ToolInvoker<R>, cwd: &'a Utf8Path) -> Self {
        Self { invoker, cwd }
    }

    /// Runs `steps` in order and records their results.
    ///
    /// # Errors
    ///
    /// Returns [`InvokeError`] when a tool cannot be launched. Launch failures
    /// abort the sequence; non-zero exits never do on their own.
    pub fn run(&self, steps: Vec<Step>) -> Result<SequenceReport, InvokeError> {
        let mut report = SequenceReport {
            steps: Vec::with_capacity(steps.len()),
            halted_at: None,
        };

        for step in steps {
            if report.halted_at.is_some() {
                info!(step = step.name(), state = %StepState::Skipped, "skipping after halt");
                report.steps.push(StepResult::skipped(&step));
                continue;
            }

            if !step.should_run() {
                info!(step = step.name(), state = %StepState::Skipped, "guard is false");
                report.steps.push(StepResult::skipped(&step));
                continue;
            }

            info!(step = step.name(), state = %StepState::Running, "running step");
            let output = self
                .invoker
                .invoke(step.command(), self.cwd, step.variables())?;
            let result = StepResult::completed(&step, output);
            info!(
                step = step.name(),
                state = %result.state,
                exit_code = ?result.exit_code,
                "step finished"
            );

            if result.failed() && !step.tolerates_failure() {
                warn!(step = step.name(), "required step failed; halting");
                report.halted_at = Some(result.name.clone());
            }
            report.steps.push(result);
        }

        Ok(report)
    }
}
