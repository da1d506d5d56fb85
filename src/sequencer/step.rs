//! Step definitions, states, and per-step results.

use std::fmt;

use crate::invoke::{CommandOutput, ToolCommand};

/// Predicate evaluated before a step leaves [`StepState::Pending`].
pub type Guard = Box<dyn Fn() -> bool>;

/// A declared pipeline step.
pub struct Step {
    name: String,
    command: ToolCommand,
    continue_on_error: bool,
    guard: Option<Guard>,
    variables: Option<String>,
}

impl Step {
    /// Declares a required step that runs `command`.
    #[must_use]
    pub fn new(name: impl Into<String>, command: ToolCommand) -> Self {
        Self {
            name: name.into(),
            command,
            continue_on_error: false,
            guard: None,
            variables: None,
        }
    }

    /// Marks whether a failure of this step lets the sequence continue.
    #[must_use]
    pub const fn continue_on_error(mut self, tolerate: bool) -> Self {
        self.continue_on_error = tolerate;
        self
    }

    /// Attaches a guard; when it returns `false` the step is skipped without
    /// invoking the tool.
    #[must_use]
    pub fn when(mut self, guard: impl Fn() -> bool + 'static) -> Self {
        self.guard = Some(Box::new(guard));
        self
    }

    /// Attaches a variables payload staged before the command runs.
    #[must_use]
    pub fn with_variables(mut self, variables: Option<String>) -> Self {
        self.variables = variables;
        self
    }

    /// Returns the step name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the command this step runs.
    #[must_use]
    pub const fn command(&self) -> &ToolCommand {
        &self.command
    }

    /// Returns `true` when failures are tolerated.
    #[must_use]
    pub const fn tolerates_failure(&self) -> bool {
        self.continue_on_error
    }

    /// Returns the staged variables payload, if any.
    #[must_use]
    pub fn variables(&self) -> Option<&str> {
        self.variables.as_deref()
    }

    /// Evaluates the guard; unguarded steps always run.
    #[must_use]
    pub fn should_run(&self) -> bool {
        self.guard.as_ref().is_none_or(|guard| guard())
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name)
            .field("command", &self.command.display())
            .field("continue_on_error", &self.continue_on_error)
            .field("guarded", &self.guard.is_some())
            .field("variables", &self.variables.is_some())
            .finish()
    }
}

/// Lifecycle of a step within one run.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StepState {
    /// Declared but not yet considered.
    Pending,
    /// The tool is running.
    Running,
    /// The tool exited zero.
    Succeeded,
    /// The tool exited non-zero or without a status.
    Failed,
    /// The guard was false or an earlier required step failed.
    Skipped,
}

impl StepState {
    /// Returns the label used in reports and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "success",
            Self::Failed => "failure",
            Self::Skipped => "skipped",
        }
    }

    /// Returns `true` for states a step cannot leave.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Skipped)
    }
}

impl fmt::Display for StepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exit outcome of a step that actually ran.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StepOutcome {
    /// Exit code zero.
    Success,
    /// Non-zero or missing exit code.
    Failure,
}

/// Recorded result of one declared step.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StepResult {
    /// Step name.
    pub name: String,
    /// Final state.
    pub state: StepState,
    /// Exit code, when the tool ran and reported one.
    pub exit_code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error, kept verbatim.
    pub stderr: String,
    /// Whether failures were tolerated.
    pub continue_on_error: bool,
}

impl StepResult {
    pub(crate) fn skipped(step: &Step) -> Self {
        Self {
            name: step.name.clone(),
            state: StepState::Skipped,
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            continue_on_error: step.continue_on_error,
        }
    }

    pub(crate) fn completed(step: &Step, output: CommandOutput) -> Self {
        let state = if output.is_success() {
            StepState::Succeeded
        } else {
            StepState::Failed
        };
        Self {
            name: step.name.clone(),
            state,
            exit_code: output.code,
            stdout: output.stdout,
            stderr: output.stderr,
            continue_on_error: step.continue_on_error,
        }
    }

    /// Returns the exit outcome, or `None` when the step was skipped.
    #[must_use]
    pub const fn outcome(&self) -> Option<StepOutcome> {
        match self.state {
            StepState::Succeeded => Some(StepOutcome::Success),
            StepState::Failed => Some(StepOutcome::Failure),
            StepState::Pending | StepState::Running | StepState::Skipped => None,
        }
    }

    /// Returns `true` when the step ran and failed.
    #[must_use]
    pub fn failed(&self) -> bool {
        self.state == StepState::Failed
    }
}
