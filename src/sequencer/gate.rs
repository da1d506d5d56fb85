//! Exit-code gating.
//!
//! Gating is independent of failure tolerance: a step may let the sequence
//! continue and still decide the exit code.

use super::SequenceReport;

/// Verdict of an [`ExitGate`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum GateVerdict {
    /// No gating step failed.
    Pass,
    /// At least one gating step failed.
    Fail {
        /// Gating steps that failed, in declaration order.
        failed: Vec<String>,
    },
}

/// Names the steps whose failure fails the run.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ExitGate {
    gating_steps: Vec<String>,
}

impl ExitGate {
    /// Creates a gate over the named steps.
    #[must_use]
    pub fn new<I, S>(steps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            gating_steps: steps.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns the gating step names.
    #[must_use]
    pub fn gating_steps(&self) -> &[String] {
        &self.gating_steps
    }

    /// Checks the gating steps against `report`. Skipped or absent steps do
    /// not trip the gate.
    #[must_use]
    pub fn evaluate(&self, report: &SequenceReport) -> GateVerdict {
        let failed: Vec<String> = report
            .steps()
            .iter()
            .filter(|result| result.failed() && self.gating_steps.contains(&result.name))
            .map(|result| result.name.clone())
            .collect();

        if failed.is_empty() {
            GateVerdict::Pass
        } else {
            GateVerdict::Fail { failed }
        }
    }
}
