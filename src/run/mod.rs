//! End-to-end pipeline runs.
//!
//! A run acquires credentials, materialises the revision, checks the tool
//! version, sequences the workflow steps and then reports. Fatal errors abort
//! before anything is published; once the sequencer has finished, the exit
//! code is fixed and reporting failures only produce warnings.

use camino::Utf8PathBuf;
use chrono::Utc;
use thiserror::Error;
use tracing::{info, warn};

use crate::checkout::{CheckoutError, Materializer};
use crate::credentials::{AuthError, CredentialProvisioner, CredentialSecrets};
use crate::invoke::{CommandRunner, InvokeError, ToolInvoker};
use crate::normalize::normalize;
use crate::outputs::OutputSink;
use crate::pipeline::{PipelineSettings, Workflow, build_steps};
use crate::publish::{CommentDestination, ReportPublisher};
use crate::report::{Attribution, RenderedReport, render_report};
use crate::sequencer::{GateVerdict, SequenceReport, StepResult, StepSequencer};

pub use crate::sequencer::RunOutcome;

/// Fatal errors that abort a run before a report exists.
#[derive(Debug, Error)]
pub enum RunError {
    /// Credentials could not be acquired or expired before use.
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),
    /// The revision could not be checked out.
    #[error("checkout failed: {0}")]
    Checkout(#[from] CheckoutError),
    /// A tool could not be launched or has the wrong version.
    #[error("tool launch failed: {0}")]
    Invoke(#[from] InvokeError),
}

/// Everything a single run needs besides the runner and publisher.
#[derive(Clone, Debug, Default)]
pub struct RunRequest {
    /// Secrets exchanged for short-lived credentials.
    pub secrets: CredentialSecrets,
    /// Lifetime recorded on the credential handle.
    pub credential_lifetime_secs: u64,
    /// Clone source, URL or local path.
    pub repository: String,
    /// Revision override; blank means `trigger_revision`.
    pub revision: Option<String>,
    /// Revision that triggered the run.
    pub trigger_revision: String,
    /// Infrastructure directory relative to the checkout root.
    pub working_dir: String,
    /// Version control executable.
    pub git_bin: String,
    /// Required tool version, or `latest`.
    pub tool_version: String,
    /// Tool and backend settings for the steps.
    pub pipeline: PipelineSettings,
    /// Optional `key=value` transport file.
    pub output_file: Option<Utf8PathBuf>,
    /// Footer details for the report.
    pub attribution: Attribution,
    /// Pull request that receives the report.
    pub destination: Option<CommentDestination>,
}

/// Record of a completed run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PipelineRun {
    /// Workflow that ran.
    pub workflow: Workflow,
    /// Revision that was checked out.
    pub revision: String,
    /// Infrastructure directory relative to the checkout root.
    pub working_dir: String,
    /// Tool version reported by the installed binary.
    pub tool_version: String,
    /// Step results in declaration order.
    pub steps: Vec<StepResult>,
    /// Required step that halted the sequence, if any.
    pub halted_at: Option<String>,
    /// Exit gate verdict.
    pub verdict: GateVerdict,
    /// Overall outcome.
    pub outcome: RunOutcome,
    /// Report rendered for the run.
    pub report: RenderedReport,
    /// Whether the report reached its destination.
    pub delivered: bool,
}

impl PipelineRun {
    /// Returns the process exit status for the run.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        self.outcome.exit_code()
    }

    /// Looks up a step result by name.
    #[must_use]
    pub fn step(&self, name: &str) -> Option<&StepResult> {
        self.steps.iter().find(|result| result.name == name)
    }
}

/// Drives a workflow from credentials to the published report.
#[derive(Debug)]
pub struct RunOrchestrator<R: CommandRunner, P: ReportPublisher> {
    runner: R,
    publisher: Option<P>,
}

impl<R: CommandRunner, P: ReportPublisher> RunOrchestrator<R, P> {
    /// Creates an orchestrator. Without a publisher reports are only logged.
    #[must_use]
    pub const fn new(runner: R, publisher: Option<P>) -> Self {
        Self { runner, publisher }
    }

    /// Runs `workflow` to completion.
    ///
    /// Non-zero tool exits are recorded in the returned [`PipelineRun`];
    /// delivery and transport failures are logged and ignored.
    ///
    /// # Errors
    ///
    /// Returns [`RunError`] when credentials, checkout, tool launch or the
    /// tool-version check fail. No report is published in that case.
    pub async fn execute(
        &self,
        workflow: Workflow,
        request: &RunRequest,
    ) -> Result<PipelineRun, RunError> {
        let credentials = CredentialProvisioner::new(
            request.pipeline.gcloud_bin.as_str(),
            &self.runner,
        )
        .with_lifetime_secs(request.credential_lifetime_secs)
        .acquire(&request.secrets)?;

        let checkout = Materializer::new(
            request.git_bin.as_str(),
            request.repository.as_str(),
            &self.runner,
        )
        .with_default_revision(request.trigger_revision.as_str())
        .with_working_dir(request.working_dir.as_str())
        .with_env(credentials.env())
        .materialize(request.revision.as_deref())?;

        let invoker = ToolInvoker::new(&self.runner);
        let tool_version = invoker.verify_version(
            &request.pipeline.tool_bin,
            &request.tool_version,
            checkout.infra_dir(),
        )?;

        credentials.ensure_fresh(Utc::now())?;
        info!(%workflow, revision = checkout.revision(), "starting workflow");
        let steps = build_steps(workflow, &request.pipeline, &credentials);
        let sequence = StepSequencer::new(&invoker, checkout.infra_dir()).run(steps)?;

        let verdict = workflow.exit_gate().evaluate(&sequence);
        let outcome = RunOutcome::resolve(sequence.outcome(), &verdict);
        info!(%workflow, outcome = outcome.as_str(), ?verdict, "workflow finished");

        if let Some(path) = &request.output_file {
            export_outputs(&OutputSink::new(path.clone()), workflow, &sequence);
        }

        let report = render_report(workflow, &sequence, outcome, &request.attribution);
        let delivered = self
            .deliver(&report, request.destination.as_ref())
            .await;

        Ok(PipelineRun {
            workflow,
            revision: checkout.revision().to_owned(),
            working_dir: request.working_dir.clone(),
            tool_version,
            halted_at: sequence.halted_at().map(str::to_owned),
            steps: sequence.steps().to_vec(),
            verdict,
            outcome,
            report,
            delivered,
        })
    }

    async fn deliver(
        &self,
        report: &RenderedReport,
        destination: Option<&CommentDestination>,
    ) -> bool {
        let (Some(publisher), Some(target)) = (self.publisher.as_ref(), destination) else {
            info!("comment delivery not configured; report follows\n{}", report.body());
            return false;
        };

        match publisher.publish(report, target).await {
            Ok(()) => {
                info!(destination = %target, "report published");
                true
            }
            Err(err) => {
                warn!(destination = %target, error = %err, "failed to publish report");
                false
            }
        }
    }
}

fn export_outputs(sink: &OutputSink, workflow: Workflow, sequence: &SequenceReport) {
    let main = sequence.step(workflow.main_step());
    let stdout = main.map(|result| normalize(&result.stdout)).unwrap_or_default();
    let outcome = main.map_or("skipped", |result| result.state.as_str());
    let exit_code = main
        .and_then(|result| result.exit_code)
        .map(|code| code.to_string())
        .unwrap_or_default();

    if let Err(err) = sink.write(&[
        ("stdout", stdout.as_str()),
        ("outcome", outcome),
        ("exitcode", exit_code.as_str()),
    ]) {
        warn!(path = %sink.path(), error = %err, "failed to write outputs");
    }
}
