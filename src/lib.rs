//! Core library for the iacflow pipeline runner.
//!
//! A run exchanges static secrets for short-lived credentials, checks out a
//! revision, sequences the infrastructure tool's plan or apply steps, and
//! posts a report on the pull request that triggered it.

pub mod checkout;
pub mod config;
pub mod credentials;
pub mod invoke;
pub mod normalize;
pub mod outputs;
pub mod pipeline;
pub mod publish;
pub mod report;
pub mod run;
pub mod sequencer;
pub mod telemetry;
pub mod test_support;

pub use checkout::{CheckoutError, Materializer, WorkingDirectory};
pub use config::{ConfigError, ForgeConfig, PipelineConfig};
pub use credentials::{AuthError, CredentialHandle, CredentialProvisioner, CredentialSecrets};
pub use invoke::{
    CommandOutput, CommandRunner, InvokeError, ProcessCommandRunner, StreamingCommandRunner,
    ToolCommand, ToolInvoker,
};
pub use pipeline::Workflow;
pub use publish::{CommentDestination, DeliveryError, GithubCommentPublisher, ReportPublisher};
pub use report::{Attribution, RenderedReport};
pub use run::{PipelineRun, RunError, RunOrchestrator, RunRequest};
pub use sequencer::{RunOutcome, StepResult, StepState};
