//! Plan and Apply workflow definitions.
//!
//! Each workflow is an ordered step list plus the steps that gate the exit
//! code. Both start with the guarded cluster-credential fetch.

use std::fmt;

use crate::credentials::CredentialHandle;
use crate::invoke::ToolCommand;
use crate::sequencer::{ExitGate, Step};

/// Name of the guarded cluster-credential step.
pub const CLUSTER_CREDENTIALS_STEP: &str = "cluster-credentials";
/// Name of the formatting check step.
pub const FMT_STEP: &str = "fmt";
/// Name of the backend initialisation step.
pub const INIT_STEP: &str = "init";
/// Name of the configuration validation step.
pub const VALIDATE_STEP: &str = "validate";
/// Name of the plan step.
pub const PLAN_STEP: &str = "plan";
/// Name of the apply step.
pub const APPLY_STEP: &str = "apply";

/// The two supported pipelines.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Workflow {
    /// fmt, init, validate, plan.
    Plan,
    /// init, apply.
    Apply,
}

impl Workflow {
    /// Returns the workflow label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Plan => "plan",
            Self::Apply => "apply",
        }
    }

    /// Returns the step whose output is reported and exported.
    #[must_use]
    pub const fn main_step(self) -> &'static str {
        match self {
            Self::Plan => PLAN_STEP,
            Self::Apply => APPLY_STEP,
        }
    }

    /// Returns the steps whose failure sets a non-zero exit code.
    #[must_use]
    pub fn exit_gate(self) -> ExitGate {
        match self {
            Self::Plan => ExitGate::new([FMT_STEP, PLAN_STEP]),
            Self::Apply => ExitGate::new([APPLY_STEP]),
        }
    }
}

impl fmt::Display for Workflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tool and backend settings shared by both workflows.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PipelineSettings {
    /// Infrastructure tool executable.
    pub tool_bin: String,
    /// Cloud CLI executable.
    pub gcloud_bin: String,
    /// Remote state bucket.
    pub backend_bucket: String,
    /// Optional remote state prefix.
    pub backend_prefix: Option<String>,
    /// Raw variables payload staged before `init`.
    pub variables: Option<String>,
}

impl PipelineSettings {
    fn tool(&self, credentials: &CredentialHandle) -> ToolCommand {
        ToolCommand::new(self.tool_bin.as_str()).with_env(credentials.env())
    }

    fn init_command(&self, credentials: &CredentialHandle) -> ToolCommand {
        let mut command = self
            .tool(credentials)
            .args(["init", "-input=false", "-no-color"])
            .arg(format!("-backend-config=bucket={}", self.backend_bucket));
        if let Some(prefix) = self
            .backend_prefix
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
        {
            command = command.arg(format!("-backend-config=prefix={prefix}"));
        }
        command
    }
}

/// Declares the steps of `workflow` in execution order.
#[must_use]
pub fn build_steps(
    workflow: Workflow,
    settings: &PipelineSettings,
    credentials: &CredentialHandle,
) -> Vec<Step> {
    let cluster = credentials.scope().cluster.clone();
    let cluster_step = Step::new(
        CLUSTER_CREDENTIALS_STEP,
        credentials.cluster_credentials_command(&settings.gcloud_bin),
    )
    .when(move || cluster.is_some());

    let init = Step::new(INIT_STEP, settings.init_command(credentials))
        .with_variables(settings.variables.clone());

    match workflow {
        Workflow::Plan => vec![
            cluster_step,
            Step::new(
                FMT_STEP,
                settings
                    .tool(credentials)
                    .args(["fmt", "-check", "-recursive", "-no-color"]),
            )
            .continue_on_error(true),
            init,
            Step::new(
                VALIDATE_STEP,
                settings.tool(credentials).args(["validate", "-no-color"]),
            ),
            Step::new(
                PLAN_STEP,
                settings
                    .tool(credentials)
                    .args(["plan", "-input=false", "-no-color"]),
            )
            .continue_on_error(true),
        ],
        Workflow::Apply => vec![
            cluster_step,
            init,
            Step::new(
                APPLY_STEP,
                settings
                    .tool(credentials)
                    .args(["apply", "-auto-approve", "-input=false", "-no-color"]),
            )
            .continue_on_error(true),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{ClusterIdentity, CredentialProvisioner, CredentialSecrets};
    use crate::test_support::ScriptedRunner;
    use rstest::{fixture, rstest};

    fn handle(cluster: Option<ClusterIdentity>) -> CredentialHandle {
        let runner = ScriptedRunner::new();
        runner.push_success();
        CredentialProvisioner::new("gcloud", runner)
            .acquire(&CredentialSecrets {
                project_id: String::from("acme-infra"),
                key_material: String::from("{}"),
                ssh_private_key: String::from("key"),
                cluster,
            })
            .expect("credentials")
    }

    #[fixture]
    fn settings() -> PipelineSettings {
        PipelineSettings {
            tool_bin: String::from("terraform"),
            gcloud_bin: String::from("gcloud"),
            backend_bucket: String::from("acme-tf-state"),
            backend_prefix: Some(String::from("env/prod")),
            variables: Some(String::from("{\"env\":\"prod\"}")),
        }
    }

    fn names(steps: &[Step]) -> Vec<&str> {
        steps.iter().map(Step::name).collect()
    }

    #[rstest]
    #[case(Workflow::Plan, vec!["cluster-credentials", "fmt", "init", "validate", "plan"])]
    #[case(Workflow::Apply, vec!["cluster-credentials", "init", "apply"])]
    fn workflows_declare_steps_in_order(
        settings: PipelineSettings,
        #[case] workflow: Workflow,
        #[case] expected: Vec<&str>,
    ) {
        let steps = build_steps(workflow, &settings, &handle(None));
        assert_eq!(names(&steps), expected);
    }

    #[rstest]
    fn plan_tolerates_only_fmt_and_plan_failures(settings: PipelineSettings) {
        let steps = build_steps(Workflow::Plan, &settings, &handle(None));
        let tolerant: Vec<&str> = steps
            .iter()
            .filter(|step| step.tolerates_failure())
            .map(Step::name)
            .collect();
        assert_eq!(tolerant, vec!["fmt", "plan"]);
    }

    #[rstest]
    fn init_carries_backend_config_and_variables(settings: PipelineSettings) {
        let steps = build_steps(Workflow::Apply, &settings, &handle(None));
        let init = steps
            .iter()
            .find(|step| step.name() == INIT_STEP)
            .expect("init declared");

        assert_eq!(
            init.command().display(),
            "terraform init -input=false -no-color -backend-config=bucket=acme-tf-state -backend-config=prefix=env/prod"
        );
        assert_eq!(init.variables(), Some("{\"env\":\"prod\"}"));
    }

    #[rstest]
    fn blank_prefix_is_omitted(mut settings: PipelineSettings) {
        settings.backend_prefix = Some(String::from("  "));
        let command = settings.init_command(&handle(None));
        assert!(!command.display().contains("prefix="));
    }

    #[rstest]
    #[case(None, false)]
    #[case(ClusterIdentity::from_parts(Some("gke"), None), false)]
    #[case(ClusterIdentity::from_parts(Some("gke"), Some("  ")), false)]
    #[case(ClusterIdentity::from_parts(Some("gke"), Some("europe-west1-b")), true)]
    fn cluster_step_guard_follows_identity(
        settings: PipelineSettings,
        #[case] cluster: Option<ClusterIdentity>,
        #[case] runs: bool,
    ) {
        let steps = build_steps(Workflow::Plan, &settings, &handle(cluster));
        let first = steps.first().expect("cluster step declared");
        assert_eq!(first.name(), CLUSTER_CREDENTIALS_STEP);
        assert_eq!(first.should_run(), runs);
        assert!(!first.tolerates_failure());
    }

    #[test]
    fn gates_match_workflow() {
        assert_eq!(Workflow::Plan.exit_gate().gating_steps(), ["fmt", "plan"]);
        assert_eq!(Workflow::Apply.exit_gate().gating_steps(), ["apply"]);
    }
}
