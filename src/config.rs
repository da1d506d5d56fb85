//! Configuration loading via `ortho-config`.
//!
//! Two independent sections are read: [`PipelineConfig`] drives the run and
//! [`ForgeConfig`] describes where the report is delivered. Both merge
//! defaults, configuration files and environment variables. They share one
//! file, so forge keys carry a `forge_` prefix.

use std::ffi::OsString;
use std::fmt;

use camino::Utf8PathBuf;
use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use crate::checkout::FALLBACK_REVISION;
use crate::credentials::{ClusterIdentity, CredentialSecrets, DEFAULT_CREDENTIAL_LIFETIME_SECS};
use crate::pipeline::{PipelineSettings, Workflow};
use crate::publish::{CommentDestination, DEFAULT_API_URL, GithubCommentPublisher};
use crate::report::Attribution;
use crate::run::RunRequest;

const CONFIG_FILE_NAME: &str = "iacflow.toml";
const REDACTED: &str = "<redacted>";

/// Pipeline settings and secrets.
#[derive(Clone, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "IACFLOW",
    discovery(
        app_name = "iacflow",
        env_var = "IACFLOW_CONFIG_PATH",
        config_file_name = "iacflow.toml",
        dotfile_name = ".iacflow.toml",
        project_file_name = "iacflow.toml"
    )
)]
pub struct PipelineConfig {
    /// Repository to clone, as a URL or local path.
    #[ortho_config(default = String::new())]
    pub repository: String,
    /// Revision override. Blank values fall back to `trigger_revision`.
    pub revision: Option<String>,
    /// Revision that triggered the run.
    #[ortho_config(default = FALLBACK_REVISION.to_owned())]
    pub trigger_revision: String,
    /// Raw variables payload appended before `init`.
    pub vars: Option<String>,
    /// Required tool version, or `latest`.
    #[ortho_config(default = String::new())]
    pub tool_version: String,
    /// Remote state bucket.
    #[ortho_config(default = String::new())]
    pub backend_bucket: String,
    /// Remote state prefix.
    pub backend_prefix: Option<String>,
    /// Infrastructure directory relative to the checkout root.
    #[ortho_config(default = ".".to_owned())]
    pub working_dir: String,
    /// Cloud project identifier.
    #[ortho_config(default = String::new())]
    pub project_id: String,
    /// Service-account key material.
    #[ortho_config(default = String::new())]
    pub credentials: String,
    /// Cluster name. Ignored unless `cluster_zone` is also set.
    pub cluster_id: Option<String>,
    /// Cluster zone. Ignored unless `cluster_id` is also set.
    pub cluster_zone: Option<String>,
    /// SSH key used to fetch private modules.
    #[ortho_config(default = String::new())]
    pub ssh_private_key: String,
    /// Infrastructure tool executable.
    #[ortho_config(default = "terraform".to_owned())]
    pub tool_bin: String,
    /// Cloud CLI executable.
    #[ortho_config(default = "gcloud".to_owned())]
    pub gcloud_bin: String,
    /// Version control executable.
    #[ortho_config(default = "git".to_owned())]
    pub git_bin: String,
    /// Lifetime recorded on the credential handle, in seconds.
    #[ortho_config(default = DEFAULT_CREDENTIAL_LIFETIME_SECS)]
    pub credential_lifetime_secs: u64,
    /// File that receives `key=value` outputs.
    pub output_file: Option<String>,
}

/// Pull-request comment delivery settings.
#[derive(Clone, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "IACFLOW",
    discovery(
        app_name = "iacflow",
        env_var = "IACFLOW_CONFIG_PATH",
        config_file_name = "iacflow.toml",
        dotfile_name = ".iacflow.toml",
        project_file_name = "iacflow.toml"
    )
)]
pub struct ForgeConfig {
    /// REST API root.
    #[ortho_config(default = DEFAULT_API_URL.to_owned())]
    pub forge_api_url: String,
    /// Repository slug, `owner/name`.
    pub forge_repository: Option<String>,
    /// API token.
    pub forge_token: Option<String>,
    /// Pull request that receives the comment.
    pub forge_pull_request: Option<u64>,
    /// Account that triggered the run.
    pub forge_actor: Option<String>,
    /// Trigger event name.
    pub forge_event_name: Option<String>,
    /// Run identifier.
    pub forge_run_id: Option<String>,
    /// Pipeline definition name.
    pub forge_workflow: Option<String>,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(
        description: &'static str,
        env_var: &'static str,
        toml_key: &'static str,
    ) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }

    fn missing(&self) -> ConfigError {
        ConfigError::MissingField(format!(
            "missing {}: set {} or add {} to {CONFIG_FILE_NAME}",
            self.description, self.env_var, self.toml_key
        ))
    }
}

fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(metadata.missing());
    }
    Ok(())
}

fn non_blank(value: Option<&String>) -> Option<String> {
    value
        .map(|text| text.trim())
        .filter(|text| !text.is_empty())
        .map(str::to_owned)
}

impl PipelineConfig {
    /// Loads configuration without attempting to parse CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([OsString::from("iacflow")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Performs semantic validation on required fields.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is blank.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            (
                &self.repository,
                FieldMetadata::new("repository", "IACFLOW_REPOSITORY", "repository"),
            ),
            (
                &self.tool_version,
                FieldMetadata::new("tool version", "IACFLOW_TOOL_VERSION", "tool_version"),
            ),
            (
                &self.backend_bucket,
                FieldMetadata::new("state backend bucket", "IACFLOW_BACKEND_BUCKET", "backend_bucket"),
            ),
            (
                &self.project_id,
                FieldMetadata::new("cloud project ID", "IACFLOW_PROJECT_ID", "project_id"),
            ),
            (
                &self.credentials,
                FieldMetadata::new("service-account credentials", "IACFLOW_CREDENTIALS", "credentials"),
            ),
            (
                &self.ssh_private_key,
                FieldMetadata::new("SSH private key", "IACFLOW_SSH_PRIVATE_KEY", "ssh_private_key"),
            ),
        ];
        for (value, metadata) in &required {
            require_field(value, metadata)?;
        }

        let id = non_blank(self.cluster_id.as_ref());
        let zone = non_blank(self.cluster_zone.as_ref());
        if id.is_some() != zone.is_some() {
            warn!(
                "only one of IACFLOW_CLUSTER_ID and IACFLOW_CLUSTER_ZONE is set; \
                 cluster credentials will not be fetched"
            );
        }
        Ok(())
    }

    /// Returns the secrets exchanged for short-lived credentials.
    #[must_use]
    pub fn secrets(&self) -> CredentialSecrets {
        CredentialSecrets {
            project_id: self.project_id.clone(),
            key_material: self.credentials.clone(),
            ssh_private_key: self.ssh_private_key.clone(),
            cluster: ClusterIdentity::from_parts(
                self.cluster_id.as_deref(),
                self.cluster_zone.as_deref(),
            ),
        }
    }

    /// Builds a [`RunRequest`] for `workflow`, addressing the report as
    /// `forge` describes.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when either section fails validation.
    pub fn to_run_request(
        &self,
        workflow: Workflow,
        forge: &ForgeConfig,
    ) -> Result<RunRequest, ConfigError> {
        self.validate()?;
        Ok(RunRequest {
            secrets: self.secrets(),
            credential_lifetime_secs: self.credential_lifetime_secs,
            repository: self.repository.trim().to_owned(),
            revision: non_blank(self.revision.as_ref()),
            trigger_revision: self.trigger_revision.clone(),
            working_dir: self.working_dir.clone(),
            git_bin: self.git_bin.clone(),
            tool_version: self.tool_version.trim().to_owned(),
            pipeline: PipelineSettings {
                tool_bin: self.tool_bin.clone(),
                gcloud_bin: self.gcloud_bin.clone(),
                backend_bucket: self.backend_bucket.trim().to_owned(),
                backend_prefix: non_blank(self.backend_prefix.as_ref()),
                variables: self.vars.clone().filter(|vars| !vars.trim().is_empty()),
            },
            output_file: non_blank(self.output_file.as_ref()).map(Utf8PathBuf::from),
            attribution: forge.attribution(workflow, &self.working_dir),
            destination: forge.destination()?,
        })
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("repository", &self.repository)
            .field("revision", &self.revision)
            .field("trigger_revision", &self.trigger_revision)
            .field("vars", &self.vars.as_ref().map(|_| REDACTED))
            .field("tool_version", &self.tool_version)
            .field("backend_bucket", &REDACTED)
            .field("backend_prefix", &self.backend_prefix)
            .field("working_dir", &self.working_dir)
            .field("project_id", &REDACTED)
            .field("credentials", &REDACTED)
            .field("cluster_id", &self.cluster_id.as_ref().map(|_| REDACTED))
            .field("cluster_zone", &self.cluster_zone.as_ref().map(|_| REDACTED))
            .field("ssh_private_key", &REDACTED)
            .field("tool_bin", &self.tool_bin)
            .field("gcloud_bin", &self.gcloud_bin)
            .field("git_bin", &self.git_bin)
            .field("credential_lifetime_secs", &self.credential_lifetime_secs)
            .field("output_file", &self.output_file)
            .finish()
    }
}

impl ForgeConfig {
    /// Loads configuration without attempting to parse CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([OsString::from("iacflow")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Returns the comment destination, or `None` when the repository or
    /// pull request is not configured.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the repository is not an
    /// `owner/name` slug.
    pub fn destination(&self) -> Result<Option<CommentDestination>, ConfigError> {
        let (Some(repository), Some(number)) =
            (non_blank(self.forge_repository.as_ref()), self.forge_pull_request)
        else {
            return Ok(None);
        };
        CommentDestination::new(&repository, number)
            .map(Some)
            .map_err(|err| ConfigError::Invalid(format!("IACFLOW_FORGE_REPOSITORY: {err}")))
    }

    /// Returns a publisher when an API token is configured.
    #[must_use]
    pub fn publisher(&self) -> Option<GithubCommentPublisher> {
        non_blank(self.forge_token.as_ref())
            .map(|token| GithubCommentPublisher::new(self.forge_api_url.trim(), token))
    }

    /// Builds the report footer for a run of `workflow` in `working_dir`.
    #[must_use]
    pub fn attribution(&self, workflow: Workflow, working_dir: &str) -> Attribution {
        Attribution {
            actor: non_blank(self.forge_actor.as_ref()),
            event_name: non_blank(self.forge_event_name.as_ref()),
            run_id: non_blank(self.forge_run_id.as_ref()),
            working_dir: working_dir.to_owned(),
            workflow: non_blank(self.forge_workflow.as_ref())
                .or_else(|| Some(workflow.to_string())),
        }
    }
}

impl fmt::Debug for ForgeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForgeConfig")
            .field("forge_api_url", &self.forge_api_url)
            .field("forge_repository", &self.forge_repository)
            .field("forge_token", &self.forge_token.as_ref().map(|_| REDACTED))
            .field("forge_pull_request", &self.forge_pull_request)
            .field("forge_actor", &self.forge_actor)
            .field("forge_event_name", &self.forge_event_name)
            .field("forge_run_id", &self.forge_run_id)
            .field("forge_workflow", &self.forge_workflow)
            .finish()
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Indicates fields that are individually valid but inconsistent.
    #[error("invalid configuration: {0}")]
    Invalid(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
