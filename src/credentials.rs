//! Short-lived credential provisioning.
//!
//! Static secrets are exchanged for a [`CredentialHandle`] by activating the
//! service account with the cloud CLI. All key material and CLI state is kept
//! in a scratch directory owned by the handle, so dropping the handle discards
//! every credential the run produced.

use std::fmt;
use std::io::Write;
use std::path::PathBuf;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Duration, Utc};
use shell_escape::unix::escape;
use tempfile::{Builder, TempDir};
use thiserror::Error;
use tracing::info;

use crate::invoke::{CommandRunner, InvokeError, ToolCommand};

/// Default lifetime assumed for an activated credential.
pub const DEFAULT_CREDENTIAL_LIFETIME_SECS: u64 = 3600;

/// Errors raised while acquiring credentials. All of them are fatal.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Raised when a required secret is blank.
    #[error("missing secret: {field}")]
    MissingSecret {
        /// Name of the blank secret.
        field: String,
    },
    /// Raised when the scratch directory or key files cannot be prepared.
    #[error("failed to prepare credential files: {message}")]
    Scratch {
        /// Human-readable error message.
        message: String,
    },
    /// Raised when the cloud CLI rejects the credential exchange.
    #[error("{program} rejected the credentials (status {status_text}): {stderr}")]
    Rejected {
        /// CLI that rejected the exchange.
        program: String,
        /// Human readable representation of the exit status.
        status_text: String,
        /// Stderr captured from the CLI.
        stderr: String,
    },
    /// Raised when the configured lifetime puts the expiry out of range.
    #[error("credential lifetime of {seconds}s is out of range")]
    LifetimeOutOfRange {
        /// Configured lifetime in seconds.
        seconds: i64,
    },
    /// Raised when a handle is used after its expiry instant.
    #[error("credentials expired at {expires_at}")]
    Expired {
        /// Instant the handle stopped being valid.
        expires_at: DateTime<Utc>,
    },
    /// Raised when the cloud CLI cannot be launched.
    #[error(transparent)]
    Launch(#[from] InvokeError),
}

/// Cluster whose credentials are fetched after the cloud credentials.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClusterIdentity {
    /// Cluster name.
    pub id: String,
    /// Zone hosting the cluster.
    pub zone: String,
}

impl ClusterIdentity {
    /// Builds an identity only when both parts are present and non-blank.
    #[must_use]
    pub fn from_parts(id: Option<&str>, zone: Option<&str>) -> Option<Self> {
        let trimmed_id = id.map(str::trim).filter(|value| !value.is_empty())?;
        let trimmed_zone = zone.map(str::trim).filter(|value| !value.is_empty())?;
        Some(Self {
            id: trimmed_id.to_owned(),
            zone: trimmed_zone.to_owned(),
        })
    }
}

/// Static secrets exchanged for a [`CredentialHandle`].
#[derive(Clone, Default)]
pub struct CredentialSecrets {
    /// Cloud project the credentials are scoped to.
    pub project_id: String,
    /// Service-account key material.
    pub key_material: String,
    /// SSH private key used to fetch private dependencies.
    pub ssh_private_key: String,
    /// Optional cluster identity.
    pub cluster: Option<ClusterIdentity>,
}

impl fmt::Debug for CredentialSecrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialSecrets")
            .field("project_id", &self.project_id)
            .field("key_material", &"[REDACTED]")
            .field("ssh_private_key", &"[REDACTED]")
            .field("cluster", &self.cluster)
            .finish()
    }
}

/// What a credential handle grants access to.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CredentialScope {
    /// Cloud project identifier.
    pub project_id: String,
    /// Cluster identity, when cluster credentials were requested.
    pub cluster: Option<ClusterIdentity>,
}

/// Opaque, time-boxed credentials for one run.
#[derive(Debug)]
pub struct CredentialHandle {
    scope: CredentialScope,
    expires_at: DateTime<Utc>,
    key_file: Utf8PathBuf,
    ssh_key_file: Utf8PathBuf,
    cli_config_dir: Utf8PathBuf,
    kubeconfig: Utf8PathBuf,
    scratch: TempDir,
}

impl CredentialHandle {
    /// Returns the scope granted by this handle.
    #[must_use]
    pub const fn scope(&self) -> &CredentialScope {
        &self.scope
    }

    /// Returns the instant after which the handle should be considered stale.
    #[must_use]
    pub const fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Returns `true` once `now` has reached the expiry instant.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Fails once `now` has reached the expiry instant.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Expired`] for a stale handle.
    pub fn ensure_fresh(&self, now: DateTime<Utc>) -> Result<(), AuthError> {
        if self.is_expired_at(now) {
            return Err(AuthError::Expired {
                expires_at: self.expires_at,
            });
        }
        Ok(())
    }

    /// Returns the scratch directory holding the credential files.
    #[must_use]
    pub fn scratch_dir(&self) -> &std::path::Path {
        self.scratch.path()
    }

    /// Environment that points tools at this handle's credentials.
    #[must_use]
    pub fn env(&self) -> Vec<(String, String)> {
        let ssh_command = format!(
            "ssh -i {} -o IdentitiesOnly=yes -o StrictHostKeyChecking=accept-new",
            escape(self.ssh_key_file.as_str().into())
        );
        vec![
            (
                String::from("GOOGLE_APPLICATION_CREDENTIALS"),
                self.key_file.to_string(),
            ),
            (
                String::from("CLOUDSDK_CORE_PROJECT"),
                self.scope.project_id.clone(),
            ),
            (
                String::from("CLOUDSDK_CONFIG"),
                self.cli_config_dir.to_string(),
            ),
            (String::from("KUBECONFIG"), self.kubeconfig.to_string()),
            (String::from("GIT_SSH_COMMAND"), ssh_command),
            (String::from("TF_IN_AUTOMATION"), String::from("1")),
        ]
    }

    /// Builds the command that fetches cluster credentials into
    /// `KUBECONFIG`. Without a cluster identity the command carries no
    /// arguments and must not be run.
    #[must_use]
    pub fn cluster_credentials_command(&self, gcloud_bin: &str) -> ToolCommand {
        let command = ToolCommand::new(gcloud_bin).with_env(self.env());
        match &self.scope.cluster {
            Some(cluster) => command.args([
                "container",
                "clusters",
                "get-credentials",
                cluster.id.as_str(),
                "--zone",
                cluster.zone.as_str(),
                "--project",
                self.scope.project_id.as_str(),
            ]),
            None => command,
        }
    }
}

/// Exchanges static secrets for short-lived credentials via the cloud CLI.
#[derive(Clone, Debug)]
pub struct CredentialProvisioner<R: CommandRunner> {
    gcloud_bin: String,
    lifetime: Duration,
    runner: R,
}

impl<R: CommandRunner> CredentialProvisioner<R> {
    /// Creates a provisioner that shells out to `gcloud_bin`.
    #[must_use]
    pub fn new(gcloud_bin: impl Into<String>, runner: R) -> Self {
        Self {
            gcloud_bin: gcloud_bin.into(),
            lifetime: lifetime_from_secs(DEFAULT_CREDENTIAL_LIFETIME_SECS)
                .unwrap_or_else(Duration::zero),
            runner,
        }
    }

    /// Overrides the lifetime recorded on issued handles.
    #[must_use]
    pub fn with_lifetime_secs(mut self, seconds: u64) -> Self {
        if let Some(lifetime) = lifetime_from_secs(seconds) {
            self.lifetime = lifetime;
        }
        self
    }

    /// Activates the service account and returns a handle to the resulting
    /// credentials. No retry is attempted.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] when a secret is blank, the credential files
    /// cannot be written, or the CLI rejects or fails to run the exchange.
    pub fn acquire(&self, secrets: &CredentialSecrets) -> Result<CredentialHandle, AuthError> {
        require_secret(&secrets.project_id, "project_id")?;
        require_secret(&secrets.key_material, "credentials")?;
        require_secret(&secrets.ssh_private_key, "ssh_private_key")?;
        let expires_at = Utc::now()
            .checked_add_signed(self.lifetime)
            .ok_or_else(|| AuthError::LifetimeOutOfRange {
                seconds: self.lifetime.num_seconds(),
            })?;

        let scratch = Builder::new()
            .prefix("iacflow-credentials-")
            .tempdir()
            .map_err(scratch_error)?;
        let root = utf8(scratch.path().to_path_buf())?;

        let key_file = write_secret_file(&root, "service-account-", ".json", &secrets.key_material)?;
        let ssh_key = ensure_trailing_newline(&secrets.ssh_private_key);
        let ssh_key_file = write_secret_file(&root, "deploy-key-", "", &ssh_key)?;

        let handle = CredentialHandle {
            scope: CredentialScope {
                project_id: secrets.project_id.trim().to_owned(),
                cluster: secrets.cluster.clone(),
            },
            expires_at,
            key_file,
            ssh_key_file,
            cli_config_dir: root.join("gcloud"),
            kubeconfig: root.join("kubeconfig"),
            scratch,
        };

        self.activate(&handle, &root)?;
        info!(
            project = %handle.scope.project_id,
            cluster = handle.scope.cluster.is_some(),
            "cloud credentials activated"
        );
        Ok(handle)
    }

    fn activate(&self, handle: &CredentialHandle, cwd: &Utf8Path) -> Result<(), AuthError> {
        let command = ToolCommand::new(self.gcloud_bin.as_str())
            .args(["auth", "activate-service-account"])
            .arg(format!("--key-file={}", handle.key_file))
            .arg(format!("--project={}", handle.scope.project_id))
            .with_env(handle.env());

        let output = self.runner.run(&command, cwd)?;
        if output.is_success() {
            return Ok(());
        }

        Err(AuthError::Rejected {
            program: self.gcloud_bin.clone(),
            status_text: output
                .code
                .map_or_else(|| String::from("unknown"), |code| code.to_string()),
            stderr: output.stderr,
        })
    }
}

fn lifetime_from_secs(seconds: u64) -> Option<Duration> {
    i64::try_from(seconds).ok().and_then(Duration::try_seconds)
}

fn require_secret(value: &str, field: &str) -> Result<(), AuthError> {
    if value.trim().is_empty() {
        return Err(AuthError::MissingSecret {
            field: field.to_owned(),
        });
    }
    Ok(())
}

fn ensure_trailing_newline(value: &str) -> String {
    if value.ends_with('\n') {
        value.to_owned()
    } else {
        format!("{value}\n")
    }
}

fn write_secret_file(
    root: &Utf8Path,
    prefix: &str,
    suffix: &str,
    contents: &str,
) -> Result<Utf8PathBuf, AuthError> {
    // Named temp files are created owner-read/write only.
    let mut file = Builder::new()
        .prefix(prefix)
        .suffix(suffix)
        .tempfile_in(root)
        .map_err(scratch_error)?;
    file.write_all(contents.as_bytes()).map_err(scratch_error)?;
    let (_, path) = file.keep().map_err(|err| scratch_error(err.error))?;
    utf8(path)
}

fn utf8(path: PathBuf) -> Result<Utf8PathBuf, AuthError> {
    Utf8PathBuf::from_path_buf(path).map_err(|raw| AuthError::Scratch {
        message: format!("non-UTF-8 path: {}", raw.display()),
    })
}

fn scratch_error(err: std::io::Error) -> AuthError {
    AuthError::Scratch {
        message: err.to_string(),
    }
}
