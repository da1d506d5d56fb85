//! Working-directory materialisation.
//!
//! A revision of the repository is cloned into an ephemeral scratch directory
//! owned by the returned [`WorkingDirectory`]. The infrastructure directory is
//! resolved relative to the checkout root.

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use tempfile::{Builder, TempDir};
use thiserror::Error;
use tracing::info;

use crate::invoke::{CommandRunner, InvokeError, ToolCommand};

/// Revision used when neither an override nor a trigger revision is known.
pub const FALLBACK_REVISION: &str = "HEAD";

/// Errors raised while materialising a working directory. All are fatal.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// Raised when the configured infrastructure directory escapes the
    /// checkout root.
    #[error("working directory must be a relative path inside the repository: {path}")]
    InvalidWorkingDir {
        /// Offending path.
        path: String,
    },
    /// Raised when the repository or revision would be read as a `git`
    /// option.
    #[error("{field} must not start with '-': {value}")]
    OptionLikeArgument {
        /// Name of the rejected setting.
        field: &'static str,
        /// Rejected value.
        value: String,
    },
    /// Raised when the repository source is blank.
    #[error("no repository configured to check out")]
    MissingRepository,
    /// Raised when the scratch directory cannot be created.
    #[error("failed to prepare checkout directory: {message}")]
    Scratch {
        /// Human-readable error message.
        message: String,
    },
    /// Raised when `git` exits non-zero.
    #[error("{program} {operation} exited with status {status_text}: {stderr}")]
    CommandFailure {
        /// Program that failed.
        program: String,
        /// Git operation being performed.
        operation: String,
        /// Human readable representation of the exit status.
        status_text: String,
        /// Stderr captured from git.
        stderr: String,
    },
    /// Raised when `git` cannot be launched.
    #[error(transparent)]
    Launch(#[from] InvokeError),
}

/// A checked-out revision and the directory the tool runs in.
#[derive(Debug)]
pub struct WorkingDirectory {
    root: Utf8PathBuf,
    infra_dir: Utf8PathBuf,
    revision: String,
    _scratch: TempDir,
}

impl WorkingDirectory {
    /// Returns the checkout root.
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Returns the directory the infrastructure tool runs in.
    #[must_use]
    pub fn infra_dir(&self) -> &Utf8Path {
        &self.infra_dir
    }

    /// Returns the revision that was checked out.
    #[must_use]
    pub fn revision(&self) -> &str {
        &self.revision
    }
}

/// Clones a repository revision with `git`.
#[derive(Clone, Debug)]
pub struct Materializer<R: CommandRunner> {
    git_bin: String,
    repository: String,
    default_revision: String,
    working_dir: String,
    env: Vec<(String, String)>,
    runner: R,
}

impl<R: CommandRunner> Materializer<R> {
    /// Creates a materialiser cloning `repository` with `git_bin`.
    #[must_use]
    pub fn new(git_bin: impl Into<String>, repository: impl Into<String>, runner: R) -> Self {
        Self {
            git_bin: git_bin.into(),
            repository: repository.into(),
            default_revision: String::from(FALLBACK_REVISION),
            working_dir: String::from("."),
            env: Vec::new(),
            runner,
        }
    }

    /// Sets the revision used when no override is supplied.
    #[must_use]
    pub fn with_default_revision(mut self, revision: impl Into<String>) -> Self {
        let value = revision.into();
        if !value.trim().is_empty() {
            self.default_revision = value.trim().to_owned();
        }
        self
    }

    /// Sets the infrastructure directory, relative to the checkout root.
    #[must_use]
    pub fn with_working_dir(mut self, working_dir: impl Into<String>) -> Self {
        self.working_dir = working_dir.into();
        self
    }

    /// Sets environment passed to `git`, such as the SSH command for private
    /// repositories.
    #[must_use]
    pub fn with_env(mut self, env: Vec<(String, String)>) -> Self {
        self.env = env;
        self
    }

    /// Returns the revision that `materialize` would check out for
    /// `revision`.
    #[must_use]
    pub fn resolve_revision<'a>(&'a self, revision: Option<&'a str>) -> &'a str {
        revision
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(&self.default_revision)
    }

    /// Checks out `revision` (or the default revision when empty).
    ///
    /// # Errors
    ///
    /// Returns [`CheckoutError`] when the repository, revision or working
    /// directory is invalid, the scratch directory cannot be created, or
    /// `git` fails.
    pub fn materialize(&self, revision: Option<&str>) -> Result<WorkingDirectory, CheckoutError> {
        let repository = self.repository.trim();
        if repository.is_empty() {
            return Err(CheckoutError::MissingRepository);
        }
        reject_option_like("repository", repository)?;
        let relative = relative_working_dir(&self.working_dir)?;
        let target = self.resolve_revision(revision).to_owned();
        reject_option_like("revision", &target)?;

        let scratch = Builder::new()
            .prefix("iacflow-checkout-")
            .tempdir()
            .map_err(|err| CheckoutError::Scratch {
                message: err.to_string(),
            })?;
        let scratch_root = Utf8PathBuf::from_path_buf(scratch.path().to_path_buf()).map_err(
            |raw| CheckoutError::Scratch {
                message: format!("non-UTF-8 path: {}", raw.display()),
            },
        )?;
        let root = scratch_root.join("repo");

        self.git(
            "clone",
            ToolCommand::new(self.git_bin.as_str())
                .args(["clone", "--quiet", "--no-checkout", "--", repository])
                .arg(root.as_str()),
            &scratch_root,
        )?;
        self.git(
            "checkout",
            ToolCommand::new(self.git_bin.as_str())
                .args(["-C", root.as_str(), "checkout", "--quiet", "--detach"])
                .arg(target.as_str()),
            &scratch_root,
        )?;

        let infra_dir = if relative.as_str().is_empty() {
            root.clone()
        } else {
            root.join(&relative)
        };
        info!(revision = %target, %infra_dir, "working directory materialised");

        Ok(WorkingDirectory {
            root,
            infra_dir,
            revision: target,
            _scratch: scratch,
        })
    }

    fn git(
        &self,
        operation: &str,
        command: ToolCommand,
        cwd: &Utf8Path,
    ) -> Result<(), CheckoutError> {
        let output = self.runner.run(&command.with_env(self.env.clone()), cwd)?;
        if output.is_success() {
            return Ok(());
        }

        Err(CheckoutError::CommandFailure {
            program: self.git_bin.clone(),
            operation: operation.to_owned(),
            status_text: output
                .code
                .map_or_else(|| String::from("unknown"), |code| code.to_string()),
            stderr: output.stderr,
        })
    }
}

fn reject_option_like(field: &'static str, value: &str) -> Result<(), CheckoutError> {
    if value.starts_with('-') {
        return Err(CheckoutError::OptionLikeArgument {
            field,
            value: value.to_owned(),
        });
    }
    Ok(())
}

fn relative_working_dir(raw: &str) -> Result<Utf8PathBuf, CheckoutError> {
    let invalid = || CheckoutError::InvalidWorkingDir {
        path: raw.to_owned(),
    };
    let mut relative = Utf8PathBuf::new();
    for component in Utf8Path::new(raw.trim()).components() {
        match component {
            Utf8Component::CurDir => {}
            Utf8Component::Normal(part) => relative.push(part),
            Utf8Component::ParentDir | Utf8Component::RootDir | Utf8Component::Prefix(_) => {
                return Err(invalid());
            }
        }
    }
    Ok(relative)
}
