//! External tool invocation.
//!
//! The invoker runs the infrastructure-as-code binary (and the helper CLIs the
//! pipeline depends on) inside a working directory and captures stdout,
//! stderr, and the exit code. A non-zero exit is an ordinary outcome; only a
//! failure to launch the process is surfaced as an error.

use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::fs::OpenOptions;
use cap_std::{ambient_authority, fs_utf8::Dir};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

mod types;

pub use types::{
    CommandOutput, CommandRunner, ProcessCommandRunner, StreamingCommandRunner, ToolCommand,
};

/// File, relative to the invocation directory, that receives the raw
/// variables payload.
pub const VARIABLES_FILE_NAME: &str = "terraform.tfvars.json";

/// Version label that accepts whichever tool version is installed.
pub const LATEST_VERSION: &str = "latest";

/// Errors raised when a tool cannot be launched. A tool that runs and exits
/// non-zero is not an error.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum InvokeError {
    /// Raised when a command cannot be spawned, for example because the
    /// binary is missing or the working directory does not exist.
    #[error("failed to launch {program} in {cwd}: {message}")]
    Spawn {
        /// Command that failed to start.
        program: String,
        /// Working directory requested for the command.
        cwd: Utf8PathBuf,
        /// Operating system error string.
        message: String,
    },
    /// Raised when the variables payload cannot be written.
    #[error("failed to write variables file {path}: {message}")]
    Variables {
        /// File that could not be written.
        path: Utf8PathBuf,
        /// Operating system error string.
        message: String,
    },
    /// Raised when the tool cannot report its own version.
    #[error("{program} did not report its version: {message}")]
    VersionProbe {
        /// Tool that was probed.
        program: String,
        /// Description of the probe failure.
        message: String,
    },
    /// Raised when the installed tool does not match the requested version.
    #[error("{program} version {actual} does not match required version {expected}")]
    VersionMismatch {
        /// Tool that was probed.
        program: String,
        /// Version requested by configuration.
        expected: String,
        /// Version reported by the tool.
        actual: String,
    },
}

#[derive(Debug, Deserialize)]
struct VersionReport {
    terraform_version: String,
}

/// Runs tool commands through a [`CommandRunner`].
#[derive(Clone, Debug)]
pub struct ToolInvoker<R: CommandRunner> {
    runner: R,
}

impl<R: CommandRunner> ToolInvoker<R> {
    /// Creates an invoker backed by `runner`.
    #[must_use]
    pub const fn new(runner: R) -> Self {
        Self { runner }
    }

    /// Returns the underlying runner.
    #[must_use]
    pub const fn runner(&self) -> &R {
        &self.runner
    }

    /// Runs `command` in `cwd` and captures its output.
    ///
    /// When `variables` is supplied it is appended verbatim to
    /// [`VARIABLES_FILE_NAME`] inside `cwd` before the command starts.
    ///
    /// # Errors
    ///
    /// Returns [`InvokeError::Variables`] when the variables file cannot be
    /// written, or [`InvokeError::Spawn`] when the process cannot start.
    ///
    /// # Security
    ///
    /// The payload is neither escaped nor validated. Callers own its
    /// sanitisation.
    pub fn invoke(
        &self,
        command: &ToolCommand,
        cwd: &Utf8Path,
        variables: Option<&str>,
    ) -> Result<CommandOutput, InvokeError> {
        if let Some(payload) = variables {
            append_variables(cwd, payload)?;
        }

        debug!(command = %command.display(), %cwd, "invoking tool");
        self.runner.run(command, cwd)
    }

    /// Confirms the installed tool reports `expected` as its version.
    ///
    /// The comparison ignores a leading `v`. [`LATEST_VERSION`] accepts any
    /// installed version.
    ///
    /// # Errors
    ///
    /// Returns [`InvokeError::VersionProbe`] when the tool exits non-zero or
    /// prints unparsable output, and [`InvokeError::VersionMismatch`] when
    /// the versions differ.
    pub fn verify_version(
        &self,
        program: &str,
        expected: &str,
        cwd: &Utf8Path,
    ) -> Result<String, InvokeError> {
        let probe = ToolCommand::new(program).args(["version", "-json"]);
        let output = self.runner.run(&probe, cwd)?;
        if !output.is_success() {
            return Err(InvokeError::VersionProbe {
                program: program.to_owned(),
                message: format!(
                    "exit status {}: {}",
                    output
                        .code
                        .map_or_else(|| String::from("unknown"), |code| code.to_string()),
                    output.stderr.trim()
                ),
            });
        }

        let report: VersionReport =
            serde_json::from_str(&output.stdout).map_err(|err| InvokeError::VersionProbe {
                program: program.to_owned(),
                message: err.to_string(),
            })?;

        let actual = strip_version_prefix(&report.terraform_version);
        let wanted = strip_version_prefix(expected);
        if wanted == LATEST_VERSION || wanted == actual {
            return Ok(actual.to_owned());
        }

        Err(InvokeError::VersionMismatch {
            program: program.to_owned(),
            expected: wanted.to_owned(),
            actual: actual.to_owned(),
        })
    }
}

fn strip_version_prefix(version: &str) -> &str {
    let trimmed = version.trim();
    trimmed.strip_prefix('v').unwrap_or(trimmed)
}

fn append_variables(cwd: &Utf8Path, payload: &str) -> Result<(), InvokeError> {
    let target = cwd.join(VARIABLES_FILE_NAME);
    let to_error = |err: std::io::Error| InvokeError::Variables {
        path: target.clone(),
        message: err.to_string(),
    };

    let dir = Dir::open_ambient_dir(cwd, ambient_authority()).map_err(to_error)?;
    let mut options = OpenOptions::new();
    options.create(true).append(true);
    let mut file = dir
        .open_with(VARIABLES_FILE_NAME, &options)
        .map_err(to_error)?;
    file.write_all(payload.as_bytes()).map_err(to_error)?;
    Ok(())
}

#[cfg(test)]
mod tests;
