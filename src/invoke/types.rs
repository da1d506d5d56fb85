//! Core invocation types and the command runner abstraction.

use std::ffi::OsString;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::process::{Command, Stdio};
use std::thread;

use camino::{Utf8Path, Utf8PathBuf};

use super::InvokeError;

/// A fully described external tool invocation.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ToolCommand {
    /// Executable name or path.
    pub program: String,
    /// Arguments passed to the executable.
    pub args: Vec<OsString>,
    /// Extra environment variables layered over the inherited environment.
    pub env: Vec<(String, String)>,
}

impl ToolCommand {
    /// Creates a command for `program` with no arguments.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    /// Appends a single argument.
    #[must_use]
    pub fn arg(mut self, value: impl Into<OsString>) -> Self {
        self.args.push(value.into());
        self
    }

    /// Appends several arguments in order.
    #[must_use]
    pub fn args<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(values.into_iter().map(Into::into));
        self
    }

    /// Replaces the environment overlay.
    #[must_use]
    pub fn with_env(mut self, env: Vec<(String, String)>) -> Self {
        self.env = env;
        self
    }

    /// Returns a shell-like rendering for logs and assertions.
    #[must_use]
    pub fn display(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.clone());
        parts.extend(
            self.args
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned()),
        );
        parts.join(" ")
    }
}

/// Result of running an external command.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CommandOutput {
    /// Exit code reported by the process, if available.
    pub code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl CommandOutput {
    /// Returns `true` when the exit code equals zero.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.code, Some(0))
    }
}

/// Abstraction over command execution to support fakes in tests.
pub trait CommandRunner {
    /// Runs `command` inside `cwd`, capturing stdout and stderr.
    ///
    /// A non-zero exit status is a normal outcome and is reported through
    /// [`CommandOutput::code`].
    ///
    /// # Errors
    ///
    /// Returns [`InvokeError::Spawn`] if the command cannot be started,
    /// including when `cwd` does not exist.
    fn run(&self, command: &ToolCommand, cwd: &Utf8Path) -> Result<CommandOutput, InvokeError>;
}

impl<R: CommandRunner + ?Sized> CommandRunner for &R {
    fn run(&self, command: &ToolCommand, cwd: &Utf8Path) -> Result<CommandOutput, InvokeError> {
        (**self).run(command, cwd)
    }
}

/// Real command runner that shells out to the host operating system.
#[derive(Clone, Debug, Default)]
pub struct ProcessCommandRunner;

impl CommandRunner for ProcessCommandRunner {
    fn run(&self, command: &ToolCommand, cwd: &Utf8Path) -> Result<CommandOutput, InvokeError> {
        let output = build_command(command, cwd)
            .output()
            .map_err(|err| spawn_error(command, cwd, &err))?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Command runner that forwards child output to the terminal while capturing
/// it, so operators can follow long-running tool invocations live.
#[derive(Clone, Debug, Default)]
pub struct StreamingCommandRunner;

impl CommandRunner for StreamingCommandRunner {
    fn run(&self, command: &ToolCommand, cwd: &Utf8Path) -> Result<CommandOutput, InvokeError> {
        let mut child = build_command(command, cwd)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| spawn_error(command, cwd, &err))?;

        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();

        let stderr_handle = thread::spawn(move || tee(stderr_pipe, io::stderr()));
        let stdout = tee(stdout_pipe, io::stdout());
        let stderr = stderr_handle.join().unwrap_or_default();

        let status = child.wait().map_err(|err| spawn_error(command, cwd, &err))?;

        Ok(CommandOutput {
            code: status.code(),
            stdout,
            stderr,
        })
    }
}

fn build_command(command: &ToolCommand, cwd: &Utf8Path) -> Command {
    let mut process = Command::new(&command.program);
    process
        .args(&command.args)
        .current_dir(cwd)
        .envs(command.env.iter().map(|(key, value)| (key, value)));
    process
}

fn spawn_error(command: &ToolCommand, cwd: &Utf8Path, err: &io::Error) -> InvokeError {
    InvokeError::Spawn {
        program: command.program.clone(),
        cwd: Utf8PathBuf::from(cwd),
        message: err.to_string(),
    }
}

fn tee<R: Read>(source: Option<R>, mut sink: impl Write) -> String {
    let Some(pipe) = source else {
        return String::new();
    };

    let mut captured = Vec::new();
    let mut reader = BufReader::new(pipe);
    loop {
        let mut line = Vec::new();
        match reader.read_until(b'\n', &mut line) {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                sink.write_all(&line).ok();
                sink.flush().ok();
                captured.extend_from_slice(&line);
            }
        }
    }

    String::from_utf8_lossy(&captured).into_owned()
}
