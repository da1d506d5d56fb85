//! Test support utilities shared across unit and integration tests.

use std::cell::RefCell;
use std::collections::{BTreeSet, VecDeque};
use std::env;
use std::ffi::OsString;
use std::rc::Rc;
use std::sync::{Arc, Mutex as StdMutex};

use camino::{Utf8Path, Utf8PathBuf};
use tokio::sync::{Mutex, MutexGuard};

use crate::invoke::{CommandOutput, CommandRunner, InvokeError, ToolCommand};
use crate::publish::{CommentDestination, DeliveryError, PublishFuture, ReportPublisher};
use crate::report::RenderedReport;

/// Scripted command runner that returns pre-seeded outputs in FIFO order.
///
/// Used to drive deterministic command outcomes without spawning processes.
#[derive(Clone, Debug, Default)]
pub struct ScriptedRunner {
    responses: Rc<RefCell<VecDeque<Result<CommandOutput, InvokeError>>>>,
    invocations: Rc<RefCell<Vec<CommandInvocation>>>,
}

/// Records a single invocation made through [`ScriptedRunner`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandInvocation {
    /// Program name as passed to the runner.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<OsString>,
    /// Environment overlay passed to the program.
    pub env: Vec<(String, String)>,
    /// Working directory requested for the program.
    pub cwd: Utf8PathBuf,
}

impl CommandInvocation {
    /// Returns a shell-like command string for assertions.
    #[must_use]
    pub fn command_string(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.clone());
        parts.extend(
            self.args
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned()),
        );
        parts.join(" ")
    }

    /// Returns the value of an environment overlay entry, if present.
    #[must_use]
    pub fn env_value(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }
}

impl ScriptedRunner {
    /// Creates a new runner with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all invocations recorded so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<CommandInvocation> {
        self.invocations.borrow().clone()
    }

    /// Pushes a successful exit status.
    pub fn push_success(&self) {
        self.push_output(Some(0), "", "");
    }

    /// Pushes a specific exit code.
    pub fn push_exit_code(&self, code: i32) {
        self.push_output(Some(code), "", "");
    }

    /// Pushes a failing exit code with stderr text.
    pub fn push_failure(&self, code: i32) {
        self.push_output(Some(code), "", "simulated failure");
    }

    /// Pushes a response with no exit code to simulate abnormal termination.
    pub fn push_missing_exit_code(&self) {
        self.push_output(None, "", "");
    }

    /// Pushes a launch failure, as if the binary were missing.
    pub fn push_spawn_error(&self, program: &str) {
        self.responses
            .borrow_mut()
            .push_back(Err(InvokeError::Spawn {
                program: program.to_owned(),
                cwd: Utf8PathBuf::from("."),
                message: String::from("No such file or directory (os error 2)"),
            }));
    }

    /// Pushes a `version -json` report for the given tool version.
    pub fn push_version(&self, version: &str) {
        self.push_output(
            Some(0),
            format!("{{\"terraform_version\":\"{version}\",\"platform\":\"linux_amd64\"}}"),
            "",
        );
    }

    /// Pushes an explicit command output response.
    pub fn push_output(
        &self,
        code: Option<i32>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) {
        self.responses.borrow_mut().push_back(Ok(CommandOutput {
            code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }));
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, command: &ToolCommand, cwd: &Utf8Path) -> Result<CommandOutput, InvokeError> {
        self.invocations.borrow_mut().push(CommandInvocation {
            program: command.program.clone(),
            args: command.args.clone(),
            env: command.env.clone(),
            cwd: cwd.to_path_buf(),
        });
        self.responses
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| {
                Err(InvokeError::Spawn {
                    program: command.program.clone(),
                    cwd: cwd.to_path_buf(),
                    message: String::from("no scripted response available"),
                })
            })
    }
}

/// A delivered comment captured by [`RecordingPublisher`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DeliveredComment {
    /// Destination the comment was addressed to.
    pub destination: CommentDestination,
    /// Comment body.
    pub body: String,
}

/// Publisher that records deliveries instead of calling a forge.
#[derive(Clone, Debug, Default)]
pub struct RecordingPublisher {
    delivered: Arc<StdMutex<Vec<DeliveredComment>>>,
    fail_with: Option<DeliveryError>,
}

impl RecordingPublisher {
    /// Creates a publisher that accepts every delivery.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a publisher that rejects every delivery with `error`.
    #[must_use]
    pub fn failing(error: DeliveryError) -> Self {
        Self {
            delivered: Arc::default(),
            fail_with: Some(error),
        }
    }

    /// Returns a snapshot of the comments delivered so far.
    #[must_use]
    pub fn delivered(&self) -> Vec<DeliveredComment> {
        self.delivered
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

impl ReportPublisher for RecordingPublisher {
    fn publish<'a>(
        &'a self,
        report: &'a RenderedReport,
        destination: &'a CommentDestination,
    ) -> PublishFuture<'a> {
        Box::pin(async move {
            if let Some(err) = self.fail_with.clone() {
                return Err(err);
            }
            if let Ok(mut guard) = self.delivered.lock() {
                guard.push(DeliveredComment {
                    destination: destination.clone(),
                    body: report.body().to_owned(),
                });
            }
            Ok(())
        })
    }
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: Mutex<()> = Mutex::const_new(());

/// Guard that holds the env mutex and cleans up variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: MutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets multiple environment variables while holding a global mutex.
    pub async fn set_vars(pairs: &[(&str, &str)]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                pairs.iter().all(|(key, _)| seen.insert(*key))
            },
            "duplicate environment variable keys passed to EnvGuard::set_vars"
        );

        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let old = env::var_os(key);
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe { env::set_var(key, value) };
            previous.push(((*key).to_owned(), old));
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in &self.previous {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
