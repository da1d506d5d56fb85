//! Command-line interface definitions for the `iacflow` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::{Parser, Subcommand};

/// Top-level CLI for the `iacflow` binary.
#[derive(Debug, Parser)]
#[command(
    name = "iacflow",
    version,
    about = "Run infrastructure-as-code plan and apply pipelines and report to the pull request"
)]
pub(crate) struct Cli {
    /// Render the report but do not post it as a comment.
    #[arg(long, global = true)]
    pub(crate) no_comment: bool,
    /// Workflow to run. Without one the command does nothing.
    #[command(subcommand)]
    pub(crate) command: Option<Command>,
}

/// Workflows selectable from the command line.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Subcommand)]
pub(crate) enum Command {
    /// Check formatting, initialise, validate, and plan.
    #[command(name = "plan", about = "Check formatting, initialise, validate, and plan")]
    Plan,
    /// Initialise and apply.
    #[command(name = "apply", about = "Initialise and apply")]
    Apply,
}
