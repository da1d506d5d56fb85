//! Binary entry point for the iacflow CLI.

use std::io::{self, Write};
use std::process;

use clap::Parser;
use thiserror::Error;

use iacflow::config::{ConfigError, ForgeConfig, PipelineConfig};
use iacflow::pipeline::Workflow;
use iacflow::run::{RunError, RunOrchestrator};
use iacflow::{StreamingCommandRunner, telemetry};

mod cli;

use cli::{Cli, Command};

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("pipeline run failed: {0}")]
    Run(#[from] RunError),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    telemetry::init();
    let exit_code = match dispatch(cli).await {
        Ok(code) => code,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

const fn workflow_for(command: Command) -> Workflow {
    match command {
        Command::Plan => Workflow::Plan,
        Command::Apply => Workflow::Apply,
    }
}

async fn dispatch(cli: Cli) -> Result<i32, CliError> {
    let Some(command) = cli.command else {
        return Ok(0);
    };
    run_workflow(workflow_for(command), cli.no_comment).await
}

async fn run_workflow(workflow: Workflow, no_comment: bool) -> Result<i32, CliError> {
    let pipeline = PipelineConfig::load_without_cli_args()?;
    let forge = ForgeConfig::load_without_cli_args()?;
    let request = pipeline.to_run_request(workflow, &forge)?;

    let publisher = if no_comment { None } else { forge.publisher() };
    let orchestrator = RunOrchestrator::new(StreamingCommandRunner, publisher);
    let run = orchestrator.execute(workflow, &request).await?;

    Ok(run.exit_code())
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}
