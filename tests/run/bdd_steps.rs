//! BDD step definitions for pipeline runs.

use iacflow::credentials::ClusterIdentity;
use iacflow::publish::DeliveryError;
use iacflow::run::RunOrchestrator;
use iacflow::test_support::{RecordingPublisher, ScriptedRunner};
use rstest_bdd_macros::{given, then, when};
use tokio::runtime::Runtime;

use super::test_helpers::{REQUIRED_TOOL_VERSION, RunContext, parse_workflow};

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("assertion failed: {0}")]
    Assertion(String),
}

fn push_checkout(run_context: &RunContext) {
    run_context.runner.push_success();
    run_context.runner.push_success();
}

#[given("a ready \"{workflow}\" pipeline")]
fn ready_pipeline(mut run_context: RunContext, workflow: String) -> RunContext {
    run_context.workflow = parse_workflow(&workflow);
    run_context.runner.push_success();
    push_checkout(&run_context);
    run_context.runner.push_version(REQUIRED_TOOL_VERSION);
    run_context
}

#[given("a \"{workflow}\" pipeline whose credentials are rejected")]
fn rejected_pipeline(mut run_context: RunContext, workflow: String) -> RunContext {
    run_context.workflow = parse_workflow(&workflow);
    run_context.runner.push_failure(1);
    run_context
}

#[given("a \"{workflow}\" pipeline with installed tool version \"{version}\"")]
fn mismatched_pipeline(mut run_context: RunContext, workflow: String, version: String) -> RunContext {
    run_context.workflow = parse_workflow(&workflow);
    run_context.runner.push_success();
    push_checkout(&run_context);
    run_context.runner.push_version(&version);
    run_context
}

#[given("a cluster \"{id}\" in zone \"{zone}\"")]
fn cluster_configured(mut run_context: RunContext, id: String, zone: String) -> RunContext {
    run_context.request.secrets.cluster = ClusterIdentity::from_parts(Some(&id), Some(&zone));
    run_context.runner.push_success();
    run_context
}

#[given("a cluster \"{id}\" without a zone")]
fn cluster_without_zone(mut run_context: RunContext, id: String) -> RunContext {
    run_context.request.secrets.cluster = ClusterIdentity::from_parts(Some(&id), None);
    run_context
}

#[given("comment delivery fails")]
fn delivery_fails(mut run_context: RunContext) -> RunContext {
    run_context.publisher = RecordingPublisher::failing(DeliveryError::Rejected {
        status: 502,
        body: String::from("bad gateway"),
    });
    run_context
}

#[given("an outputs file")]
fn outputs_file(mut run_context: RunContext) -> RunContext {
    run_context.request.output_file = Some(run_context.scratch_path().join("outputs"));
    run_context
}

#[given("step \"{name}\" exits with code \"{code}\"")]
fn step_exits(run_context: RunContext, name: String, code: i32) -> RunContext {
    run_context.runner.push_output(
        Some(code),
        format!("{name} line one\n{name} line two"),
        "",
    );
    run_context
}

#[when("the pipeline runs")]
fn pipeline_runs(mut run_context: RunContext) -> Result<RunContext, StepError> {
    let runtime = Runtime::new().map_err(|err| StepError::Assertion(err.to_string()))?;
    let orchestrator: RunOrchestrator<ScriptedRunner, RecordingPublisher> =
        RunOrchestrator::new(run_context.runner.clone(), Some(run_context.publisher.clone()));

    let result = runtime.block_on(orchestrator.execute(run_context.workflow, &run_context.request));
    run_context.outcome = Some(result.map_err(|err| err.to_string()));
    Ok(run_context)
}

fn completed_run(run_context: &RunContext) -> Result<&iacflow::run::PipelineRun, StepError> {
    match &run_context.outcome {
        Some(Ok(run)) => Ok(run),
        Some(Err(err)) => Err(StepError::Assertion(format!("run failed: {err}"))),
        None => Err(StepError::Assertion(String::from("missing outcome"))),
    }
}

#[then("the run exits with code \"{code}\"")]
fn run_exit_code(run_context: &RunContext, code: i32) -> Result<(), StepError> {
    let run = completed_run(run_context)?;
    if run.exit_code() == code {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected exit code {code}, got {}",
            run.exit_code()
        )))
    }
}

#[then("the run outcome is \"{outcome}\"")]
fn run_outcome(run_context: &RunContext, outcome: String) -> Result<(), StepError> {
    let run = completed_run(run_context)?;
    if run.outcome.as_str() == outcome {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected outcome {outcome}, got {}",
            run.outcome.as_str()
        )))
    }
}

#[then("step \"{name}\" is \"{state}\"")]
fn step_state(run_context: &RunContext, name: String, state: String) -> Result<(), StepError> {
    let run = completed_run(run_context)?;
    let result = run
        .step(&name)
        .ok_or_else(|| StepError::Assertion(format!("step {name} was not recorded")))?;
    if result.state.as_str() == state {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {name} to be {state}, got {}",
            result.state
        )))
    }
}

#[then("the run fails with \"{message}\"")]
fn run_fails(run_context: &RunContext, message: String) -> Result<(), StepError> {
    match &run_context.outcome {
        Some(Err(err)) if err.contains(&message) => Ok(()),
        Some(Err(err)) => Err(StepError::Assertion(format!(
            "expected error containing '{message}', got '{err}'"
        ))),
        Some(Ok(_)) => Err(StepError::Assertion(String::from("run unexpectedly completed"))),
        None => Err(StepError::Assertion(String::from("missing outcome"))),
    }
}

#[then("one comment is delivered")]
fn one_comment(run_context: &RunContext) -> Result<(), StepError> {
    let delivered = run_context.publisher.delivered();
    if delivered.len() == 1 {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected one comment, got {}",
            delivered.len()
        )))
    }
}

#[then("no comment is delivered")]
fn no_comment(run_context: &RunContext) -> Result<(), StepError> {
    if run_context.publisher.delivered().is_empty() {
        Ok(())
    } else {
        Err(StepError::Assertion(String::from("expected no comments")))
    }
}

#[then("the delivered comment contains \"{text}\"")]
fn comment_contains(run_context: &RunContext, text: String) -> Result<(), StepError> {
    let delivered = run_context.publisher.delivered();
    let Some(comment) = delivered.first() else {
        return Err(StepError::Assertion(String::from("no comment delivered")));
    };
    if comment.body.contains(&text) {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "comment did not contain '{text}':\n{}",
            comment.body
        )))
    }
}

#[then("the runner invoked \"{command}\"")]
fn runner_invoked(run_context: &RunContext, command: String) -> Result<(), StepError> {
    let invocations = run_context.runner.invocations();
    if invocations
        .iter()
        .any(|invocation| invocation.command_string().contains(&command))
    {
        Ok(())
    } else {
        Err(StepError::Assertion(format!("no invocation matched '{command}'")))
    }
}

#[then("the outputs file contains \"{line}\"")]
fn outputs_contain(run_context: &RunContext, line: String) -> Result<(), StepError> {
    let path = run_context.scratch_path().join("outputs");
    let contents = std::fs::read_to_string(&path)
        .map_err(|err| StepError::Assertion(format!("read {path}: {err}")))?;
    if contents.lines().any(|entry| entry == line) {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "outputs did not contain '{line}':\n{contents}"
        )))
    }
}
