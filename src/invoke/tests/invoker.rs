//! Tests for variables staging and exit-code capture.

use super::super::*;
use crate::test_support::ScriptedRunner;
use camino::Utf8PathBuf;
use rstest::{fixture, rstest};
use tempfile::TempDir;

struct Workdir {
    path: Utf8PathBuf,
    _tmp: TempDir,
}

#[fixture]
fn workdir() -> Workdir {
    let tmp = TempDir::new().expect("tempdir should be created");
    let path = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).expect("utf8 tempdir");
    Workdir { path, _tmp: tmp }
}

fn plan_command() -> ToolCommand {
    ToolCommand::new("terraform").args(["plan", "-no-color"])
}

#[rstest]
#[case(Some(0))]
#[case(Some(2))]
#[case(None)]
fn invoke_reports_exit_codes_without_erroring(workdir: Workdir, #[case] code: Option<i32>) {
    let runner = ScriptedRunner::new();
    runner.push_output(code, "out", "err");
    let invoker = ToolInvoker::new(runner.clone());

    let output = invoker
        .invoke(&plan_command(), &workdir.path, None)
        .expect("non-zero exit is not an error");

    assert_eq!(output.code, code);
    assert_eq!(output.stdout, "out");
    assert_eq!(output.stderr, "err");
    let invocations = runner.invocations();
    let invocation = invocations.first().expect("one invocation");
    assert_eq!(invocation.command_string(), "terraform plan -no-color");
    assert_eq!(invocation.cwd, workdir.path);
}

#[rstest]
fn invoke_surfaces_launch_failures(workdir: Workdir) {
    let runner = ScriptedRunner::new();
    runner.push_spawn_error("terraform");
    let invoker = ToolInvoker::new(runner);

    let err = invoker
        .invoke(&plan_command(), &workdir.path, None)
        .expect_err("launch failure should error");

    assert!(matches!(err, InvokeError::Spawn { ref program, .. } if program == "terraform"));
}

#[rstest]
fn invoke_appends_variables_verbatim(workdir: Workdir) {
    let runner = ScriptedRunner::new();
    runner.push_success();
    runner.push_success();
    let invoker = ToolInvoker::new(runner);
    let payload = "{\"region\": \"europe-west1\", \"note\": \"$HOME ${var.x}\"}";

    invoker
        .invoke(&plan_command(), &workdir.path, Some(payload))
        .expect("first invoke");
    invoker
        .invoke(&plan_command(), &workdir.path, Some("\n"))
        .expect("second invoke");

    let written = std::fs::read_to_string(workdir.path.join(VARIABLES_FILE_NAME))
        .expect("variables file should exist");
    assert_eq!(written, format!("{payload}\n"));
}

#[rstest]
fn invoke_without_variables_leaves_directory_untouched(workdir: Workdir) {
    let runner = ScriptedRunner::new();
    runner.push_success();
    let invoker = ToolInvoker::new(runner);

    invoker
        .invoke(&plan_command(), &workdir.path, None)
        .expect("invoke");

    assert!(!workdir.path.join(VARIABLES_FILE_NAME).exists());
}

#[rstest]
fn invoke_rejects_variables_for_missing_directory(workdir: Workdir) {
    let runner = ScriptedRunner::new();
    let invoker = ToolInvoker::new(runner.clone());
    let missing = workdir.path.join("absent");

    let err = invoker
        .invoke(&plan_command(), &missing, Some("{}"))
        .expect_err("missing directory should fail");

    assert!(matches!(err, InvokeError::Variables { .. }), "got {err:?}");
    assert!(
        runner.invocations().is_empty(),
        "the tool must not run when staging fails"
    );
}
