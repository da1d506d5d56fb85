//! BDD scenarios for pipeline runs.

use rstest_bdd_macros::scenario;

use super::test_helpers::{RunContext, run_context};

#[scenario(
    path = "tests/features/run.feature",
    name = "A clean plan exits zero and publishes one comment"
)]
fn scenario_clean_plan(run_context: RunContext) {
    let _ = run_context;
}

#[scenario(
    path = "tests/features/run.feature",
    name = "A formatting failure is tolerated but fails the exit gate"
)]
fn scenario_formatting_failure(run_context: RunContext) {
    let _ = run_context;
}

#[scenario(
    path = "tests/features/run.feature",
    name = "A validation failure halts the plan"
)]
fn scenario_validation_failure(run_context: RunContext) {
    let _ = run_context;
}

#[scenario(
    path = "tests/features/run.feature",
    name = "A failed apply fails the run"
)]
fn scenario_failed_apply(run_context: RunContext) {
    let _ = run_context;
}

#[scenario(
    path = "tests/features/run.feature",
    name = "Rejected credentials abort without a report"
)]
fn scenario_rejected_credentials(run_context: RunContext) {
    let _ = run_context;
}

#[scenario(
    path = "tests/features/run.feature",
    name = "A tool version mismatch aborts before any step"
)]
fn scenario_version_mismatch(run_context: RunContext) {
    let _ = run_context;
}

#[scenario(
    path = "tests/features/run.feature",
    name = "Delivery failure does not change the outcome"
)]
fn scenario_delivery_failure(run_context: RunContext) {
    let _ = run_context;
}

#[scenario(
    path = "tests/features/run.feature",
    name = "Cluster credentials are fetched before the tool runs"
)]
fn scenario_cluster_credentials(run_context: RunContext) {
    let _ = run_context;
}

#[scenario(
    path = "tests/features/run.feature",
    name = "A cluster without a zone skips the cluster credentials"
)]
fn scenario_cluster_without_zone(run_context: RunContext) {
    let _ = run_context;
}

#[scenario(
    path = "tests/features/run.feature",
    name = "The main step output is exported on one line"
)]
fn scenario_export_outputs(run_context: RunContext) {
    let _ = run_context;
}
