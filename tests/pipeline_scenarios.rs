//! End-to-end pipeline runs against a fake `/bin/sh` toolchain.

#![cfg(unix)]

mod common;

use std::time::{Duration, Instant};

use common::{FakeToolchain, PassBehavior, INVALID_SOURCE, VALID_SOURCE};
use ir_forge::pipeline::{FailureReason, ObfuscationOptions, PipelineState, StageKind};
use serde_json::Value;

fn passes(keys: &[&str]) -> ObfuscationOptions {
    keys.iter().fold(
        ObfuscationOptions::new().with_enabled(true),
        |options, key| options.with_flag(*key, true),
    )
}

fn json(response: &ir_forge::pipeline::CompileResponse) -> Value {
    serde_json::to_value(response.body()).unwrap()
}

fn stage_names(body: &Value) -> Vec<String> {
    body["obfuscationResults"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["name"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn test_scenario_a_plain_compile() {
    let fake = FakeToolchain::new();
    let orchestrator = fake.orchestrator();

    let response = orchestrator
        .compile(Some(VALID_SOURCE.to_string()), None, ObfuscationOptions::new())
        .await;

    assert_eq!(response.status(), 200);
    let body = json(&response);
    assert_eq!(stage_names(&body), vec!["original"]);
    let original = &body["obfuscationResults"][0];
    assert_eq!(original["stageName"], "Original");
    assert_eq!(original["input"], VALID_SOURCE);
    assert!(original["output"]
        .as_str()
        .unwrap()
        .starts_with("; ModuleID = '00-source.cpp' (clang 18)"));
    assert_eq!(
        body["executionOutput"],
        "Hello, World!\nProgram exited with code 0"
    );
    assert_eq!(fake.leftover_entries(), 0);
}

#[tokio::test]
async fn test_scenario_b_empty_code() {
    let fake = FakeToolchain::new();
    let orchestrator = fake.orchestrator();

    let response = orchestrator
        .compile(Some(String::new()), None, ObfuscationOptions::new())
        .await;

    assert_eq!(response.status(), 400);
    assert_eq!(json(&response), serde_json::json!({ "error": "No code provided" }));
    assert_eq!(fake.leftover_entries(), 0);
}

#[tokio::test]
async fn test_scenario_c_compile_error() {
    let fake = FakeToolchain::new();
    let orchestrator = fake.orchestrator();

    let response = orchestrator
        .compile(
            Some(INVALID_SOURCE.to_string()),
            None,
            ObfuscationOptions::new(),
        )
        .await;

    assert_eq!(response.status(), 500);
    let body = json(&response);
    assert_eq!(body["error"], "Compilation failed");
    assert_eq!(body["failedStage"], "original");
    assert!(stage_names(&body).is_empty());

    let details = body["details"].as_str().unwrap();
    assert!(details.starts_with("00-source.cpp:1:13: error"));
    assert!(!details.contains(fake.workspace_root().to_str().unwrap()));
    assert_eq!(fake.leftover_entries(), 0);
}

#[tokio::test]
async fn test_scenario_d_single_pass() {
    let fake = FakeToolchain::new();
    let orchestrator = fake.orchestrator();

    let response = orchestrator
        .compile(
            Some(VALID_SOURCE.to_string()),
            None,
            passes(&["pluto_flattening"]),
        )
        .await;

    assert_eq!(response.status(), 200);
    let body = json(&response);
    assert_eq!(stage_names(&body), vec!["original", "pluto_flattening"]);

    let results = body["obfuscationResults"].as_array().unwrap();
    assert_eq!(results[1]["input"], results[0]["output"]);
    assert!(results[1]["output"]
        .as_str()
        .unwrap()
        .trim_end()
        .ends_with("; pass fla via /opt/passes/libpasses.so"));
}

#[tokio::test]
async fn test_scenario_e_later_pass_fails() {
    let fake = FakeToolchain::new().with_pass("sub", PassBehavior::Fail);
    let orchestrator = fake.orchestrator();

    let response = orchestrator
        .compile(
            Some(VALID_SOURCE.to_string()),
            None,
            passes(&["pluto_substitution", "pluto_flattening"]),
        )
        .await;

    assert_eq!(response.status(), 500);
    let body = json(&response);
    assert_eq!(body["error"], "Obfuscation pass 'pluto_substitution' failed");
    assert_eq!(body["failedStage"], "pluto_substitution");
    assert_eq!(stage_names(&body), vec!["original", "pluto_flattening"]);
    assert_eq!(
        body["details"],
        "opt: pass 'sub' crashed on 02-pluto_flattening.ll\n"
    );
    assert_eq!(fake.leftover_entries(), 0);
}

#[tokio::test]
async fn test_all_passes_run_in_registry_order() {
    let fake = FakeToolchain::new();
    let orchestrator = fake.orchestrator();

    let request = orchestrator
        .validate(
            Some(VALID_SOURCE.to_string()),
            Some("17".to_string()),
            passes(&[
                "pluto_substitution",
                "pluto_mba_obfuscation",
                "pluto_indirect_call",
                "pluto_global_encryption",
                "pluto_flattening",
                "pluto_bogus_control_flow",
            ]),
        )
        .unwrap();

    let result = orchestrator.run(&request).await.unwrap();
    assert!(result.is_success());
    assert_eq!(
        result.stage_names(),
        vec![
            "original",
            "pluto_bogus_control_flow",
            "pluto_flattening",
            "pluto_global_encryption",
            "pluto_indirect_call",
            "pluto_mba_obfuscation",
            "pluto_substitution",
        ]
    );

    let last = &result.stages()[6].output;
    let order: Vec<_> = last
        .lines()
        .filter_map(|line| line.strip_prefix("; pass "))
        .map(|rest| rest.split_whitespace().next().unwrap())
        .collect();
    assert_eq!(order, vec!["bcf", "fla", "gle", "idc", "mba", "sub"]);
    assert!(result.stages()[0].output.contains("(clang 17)"));
}

#[tokio::test]
async fn test_master_switch_off_runs_no_pass() {
    let fake = FakeToolchain::new().with_pass("fla", PassBehavior::Fail);
    let orchestrator = fake.orchestrator();

    let options = ObfuscationOptions::new()
        .with_enabled(false)
        .with_flag("pluto_flattening", true);
    let response = orchestrator
        .compile(Some(VALID_SOURCE.to_string()), None, options)
        .await;

    assert_eq!(response.status(), 200);
    assert_eq!(stage_names(&json(&response)), vec!["original"]);
}

#[tokio::test]
async fn test_unknown_option_is_rejected() {
    let fake = FakeToolchain::new();
    let orchestrator = fake.orchestrator();

    let response = orchestrator
        .compile(
            Some(VALID_SOURCE.to_string()),
            None,
            passes(&["pluto_flattening", "pluto_virtualize"]),
        )
        .await;

    assert_eq!(response.status(), 400);
    assert_eq!(
        json(&response)["error"],
        "Unknown obfuscation option: pluto_virtualize"
    );
}

#[tokio::test]
async fn test_pass_without_output_fails_that_pass() {
    let fake = FakeToolchain::new().with_pass("gle", PassBehavior::SkipOutput);
    let orchestrator = fake.orchestrator();

    let request = orchestrator
        .validate(
            Some(VALID_SOURCE.to_string()),
            None,
            passes(&["pluto_global_encryption", "pluto_substitution"]),
        )
        .unwrap();
    let result = orchestrator.run(&request).await.unwrap();

    assert_eq!(result.state(), PipelineState::Failed { stage_index: 1 });
    let failure = result.failure().unwrap();
    assert_eq!(failure.reason, FailureReason::OutputMissing);
    assert_eq!(failure.stage, "pluto_global_encryption");
    assert_eq!(result.stage_names(), vec!["original"]);
    assert_eq!(fake.leftover_entries(), 0);
}

#[tokio::test]
async fn test_program_exit_code_fails_execute_stage() {
    let fake = FakeToolchain::new().with_program_exit(3);
    let orchestrator = fake.orchestrator();

    let response = orchestrator
        .compile(Some(VALID_SOURCE.to_string()), None, ObfuscationOptions::new())
        .await;

    assert_eq!(response.status(), 500);
    let body = json(&response);
    assert_eq!(body["error"], "Execution failed");
    assert_eq!(body["failedStage"], "execute");
    assert_eq!(body["details"], "Hello, World!\nProgram exited with code 3");
    assert_eq!(stage_names(&body), vec!["original"]);
}

#[tokio::test]
async fn test_hanging_pass_times_out() {
    let fake = FakeToolchain::new()
        .with_pass("bcf", PassBehavior::Hang)
        .with_stage_timeout(Duration::from_secs(1));
    let orchestrator = fake.orchestrator();

    let request = orchestrator
        .validate(
            Some(VALID_SOURCE.to_string()),
            None,
            passes(&["pluto_bogus_control_flow"]),
        )
        .unwrap();

    let start = Instant::now();
    let result = orchestrator.run(&request).await.unwrap();

    assert!(start.elapsed() < Duration::from_secs(10));
    let failure = result.failure().unwrap();
    assert_eq!(failure.reason, FailureReason::Timeout);
    assert_eq!(failure.kind, StageKind::Pass { pass: "bcf" });
    assert_eq!(
        failure.diagnostic,
        "stage 'pluto_bogus_control_flow' timed out after 1s"
    );
    assert_eq!(result.stage_names(), vec!["original"]);
    assert_eq!(fake.leftover_entries(), 0);
}

#[tokio::test]
async fn test_hanging_program_times_out_execute_stage() {
    let fake = FakeToolchain::new()
        .with_hanging_program()
        .with_execute_timeout(Duration::from_secs(1));
    let orchestrator = fake.orchestrator();

    let request = orchestrator
        .validate(
            Some(VALID_SOURCE.to_string()),
            None,
            passes(&["pluto_flattening"]),
        )
        .unwrap();

    let start = Instant::now();
    let result = orchestrator.run(&request).await.unwrap();

    assert!(start.elapsed() < Duration::from_secs(10));
    assert_eq!(result.state(), PipelineState::Failed { stage_index: 3 });
    let failure = result.failure().unwrap();
    assert_eq!(failure.kind, StageKind::Execute);
    assert_eq!(failure.reason, FailureReason::Timeout);
    assert_eq!(failure.diagnostic, "stage 'execute' timed out after 1s");
    assert_eq!(result.stage_names(), vec!["original", "pluto_flattening"]);
    assert_eq!(fake.leftover_entries(), 0);
}

#[tokio::test]
async fn test_response_never_contains_workspace_paths() {
    let fake = FakeToolchain::new();
    let orchestrator = fake.orchestrator();

    let response = orchestrator
        .compile(
            Some(VALID_SOURCE.to_string()),
            None,
            passes(&["pluto_flattening", "pluto_substitution"]),
        )
        .await;

    assert_eq!(response.status(), 200);
    let text = serde_json::to_string(response.body()).unwrap();
    assert!(!text.contains(fake.workspace_root().to_str().unwrap()));
    assert!(!text.contains("ir-forge-"));

    let body = json(&response);
    let original = body["obfuscationResults"][0]["output"].as_str().unwrap();
    assert!(original.starts_with("; ModuleID = '00-source.cpp'"));
    assert!(original.contains("; directory = \".\""));
}

#[tokio::test]
async fn test_identical_requests_yield_identical_ir() {
    let fake = FakeToolchain::new();
    let orchestrator = fake.orchestrator();

    let mut runs = Vec::new();
    for _ in 0..2 {
        let response = orchestrator
            .compile(
                Some(VALID_SOURCE.to_string()),
                None,
                passes(&["pluto_indirect_call"]),
            )
            .await;
        let body = json(&response);
        let ir: Vec<(Value, Value)> = body["obfuscationResults"]
            .as_array()
            .unwrap()
            .iter()
            .map(|s| (s["input"].clone(), s["output"].clone()))
            .collect();
        runs.push(ir);
    }

    assert_eq!(runs[0].len(), 2);
    assert_eq!(runs[0], runs[1]);
}

#[tokio::test]
async fn test_tool_scratch_files_stay_inside_workspace() {
    let fake = FakeToolchain::new();
    let orchestrator = fake.orchestrator();

    let response = orchestrator
        .compile(Some(VALID_SOURCE.to_string()), None, ObfuscationOptions::new())
        .await;

    assert_eq!(response.status(), 200);
    for name in ["ld-scratch.tmp", "run.log"] {
        assert!(!fake.tools_dir().join(name).exists());
        assert!(!std::path::Path::new(name).exists());
    }
    assert_eq!(fake.leftover_entries(), 0);
}

#[tokio::test]
async fn test_cancelled_run_releases_workspace() {
    let fake = FakeToolchain::new().with_pass("mba", PassBehavior::Hang);
    let orchestrator = fake.orchestrator();

    let request = orchestrator
        .validate(
            Some(VALID_SOURCE.to_string()),
            None,
            passes(&["pluto_mba_obfuscation"]),
        )
        .unwrap();

    let task = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.run(&request).await })
    };

    let deadline = Instant::now() + Duration::from_secs(10);
    while !fake.hang_marker().exists() {
        assert!(Instant::now() < deadline, "pass never started");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(fake.leftover_entries(), 1);

    task.abort();
    let err = task.await.unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(fake.leftover_entries(), 0);
}

#[tokio::test]
async fn test_concurrent_runs_are_isolated() {
    let fake = FakeToolchain::new();
    let orchestrator = fake.orchestrator();

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move {
                let source = format!("int main(){{return {};}}", i);
                let response = orchestrator
                    .compile(
                        Some(source.clone()),
                        None,
                        passes(&["pluto_flattening"]),
                    )
                    .await;
                (source, response)
            })
        })
        .collect();

    for handle in handles {
        let (source, response) = handle.await.unwrap();
        assert_eq!(response.status(), 200);
        let body = json(&response);
        assert_eq!(body["obfuscationResults"][0]["input"], source.as_str());
        assert!(body["obfuscationResults"][1]["output"]
            .as_str()
            .unwrap()
            .contains(&source));
    }

    assert_eq!(fake.leftover_entries(), 0);
    assert_eq!(orchestrator.stats().succeeded, 8);
}

#[tokio::test]
async fn test_repeated_request_yields_same_stage_order() {
    let fake = FakeToolchain::new();
    let orchestrator = fake.orchestrator();

    let request = orchestrator
        .validate(
            Some(VALID_SOURCE.to_string()),
            None,
            passes(&["pluto_indirect_call", "pluto_bogus_control_flow"]),
        )
        .unwrap();

    let first = orchestrator.run(&request).await.unwrap();
    let second = orchestrator.run(&request).await.unwrap();

    assert_ne!(first.run_id(), second.run_id());
    assert_eq!(first.stage_names(), second.stage_names());
    assert_eq!(
        first.stage_names(),
        vec!["original", "pluto_bogus_control_flow", "pluto_indirect_call"]
    );
}
