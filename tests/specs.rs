// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace-level integration tests against the built `vgate` binary
//! (spec.md §6 exit codes, §6 configuration surface). These exercise the
//! CLI boundary only — the in-process unit/integration suites in each
//! crate cover the state machine, proxy, and scaler behavior.

use assert_cmd::Command;

fn vgate() -> Command {
    Command::cargo_bin("vgate").expect("vgate binary is built as a workspace member")
}

#[test]
fn help_lists_every_configuration_option() {
    let assert = vgate().arg("--help").assert().success();
    let output = assert.get_output();
    let stdout = String::from_utf8_lossy(&output.stdout);
    for flag in [
        "--namespace",
        "--workload-name",
        "--model-id",
        "--idle-timeout",
        "--port",
        "--gpu-count",
        "--cpu-offload-gb",
        "--public-endpoint",
        "--log-output",
    ] {
        assert!(stdout.contains(flag), "expected --help to mention {flag}, got:\n{stdout}");
    }
}

#[test]
fn version_flag_prints_version_and_exits_zero() {
    let assert = vgate().arg("--version").assert().success();
    let stdout = String::from_utf8_lossy(&assert.get_output().stdout).trim().to_string();
    similar_asserts::assert_eq!(stdout, format!("vgate {}", env!("CARGO_PKG_VERSION")));
}

#[test]
fn missing_required_model_id_fails_before_any_cluster_call() {
    // clap itself rejects a missing required argument; vgate never reaches
    // bootstrap or tries to construct a cluster client.
    vgate().assert().failure().code(2);
}

#[test]
fn unreachable_cluster_exits_with_startup_failure_code() {
    // No kubeconfig, no in-cluster service account — `KubeCluster::try_default`
    // fails before the runtime starts serving, so this must exit 1
    // (spec.md §6: "1 on startup failure") rather than hang or panic.
    let dir = tempfile::tempdir().expect("tempdir");
    vgate()
        .arg("--model-id")
        .arg("llama3")
        .env("HOME", dir.path())
        .env_remove("KUBECONFIG")
        .env_remove("KUBERNETES_SERVICE_HOST")
        .assert()
        .failure()
        .code(1);
}

#[test]
fn invalid_idle_timeout_is_config_invalid_before_any_cluster_call() {
    let dir = tempfile::tempdir().expect("tempdir");
    vgate()
        .arg("--model-id")
        .arg("llama3")
        .arg("--idle-timeout")
        .arg("not-a-duration")
        .env("HOME", dir.path())
        .env_remove("KUBECONFIG")
        .assert()
        .failure()
        .code(1);
}

#[test]
fn zero_gpu_count_is_config_invalid() {
    let dir = tempfile::tempdir().expect("tempdir");
    vgate()
        .arg("--model-id")
        .arg("llama3")
        .arg("--gpu-count")
        .arg("0")
        .env("HOME", dir.path())
        .env_remove("KUBECONFIG")
        .assert()
        .failure()
        .code(1);
}
