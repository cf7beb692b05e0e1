//! Coverage for the ergonomic `convenience` module layered on top of the
//! core entry points.

#![cfg(unix)]

use subexec::convenience::{command, run_collected_str, run_collected_str_with_input};
use subexec::TerminationStatus;

#[tokio::test]
async fn run_collected_str_decodes_utf8_text() {
    let cfg = command("echo").arg("héllo");
    let result = run_collected_str(cfg).await.expect("echo should succeed");

    assert_eq!(result.status, TerminationStatus::Exited(0));
    assert_eq!(result.stdout, "héllo\n");
    assert_eq!(result.stderr, "");
}

#[tokio::test]
async fn run_collected_str_with_input_roundtrips_through_cat() {
    let cfg = command("cat");
    let result = run_collected_str_with_input(cfg, "line one\nline two\n")
        .await
        .expect("cat should echo stdin back");

    assert_eq!(result.status, TerminationStatus::Exited(0));
    assert_eq!(result.stdout, "line one\nline two\n");
}

#[tokio::test]
async fn configuration_builder_sets_args_env_and_cwd() {
    let dir = std::env::temp_dir();
    let cfg = command("sh")
        .arg("-c")
        .arg("echo $GREETING; pwd")
        .env("GREETING", "hi there")
        .current_dir(&dir);

    let result = run_collected_str(cfg).await.expect("sh should succeed");
    assert_eq!(result.status, TerminationStatus::Exited(0));
    let mut lines = result.stdout.lines();
    assert_eq!(lines.next(), Some("hi there"));
    let reported_dir = lines.next().expect("pwd should print a line");
    assert_eq!(
        std::fs::canonicalize(reported_dir).unwrap(),
        std::fs::canonicalize(&dir).unwrap()
    );
}
