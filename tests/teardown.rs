//! Scenario 5 from spec §8: a child that traps SIGQUIT/SIGTERM/SIGINT,
//! ignores the first two, and exits 42 on SIGINT. Exercises a custom
//! teardown sequence requested mid-run via [`subexec::Execution::request_teardown`].

#![cfg(unix)]

use std::time::Duration;

use nix::sys::signal::Signal;
use subexec::convenience::command;
use subexec::{run_with_body, InputSource, OutputSink, TeardownStep, TerminationStatus};

#[tokio::test]
async fn custom_teardown_sequence_runs_in_order() {
    let script = r#"
        trap 'exit 42' INT
        trap '' TERM
        trap '' QUIT
        echo ready
        while true; do sleep 0.05; done
    "#;
    let cfg = command("sh").arg("-c").arg(script);

    let result = run_with_body(
        cfg,
        InputSource::None,
        OutputSink::CollectString(256),
        OutputSink::Discard,
        |execution| async move {
            // Give the child time to install its trap handlers before we
            // start signalling it.
            tokio::time::sleep(Duration::from_millis(200)).await;
            execution
                .request_teardown(vec![
                    TeardownStep::Send(Signal::SIGQUIT, Duration::from_millis(500)),
                    TeardownStep::Send(Signal::SIGTERM, Duration::from_millis(500)),
                    TeardownStep::Send(Signal::SIGINT, Duration::from_millis(1000)),
                ])
                .await
                .expect("teardown request should be accepted while the child is alive");
        },
    )
    .await
    .expect("run should complete once teardown reaches SIGINT");

    assert_eq!(result.status, TerminationStatus::Exited(42));
}

#[tokio::test]
async fn teardown_of_an_already_exited_child_skips_grace_periods() {
    let cfg = command("sh").arg("-c").arg("exit 7");

    let started = std::time::Instant::now();
    let result = run_with_body(
        cfg,
        InputSource::None,
        OutputSink::Discard,
        OutputSink::Discard,
        |execution| async move {
            // Let the child finish entirely on its own before asking for
            // teardown; `run_or_already_exited` should reap it immediately
            // rather than waiting out the default grace periods.
            tokio::time::sleep(Duration::from_millis(200)).await;
            let _ = execution.terminate().await;
        },
    )
    .await
    .expect("run should complete");
    let elapsed = started.elapsed();

    assert_eq!(result.status, TerminationStatus::Exited(7));
    assert!(
        elapsed < Duration::from_secs(1),
        "teardown of an already-exited child took {elapsed:?}, expected it to short-circuit"
    );
}
