//! Scenario 7 from spec §8: many children spawned concurrently, each
//! writing a fixed amount to stdout and stderr, succeeding independently
//! with correctly sized captures and no descriptor leakage.

#![cfg(unix)]

use subexec::convenience::command;
use subexec::{run_collected, CapturedOutput, InputSource, OutputSink, TerminationStatus};

/// Half the process's open-file-descriptor soft limit, capped so the test
/// suite stays fast on environments with a very high limit configured.
fn fleet_size() -> usize {
    let mut rlim: libc::rlimit = unsafe { std::mem::zeroed() };
    let limit = if unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, &mut rlim) } == 0 {
        rlim.rlim_cur as usize
    } else {
        1024
    };
    (limit / 2).clamp(8, 200)
}

fn open_fd_count() -> usize {
    std::fs::read_dir("/proc/self/fd")
        .map(|entries| entries.count())
        .unwrap_or(0)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_fleet_all_succeed_with_no_fd_leak() {
    let n = fleet_size();
    let before = open_fd_count();

    let mut handles = Vec::with_capacity(n);
    for _ in 0..n {
        let cfg = command("sh")
            .arg("-c")
            .arg("printf '%01000d' 1 1>&1; printf '%01000d' 1 1>&2");
        handles.push(tokio::spawn(run_collected(
            cfg,
            InputSource::None,
            OutputSink::CollectBytes(2048),
            OutputSink::CollectBytes(2048),
        )));
    }

    for handle in handles {
        let result = handle
            .await
            .expect("task should not panic")
            .expect("child should spawn and exit cleanly");
        assert_eq!(result.status, TerminationStatus::Exited(0));
        match (result.stdout, result.stderr) {
            (CapturedOutput::Bytes(out), CapturedOutput::Bytes(err)) => {
                assert_eq!(out.len(), 1000);
                assert_eq!(err.len(), 1000);
            }
            other => panic!("expected byte captures, got {other:?}"),
        }
    }

    // Give any lingering teardown/reap bookkeeping a moment to settle before
    // comparing descriptor counts.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    let after = open_fd_count();
    assert_eq!(before, after, "descriptor count should return to baseline after the fleet completes");
}
