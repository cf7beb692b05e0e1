//! End-to-end coverage of [`subexec::run_collected`] against real system
//! binaries, following spec scenarios 1, 2, 3 and 6: echo-and-collect,
//! cat roundtrip, stderr redirection, and executable-not-found.

#![cfg(unix)]

use subexec::convenience::command;
use subexec::{run_collected, CapturedOutput, Error, InputSource, OutputSink, TerminationStatus};

/// A small deterministic xorshift PRNG so the 2 MiB roundtrip payload
/// doesn't need to pull in an external `rand` dependency.
fn pseudo_random_bytes(len: usize, seed: u64) -> Vec<u8> {
    let mut state = seed | 1;
    let mut out = Vec::with_capacity(len);
    while out.len() < len {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        out.extend_from_slice(&state.to_le_bytes());
    }
    out.truncate(len);
    out
}

#[tokio::test]
async fn echo_and_collect() {
    let cfg = command("echo").arg("hello world");
    let result = run_collected(
        cfg,
        InputSource::None,
        OutputSink::CollectString(1024),
        OutputSink::Discard,
    )
    .await
    .expect("echo should spawn and exit cleanly");

    assert_eq!(result.status, TerminationStatus::Exited(0));
    match result.stdout {
        CapturedOutput::Text(text) => assert_eq!(text, "hello world\n"),
        other => panic!("expected CollectString to yield Text, got {other:?}"),
    }
}

#[tokio::test]
async fn cat_roundtrip() {
    let payload = pseudo_random_bytes(2 * 1024 * 1024, 0xC0FFEE);
    let cfg = command("cat");
    let result = run_collected(
        cfg,
        InputSource::Bytes(payload.clone()),
        OutputSink::CollectBytes(4 * 1024 * 1024),
        OutputSink::Discard,
    )
    .await
    .expect("cat should echo stdin back to stdout");

    assert_eq!(result.status, TerminationStatus::Exited(0));
    match result.stdout {
        CapturedOutput::Bytes(bytes) => assert_eq!(bytes, payload),
        other => panic!("expected CollectBytes to yield Bytes, got {other:?}"),
    }
}

#[tokio::test]
async fn stderr_redirection() {
    let mut file = std::env::temp_dir();
    file.push(format!("subexec-stderr-redir-{}.txt", std::process::id()));
    std::fs::write(&file, b"redirected to stderr\n").expect("write fixture file");

    let cfg = command("sh")
        .arg("-c")
        .arg(format!("cat {} 1>&2", file.display()));
    let result = run_collected(
        cfg,
        InputSource::None,
        OutputSink::Discard,
        OutputSink::CollectBytes(2 * 1024 * 1024),
    )
    .await
    .expect("shell redirection should run");

    let _ = std::fs::remove_file(&file);

    assert_eq!(result.status, TerminationStatus::Exited(0));
    match result.stderr {
        CapturedOutput::Bytes(bytes) => assert_eq!(bytes, b"redirected to stderr\n"),
        other => panic!("expected CollectBytes to yield Bytes, got {other:?}"),
    }
}

#[tokio::test]
async fn executable_not_found() {
    let cfg = command("definitely-not-a-real-binary");
    let err = run_collected(
        cfg,
        InputSource::None,
        OutputSink::Discard,
        OutputSink::Discard,
    )
    .await
    .expect_err("a nonexistent binary must fail to spawn");

    assert!(matches!(err, Error::ExecutableNotFound(_)), "got {err:?}");
}

#[tokio::test]
async fn collect_limit_truncates_to_a_prefix() {
    let payload = pseudo_random_bytes(64 * 1024, 0xABCD);
    let cfg = command("cat");
    let result = run_collected(
        cfg,
        InputSource::Bytes(payload.clone()),
        OutputSink::CollectBytes(128),
        OutputSink::Discard,
    )
    .await
    .expect("cat should still exit even if its stdout pipe closes early");

    match result.stdout {
        CapturedOutput::Bytes(bytes) => {
            assert_eq!(bytes.len(), 128);
            assert_eq!(bytes, payload[..128]);
        }
        other => panic!("expected CollectBytes to yield Bytes, got {other:?}"),
    }
}
