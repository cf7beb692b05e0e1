//! Scenario 4 from spec §8: a child that writes many lines while stdout is
//! configured as [`OutputSink::Stream`]. Consuming the stream must yield
//! every line in order, and the status must only become observable after
//! the stream itself hits EOF.

#![cfg(unix)]

use subexec::convenience::command;
use subexec::{run_with_body, InputSource, OutputSink, TerminationStatus};

const LINE_COUNT: usize = 100_000;

#[tokio::test]
async fn streaming_yields_every_line_in_order() {
    // `yes foo | head -n N` is a cheap, deterministic way to get a child
    // that emits exactly N known lines without shelling out to a scripting
    // runtime this environment doesn't provide.
    let cfg = command("sh")
        .arg("-c")
        .arg(format!("yes line | head -n {LINE_COUNT}"));

    let result = run_with_body(
        cfg,
        InputSource::None,
        OutputSink::Stream,
        OutputSink::Discard,
        |execution| async move {
            let mut stream = execution.stdout_stream().expect("stdout was configured as Stream");
            let mut leftover = Vec::new();
            let mut lines = 0usize;
            while let Some(chunk) = stream.next_chunk().await.expect("stream read should not fail") {
                leftover.extend_from_slice(&chunk);
                while let Some(pos) = leftover.iter().position(|&b| b == b'\n') {
                    let line: Vec<u8> = leftover.drain(..=pos).collect();
                    assert_eq!(&line[..], b"line\n");
                    lines += 1;
                }
            }
            assert!(leftover.is_empty(), "stream ended mid-line");
            lines
        },
    )
    .await
    .expect("streaming run should complete");

    assert_eq!(result.value, LINE_COUNT);
    assert_eq!(result.status, TerminationStatus::Exited(0));
}

#[tokio::test]
async fn stream_is_consumable_exactly_once() {
    let cfg = command("sh").arg("-c").arg("echo once");

    let result = run_with_body(
        cfg,
        InputSource::None,
        OutputSink::Stream,
        OutputSink::Discard,
        |execution| async move {
            let first = execution.stdout_stream();
            assert!(first.is_ok());
            let second = execution.stdout_stream();
            assert!(matches!(second, Err(subexec::Error::StreamAlreadyConsumed)));
            let mut stream = first.unwrap();
            while stream.next_chunk().await.unwrap().is_some() {}
        },
    )
    .await
    .expect("run should complete");

    assert_eq!(result.status, TerminationStatus::Exited(0));
}
