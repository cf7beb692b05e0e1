//! `orchestrator`
//!
//! The central algorithm tying the rest of the crate together: spawn, drive
//! stdin, capture stdout/stderr, monitor the child, and — for the two
//! `body`-taking entry points — run the caller's closure concurrently with
//! all of the above, under a single cancellation scope.
//!
//! "Wait for exit" and "drive I/O" run as independently spawned tasks,
//! joined back together here; teardown is an explicit, detached phase
//! rather than something triggered implicitly by dropping a handle.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::command::{Configuration, TeardownStep};
use crate::error::{Error, PipeLabel, Result};
use crate::execution::{Execution, ExecutionShared, SignalRequest};
use crate::input::{InputSource, StandardInputWriter};
use crate::output::{CapturedOutput, OutputSink};
use crate::result::{CollectedResult, ExecutionResult};
use crate::spawn::{self, SpawnOutcome};
use crate::status::{ProcessIdentifier, TerminationStatus};
use crate::teardown;

type CaptureHandle = Option<JoinHandle<Result<CapturedOutput>>>;

struct IoTasks {
    input: Option<JoinHandle<Result<()>>>,
    stdout: CaptureHandle,
    stderr: CaptureHandle,
}

fn spawn_io_tasks(outcome: &mut SpawnOutcome) -> IoTasks {
    let input = outcome.input_driver.take().map(|d| tokio::spawn(d.drive()));
    let stdout = outcome
        .stdout_driver
        .take()
        .map(|d| tokio::spawn(d.capture(PipeLabel::Stdout)));
    let stderr = outcome
        .stderr_driver
        .take()
        .map(|d| tokio::spawn(d.capture(PipeLabel::Stderr)));
    IoTasks { input, stdout, stderr }
}

async fn join_capture(handle: CaptureHandle) -> Result<Option<CapturedOutput>> {
    match handle {
        None => Ok(None),
        Some(h) => match h.await {
            Ok(result) => result.map(Some),
            Err(_join_err) => Err(Error::Cancelled),
        },
    }
}

async fn join_input(handle: Option<JoinHandle<Result<()>>>) -> Result<()> {
    match handle {
        None => Ok(()),
        Some(h) => match h.await {
            Ok(result) => result,
            Err(_join_err) => Err(Error::Cancelled),
        },
    }
}

fn default_teardown_steps(cfg: &Configuration) -> Vec<TeardownStep> {
    cfg.platform_options
        .teardown_sequence
        .clone()
        .unwrap_or_else(crate::command::PlatformOptions::default_teardown_sequence)
}

/// Spawn the child and run `stdin`/`stdout`/`stderr` to completion with no
/// user `body`: the run ends when the process exits on its own (or is
/// killed because an I/O driver failed).
pub async fn run_collected(
    cfg: Configuration,
    input: InputSource,
    stdout_sink: OutputSink,
    stderr_sink: OutputSink,
) -> Result<CollectedResult<CapturedOutput, CapturedOutput>> {
    let mut outcome = spawn::spawn(&cfg, input, stdout_sink, stderr_sink)?;
    let pid = outcome.pid;
    let io = spawn_io_tasks(&mut outcome);

    let status = outcome.monitor.wait().await;
    let status = match status {
        Ok(status) => status,
        Err(exit_err) => {
            let steps = default_teardown_steps(&cfg);
            let teardown_result =
                teardown::run_or_already_exited(&steps, pid.raw_pid(), &mut outcome.monitor).await;
            return Err(match teardown_result {
                Ok(_) => exit_err,
                Err(teardown_err) => exit_err.with_teardown_failure(teardown_err),
            });
        }
    };

    let stdout = join_capture(io.stdout).await?;
    let stderr = join_capture(io.stderr).await?;
    join_input(io.input).await?;

    Ok(CollectedResult {
        pid,
        status,
        stdout: stdout.unwrap_or(CapturedOutput::Unit),
        stderr: stderr.unwrap_or(CapturedOutput::Unit),
    })
}

/// Spawn the child and run `body(execution)` concurrently with it under one
/// cancellation scope: stdin driving and stdout/stderr capturing happen in
/// the background, and `body`'s own return value decides when teardown
/// begins.
pub async fn run_with_body<R, F, Fut>(
    cfg: Configuration,
    input: InputSource,
    stdout_sink: OutputSink,
    stderr_sink: OutputSink,
    body: F,
) -> Result<ExecutionResult<R>>
where
    F: FnOnce(Execution) -> Fut,
    Fut: Future<Output = R> + Send + 'static,
    R: Send + 'static,
{
    let mut outcome = spawn::spawn(&cfg, input, stdout_sink, stderr_sink)?;
    let pid = outcome.pid;
    let io = spawn_io_tasks(&mut outcome);

    let (signal_tx, mut signal_rx) = mpsc::channel(8);
    let shared = Arc::new(ExecutionShared {
        pid,
        signal_requests: signal_tx,
        stdout_stream: outcome.stdout_stream.take(),
        stderr_stream: outcome.stderr_stream.take(),
        teardown_requested: AtomicBool::new(false),
    });
    let execution = Execution::new(shared);

    let mut monitor = outcome.monitor;
    let mut body_fut = std::pin::pin!(body(execution));
    let mut pending_teardown: Option<Vec<TeardownStep>> = None;

    let value = loop {
        tokio::select! {
            biased;
            value = &mut body_fut => break value,
            req = signal_rx.recv() => {
                match req {
                    None => continue,
                    Some(req) => {
                        if let Err(err) = apply_signal_request(req, pid, monitor.child_mut(), &mut pending_teardown).await {
                            warn!(error = %err, "signal request failed");
                        }
                    }
                }
            }
        }
    };

    let status = match pending_teardown {
        Some(steps) => {
            debug!(pid = %pid, "body returned with a teardown request pending, tearing down");
            teardown_detached(steps, pid, monitor).await?
        }
        None => {
            debug!(pid = %pid, "body returned, awaiting natural exit");
            monitor.wait().await?
        }
    };

    let stdout = join_capture(io.stdout).await?;
    let stderr = join_capture(io.stderr).await?;
    join_input(io.input).await?;

    Ok(ExecutionResult {
        value,
        pid,
        status,
        stdout,
        stderr,
    })
}

/// As [`run_with_body`], but forces `stdin` into
/// [`InputSource::Writer`](crate::input::InputSource::Writer) mode and
/// hands `body` the [`StandardInputWriter`] directly instead of requiring
/// the caller to fish it out of the `Execution`.
pub async fn run_writer_body<R, F, Fut>(
    cfg: Configuration,
    stdout_sink: OutputSink,
    stderr_sink: OutputSink,
    body: F,
) -> Result<ExecutionResult<R>>
where
    F: FnOnce(Execution, StandardInputWriter) -> Fut,
    Fut: Future<Output = R> + Send + 'static,
    R: Send + 'static,
{
    let mut outcome = spawn::spawn(&cfg, InputSource::Writer, stdout_sink, stderr_sink)?;
    let writer = outcome
        .stdin_writer
        .take()
        .expect("InputSource::Writer always yields a StandardInputWriter");
    let pid = outcome.pid;
    let io = spawn_io_tasks(&mut outcome);

    let (signal_tx, mut signal_rx) = mpsc::channel(8);
    let shared = Arc::new(ExecutionShared {
        pid,
        signal_requests: signal_tx,
        stdout_stream: outcome.stdout_stream.take(),
        stderr_stream: outcome.stderr_stream.take(),
        teardown_requested: AtomicBool::new(false),
    });
    let execution = Execution::new(shared);

    let mut monitor = outcome.monitor;
    let mut body_fut = std::pin::pin!(body(execution, writer));
    let mut pending_teardown: Option<Vec<TeardownStep>> = None;

    let value = loop {
        tokio::select! {
            biased;
            value = &mut body_fut => break value,
            req = signal_rx.recv() => {
                match req {
                    None => continue,
                    Some(req) => {
                        if let Err(err) = apply_signal_request(req, pid, monitor.child_mut(), &mut pending_teardown).await {
                            warn!(error = %err, "signal request failed");
                        }
                    }
                }
            }
        }
    };

    let status = match pending_teardown {
        Some(steps) => teardown_detached(steps, pid, monitor).await?,
        None => monitor.wait().await?,
    };

    let stdout = join_capture(io.stdout).await?;
    let stderr = join_capture(io.stderr).await?;
    join_input(io.input).await?;

    Ok(ExecutionResult {
        value,
        pid,
        status,
        stdout,
        stderr,
    })
}

/// Spawn the child and return immediately, with no [`Execution`] handle, no
/// output capture, and no teardown: the caller gets back only a
/// [`ProcessIdentifier`], and this crate never reaps the child. It is
/// expected to either outlive this process or be reaped by the OS once it
/// does. Fds left as `None` are bound to the platform's null device.
pub async fn run_detached(
    cfg: Configuration,
    stdin: Option<crate::fd::FdHandle>,
    stdout: Option<crate::fd::FdHandle>,
    stderr: Option<crate::fd::FdHandle>,
) -> Result<ProcessIdentifier> {
    spawn::spawn_detached(&cfg, stdin, stdout, stderr)
}

async fn apply_signal_request(
    req: SignalRequest,
    pid: ProcessIdentifier,
    #[cfg_attr(unix, allow(unused_variables))] child: &mut tokio::process::Child,
    pending_teardown: &mut Option<Vec<TeardownStep>>,
) -> Result<()> {
    match req {
        #[cfg(unix)]
        SignalRequest::Signal(sig) => send_unix_signal(pid, sig),
        #[cfg(unix)]
        SignalRequest::Suspend => send_unix_signal(pid, nix::sys::signal::Signal::SIGSTOP),
        #[cfg(unix)]
        SignalRequest::Resume => send_unix_signal(pid, nix::sys::signal::Signal::SIGCONT),
        SignalRequest::Terminate => {
            #[cfg(unix)]
            {
                send_unix_signal(pid, nix::sys::signal::Signal::SIGTERM)
            }
            #[cfg(windows)]
            {
                child.start_kill().map_err(Error::SpawnFailed)
            }
        }
        SignalRequest::Teardown(steps) => {
            *pending_teardown = Some(steps);
            Ok(())
        }
    }
}

#[cfg(unix)]
fn send_unix_signal(pid: ProcessIdentifier, signal: nix::sys::signal::Signal) -> Result<()> {
    nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid.raw_pid() as i32), signal)
        .map_err(|e| Error::SpawnFailed(std::io::Error::from_raw_os_error(e as i32)))
}

/// Run the teardown sequence inside a detached `tokio::spawn`, so it keeps
/// running to completion even if the future calling this one is dropped
/// (e.g. the caller's own future was cancelled right as `body` returned).
async fn teardown_detached(
    steps: Vec<TeardownStep>,
    pid: ProcessIdentifier,
    mut monitor: crate::monitor::Monitor,
) -> Result<TerminationStatus> {
    let handle = tokio::spawn(async move {
        teardown::run_or_already_exited(&steps, pid.raw_pid(), &mut monitor).await
    });
    handle.await.map_err(|_| Error::Cancelled)?
}
