//! `teardown`
//!
//! The ordered signal/kill plan used to shut a child down gracefully: an
//! arbitrary list of `Send(signal, grace period)` steps with an implicit
//! trailing hard kill.
//!
//! Teardown always runs inside a detached `tokio::spawn`, so it keeps
//! running to completion even if the future awaiting it is dropped because
//! the caller's surrounding scope was cancelled.

use std::time::Duration;

use tracing::debug;

use crate::command::TeardownStep;
use crate::error::{Error, Result};
use crate::monitor::Monitor;
use crate::status::TerminationStatus;

/// Reap the child directly if it has already exited (common when `body`
/// returns after the process finished on its own), otherwise fall through
/// to the full [`run`] sequence. Avoids paying the default grace periods
/// for a process that is already gone.
pub(crate) async fn run_or_already_exited(
    steps: &[TeardownStep],
    pid: u32,
    monitor: &mut Monitor,
) -> Result<TerminationStatus> {
    if let Ok(Some(status)) = monitor.child_mut().try_wait() {
        return Ok(classify(status));
    }
    run(steps, pid, monitor).await
}

/// Run `steps` (plus an implicit trailing `Kill` if the caller didn't
/// already end with one), returning the status finally observed.
pub(crate) async fn run(steps: &[TeardownStep], pid: u32, monitor: &mut Monitor) -> Result<TerminationStatus> {
    let mut plan: Vec<TeardownStep> = steps.to_vec();
    if !matches!(plan.last(), Some(TeardownStep::Kill)) {
        plan.push(TeardownStep::Kill);
    }

    for step in plan {
        if !is_alive(pid, monitor.child_mut()) {
            debug!(pid, "teardown: child already exited, stopping sequence");
            break;
        }
        match step {
            #[cfg(unix)]
            TeardownStep::Send(signal, delay) => {
                debug!(pid, ?signal, "teardown: sending signal");
                send_signal(pid, signal)?;
                if let Some(status) = wait_for_exit(monitor.child_mut(), delay).await? {
                    return Ok(status);
                }
                debug!(pid, "teardown: step timed out, proceeding to next step");
            }
            #[cfg(windows)]
            TeardownStep::Send(delay) => {
                // Windows has no general signal delivery; a "Send" step is
                // only meaningful as a grace period before a hard kill.
                debug!(pid, "teardown: windows has no signal delivery, waiting grace period");
                if let Some(status) = wait_for_exit(monitor.child_mut(), delay).await? {
                    return Ok(status);
                }
            }
            TeardownStep::Kill => {
                debug!(pid, "teardown: killing child");
                monitor.kill().map_err(Error::SpawnFailed)?;
                let status = monitor.child_mut().wait().await.map_err(Error::SpawnFailed)?;
                return Ok(classify(status));
            }
        }
    }

    // All steps exhausted without the loop already returning (only possible
    // if `plan` somehow ended without `Kill`, which we guard against above).
    let status = monitor.child_mut().wait().await.map_err(Error::SpawnFailed)?;
    Ok(classify(status))
}

fn is_alive(pid: u32, child: &mut tokio::process::Child) -> bool {
    #[cfg(unix)]
    {
        let _ = child;
        nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), None).is_ok()
    }
    #[cfg(windows)]
    {
        let _ = pid;
        matches!(child.try_wait(), Ok(None))
    }
}

#[cfg(unix)]
fn send_signal(pid: u32, signal: nix::sys::signal::Signal) -> Result<()> {
    nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), signal)
        .map_err(|e| Error::SpawnFailed(std::io::Error::from_raw_os_error(e as i32)))
}

async fn wait_for_exit(child: &mut tokio::process::Child, delay: Duration) -> Result<Option<TerminationStatus>> {
    match tokio::time::timeout(delay, child.wait()).await {
        Ok(Ok(status)) => Ok(Some(classify(status))),
        Ok(Err(e)) => Err(Error::SpawnFailed(e)),
        Err(_timed_out) => Ok(None),
    }
}

#[cfg(unix)]
fn classify(status: std::process::ExitStatus) -> TerminationStatus {
    use std::os::unix::process::ExitStatusExt;
    match status.code() {
        Some(code) => TerminationStatus::Exited(code),
        None => TerminationStatus::SignaledOrException(status.signal().unwrap_or(-1)),
    }
}

#[cfg(windows)]
fn classify(status: std::process::ExitStatus) -> TerminationStatus {
    TerminationStatus::Exited(status.code().unwrap_or(-1))
}
