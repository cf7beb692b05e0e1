//! `monitor`
//!
//! Awaits child termination and classifies the result. Built directly on
//! `tokio::process::Child::wait`, which already performs the
//! `waitpid`/`WaitForSingleObject` loop this component describes.
//!
//! Dropping a `Monitor` future without awaiting it to completion does not
//! reap the child: reaping happens inside `tokio::process::Child::wait`
//! itself, which the orchestrator always awaits exactly once per run.

use crate::error::{Error, Result};
use crate::status::TerminationStatus;

pub(crate) struct Monitor {
    child: tokio::process::Child,
    #[cfg(windows)]
    job_object: Option<crate::job_object::JobObject>,
}

impl Monitor {
    #[cfg(unix)]
    pub(crate) fn new(child: tokio::process::Child) -> Self {
        Monitor { child }
    }

    #[cfg(windows)]
    pub(crate) fn new(child: tokio::process::Child, job_object: Option<crate::job_object::JobObject>) -> Self {
        Monitor { child, job_object }
    }

    /// Block until the child terminates, classifying the outcome.
    pub(crate) async fn wait(&mut self) -> Result<TerminationStatus> {
        let status = self.child.wait().await.map_err(Error::SpawnFailed)?;
        Ok(classify(status))
    }

    pub(crate) fn child_mut(&mut self) -> &mut tokio::process::Child {
        &mut self.child
    }

    /// Hard-kill the child. On windows, if the child was assigned to a job
    /// object (process-group mode), drop the job instead of killing just
    /// the one process: `JOB_OBJECT_LIMIT_KILL_ON_JOB_CLOSE` takes the
    /// whole tree down, matching unix's process-group `kill(-pgid, ...)`.
    #[cfg(unix)]
    pub(crate) fn kill(&mut self) -> std::io::Result<()> {
        self.child.start_kill()
    }

    #[cfg(windows)]
    pub(crate) fn kill(&mut self) -> std::io::Result<()> {
        if let Some(job) = self.job_object.take() {
            drop(job);
            Ok(())
        } else {
            self.child.start_kill()
        }
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
    // Windows does not distinguish "exited normally" from "raised an
    // unhandled exception" at this layer; both surface as a numeric code.
    TerminationStatus::Exited(status.code().unwrap_or(-1))
}
