//! `execution`
//!
//! [`Execution`]: the live handle passed to a `run_with_body`/`run_writer_body`
//! caller's `body` closure while the child is running. A thin, cloneable
//! front end over shared state: the orchestrator itself owns the
//! `tokio::process::Child`, and only exposes narrow, checked operations to
//! `body` through a signal-request channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::command::TeardownStep;
use crate::error::Result;
use crate::output::{OutputStream, StreamHandle};
use crate::status::ProcessIdentifier;

/// Shared control surface between the orchestrator and the running `body`.
pub(crate) struct ExecutionShared {
    pub(crate) pid: ProcessIdentifier,
    pub(crate) signal_requests: tokio::sync::mpsc::Sender<SignalRequest>,
    pub(crate) stdout_stream: Option<Arc<StreamHandle>>,
    pub(crate) stderr_stream: Option<Arc<StreamHandle>>,
    pub(crate) teardown_requested: AtomicBool,
}

pub(crate) enum SignalRequest {
    #[cfg(unix)]
    Signal(nix::sys::signal::Signal),
    Terminate,
    #[cfg(unix)]
    Suspend,
    #[cfg(unix)]
    Resume,
    Teardown(Vec<TeardownStep>),
}

/// The handle `body` receives. Cloneable: `body` may hand it to spawned
/// tasks that outlive the closure's own synchronous scope, as long as they
/// complete before the closure's future resolves.
#[derive(Clone)]
pub struct Execution {
    shared: Arc<ExecutionShared>,
}

impl Execution {
    pub(crate) fn new(shared: Arc<ExecutionShared>) -> Self {
        Execution { shared }
    }

    pub fn pid(&self) -> ProcessIdentifier {
        self.shared.pid
    }

    /// Send an arbitrary signal (unix only; see [`Execution::terminate`] for
    /// a portable alternative).
    #[cfg(unix)]
    pub async fn send_signal(&self, signal: nix::sys::signal::Signal) -> Result<()> {
        self.request(SignalRequest::Signal(signal)).await
    }

    /// Portable "ask nicely to stop": `SIGTERM` on unix, a console-control
    /// event on windows. Does not wait for exit; combine with
    /// [`Execution::wait_for_exit`] if needed (exposed via the outer
    /// `ExecutionResult` once `body` returns).
    pub async fn terminate(&self) -> Result<()> {
        self.request(SignalRequest::Terminate).await
    }

    #[cfg(unix)]
    pub async fn suspend(&self) -> Result<()> {
        self.request(SignalRequest::Suspend).await
    }

    #[cfg(unix)]
    pub async fn resume(&self) -> Result<()> {
        self.request(SignalRequest::Resume).await
    }

    /// Request that the orchestrator run `steps` as the teardown sequence
    /// once `body` returns, overriding the configured default for this run
    /// only. Idempotent: only the first call's `steps` take effect.
    pub async fn request_teardown(&self, steps: Vec<TeardownStep>) -> Result<()> {
        if self.shared.teardown_requested.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.request(SignalRequest::Teardown(steps)).await
    }

    /// Take the stdout stream (only present when stdout was configured with
    /// `OutputSink::Stream`). Consumable exactly once across the whole
    /// `Execution`'s lifetime, including clones.
    pub fn stdout_stream(&self) -> Result<OutputStream> {
        self.shared
            .stdout_stream
            .as_ref()
            .ok_or(crate::error::Error::StreamAlreadyConsumed)
            .and_then(|h| h.consume())
    }

    pub fn stderr_stream(&self) -> Result<OutputStream> {
        self.shared
            .stderr_stream
            .as_ref()
            .ok_or(crate::error::Error::StreamAlreadyConsumed)
            .and_then(|h| h.consume())
    }

    async fn request(&self, req: SignalRequest) -> Result<()> {
        self.shared
            .signal_requests
            .send(req)
            .await
            .map_err(|_| crate::error::Error::Cancelled)
    }
}
