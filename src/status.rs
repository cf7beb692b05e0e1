//! Termination status and process identity.

use std::fmt;

/// Opaque platform token identifying a spawned child.
///
/// Valid from spawn until the [`crate::monitor`] has observed termination;
/// afterwards the OS-level identity may be reused by unrelated processes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ProcessIdentifier {
    #[cfg(unix)]
    pub(crate) pid: u32,
    #[cfg(windows)]
    pub(crate) process_id: u32,
    #[cfg(windows)]
    pub(crate) thread_id: Option<u32>,
}

impl ProcessIdentifier {
    #[cfg(unix)]
    pub(crate) fn new(pid: u32) -> Self {
        ProcessIdentifier { pid }
    }

    #[cfg(windows)]
    pub(crate) fn new(process_id: u32, thread_id: Option<u32>) -> Self {
        ProcessIdentifier {
            process_id,
            thread_id,
        }
    }

    /// The raw OS pid (unix) or process id (windows).
    pub fn raw_pid(&self) -> u32 {
        #[cfg(unix)]
        {
            self.pid
        }
        #[cfg(windows)]
        {
            self.process_id
        }
    }
}

impl fmt::Display for ProcessIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw_pid())
    }
}

/// How a child process ended.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TerminationStatus {
    /// The process called `exit`/returned from `main` with the given code.
    Exited(i32),
    /// The process was terminated by a signal (unix) or raised an
    /// unhandled exception (windows); the payload is the signal number or
    /// exception code.
    SignaledOrException(i32),
}

impl TerminationStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, TerminationStatus::Exited(0))
    }

    pub fn code(&self) -> Option<i32> {
        match self {
            TerminationStatus::Exited(code) => Some(*code),
            TerminationStatus::SignaledOrException(_) => None,
        }
    }
}
