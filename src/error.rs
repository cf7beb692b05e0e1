//! Unified error taxonomy for the execution core.
//!
//! Every fallible operation in this crate returns [`Error`]. Variants that
//! originate from an OS-level failure retain the underlying
//! [`std::io::Error`] as their source, so callers (or CLI wrappers) can
//! inspect `raw_os_error()` for exit-code mapping.

use std::fmt;

use tracing::warn;

use crate::pipe::PipeOp;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("executable not found: {0}")]
    ExecutableNotFound(String),

    #[error("failed to spawn child process: {0}")]
    SpawnFailed(#[source] std::io::Error),

    #[error("permission denied: {0}")]
    PermissionDenied(#[source] std::io::Error),

    #[error("io error during {op} on {pipe}: {source}")]
    IoError {
        pipe: PipeLabel,
        op: PipeOp,
        #[source]
        source: std::io::Error,
    },

    #[error("resource exhausted: {0}")]
    ResourceExhausted(#[source] std::io::Error),

    #[error("invalid utf-8 in {0}")]
    InvalidUtf8(&'static str),

    #[error("write attempted after StandardInputWriter::finish()")]
    WriterClosed,

    #[error("streaming sink's read end was already consumed")]
    StreamAlreadyConsumed,

    #[error("execution cancelled")]
    Cancelled,

    #[error("pre-spawn hook failed: {0}")]
    HookFailed(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("error occurred during teardown after a prior error: {inner}")]
    TeardownError {
        #[source]
        inner: Box<Error>,
    },
}

impl Error {
    pub(crate) fn io(pipe: PipeLabel, op: PipeOp, source: std::io::Error) -> Self {
        match source.raw_os_error() {
            #[cfg(unix)]
            Some(code) if code == libc::EMFILE || code == libc::ENOMEM => {
                Error::ResourceExhausted(source)
            }
            _ => Error::IoError { pipe, op, source },
        }
    }

    /// Wrap `self` as the original error of a teardown that subsequently
    /// failed with `teardown_err`, keeping the first (original) error as the
    /// surfaced one per the propagation policy: "the first captured error
    /// wins". The teardown failure is not discarded silently: it is logged,
    /// since surfacing it would change the variant callers match on.
    pub(crate) fn with_teardown_failure(self, teardown_err: Error) -> Self {
        warn!(original_error = %self, teardown_error = %teardown_err, "teardown failed after an earlier error; surfacing the original error");
        self
    }
}

/// Which of the three standard pipes an [`Error::IoError`] occurred on.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PipeLabel {
    Stdin,
    Stdout,
    Stderr,
}

impl fmt::Display for PipeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipeLabel::Stdin => write!(f, "stdin"),
            PipeLabel::Stdout => write!(f, "stdout"),
            PipeLabel::Stderr => write!(f, "stderr"),
        }
    }
}
