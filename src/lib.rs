//! Cross-platform subprocess execution core.
//!
//! Spawns a child process, drives its standard input, captures or streams
//! its standard output/error, and supervises its lifetime — including
//! graceful, ordered teardown — under structured concurrency. Built on
//! `tokio::process`, with the child's three standard streams modeled as
//! the typed [`InputSource`]/[`OutputSink`] variants rather than a single
//! fixed pipe-everything policy.
//!
//! Four entry points cover the ways a process gets used:
//!
//! - [`run_collected`] — spawn, drive I/O to completion, collect both
//!   streams, no user code runs while the child is alive.
//! - [`run_with_body`] — spawn and run a caller-supplied `async` closure
//!   concurrently with the child, via an [`Execution`] handle.
//! - [`run_writer_body`] — like `run_with_body`, but stdin is a
//!   [`StandardInputWriter`] handed directly to the closure.
//! - [`run_detached`] — spawn and return immediately with only a
//!   [`ProcessIdentifier`]; no capture, no teardown, and this crate never
//!   reaps the child.

mod command;
mod error;
mod execution;
mod fd;
mod input;
#[cfg(windows)]
mod job_object;
mod monitor;
mod orchestrator;
mod output;
mod pipe;
mod result;
mod spawn;
mod status;
mod teardown;

pub mod convenience;

pub use command::{
    Arguments, Configuration, Environment, Executable, PlatformOptions, PreSpawnHook, TeardownStep,
    WorkingDirectory,
};
#[cfg(windows)]
pub use command::ConsoleBehavior;
pub use error::{Error, PipeLabel, Result};
pub use execution::Execution;
pub use fd::FdHandle;
pub use input::{ChunkStream, InputSource, StandardInputWriter};
pub use orchestrator::{run_collected, run_detached, run_with_body, run_writer_body};
pub use output::{CapturedOutput, OutputSink, OutputStream, StreamHandle};
pub use result::{CollectedResult, ExecutionResult};
pub use status::{ProcessIdentifier, TerminationStatus};

#[cfg(windows)]
pub use job_object::JobObject;
