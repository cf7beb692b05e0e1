//! Ergonomic overloads layered on top of the core data model. Nothing here
//! is load-bearing: every function is a thin, checked shortcut through
//! [`crate::orchestrator`] and the [`Configuration`] builder.

use std::ffi::OsString;

use crate::command::{Arguments, Configuration, Environment, Executable, WorkingDirectory};
use crate::error::Result;
use crate::input::InputSource;
use crate::output::{CapturedOutput, OutputSink};
use crate::result::CollectedResult;

/// Default capture ceiling for the `_str` convenience wrappers: 16 MiB, a
/// generous bound against an unbounded or runaway child filling memory.
pub const DEFAULT_CAPTURE_LIMIT: usize = 16 * 1024 * 1024;

impl Configuration {
    pub fn arg(self, arg: impl Into<OsString>) -> Self {
        Configuration {
            arguments: self.arguments.push(arg),
            ..self
        }
    }

    pub fn args<I, S>(self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Configuration {
            arguments: self.arguments.extend(args),
            ..self
        }
    }

    pub fn current_dir(self, dir: impl Into<std::path::PathBuf>) -> Self {
        Configuration {
            working_directory: WorkingDirectory::at(dir),
            ..self
        }
    }

    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        let overlay = match &mut self.environment {
            Environment::InheritWith(map) | Environment::Replace(map) => map,
        };
        overlay.insert(key.into(), value.into());
        self
    }

    pub fn env_clear(self) -> Self {
        Configuration {
            environment: Environment::replace(std::iter::empty()),
            ..self
        }
    }
}

/// Build a [`Configuration`] for a bare command name, resolved against
/// `PATH` at spawn time. Shorthand for `Configuration::new(Executable::by_name(name))`.
pub fn command(name: impl Into<OsString>) -> Configuration {
    Configuration::new(Executable::by_name(name))
}

impl From<&str> for InputSource {
    fn from(value: &str) -> Self {
        InputSource::Bytes(value.as_bytes().to_vec())
    }
}

impl From<String> for InputSource {
    fn from(value: String) -> Self {
        InputSource::Bytes(value.into_bytes())
    }
}

impl From<Vec<u8>> for InputSource {
    fn from(value: Vec<u8>) -> Self {
        InputSource::Bytes(value)
    }
}

/// Run to completion with no stdin, collecting stdout/stderr as UTF-8 text
/// up to [`DEFAULT_CAPTURE_LIMIT`] bytes each.
pub async fn run_collected_str(cfg: Configuration) -> Result<CollectedResult<String, String>> {
    let collected = crate::orchestrator::run_collected(
        cfg,
        InputSource::None,
        OutputSink::CollectString(DEFAULT_CAPTURE_LIMIT),
        OutputSink::CollectString(DEFAULT_CAPTURE_LIMIT),
    )
    .await?;
    into_text_result(collected)
}

/// As [`run_collected_str`], but `input` is written to the child's stdin
/// first.
pub async fn run_collected_str_with_input(
    cfg: Configuration,
    input: impl Into<InputSource>,
) -> Result<CollectedResult<String, String>> {
    let collected = crate::orchestrator::run_collected(
        cfg,
        input.into(),
        OutputSink::CollectString(DEFAULT_CAPTURE_LIMIT),
        OutputSink::CollectString(DEFAULT_CAPTURE_LIMIT),
    )
    .await?;
    into_text_result(collected)
}

fn into_text_result(
    collected: CollectedResult<CapturedOutput, CapturedOutput>,
) -> Result<CollectedResult<String, String>> {
    Ok(CollectedResult {
        pid: collected.pid,
        status: collected.status,
        stdout: collected.stdout.into_text()?,
        stderr: collected.stderr.into_text()?,
    })
}
