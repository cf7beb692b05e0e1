//! `output`
//!
//! [`OutputSink`]: the parent's disposition for one of the child's output
//! streams. Five variants, including the back-pressured streaming sink
//! with its "consumable exactly once" contract.

use std::io;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{Error, PipeLabel, Result};
use crate::fd::FdHandle;
use crate::pipe::{Pipe, PipeReader};

#[derive(Debug)]
pub enum OutputSink {
    /// Child's output is bound to the null device; nothing is captured.
    Discard,
    /// An already-open descriptor supplied by the caller.
    Fd {
        fd: FdHandle,
        close_after_spawn: bool,
    },
    /// Collect up to `limit` bytes, then close the read end.
    CollectBytes(usize),
    /// Collect up to `limit` bytes and decode as UTF-8.
    CollectString(usize),
    /// Deliver chunks to the caller as they arrive via a [`StreamHandle`].
    Stream,
}

/// What [`OutputSink::capture`] (run inside the orchestrator) yields.
#[derive(Debug)]
pub enum CapturedOutput {
    Unit,
    Bytes(Vec<u8>),
    Text(String),
}

impl CapturedOutput {
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            CapturedOutput::Bytes(b) => b,
            CapturedOutput::Text(s) => s.into_bytes(),
            CapturedOutput::Unit => Vec::new(),
        }
    }

    pub fn into_text(self) -> Result<String> {
        match self {
            CapturedOutput::Text(s) => Ok(s),
            CapturedOutput::Bytes(b) => {
                String::from_utf8(b).map_err(|_| Error::InvalidUtf8("captured output"))
            }
            CapturedOutput::Unit => Ok(String::new()),
        }
    }
}

pub(crate) struct BoundOutput {
    pub(crate) child_stdio: Stdio,
    pub(crate) driver: Option<OutputDriver>,
}

pub(crate) enum OutputDriver {
    Collect {
        reader: PipeReader,
        limit: usize,
        as_string: bool,
    },
}

impl OutputSink {
    pub(crate) fn bind(self, label: PipeLabel) -> io::Result<(BoundOutput, Option<Arc<StreamHandle>>)> {
        match self {
            OutputSink::Discard => Ok((
                BoundOutput {
                    child_stdio: Stdio::null(),
                    driver: None,
                },
                None,
            )),
            OutputSink::Fd { fd, .. } => Ok((
                BoundOutput {
                    child_stdio: fd.into_stdio(),
                    driver: None,
                },
                None,
            )),
            OutputSink::CollectBytes(limit) => {
                let (child_stdio, reader) = open_pipe_for_write_end()?;
                Ok((
                    BoundOutput {
                        child_stdio,
                        driver: Some(OutputDriver::Collect {
                            reader,
                            limit,
                            as_string: false,
                        }),
                    },
                    None,
                ))
            }
            OutputSink::CollectString(limit) => {
                let (child_stdio, reader) = open_pipe_for_write_end()?;
                Ok((
                    BoundOutput {
                        child_stdio,
                        driver: Some(OutputDriver::Collect {
                            reader,
                            limit,
                            as_string: true,
                        }),
                    },
                    None,
                ))
            }
            OutputSink::Stream => {
                let (child_stdio, reader) = open_pipe_for_write_end()?;
                let _ = label;
                Ok((
                    BoundOutput {
                        child_stdio,
                        driver: None,
                    },
                    Some(StreamHandle::new(reader)),
                ))
            }
        }
    }
}

fn open_pipe_for_write_end() -> io::Result<(Stdio, PipeReader)> {
    let mut pipe = Pipe::new()?;
    let read_end = pipe.take_read().expect("fresh pipe has a read end");
    let write_end = pipe.take_write().expect("fresh pipe has a write end");
    let reader = PipeReader::from_fd(read_end)?;
    Ok((write_end.into_stdio(), reader))
}

impl OutputDriver {
    /// Read until EOF or until `limit` bytes have accumulated, whichever
    /// comes first. Reaching the limit while the child keeps writing closes
    /// the read end early; this is documented as a *successful* capture
    /// (`CollectedResult` never reports a truncated capture as an error) —
    /// the resulting pipe closure is simply surfaced to the child naturally
    /// as a write error on its side.
    pub(crate) async fn capture(self, label: PipeLabel) -> Result<CapturedOutput> {
        let OutputDriver::Collect {
            mut reader,
            limit,
            as_string,
        } = self;
        let mut buf = Vec::with_capacity(limit.min(64 * 1024));
        let mut chunk = [0u8; 8192];
        while buf.len() < limit {
            let want = (limit - buf.len()).min(chunk.len());
            let n = reader
                .read(&mut chunk[..want])
                .await
                .map_err(|e| Error::io(label, crate::pipe::PipeOp::Read, e))?;
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
        }
        if as_string {
            String::from_utf8(buf)
                .map(CapturedOutput::Text)
                .map_err(|_| Error::InvalidUtf8("captured output"))
        } else {
            Ok(CapturedOutput::Bytes(buf))
        }
    }
}

/// Holds a streaming sink's read end, consumable at most once.
pub struct StreamHandle {
    reader: std::sync::Mutex<Option<PipeReader>>,
    consumed: AtomicBool,
}

impl StreamHandle {
    fn new(reader: PipeReader) -> Arc<Self> {
        Arc::new(StreamHandle {
            reader: std::sync::Mutex::new(Some(reader)),
            consumed: AtomicBool::new(false),
        })
    }

    /// Take the read end and wrap it as a lazy, finite, non-restartable
    /// [`OutputStream`]. A second call returns
    /// [`Error::StreamAlreadyConsumed`].
    pub fn consume(&self) -> Result<OutputStream> {
        if self.consumed.swap(true, Ordering::AcqRel) {
            return Err(Error::StreamAlreadyConsumed);
        }
        let reader = self
            .reader
            .lock()
            .unwrap()
            .take()
            .expect("consumed flag and reader presence must agree");
        Ok(OutputStream { reader, done: false })
    }
}

/// A lazy, finite sequence of byte chunks that closes on child EOF.
/// Non-restartable: once exhausted (or dropped), it cannot be consumed
/// again from the same [`StreamHandle`].
pub struct OutputStream {
    reader: PipeReader,
    done: bool,
}

impl OutputStream {
    /// Read the next chunk, or `None` on EOF.
    pub async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        if self.done {
            return Ok(None);
        }
        let mut buf = vec![0u8; 8192];
        let n = self
            .reader
            .read(&mut buf)
            .await
            .map_err(|e| Error::io(PipeLabel::Stdout, crate::pipe::PipeOp::Read, e))?;
        if n == 0 {
            self.done = true;
            return Ok(None);
        }
        buf.truncate(n);
        Ok(Some(buf))
    }
}
