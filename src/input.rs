//! `input`
//!
//! [`InputSource`]: the parent's supply for the child's stdin. Five
//! variants cover everything from "no stdin at all" to a caller-driven
//! writer handed to a running `body`.

use std::io;
use std::process::Stdio;

use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::sync::{mpsc, oneshot};

use crate::error::{Error, PipeLabel, Result};
use crate::pipe::{Pipe, PipeWriter};

/// A chunk source for the `Stream` variant: any boxed, ownable, 'static
/// stream of byte chunks.
pub type ChunkStream = BoxStream<'static, io::Result<Vec<u8>>>;

pub enum InputSource {
    /// Child's stdin is bound to the null device; reads return EOF
    /// immediately.
    None,
    /// An already-open descriptor supplied by the caller, optionally closed
    /// on the parent side once the spawn succeeds.
    Fd {
        fd: crate::fd::FdHandle,
        close_after_spawn: bool,
    },
    /// The full buffer is written to the child, then the write end is
    /// closed.
    Bytes(Vec<u8>),
    /// Each chunk of the stream is written in order; the write end closes
    /// once the stream ends.
    Stream(ChunkStream),
    /// The caller drives writes via a [`StandardInputWriter`] handed to the
    /// orchestrator's `body`.
    Writer,
}

impl std::fmt::Debug for InputSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InputSource::None => write!(f, "None"),
            InputSource::Fd { .. } => write!(f, "Fd"),
            InputSource::Bytes(b) => write!(f, "Bytes({} bytes)", b.len()),
            InputSource::Stream(_) => write!(f, "Stream"),
            InputSource::Writer => write!(f, "Writer"),
        }
    }
}

/// The resolved child-side stdio binding plus whatever the parent side
/// needs to drive it further.
pub(crate) struct BoundInput {
    pub(crate) child_stdio: Stdio,
    pub(crate) driver: Option<InputDriver>,
}

pub(crate) enum InputDriver {
    Bytes {
        writer: PipeWriter,
        bytes: Vec<u8>,
    },
    Stream {
        writer: PipeWriter,
        stream: ChunkStream,
    },
    Writer {
        writer: PipeWriter,
        commands: mpsc::Receiver<WriterCommand>,
    },
}

impl InputSource {
    /// Resolve this source into a child-side [`Stdio`] and, if needed, a
    /// parent-side driver that must be run concurrently with the child
    /// (see [`crate::orchestrator`]).
    pub(crate) fn bind(self) -> io::Result<(BoundInput, Option<StandardInputWriter>)> {
        match self {
            InputSource::None => Ok((
                BoundInput {
                    child_stdio: Stdio::null(),
                    driver: None,
                },
                None,
            )),
            InputSource::Fd { fd, .. } => Ok((
                BoundInput {
                    child_stdio: fd.into_stdio(),
                    driver: None,
                },
                None,
            )),
            InputSource::Bytes(bytes) => {
                let mut pipe = Pipe::new()?;
                let read_end = pipe.take_read().expect("fresh pipe has a read end");
                let write_end = pipe.take_write().expect("fresh pipe has a write end");
                let writer = PipeWriter::from_fd(write_end)?;
                Ok((
                    BoundInput {
                        child_stdio: read_end.into_stdio(),
                        driver: Some(InputDriver::Bytes { writer, bytes }),
                    },
                    None,
                ))
            }
            InputSource::Stream(stream) => {
                let mut pipe = Pipe::new()?;
                let read_end = pipe.take_read().expect("fresh pipe has a read end");
                let write_end = pipe.take_write().expect("fresh pipe has a write end");
                let writer = PipeWriter::from_fd(write_end)?;
                Ok((
                    BoundInput {
                        child_stdio: read_end.into_stdio(),
                        driver: Some(InputDriver::Stream { writer, stream }),
                    },
                    None,
                ))
            }
            InputSource::Writer => {
                let mut pipe = Pipe::new()?;
                let read_end = pipe.take_read().expect("fresh pipe has a read end");
                let write_end = pipe.take_write().expect("fresh pipe has a write end");
                let writer = PipeWriter::from_fd(write_end)?;
                let (tx, rx) = mpsc::channel(8);
                Ok((
                    BoundInput {
                        child_stdio: read_end.into_stdio(),
                        driver: Some(InputDriver::Writer {
                            writer,
                            commands: rx,
                        }),
                    },
                    Some(StandardInputWriter { commands: tx }),
                ))
            }
        }
    }
}

impl InputDriver {
    /// Drive the source to completion: write everything and close the
    /// write end. Fail-fast on the first write error.
    pub(crate) async fn drive(self) -> Result<()> {
        match self {
            InputDriver::Bytes { mut writer, bytes } => writer
                .write_all(&bytes)
                .await
                .map_err(|e| Error::io(PipeLabel::Stdin, crate::pipe::PipeOp::Write, e)),
            InputDriver::Stream { mut writer, mut stream } => {
                while let Some(chunk) = stream.next().await {
                    let chunk = chunk.map_err(|e| Error::io(PipeLabel::Stdin, crate::pipe::PipeOp::Read, e))?;
                    writer
                        .write_all(&chunk)
                        .await
                        .map_err(|e| Error::io(PipeLabel::Stdin, crate::pipe::PipeOp::Write, e))?;
                }
                Ok(())
            }
            InputDriver::Writer {
                mut writer,
                mut commands,
            } => {
                while let Some(command) = commands.recv().await {
                    match command {
                        WriterCommand::Write(bytes, ack) => {
                            let result = writer
                                .write_all(&bytes)
                                .await
                                .map_err(|e| Error::io(PipeLabel::Stdin, crate::pipe::PipeOp::Write, e));
                            let failed = result.is_err();
                            let _ = ack.send(result);
                            if failed {
                                break;
                            }
                        }
                        WriterCommand::Finish(ack) => {
                            let _ = ack.send(Ok(()));
                            break;
                        }
                    }
                }
                Ok(())
            }
        }
    }
}

pub(crate) enum WriterCommand {
    Write(Vec<u8>, oneshot::Sender<Result<()>>),
    Finish(oneshot::Sender<Result<()>>),
}

/// A handle exposed to `body` in writer mode. Writes are serialized: this
/// is a thin actor-client over the single task driving the underlying
/// pipe, sending `WriterCommand`s across an `mpsc` channel rather than
/// giving every clone direct access to the pipe.
#[derive(Clone)]
pub struct StandardInputWriter {
    commands: mpsc::Sender<WriterCommand>,
}

impl StandardInputWriter {
    /// Append bytes; blocks until accepted by the pipe. Bytes from a single
    /// call are contiguous in the pipe.
    pub async fn write(&self, bytes: impl Into<Vec<u8>>) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(WriterCommand::Write(bytes.into(), tx))
            .await
            .map_err(|_| Error::WriterClosed)?;
        rx.await.map_err(|_| Error::WriterClosed)?
    }

    /// Consume an async byte stream until exhausted, writing each chunk in
    /// order.
    pub async fn write_stream(&self, mut stream: ChunkStream) -> Result<()> {
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| Error::io(PipeLabel::Stdin, crate::pipe::PipeOp::Read, e))?;
            self.write(chunk).await?;
        }
        Ok(())
    }

    /// Encode `text` as UTF-8 bytes and write it.
    pub async fn write_text(&self, text: impl AsRef<str>) -> Result<()> {
        self.write(text.as_ref().as_bytes().to_vec()).await
    }

    /// Close the parent write end. Further writes fail with
    /// [`Error::WriterClosed`].
    pub async fn finish(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(WriterCommand::Finish(tx))
            .await
            .map_err(|_| Error::WriterClosed)?;
        rx.await.map_err(|_| Error::WriterClosed)?
    }
}
