//! `pipe`
//!
//! A lazily allocated (read-end, write-end) pair, each owned by exactly one
//! component at a time. [`Pipe::new`] allocates both ends eagerly (there is
//! no cross-platform way to allocate one end of an anonymous pipe without
//! the other), but the *handing out* of each end is lazy: callers `take_*`
//! the end they need and the other stays owned by the `Pipe` until it too
//! is taken or the `Pipe` is dropped, so idempotent teardown only ever
//! closes what's still live.

use std::fmt;
use std::io;

use crate::fd::FdHandle;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PipeOp {
    Open,
    Read,
    Write,
    Close,
}

impl fmt::Display for PipeOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PipeOp::Open => "open",
            PipeOp::Read => "read",
            PipeOp::Write => "write",
            PipeOp::Close => "close",
        };
        write!(f, "{s}")
    }
}

pub struct Pipe {
    read_end: Option<FdHandle>,
    write_end: Option<FdHandle>,
}

impl Pipe {
    /// Allocate a fresh OS pipe. Both ends start out "live"; ownership of
    /// each is transferred out via `take_read`/`take_write`.
    #[cfg(unix)]
    pub fn new() -> io::Result<Self> {
        use nix::fcntl::OFlag;
        use nix::unistd::pipe2;
        let (read_fd, write_fd) =
            pipe2(OFlag::O_CLOEXEC).map_err(|e| io::Error::from_raw_os_error(e as i32))?;
        Ok(Pipe {
            read_end: Some(FdHandle::from_owned(read_fd)),
            write_end: Some(FdHandle::from_owned(write_fd)),
        })
    }

    #[cfg(windows)]
    pub fn new() -> io::Result<Self> {
        use std::os::windows::io::{FromRawHandle, OwnedHandle};
        use std::ptr;
        use windows_sys::Win32::Foundation::HANDLE;
        use windows_sys::Win32::System::Pipes::CreatePipe;

        let mut read_handle: HANDLE = ptr::null_mut();
        let mut write_handle: HANDLE = ptr::null_mut();
        // SAFETY: both out-pointers are valid, non-null, stack locations.
        let ok = unsafe { CreatePipe(&mut read_handle, &mut write_handle, ptr::null(), 0) };
        if ok == 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: `CreatePipe` returned a fresh pair of uniquely-owned handles.
        let (read_end, write_end) = unsafe {
            (
                OwnedHandle::from_raw_handle(read_handle as _),
                OwnedHandle::from_raw_handle(write_handle as _),
            )
        };
        Ok(Pipe {
            read_end: Some(FdHandle::from_owned(read_end)),
            write_end: Some(FdHandle::from_owned(write_end)),
        })
    }

    /// Take ownership of the read end. Returns `None` if already taken.
    pub fn take_read(&mut self) -> Option<FdHandle> {
        self.read_end.take()
    }

    /// Take ownership of the write end. Returns `None` if already taken.
    pub fn take_write(&mut self) -> Option<FdHandle> {
        self.write_end.take()
    }
}

/// An async-readable parent-side pipe end.
///
/// On unix this is driven by the tokio reactor directly
/// (`tokio::net::unix::pipe::Receiver`). Windows anonymous pipes have no
/// overlapped/non-blocking mode, so the windows variant is a blocking
/// `std::fs::File` driven from a dedicated `spawn_blocking` task per read.
pub struct PipeReader {
    #[cfg(unix)]
    inner: tokio::net::unix::pipe::Receiver,
    #[cfg(windows)]
    inner: Option<std::fs::File>,
}

impl PipeReader {
    pub fn from_fd(fd: FdHandle) -> io::Result<Self> {
        #[cfg(unix)]
        {
            let owned = fd.into_owned();
            let receiver = tokio::net::unix::pipe::Receiver::try_from(owned)?;
            Ok(PipeReader { inner: receiver })
        }
        #[cfg(windows)]
        {
            use std::fs::File;
            let owned = fd.into_owned();
            Ok(PipeReader {
                inner: Some(File::from(owned)),
            })
        }
    }

    /// Read into `buf`, returning the number of bytes read (`0` on EOF).
    pub async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        #[cfg(unix)]
        {
            use tokio::io::AsyncReadExt;
            self.inner.read(buf).await
        }
        #[cfg(windows)]
        {
            use std::io::Read;
            let mut file = self.inner.take().expect("PipeReader already closed");
            let mut owned_buf = vec![0u8; buf.len().max(1)];
            let (result, file) = tokio::task::spawn_blocking(move || {
                let result = file.read(&mut owned_buf);
                (result.map(|n| (n, owned_buf)), file)
            })
            .await
            .expect("blocking read task panicked");
            self.inner = Some(file);
            let (n, owned_buf) = result?;
            buf[..n].copy_from_slice(&owned_buf[..n]);
            Ok(n)
        }
    }
}

/// An async-writable parent-side pipe end. See [`PipeReader`] for the
/// platform split rationale.
pub struct PipeWriter {
    #[cfg(unix)]
    inner: tokio::net::unix::pipe::Sender,
    #[cfg(windows)]
    inner: Option<std::fs::File>,
}

impl PipeWriter {
    pub fn from_fd(fd: FdHandle) -> io::Result<Self> {
        #[cfg(unix)]
        {
            let owned = fd.into_owned();
            let sender = tokio::net::unix::pipe::Sender::try_from(owned)?;
            Ok(PipeWriter { inner: sender })
        }
        #[cfg(windows)]
        {
            use std::fs::File;
            let owned = fd.into_owned();
            Ok(PipeWriter {
                inner: Some(File::from(owned)),
            })
        }
    }

    /// Write the entire buffer, retrying partial writes until exhausted.
    pub async fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        #[cfg(unix)]
        {
            use tokio::io::AsyncWriteExt;
            self.inner.write_all(buf).await
        }
        #[cfg(windows)]
        {
            use std::io::Write;
            let mut file = self.inner.take().expect("PipeWriter already closed");
            let owned_buf = buf.to_vec();
            let (result, file) = tokio::task::spawn_blocking(move || {
                let result = file.write_all(&owned_buf);
                (result, file)
            })
            .await
            .expect("blocking write task panicked");
            self.inner = Some(file);
            result
        }
    }
}
