//! `fd`
//!
//! A typed wrapper owning exactly one OS descriptor/handle, with an
//! idempotent `close()` and the platform knobs (`close_on_exec`,
//! `inheritable`) that [`std::os::fd::OwnedFd`]/[`std::os::windows::io::OwnedHandle`]
//! don't expose directly.

use std::io;
use std::process::Stdio;

#[cfg(unix)]
use std::os::fd::{AsRawFd, FromRawFd, IntoRawFd, OwnedFd, RawFd};
#[cfg(windows)]
use std::os::windows::io::{AsRawHandle, FromRawHandle, IntoRawHandle, OwnedHandle, RawHandle};

#[cfg(unix)]
pub type RawDescriptor = RawFd;
#[cfg(windows)]
pub type RawDescriptor = RawHandle;

/// An owned OS descriptor with idempotent close semantics.
///
/// Closing twice is not an error: the first close is attempted and its
/// result (if it failed) is reported once via [`FdHandle::close`]; the
/// second and subsequent calls are silent no-ops, matching the contract in
/// the component design ("second close is a no-op, not an error").
#[derive(Debug)]
pub struct FdHandle {
    inner: Option<Inner>,
}

#[cfg(unix)]
#[derive(Debug)]
struct Inner(OwnedFd);
#[cfg(windows)]
#[derive(Debug)]
struct Inner(OwnedHandle);

impl FdHandle {
    #[cfg(unix)]
    pub fn from_owned(fd: OwnedFd) -> Self {
        FdHandle {
            inner: Some(Inner(fd)),
        }
    }

    #[cfg(windows)]
    pub fn from_owned(handle: OwnedHandle) -> Self {
        FdHandle {
            inner: Some(Inner(handle)),
        }
    }

    /// # Safety
    /// `raw` must be a valid, open, uniquely-owned descriptor.
    #[cfg(unix)]
    pub unsafe fn from_raw(raw: RawDescriptor) -> Self {
        // SAFETY: forwarded from caller's invariant.
        unsafe { Self::from_owned(OwnedFd::from_raw_fd(raw)) }
    }

    /// # Safety
    /// `raw` must be a valid, open, uniquely-owned handle.
    #[cfg(windows)]
    pub unsafe fn from_raw(raw: RawDescriptor) -> Self {
        // SAFETY: forwarded from caller's invariant.
        unsafe { Self::from_owned(OwnedHandle::from_raw_handle(raw)) }
    }

    pub fn as_raw(&self) -> Option<RawDescriptor> {
        #[cfg(unix)]
        {
            self.inner.as_ref().map(|i| i.0.as_raw_fd())
        }
        #[cfg(windows)]
        {
            self.inner.as_ref().map(|i| i.0.as_raw_handle())
        }
    }

    /// Explicitly close the descriptor. Idempotent: a second call returns
    /// `Ok(())` without doing anything.
    pub fn close(&mut self) -> io::Result<()> {
        let Some(inner) = self.inner.take() else {
            return Ok(());
        };
        #[cfg(unix)]
        {
            let fd = inner.0.into_raw_fd();
            // SAFETY: `fd` came from an OwnedFd we are consuming right now,
            // so nothing else can be using it concurrently.
            let rc = unsafe { libc::close(fd) };
            if rc != 0 {
                return Err(io::Error::last_os_error());
            }
        }
        #[cfg(windows)]
        {
            drop(inner.0);
        }
        Ok(())
    }

    /// Duplicate this descriptor. The duplicate is independently owned and
    /// independently closed.
    pub fn dup(&self) -> io::Result<FdHandle> {
        let Some(inner) = &self.inner else {
            return Err(io::Error::from(io::ErrorKind::NotFound));
        };
        let dup = inner.0.try_clone()?;
        Ok(FdHandle {
            inner: Some(Inner(dup)),
        })
    }

    #[cfg(unix)]
    pub fn set_close_on_exec(&self, on: bool) -> io::Result<()> {
        use nix::fcntl::{fcntl, FdFlag, F_GETFD, F_SETFD};
        let fd = self
            .as_raw()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))?;
        let mut flags = FdFlag::from_bits_truncate(fcntl(fd, F_GETFD).map_err(nix_to_io)?);
        flags.set(FdFlag::FD_CLOEXEC, on);
        fcntl(fd, F_SETFD(flags)).map_err(nix_to_io)?;
        Ok(())
    }

    #[cfg(windows)]
    pub fn set_close_on_exec(&self, _on: bool) -> io::Result<()> {
        // Windows has no close-on-exec flag; handle inheritance is governed
        // by `set_inheritable` instead.
        Ok(())
    }

    #[cfg(unix)]
    pub fn set_inheritable(&self, inheritable: bool) -> io::Result<()> {
        // Inverse of close-on-exec: inheritable means NOT close-on-exec.
        self.set_close_on_exec(!inheritable)
    }

    #[cfg(windows)]
    pub fn set_inheritable(&self, inheritable: bool) -> io::Result<()> {
        use windows_sys::Win32::Foundation::{SetHandleInformation, HANDLE_FLAG_INHERIT};
        let handle = self
            .as_raw()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))?;
        let flag = if inheritable { HANDLE_FLAG_INHERIT } else { 0 };
        // SAFETY: `handle` is owned and open for the lifetime of this call.
        let ok = unsafe { SetHandleInformation(handle as _, HANDLE_FLAG_INHERIT, flag) };
        if ok == 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Consume this handle, returning the platform-owned primitive
    /// (`OwnedFd`/`OwnedHandle`) so it can be re-wrapped by an async I/O
    /// type (e.g. `tokio::net::unix::pipe::Sender`).
    #[cfg(unix)]
    pub fn into_owned(mut self) -> OwnedFd {
        self.inner.take().expect("FdHandle already closed").0
    }

    #[cfg(windows)]
    pub fn into_owned(mut self) -> OwnedHandle {
        self.inner.take().expect("FdHandle already closed").0
    }

    /// Consume this handle as a [`Stdio`] suitable for binding directly to a
    /// child's fd slot.
    pub fn into_stdio(self) -> Stdio {
        Stdio::from(self.into_owned())
    }
}

#[cfg(unix)]
fn nix_to_io(e: nix::Error) -> io::Error {
    io::Error::from_raw_os_error(e as i32)
}

impl Drop for FdHandle {
    fn drop(&mut self) {
        // Best-effort: the orchestrator always closes explicitly on both
        // happy and error paths. A drop without an explicit close swallows
        // errors, matching the component contract.
        let _ = self.close();
    }
}
