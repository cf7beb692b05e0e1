//! `spawn`
//!
//! Resolves the executable, materializes argv/env, binds the three child
//! fds, invokes the pre-spawn hook, and launches the child. Built on top of
//! `tokio::process::Command`, with the three fds coming from
//! [`InputSource`]/[`OutputSink`] instead of being hardcoded to
//! `Stdio::piped()`, and with `PlatformOptions` threaded through.

use std::ffi::OsString;
use std::io;
use std::process::Stdio;
use std::sync::Mutex;

use tracing::debug;

use crate::command::Configuration;
use crate::error::Error;
use crate::fd::FdHandle;
use crate::input::{InputSource, StandardInputWriter};
use crate::monitor::Monitor;
use crate::output::{OutputSink, StreamHandle};
use crate::status::ProcessIdentifier;
use std::sync::Arc;

/// `posix_spawn`-family primitives are not guaranteed thread-safe with
/// respect to fd-inheritance manipulation across concurrent callers; a
/// process-wide mutex is held only across the synchronous `spawn()` call
/// itself, so unrelated concurrent `run_*` calls still overlap their I/O
/// driving.
static SPAWN_LOCK: Mutex<()> = Mutex::new(());

pub(crate) struct SpawnOutcome {
    pub(crate) monitor: Monitor,
    pub(crate) pid: ProcessIdentifier,
    pub(crate) input_driver: Option<crate::input::InputDriver>,
    pub(crate) stdin_writer: Option<StandardInputWriter>,
    pub(crate) stdout_driver: Option<crate::output::OutputDriver>,
    pub(crate) stdout_stream: Option<Arc<StreamHandle>>,
    pub(crate) stderr_driver: Option<crate::output::OutputDriver>,
    pub(crate) stderr_stream: Option<Arc<StreamHandle>>,
}

pub(crate) fn spawn(
    cfg: &Configuration,
    input: InputSource,
    stdout_sink: OutputSink,
    stderr_sink: OutputSink,
) -> Result<SpawnOutcome, Error> {
    let (bound_input, stdin_writer) = input.bind().map_err(Error::SpawnFailed)?;
    let (bound_stdout, stdout_stream) = stdout_sink
        .bind(crate::error::PipeLabel::Stdout)
        .map_err(Error::SpawnFailed)?;
    let (bound_stderr, stderr_stream) = stderr_sink
        .bind(crate::error::PipeLabel::Stderr)
        .map_err(Error::SpawnFailed)?;

    let mut command = build_command(cfg)?;
    command.stdin(bound_input.child_stdio);
    command.stdout(bound_stdout.child_stdio);
    command.stderr(bound_stderr.child_stdio);

    apply_platform_options(&mut command, cfg)?;

    if let Some(hook) = &cfg.platform_options.pre_spawn_hook {
        hook(&mut command).map_err(Error::HookFailed)?;
    }

    debug!(command = %cfg.label(), "spawning child process");
    let child = {
        // Hold the lock only across the synchronous spawn syscall.
        let _guard = SPAWN_LOCK.lock().unwrap();
        command.spawn().map_err(classify_spawn_error)?
    };

    let pid = child_pid(&child);

    #[cfg(unix)]
    let monitor = Monitor::new(child);
    #[cfg(windows)]
    let monitor = Monitor::new(child, create_job_object_if_needed(cfg, pid.raw_pid()));

    Ok(SpawnOutcome {
        monitor,
        pid,
        input_driver: bound_input.driver,
        stdin_writer,
        stdout_driver: bound_stdout.driver,
        stdout_stream,
        stderr_driver: bound_stderr.driver,
        stderr_stream,
    })
}

/// Spawn with no [`Monitor`], no I/O drivers, no supervision of any kind:
/// the three fds are either an explicit caller-supplied [`FdHandle`] or the
/// platform's null device, and the returned [`tokio::process::Child`] is
/// dropped immediately after the pid is read off it. Dropping it does not
/// reap: the child is left for the OS (or, once this process exits, its
/// init) to reap, matching a true fire-and-forget contract.
pub(crate) fn spawn_detached(
    cfg: &Configuration,
    stdin: Option<FdHandle>,
    stdout: Option<FdHandle>,
    stderr: Option<FdHandle>,
) -> Result<ProcessIdentifier, Error> {
    let mut command = build_command(cfg)?;
    command.stdin(stdin.map(FdHandle::into_stdio).unwrap_or_else(Stdio::null));
    command.stdout(stdout.map(FdHandle::into_stdio).unwrap_or_else(Stdio::null));
    command.stderr(stderr.map(FdHandle::into_stdio).unwrap_or_else(Stdio::null));

    apply_platform_options(&mut command, cfg)?;

    if let Some(hook) = &cfg.platform_options.pre_spawn_hook {
        hook(&mut command).map_err(Error::HookFailed)?;
    }

    debug!(command = %cfg.label(), "spawning detached child process");
    let child = {
        let _guard = SPAWN_LOCK.lock().unwrap();
        command.spawn().map_err(classify_spawn_error)?
    };

    let pid = child_pid(&child);
    // Deliberately not awaited/reaped: the orchestrator never constructs a
    // Monitor for a detached child, so `child` is simply dropped here.
    drop(child);
    Ok(pid)
}

/// Assign the child to a job object configured to kill its whole tree on
/// close, when the caller asked for process-group semantics. Best-effort:
/// a failure here does not fail the spawn, it just means teardown can only
/// reach the single child process instead of its descendants.
#[cfg(windows)]
fn create_job_object_if_needed(cfg: &Configuration, pid: u32) -> Option<crate::job_object::JobObject> {
    if !cfg.platform_options.create_process_group {
        return None;
    }
    let job = crate::job_object::JobObject::new()
        .inspect_err(|e| tracing::warn!(error = %e, "failed to create job object"))
        .ok()?;
    job.assign_pid(pid)
        .inspect_err(|e| tracing::warn!(error = %e, pid, "failed to assign child to job object"))
        .ok()?;
    Some(job)
}

#[cfg(unix)]
fn child_pid(child: &tokio::process::Child) -> ProcessIdentifier {
    ProcessIdentifier::new(child.id().expect("spawned child always has a pid"))
}

#[cfg(windows)]
fn child_pid(child: &tokio::process::Child) -> ProcessIdentifier {
    ProcessIdentifier::new(child.id().expect("spawned child always has a pid"), None)
}

fn build_command(cfg: &Configuration) -> Result<tokio::process::Command, Error> {
    let exe_path = resolve_executable(cfg)?;
    let mut command = tokio::process::Command::new(exe_path);
    command.args(cfg.arguments.as_slice());
    #[cfg(unix)]
    if let Some(arg0) = &cfg.arguments.arg0_override {
        command.arg0(arg0);
    }

    match &cfg.environment {
        crate::command::Environment::Replace(map) => {
            command.env_clear();
            command.envs(map.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        crate::command::Environment::InheritWith(overlay) => {
            command.envs(overlay.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
    }

    if let Some(dir) = &cfg.working_directory.0 {
        command.current_dir(dir);
    }

    Ok(command)
}

/// Resolve `Executable::ByName` against the `PATH` of the *configured*
/// environment (not `std::env`'s live one), matching §6's "search path is
/// obtained from the configured environment" rule. `Replace` without a
/// `PATH` entry therefore disables `ByName` resolution entirely.
///
/// Grounded in the directory-scan loop used by
/// `hniksic-rust-subprocess`'s `spawn.rs` path search.
fn resolve_executable(cfg: &Configuration) -> Result<OsString, Error> {
    use crate::command::Executable;
    match &cfg.executable {
        Executable::ByPath(path) => Ok(path.clone().into_os_string()),
        Executable::ByName(name) => {
            let parent_env = std::env::vars_os();
            let search_path = cfg.environment.search_path(parent_env);
            let Some(search_path) = search_path else {
                return Err(Error::ExecutableNotFound(name.to_string_lossy().into_owned()));
            };
            for dir in std::env::split_paths(&search_path) {
                let candidate = dir.join(name);
                if is_executable_file(&candidate) {
                    return Ok(candidate.into_os_string());
                }
            }
            Err(Error::ExecutableNotFound(name.to_string_lossy().into_owned()))
        }
    }
}

#[cfg(unix)]
fn is_executable_file(path: &std::path::Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    match std::fs::metadata(path) {
        Ok(meta) => meta.is_file() && meta.permissions().mode() & 0o111 != 0,
        Err(_) => false,
    }
}

#[cfg(windows)]
fn is_executable_file(path: &std::path::Path) -> bool {
    path.is_file()
}

fn classify_spawn_error(e: io::Error) -> Error {
    match e.kind() {
        io::ErrorKind::PermissionDenied => Error::PermissionDenied(e),
        io::ErrorKind::NotFound => Error::ExecutableNotFound(e.to_string()),
        _ => Error::SpawnFailed(e),
    }
}

#[cfg(unix)]
fn apply_platform_options(command: &mut tokio::process::Command, cfg: &Configuration) -> Result<(), Error> {
    let opts = cfg.platform_options.clone();
    if opts.create_session
        || opts.process_group_id.is_some()
        || opts.user_id.is_some()
        || opts.group_id.is_some()
        || opts.supplementary_groups.is_some()
        || opts.close_unknown_fds
    {
        // Fetched outside the closure: `getrlimit` is not on the short list
        // of functions we want to rely on being async-signal-safe between
        // fork and exec, and the limit cannot change underneath a single
        // spawn anyway.
        let max_fd = highest_fd_to_close();
        // SAFETY: the closure only calls async-signal-safe functions
        // (`setsid`, `setpgid`, `setgroups`, `setgid`, `setuid`, `close`)
        // between fork and exec.
        unsafe {
            command.pre_exec(move || {
                if opts.create_session {
                    nix::unistd::setsid().map_err(to_io)?;
                }
                if let Some(pgid) = opts.process_group_id {
                    let target = if pgid == 0 { nix::unistd::Pid::from_raw(0) } else { nix::unistd::Pid::from_raw(pgid) };
                    nix::unistd::setpgid(nix::unistd::Pid::from_raw(0), target).map_err(to_io)?;
                }
                if let Some(groups) = &opts.supplementary_groups {
                    let gids: Vec<nix::unistd::Gid> =
                        groups.iter().map(|g| nix::unistd::Gid::from_raw(*g)).collect();
                    nix::unistd::setgroups(&gids).map_err(to_io)?;
                }
                if let Some(gid) = opts.group_id {
                    nix::unistd::setgid(nix::unistd::Gid::from_raw(gid)).map_err(to_io)?;
                }
                if let Some(uid) = opts.user_id {
                    nix::unistd::setuid(nix::unistd::Uid::from_raw(uid)).map_err(to_io)?;
                }
                if opts.close_unknown_fds {
                    // fds 0/1/2 are already bound to the child's stdio by
                    // `tokio::process::Command`; everything else inherited
                    // from the parent is closed.
                    for fd in 3..=max_fd {
                        // SAFETY: `close` on a bad/already-closed fd just
                        // returns EBADF, which is async-signal-safe to
                        // ignore here.
                        unsafe {
                            libc::close(fd);
                        }
                    }
                }
                Ok(())
            });
        }
    }
    Ok(())
}

/// Highest fd number worth attempting to close, from the soft `RLIMIT_NOFILE`
/// at the moment of spawn. Falls back to a conservative default if the
/// limit can't be read or is absurdly large.
#[cfg(unix)]
fn highest_fd_to_close() -> libc::c_int {
    const FALLBACK: libc::rlim_t = 4096;
    let mut limit = libc::rlimit { rlim_cur: 0, rlim_max: 0 };
    let soft = if unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, &mut limit) } == 0 {
        limit.rlim_cur
    } else {
        FALLBACK
    };
    let soft = if soft == libc::RLIM_INFINITY || soft > FALLBACK {
        FALLBACK
    } else {
        soft
    };
    soft as libc::c_int
}

#[cfg(unix)]
fn to_io(e: nix::Error) -> io::Error {
    io::Error::from_raw_os_error(e as i32)
}

#[cfg(windows)]
fn apply_platform_options(command: &mut tokio::process::Command, cfg: &Configuration) -> Result<(), Error> {
    use windows_sys::Win32::System::Threading::{CREATE_NEW_CONSOLE, CREATE_NO_WINDOW, DETACHED_PROCESS, CREATE_NEW_PROCESS_GROUP};
    let opts = &cfg.platform_options;
    let mut flags: u32 = 0;
    match opts.console_behavior {
        crate::command::ConsoleBehavior::Inherit => {}
        crate::command::ConsoleBehavior::New => flags |= CREATE_NEW_CONSOLE,
        crate::command::ConsoleBehavior::Detached => flags |= DETACHED_PROCESS | CREATE_NO_WINDOW,
    }
    if opts.create_process_group {
        flags |= CREATE_NEW_PROCESS_GROUP;
    }
    if flags != 0 {
        command.creation_flags(flags);
    }
    Ok(())
}
