//! `command`
//!
//! The immutable, cheaply-cloneable description of what to spawn:
//! [`Executable`], [`Arguments`], [`Environment`], [`WorkingDirectory`] and
//! [`PlatformOptions`], bundled as [`Configuration`].

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

/// What to execute: either a bare name resolved against `PATH`, or an
/// explicit path used directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Executable {
    ByName(OsString),
    ByPath(PathBuf),
}

impl Executable {
    pub fn by_name(name: impl Into<OsString>) -> Self {
        Executable::ByName(name.into())
    }

    pub fn by_path(path: impl Into<PathBuf>) -> Self {
        Executable::ByPath(path.into())
    }

    pub fn display_name(&self) -> String {
        match self {
            Executable::ByName(name) => name.to_string_lossy().into_owned(),
            Executable::ByPath(path) => path.to_string_lossy().into_owned(),
        }
    }
}

/// Ordered argument vector, plus an optional argv\[0\] override for
/// platforms that support a separate launcher-synthesized first slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Arguments {
    pub(crate) values: Vec<OsString>,
    pub(crate) arg0_override: Option<OsString>,
}

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(mut self, arg: impl Into<OsString>) -> Self {
        self.values.push(arg.into());
        self
    }

    pub fn extend<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.values.extend(args.into_iter().map(Into::into));
        self
    }

    /// Override argv\[0\]. Ignored on platforms (Windows) that serialize a
    /// single command line instead of a discrete argv array.
    pub fn with_arg0(mut self, arg0: impl Into<OsString>) -> Self {
        self.arg0_override = Some(arg0.into());
        self
    }

    pub fn as_slice(&self) -> &[OsString] {
        &self.values
    }
}

/// The child's environment: either an overlay on the *configured* parent
/// environment (not necessarily `std::env`'s live environment — callers
/// supply the base explicitly via [`Environment::inherit_with`]) or a full
/// replacement map.
///
/// Duplicate keys resolve to the last-assigned value, matching `BTreeMap`'s
/// insert semantics used throughout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    InheritWith(BTreeMap<OsString, OsString>),
    Replace(BTreeMap<OsString, OsString>),
}

impl Environment {
    /// Inherit the process's current environment and apply `overlay` as an
    /// upsert.
    pub fn inherit_with(overlay: impl IntoIterator<Item = (OsString, OsString)>) -> Self {
        Environment::InheritWith(overlay.into_iter().collect())
    }

    pub fn inherit() -> Self {
        Environment::InheritWith(BTreeMap::new())
    }

    pub fn replace(map: impl IntoIterator<Item = (OsString, OsString)>) -> Self {
        Environment::Replace(map.into_iter().collect())
    }

    /// Resolve the final key -> value map to materialize for the child,
    /// given the parent's live environment for the `InheritWith` case.
    pub(crate) fn resolve(&self, parent_env: impl Iterator<Item = (OsString, OsString)>) -> BTreeMap<OsString, OsString> {
        match self {
            Environment::Replace(map) => map.clone(),
            Environment::InheritWith(overlay) => {
                let mut resolved: BTreeMap<OsString, OsString> = parent_env.collect();
                for (k, v) in overlay {
                    resolved.insert(k.clone(), v.clone());
                }
                resolved
            }
        }
    }

    /// The value of the search-path variable (`PATH` on unix, also `PATH`
    /// on windows) as it will exist in the child, used to resolve
    /// `Executable::ByName`. Per spec: derived from the *configured*
    /// environment, not the parent's live one.
    pub(crate) fn search_path(&self, parent_env: impl Iterator<Item = (OsString, OsString)>) -> Option<OsString> {
        self.resolve(parent_env).get(std::ffi::OsStr::new("PATH")).cloned()
    }
}

/// Absent means "inherit parent's current directory at spawn time."
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkingDirectory(pub(crate) Option<PathBuf>);

impl WorkingDirectory {
    pub fn inherit() -> Self {
        WorkingDirectory(None)
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        WorkingDirectory(Some(path.into()))
    }
}

/// A single step of a [`crate::teardown`] sequence.
#[derive(Debug, Clone, Copy)]
pub enum TeardownStep {
    #[cfg(unix)]
    Send(nix::sys::signal::Signal, Duration),
    #[cfg(windows)]
    Send(Duration),
    Kill,
}

/// Opaque callback invoked with the platform-native spawn attributes
/// (here, the `tokio::process::Command` that is about to be spawned) just
/// before the actual spawn syscall. Escaping captured references past the
/// call is a programmer error.
pub type PreSpawnHook = std::sync::Arc<
    dyn Fn(&mut tokio::process::Command) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>
        + Send
        + Sync,
>;

/// Platform-specific spawn options. Every field is optional; absence means
/// "use the platform default".
#[derive(Clone, Default)]
pub struct PlatformOptions {
    #[cfg(unix)]
    pub user_id: Option<u32>,
    #[cfg(unix)]
    pub group_id: Option<u32>,
    #[cfg(unix)]
    pub supplementary_groups: Option<Vec<u32>>,
    #[cfg(unix)]
    pub process_group_id: Option<i32>,
    #[cfg(unix)]
    pub create_session: bool,
    pub close_unknown_fds: bool,
    pub teardown_sequence: Option<Vec<TeardownStep>>,
    pub pre_spawn_hook: Option<PreSpawnHook>,
    #[cfg(windows)]
    pub user_credentials: Option<(OsString, OsString)>,
    #[cfg(windows)]
    pub console_behavior: ConsoleBehavior,
    #[cfg(windows)]
    pub create_process_group: bool,
}

impl std::fmt::Debug for PlatformOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformOptions")
            .field("close_unknown_fds", &self.close_unknown_fds)
            .field("teardown_sequence", &self.teardown_sequence.is_some())
            .field("pre_spawn_hook", &self.pre_spawn_hook.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(windows)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConsoleBehavior {
    #[default]
    Inherit,
    New,
    Detached,
}

impl PlatformOptions {
    /// The default teardown sequence when none is configured:
    /// `SIGINT -> SIGTERM` with 500ms between steps, then an implicit
    /// `Kill` appended by the sequencer.
    #[cfg(unix)]
    pub fn default_teardown_sequence() -> Vec<TeardownStep> {
        use nix::sys::signal::Signal;
        vec![
            TeardownStep::Send(Signal::SIGINT, Duration::from_millis(500)),
            TeardownStep::Send(Signal::SIGTERM, Duration::from_millis(500)),
        ]
    }

    #[cfg(windows)]
    pub fn default_teardown_sequence() -> Vec<TeardownStep> {
        vec![TeardownStep::Send(Duration::from_millis(500))]
    }
}

/// Immutable, cheaply cloneable description of a spawn.
#[derive(Debug, Clone)]
pub struct Configuration {
    pub executable: Executable,
    pub arguments: Arguments,
    pub environment: Environment,
    pub working_directory: WorkingDirectory,
    pub platform_options: std::sync::Arc<PlatformOptions>,
}

impl Configuration {
    pub fn new(executable: Executable) -> Self {
        Configuration {
            executable,
            arguments: Arguments::new(),
            environment: Environment::inherit(),
            working_directory: WorkingDirectory::inherit(),
            platform_options: std::sync::Arc::new(PlatformOptions::default()),
        }
    }

    pub fn label(&self) -> String {
        format!(
            "{} {}",
            self.executable.display_name(),
            self.arguments
                .as_slice()
                .iter()
                .map(|a| a.to_string_lossy())
                .collect::<Vec<_>>()
                .join(" ")
        )
    }
}
