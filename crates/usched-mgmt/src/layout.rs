//! Where the service programs and their pid files live.

use std::path::{Path, PathBuf};

/// Default directory of the service programs.
pub const DEFAULT_SBIN_DIR: &str = "/usr/sbin";
/// Default directory of the pid files.
pub const DEFAULT_RUN_DIR: &str = "/var/run";

/// Administration tool, used to commit configuration.
pub const ADMIN_PROGRAM: &str = "usa";
/// Process monitor that launches and restarts each component.
pub const MONITOR_PROGRAM: &str = "usm";
/// One-shot preparation run before anything is started.
pub const PREINIT_PROGRAM: &str = "usched_preinit";

/// Configuration sets committed before start, in order.
pub const COMMIT_TARGETS: [(&str, &str); 4] = [
    ("core", "uSched Core"),
    ("exec", "uSched Exec"),
    ("ipc", "uSched IPC"),
    ("stat", "uSched Stat"),
];

/// A long-running service process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Component {
    Ipc,
    Stat,
    Exec,
    Daemon,
}

impl Component {
    /// Launch order; each component depends on those before it.
    pub const START_ORDER: [Self; 4] = [Self::Ipc, Self::Stat, Self::Exec, Self::Daemon];
    /// Termination order.
    pub const STOP_ORDER: [Self; 4] = [Self::Daemon, Self::Exec, Self::Stat, Self::Ipc];

    #[must_use]
    pub const fn program(self) -> &'static str {
        match self {
            Self::Ipc => "usi",
            Self::Stat => "uss",
            Self::Exec => "use",
            Self::Daemon => "usd",
        }
    }

    #[must_use]
    pub const fn pid_file_name(self) -> &'static str {
        match self {
            Self::Ipc => "usched_usi.pid",
            Self::Stat => "usched_uss.pid",
            Self::Exec => "usched_use.pid",
            Self::Daemon => "usched_usd.pid",
        }
    }

    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Ipc => "uSched IPC Module",
            Self::Stat => "uSched Status and Statistics Module",
            Self::Exec => "uSched Executer Module",
            Self::Daemon => "uSched Daemon Module",
        }
    }
}

/// Installation paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub sbin_dir: PathBuf,
    pub run_dir: PathBuf,
}

impl Default for Layout {
    fn default() -> Self {
        Self::new(DEFAULT_SBIN_DIR, DEFAULT_RUN_DIR)
    }
}

impl Layout {
    #[must_use]
    pub fn new(sbin_dir: impl Into<PathBuf>, run_dir: impl Into<PathBuf>) -> Self {
        Self {
            sbin_dir: sbin_dir.into(),
            run_dir: run_dir.into(),
        }
    }

    /// Path of a program in the sbin directory.
    #[must_use]
    pub fn program(&self, name: &str) -> PathBuf {
        self.sbin_dir.join(name)
    }

    #[must_use]
    pub fn pid_file(&self, component: Component) -> PathBuf {
        self.run_dir.join(component.pid_file_name())
    }

    #[must_use]
    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }
}
