//! Service lifecycle operations.

use std::{
    ffi::{OsStr, OsString},
    fmt,
    path::{Path, PathBuf},
    time::Duration,
};

use async_trait::async_trait;
use nix::sys::signal::Signal;

use crate::{
    SupervisorError,
    layout::{ADMIN_PROGRAM, COMMIT_TARGETS, Component, Layout, MONITOR_PROGRAM, PREINIT_PROGRAM},
    pidfile::{remove_pid_file, signal_pid_file, wait_for},
};

/// Default pid file poll interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// A lifecycle operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Operation {
    /// Ask the daemon to flush its state to disk.
    Flush,
    /// Ask the daemon to reload its configuration.
    Reload,
    /// Commit configuration and launch every component.
    Start,
    /// Terminate every component and wait for each to exit.
    Stop,
    /// Kill every component and remove the pid files.
    #[value(name = "force_stop")]
    ForceStop,
}

impl Operation {
    /// Human label, as printed in the status line.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Flush => "Flush",
            Self::Reload => "Reload",
            Self::Start => "Start",
            Self::Stop => "Stop",
            Self::ForceStop => "Force stop",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Runs helper programs to completion.
#[async_trait]
pub trait Launcher: Send + Sync {
    /// Run `program` with `args` and return its exit status.
    ///
    /// # Errors
    /// Returns error if the program cannot be executed.
    async fn run(&self, program: &Path, args: &[OsString]) -> Result<i32, SupervisorError>;
}

/// Launches real processes.
///
/// A program missing from its expected path is looked up on `PATH`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemLauncher;

fn command_line(program: &Path, args: &[OsString]) -> String {
    std::iter::once(program.as_os_str())
        .chain(args.iter().map(OsString::as_os_str))
        .map(|part| {
            let part = part.to_string_lossy();
            shlex::try_quote(&part).map_or_else(|_| part.to_string(), |q| q.into_owned())
        })
        .collect::<Vec<_>>()
        .join(" ")
}

async fn resolve(program: &Path) -> PathBuf {
    if tokio::fs::metadata(program).await.is_ok_and(|m| m.is_file()) {
        return program.to_path_buf();
    }
    let Some(name) = program.file_name().map(OsStr::to_os_string) else {
        return program.to_path_buf();
    };

    tokio::task::spawn_blocking(move || which::which(name))
        .await
        .ok()
        .and_then(Result::ok)
        .unwrap_or_else(|| program.to_path_buf())
}

#[async_trait]
impl Launcher for SystemLauncher {
    async fn run(&self, program: &Path, args: &[OsString]) -> Result<i32, SupervisorError> {
        let program = resolve(program).await;
        tracing::debug!(command = %command_line(&program, args), "Running");

        let status = tokio::process::Command::new(&program)
            .args(args)
            .status()
            .await
            .map_err(|source| SupervisorError::Launch {
                program: program.clone(),
                source,
            })?;

        // No exit code when terminated by a signal.
        Ok(status.code().unwrap_or(-1))
    }
}

/// Starts, stops and signals the service components.
pub struct Supervisor<L = SystemLauncher> {
    layout: Layout,
    launcher: L,
    poll: Duration,
    timeout: Option<Duration>,
}

impl Supervisor<SystemLauncher> {
    /// Supervisor launching real processes.
    #[must_use]
    pub fn system(layout: Layout) -> Self {
        Self::new(layout, SystemLauncher)
    }
}

impl<L: Launcher> Supervisor<L> {
    /// Supervisor polling once per second and waiting indefinitely.
    #[must_use]
    pub const fn new(layout: Layout, launcher: L) -> Self {
        Self {
            layout,
            launcher,
            poll: DEFAULT_POLL_INTERVAL,
            timeout: None,
        }
    }

    /// Set how often pid files are checked while waiting.
    #[must_use]
    pub const fn poll_interval(mut self, poll: Duration) -> Self {
        self.poll = poll;
        self
    }

    /// Bound every wait for a pid file to appear or disappear.
    #[must_use]
    pub const fn wait_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub const fn layout(&self) -> &Layout {
        &self.layout
    }

    #[must_use]
    pub const fn launcher(&self) -> &L {
        &self.launcher
    }

    /// Perform `op`.
    ///
    /// # Errors
    /// Returns the first failing step.
    pub async fn execute(&self, op: Operation) -> Result<(), SupervisorError> {
        tracing::debug!(%op, "Operation requested");
        match op {
            Operation::Flush => self.flush(),
            Operation::Reload => self.reload(),
            Operation::Start => self.start().await,
            Operation::Stop => self.stop().await,
            Operation::ForceStop => {
                self.force_stop();
                Ok(())
            }
        }
    }

    /// Send SIGUSR1 to the daemon.
    ///
    /// # Errors
    /// Returns error if the daemon pid file is unusable or the signal fails.
    pub fn flush(&self) -> Result<(), SupervisorError> {
        signal_pid_file(&self.layout.pid_file(Component::Daemon), Signal::SIGUSR1).map(drop)
    }

    /// Send SIGHUP to the daemon.
    ///
    /// # Errors
    /// Returns error if the daemon pid file is unusable or the signal fails.
    pub fn reload(&self) -> Result<(), SupervisorError> {
        signal_pid_file(&self.layout.pid_file(Component::Daemon), Signal::SIGHUP).map(drop)
    }

    async fn step(&self, program: &str, args: Vec<OsString>, what: &str) -> Result<(), SupervisorError> {
        let status = self.launcher.run(&self.layout.program(program), &args).await?;
        if status != 0 {
            tracing::warn!(program, status, step = what, "Step failed");
            return Err(SupervisorError::StepFailed {
                step: what.to_owned(),
                status,
            });
        }
        Ok(())
    }

    /// Run pre-initialization, commit configuration, then launch each
    /// component under the monitor and wait for its pid file.
    ///
    /// # Errors
    /// Returns the first step that fails or times out.
    pub async fn start(&self) -> Result<(), SupervisorError> {
        self.step(PREINIT_PROGRAM, Vec::new(), "Pre initialization routines failed")
            .await?;

        for (target, name) in COMMIT_TARGETS {
            let args = vec!["commit".into(), target.into()];
            self.step(ADMIN_PROGRAM, args, &format!("Unable to commit {name} configuration"))
                .await?;
        }

        for component in Component::START_ORDER {
            let pid_file = self.layout.pid_file(component);
            let args = vec![
                "-p".into(),
                pid_file.clone().into_os_string(),
                "-r".into(),
                "-S".into(),
                self.layout.program(component.program()).into_os_string(),
            ];
            self.step(
                MONITOR_PROGRAM,
                args,
                &format!("Unable to start {}", component.description()),
            )
            .await?;

            wait_for(&pid_file, true, self.poll, self.timeout).await?;
            tracing::info!(component = component.program(), "Component started");
        }
        Ok(())
    }

    /// Send SIGTERM to each component in turn, waiting for its pid file to
    /// disappear before moving on.
    ///
    /// # Errors
    /// Returns error at the first component that cannot be signalled or
    /// does not exit in time.
    pub async fn stop(&self) -> Result<(), SupervisorError> {
        for component in Component::STOP_ORDER {
            let pid_file = self.layout.pid_file(component);
            signal_pid_file(&pid_file, Signal::SIGTERM)?;
            wait_for(&pid_file, false, self.poll, self.timeout).await?;
            tracing::info!(component = component.program(), "Component stopped");
        }
        Ok(())
    }

    /// Send SIGKILL to every component and remove all pid files.
    ///
    /// Missing pid files and processes that are already gone are skipped.
    pub fn force_stop(&self) {
        for component in Component::STOP_ORDER {
            let pid_file = self.layout.pid_file(component);
            if let Err(e) = signal_pid_file(&pid_file, Signal::SIGKILL) {
                tracing::debug!(component = component.program(), "Not killed: {e}");
            }
        }

        for component in Component::STOP_ORDER {
            let pid_file = self.layout.pid_file(component);
            if let Err(e) = remove_pid_file(&pid_file) {
                tracing::warn!(component = component.program(), "Pid file not removed: {e}");
            }
        }
    }
}
