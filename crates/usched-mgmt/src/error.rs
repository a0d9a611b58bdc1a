//! Supervisor error.

use std::{io, path::PathBuf};

use nix::{errno::Errno, sys::signal::Signal};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("{source}: '{}'", path.display())]
    PidFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Invalid pid {content:?} in '{}'", path.display())]
    InvalidPid { path: PathBuf, content: String },
    #[error("Unable to send {signal} to process {pid}: {source}")]
    Signal {
        pid: i32,
        signal: Signal,
        #[source]
        source: Errno,
    },
    #[error("Unable to execute '{}': {source}", program.display())]
    Launch {
        program: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{step} (exit status {status})")]
    StepFailed { step: String, status: i32 },
    #[error("Timed out waiting for '{}'", path.display())]
    Timeout { path: PathBuf },
    #[error("You need to be root to perform that operation.")]
    NotRoot,
}
