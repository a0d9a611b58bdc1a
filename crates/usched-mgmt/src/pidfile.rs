//! Pid file handling.
//!
//! Each component writes its pid as the first line of its pid file on
//! startup and removes the file on exit.

use std::{io, path::Path, time::Duration};

use nix::{
    sys::signal::{Signal, kill},
    unistd::Pid,
};

use crate::SupervisorError;

/// Read the pid recorded in `path`.
///
/// # Errors
/// Returns error if the file cannot be read or holds no positive pid.
pub fn read_pid(path: &Path) -> Result<Pid, SupervisorError> {
    let contents = std::fs::read_to_string(path).map_err(|source| SupervisorError::PidFile {
        path: path.to_path_buf(),
        source,
    })?;

    let first = contents.lines().next().unwrap_or_default().trim();
    match first.parse::<i32>() {
        Ok(pid) if pid > 0 => Ok(Pid::from_raw(pid)),
        _ => Err(SupervisorError::InvalidPid {
            path: path.to_path_buf(),
            content: first.to_owned(),
        }),
    }
}

/// Send `signal` to the process recorded in `path`.
///
/// # Errors
/// Returns error if the pid file is unusable or the signal cannot be sent.
pub fn signal_pid_file(path: &Path, signal: Signal) -> Result<Pid, SupervisorError> {
    let pid = read_pid(path)?;
    kill(pid, signal).map_err(|source| SupervisorError::Signal {
        pid: pid.as_raw(),
        signal,
        source,
    })?;
    tracing::debug!(pid = pid.as_raw(), %signal, path = %path.display(), "Signal sent");
    Ok(pid)
}

/// Remove a pid file. Returns whether it existed.
///
/// # Errors
/// Returns error for any failure other than the file being absent.
pub fn remove_pid_file(path: &Path) -> Result<bool, SupervisorError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(source) => Err(SupervisorError::PidFile {
            path: path.to_path_buf(),
            source,
        }),
    }
}

async fn is_present(path: &Path) -> bool {
    tokio::fs::metadata(path).await.is_ok_and(|m| m.is_file())
}

/// Poll until `path` exists (`present`) or is gone (`!present`).
///
/// # Errors
/// Returns [`SupervisorError::Timeout`] if `timeout` elapses first.
pub async fn wait_for(
    path: &Path,
    present: bool,
    poll: Duration,
    timeout: Option<Duration>,
) -> Result<(), SupervisorError> {
    let wait = async {
        while is_present(path).await != present {
            tokio::time::sleep(poll).await;
        }
    };

    match timeout {
        Some(limit) => tokio::time::timeout(limit, wait)
            .await
            .map_err(|_| SupervisorError::Timeout {
                path: path.to_path_buf(),
            }),
        None => {
            wait.await;
            Ok(())
        }
    }
}
