//! Lifecycle management for the uSched service processes.
//!
//! Provides:
//! - `Supervisor` - flush, reload, start, stop and force stop
//! - `Layout` - Program and pid file locations
//! - `Launcher` - Seam for running helper programs (`SystemLauncher` spawns them)

pub mod error;
pub mod layout;
pub mod pidfile;
pub mod supervisor;

pub use error::SupervisorError;
pub use layout::{Component, Layout};
pub use supervisor::{Launcher, Operation, Supervisor, SystemLauncher};

/// Fail unless running with an effective uid of 0.
///
/// # Errors
/// Returns [`SupervisorError::NotRoot`] for any other user.
pub fn require_root() -> Result<(), SupervisorError> {
    if nix::unistd::geteuid().is_root() {
        Ok(())
    } else {
        Err(SupervisorError::NotRoot)
    }
}
