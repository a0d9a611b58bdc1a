//! Supervisor operations against a scratch run directory.

use std::{
    ffi::OsString,
    os::unix::process::ExitStatusExt,
    path::Path,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::process::{Child, Command};
use tokio_test::{assert_err, assert_ok};
use usched_mgmt::{Component, Launcher, Layout, Operation, Supervisor, SupervisorError};

const POLL: Duration = Duration::from_millis(5);
const LIMIT: Duration = Duration::from_secs(10);

/// Records invocations; the monitor "starts" a component by writing its pid file.
#[derive(Default)]
struct RecordingLauncher {
    calls: Mutex<Vec<Vec<String>>>,
    fail_on: Option<Vec<String>>,
    write_pid_files: bool,
}

impl RecordingLauncher {
    fn new() -> Self {
        Self {
            write_pid_files: true,
            ..Self::default()
        }
    }

    fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Launcher for RecordingLauncher {
    async fn run(&self, program: &Path, args: &[OsString]) -> Result<i32, SupervisorError> {
        let mut call = vec![program.file_name().unwrap().to_string_lossy().into_owned()];
        call.extend(args.iter().map(|a| a.to_string_lossy().into_owned()));
        self.calls.lock().unwrap().push(call.clone());

        if self.fail_on.as_ref() == Some(&call) {
            return Ok(1);
        }
        if self.write_pid_files && call[0] == "usm" {
            tokio::fs::write(&args[1], "1\n").await.unwrap();
        }
        Ok(0)
    }
}

fn layout(dir: &TempDir) -> Layout {
    Layout::new("/opt/usched/sbin", dir.path())
}

fn supervisor<L: Launcher>(layout: Layout, launcher: L) -> Supervisor<L> {
    Supervisor::new(layout, launcher)
        .poll_interval(POLL)
        .wait_timeout(Some(LIMIT))
}

fn sleeper() -> Child {
    Command::new("sleep")
        .arg("30")
        .kill_on_drop(true)
        .spawn()
        .unwrap()
}

fn write_pid(path: &Path, child: &Child) {
    std::fs::write(path, format!("{}\n", child.id().unwrap())).unwrap();
}

#[tokio::test]
async fn test_start_launches_in_dependency_order() {
    let dir = TempDir::new().unwrap();
    let sup = supervisor(layout(&dir), RecordingLauncher::new());

    assert_ok!(sup.execute(Operation::Start).await);

    let monitor = |pid: &str, bin: &str| {
        vec![
            "usm".to_owned(),
            "-p".to_owned(),
            dir.path().join(pid).display().to_string(),
            "-r".to_owned(),
            "-S".to_owned(),
            format!("/opt/usched/sbin/{bin}"),
        ]
    };
    let commit = |target: &str| vec!["usa".to_owned(), "commit".to_owned(), target.to_owned()];

    let calls = sup.launcher().calls();
    assert_eq!(
        calls,
        vec![
            vec!["usched_preinit".to_owned()],
            commit("core"),
            commit("exec"),
            commit("ipc"),
            commit("stat"),
            monitor("usched_usi.pid", "usi"),
            monitor("usched_uss.pid", "uss"),
            monitor("usched_use.pid", "use"),
            monitor("usched_usd.pid", "usd"),
        ]
    );
}

#[tokio::test]
async fn test_start_stops_at_failed_commit() {
    let dir = TempDir::new().unwrap();
    let launcher = RecordingLauncher {
        fail_on: Some(vec!["usa".into(), "commit".into(), "ipc".into()]),
        ..RecordingLauncher::new()
    };
    let sup = supervisor(layout(&dir), launcher);

    let err = assert_err!(sup.start().await);
    assert!(matches!(err, SupervisorError::StepFailed { status: 1, .. }));
    assert!(err.to_string().contains("uSched IPC"));
    assert!(!dir.path().join("usched_usi.pid").exists());
}

#[tokio::test]
async fn test_start_times_out_without_pid_file() {
    let dir = TempDir::new().unwrap();
    let launcher = RecordingLauncher {
        write_pid_files: false,
        ..RecordingLauncher::default()
    };
    let sup = Supervisor::new(layout(&dir), launcher)
        .poll_interval(POLL)
        .wait_timeout(Some(Duration::from_millis(50)));

    let err = assert_err!(sup.start().await);
    match err {
        SupervisorError::Timeout { path } => assert!(path.ends_with("usched_usi.pid")),
        other => panic!("expected timeout, got {other}"),
    }
}

#[tokio::test]
async fn test_flush_without_pid_file_fails() {
    let dir = TempDir::new().unwrap();
    let sup = supervisor(layout(&dir), RecordingLauncher::new());

    let err = assert_err!(sup.execute(Operation::Flush).await);
    assert!(matches!(err, SupervisorError::PidFile { .. }));
    assert!(err.to_string().ends_with("usched_usd.pid'"));
}

#[tokio::test]
async fn test_flush_and_reload_signal_daemon() {
    let dir = TempDir::new().unwrap();
    let layout = layout(&dir);
    let sup = supervisor(layout.clone(), RecordingLauncher::new());

    let mut daemon = sleeper();
    write_pid(&layout.pid_file(Component::Daemon), &daemon);
    assert_ok!(sup.flush());
    let status = daemon.wait().await.unwrap();
    assert_eq!(status.signal(), Some(libc_signal::SIGUSR1));

    let mut daemon = sleeper();
    write_pid(&layout.pid_file(Component::Daemon), &daemon);
    assert_ok!(sup.reload());
    let status = daemon.wait().await.unwrap();
    assert_eq!(status.signal(), Some(libc_signal::SIGHUP));
}

#[tokio::test]
async fn test_stop_signals_in_reverse_order_and_waits() {
    let dir = TempDir::new().unwrap();
    let layout = layout(&dir);
    let order = Arc::new(Mutex::new(Vec::new()));

    // Stand-ins that remove their pid file once terminated, like the
    // real components do.
    let mut watchers = Vec::new();
    for component in Component::START_ORDER {
        let mut child = sleeper();
        let pid_file = layout.pid_file(component);
        write_pid(&pid_file, &child);

        let order = Arc::clone(&order);
        watchers.push(tokio::spawn(async move {
            let status = child.wait().await.unwrap();
            order.lock().unwrap().push(component);
            std::fs::remove_file(&pid_file).unwrap();
            status
        }));
    }

    let sup = supervisor(layout.clone(), RecordingLauncher::new());
    assert_ok!(sup.execute(Operation::Stop).await);

    for watcher in watchers {
        let status = watcher.await.unwrap();
        assert_eq!(status.signal(), Some(libc_signal::SIGTERM));
    }
    assert_eq!(*order.lock().unwrap(), Component::STOP_ORDER.to_vec());
}

#[tokio::test]
async fn test_stop_fails_when_daemon_not_running() {
    let dir = TempDir::new().unwrap();
    let sup = supervisor(layout(&dir), RecordingLauncher::new());
    let err = assert_err!(sup.stop().await);
    assert!(matches!(err, SupervisorError::PidFile { .. }));
}

#[tokio::test]
async fn test_force_stop_kills_and_cleans_up() {
    let dir = TempDir::new().unwrap();
    let layout = layout(&dir);

    let mut exec = sleeper();
    write_pid(&layout.pid_file(Component::Exec), &exec);
    // Stale: no such process.
    std::fs::write(layout.pid_file(Component::Daemon), "2147483647\n").unwrap();
    // Unreadable content.
    std::fs::write(layout.pid_file(Component::Stat), "garbage\n").unwrap();
    // The IPC pid file is missing altogether.

    let sup = supervisor(layout.clone(), RecordingLauncher::new());
    assert_ok!(sup.execute(Operation::ForceStop).await);

    let status = exec.wait().await.unwrap();
    assert_eq!(status.signal(), Some(libc_signal::SIGKILL));
    for component in Component::STOP_ORDER {
        assert!(!layout.pid_file(component).exists(), "{component:?}");
    }
}

/// Signal numbers as reported by `ExitStatusExt::signal`.
mod libc_signal {
    use nix::sys::signal::Signal;

    pub const SIGHUP: i32 = Signal::SIGHUP as i32;
    pub const SIGKILL: i32 = Signal::SIGKILL as i32;
    pub const SIGTERM: i32 = Signal::SIGTERM as i32;
    pub const SIGUSR1: i32 = Signal::SIGUSR1 as i32;
}
