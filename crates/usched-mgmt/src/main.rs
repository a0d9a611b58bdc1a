//! `usched-mgmt <flush|reload|start|stop|force_stop> [quiet]`

use std::{
    io::Write,
    path::PathBuf,
    process::ExitCode,
    time::Duration,
};

use anyhow::{Context, Result, ensure};
use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use usched_mgmt::{
    Layout, Operation, Supervisor,
    layout::{DEFAULT_RUN_DIR, DEFAULT_SBIN_DIR},
    require_root,
};

/// Start, stop and signal the uSched services.
#[derive(Parser, Debug)]
#[command(name = "usched-mgmt", version, about, long_about = None)]
struct Cli {
    /// Operation to perform
    #[arg(value_enum)]
    op: Operation,

    /// Print nothing on stdout
    #[arg(value_parser = ["quiet"])]
    quiet: Option<String>,

    /// Directory holding the service programs
    #[arg(long, env = "USCHED_SBIN_DIR", default_value = DEFAULT_SBIN_DIR)]
    sbin_dir: PathBuf,

    /// Directory holding the pid files
    #[arg(long, env = "USCHED_RUN_DIR", default_value = DEFAULT_RUN_DIR)]
    run_dir: PathBuf,

    /// Pid file poll interval, in milliseconds
    #[arg(long, default_value_t = 1000)]
    poll_ms: u64,

    /// Give up waiting for a pid file after this many seconds
    #[arg(long)]
    timeout_secs: Option<u64>,
}

struct Status {
    quiet: bool,
}

impl Status {
    fn say(&self, msg: &str) {
        if self.quiet {
            return;
        }
        let mut stdout = std::io::stdout().lock();
        // Nothing useful to do if stdout is gone.
        let _ = stdout.write_all(msg.as_bytes());
        let _ = stdout.flush();
    }
}

fn supervisor(cli: &Cli) -> Result<Supervisor> {
    ensure!(
        cli.run_dir.is_dir(),
        "Run directory '{}' does not exist",
        cli.run_dir.display()
    );

    Ok(Supervisor::system(Layout::new(&cli.sbin_dir, &cli.run_dir))
        .poll_interval(Duration::from_millis(cli.poll_ms.max(1)))
        .wait_timeout(cli.timeout_secs.map(Duration::from_secs)))
}

async fn run(cli: &Cli) -> Result<()> {
    let supervisor = supervisor(cli)?;
    supervisor
        .execute(cli.op)
        .await
        .with_context(|| format!("{} operation failed", cli.op))
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };
    let status = Status {
        quiet: cli.quiet.is_some(),
    };

    if let Err(e) = require_root() {
        status.say(&format!("{e}\n"));
        return ExitCode::FAILURE;
    }

    status.say(&format!("{} operation status: ", cli.op));
    match run(&cli).await {
        Ok(()) => {
            status.say("Success.\n");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::debug!("{e:?}");
            status.say(&format!("Failed: {}\nFailed.\n", e.root_cause()));
            ExitCode::FAILURE
        }
    }
}
