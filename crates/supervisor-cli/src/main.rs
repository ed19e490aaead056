//! `supervise`: run one process under supervision until it exits or the
//! supervisor is told to stop.

use anyhow::{Context, Result};
use clap::Parser;
use process_supervisor::{Handle, Options, ProcessState};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod signals;

use signals::Action;

#[derive(Parser)]
#[command(name = "supervise")]
#[command(about = "Run a process under supervision with rotating log capture")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "supervise.yaml")]
    config: PathBuf,

    /// Log level used when RUST_LOG is not set
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Validate the configuration, print the resolved command and exit
    #[arg(long)]
    check: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .context("invalid log level")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let options = Options::from_yaml_file(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;

    if cli.check {
        println!("{}", options.command());
        return Ok(());
    }

    let code = smol::block_on(supervise(options))?;
    std::process::exit(code);
}

async fn supervise(options: Options) -> Result<i32> {
    let actions = signals::listen().context("failed to install signal handlers")?;

    let handle = process_supervisor::run(options).await;
    info!(pid = ?handle.pid(), status = %handle.status(), "Supervisor started");

    let changes = handle.changes();
    smol::spawn(async move {
        while let Ok(status) = changes.recv().await {
            info!(%status, "Status changed");
        }
    })
    .detach();

    smol::spawn(forward(actions, handle.clone())).detach();

    handle.wait().await;
    let state = handle.state();
    match &state.error {
        Some(e) => error!(error = %e, command = %state.command, "Process stopped"),
        None => info!(command = %state.command, "Process stopped"),
    }
    Ok(exit_code(&state))
}

async fn forward(actions: async_channel::Receiver<Action>, handle: Handle) {
    while let Ok(action) = actions.recv().await {
        match action {
            Action::Stop => handle.stop(),
            Action::Restart => handle.restart().await,
        }
        if handle.is_finished() {
            break;
        }
    }
}

/// A requested stop exits cleanly; otherwise mirror the child's code
fn exit_code(state: &ProcessState) -> i32 {
    match (&state.error, state.exit_code()) {
        (None, _) => 0,
        (Some(_), Some(code)) => code,
        (Some(_), None) => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use process_supervisor::Error;
    use std::sync::Arc;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["supervise"]);
        assert_eq!(cli.config, PathBuf::from("supervise.yaml"));
        assert_eq!(cli.log_level, "info");
        assert!(!cli.check);
    }

    #[test]
    fn test_exit_code() {
        assert_eq!(exit_code(&ProcessState::default()), 0);

        let failed = ProcessState {
            error: Some(Arc::new(Error::spawn_failed("missing"))),
            ..ProcessState::default()
        };
        assert_eq!(exit_code(&failed), 1);
    }
}
