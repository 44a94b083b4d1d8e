//! ursd: uniform resource system daemon.
//!
//! Boots the service with `vfs://dev/` (local) and `vfs://tmp/` (served over
//! a mailbox), then runs one command, or a script of commands from stdin.
//!
//! ## Usage
//!
//! ```bash
//! ursd ls /dev
//! ursd --config urs.toml stat /dev/zero
//! printf 'write /tmp/a hello\ncat /tmp/a\n' | ursd
//! RUST_LOG=urs_kernel=debug ursd mounts
//! ```

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use urs_kernel::UrsConfig;
use urs_server::{Command, Daemon, commands};

/// Uniform resource system daemon.
#[derive(Parser, Debug)]
#[command(name = "ursd")]
#[command(about = "Mount the reference providers and run resource commands")]
struct Args {
    /// TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Command to run; reads a script from stdin when omitted
    #[command(subcommand)]
    command: Option<Command>,
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            eprintln!("ursd: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    let config = match &args.config {
        Some(path) => UrsConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => UrsConfig::default(),
    };

    let daemon = Daemon::boot(config)?;
    let mut out = io::stdout().lock();
    let result = match &args.command {
        Some(command) => commands::run(daemon.urs(), command, &mut out),
        None => commands::run_script(daemon.urs(), io::stdin().lock(), &mut out).map(|ran| {
            tracing::info!(commands = ran, "script finished");
        }),
    };
    daemon.shutdown();
    result
}
