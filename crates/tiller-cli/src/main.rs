mod config;
mod drive_cmd;
mod run_cmd;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use config::SessionConfig;

#[derive(Parser)]
#[command(name = "tiller", about = "Drive interactive subprocesses over stdio")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a command line to completion and print its stdout
    Run {
        /// Command line, executed via `sh -c`
        cmdline: String,
        /// Working directory for the command
        #[arg(long)]
        cwd: Option<PathBuf>,
    },
    /// Spawn an interactive process and drive it line by line
    Drive {
        /// Command line, split on whitespace
        cmdline: String,
        /// Line to send (repeatable; lines are sent in order, each awaited)
        #[arg(long = "send", value_name = "LINE")]
        send: Vec<String>,
        /// Terminator marking a response as complete
        #[arg(long)]
        terminator: Option<String>,
        /// Per-send timeout in milliseconds (0 = wait indefinitely)
        #[arg(long)]
        timeout_ms: Option<u64>,
        /// Delay before the first send, to let banners and prompts pass
        #[arg(long)]
        settle_ms: Option<u64>,
        /// Print one JSON line per event instead of log records
        #[arg(long)]
        json: bool,
        /// Working directory for the child
        #[arg(long)]
        cwd: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { cmdline, cwd } => {
            run_cmd::run_run(&cmdline, cwd).await?;
        }
        Commands::Drive {
            cmdline,
            send,
            terminator,
            timeout_ms,
            settle_ms,
            json,
            cwd,
        } => {
            let session =
                match SessionConfig::resolve(terminator.as_deref(), timeout_ms, settle_ms) {
                    Ok(session) => session,
                    Err(e) => {
                        eprintln!("{e:#}");
                        std::process::exit(2);
                    }
                };
            drive_cmd::run_drive(&cmdline, &send, &session, json, cwd).await?;
        }
    }

    Ok(())
}
