//! `tiller run` command: one-shot execution with full output capture.

use std::path::PathBuf;

use anyhow::{Context, Result};

use tiller_core::process::{RunOptions, run};

/// Run the command line to completion and print what it wrote to stdout.
///
/// The command's exit code is not inspected; output on stderr is what
/// marks a run as failed.
pub async fn run_run(cmdline: &str, cwd: Option<PathBuf>) -> Result<()> {
    let opts = RunOptions {
        cwd,
        ..Default::default()
    };
    let stdout = run(cmdline, opts)
        .await
        .with_context(|| format!("failed to run `{cmdline}`"))?;
    print!("{stdout}");
    Ok(())
}
