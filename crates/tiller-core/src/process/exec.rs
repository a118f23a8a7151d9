//! One-shot, non-interactive command execution.
//!
//! [`run`] is the degenerate counterpart to the interactive controller: the
//! command line goes to a freshly created shell, the call suspends until the
//! process exits, and the full stdout comes back in one piece. No events are
//! produced.

use std::collections::HashMap;
use std::path::PathBuf;

use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

use super::SpawnError;

/// Ways a [`run`] call can fail.
///
/// A non-zero exit status is deliberately absent: stderr output is the
/// failure signal, the exit code is not consulted.
#[derive(Debug, Error)]
pub enum RunError {
    /// Spawning the shell failed, including the fatal no-pid rule.
    #[error(transparent)]
    Spawn(#[from] SpawnError),

    /// Collecting the process's output failed.
    #[error("failed to collect command output")]
    Wait(#[source] std::io::Error),

    /// The command wrote to stderr.
    #[error("command wrote to stderr: {stderr}")]
    Stderr { stderr: String },
}

/// Options applied to a [`run`] call.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Working directory for the shell. Inherited when `None`.
    pub cwd: Option<PathBuf>,
    /// Environment variables merged into the shell's environment.
    pub env: HashMap<String, String>,
}

/// Run `cmdline` under `sh -c` and return its complete stdout.
///
/// The whole command line is handed to the shell unsplit, so pipes,
/// redirection and `&&` chains work. Stdin is closed; this is strictly
/// non-interactive.
///
/// # Errors
///
/// Fails if the shell cannot be spawned, if no pid is assigned (the nascent
/// process is killed best-effort first), if collecting output fails, or if
/// the command writes anything to stderr. The exit status alone never fails
/// the call: `run("false")` resolves with empty stdout.
pub async fn run(cmdline: &str, opts: RunOptions) -> Result<String, RunError> {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(cmdline);
    if let Some(cwd) = &opts.cwd {
        cmd.current_dir(cwd);
    }
    for (key, value) in &opts.env {
        cmd.env(key, value);
    }
    cmd.stdin(std::process::Stdio::null());
    cmd.stdout(std::process::Stdio::piped());
    cmd.stderr(std::process::Stdio::piped());
    cmd.kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|e| SpawnError::Spawn {
        program: "sh".to_string(),
        source: e,
    })?;

    let Some(pid) = child.id() else {
        let _ = child.start_kill();
        return Err(SpawnError::NoPid {
            program: "sh".to_string(),
        }
        .into());
    };
    debug!(pid, command = cmdline, "running one-shot command");

    // wait_with_output drains stdout/stderr concurrently with waiting, so a
    // chatty child cannot deadlock on a full pipe.
    let output = child.wait_with_output().await.map_err(RunError::Wait)?;

    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.is_empty() {
        return Err(RunError::Stderr {
            stderr: stderr.into_owned(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
