//! `tiller drive` command: spawn an interactive process, relay scripted
//! lines to it, and stream its lifecycle.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::info;

use tiller_core::{ProcessController, ProcessEvent, SpawnOptions};

use crate::config::SessionConfig;

/// Render one hub event as a JSON line for `--json` mode.
fn event_json(event: &ProcessEvent) -> String {
    let value = match event {
        ProcessEvent::Start => serde_json::json!({"event": "start"}),
        ProcessEvent::Data(chunk) => serde_json::json!({"event": "data", "chunk": chunk}),
        ProcessEvent::Error(chunk) => serde_json::json!({"event": "error", "chunk": chunk}),
        ProcessEvent::Exit(code) => serde_json::json!({"event": "exit", "code": code}),
    };
    value.to_string()
}

/// Log one hub event as a structured record for the default mode.
fn log_event(event: &ProcessEvent) {
    match event {
        ProcessEvent::Start => info!("process started"),
        ProcessEvent::Data(chunk) => info!(chunk = chunk.trim_end(), "data"),
        ProcessEvent::Error(chunk) => info!(chunk = chunk.trim_end(), "stderr"),
        ProcessEvent::Exit(code) => info!(code = ?code, "process exited"),
    }
}

/// Run the drive command: spawn, settle, send each line in order, stop.
pub async fn run_drive(
    cmdline: &str,
    lines: &[String],
    session: &SessionConfig,
    json: bool,
    cwd: Option<PathBuf>,
) -> Result<()> {
    let opts = SpawnOptions {
        cwd,
        ..Default::default()
    };

    // The wildcard observer is registered before the start event fires, so
    // the stream of printed/logged events is complete.
    let ctl = ProcessController::spawn_with(cmdline, opts, |hub| {
        if json {
            hub.on_any(|event| println!("{}", event_json(event)));
        } else {
            hub.on_any(log_event);
        }
    })
    .with_context(|| format!("failed to spawn `{cmdline}`"))?;

    // Graceful shutdown: first signal stops the child, second force-exits.
    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    let got_first_signal = Arc::new(AtomicBool::new(false));
    let got_first_clone = Arc::clone(&got_first_signal);

    tokio::spawn(async move {
        loop {
            tokio::signal::ctrl_c().await.ok();
            if got_first_clone.swap(true, Ordering::SeqCst) {
                eprintln!("\nForce exit.");
                std::process::exit(130);
            }
            eprintln!("\nStopping process (Ctrl+C again to force)...");
            cancel_clone.cancel();
        }
    });

    // Let login banners and prompts pass before the first send.
    if !session.settle.is_zero() {
        tokio::select! {
            _ = tokio::time::sleep(session.settle) => {}
            _ = cancel.cancelled() => {}
        }
    }

    let mut interrupted = cancel.is_cancelled();

    if !interrupted {
        for line in lines {
            let outcome = tokio::select! {
                outcome = ctl.send(line, &session.terminator, session.timeout) => outcome,
                _ = cancel.cancelled() => {
                    interrupted = true;
                    break;
                }
            };
            match outcome {
                Ok(response) => {
                    if json {
                        println!(
                            "{}",
                            serde_json::json!({
                                "event": "response",
                                "line": line,
                                "response": response,
                            })
                        );
                    } else {
                        print!("{response}");
                    }
                }
                Err(e) => {
                    ctl.stop();
                    ctl.wait().await;
                    return Err(e).with_context(|| format!("send failed for `{line}`"));
                }
            }
        }
    }

    ctl.stop();
    let code = ctl.wait().await;
    info!(code = ?code, "drive session finished");

    if interrupted {
        std::process::exit(130);
    }
    Ok(())
}
