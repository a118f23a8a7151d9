//! Process controller: owns one spawned child process and its interactive
//! protocol.
//!
//! The controller wires the child's lifecycle signals and stream output into
//! an [`EventHub`] it exclusively owns, and layers a request/response
//! primitive ([`ProcessController::send`]) over the otherwise unstructured
//! output stream.
//!
//! # Architecture
//!
//! ```text
//! ProcessController::spawn_with(cmdline, opts, configure)
//!     |
//!     v
//! child process
//!     stdout --> reader task --+
//!     stderr --> reader task --+--> signal channel --> pump task
//!     exit   --> waiter task --+                          |
//!                                         +---------------+--------------+
//!                                         v                              v
//!                                     EventHub                    PendingRequest
//!                                  (subscribers)               (resolves `send`)
//! ```
//!
//! One pump task drains the signal channel and dispatches each signal
//! synchronously: buffers are appended, the hub emits, and any outstanding
//! `send` request absorbs the chunk. This keeps event ordering identical to
//! the order signals were observed at the OS boundary.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{Notify, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::hub::{EventHub, EventKind, ProcessEvent, SubscriptionId};

pub mod command;
pub mod exec;
pub mod heuristic;
mod request;

// Re-export the primary public API at the module level.
pub use command::{CommandLine, SpawnOptions};
pub use exec::{RunError, RunOptions, run};
pub use heuristic::{ErrorHeuristic, SubstringErrorHeuristic};
pub use request::SendError;

use request::PendingRequest;

/// Default terminator for the request/response primitive.
pub const DEFAULT_TERMINATOR: &str = "DONE";

/// Errors that can occur while constructing a controller.
#[derive(Debug, Error)]
pub enum SpawnError {
    /// The command line contained no tokens.
    #[error("empty command line")]
    EmptyCommandLine,

    /// The OS refused to spawn the program.
    #[error("failed to spawn `{program}`")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The child spawned but reported no pid. The nascent process is killed
    /// (best-effort) before this is returned.
    #[error("spawned `{program}` but no pid was assigned")]
    NoPid { program: String },

    /// A requested stdio pipe was not attached on the spawned child.
    #[error("{stream} pipe missing on spawned child")]
    PipeMissing { stream: &'static str },
}

/// Where the child is in its lifecycle, tracked on a watch channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProcessState {
    Running,
    Exited(Option<i32>),
}

/// Raw signals flowing from the reader/waiter tasks to the pump.
enum StreamSignal {
    /// A chunk read from stdout.
    Stdout(String),
    /// A chunk read from stderr.
    Stderr(String),
    /// A stream-level I/O failure, with a descriptive message.
    Failed(String),
    /// The child exited; readers have drained by the time this arrives.
    Exited(Option<i32>),
}

/// Owns one spawned child process: its event hub, its accumulated output
/// buffers and the `send` request primitive.
///
/// Cloning is cheap and clones share the same child: concurrent `send`
/// calls on clones queue behind each other exactly as on one instance.
///
/// Dropping the controller does not stop the child; call
/// [`ProcessController::stop`] and await [`ProcessController::wait`] for a
/// clean shutdown.
///
/// # Example
///
/// ```ignore
/// let ctl = ProcessController::spawn_with("sh -i", SpawnOptions::default(), |hub| {
///     hub.on_any(|event| tracing::debug!(kind = %event.kind(), "event"));
/// })?;
/// let out = ctl.send("uptime && echo --done--", "--done--", None).await?;
/// ctl.stop();
/// ctl.wait().await;
/// ```
pub struct ProcessController {
    /// The parsed command line, immutable after construction.
    cmdline: CommandLine,
    /// OS-assigned process id, observed non-null at spawn.
    pid: u32,
    /// The hub this controller publishes through. Created here, never shared
    /// across controllers.
    hub: Arc<Mutex<EventHub>>,
    /// Everything observed on stdout, append-only.
    output: Arc<Mutex<String>>,
    /// Everything observed on stderr plus stream error messages, append-only.
    error_output: Arc<Mutex<String>>,
    /// The at-most-one outstanding `send` request.
    pending: Arc<Mutex<Option<PendingRequest>>>,
    /// Child stdin behind a fair async mutex: concurrent senders queue FIFO,
    /// and the guard is held until the request resolves.
    stdin: Arc<tokio::sync::Mutex<ChildStdin>>,
    /// Wakes the waiter task to terminate the child.
    stop: Arc<Notify>,
    /// Lifecycle state, written once by the pump at exit.
    state: watch::Receiver<ProcessState>,
    /// Policy for heuristic error detection in `send`.
    heuristic: Arc<dyn ErrorHeuristic>,
}

impl Clone for ProcessController {
    fn clone(&self) -> Self {
        Self {
            cmdline: self.cmdline.clone(),
            pid: self.pid,
            hub: Arc::clone(&self.hub),
            output: Arc::clone(&self.output),
            error_output: Arc::clone(&self.error_output),
            pending: Arc::clone(&self.pending),
            stdin: Arc::clone(&self.stdin),
            stop: Arc::clone(&self.stop),
            state: self.state.clone(),
            heuristic: Arc::clone(&self.heuristic),
        }
    }
}

impl std::fmt::Debug for ProcessController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessController")
            .field("command", &self.cmdline.to_string())
            .field("pid", &self.pid)
            .field("running", &self.is_running())
            .finish()
    }
}

impl ProcessController {
    /// Spawn `cmdline` as an interactive child process.
    ///
    /// Equivalent to [`ProcessController::spawn_with`] with no subscribers.
    /// Note the `start` event fires during construction, so subscribers
    /// added afterwards only see later events.
    pub fn spawn(cmdline: &str, opts: SpawnOptions) -> Result<Self, SpawnError> {
        Self::spawn_with(cmdline, opts, |_| {})
    }

    /// Spawn `cmdline` as an interactive child process, with `configure`
    /// registering subscribers before the first event fires.
    ///
    /// The command line is split on whitespace into a program and arguments
    /// (overridable via [`SpawnOptions::args`]); stdin, stdout and stderr
    /// are piped. Once the pid is confirmed, `configure` runs against the
    /// fresh hub and the `start` event is emitted, strictly before any
    /// `data`, `error` or `exit` event.
    ///
    /// # Errors
    ///
    /// Fails on an empty command line, an OS-level spawn refusal, or a
    /// missing pid; in the last case the nascent child is killed and the
    /// kill error, if any, is swallowed. No `start` event is emitted on any
    /// failure path.
    ///
    /// # Panics
    ///
    /// Must be called within a tokio runtime: the controller spawns its
    /// reader and pump tasks onto it.
    pub fn spawn_with(
        cmdline: &str,
        opts: SpawnOptions,
        configure: impl FnOnce(&mut EventHub),
    ) -> Result<Self, SpawnError> {
        let cmdline = CommandLine::parse(cmdline)?;
        let args = opts.args.clone().unwrap_or_else(|| cmdline.args.clone());

        let mut cmd = Command::new(&cmdline.program);
        cmd.args(&args);
        if let Some(cwd) = &opts.cwd {
            cmd.current_dir(cwd);
        }
        for (key, value) in &opts.env {
            cmd.env(key, value);
        }
        cmd.stdin(std::process::Stdio::piped());
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());
        // Safety net for abnormal teardown (runtime shutdown mid-test);
        // normal shutdown goes through stop()/exit.
        cmd.kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| SpawnError::Spawn {
            program: cmdline.program.clone(),
            source: e,
        })?;

        let Some(pid) = child.id() else {
            let _ = child.start_kill();
            return Err(SpawnError::NoPid {
                program: cmdline.program.clone(),
            });
        };

        let Some(stdin) = child.stdin.take() else {
            let _ = child.start_kill();
            return Err(SpawnError::PipeMissing { stream: "stdin" });
        };
        let Some(stdout) = child.stdout.take() else {
            let _ = child.start_kill();
            return Err(SpawnError::PipeMissing { stream: "stdout" });
        };
        let Some(stderr) = child.stderr.take() else {
            let _ = child.start_kill();
            return Err(SpawnError::PipeMissing { stream: "stderr" });
        };

        // Subscribe-then-start: `configure` runs before the start event, so
        // callers observe the full event sequence deterministically.
        let mut hub = EventHub::new();
        configure(&mut hub);
        hub.emit(&ProcessEvent::Start);
        debug!(pid, command = %cmdline, "spawned interactive process");

        let hub = Arc::new(Mutex::new(hub));
        let output = Arc::new(Mutex::new(String::new()));
        let error_output = Arc::new(Mutex::new(String::new()));
        let pending: Arc<Mutex<Option<PendingRequest>>> = Arc::new(Mutex::new(None));
        let stop = Arc::new(Notify::new());
        let (signal_tx, signal_rx) = mpsc::channel(32);
        let (state_tx, state_rx) = watch::channel(ProcessState::Running);

        let stdout_reader = tokio::spawn(pump_stream(
            stdout,
            signal_tx.clone(),
            "stdout",
            StreamSignal::Stdout,
        ));
        let stderr_reader = tokio::spawn(pump_stream(
            stderr,
            signal_tx.clone(),
            "stderr",
            StreamSignal::Stderr,
        ));
        tokio::spawn(supervise_child(
            child,
            pid,
            Arc::clone(&stop),
            opts.stop_grace,
            vec![stdout_reader, stderr_reader],
            signal_tx,
        ));
        tokio::spawn(pump_events(
            signal_rx,
            pid,
            Arc::clone(&hub),
            Arc::clone(&output),
            Arc::clone(&error_output),
            Arc::clone(&pending),
            state_tx,
        ));

        Ok(Self {
            cmdline,
            pid,
            hub,
            output,
            error_output,
            pending,
            stdin: Arc::new(tokio::sync::Mutex::new(stdin)),
            stop,
            state: state_rx,
            heuristic: Arc::clone(&opts.heuristic),
        })
    }

    // -- event hub surface --------------------------------------------------

    /// Register `callback` for events of `kind`. See [`EventHub::on`].
    ///
    /// Callbacks run on the event pump task while the hub lock is held;
    /// they must not call this controller's subscription methods.
    pub fn on(
        &self,
        kind: EventKind,
        callback: impl FnMut(&ProcessEvent) + Send + 'static,
    ) -> SubscriptionId {
        self.lock_hub().on(kind, callback)
    }

    /// Remove a kind-specific subscription. No-op if absent.
    pub fn off(&self, kind: EventKind, id: SubscriptionId) {
        self.lock_hub().off(kind, id);
    }

    /// Register a wildcard subscriber invoked for every event.
    pub fn on_any(&self, callback: impl FnMut(&ProcessEvent) + Send + 'static) -> SubscriptionId {
        self.lock_hub().on_any(callback)
    }

    /// Remove a wildcard subscription. No-op if absent.
    pub fn off_any(&self, id: SubscriptionId) {
        self.lock_hub().off_any(id);
    }

    /// Clear subscribers for one kind, or all of them. See [`EventHub::reset`].
    pub fn reset(&self, kind: Option<EventKind>) {
        self.lock_hub().reset(kind);
    }

    fn lock_hub(&self) -> std::sync::MutexGuard<'_, EventHub> {
        self.hub.lock().unwrap_or_else(|e| e.into_inner())
    }

    // -- request/response primitive -----------------------------------------

    /// Write `line` (newline-terminated) to the child's stdin and suspend
    /// until the response is complete.
    ///
    /// A transient observer accumulates every stdout chunk that follows.
    /// After each chunk, in order: if the accumulated buffer contains
    /// `terminator`, the call resolves with the full buffer (terminator
    /// included); otherwise, if the chunk matches the error heuristic, the
    /// call fails carrying that chunk.
    ///
    /// `timeout` of `None` (or a zero duration) waits indefinitely.
    /// Concurrent `send` calls queue FIFO; at most one request observes the
    /// stream at a time. `stop()` or process exit fails an outstanding call
    /// with [`SendError::ProcessTerminated`]. Whatever the outcome, each
    /// call terminates exactly once; later chunks cannot re-trigger it.
    pub async fn send(
        &self,
        line: &str,
        terminator: &str,
        timeout: Option<Duration>,
    ) -> Result<String, SendError> {
        let timeout = timeout.filter(|t| !t.is_zero());

        let mut stdin = self.stdin.lock().await;
        if !self.is_running() {
            return Err(SendError::ProcessTerminated);
        }

        // Install the observer before writing so a fast child cannot race
        // its response past us.
        let (request, mut rx) = PendingRequest::new(terminator, Arc::clone(&self.heuristic));
        *self.pending.lock().unwrap_or_else(|e| e.into_inner()) = Some(request);

        debug!(pid = self.pid, terminator, "sending line");

        let written = async {
            stdin.write_all(line.as_bytes()).await?;
            stdin.write_all(b"\n").await?;
            stdin.flush().await
        }
        .await;
        if let Err(e) = written {
            self.take_pending();
            return Err(SendError::Stdin(e));
        }

        // Await resolution, racing against process exit so a request
        // installed after the pump has wound down cannot hang.
        let mut state = self.state.clone();
        let resolution = async {
            tokio::select! {
                biased;
                outcome = &mut rx => match outcome {
                    Ok(outcome) => outcome,
                    Err(_) => Err(SendError::ProcessTerminated),
                },
                _ = state.wait_for(|s| matches!(s, ProcessState::Exited(_))) => {
                    self.take_pending();
                    Err(SendError::ProcessTerminated)
                }
            }
        };

        match timeout {
            Some(t) => {
                let raced = tokio::time::timeout(t, resolution).await;
                match raced {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        // Deadline hit: detach the observer. If the pump
                        // resolved in the same instant, its outcome wins.
                        if self.take_pending().is_some() {
                            Err(SendError::Timeout)
                        } else {
                            match rx.try_recv() {
                                Ok(outcome) => outcome,
                                Err(_) => Err(SendError::Timeout),
                            }
                        }
                    }
                }
            }
            None => resolution.await,
        }
    }

    fn take_pending(&self) -> Option<PendingRequest> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).take()
    }

    // -- lifecycle ----------------------------------------------------------

    /// Request termination of the child: SIGTERM first, escalating to a hard
    /// kill after [`SpawnOptions::stop_grace`].
    ///
    /// Returns immediately; the `exit` event confirms termination (or await
    /// [`ProcessController::wait`]). Any outstanding `send` fails with
    /// [`SendError::ProcessTerminated`]. Calling `stop` on an already-dead
    /// process is a no-op.
    pub fn stop(&self) {
        debug!(pid = self.pid, "stop requested");
        if let Some(request) = self.take_pending() {
            request.fail(SendError::ProcessTerminated);
        }
        self.stop.notify_one();
    }

    /// Suspend until the child exits and return its exit code, or `None` if
    /// it was killed without one. Returns immediately if already exited.
    pub async fn wait(&self) -> Option<i32> {
        let mut state = self.state.clone();
        match state
            .wait_for(|s| matches!(s, ProcessState::Exited(_)))
            .await
        {
            Ok(state) => match *state {
                ProcessState::Exited(code) => code,
                ProcessState::Running => None,
            },
            Err(_) => None,
        }
    }

    /// Whether the child is still running (exit not yet dispatched).
    pub fn is_running(&self) -> bool {
        matches!(*self.state.borrow(), ProcessState::Running)
    }

    // -- inspection ---------------------------------------------------------

    /// The OS-assigned process id.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// The parsed command line this controller was constructed from.
    pub fn command(&self) -> &CommandLine {
        &self.cmdline
    }

    /// Snapshot of everything observed on stdout so far.
    pub fn output(&self) -> String {
        self.output.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Snapshot of everything observed on stderr (plus stream error
    /// messages) so far.
    pub fn error_output(&self) -> String {
        self.error_output.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

// ---------------------------------------------------------------------------
// Background tasks
// ---------------------------------------------------------------------------

/// Read a stream in chunks and forward each as a signal. Ends on EOF or
/// read error.
async fn pump_stream<R>(
    mut reader: R,
    tx: mpsc::Sender<StreamSignal>,
    label: &'static str,
    wrap: fn(String) -> StreamSignal,
) where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; 4096];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let chunk = String::from_utf8_lossy(&buf[..n]).into_owned();
                if tx.send(wrap(chunk)).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                let _ = tx
                    .send(StreamSignal::Failed(format!("{label} read error: {e}")))
                    .await;
                break;
            }
        }
    }
}

/// Wait for the child to exit (or for a stop request), let the readers
/// drain, then report the exit signal.
///
/// Readers are awaited before `Exited` goes out so every buffered chunk is
/// dispatched before the exit event.
async fn supervise_child(
    mut child: Child,
    pid: u32,
    stop: Arc<Notify>,
    grace: Duration,
    readers: Vec<JoinHandle<()>>,
    tx: mpsc::Sender<StreamSignal>,
) {
    let code = tokio::select! {
        status = child.wait() => match status {
            Ok(status) => status.code(),
            Err(e) => {
                warn!(pid, error = %e, "error waiting for child");
                None
            }
        },
        _ = stop.notified() => terminate(&mut child, pid, grace).await,
    };

    for reader in readers {
        let _ = reader.await;
    }

    let _ = tx.send(StreamSignal::Exited(code)).await;
}

/// Terminate the child: SIGTERM, a grace period, then SIGKILL.
async fn terminate(child: &mut Child, pid: u32, grace: Duration) -> Option<i32> {
    #[cfg(unix)]
    {
        // SAFETY: pid is a valid u32 from a child we spawned.
        let ret = unsafe { libc::kill(pid as i32, libc::SIGTERM) };
        if ret != 0 {
            warn!(pid, "SIGTERM failed, proceeding to hard kill");
        }
    }
    #[cfg(not(unix))]
    {
        let _ = child.start_kill();
    }

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) => {
            debug!(pid, "process exited after SIGTERM");
            status.code()
        }
        Ok(Err(e)) => {
            warn!(pid, error = %e, "error waiting after SIGTERM");
            None
        }
        Err(_) => {
            debug!(pid, "process did not exit after SIGTERM, sending SIGKILL");
            let _ = child.kill().await;
            None
        }
    }
}

/// Drain the signal channel, dispatching each signal in arrival order:
/// append buffers, emit through the hub, feed the outstanding request.
async fn pump_events(
    mut rx: mpsc::Receiver<StreamSignal>,
    pid: u32,
    hub: Arc<Mutex<EventHub>>,
    output: Arc<Mutex<String>>,
    error_output: Arc<Mutex<String>>,
    pending: Arc<Mutex<Option<PendingRequest>>>,
    state_tx: watch::Sender<ProcessState>,
) {
    while let Some(signal) = rx.recv().await {
        match signal {
            StreamSignal::Stdout(chunk) => {
                output
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .push_str(&chunk);
                dispatch(&hub, &ProcessEvent::Data(chunk.clone()));
                feed_pending(&pending, &chunk);
            }
            StreamSignal::Stderr(chunk) => {
                // Stderr chunks become error events but do not touch the
                // outstanding request; only stream-level failures do.
                error_output
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .push_str(&chunk);
                dispatch(&hub, &ProcessEvent::Error(chunk));
            }
            StreamSignal::Failed(message) => {
                error_output
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .push_str(&message);
                dispatch(&hub, &ProcessEvent::Error(message.clone()));
                if let Some(request) = pending.lock().unwrap_or_else(|e| e.into_inner()).take() {
                    request.fail(SendError::Stream { message });
                }
            }
            StreamSignal::Exited(code) => {
                if let Some(request) = pending.lock().unwrap_or_else(|e| e.into_inner()).take() {
                    request.fail(SendError::ProcessTerminated);
                }
                dispatch(&hub, &ProcessEvent::Exit(code));
                // Terminal state: tear down subscriptions after the exit
                // event has reached them, then publish the state change.
                hub.lock().unwrap_or_else(|e| e.into_inner()).reset(None);
                debug!(pid, code = ?code, "process exited");
                let _ = state_tx.send(ProcessState::Exited(code));
                break;
            }
        }
    }
}

/// Emit through the hub, containing subscriber panics so a misbehaving
/// observer cannot take down stream handling.
fn dispatch(hub: &Mutex<EventHub>, event: &ProcessEvent) {
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        hub.lock().unwrap_or_else(|e| e.into_inner()).emit(event);
    }));
    if result.is_err() {
        warn!(kind = %event.kind(), "event subscriber panicked during dispatch");
    }
}

/// Feed one stdout chunk to the outstanding request, if any. A completed
/// request leaves the slot empty.
fn feed_pending(pending: &Mutex<Option<PendingRequest>>, chunk: &str) {
    let mut slot = pending.lock().unwrap_or_else(|e| e.into_inner());
    if let Some(request) = slot.take() {
        *slot = request.absorb(chunk);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::mpsc as std_mpsc;

    /// Helper: spawn with a wildcard recorder wired before the first event.
    fn spawn_recorded(
        cmdline: &str,
        opts: SpawnOptions,
    ) -> Result<(ProcessController, std_mpsc::Receiver<ProcessEvent>), SpawnError> {
        let (tx, rx) = std_mpsc::channel();
        let ctl = ProcessController::spawn_with(cmdline, opts, |hub| {
            hub.on_any(move |event| {
                let _ = tx.send(event.clone());
            });
        })?;
        Ok((ctl, rx))
    }

    #[tokio::test]
    async fn echo_emits_start_data_exit_in_order() {
        let (ctl, rx) = spawn_recorded("echo hi", SpawnOptions::default()).unwrap();
        assert_eq!(ctl.wait().await, Some(0));

        let events: Vec<ProcessEvent> = rx.try_iter().collect();
        assert_eq!(events.first(), Some(&ProcessEvent::Start));
        assert!(
            events
                .iter()
                .any(|e| matches!(e, ProcessEvent::Data(chunk) if chunk.contains("hi"))),
            "expected a data event containing 'hi', got {events:?}"
        );
        assert_eq!(events.last(), Some(&ProcessEvent::Exit(Some(0))));

        // Start fires exactly once, before everything else.
        let starts = events
            .iter()
            .filter(|e| matches!(e, ProcessEvent::Start))
            .count();
        assert_eq!(starts, 1);
    }

    #[tokio::test]
    async fn nonexistent_program_fails_without_start_event() {
        let started = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&started);
        let result = ProcessController::spawn_with(
            "/nonexistent/path/to/tiller-test-program",
            SpawnOptions::default(),
            |hub| {
                hub.on(EventKind::Start, move |_| flag.store(true, Ordering::SeqCst));
            },
        );

        assert!(matches!(result, Err(SpawnError::Spawn { .. })));
        assert!(!started.load(Ordering::SeqCst), "start must never fire");
    }

    #[tokio::test]
    async fn empty_command_line_is_rejected() {
        let result = ProcessController::spawn("   ", SpawnOptions::default());
        assert!(matches!(result, Err(SpawnError::EmptyCommandLine)));
    }

    #[tokio::test]
    async fn accumulated_output_is_inspectable_after_exit() {
        let ctl = ProcessController::spawn("echo captured-line", SpawnOptions::default()).unwrap();
        ctl.wait().await;
        assert!(ctl.output().contains("captured-line"));
        assert!(ctl.error_output().is_empty());
    }

    #[tokio::test]
    async fn stderr_chunks_become_error_events() {
        let opts = SpawnOptions {
            args: Some(vec!["-c".into(), "echo boom >&2".into()]),
            ..Default::default()
        };
        let (ctl, rx) = spawn_recorded("sh", opts).unwrap();
        ctl.wait().await;

        let events: Vec<ProcessEvent> = rx.try_iter().collect();
        assert!(
            events
                .iter()
                .any(|e| matches!(e, ProcessEvent::Error(chunk) if chunk.contains("boom"))),
            "expected an error event containing 'boom', got {events:?}"
        );
        assert!(ctl.error_output().contains("boom"));
    }

    #[tokio::test]
    async fn args_override_bypasses_whitespace_split() {
        let opts = SpawnOptions {
            args: Some(vec!["-c".into(), "exit 3".into()]),
            ..Default::default()
        };
        let ctl = ProcessController::spawn("sh", opts).unwrap();
        assert_eq!(ctl.wait().await, Some(3));
        assert!(!ctl.is_running());
    }

    #[tokio::test]
    async fn send_resolves_on_terminator() {
        let ctl = ProcessController::spawn("cat", SpawnOptions::default()).unwrap();
        let response = ctl
            .send("ping DONE", "DONE", Some(Duration::from_secs(5)))
            .await
            .unwrap();
        assert_eq!(response, "ping DONE\n");

        ctl.stop();
        assert_eq!(ctl.wait().await, None);
    }

    #[tokio::test]
    async fn concurrent_sends_queue_in_order() {
        let ctl = ProcessController::spawn("cat", SpawnOptions::default()).unwrap();

        let (first, second) = tokio::join!(
            ctl.send("alpha T1", "T1", Some(Duration::from_secs(5))),
            ctl.send("beta T2", "T2", Some(Duration::from_secs(5))),
        );

        assert_eq!(first.unwrap(), "alpha T1\n");
        assert_eq!(second.unwrap(), "beta T2\n");

        ctl.stop();
        ctl.wait().await;
    }

    #[tokio::test]
    async fn stop_cancels_outstanding_send() {
        let ctl = ProcessController::spawn("cat", SpawnOptions::default()).unwrap();

        let sender = ctl.clone();
        let (outcome, _) = tokio::join!(
            sender.send("never answered", "NOPE", None),
            async {
                tokio::time::sleep(Duration::from_millis(100)).await;
                ctl.stop();
            }
        );

        assert!(matches!(outcome, Err(SendError::ProcessTerminated)));
        ctl.wait().await;
    }

    #[tokio::test]
    async fn send_after_exit_fails_with_process_terminated() {
        let ctl = ProcessController::spawn("true", SpawnOptions::default()).unwrap();
        ctl.wait().await;

        let outcome = ctl.send("hello", "DONE", None).await;
        assert!(matches!(outcome, Err(SendError::ProcessTerminated)));
    }

    #[tokio::test]
    async fn stop_terminates_long_running_child() {
        let ctl = ProcessController::spawn("sleep 30", SpawnOptions::default()).unwrap();
        assert!(ctl.is_running());
        assert!(ctl.pid() > 0);

        ctl.stop();
        // Killed by signal: no numeric exit code.
        assert_eq!(ctl.wait().await, None);
        assert!(!ctl.is_running());
    }

    #[tokio::test]
    async fn stop_twice_is_harmless() {
        let ctl = ProcessController::spawn("sleep 30", SpawnOptions::default()).unwrap();
        ctl.stop();
        ctl.stop();
        ctl.wait().await;
        ctl.stop();
    }

    #[tokio::test]
    async fn exit_event_carries_none_for_killed_child() {
        let (ctl, rx) = spawn_recorded("sleep 30", SpawnOptions::default()).unwrap();
        ctl.stop();
        ctl.wait().await;

        let events: Vec<ProcessEvent> = rx.try_iter().collect();
        assert_eq!(events.last(), Some(&ProcessEvent::Exit(None)));
    }

    #[tokio::test]
    async fn subscriptions_are_cleared_after_exit() {
        let ctl = ProcessController::spawn("true", SpawnOptions::default()).unwrap();
        ctl.on_any(|_| {});
        ctl.wait().await;

        // The pump resets the hub after dispatching exit.
        assert_eq!(ctl.hub.lock().unwrap_or_else(|e| e.into_inner()).subscriber_count(), 0);
    }

    #[tokio::test]
    async fn off_by_returned_id_detaches_subscriber() {
        let ctl = ProcessController::spawn("cat", SpawnOptions::default()).unwrap();
        let hits = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&hits);
        let id = ctl.on(EventKind::Data, move |_| flag.store(true, Ordering::SeqCst));
        ctl.off(EventKind::Data, id);

        ctl.send("x DONE", "DONE", Some(Duration::from_secs(5)))
            .await
            .unwrap();
        assert!(!hits.load(Ordering::SeqCst));

        ctl.stop();
        ctl.wait().await;
    }

    #[tokio::test]
    async fn command_and_debug_accessors() {
        let ctl = ProcessController::spawn("cat", SpawnOptions::default()).unwrap();
        assert_eq!(ctl.command().program, "cat");

        let debug = format!("{ctl:?}");
        assert!(debug.contains("ProcessController"));
        assert!(debug.contains("cat"));

        ctl.stop();
        ctl.wait().await;
    }

    #[tokio::test]
    async fn panicking_subscriber_does_not_break_stream_handling() {
        let (tx, rx) = std_mpsc::channel();
        let ctl = ProcessController::spawn_with("cat", SpawnOptions::default(), |hub| {
            hub.on(EventKind::Data, |_| panic!("subscriber bug"));
            hub.on_any(move |event| {
                let _ = tx.send(event.clone());
            });
        })
        .unwrap();

        // The panicking subscriber fires on every data chunk; send must
        // still resolve and later events must still flow.
        let response = ctl
            .send("still alive DONE", "DONE", Some(Duration::from_secs(5)))
            .await
            .unwrap();
        assert!(response.contains("still alive"));

        ctl.stop();
        ctl.wait().await;
        let events: Vec<ProcessEvent> = rx.try_iter().collect();
        assert_eq!(events.last(), Some(&ProcessEvent::Exit(None)));
    }
}
