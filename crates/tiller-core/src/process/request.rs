//! Pending-request tracking for the `send` primitive.
//!
//! A [`PendingRequest`] is the transient stdout observer created per `send`
//! call: it accumulates chunks, decides completion (terminator first, then
//! the error heuristic), and resolves the caller exactly once through a
//! oneshot channel. Resolution consumes the request, so a completed request
//! cannot be re-triggered by later chunks.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::oneshot;

use super::heuristic::ErrorHeuristic;

/// Ways a `send` call can fail.
#[derive(Debug, Error)]
pub enum SendError {
    /// The deadline elapsed before the terminator or an error match.
    #[error("timed out waiting for terminator")]
    Timeout,

    /// A stdout chunk matched the error heuristic. Carries the chunk that
    /// triggered the match.
    #[error("command reported an error: {chunk}")]
    CommandFailed { chunk: String },

    /// A stream-level I/O error occurred while the request was outstanding.
    #[error("stream error: {message}")]
    Stream { message: String },

    /// The process exited or was stopped before the request completed.
    #[error("process terminated")]
    ProcessTerminated,

    /// Writing the request line to the child's stdin failed.
    #[error("failed to write to stdin")]
    Stdin(#[source] std::io::Error),
}

/// The outcome delivered to a `send` caller.
pub(crate) type SendOutcome = Result<String, SendError>;

/// Accumulates stdout chunks for one outstanding request and decides when
/// the request is complete.
pub(crate) struct ResponseCollector {
    terminator: String,
    heuristic: Arc<dyn ErrorHeuristic>,
    buffer: String,
}

impl ResponseCollector {
    pub(crate) fn new(terminator: impl Into<String>, heuristic: Arc<dyn ErrorHeuristic>) -> Self {
        Self {
            terminator: terminator.into(),
            heuristic,
            buffer: String::new(),
        }
    }

    /// Absorb one stdout chunk. Returns `Some(outcome)` when the request
    /// completes, `None` while it is still waiting.
    ///
    /// Checks run in a fixed order: the terminator is looked up in the whole
    /// accumulated buffer (so a terminator split across chunk boundaries
    /// still matches), then the heuristic is applied to the single chunk.
    /// On success the outcome carries the full accumulated buffer, including
    /// the terminator text.
    pub(crate) fn absorb(&mut self, chunk: &str) -> Option<SendOutcome> {
        self.buffer.push_str(chunk);

        if self.buffer.contains(&self.terminator) {
            return Some(Ok(std::mem::take(&mut self.buffer)));
        }
        if self.heuristic.matches(chunk) {
            return Some(Err(SendError::CommandFailed {
                chunk: chunk.to_string(),
            }));
        }
        None
    }
}

/// One outstanding `send` request: a collector plus the channel that wakes
/// the suspended caller.
pub(crate) struct PendingRequest {
    collector: ResponseCollector,
    resolver: oneshot::Sender<SendOutcome>,
}

impl PendingRequest {
    /// Create a request and the receiver its caller will await.
    pub(crate) fn new(
        terminator: impl Into<String>,
        heuristic: Arc<dyn ErrorHeuristic>,
    ) -> (Self, oneshot::Receiver<SendOutcome>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                collector: ResponseCollector::new(terminator, heuristic),
                resolver: tx,
            },
            rx,
        )
    }

    /// Feed one stdout chunk. If the chunk completes the request, the caller
    /// is resolved and `None` is returned; otherwise the request comes back
    /// to stay installed.
    pub(crate) fn absorb(mut self, chunk: &str) -> Option<Self> {
        match self.collector.absorb(chunk) {
            Some(outcome) => {
                // The caller may have given up (timeout path took the
                // receiver); a failed send here is fine.
                let _ = self.resolver.send(outcome);
                None
            }
            None => Some(self),
        }
    }

    /// Resolve the request as failed, consuming it.
    pub(crate) fn fail(self, error: SendError) {
        let _ = self.resolver.send(Err(error));
    }
}
