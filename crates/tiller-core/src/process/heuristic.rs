//! The `ErrorHeuristic` trait -- the policy deciding whether a stdout chunk
//! looks like a command failure.
//!
//! Interactive shells have no structured error channel, so `send` falls back
//! to guessing from output text. The guess is a policy seam, not protocol
//! truth: the default rule below false-positives on legitimate output that
//! happens to contain `"error"`, and callers with better knowledge of their
//! child's output can substitute their own rule via
//! [`super::SpawnOptions::heuristic`].

/// Policy for classifying a stdout chunk as a command failure.
///
/// Checked per chunk, after the terminator check, while a `send` request is
/// outstanding. The trait is object-safe so a controller can hold it as
/// `Arc<dyn ErrorHeuristic>`.
pub trait ErrorHeuristic: Send + Sync {
    /// Return `true` if `chunk` should fail the outstanding request.
    fn matches(&self, chunk: &str) -> bool;
}

/// The default rule: the chunk, lowercased, contains `"error"` at a position
/// strictly after index 0.
///
/// A chunk beginning with `"Error: ..."` does not trip the rule; one reading
/// `"fatal error: ..."` does. Only the first occurrence is considered.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubstringErrorHeuristic;

impl ErrorHeuristic for SubstringErrorHeuristic {
    fn matches(&self, chunk: &str) -> bool {
        match chunk.to_lowercase().find("error") {
            Some(pos) => pos > 0,
            None => false,
        }
    }
}

// Compile-time assertion: ErrorHeuristic must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn ErrorHeuristic) {}
};
