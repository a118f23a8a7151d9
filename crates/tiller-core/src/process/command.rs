//! Command-line splitting and spawn options.
//!
//! A command line is split into a program and an ordered argument list on
//! whitespace. There is no quoting or escaping support: a caller that needs
//! spaces inside an argument must either do its own shell-level quoting
//! (e.g. wrap the whole thing in `sh -c '...'`) or pass an explicit list
//! via [`SpawnOptions::args`].

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use super::SpawnError;
use super::heuristic::{ErrorHeuristic, SubstringErrorHeuristic};

/// A parsed shell-style command line: one program token plus its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    /// The executable name or path (the first whitespace token).
    pub program: String,
    /// The remaining tokens, in order.
    pub args: Vec<String>,
}

impl CommandLine {
    /// Split `cmdline` on whitespace into a program and arguments.
    ///
    /// Runs of whitespace collapse; they never produce empty arguments.
    ///
    /// # Errors
    ///
    /// Returns [`SpawnError::EmptyCommandLine`] if `cmdline` contains no
    /// tokens at all.
    pub fn parse(cmdline: &str) -> Result<Self, SpawnError> {
        let mut tokens = cmdline.split_whitespace();
        let program = tokens
            .next()
            .ok_or(SpawnError::EmptyCommandLine)?
            .to_string();
        let args = tokens.map(str::to_string).collect();
        Ok(Self { program, args })
    }
}

impl std::fmt::Display for CommandLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Options applied when spawning an interactive process.
///
/// All fields have usable defaults; construct with `SpawnOptions::default()`
/// and override what you need.
#[derive(Clone)]
pub struct SpawnOptions {
    /// Working directory for the child. Inherited when `None`.
    pub cwd: Option<PathBuf>,
    /// Environment variables merged into the child's environment.
    pub env: HashMap<String, String>,
    /// Explicit argument list, overriding the whitespace split of the
    /// command line (only the program token is kept).
    pub args: Option<Vec<String>>,
    /// Policy deciding whether a stdout chunk fails an outstanding `send`.
    pub heuristic: Arc<dyn ErrorHeuristic>,
    /// How long `stop` waits after SIGTERM before force-killing the child.
    pub stop_grace: Duration,
}

impl Default for SpawnOptions {
    fn default() -> Self {
        Self {
            cwd: None,
            env: HashMap::new(),
            args: None,
            heuristic: Arc::new(SubstringErrorHeuristic),
            stop_grace: Duration::from_secs(5),
        }
    }
}

impl std::fmt::Debug for SpawnOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpawnOptions")
            .field("cwd", &self.cwd)
            .field("env", &self.env.keys().collect::<Vec<_>>())
            .field("args", &self.args)
            .field("stop_grace", &self.stop_grace)
            .finish()
    }
}
