//! Configuration for tiller.
//!
//! Provides a TOML-based config file at `~/.config/tiller/config.toml` and a
//! resolution chain: CLI flag > env var > config file > default.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use tiller_core::DEFAULT_TERMINATOR;

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

/// On-disk config. Every key is optional; the resolution chain fills in
/// whatever the file leaves out.
#[derive(Debug, Default, Deserialize)]
pub struct ConfigFile {
    pub terminator: Option<String>,
    /// Per-send timeout in milliseconds. 0 means wait indefinitely.
    pub timeout_ms: Option<u64>,
    /// Delay before the first send, in milliseconds.
    pub settle_ms: Option<u64>,
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the tiller config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/tiller` or `~/.config/tiller`.
/// We intentionally ignore the platform-specific `dirs::config_dir()`
/// (which returns `~/Library/Application Support` on macOS).
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("tiller");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("tiller")
}

/// Return the path to the tiller config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read
// -----------------------------------------------------------------------

/// Load and parse the config file. An absent file is `Ok(None)`; a file
/// that exists but cannot be read or parsed is an error.
pub fn load_config() -> Result<Option<ConfigFile>> {
    let path = config_path();
    let contents = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(e)
                .with_context(|| format!("failed to read config file at {}", path.display()));
        }
    };
    let config = toml::from_str(&contents)
        .with_context(|| format!("failed to parse config file at {}", path.display()))?;
    Ok(Some(config))
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Fully resolved session parameters for `drive`.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub terminator: String,
    /// `None` means wait indefinitely.
    pub timeout: Option<Duration>,
    pub settle: Duration,
}

impl SessionConfig {
    /// Resolve configuration using the chain: CLI flag > env var > config
    /// file > default.
    ///
    /// - Terminator: flag > `TILLER_TERMINATOR` > file `terminator` > `"DONE"`
    /// - Timeout: flag > `TILLER_TIMEOUT_MS` > file `timeout_ms` > 0 (none)
    /// - Settle: flag > `TILLER_SETTLE_MS` > file `settle_ms` > 0
    pub fn resolve(
        flag_terminator: Option<&str>,
        flag_timeout_ms: Option<u64>,
        flag_settle_ms: Option<u64>,
    ) -> Result<Self> {
        let file = load_config()?.unwrap_or_default();

        let terminator = if let Some(t) = flag_terminator {
            t.to_string()
        } else if let Ok(t) = std::env::var("TILLER_TERMINATOR") {
            t
        } else if let Some(t) = file.terminator {
            t
        } else {
            DEFAULT_TERMINATOR.to_string()
        };

        let timeout_ms = if let Some(ms) = flag_timeout_ms {
            ms
        } else if let Ok(raw) = std::env::var("TILLER_TIMEOUT_MS") {
            raw.parse()
                .context("TILLER_TIMEOUT_MS is not a valid integer")?
        } else {
            file.timeout_ms.unwrap_or(0)
        };

        let settle_ms = if let Some(ms) = flag_settle_ms {
            ms
        } else if let Ok(raw) = std::env::var("TILLER_SETTLE_MS") {
            raw.parse()
                .context("TILLER_SETTLE_MS is not a valid integer")?
        } else {
            file.settle_ms.unwrap_or(0)
        };

        Ok(Self {
            terminator,
            timeout: (timeout_ms > 0).then(|| Duration::from_millis(timeout_ms)),
            settle: Duration::from_millis(settle_ms),
        })
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------
