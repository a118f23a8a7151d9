//! Shared test utilities for tiller integration tests.
//!
//! Provides fake interactive executables: small shell scripts written to a
//! temp directory and marked executable, used as stand-ins for the real
//! interactive tools tiller drives. Keeping script creation here spares
//! every test the write-then-chmod boilerplate.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// A fake executable script on disk. The backing temp directory lives as
/// long as this value does.
pub struct FakeScript {
    path: PathBuf,
    /// Held to keep the directory (and the script) alive.
    _dir: TempDir,
}

impl FakeScript {
    /// Absolute path to the script.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path as a `&str`, for building command lines.
    pub fn path_str(&self) -> &str {
        self.path.to_str().expect("temp paths are valid UTF-8")
    }
}

/// Write `body` as an executable `/bin/sh` script named `name` in a fresh
/// temp directory.
///
/// The shebang line is prepended; `body` is the script proper.
pub fn fake_script(name: &str, body: &str) -> FakeScript {
    let dir = tempfile::tempdir().expect("failed to create temp directory");
    let path = dir.path().join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}")).expect("failed to write script");

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
            .expect("failed to mark script executable");
    }

    FakeScript { path, _dir: dir }
}

/// A responder that acknowledges every stdin line and appends `terminator`.
///
/// For each line read it prints `ack: <line>` followed by the terminator on
/// its own line, then keeps reading.
pub fn acking_responder(terminator: &str) -> FakeScript {
    fake_script(
        "acking_responder.sh",
        &format!("while read line; do\n  echo \"ack: $line\"\n  echo \"{terminator}\"\ndone\n"),
    )
}

/// A responder that consumes stdin and never answers. Useful for timeout
/// and cancellation tests.
///
/// Built from shell builtins only, so the script spawns no children that
/// could outlive it and hold the output pipes open.
pub fn silent_responder() -> FakeScript {
    fake_script("silent_responder.sh", "while read line; do :; done\n")
}
