//! Core library for tiller: drive interactive subprocesses over stdio.
//!
//! Two pieces make up the crate. The [`hub`] module is a synchronous
//! publish/subscribe registry for typed process lifecycle events. The
//! [`process`] module spawns and supervises child processes, publishes
//! their lifecycle through a hub, and layers a send-line/await-terminator
//! request primitive over the raw output stream. One-shot execution (no
//! interaction, collect output) lives in [`process::exec`].

pub mod hub;
pub mod process;

pub use hub::{EventHub, EventKind, ProcessEvent, SubscriptionId};
pub use process::{
    CommandLine, DEFAULT_TERMINATOR, ErrorHeuristic, ProcessController, RunError, RunOptions,
    SendError, SpawnError, SpawnOptions, SubstringErrorHeuristic, run,
};
