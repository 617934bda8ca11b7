// src/engine/mod.rs

//! Watch engine for nomad-watch.
//!
//! This module ties together:
//! - the termination policy of each watch mode
//! - the exit status aggregator
//! - the runtime event loop that reacts to:
//!   - change notifications from the event source
//!   - a fatal event source failure
//!   - user interrupts
//!   - the `--no-follow` timer
//!
//! The pure core state machine lives in [`core`]; the async/IO shell is
//! implemented in [`runtime`].

use crate::errors::WatchError;
use crate::source::Notification;

/// Events flowing into the runtime from the event source, signals and timers.
#[derive(Debug)]
pub enum WatchEvent {
    /// One batch of changes, in delivery order. The first batch of every
    /// (re)connection is a full listing.
    Notifications(Vec<Notification>),
    /// The event source gave up.
    SourceFailed(WatchError),
    /// Ctrl-C.
    Interrupted,
    NoFollowElapsed,
}

pub mod core;
pub mod event_handlers;
pub mod exit_code;
pub mod policy;
pub mod runtime;

pub use core::{CoreEvent, CoreWatch};
pub use event_handlers::{CoreCommand, CoreStep, Phase};
pub use exit_code::{ExitContext, aggregate, exit_code};
pub use policy::{Finish, PolicyOptions, PurgePolicy, WatchMode};
pub use runtime::{WatchOutcome, WatchPlan, WatchRuntime, run_watch};
