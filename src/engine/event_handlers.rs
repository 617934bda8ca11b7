// src/engine/event_handlers.rs

//! Event handling logic for the core watch.

use crate::engine::policy::{Finish, PolicyOptions, PurgePolicy, WatchMode, done_predicate};
use crate::state::Snapshot;

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreCommand {
    /// Send a stop request for the watched job. The shell resolves the
    /// purge policy against the job summary and reports back with
    /// `StopIssued`.
    StopJob { purge: PurgePolicy },
    /// The watch is done.
    RequestExit(Finish),
}

/// Decision returned by the core after handling a single event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreStep {
    pub commands: Vec<CoreCommand>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

impl CoreStep {
    fn running(commands: Vec<CoreCommand>) -> Self {
        Self {
            commands,
            keep_running: true,
        }
    }

    fn idle() -> Self {
        Self::running(Vec::new())
    }

    fn exit(finish: Finish) -> Self {
        Self {
            commands: vec![CoreCommand::RequestExit(finish)],
            keep_running: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Evaluating the mode predicate after every snapshot.
    Watching,
    /// A stop request is in flight. `then` is the finish reported once it
    /// completes, when the stop followed DONE.
    Stopping { then: Option<Finish> },
    Done(Finish),
}

/// Mutable core state shared by the handlers.
#[derive(Debug, Clone)]
pub struct WatchState {
    pub phase: Phase,
    pub awaiting_purge: bool,
    pub stop_issued: bool,
    pub interrupts: u32,
    pub saw_allocation: bool,
}

impl Default for WatchState {
    fn default() -> Self {
        Self {
            phase: Phase::Watching,
            awaiting_purge: false,
            stop_issued: false,
            interrupts: 0,
            saw_allocation: false,
        }
    }
}

impl WatchState {
    pub fn is_done(&self) -> bool {
        matches!(self.phase, Phase::Done(_))
    }

    fn stop(&mut self, purge: PurgePolicy, then: Option<Finish>) -> CoreStep {
        self.stop_issued = true;
        self.phase = Phase::Stopping { then };
        CoreStep::running(vec![CoreCommand::StopJob { purge }])
    }

    fn done(&mut self, finish: Finish) -> CoreStep {
        self.phase = Phase::Done(finish);
        CoreStep::exit(finish)
    }

    /// DONE was reached; run the post-DONE stop when the mode has one.
    fn complete(&mut self, options: &PolicyOptions, finish: Finish) -> CoreStep {
        if options.stops_after_done() && !self.stop_issued {
            return self.stop(options.purge, Some(finish));
        }
        self.done(finish)
    }
}

/// The watch began. Stop modes send their request right away.
pub fn handle_started(state: &mut WatchState, options: &PolicyOptions) -> CoreStep {
    if options.mode.stops_on_entry() && !state.stop_issued {
        return state.stop(options.purge, None);
    }
    CoreStep::idle()
}

/// A new snapshot is available.
pub fn handle_snapshot(state: &mut WatchState, options: &PolicyOptions, snap: &Snapshot) -> CoreStep {
    if snap.allocations().next().is_some() {
        state.saw_allocation = true;
    }
    match state.phase {
        Phase::Done(_) => CoreStep {
            commands: Vec::new(),
            keep_running: false,
        },
        Phase::Stopping { .. } => CoreStep::idle(),
        Phase::Watching => {
            // A purge that was asked for is waited on even under --all.
            if options.all && !state.awaiting_purge {
                return CoreStep::idle();
            }
            match done_predicate(options.mode, snap, state.awaiting_purge) {
                Some(finish) => state.complete(options, finish),
                None => CoreStep::idle(),
            }
        }
    }
}

/// The stop request returned. `purged` tells whether it asked for a purge.
pub fn handle_stop_issued(state: &mut WatchState, purged: bool) -> CoreStep {
    let Phase::Stopping { then } = state.phase else {
        return CoreStep::idle();
    };
    state.awaiting_purge = purged;
    match then {
        Some(finish) if !purged => state.done(finish),
        _ => {
            state.phase = Phase::Watching;
            CoreStep::idle()
        }
    }
}

/// User interrupt. In `run` mode the first one stops the job and keeps
/// watching; any other interrupt ends the watch.
pub fn handle_interrupt(state: &mut WatchState, options: &PolicyOptions) -> CoreStep {
    state.interrupts += 1;
    if state.is_done() {
        return CoreStep {
            commands: Vec::new(),
            keep_running: false,
        };
    }
    let stops_job = options.mode == WatchMode::Run && !options.detach;
    if stops_job && !state.stop_issued && state.interrupts == 1 {
        return state.stop(options.purge, None);
    }
    state.done(Finish::Interrupted)
}

/// The `--no-follow` timer elapsed.
pub fn handle_no_follow(state: &mut WatchState, options: &PolicyOptions) -> CoreStep {
    match state.phase {
        Phase::Done(_) => CoreStep {
            commands: Vec::new(),
            keep_running: false,
        },
        Phase::Stopping { .. } => CoreStep::idle(),
        Phase::Watching => state.complete(options, Finish::NoFollow),
    }
}
