// src/engine/core.rs

//! Pure core watch state machine.
//!
//! `CoreWatch` consumes [`CoreEvent`]s and produces:
//! - an updated phase
//! - a list of commands describing what the IO shell should do next
//!
//! The async shell (`engine::runtime`) folds notifications into the state
//! store, drives the log manager, sends stop requests and handles Ctrl-C.
//! The core has no channels, no Tokio types, and performs no IO, so it can
//! be tested with hand-built snapshots.

use crate::engine::event_handlers::{
    CoreStep, Phase, WatchState, handle_interrupt, handle_no_follow, handle_snapshot,
    handle_started, handle_stop_issued,
};
use crate::engine::policy::{Finish, PolicyOptions};
use crate::state::Snapshot;

/// Input of one core step.
#[derive(Debug, Clone, Copy)]
pub enum CoreEvent<'a> {
    /// The watch began; nothing is known yet.
    Started,
    /// The store changed.
    Snapshot(&'a Snapshot),
    /// A stop request returned successfully.
    StopIssued { purged: bool },
    Interrupted,
    NoFollowElapsed,
}

#[derive(Debug)]
pub struct CoreWatch {
    options: PolicyOptions,
    state: WatchState,
}

impl CoreWatch {
    pub fn new(options: PolicyOptions) -> Self {
        Self {
            options,
            state: WatchState::default(),
        }
    }

    pub fn options(&self) -> &PolicyOptions {
        &self.options
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    pub fn finish(&self) -> Option<Finish> {
        match self.state.phase {
            Phase::Done(finish) => Some(finish),
            _ => None,
        }
    }

    pub fn is_done(&self) -> bool {
        self.state.is_done()
    }

    /// At least one interrupt was received.
    pub fn interrupted(&self) -> bool {
        self.state.interrupts > 0
    }

    /// Some snapshot held at least one allocation.
    pub fn saw_allocation(&self) -> bool {
        self.state.saw_allocation
    }

    /// A purge was requested and the watch waits to observe it.
    pub fn awaiting_purge(&self) -> bool {
        self.state.awaiting_purge
    }

    pub fn step(&mut self, event: CoreEvent<'_>) -> CoreStep {
        match event {
            CoreEvent::Started => handle_started(&mut self.state, &self.options),
            CoreEvent::Snapshot(snap) => handle_snapshot(&mut self.state, &self.options, snap),
            CoreEvent::StopIssued { purged } => handle_stop_issued(&mut self.state, purged),
            CoreEvent::Interrupted => handle_interrupt(&mut self.state, &self.options),
            CoreEvent::NoFollowElapsed => handle_no_follow(&mut self.state, &self.options),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::policy::{PurgePolicy, WatchMode};
    use crate::engine::CoreCommand;
    use crate::nomad::model::{Allocation, ClientStatus, Job, JobStatus};
    use crate::source::Notification;
    use crate::state::{StateStore, WatchedScope};

    fn job(status: JobStatus, index: u64) -> Job {
        Job {
            id: "web".into(),
            namespace: "default".into(),
            status,
            modify_index: index,
            ..Default::default()
        }
    }

    fn store_with(status: JobStatus, alloc_status: ClientStatus) -> StateStore {
        let mut store = StateStore::with_job(WatchedScope::job("default", "web"), job(status, 1));
        store.apply(Notification::allocation(Allocation {
            id: "a".into(),
            namespace: "default".into(),
            job_id: "web".into(),
            client_status: alloc_status,
            job_version: Some(0),
            modify_index: 2,
            ..Default::default()
        }));
        store
    }

    #[test]
    fn job_mode_finishes_on_dead_job() {
        let mut core = CoreWatch::new(PolicyOptions::new(WatchMode::Job));
        assert!(core.step(CoreEvent::Started).commands.is_empty());

        let live = store_with(JobStatus::Running, ClientStatus::Running).snapshot();
        assert!(core.step(CoreEvent::Snapshot(&live)).keep_running);

        let dead = store_with(JobStatus::Dead, ClientStatus::Complete).snapshot();
        let step = core.step(CoreEvent::Snapshot(&dead));
        assert!(!step.keep_running);
        assert_eq!(step.commands, vec![CoreCommand::RequestExit(Finish::Completed)]);
        assert!(core.saw_allocation());
    }

    #[test]
    fn stop_mode_stops_first_then_watches() {
        let mut opts = PolicyOptions::new(WatchMode::Stop);
        opts.purge = PurgePolicy::Always;
        let mut core = CoreWatch::new(opts);
        let step = core.step(CoreEvent::Started);
        assert_eq!(
            step.commands,
            vec![CoreCommand::StopJob {
                purge: PurgePolicy::Always
            }]
        );

        core.step(CoreEvent::StopIssued { purged: true });
        assert!(core.awaiting_purge());

        // Dead is not enough once a purge was requested.
        let dead = store_with(JobStatus::Dead, ClientStatus::Complete).snapshot();
        assert!(core.step(CoreEvent::Snapshot(&dead)).keep_running);

        let mut store = store_with(JobStatus::Dead, ClientStatus::Complete);
        store.apply(Notification::job_deregistered(job(JobStatus::Dead, 1), 10));
        let step = core.step(CoreEvent::Snapshot(&store.snapshot()));
        assert!(!step.keep_running);
    }

    #[test]
    fn run_mode_stops_after_done() {
        let mut core = CoreWatch::new(PolicyOptions::new(WatchMode::Run));
        let dead = store_with(JobStatus::Dead, ClientStatus::Complete).snapshot();
        let step = core.step(CoreEvent::Snapshot(&dead));
        assert!(step.keep_running);
        assert!(matches!(step.commands[..], [CoreCommand::StopJob { .. }]));

        let step = core.step(CoreEvent::StopIssued { purged: false });
        assert!(!step.keep_running);
        assert_eq!(core.finish(), Some(Finish::Completed));
    }

    #[test]
    fn run_mode_first_interrupt_stops_second_aborts() {
        let mut core = CoreWatch::new(PolicyOptions::new(WatchMode::Run));
        let step = core.step(CoreEvent::Interrupted);
        assert!(step.keep_running);
        assert!(matches!(step.commands[..], [CoreCommand::StopJob { .. }]));

        let step = core.step(CoreEvent::Interrupted);
        assert!(!step.keep_running);
        assert_eq!(core.finish(), Some(Finish::Interrupted));
        assert!(!core.saw_allocation());
    }

    #[test]
    fn all_flag_never_finishes_by_predicate() {
        let mut opts = PolicyOptions::new(WatchMode::Job);
        opts.all = true;
        let mut core = CoreWatch::new(opts);
        let dead = store_with(JobStatus::Dead, ClientStatus::Complete).snapshot();
        assert!(core.step(CoreEvent::Snapshot(&dead)).keep_running);
        assert!(!core.step(CoreEvent::Interrupted).keep_running);
    }

    #[test]
    fn no_follow_ends_the_watch() {
        let mut core = CoreWatch::new(PolicyOptions::new(WatchMode::Job));
        let step = core.step(CoreEvent::NoFollowElapsed);
        assert_eq!(step.commands, vec![CoreCommand::RequestExit(Finish::NoFollow)]);
    }
}
