// src/engine/policy.rs

//! Termination Policy: one DONE predicate per watch mode, plus the stop and
//! purge side effects each mode carries.

use crate::cli::WatchCommand;
use crate::config::WatchSettings;
use crate::nomad::model::TaskGroupSummary;
use crate::state::Snapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchMode {
    Alloc,
    Job,
    Run,
    Start,
    Started,
    Stop,
    Stopped,
    Purge,
}

impl WatchMode {
    pub fn from_command(command: &WatchCommand) -> Self {
        match command {
            WatchCommand::Alloc { .. } => WatchMode::Alloc,
            WatchCommand::Run { .. } => WatchMode::Run,
            WatchCommand::Job { .. } => WatchMode::Job,
            WatchCommand::Start { .. } => WatchMode::Start,
            WatchCommand::Started { .. } => WatchMode::Started,
            WatchCommand::Stop { .. } => WatchMode::Stop,
            WatchCommand::Stopped { .. } => WatchMode::Stopped,
            WatchCommand::Purge { .. } => WatchMode::Purge,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WatchMode::Alloc => "alloc",
            WatchMode::Job => "job",
            WatchMode::Run => "run",
            WatchMode::Start => "start",
            WatchMode::Started => "started",
            WatchMode::Stop => "stop",
            WatchMode::Stopped => "stopped",
            WatchMode::Purge => "purge",
        }
    }

    /// Modes that register the job file before watching.
    pub fn submits_job(self) -> bool {
        matches!(self, WatchMode::Run | WatchMode::Start)
    }

    /// Modes that finish once main tasks have started.
    pub fn waits_for_start(self) -> bool {
        matches!(self, WatchMode::Start | WatchMode::Started)
    }

    /// Modes that send a stop request as soon as the watch begins.
    pub fn stops_on_entry(self) -> bool {
        matches!(self, WatchMode::Stop | WatchMode::Purge)
    }

    /// Human description of what ends the watch, for the startup log line.
    pub fn until(self) -> &'static str {
        match self {
            WatchMode::Alloc => "until it is finished",
            WatchMode::Start | WatchMode::Started => "until it is started",
            WatchMode::Stopped => "until it has no pending or running allocations",
            _ => "until it is finished",
        }
    }
}

/// When a stop request should also purge the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurgePolicy {
    Never,
    Always,
    /// Purge when the job summary shows only completed allocations.
    IfFinishedSuccessfully,
    /// Purge when allocations are running and nothing failed. A dead job
    /// falls back to the finished check.
    IfRunningSuccessfully,
}

impl PurgePolicy {
    pub fn needs_summary(self) -> bool {
        matches!(
            self,
            PurgePolicy::IfFinishedSuccessfully | PurgePolicy::IfRunningSuccessfully
        )
    }

    pub fn allows(self, job_dead: bool, totals: &TaskGroupSummary) -> bool {
        match self {
            PurgePolicy::Never => false,
            PurgePolicy::Always => true,
            PurgePolicy::IfFinishedSuccessfully => job_dead && totals.finished_successfully(),
            PurgePolicy::IfRunningSuccessfully if job_dead => totals.finished_successfully(),
            PurgePolicy::IfRunningSuccessfully => totals.running_successfully(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyOptions {
    pub mode: WatchMode,
    /// Never finish by predicate.
    pub all: bool,
    pub detach: bool,
    pub purge: PurgePolicy,
}

impl PolicyOptions {
    pub fn new(mode: WatchMode) -> Self {
        Self {
            mode,
            all: false,
            detach: false,
            purge: PurgePolicy::Never,
        }
    }

    pub fn from_settings(mode: WatchMode, settings: &WatchSettings) -> Self {
        let purge = if settings.purge || mode == WatchMode::Purge {
            PurgePolicy::Always
        } else if settings.purge_successful {
            if mode.stops_on_entry() {
                PurgePolicy::IfRunningSuccessfully
            } else {
                PurgePolicy::IfFinishedSuccessfully
            }
        } else {
            PurgePolicy::Never
        };
        Self {
            mode,
            all: settings.all && mode != WatchMode::Alloc,
            detach: settings.detach,
            purge,
        }
    }

    /// Whether reaching DONE is followed by a stop request.
    pub fn stops_after_done(&self) -> bool {
        match self.mode {
            WatchMode::Run => !self.detach || self.purge != PurgePolicy::Never,
            WatchMode::Job | WatchMode::Stopped => self.purge != PurgePolicy::Never,
            _ => false,
        }
    }
}

/// Why the watch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finish {
    /// The mode's predicate held.
    Completed,
    /// `start`/`started`: every main task started.
    Started,
    /// `start`/`started`: the job died before its main tasks started.
    DiedBeforeStart,
    Interrupted,
    /// The `--no-follow` timer elapsed.
    NoFollow,
}

/// A purge was requested and is now visible: the job is gone and nothing
/// of it is left running or pending.
pub fn purge_observed(snap: &Snapshot) -> bool {
    snap.job_purged()
        && snap.no_pending_or_running()
        && !snap.has_pending_evaluations()
        && !snap.has_active_deployments()
}

/// Evaluate the DONE predicate of `mode` against `snap`.
///
/// `awaiting_purge` replaces job death with purge observation for the modes
/// that watch the whole job.
pub fn done_predicate(mode: WatchMode, snap: &Snapshot, awaiting_purge: bool) -> Option<Finish> {
    match mode {
        WatchMode::Alloc => snap.target_allocation_finished().then_some(Finish::Completed),
        WatchMode::Start | WatchMode::Started => {
            if snap.main_tasks_started() {
                Some(Finish::Started)
            } else if snap.is_job_settled() {
                Some(Finish::DiedBeforeStart)
            } else {
                None
            }
        }
        WatchMode::Stopped if !awaiting_purge => {
            snap.no_pending_or_running().then_some(Finish::Completed)
        }
        _ if awaiting_purge => purge_observed(snap).then_some(Finish::Completed),
        _ => snap.is_job_settled().then_some(Finish::Completed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nomad::model::{Allocation, ClientStatus, Job, JobStatus};
    use crate::source::Notification;
    use crate::state::{StateStore, WatchedScope};

    fn job(status: JobStatus) -> Job {
        Job {
            id: "web".into(),
            namespace: "default".into(),
            status,
            ..Default::default()
        }
    }

    fn alloc(id: &str, status: ClientStatus, index: u64) -> Allocation {
        Allocation {
            id: id.into(),
            namespace: "default".into(),
            job_id: "web".into(),
            task_group: "g".into(),
            client_status: status,
            job_version: Some(0),
            modify_index: index,
            ..Default::default()
        }
    }

    #[test]
    fn job_mode_needs_dead_job_and_no_live_allocations() {
        let mut store = StateStore::with_job(WatchedScope::job("default", "web"), job(JobStatus::Running));
        store.apply(Notification::allocation(alloc("a", ClientStatus::Running, 1)));
        assert_eq!(done_predicate(WatchMode::Job, &store.snapshot(), false), None);

        let mut dead = job(JobStatus::Dead);
        dead.modify_index = 5;
        store.apply(Notification::job(dead));
        assert_eq!(done_predicate(WatchMode::Job, &store.snapshot(), false), None);

        store.apply(Notification::allocation(alloc("a", ClientStatus::Complete, 2)));
        assert_eq!(
            done_predicate(WatchMode::Job, &store.snapshot(), false),
            Some(Finish::Completed)
        );
    }

    #[test]
    fn stopped_mode_ignores_job_status() {
        let mut store = StateStore::with_job(WatchedScope::job("default", "web"), job(JobStatus::Running));
        store.apply(Notification::allocation(alloc("a", ClientStatus::Failed, 1)));
        assert_eq!(
            done_predicate(WatchMode::Stopped, &store.snapshot(), false),
            Some(Finish::Completed)
        );
    }

    #[test]
    fn awaiting_purge_needs_deregistration() {
        let mut store = StateStore::with_job(WatchedScope::job("default", "web"), job(JobStatus::Dead));
        assert_eq!(done_predicate(WatchMode::Stop, &store.snapshot(), true), None);
        store.apply(Notification::job_deregistered(job(JobStatus::Dead), 9));
        assert_eq!(
            done_predicate(WatchMode::Stop, &store.snapshot(), true),
            Some(Finish::Completed)
        );
    }

    #[test]
    fn started_mode_reports_death_before_start() {
        let store = StateStore::with_job(WatchedScope::job("default", "web"), job(JobStatus::Dead));
        assert_eq!(
            done_predicate(WatchMode::Started, &store.snapshot(), false),
            Some(Finish::DiedBeforeStart)
        );
    }

    #[test]
    fn purge_policy_from_flags() {
        let mut settings = WatchSettings {
            purge_successful: true,
            ..Default::default()
        };
        assert_eq!(
            PolicyOptions::from_settings(WatchMode::Stop, &settings).purge,
            PurgePolicy::IfRunningSuccessfully
        );
        assert_eq!(
            PolicyOptions::from_settings(WatchMode::Run, &settings).purge,
            PurgePolicy::IfFinishedSuccessfully
        );
        settings.purge = true;
        assert_eq!(
            PolicyOptions::from_settings(WatchMode::Run, &settings).purge,
            PurgePolicy::Always
        );
        assert_eq!(
            PolicyOptions::from_settings(WatchMode::Purge, &WatchSettings::default()).purge,
            PurgePolicy::Always
        );
    }

    #[test]
    fn purge_policy_reads_summary() {
        let finished = TaskGroupSummary {
            complete: 2,
            ..Default::default()
        };
        let running = TaskGroupSummary {
            running: 1,
            ..Default::default()
        };
        assert!(PurgePolicy::IfFinishedSuccessfully.allows(true, &finished));
        assert!(!PurgePolicy::IfFinishedSuccessfully.allows(false, &finished));
        assert!(PurgePolicy::IfRunningSuccessfully.allows(false, &running));
        assert!(!PurgePolicy::IfRunningSuccessfully.allows(true, &running));
        assert!(!PurgePolicy::Never.allows(true, &finished));
    }

    #[test]
    fn run_mode_stops_unless_detached() {
        let mut opts = PolicyOptions::new(WatchMode::Run);
        assert!(opts.stops_after_done());
        opts.detach = true;
        assert!(!opts.stops_after_done());
        opts.purge = PurgePolicy::Always;
        assert!(opts.stops_after_done());
        assert!(!PolicyOptions::new(WatchMode::Job).stops_after_done());
    }
}
