// src/state/snapshot.rs

//! Point-in-time, read-only view of the state store.
//!
//! Entities are shared through `Arc`, so taking a snapshot copies pointers
//! only. The termination policy and the log stream manager read the same
//! snapshot after each fold.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::scope::{ScopeTarget, WatchedScope};
use super::task::{TaskLifecycle, TaskStatus};
use crate::nomad::model::{Allocation, Deployment, Evaluation, Job, TaskState};

#[derive(Debug, Clone)]
pub struct Snapshot {
    scope: Arc<WatchedScope>,
    job: Option<Arc<Job>>,
    job_purged: bool,
    evaluations: BTreeMap<String, Arc<Evaluation>>,
    allocations: BTreeMap<String, Arc<Allocation>>,
    deployments: BTreeMap<String, Arc<Deployment>>,
    revision: u64,
}

/// One task of one in-scope allocation.
#[derive(Debug, Clone, Copy)]
pub struct ScopedTask<'a> {
    pub alloc: &'a Allocation,
    pub name: &'a str,
    pub state: &'a TaskState,
    pub lifecycle: TaskLifecycle,
}

impl ScopedTask<'_> {
    pub fn status(&self) -> TaskStatus {
        TaskStatus::of(self.state)
    }
}

impl PartialEq for Snapshot {
    /// Compares the projected data; the scope and revision counter are not
    /// part of the state.
    fn eq(&self, other: &Self) -> bool {
        self.job == other.job
            && self.job_purged == other.job_purged
            && self.evaluations == other.evaluations
            && self.allocations == other.allocations
            && self.deployments == other.deployments
    }
}

impl Snapshot {
    pub(crate) fn new(
        scope: Arc<WatchedScope>,
        job: Option<Arc<Job>>,
        job_purged: bool,
        evaluations: BTreeMap<String, Arc<Evaluation>>,
        allocations: BTreeMap<String, Arc<Allocation>>,
        deployments: BTreeMap<String, Arc<Deployment>>,
        revision: u64,
    ) -> Self {
        Self {
            scope,
            job,
            job_purged,
            evaluations,
            allocations,
            deployments,
            revision,
        }
    }

    pub fn scope(&self) -> &WatchedScope {
        &self.scope
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn job(&self) -> Option<&Job> {
        self.job.as_deref()
    }

    pub fn job_purged(&self) -> bool {
        self.job_purged
    }

    pub fn evaluation(&self, id: &str) -> Option<&Evaluation> {
        self.evaluations.get(id).map(Arc::as_ref)
    }

    pub fn evaluations(&self) -> impl Iterator<Item = &Evaluation> {
        self.evaluations.values().map(Arc::as_ref)
    }

    pub fn allocation(&self, id: &str) -> Option<&Allocation> {
        self.allocations.get(id).map(Arc::as_ref)
    }

    /// Every admitted allocation, replaced ones included.
    pub fn allocations(&self) -> impl Iterator<Item = &Allocation> {
        self.allocations.values().map(Arc::as_ref)
    }

    pub fn deployments(&self) -> impl Iterator<Item = &Deployment> {
        self.deployments.values().map(Arc::as_ref)
    }

    /// Allocations the watch currently follows, oldest first.
    ///
    /// For a job scope an allocation drops out once the allocation that
    /// replaced it is known.
    pub fn allocations_in_scope(&self) -> Vec<&Allocation> {
        let mut allocs: Vec<&Allocation> = match &self.scope.target {
            ScopeTarget::Allocation { alloc_id, .. } => {
                self.allocation(alloc_id).into_iter().collect()
            }
            ScopeTarget::Job { .. } => self
                .allocations()
                .filter(|a| {
                    a.next_allocation.is_empty()
                        || !self.allocations.contains_key(&a.next_allocation)
                })
                .collect(),
        };
        allocs.sort_by(|a, b| a.create_index.cmp(&b.create_index).then(a.id.cmp(&b.id)));
        allocs
    }

    /// No admitted allocation is pending or running.
    pub fn no_pending_or_running(&self) -> bool {
        !self.allocations().any(Allocation::is_pending_or_running)
    }

    /// The job is dead (or purged) and nothing of it is pending or running.
    pub fn is_job_dead(&self) -> bool {
        let dead = self.job_purged || self.job().is_some_and(Job::is_dead);
        dead && self.no_pending_or_running()
    }

    pub fn has_pending_evaluations(&self) -> bool {
        self.evaluations().any(Evaluation::is_pending)
    }

    pub fn has_active_deployments(&self) -> bool {
        self.deployments().any(Deployment::is_active)
    }

    /// Dead, with no evaluation or deployment left to act on it.
    pub fn is_job_settled(&self) -> bool {
        self.is_job_dead() && !self.has_pending_evaluations() && !self.has_active_deployments()
    }

    /// The watched allocation reached a terminal client status.
    pub fn target_allocation_finished(&self) -> bool {
        self.scope
            .alloc_id()
            .and_then(|id| self.allocation(id))
            .is_some_and(Allocation::is_finished)
    }

    pub fn lifecycle_of(&self, alloc: &Allocation, task: &str) -> TaskLifecycle {
        let definition = alloc.job.as_ref().or(self.job.as_deref());
        definition
            .and_then(|job| job.task_group(&alloc.task_group))
            .and_then(|group| group.tasks.iter().find(|t| t.name == task))
            .map(|t| TaskLifecycle::from_spec(t.lifecycle.as_ref()))
            .unwrap_or(TaskLifecycle::Main)
    }

    /// Tasks of in-scope allocations that pass the task filter, ordered by
    /// allocation then task name.
    pub fn tasks_in_scope(&self) -> Vec<ScopedTask<'_>> {
        let mut out = Vec::new();
        for alloc in self.allocations_in_scope() {
            let mut names: Vec<&String> = alloc.task_states.keys().collect();
            names.sort();
            for name in names {
                if !self.scope.task_matches(name) {
                    continue;
                }
                out.push(ScopedTask {
                    alloc,
                    name,
                    state: &alloc.task_states[name],
                    lifecycle: self.lifecycle_of(alloc, name),
                });
            }
        }
        out
    }

    pub fn main_task_statuses(&self) -> Vec<TaskStatus> {
        self.tasks_in_scope()
            .iter()
            .filter(|t| t.lifecycle.is_main())
            .map(ScopedTask::status)
            .collect()
    }

    /// Every task group has a newest in-scope allocation whose main tasks
    /// have all started. A job without task groups never counts as started.
    pub fn main_tasks_started(&self) -> bool {
        let Some(job) = self.job() else {
            return false;
        };
        if job.task_groups.is_empty() {
            return false;
        }
        let in_scope = self.allocations_in_scope();
        job.task_groups.iter().all(|group| {
            let newest = in_scope
                .iter()
                .filter(|a| a.task_group == group.name)
                .max_by_key(|a| (a.create_index, a.modify_index));
            let Some(alloc) = newest else {
                return false;
            };
            group
                .tasks
                .iter()
                .filter(|t| TaskLifecycle::from_spec(t.lifecycle.as_ref()).is_main())
                .all(|t| {
                    alloc
                        .task_states
                        .get(&t.name)
                        .is_some_and(TaskState::was_started)
                })
        })
    }

    /// At least one main task is in scope and all of them are terminal.
    pub fn main_tasks_terminal(&self) -> bool {
        let statuses = self.main_task_statuses();
        !statuses.is_empty() && statuses.iter().all(|s| s.is_terminal())
    }
}
