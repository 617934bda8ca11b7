// src/state/store.rs

//! Single-writer projection of everything known about the watched scope.
//!
//! `apply` folds one notification. Each entity carries the index of the
//! last applied change; anything at or below it is ignored, so replaying or
//! reordering notifications for one entity cannot move it backwards.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::{debug, trace};

use super::scope::{ScopeTarget, WatchedScope};
use super::snapshot::Snapshot;
use crate::nomad::model::{Allocation, Deployment, Evaluation, Job, JobStatus, TaskState};
use crate::source::{EntityKind, Notification, Payload};

/// What `apply` did with a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// Index not newer than the last applied one for this entity.
    Stale,
    /// Different namespace, different job, or filtered by version.
    OutOfScope,
}

#[derive(Debug)]
pub struct StateStore {
    scope: Arc<WatchedScope>,
    job: Option<Arc<Job>>,
    job_purged: bool,
    evaluations: BTreeMap<String, Arc<Evaluation>>,
    allocations: BTreeMap<String, Arc<Allocation>>,
    deployments: BTreeMap<String, Arc<Deployment>>,
    indices: HashMap<(EntityKind, String), u64>,
    revision: u64,
}

impl StateStore {
    pub fn new(scope: WatchedScope) -> Self {
        Self {
            scope: Arc::new(scope),
            job: None,
            job_purged: false,
            evaluations: BTreeMap::new(),
            allocations: BTreeMap::new(),
            deployments: BTreeMap::new(),
            indices: HashMap::new(),
            revision: 0,
        }
    }

    /// Start from a job fetched while resolving the target. It becomes the
    /// version baseline for admission.
    pub fn with_job(scope: WatchedScope, job: Job) -> Self {
        let mut store = Self::new(scope);
        store.apply(Notification::job(job));
        store
    }

    pub fn scope(&self) -> &WatchedScope {
        &self.scope
    }

    /// Number of applied notifications so far.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn apply(&mut self, notification: Notification) -> ApplyOutcome {
        if let Some(ns) = notification.namespace() {
            if ns != self.scope.namespace {
                trace!(namespace = ns, id = %notification.entity_id, "ignoring other namespace");
                return ApplyOutcome::OutOfScope;
            }
        }

        let key = (notification.kind, notification.entity_id.clone());
        let known = self.indices.get(&key).copied();

        if let Payload::JobMissing = notification.payload {
            if notification.entity_id != self.scope.job_id() || self.job_purged {
                return ApplyOutcome::Stale;
            }
            self.mark_purged();
            return ApplyOutcome::Applied;
        }

        if let Some(last) = known {
            if notification.index <= last {
                return ApplyOutcome::Stale;
            }
        } else if !self.admits(&notification) {
            trace!(kind = ?notification.kind, id = %notification.entity_id, "not in scope");
            return ApplyOutcome::OutOfScope;
        }

        self.indices.insert(key, notification.index);
        self.revision += 1;

        match notification.payload {
            Payload::Job(job) => {
                debug!(job = %job.id, version = job.version, status = ?job.status, "job updated");
                self.job = Some(Arc::new(job));
                self.job_purged = false;
            }
            Payload::JobDeregistered(job) => {
                debug!(job = %job.id, "job deregistered");
                self.job = Some(Arc::new(job));
                self.mark_purged();
            }
            Payload::Evaluation(eval) => {
                self.evaluations.insert(eval.id.clone(), Arc::new(eval));
            }
            Payload::Allocation(alloc) => {
                let alloc = self.complete_task_states(alloc);
                trace!(alloc = %alloc.id, status = ?alloc.client_status, "allocation updated");
                self.allocations.insert(alloc.id.clone(), Arc::new(alloc));
            }
            Payload::Deployment(deployment) => {
                self.deployments
                    .insert(deployment.id.clone(), Arc::new(deployment));
            }
            Payload::JobMissing => {}
        }
        ApplyOutcome::Applied
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot::new(
            Arc::clone(&self.scope),
            self.job.clone(),
            self.job_purged,
            self.evaluations.clone(),
            self.allocations.clone(),
            self.deployments.clone(),
            self.revision,
        )
    }

    fn mark_purged(&mut self) {
        self.job_purged = true;
        self.revision += 1;
        if let Some(job) = self.job.as_mut() {
            Arc::make_mut(job).status = JobStatus::Dead;
        }
    }

    /// Admission of an entity seen for the first time.
    fn admits(&self, notification: &Notification) -> bool {
        let job_id = self.scope.job_id();
        let all = self.scope.all_versions;
        let baseline = self.job.as_deref();

        match &notification.payload {
            Payload::Job(job) | Payload::JobDeregistered(job) => job.id == job_id,
            Payload::JobMissing => notification.entity_id == job_id,
            Payload::Evaluation(eval) => {
                eval.job_id == job_id
                    && (all
                        || baseline
                            .is_none_or(|b| eval.job_modify_index.unwrap_or(0) >= b.job_modify_index))
            }
            Payload::Deployment(d) => {
                d.job_id == job_id
                    && (all || baseline.is_none_or(|b| d.job_modify_index >= b.job_modify_index))
            }
            Payload::Allocation(alloc) => match &self.scope.target {
                ScopeTarget::Allocation { alloc_id, .. } => &alloc.id == alloc_id,
                ScopeTarget::Job { .. } => {
                    alloc.job_id == job_id && (all || self.allocation_is_current(alloc, baseline))
                }
            },
        }
    }

    fn allocation_is_current(&self, alloc: &Allocation, baseline: Option<&Job>) -> bool {
        let Some(job) = baseline else {
            return true;
        };
        if alloc.job_version.is_some_and(|v| v >= job.version) {
            return true;
        }
        self.evaluations
            .get(&alloc.eval_id)
            .is_some_and(|e| e.job_modify_index.unwrap_or(0) >= job.job_modify_index)
    }

    /// Keep every task seen before and every task the job declares for the
    /// allocation's group.
    fn complete_task_states(&self, mut alloc: Allocation) -> Allocation {
        if let Some(prev) = self.allocations.get(&alloc.id) {
            for (name, state) in &prev.task_states {
                alloc
                    .task_states
                    .entry(name.clone())
                    .or_insert_with(|| state.clone());
            }
        }
        let definition = alloc.job.as_ref().or(self.job.as_deref());
        let declared: Vec<String> = definition
            .and_then(|job| job.task_group(&alloc.task_group))
            .map(|group| group.tasks.iter().map(|t| t.name.clone()).collect())
            .unwrap_or_default();
        for name in declared {
            alloc.task_states.entry(name).or_insert_with(|| TaskState {
                state: "pending".to_string(),
                ..Default::default()
            });
        }
        alloc
    }
}
