// tests/state_store.rs

mod common;
use crate::common::builders::{AllocBuilder, JobBuilder, at, evaluation, exited, failed_setup, pending, running};

use nomad_watch::engine::{aggregate, exit_code::{ANY_UNFINISHED_TASKS, NO_ALLOCATIONS}};
use nomad_watch::nomad::model::{ClientStatus, JobStatus};
use nomad_watch::source::Notification;
use nomad_watch::state::{ApplyOutcome, StateStore, TaskStatus, WatchedScope};

fn store_with_sidecar() -> StateStore {
    let job = JobBuilder::new("web")
        .group("g", &["main"])
        .hook_task("g", "init", "prestart", false)
        .hook_task("g", "proxy", "prestart", true)
        .build();
    StateStore::with_job(WatchedScope::job("default", "web"), job)
}

#[test]
fn lifecycle_tasks_do_not_count_toward_the_exit_status() {
    let mut store = store_with_sidecar();
    store.apply(Notification::allocation(
        AllocBuilder::new("a1", "web")
            .status(ClientStatus::Complete)
            .task("init", exited(at(0), 0))
            .task("proxy", exited(at(0), 137))
            .task("main", exited(at(2), 4))
            .build(),
    ));

    let snap = store.snapshot();
    assert_eq!(snap.main_task_statuses(), vec![TaskStatus::Exited(4)]);
    assert_eq!(aggregate(&snap.main_task_statuses()), 4);
    assert_eq!(snap.tasks_in_scope().len(), 3);
}

#[test]
fn main_tasks_started_needs_every_group() {
    let job = JobBuilder::new("web")
        .group("api", &["server"])
        .group("db", &["postgres"])
        .build();
    let mut store = StateStore::with_job(WatchedScope::job("default", "web"), job);

    store.apply(Notification::allocation(
        AllocBuilder::new("a1", "web")
            .group("api")
            .status(ClientStatus::Running)
            .task("server", running(at(0)))
            .build(),
    ));
    assert!(!store.snapshot().main_tasks_started());

    store.apply(Notification::allocation(
        AllocBuilder::new("b1", "web")
            .group("db")
            .created(12)
            .task("postgres", pending())
            .build(),
    ));
    assert!(!store.snapshot().main_tasks_started());

    store.apply(Notification::allocation(
        AllocBuilder::new("b1", "web")
            .group("db")
            .created(12)
            .modified(13)
            .status(ClientStatus::Running)
            .task("postgres", running(at(3)))
            .build(),
    ));
    assert!(store.snapshot().main_tasks_started());
}

#[test]
fn pending_evaluations_and_active_deployments_delay_settling() {
    let job = JobBuilder::new("web")
        .group("g", &["main"])
        .status(JobStatus::Dead)
        .build();
    let mut store = StateStore::with_job(WatchedScope::job("default", "web"), job);
    store.apply(Notification::allocation(
        AllocBuilder::new("a1", "web")
            .status(ClientStatus::Complete)
            .task("main", exited(at(0), 0))
            .build(),
    ));
    assert!(store.snapshot().is_job_settled());

    store.apply(Notification::evaluation(evaluation("e1", "web", "pending", 20)));
    let snap = store.snapshot();
    assert!(snap.is_job_dead());
    assert!(!snap.is_job_settled());

    store.apply(Notification::evaluation(evaluation("e1", "web", "complete", 21)));
    assert!(store.snapshot().is_job_settled());
}

#[test]
fn replayed_and_reordered_updates_never_move_backwards() {
    let mut store = StateStore::with_job(
        WatchedScope::job("default", "web"),
        JobBuilder::new("web").group("g", &["main"]).build(),
    );
    let newer = AllocBuilder::new("a1", "web")
        .modified(30)
        .status(ClientStatus::Complete)
        .task("main", exited(at(0), 0))
        .build();
    let older = AllocBuilder::new("a1", "web")
        .modified(20)
        .status(ClientStatus::Running)
        .task("main", running(at(0)))
        .build();

    assert_eq!(store.apply(Notification::allocation(newer.clone())), ApplyOutcome::Applied);
    let revision = store.revision();
    assert_eq!(store.apply(Notification::allocation(older)), ApplyOutcome::Stale);
    assert_eq!(store.apply(Notification::allocation(newer)), ApplyOutcome::Stale);
    assert_eq!(store.revision(), revision);
    assert_eq!(
        store.snapshot().allocation("a1").unwrap().client_status,
        ClientStatus::Complete
    );
}

#[test]
fn allocation_scope_ignores_siblings() {
    let mut store = StateStore::new(WatchedScope::allocation("default", "a1", "web"));
    assert_eq!(
        store.apply(Notification::allocation(AllocBuilder::new("a2", "web").build())),
        ApplyOutcome::OutOfScope
    );
    assert_eq!(
        store.apply(Notification::allocation(
            AllocBuilder::new("a1", "web")
                .status(ClientStatus::Failed)
                .task("main", failed_setup("driver failure"))
                .build()
        )),
        ApplyOutcome::Applied
    );
    let snap = store.snapshot();
    assert!(snap.target_allocation_finished());
    assert_eq!(snap.main_task_statuses(), vec![TaskStatus::Failed]);
    assert_eq!(aggregate(&snap.main_task_statuses()), NO_ALLOCATIONS);
}

#[test]
fn snapshots_are_unaffected_by_later_updates() {
    let mut store = store_with_sidecar();
    store.apply(Notification::allocation(
        AllocBuilder::new("a1", "web")
            .status(ClientStatus::Running)
            .task("main", running(at(0)))
            .build(),
    ));
    let before = store.snapshot();

    store.apply(Notification::allocation(
        AllocBuilder::new("a1", "web")
            .modified(50)
            .status(ClientStatus::Complete)
            .task("main", exited(at(0), 0))
            .build(),
    ));

    assert_eq!(aggregate(&before.main_task_statuses()), ANY_UNFINISHED_TASKS);
    assert_eq!(aggregate(&store.snapshot().main_task_statuses()), 0);
    assert_ne!(before, store.snapshot());
}
