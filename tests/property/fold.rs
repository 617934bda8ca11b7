// tests/property/fold.rs

use std::collections::{BTreeMap, HashSet};

use nomad_watch::nomad::model::{Allocation, ClientStatus, JobStatus};
use nomad_watch::source::Notification;
use nomad_watch::state::{ApplyOutcome, StateStore, WatchedScope};
use nomad_watch_test_utils::builders::{AllocBuilder, JobBuilder, at, exited, running};
use proptest::prelude::*;

const STATUSES: [ClientStatus; 4] = [
    ClientStatus::Pending,
    ClientStatus::Running,
    ClientStatus::Complete,
    ClientStatus::Failed,
];

const JOB_STATUSES: [JobStatus; 4] = [
    JobStatus::Pending,
    JobStatus::Running,
    JobStatus::Dead,
    JobStatus::Unknown,
];

const ALL_CLIENT_STATUSES: [ClientStatus; 6] = [
    ClientStatus::Pending,
    ClientStatus::Running,
    ClientStatus::Complete,
    ClientStatus::Failed,
    ClientStatus::Lost,
    ClientStatus::Unknown,
];

fn alloc(slot: u8, index: u64, status: usize) -> Allocation {
    let status = STATUSES[status];
    let task = match status {
        ClientStatus::Complete => exited(at(0), 0),
        ClientStatus::Failed => exited(at(0), 1),
        _ => running(at(0)),
    };
    AllocBuilder::new(&format!("alloc-{slot}"), "web")
        .created(1)
        .modified(index)
        .status(status)
        .task("main", task)
        .build()
}

// Updates for up to three allocations, at most one per (allocation, index).
fn updates_strategy() -> impl Strategy<Value = Vec<Allocation>> {
    proptest::collection::vec((0u8..3, 1u64..200, 0usize..4), 1..40).prop_map(|raw| {
        let mut seen = HashSet::new();
        raw.into_iter()
            .filter(|(slot, index, _)| seen.insert((*slot, *index)))
            .map(|(slot, index, status)| alloc(slot, index, status))
            .collect()
    })
}

fn fresh_store() -> StateStore {
    StateStore::with_job(
        WatchedScope::job("default", "web"),
        JobBuilder::new("web").group("g", &["main"]).build(),
    )
}

fn fold(updates: &[Allocation]) -> StateStore {
    let mut store = fresh_store();
    for a in updates {
        store.apply(Notification::allocation(a.clone()));
    }
    store
}

proptest! {
    #[test]
    fn replaying_a_sequence_changes_nothing(updates in updates_strategy()) {
        let mut store = fold(&updates);
        let snap = store.snapshot();
        let revision = store.revision();

        for a in &updates {
            prop_assert_ne!(
                store.apply(Notification::allocation(a.clone())),
                ApplyOutcome::Applied
            );
        }
        prop_assert_eq!(store.revision(), revision);
        prop_assert_eq!(store.snapshot(), snap);
    }

    #[test]
    fn newest_update_wins_in_any_order(updates in updates_strategy()) {
        let mut newest: BTreeMap<String, &Allocation> = BTreeMap::new();
        for a in &updates {
            let entry = newest.entry(a.id.clone()).or_insert(a);
            if a.modify_index > entry.modify_index {
                *entry = a;
            }
        }

        let forward = fold(&updates).snapshot();
        let reversed: Vec<Allocation> = updates.iter().rev().cloned().collect();
        let backward = fold(&reversed).snapshot();

        for (id, expected) in &newest {
            for snap in [&forward, &backward] {
                let got = snap.allocation(id).expect("allocation admitted");
                prop_assert_eq!(got.modify_index, expected.modify_index);
                prop_assert_eq!(got.client_status, expected.client_status);
            }
        }
        prop_assert_eq!(forward, backward);
    }

    #[test]
    fn job_is_dead_exactly_when_dead_and_nothing_is_left_running(
        job_status in 0usize..4,
        statuses in proptest::collection::vec(0usize..6, 0..6),
    ) {
        let job_status = JOB_STATUSES[job_status];
        let mut store = StateStore::with_job(
            WatchedScope::job("default", "web"),
            JobBuilder::new("web").group("g", &["main"]).status(job_status).build(),
        );
        for (i, status) in statuses.iter().enumerate() {
            let alloc = AllocBuilder::new(&format!("alloc-{i}"), "web")
                .created(i as u64 + 1)
                .modified(i as u64 + 10)
                .status(ALL_CLIENT_STATUSES[*status])
                .task("main", running(at(0)))
                .build();
            prop_assert_eq!(store.apply(Notification::allocation(alloc)), ApplyOutcome::Applied);
        }

        let snap = store.snapshot();
        let live = statuses.iter().any(|s| {
            matches!(ALL_CLIENT_STATUSES[*s], ClientStatus::Pending | ClientStatus::Running)
        });
        prop_assert_eq!(snap.is_job_dead(), job_status == JobStatus::Dead && !live);
    }
}
