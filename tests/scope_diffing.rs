// tests/scope_diffing.rs

mod common;
use crate::common::builders::{AllocBuilder, JobBuilder, at, exited, pending, running};
use crate::common::{FakeNomad, api, fast_watch, init_tracing, with_timeout};

use std::collections::BTreeSet;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use nomad_watch::logs::{LogManager, LogOptions, OutputLine, SINK_CAPACITY, TaskKey};
use nomad_watch::nomad::model::ClientStatus;
use nomad_watch::shutdown::shutdown_channel;
use nomad_watch::source::Notification;
use nomad_watch::state::{StateStore, WatchedScope};
use nomad_watch::types::LogKind;

fn readers(pairs: &[(&str, &str)]) -> BTreeSet<(TaskKey, LogKind)> {
    pairs
        .iter()
        .flat_map(|(alloc, task)| {
            [LogKind::Stdout, LogKind::Stderr].map(|k| (TaskKey::new(alloc, task), k))
        })
        .collect()
}

struct Harness {
    store: StateStore,
    manager: LogManager,
    _lines: mpsc::Receiver<OutputLine>,
}

impl Harness {
    fn new(scope: WatchedScope) -> Self {
        let fake = FakeNomad::new();
        let job = JobBuilder::new("web").group("g", &["main", "side"]).build();
        let (sink, lines) = mpsc::channel(SINK_CAPACITY);
        // Dropping the trigger counts as shutdown, so readers only drain.
        let (_trigger, token) = shutdown_channel();
        let manager = LogManager::new(
            api(&fake),
            LogOptions::from_settings(&fast_watch()),
            sink,
            token,
            Instant::now(),
        );
        Self {
            store: StateStore::with_job(scope, job),
            manager,
            _lines: lines,
        }
    }

    async fn apply(&mut self, alloc: nomad_watch::nomad::Allocation) {
        self.store.apply(Notification::allocation(alloc));
        let snap = self.store.snapshot();
        self.manager.reconcile(&snap).await;
    }
}

#[tokio::test]
async fn started_tasks_get_one_reader_per_stream() {
    init_tracing();
    let mut h = Harness::new(WatchedScope::job("default", "web"));

    h.apply(
        AllocBuilder::new("a1", "web")
            .status(ClientStatus::Running)
            .task("main", running(at(0)))
            .task("side", pending())
            .build(),
    )
    .await;
    assert_eq!(h.manager.active_readers(), readers(&[("a1", "main")]));

    h.apply(
        AllocBuilder::new("a1", "web")
            .status(ClientStatus::Running)
            .modified(11)
            .task("main", running(at(0)))
            .task("side", running(at(5)))
            .build(),
    )
    .await;
    assert_eq!(
        h.manager.active_readers(),
        readers(&[("a1", "main"), ("a1", "side")])
    );
    h.manager.shutdown(Duration::from_millis(200)).await;
}

#[tokio::test]
async fn replaced_allocations_are_closed_and_never_reopened() {
    init_tracing();
    let mut h = Harness::new(WatchedScope::job("default", "web"));

    h.apply(
        AllocBuilder::new("a1", "web")
            .status(ClientStatus::Running)
            .task("main", running(at(0)))
            .build(),
    )
    .await;

    h.apply(
        AllocBuilder::new("a1", "web")
            .status(ClientStatus::Failed)
            .modified(20)
            .task("main", exited(at(0), 1))
            .replaced_by("b2")
            .build(),
    )
    .await;
    h.apply(
        AllocBuilder::new("b2", "web")
            .status(ClientStatus::Running)
            .created(21)
            .task("main", running(at(30)))
            .build(),
    )
    .await;

    assert_eq!(h.manager.active_readers(), readers(&[("b2", "main")]));
    assert_eq!(
        h.manager.closed_readers(),
        BTreeSet::from([TaskKey::new("a1", "main")])
    );

    // A late update of the replaced allocation does not bring it back.
    h.apply(
        AllocBuilder::new("a1", "web")
            .status(ClientStatus::Failed)
            .modified(40)
            .task("main", exited(at(0), 1))
            .replaced_by("b2")
            .build(),
    )
    .await;
    assert!(!h
        .manager
        .active_readers()
        .iter()
        .any(|(key, _)| key.alloc_id == "a1"));
    h.manager.shutdown(Duration::from_millis(200)).await;
}

#[tokio::test]
async fn filtered_tasks_get_no_readers() {
    init_tracing();
    let scope = WatchedScope::job("default", "web")
        .with_task_filter(Some(regex::Regex::new("^main$").unwrap()));
    let mut h = Harness::new(scope);

    h.apply(
        AllocBuilder::new("a1", "web")
            .status(ClientStatus::Running)
            .task("main", running(at(0)))
            .task("side", running(at(0)))
            .build(),
    )
    .await;
    assert_eq!(h.manager.active_readers(), readers(&[("a1", "main")]));
    h.manager.shutdown(Duration::from_millis(200)).await;
}

#[tokio::test]
async fn finished_readers_are_released_and_not_respawned() {
    init_tracing();
    let mut h = Harness::new(WatchedScope::job("default", "web"));

    h.apply(
        AllocBuilder::new("a1", "web")
            .status(ClientStatus::Running)
            .task("main", running(at(0)))
            .build(),
    )
    .await;
    assert_eq!(h.manager.reader_handles(), 2);

    let finished = |index: u64| {
        AllocBuilder::new("a1", "web")
            .status(ClientStatus::Complete)
            .modified(index)
            .task("main", exited(at(0), 0))
            .build()
    };
    let mut index = 20;
    with_timeout(async {
        while h.manager.reader_handles() > 0 {
            index += 1;
            h.apply(finished(index)).await;
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(h.manager.active_readers().is_empty());

    // Later updates of the same task do not start new readers.
    h.apply(finished(index + 1)).await;
    assert_eq!(h.manager.reader_handles(), 0);
    h.manager.shutdown(Duration::from_millis(200)).await;
}
