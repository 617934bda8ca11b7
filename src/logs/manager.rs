// src/logs/manager.rs

//! Log Stream Manager.
//!
//! After every snapshot the manager diffs the set of in-scope tasks against
//! its running readers:
//! - a started task without readers gets one reader per enabled stream;
//! - a terminal task's readers are told to drain;
//! - readers whose task left scope are closed, once, and never respawned.
//!
//! Finished readers are reaped on the next reconcile. Their keys are kept so
//! a task is never read twice.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, trace, warn};

use super::events::EventLines;
use super::reader::{LogReader, ReaderControl, ReaderSpec};
use super::sink::{LineSender, LineSource};
use super::tail::LinesPlanner;
use crate::config::WatchSettings;
use crate::nomad::NomadApi;
use crate::shutdown::ShutdownToken;
use crate::source::BackoffPolicy;
use crate::state::{ScopedTask, Snapshot};
use crate::types::{LogKind, OutputSet};

/// One task of one allocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskKey {
    pub alloc_id: String,
    pub task: String,
}

impl TaskKey {
    pub fn new(alloc_id: &str, task: &str) -> Self {
        Self {
            alloc_id: alloc_id.to_string(),
            task: task.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogOptions {
    pub lines: i64,
    pub lines_timeout: Duration,
    pub shutdown_timeout: Duration,
    pub drain_timeout: Duration,
    pub backoff: BackoffPolicy,
    pub outputs: OutputSet,
}

impl LogOptions {
    pub fn from_settings(settings: &WatchSettings) -> Self {
        Self {
            lines: settings.lines,
            lines_timeout: settings.lines_timeout,
            shutdown_timeout: settings.shutdown_timeout,
            drain_timeout: settings.drain_timeout,
            backoff: settings.backoff,
            outputs: settings.outputs,
        }
    }

    fn kinds(&self) -> impl Iterator<Item = LogKind> + '_ {
        [LogKind::Stdout, LogKind::Stderr]
            .into_iter()
            .filter(|k| self.outputs.wants(*k))
    }
}

struct ReaderHandle {
    control: watch::Sender<ReaderControl>,
    handle: JoinHandle<()>,
    draining: bool,
}

pub struct LogManager {
    api: Arc<dyn NomadApi>,
    options: LogOptions,
    planner: LinesPlanner,
    sink: LineSender,
    shutdown: ShutdownToken,
    events: EventLines,
    readers: HashMap<(TaskKey, LogKind), ReaderHandle>,
    retired: Vec<ReaderHandle>,
    closed: HashSet<TaskKey>,
    finished: HashSet<(TaskKey, LogKind)>,
    initial: bool,
}

impl LogManager {
    pub fn new(
        api: Arc<dyn NomadApi>,
        options: LogOptions,
        sink: LineSender,
        shutdown: ShutdownToken,
        started_at: Instant,
    ) -> Self {
        let planner = LinesPlanner::new(options.lines, options.lines_timeout, started_at);
        let elapsed = chrono::Duration::from_std(started_at.elapsed()).unwrap_or_default();
        let watch_start: DateTime<Utc> = Utc::now() - elapsed;
        let events = EventLines::new(options.outputs, options.lines, watch_start);
        Self {
            api,
            options,
            planner,
            sink,
            shutdown,
            events,
            readers: HashMap::new(),
            retired: Vec::new(),
            closed: HashSet::new(),
            finished: HashSet::new(),
            initial: true,
        }
    }

    /// Bring readers and event lines in line with `snap`.
    pub async fn reconcile(&mut self, snap: &Snapshot) {
        for line in self.events.collect(snap) {
            if self.sink.send(line).await.is_err() {
                warn!("output sink closed; dropping event lines");
                break;
            }
        }

        self.reap_finished();

        let tasks = snap.tasks_in_scope();
        let in_scope: HashSet<TaskKey> = tasks
            .iter()
            .map(|t| TaskKey::new(&t.alloc.id, t.name))
            .collect();

        let leaving: Vec<(TaskKey, LogKind)> = self
            .readers
            .keys()
            .filter(|(key, _)| !in_scope.contains(key))
            .cloned()
            .collect();
        for entry in leaving {
            if let Some(reader) = self.readers.remove(&entry) {
                debug!(alloc = %entry.0.alloc_id, task = %entry.0.task, stream = entry.1.as_str(), "task left scope, closing reader");
                let _ = reader.control.send(ReaderControl::Close);
                self.retired.push(reader);
            }
            self.closed.insert(entry.0);
        }

        let now = Instant::now();
        for task in &tasks {
            self.reconcile_task(task, now);
        }
        self.initial = false;
    }

    /// Drop the handles of readers that have returned.
    fn reap_finished(&mut self) {
        self.retired.retain(|r| !r.handle.is_finished());
        let done: Vec<(TaskKey, LogKind)> = self
            .readers
            .iter()
            .filter(|(_, r)| r.handle.is_finished())
            .map(|(entry, _)| entry.clone())
            .collect();
        for entry in done {
            self.readers.remove(&entry);
            self.finished.insert(entry);
        }
    }

    fn reconcile_task(&mut self, task: &ScopedTask<'_>, now: Instant) {
        let key = TaskKey::new(&task.alloc.id, task.name);
        if self.closed.contains(&key) || !task.state.was_started() {
            return;
        }
        let dead = task.state.is_dead();
        let kinds: Vec<LogKind> = self.options.kinds().collect();
        for kind in kinds {
            let entry = (key.clone(), kind);
            if self.finished.contains(&entry) {
                continue;
            }
            if !self.readers.contains_key(&entry) {
                let reader = self.spawn_reader(task, kind, now);
                self.readers.insert(entry.clone(), reader);
            }
            if dead {
                if let Some(reader) = self.readers.get_mut(&entry) {
                    if !reader.draining {
                        trace!(alloc = %key.alloc_id, task = %key.task, stream = kind.as_str(), "task finished, draining reader");
                        let _ = reader
                            .control
                            .send(ReaderControl::Drain(now + self.options.drain_timeout));
                        reader.draining = true;
                    }
                }
            }
        }
    }

    fn spawn_reader(&self, task: &ScopedTask<'_>, kind: LogKind, now: Instant) -> ReaderHandle {
        let (start, window) = self.planner.plan(self.initial, now);
        let source = LineSource {
            alloc_id: task.alloc.id.clone(),
            group: task.alloc.task_group.clone(),
            task: task.name.to_string(),
            node: task.alloc.node_name.clone(),
            eval_id: task.alloc.eval_id.clone(),
            job_id: task.alloc.job_id.clone(),
        };
        debug!(
            alloc = %source.alloc_id,
            task = %source.task,
            stream = kind.as_str(),
            origin = start.origin.as_str(),
            offset = start.offset,
            "starting log reader"
        );
        let spec = ReaderSpec {
            source,
            kind,
            start,
            window,
            backoff: self.options.backoff,
            shutdown_grace: self.options.shutdown_timeout,
        };
        let (control, control_rx) = watch::channel(ReaderControl::Run);
        let reader = LogReader::new(
            Arc::clone(&self.api),
            spec,
            self.sink.clone(),
            control_rx,
            self.shutdown.clone(),
        );
        ReaderHandle {
            control,
            handle: tokio::spawn(reader.run()),
            draining: false,
        }
    }

    /// Readers of in-scope tasks that had not returned at the last reconcile.
    pub fn active_readers(&self) -> BTreeSet<(TaskKey, LogKind)> {
        self.readers.keys().cloned().collect()
    }

    /// Reader tasks still held, including closed ones not yet reaped.
    pub fn reader_handles(&self) -> usize {
        self.readers.len() + self.retired.len()
    }

    /// Tasks whose readers were closed because they left scope.
    pub fn closed_readers(&self) -> BTreeSet<TaskKey> {
        self.closed.iter().cloned().collect()
    }

    /// Ask every reader to drain, wait up to `timeout`, then abort the rest.
    pub async fn shutdown(mut self, timeout: Duration) {
        let deadline = Instant::now() + timeout;
        let mut all: Vec<ReaderHandle> = self.readers.drain().map(|(_, r)| r).collect();
        all.append(&mut self.retired);

        for reader in &all {
            if !reader.handle.is_finished() {
                let _ = reader.control.send(ReaderControl::Drain(deadline));
            }
        }

        // Senders stay alive until the join; a dropped control closes the reader.
        let mut aborted = 0usize;
        for reader in &mut all {
            if timeout_at(deadline, &mut reader.handle).await.is_err() {
                reader.handle.abort();
                aborted += 1;
            }
        }
        if aborted > 0 {
            warn!(aborted, "log readers did not finish within the shutdown timeout");
        }
        debug!(readers = all.len(), "log readers stopped");
    }
}
