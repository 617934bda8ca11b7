#![allow(dead_code)]

//! In-memory scheduler for tests.
//!
//! State lives behind one mutex. Every write through the helper methods
//! stamps a fresh modify index and publishes a matching event to all open
//! event streams, so a watch sees the same change whether it polls or
//! streams.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::sync::{Notify, mpsc};

use nomad_watch::errors::{Result, WatchError};
use nomad_watch::nomad::model::{JobStatus, TaskGroupSummary};
use nomad_watch::nomad::{
    Allocation, BoxFuture, Deployment, EventBatch, EventFeed, Evaluation, Job, JobSummary,
    LogFeed, LogFrame, LogOrigin, LogRequest, NomadApi, RawEvent,
};
use nomad_watch::types::LogKind;

/// How long an idle log feed waits before sending a heartbeat.
const LOG_HEARTBEAT: Duration = Duration::from_millis(20);

/// A `stop_job` call as the fake received it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopCall {
    pub namespace: String,
    pub job_id: String,
    pub purge: bool,
}

#[derive(Default)]
struct LogFile {
    data: Mutex<Vec<u8>>,
    grew: Notify,
    /// Bumped to cut every feed opened before it.
    generation: AtomicU64,
}

#[derive(Default)]
struct Cluster {
    jobs: BTreeMap<(String, String), Job>,
    evaluations: BTreeMap<String, Evaluation>,
    allocations: BTreeMap<String, Allocation>,
    deployments: BTreeMap<String, Deployment>,
    summaries: HashMap<(String, String), JobSummary>,
    subscribers: Vec<mpsc::UnboundedSender<EventBatch>>,
    stop_calls: Vec<StopCall>,
    registered: Vec<Value>,
}

#[derive(Default)]
pub struct FakeNomad {
    cluster: Mutex<Cluster>,
    logs: Mutex<HashMap<(String, String, LogKind), Arc<LogFile>>>,
    index: AtomicU64,
    failing_streams: AtomicU32,
    failing_listings: AtomicU32,
    subscriptions: AtomicU32,
    hang_up_streams: AtomicBool,
    hold_registrations: AtomicBool,
}

impl FakeNomad {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn next_index(&self) -> u64 {
        self.index.fetch_add(1, Ordering::SeqCst) + 1000
    }

    fn publish(&self, cluster: &mut Cluster, topic: &str, kind: &str, key: &str, ns: &str, body: Value) {
        let index = self.next_index();
        let batch = EventBatch {
            index,
            events: vec![RawEvent {
                topic: topic.to_string(),
                event_type: kind.to_string(),
                key: key.to_string(),
                namespace: ns.to_string(),
                index,
                payload: Value::Object(Map::from_iter([(topic.to_string(), body)])),
            }],
        };
        cluster.subscribers.retain(|tx| tx.send(batch.clone()).is_ok());
    }

    pub fn put_job(&self, mut job: Job) {
        job.modify_index = self.next_index();
        let mut cluster = self.cluster.lock().unwrap();
        let body = serde_json::to_value(&job).unwrap();
        self.publish(&mut cluster, "Job", "JobRegistered", &job.id, &job.namespace, body);
        cluster
            .jobs
            .insert((job.namespace.clone(), job.id.clone()), job);
    }

    pub fn put_evaluation(&self, mut eval: Evaluation) {
        eval.modify_index = self.next_index();
        let mut cluster = self.cluster.lock().unwrap();
        let body = serde_json::to_value(&eval).unwrap();
        self.publish(&mut cluster, "Evaluation", "EvaluationUpdated", &eval.id, &eval.namespace, body);
        cluster.evaluations.insert(eval.id.clone(), eval);
    }

    pub fn put_allocation(&self, mut alloc: Allocation) {
        alloc.modify_index = self.next_index();
        let mut cluster = self.cluster.lock().unwrap();
        let body = serde_json::to_value(&alloc).unwrap();
        self.publish(&mut cluster, "Allocation", "AllocationUpdated", &alloc.id, &alloc.namespace, body);
        cluster.allocations.insert(alloc.id.clone(), alloc);
    }

    pub fn put_deployment(&self, mut deployment: Deployment) {
        deployment.modify_index = self.next_index();
        let mut cluster = self.cluster.lock().unwrap();
        let body = serde_json::to_value(&deployment).unwrap();
        self.publish(&mut cluster, "Deployment", "DeploymentStatusUpdate", &deployment.id, &deployment.namespace, body);
        cluster.deployments.insert(deployment.id.clone(), deployment);
    }

    pub fn set_summary(&self, namespace: &str, job_id: &str, group: &str, counts: TaskGroupSummary) {
        let mut cluster = self.cluster.lock().unwrap();
        let summary = cluster
            .summaries
            .entry((namespace.to_string(), job_id.to_string()))
            .or_insert_with(|| JobSummary {
                job_id: job_id.to_string(),
                ..Default::default()
            });
        summary.summary.insert(group.to_string(), counts);
    }

    /// Append raw bytes to a task log.
    pub fn append_log(&self, alloc_id: &str, task: &str, kind: LogKind, bytes: &str) {
        let file = self.log_file(alloc_id, task, kind);
        file.data.lock().unwrap().extend_from_slice(bytes.as_bytes());
        file.grew.notify_waiters();
    }

    /// Cut the open streams of one task log with a transport error.
    pub fn break_log_streams(&self, alloc_id: &str, task: &str, kind: LogKind) {
        let file = self.log_file(alloc_id, task, kind);
        file.generation.fetch_add(1, Ordering::SeqCst);
        file.grew.notify_waiters();
    }

    fn log_file(&self, alloc_id: &str, task: &str, kind: LogKind) -> Arc<LogFile> {
        let mut logs = self.logs.lock().unwrap();
        Arc::clone(
            logs.entry((alloc_id.to_string(), task.to_string(), kind))
                .or_default(),
        )
    }

    /// Make the next `n` event stream subscriptions fail with a transport error.
    pub fn fail_next_subscriptions(&self, n: u32) {
        self.failing_streams.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` job lookups fail with a transport error.
    pub fn fail_next_listings(&self, n: u32) {
        self.failing_listings.store(n, Ordering::SeqCst);
    }

    /// Accept every event stream subscription, then close it before any
    /// event is sent.
    pub fn hang_up_event_streams(&self, hang_up: bool) {
        self.hang_up_streams.store(hang_up, Ordering::SeqCst);
    }

    /// Leave the evaluations of later registrations pending.
    pub fn hold_registrations(&self, hold: bool) {
        self.hold_registrations.store(hold, Ordering::SeqCst);
    }

    /// Close every open event stream, as a server restart would.
    pub fn drop_event_streams(&self) {
        self.cluster.lock().unwrap().subscribers.clear();
    }

    pub fn subscriptions(&self) -> u32 {
        self.subscriptions.load(Ordering::SeqCst)
    }

    pub fn stop_calls(&self) -> Vec<StopCall> {
        self.cluster.lock().unwrap().stop_calls.clone()
    }

    pub fn registered(&self) -> Vec<Value> {
        self.cluster.lock().unwrap().registered.clone()
    }

    pub fn job_now(&self, namespace: &str, job_id: &str) -> Option<Job> {
        let cluster = self.cluster.lock().unwrap();
        cluster
            .jobs
            .get(&(namespace.to_string(), job_id.to_string()))
            .cloned()
    }

    pub fn allocation_now(&self, id: &str) -> Option<Allocation> {
        self.cluster.lock().unwrap().allocations.get(id).cloned()
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn do_stop(&self, namespace: &str, job_id: &str, purge: bool) -> Result<String> {
        let mut cluster = self.cluster.lock().unwrap();
        let key = (namespace.to_string(), job_id.to_string());
        let Some(mut job) = cluster.jobs.get(&key).cloned() else {
            return Err(WatchError::NotFound(format!("job {job_id}")));
        };
        cluster.stop_calls.push(StopCall {
            namespace: namespace.to_string(),
            job_id: job_id.to_string(),
            purge,
        });

        job.stop = true;
        job.status = JobStatus::Dead;
        job.modify_index = self.next_index();
        let body = serde_json::to_value(&job).unwrap();
        if purge {
            cluster.jobs.remove(&key);
            self.publish(&mut cluster, "Job", "JobDeregistered", job_id, namespace, body);
        } else {
            cluster.jobs.insert(key, job);
            self.publish(&mut cluster, "Job", "JobRegistered", job_id, namespace, body);
        }
        Ok(format!("stop-{}", cluster.stop_calls.len()))
    }

    fn do_register(&self, namespace: &str, definition: Value) -> Result<String> {
        let mut job: Job = serde_json::from_value(definition.clone())?;
        job.namespace = namespace.to_string();
        job.status = JobStatus::Pending;
        let index = self.next_index();
        job.modify_index = index;
        job.job_modify_index = index;

        let eval_id = format!("eval-{index}");
        {
            let mut cluster = self.cluster.lock().unwrap();
            if let Some(prev) = cluster.jobs.get(&(namespace.to_string(), job.id.clone())) {
                job.version = prev.version + 1;
            }
            cluster.registered.push(definition);
        }
        let eval = Evaluation {
            id: eval_id.clone(),
            namespace: namespace.to_string(),
            job_id: job.id.clone(),
            status: if self.hold_registrations.load(Ordering::SeqCst) {
                "pending".to_string()
            } else {
                "complete".to_string()
            },
            modify_index: index,
            job_modify_index: Some(index),
            ..Default::default()
        };
        self.put_job(job);
        self.put_evaluation(eval);
        Ok(eval_id)
    }
}

fn not_found(what: String) -> WatchError {
    WatchError::NotFound(what)
}

struct ChannelFeed {
    rx: mpsc::UnboundedReceiver<EventBatch>,
}

impl EventFeed for ChannelFeed {
    fn next_batch(&mut self) -> BoxFuture<'_, Result<Option<EventBatch>>> {
        Box::pin(async move { Ok(self.rx.recv().await) })
    }
}

struct FileFeed {
    file: Arc<LogFile>,
    pos: usize,
    generation: u64,
}

impl FileFeed {
    fn is_cut(&self) -> bool {
        self.file.generation.load(Ordering::SeqCst) != self.generation
    }
}

impl LogFeed for FileFeed {
    fn next_frame(&mut self) -> BoxFuture<'_, Result<Option<LogFrame>>> {
        Box::pin(async move {
            let grew = self.file.grew.notified();
            tokio::pin!(grew);
            grew.as_mut().enable();
            if self.is_cut() {
                return Err(WatchError::Transport("log stream reset".to_string()));
            }
            {
                let data = self.file.data.lock().unwrap();
                if self.pos < data.len() {
                    // Like the real endpoint, the offset points past the data.
                    let frame = LogFrame {
                        data: data[self.pos..].to_vec(),
                        offset: data.len() as i64,
                    };
                    self.pos = data.len();
                    return Ok(Some(frame));
                }
            }
            let _ = tokio::time::timeout(LOG_HEARTBEAT, grew).await;
            if self.is_cut() {
                return Err(WatchError::Transport("log stream reset".to_string()));
            }
            Ok(Some(LogFrame::heartbeat()))
        })
    }
}

impl NomadApi for FakeNomad {
    fn job<'a>(&'a self, namespace: &'a str, job_id: &'a str) -> BoxFuture<'a, Result<Job>> {
        Box::pin(async move {
            if Self::take_failure(&self.failing_listings) {
                return Err(WatchError::Transport("connection refused".to_string()));
            }
            let cluster = self.cluster.lock().unwrap();
            cluster
                .jobs
                .get(&(namespace.to_string(), job_id.to_string()))
                .cloned()
                .ok_or_else(|| not_found(format!("job {job_id}")))
        })
    }

    fn job_evaluations<'a>(
        &'a self,
        namespace: &'a str,
        job_id: &'a str,
    ) -> BoxFuture<'a, Result<Vec<Evaluation>>> {
        Box::pin(async move {
            let cluster = self.cluster.lock().unwrap();
            Ok(cluster
                .evaluations
                .values()
                .filter(|e| e.namespace == namespace && e.job_id == job_id)
                .cloned()
                .collect())
        })
    }

    fn job_allocations<'a>(
        &'a self,
        namespace: &'a str,
        job_id: &'a str,
    ) -> BoxFuture<'a, Result<Vec<Allocation>>> {
        Box::pin(async move {
            let cluster = self.cluster.lock().unwrap();
            Ok(cluster
                .allocations
                .values()
                .filter(|a| a.namespace == namespace && a.job_id == job_id)
                .cloned()
                .collect())
        })
    }

    fn job_deployments<'a>(
        &'a self,
        namespace: &'a str,
        job_id: &'a str,
    ) -> BoxFuture<'a, Result<Vec<Deployment>>> {
        Box::pin(async move {
            let cluster = self.cluster.lock().unwrap();
            Ok(cluster
                .deployments
                .values()
                .filter(|d| d.namespace == namespace && d.job_id == job_id)
                .cloned()
                .collect())
        })
    }

    fn job_summary<'a>(
        &'a self,
        namespace: &'a str,
        job_id: &'a str,
    ) -> BoxFuture<'a, Result<JobSummary>> {
        Box::pin(async move {
            let cluster = self.cluster.lock().unwrap();
            cluster
                .summaries
                .get(&(namespace.to_string(), job_id.to_string()))
                .cloned()
                .ok_or_else(|| not_found(format!("summary of {job_id}")))
        })
    }

    fn allocation<'a>(&'a self, alloc_id: &'a str) -> BoxFuture<'a, Result<Allocation>> {
        Box::pin(async move {
            let cluster = self.cluster.lock().unwrap();
            cluster
                .allocations
                .get(alloc_id)
                .cloned()
                .ok_or_else(|| not_found(format!("allocation {alloc_id}")))
        })
    }

    fn allocations_by_prefix<'a>(
        &'a self,
        prefix: &'a str,
    ) -> BoxFuture<'a, Result<Vec<Allocation>>> {
        Box::pin(async move {
            let cluster = self.cluster.lock().unwrap();
            Ok(cluster
                .allocations
                .values()
                .filter(|a| a.id.starts_with(prefix))
                .cloned()
                .collect())
        })
    }

    fn evaluation<'a>(&'a self, eval_id: &'a str) -> BoxFuture<'a, Result<Evaluation>> {
        Box::pin(async move {
            let cluster = self.cluster.lock().unwrap();
            cluster
                .evaluations
                .get(eval_id)
                .cloned()
                .ok_or_else(|| not_found(format!("evaluation {eval_id}")))
        })
    }

    fn stop_job<'a>(
        &'a self,
        namespace: &'a str,
        job_id: &'a str,
        purge: bool,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move { self.do_stop(namespace, job_id, purge) })
    }

    /// The fake only understands JSON job specifications.
    fn parse_job<'a>(&'a self, hcl: &'a str) -> BoxFuture<'a, Result<Value>> {
        Box::pin(async move {
            serde_json::from_str(hcl)
                .map_err(|e| WatchError::Malformed(format!("cannot parse job: {e}")))
        })
    }

    fn register_job<'a>(
        &'a self,
        namespace: &'a str,
        job: Value,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move { self.do_register(namespace, job) })
    }

    fn event_stream<'a>(
        &'a self,
        _namespace: &'a str,
        _topics: &'a [String],
        _index: u64,
    ) -> BoxFuture<'a, Result<Box<dyn EventFeed>>> {
        Box::pin(async move {
            self.subscriptions.fetch_add(1, Ordering::SeqCst);
            if Self::take_failure(&self.failing_streams) {
                return Err(WatchError::Transport("connection reset".to_string()));
            }
            let (tx, rx) = mpsc::unbounded_channel();
            if !self.hang_up_streams.load(Ordering::SeqCst) {
                self.cluster.lock().unwrap().subscribers.push(tx);
            }
            Ok(Box::new(ChannelFeed { rx }) as Box<dyn EventFeed>)
        })
    }

    fn log_stream<'a>(
        &'a self,
        request: &'a LogRequest,
    ) -> BoxFuture<'a, Result<Box<dyn LogFeed>>> {
        Box::pin(async move {
            let file = self.log_file(&request.alloc_id, &request.task, request.kind);
            let len = file.data.lock().unwrap().len() as i64;
            let pos = match request.origin {
                LogOrigin::Start => request.offset.clamp(0, len),
                LogOrigin::End => (len - request.offset).clamp(0, len),
            };
            let generation = file.generation.load(Ordering::SeqCst);
            Ok(Box::new(FileFeed {
                file,
                pos: pos as usize,
                generation,
            }) as Box<dyn LogFeed>)
        })
    }
}
