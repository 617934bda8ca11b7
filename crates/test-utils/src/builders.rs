#![allow(dead_code)]

use std::collections::HashMap;

use chrono::{DateTime, TimeZone, Utc};
use nomad_watch::nomad::model::{
    Allocation, ClientStatus, Evaluation, Job, JobStatus, Lifecycle, TaskEvent, TaskGroup,
    TaskSpec, TaskState,
};

/// A fixed point in time, `secs` seconds after 2024-01-01T00:00:00Z.
pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_704_067_200 + secs, 0)
        .single()
        .expect("valid timestamp")
}

/// Builder for `Job` to simplify test setup.
pub struct JobBuilder {
    job: Job,
}

impl JobBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            job: Job {
                id: id.to_string(),
                name: id.to_string(),
                namespace: "default".to_string(),
                job_type: "batch".to_string(),
                version: 0,
                status: JobStatus::Running,
                modify_index: 1,
                job_modify_index: 1,
                ..Default::default()
            },
        }
    }

    pub fn namespace(mut self, ns: &str) -> Self {
        self.job.namespace = ns.to_string();
        self
    }

    pub fn version(mut self, version: u64) -> Self {
        self.job.version = version;
        self
    }

    pub fn status(mut self, status: JobStatus) -> Self {
        self.job.status = status;
        self
    }

    pub fn stopped(mut self) -> Self {
        self.job.stop = true;
        self.job.status = JobStatus::Dead;
        self
    }

    /// Sets both the modify index and the job modify index.
    pub fn index(mut self, index: u64) -> Self {
        self.job.modify_index = index;
        self.job.job_modify_index = index;
        self
    }

    /// Add a group whose tasks are all main tasks.
    pub fn group(mut self, name: &str, tasks: &[&str]) -> Self {
        self.job.task_groups.push(TaskGroup {
            name: name.to_string(),
            count: 1,
            tasks: tasks
                .iter()
                .map(|t| TaskSpec {
                    name: t.to_string(),
                    lifecycle: None,
                })
                .collect(),
        });
        self
    }

    /// Add a lifecycle task to an existing group.
    pub fn hook_task(mut self, group: &str, task: &str, hook: &str, sidecar: bool) -> Self {
        let group = self
            .job
            .task_groups
            .iter_mut()
            .find(|g| g.name == group)
            .expect("group added before its hook tasks");
        group.tasks.push(TaskSpec {
            name: task.to_string(),
            lifecycle: Some(Lifecycle {
                hook: hook.to_string(),
                sidecar,
            }),
        });
        self
    }

    pub fn build(self) -> Job {
        self.job
    }
}

/// Builder for `Allocation`.
pub struct AllocBuilder {
    alloc: Allocation,
}

impl AllocBuilder {
    pub fn new(id: &str, job_id: &str) -> Self {
        Self {
            alloc: Allocation {
                id: id.to_string(),
                name: format!("{job_id}.g[0]"),
                namespace: "default".to_string(),
                eval_id: "eval-1".to_string(),
                node_id: "node-1".to_string(),
                node_name: "node1".to_string(),
                job_id: job_id.to_string(),
                job_version: Some(0),
                task_group: "g".to_string(),
                client_status: ClientStatus::Pending,
                create_index: 10,
                modify_index: 10,
                ..Default::default()
            },
        }
    }

    pub fn namespace(mut self, ns: &str) -> Self {
        self.alloc.namespace = ns.to_string();
        self
    }

    pub fn group(mut self, group: &str) -> Self {
        self.alloc.task_group = group.to_string();
        self
    }

    pub fn node(mut self, name: &str) -> Self {
        self.alloc.node_name = name.to_string();
        self
    }

    pub fn job_version(mut self, version: u64) -> Self {
        self.alloc.job_version = Some(version);
        self
    }

    pub fn status(mut self, status: ClientStatus) -> Self {
        self.alloc.client_status = status;
        self
    }

    pub fn created(mut self, index: u64) -> Self {
        self.alloc.create_index = index;
        self.alloc.modify_index = self.alloc.modify_index.max(index);
        self
    }

    pub fn modified(mut self, index: u64) -> Self {
        self.alloc.modify_index = index;
        self
    }

    pub fn task(mut self, name: &str, state: TaskState) -> Self {
        self.alloc.task_states.insert(name.to_string(), state);
        self
    }

    pub fn replaced_by(mut self, next: &str) -> Self {
        self.alloc.next_allocation = next.to_string();
        self
    }

    pub fn followup_eval(mut self, eval_id: &str) -> Self {
        self.alloc.followup_eval_id = eval_id.to_string();
        self
    }

    pub fn build(self) -> Allocation {
        self.alloc
    }
}

fn event(kind: &str, time: DateTime<Utc>, message: &str) -> TaskEvent {
    TaskEvent {
        event_type: kind.to_string(),
        time: time.timestamp_nanos_opt().unwrap_or_default(),
        display_message: message.to_string(),
        ..Default::default()
    }
}

pub fn pending() -> TaskState {
    TaskState {
        state: "pending".to_string(),
        events: vec![event("Received", at(0), "Task received by client")],
        ..Default::default()
    }
}

pub fn running(since: DateTime<Utc>) -> TaskState {
    TaskState {
        state: "running".to_string(),
        started_at: Some(since),
        events: vec![
            event("Received", since, "Task received by client"),
            event("Started", since, "Task started by client"),
        ],
        ..Default::default()
    }
}

/// Started at `since`, exited with `code` one second later.
pub fn exited(since: DateTime<Utc>, code: i32) -> TaskState {
    let finished = since + chrono::Duration::seconds(1);
    let mut terminated = event(
        "Terminated",
        finished,
        &format!("Exit Code: {code}"),
    );
    terminated.details = HashMap::from([("exit_code".to_string(), code.to_string())]);
    let mut state = running(since);
    state.state = "dead".to_string();
    state.failed = code != 0;
    state.finished_at = Some(finished);
    state.events.push(terminated);
    state
}

/// Dead before it ever started.
pub fn failed_setup(message: &str) -> TaskState {
    TaskState {
        state: "dead".to_string(),
        failed: true,
        events: vec![event("Setup Failure", at(0), message)],
        ..Default::default()
    }
}

pub fn evaluation(id: &str, job_id: &str, status: &str, index: u64) -> Evaluation {
    Evaluation {
        id: id.to_string(),
        namespace: "default".to_string(),
        job_id: job_id.to_string(),
        status: status.to_string(),
        modify_index: index,
        job_modify_index: Some(1),
        ..Default::default()
    }
}
