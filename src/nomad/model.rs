// src/nomad/model.rs

//! The subset of the scheduler's JSON objects this tool reads.
//!
//! Field names follow the scheduler's PascalCase wire format. The scheduler
//! sends `null` for empty collections, so every collection goes through
//! [`null_default`].

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Deserialize `null` as `T::default()`.
pub fn null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Timestamps such as `StartedAt` are RFC3339 strings, with the zero time
/// (`0001-01-01T00:00:00Z`) standing for "never".
fn nullable_time<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    let Some(raw) = raw else {
        return Ok(None);
    };
    if raw.is_empty() {
        return Ok(None);
    }
    let parsed = DateTime::parse_from_rfc3339(&raw)
        .map_err(serde::de::Error::custom)?
        .with_timezone(&Utc);
    if parsed.timestamp() <= 0 {
        return Ok(None);
    }
    Ok(Some(parsed))
}

fn serialize_time<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    match value {
        Some(t) => serializer.serialize_some(&t.to_rfc3339()),
        None => serializer.serialize_none(),
    }
}

/// Job status as reported by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Pending,
    Running,
    Dead,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Job {
    #[serde(rename = "ID")]
    pub id: String,
    pub name: String,
    pub namespace: String,
    #[serde(rename = "Type")]
    pub job_type: String,
    pub version: u64,
    pub status: JobStatus,
    pub stop: bool,
    pub modify_index: u64,
    pub job_modify_index: u64,
    #[serde(deserialize_with = "null_default")]
    pub task_groups: Vec<TaskGroup>,
}

impl Job {
    pub fn is_dead(&self) -> bool {
        self.status == JobStatus::Dead
    }

    pub fn task_group(&self, name: &str) -> Option<&TaskGroup> {
        self.task_groups.iter().find(|g| g.name == name)
    }

    /// `id@namespace`, used in log and diagnostic messages.
    pub fn description(&self) -> String {
        format!("{}@{}", self.id, self.namespace)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct TaskGroup {
    pub name: String,
    pub count: u64,
    #[serde(deserialize_with = "null_default")]
    pub tasks: Vec<TaskSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct TaskSpec {
    pub name: String,
    pub lifecycle: Option<Lifecycle>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Lifecycle {
    pub hook: String,
    pub sidecar: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientStatus {
    #[default]
    Pending,
    Running,
    Complete,
    Failed,
    Lost,
    #[serde(other)]
    Unknown,
}

impl ClientStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ClientStatus::Pending => "pending",
            ClientStatus::Running => "running",
            ClientStatus::Complete => "complete",
            ClientStatus::Failed => "failed",
            ClientStatus::Lost => "lost",
            ClientStatus::Unknown => "unknown",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ClientStatus::Complete | ClientStatus::Failed | ClientStatus::Lost
        )
    }

    pub fn is_pending_or_running(self) -> bool {
        matches!(self, ClientStatus::Pending | ClientStatus::Running)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DesiredStatus {
    #[default]
    Run,
    Stop,
    Evict,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Allocation {
    #[serde(rename = "ID")]
    pub id: String,
    pub name: String,
    pub namespace: String,
    #[serde(rename = "EvalID")]
    pub eval_id: String,
    #[serde(rename = "NodeID")]
    pub node_id: String,
    pub node_name: String,
    #[serde(rename = "JobID")]
    pub job_id: String,
    /// Present on describe responses, absent on list stubs.
    pub job: Option<Job>,
    pub job_version: Option<u64>,
    pub task_group: String,
    pub client_status: ClientStatus,
    pub desired_status: DesiredStatus,
    #[serde(deserialize_with = "null_default")]
    pub task_states: HashMap<String, TaskState>,
    pub create_index: u64,
    pub modify_index: u64,
    /// Nanoseconds since the epoch.
    pub create_time: i64,
    pub modify_time: i64,
    #[serde(rename = "FollowupEvalID")]
    pub followup_eval_id: String,
    pub next_allocation: String,
}

impl Allocation {
    pub fn is_finished(&self) -> bool {
        self.client_status.is_terminal()
    }

    pub fn is_pending_or_running(&self) -> bool {
        self.client_status.is_pending_or_running()
    }

    pub fn short_id(&self) -> &str {
        short(&self.id)
    }
}

/// First six characters of an identifier.
pub fn short(id: &str) -> &str {
    match id.char_indices().nth(6) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct TaskState {
    /// `pending`, `running` or `dead`.
    pub state: String,
    pub failed: bool,
    pub restarts: u64,
    #[serde(deserialize_with = "nullable_time", serialize_with = "serialize_time")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "nullable_time", serialize_with = "serialize_time")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "null_default")]
    pub events: Vec<TaskEvent>,
}

impl TaskState {
    pub fn was_started(&self) -> bool {
        self.started_at.is_some()
    }

    pub fn is_dead(&self) -> bool {
        self.state == "dead"
    }

    pub fn is_running(&self) -> bool {
        self.state == "running"
    }

    /// Exit code of the most recent `Terminated` event, if any.
    pub fn exit_code(&self) -> Option<i32> {
        self.events
            .iter()
            .rev()
            .find(|e| e.event_type == "Terminated")
            .map(TaskEvent::exit_code)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct TaskEvent {
    #[serde(rename = "Type")]
    pub event_type: String,
    /// Nanoseconds since the epoch.
    pub time: i64,
    pub display_message: String,
    pub exit_code: i32,
    #[serde(deserialize_with = "null_default")]
    pub details: HashMap<String, String>,
}

impl TaskEvent {
    pub fn exit_code(&self) -> i32 {
        self.details
            .get("exit_code")
            .and_then(|s| s.parse().ok())
            .unwrap_or(self.exit_code)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Evaluation {
    #[serde(rename = "ID")]
    pub id: String,
    pub namespace: String,
    #[serde(rename = "JobID")]
    pub job_id: String,
    pub status: String,
    pub status_description: String,
    pub modify_index: u64,
    pub job_modify_index: Option<u64>,
    pub modify_time: i64,
    pub wait_until: Option<String>,
    #[serde(rename = "FailedTGAllocs", deserialize_with = "null_default")]
    pub failed_tg_allocs: HashMap<String, AllocMetric>,
}

impl Evaluation {
    pub fn is_pending(&self) -> bool {
        self.status == "pending"
    }

    pub fn is_blocked(&self) -> bool {
        self.status == "blocked"
    }

    pub fn wait_until(&self) -> Option<DateTime<Utc>> {
        let raw = self.wait_until.as_deref()?;
        let parsed = DateTime::parse_from_rfc3339(raw).ok()?.with_timezone(&Utc);
        (parsed.timestamp() > 0).then_some(parsed)
    }
}

/// Placement metrics for a task group that could not be placed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct AllocMetric {
    pub nodes_evaluated: u64,
    pub nodes_filtered: u64,
    pub nodes_exhausted: u64,
    #[serde(deserialize_with = "null_default")]
    pub constraint_filtered: HashMap<String, u64>,
    #[serde(deserialize_with = "null_default")]
    pub dimension_exhausted: HashMap<String, u64>,
}

impl AllocMetric {
    /// Human readable lines, each prefixed with `prefix`.
    pub fn describe(&self, prefix: &str) -> Vec<String> {
        let mut out = vec![format!(
            "{prefix}{} nodes evaluated, {} filtered, {} exhausted",
            self.nodes_evaluated, self.nodes_filtered, self.nodes_exhausted
        )];
        let mut constraints: Vec<_> = self.constraint_filtered.iter().collect();
        constraints.sort();
        for (constraint, count) in constraints {
            out.push(format!("{prefix}constraint {constraint} filtered {count} nodes"));
        }
        let mut dimensions: Vec<_> = self.dimension_exhausted.iter().collect();
        dimensions.sort();
        for (dimension, count) in dimensions {
            out.push(format!("{prefix}dimension {dimension} exhausted on {count} nodes"));
        }
        out
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Deployment {
    #[serde(rename = "ID")]
    pub id: String,
    pub namespace: String,
    #[serde(rename = "JobID")]
    pub job_id: String,
    pub status: String,
    pub modify_index: u64,
    pub job_modify_index: u64,
}

impl Deployment {
    pub fn is_active(&self) -> bool {
        matches!(
            self.status.as_str(),
            "initializing" | "running" | "pending" | "blocked" | "paused"
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct JobSummary {
    #[serde(rename = "JobID")]
    pub job_id: String,
    #[serde(deserialize_with = "null_default")]
    pub summary: HashMap<String, TaskGroupSummary>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct TaskGroupSummary {
    pub queued: u64,
    pub complete: u64,
    pub failed: u64,
    pub running: u64,
    pub starting: u64,
    pub lost: u64,
    pub unknown: u64,
}

impl JobSummary {
    /// Sum of every task group's counters.
    pub fn totals(&self) -> TaskGroupSummary {
        self.summary
            .values()
            .fold(TaskGroupSummary::default(), |acc, s| TaskGroupSummary {
                queued: acc.queued + s.queued,
                complete: acc.complete + s.complete,
                failed: acc.failed + s.failed,
                running: acc.running + s.running,
                starting: acc.starting + s.starting,
                lost: acc.lost + s.lost,
                unknown: acc.unknown + s.unknown,
            })
    }
}

impl TaskGroupSummary {
    /// Every metric is zero except a non-zero `complete`.
    pub fn finished_successfully(&self) -> bool {
        self.queued == 0
            && self.complete != 0
            && self.failed == 0
            && self.running == 0
            && self.starting == 0
            && self.lost == 0
            && self.unknown == 0
    }

    /// Allocations are running and nothing failed, got lost, or is waiting.
    pub fn running_successfully(&self) -> bool {
        self.queued == 0
            && self.failed == 0
            && self.running != 0
            && self.starting == 0
            && self.lost == 0
    }
}

/// One batch on the event stream. A heartbeat is an empty object.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct EventBatch {
    pub index: u64,
    #[serde(deserialize_with = "null_default")]
    pub events: Vec<RawEvent>,
}

impl EventBatch {
    pub fn is_heartbeat(&self) -> bool {
        self.index == 0 && self.events.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct RawEvent {
    pub topic: String,
    #[serde(rename = "Type")]
    pub event_type: String,
    pub key: String,
    pub namespace: String,
    pub index: u64,
    pub payload: serde_json::Value,
}

/// Wire frame of the task logs endpoint. `Data` is base64.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct StreamFrame {
    pub data: String,
    pub offset: i64,
    pub file: String,
    pub file_event: String,
}

/// Decoded log frame handed to readers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogFrame {
    pub data: Vec<u8>,
    /// File offset just past the last byte of `data`. The logs endpoint
    /// advances it before sending the frame, so it is also the resume point.
    pub offset: i64,
}

impl LogFrame {
    pub fn heartbeat() -> Self {
        Self::default()
    }

    pub fn is_heartbeat(&self) -> bool {
        self.data.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct RegisterResponse {
    #[serde(rename = "EvalID")]
    pub eval_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocation_tolerates_nulls_and_zero_times() {
        let raw = r#"{
            "ID": "8ba85cef-d7e4-1b3e-6b4b-4a3b4f5a6b7c",
            "JobID": "example",
            "TaskGroup": "cache",
            "ClientStatus": "running",
            "DesiredStatus": "run",
            "ModifyIndex": 42,
            "TaskStates": {
                "redis": {
                    "State": "running",
                    "StartedAt": "2024-01-02T03:04:05.123456Z",
                    "FinishedAt": "0001-01-01T00:00:00Z",
                    "Events": null
                }
            }
        }"#;
        let alloc: Allocation = serde_json::from_str(raw).unwrap();
        assert_eq!(alloc.short_id(), "8ba85c");
        assert_eq!(alloc.client_status, ClientStatus::Running);
        let redis = &alloc.task_states["redis"];
        assert!(redis.was_started());
        assert!(redis.finished_at.is_none());
        assert!(redis.events.is_empty());
    }

    #[test]
    fn terminated_event_carries_exit_code() {
        let state = TaskState {
            state: "dead".into(),
            events: vec![
                TaskEvent {
                    event_type: "Started".into(),
                    ..Default::default()
                },
                TaskEvent {
                    event_type: "Terminated".into(),
                    details: HashMap::from([("exit_code".to_string(), "3".to_string())]),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        assert_eq!(state.exit_code(), Some(3));
    }

    #[test]
    fn summary_success_predicates() {
        let done = TaskGroupSummary {
            complete: 2,
            ..Default::default()
        };
        assert!(done.finished_successfully());
        assert!(!done.running_successfully());

        let running = TaskGroupSummary {
            running: 1,
            complete: 1,
            ..Default::default()
        };
        assert!(!running.finished_successfully());
        assert!(running.running_successfully());
    }

    #[test]
    fn unknown_statuses_do_not_fail_decoding() {
        let alloc: Allocation =
            serde_json::from_str(r#"{"ClientStatus": "unknown-new-status"}"#).unwrap();
        assert_eq!(alloc.client_status, ClientStatus::Unknown);
    }
}
