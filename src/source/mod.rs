// src/source/mod.rs

//! Event Source: one ordered sequence of change notifications, fed either
//! by the event stream or by polling.
//!
//! The source runs as its own task and pushes batches into the runtime
//! channel. It ends on shutdown or on a fatal error, which it reports as
//! [`WatchEvent::SourceFailed`].

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub mod backoff;
pub mod listing;
pub mod poll;
pub mod stream;

pub use backoff::BackoffPolicy;

use crate::engine::WatchEvent;
use crate::errors::{Result, WatchError};
use crate::nomad::model::{Allocation, Deployment, Evaluation, Job, RawEvent};
use crate::nomad::NomadApi;
use crate::shutdown::ShutdownToken;
use crate::state::WatchedScope;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    Job,
    Evaluation,
    Allocation,
    Deployment,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Job(Job),
    /// The job was deregistered. Carries the job as last seen.
    JobDeregistered(Job),
    /// A listing found no job at all.
    JobMissing,
    Evaluation(Evaluation),
    Allocation(Allocation),
    Deployment(Deployment),
}

/// One change to one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub kind: EntityKind,
    pub entity_id: String,
    /// Per-entity sequence number. Higher is newer.
    pub index: u64,
    pub payload: Payload,
}

impl Notification {
    pub fn job(job: Job) -> Self {
        Self {
            kind: EntityKind::Job,
            entity_id: job.id.clone(),
            index: job.modify_index,
            payload: Payload::Job(job),
        }
    }

    pub fn job_deregistered(job: Job, index: u64) -> Self {
        Self {
            kind: EntityKind::Job,
            entity_id: job.id.clone(),
            index: index.max(job.modify_index),
            payload: Payload::JobDeregistered(job),
        }
    }

    pub fn job_missing(job_id: impl Into<String>) -> Self {
        Self {
            kind: EntityKind::Job,
            entity_id: job_id.into(),
            index: 0,
            payload: Payload::JobMissing,
        }
    }

    pub fn evaluation(eval: Evaluation) -> Self {
        Self {
            kind: EntityKind::Evaluation,
            entity_id: eval.id.clone(),
            index: eval.modify_index,
            payload: Payload::Evaluation(eval),
        }
    }

    pub fn allocation(alloc: Allocation) -> Self {
        Self {
            kind: EntityKind::Allocation,
            entity_id: alloc.id.clone(),
            index: alloc.modify_index,
            payload: Payload::Allocation(alloc),
        }
    }

    pub fn deployment(deployment: Deployment) -> Self {
        Self {
            kind: EntityKind::Deployment,
            entity_id: deployment.id.clone(),
            index: deployment.modify_index,
            payload: Payload::Deployment(deployment),
        }
    }

    /// Namespace carried by the payload, if any.
    pub fn namespace(&self) -> Option<&str> {
        let ns = match &self.payload {
            Payload::Job(j) | Payload::JobDeregistered(j) => &j.namespace,
            Payload::Evaluation(e) => &e.namespace,
            Payload::Allocation(a) => &a.namespace,
            Payload::Deployment(d) => &d.namespace,
            Payload::JobMissing => return None,
        };
        (!ns.is_empty()).then_some(ns.as_str())
    }

    /// Decode one event stream entry. Topics this watcher does not track
    /// yield `Ok(None)`.
    pub fn from_raw(raw: &RawEvent) -> Result<Option<Self>> {
        let body = raw.payload.get(&raw.topic).cloned().ok_or_else(|| {
            WatchError::Malformed(format!(
                "{} event {} has no {} payload",
                raw.topic, raw.key, raw.topic
            ))
        })?;
        let notification = match raw.topic.as_str() {
            "Job" => {
                let job: Job = serde_json::from_value(body)?;
                if raw.event_type == "JobDeregistered" {
                    Self::job_deregistered(job, raw.index)
                } else {
                    Self::job(job)
                }
            }
            "Evaluation" => Self::evaluation(serde_json::from_value(body)?),
            "Allocation" => Self::allocation(serde_json::from_value(body)?),
            "Deployment" => Self::deployment(serde_json::from_value(body)?),
            _ => return Ok(None),
        };
        Ok(Some(notification))
    }
}

/// How the source retrieves changes and how hard it retries.
#[derive(Debug, Clone)]
pub struct SourceOptions {
    pub polling: bool,
    pub poll_interval: Duration,
    pub backoff: BackoffPolicy,
    pub max_retries: u32,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            polling: false,
            poll_interval: Duration::from_secs(1),
            backoff: BackoffPolicy::default(),
            max_retries: 10,
        }
    }
}

/// Spawn the event source for `scope`.
pub fn spawn_event_source(
    api: Arc<dyn NomadApi>,
    scope: WatchedScope,
    options: SourceOptions,
    tx: mpsc::Sender<WatchEvent>,
    shutdown: ShutdownToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let result = if options.polling {
            poll::run_polling(api.as_ref(), &scope, &options, &tx, &shutdown).await
        } else {
            stream::run_streaming(api.as_ref(), &scope, &options, &tx, &shutdown).await
        };
        if let Err(err) = result {
            if !shutdown.is_shutdown() {
                let _ = tx.send(WatchEvent::SourceFailed(err)).await;
            }
        }
    })
}

/// Count a transport failure; `Err` once the ceiling is passed.
pub(crate) fn note_failure(failures: &mut u32, max: u32, err: &WatchError) -> Result<()> {
    *failures += 1;
    if *failures > max {
        return Err(WatchError::RetriesExhausted {
            attempts: *failures,
            last: err.to_string(),
        });
    }
    Ok(())
}
