// src/nomad/mod.rs

//! Control-plane abstraction.
//!
//! Everything the watcher asks of the scheduler goes through [`NomadApi`].
//! Production code uses [`HttpNomad`]; tests use the in-memory fake from
//! the test-utils crate.
//!
//! Streaming endpoints hand back boxed feeds ([`EventFeed`], [`LogFeed`])
//! that yield decoded values one at a time. `Ok(None)` from a feed means
//! the server closed the stream.

use std::future::Future;
use std::pin::Pin;

pub mod client;
pub mod frames;
pub mod model;
pub mod submit;

pub use client::HttpNomad;
pub use model::{
    Allocation, Deployment, EventBatch, Evaluation, Job, JobSummary, LogFrame, RawEvent,
};

use crate::errors::Result;
use crate::types::LogKind;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Where a log stream starts reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOrigin {
    Start,
    End,
}

impl LogOrigin {
    pub fn as_str(self) -> &'static str {
        match self {
            LogOrigin::Start => "start",
            LogOrigin::End => "end",
        }
    }
}

/// Parameters of one follow-mode log stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRequest {
    pub alloc_id: String,
    pub task: String,
    pub kind: LogKind,
    pub origin: LogOrigin,
    /// Byte offset relative to `origin`.
    pub offset: i64,
}

pub trait EventFeed: Send {
    fn next_batch(&mut self) -> BoxFuture<'_, Result<Option<EventBatch>>>;
}

pub trait LogFeed: Send {
    fn next_frame(&mut self) -> BoxFuture<'_, Result<Option<LogFrame>>>;
}

/// Read and write operations against the scheduler's HTTP API.
pub trait NomadApi: Send + Sync {
    fn job<'a>(&'a self, namespace: &'a str, job_id: &'a str) -> BoxFuture<'a, Result<Job>>;

    fn job_evaluations<'a>(
        &'a self,
        namespace: &'a str,
        job_id: &'a str,
    ) -> BoxFuture<'a, Result<Vec<Evaluation>>>;

    fn job_allocations<'a>(
        &'a self,
        namespace: &'a str,
        job_id: &'a str,
    ) -> BoxFuture<'a, Result<Vec<Allocation>>>;

    fn job_deployments<'a>(
        &'a self,
        namespace: &'a str,
        job_id: &'a str,
    ) -> BoxFuture<'a, Result<Vec<Deployment>>>;

    fn job_summary<'a>(
        &'a self,
        namespace: &'a str,
        job_id: &'a str,
    ) -> BoxFuture<'a, Result<JobSummary>>;

    fn allocation<'a>(&'a self, alloc_id: &'a str) -> BoxFuture<'a, Result<Allocation>>;

    /// Allocations in any namespace whose ID starts with `prefix`.
    fn allocations_by_prefix<'a>(&'a self, prefix: &'a str)
    -> BoxFuture<'a, Result<Vec<Allocation>>>;

    fn evaluation<'a>(&'a self, eval_id: &'a str) -> BoxFuture<'a, Result<Evaluation>>;

    /// Deregister the job. Returns the ID of the resulting evaluation.
    fn stop_job<'a>(
        &'a self,
        namespace: &'a str,
        job_id: &'a str,
        purge: bool,
    ) -> BoxFuture<'a, Result<String>>;

    /// Convert an HCL job specification to its JSON form.
    fn parse_job<'a>(&'a self, hcl: &'a str) -> BoxFuture<'a, Result<serde_json::Value>>;

    /// Register a job. Returns the ID of the resulting evaluation.
    fn register_job<'a>(
        &'a self,
        namespace: &'a str,
        job: serde_json::Value,
    ) -> BoxFuture<'a, Result<String>>;

    /// Subscribe to the event stream for `topics`, starting at `index`.
    fn event_stream<'a>(
        &'a self,
        namespace: &'a str,
        topics: &'a [String],
        index: u64,
    ) -> BoxFuture<'a, Result<Box<dyn EventFeed>>>;

    fn log_stream<'a>(&'a self, request: &'a LogRequest) -> BoxFuture<'a, Result<Box<dyn LogFeed>>>;
}
