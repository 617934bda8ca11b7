// src/nomad/submit.rs

//! Target resolution: registering a job from a file and locating the job
//! or allocation a watch is about.

use std::io::Read;
use std::path::Path;
use std::time::Duration;

use serde_json::Value;
use tracing::{info, warn};

use super::NomadApi;
use super::model::{Allocation, Evaluation, Job};
use crate::errors::{Result, WatchError};
use crate::source::BackoffPolicy;

/// A job that was just registered.
#[derive(Debug, Clone)]
pub struct SubmittedJob {
    pub job: Job,
    pub eval_id: String,
}

/// Read a job specification from a path, `-` for stdin, or inline text.
pub fn read_jobfile(jobfile: &str) -> Result<String> {
    if jobfile == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        return Ok(buf);
    }
    let path = Path::new(jobfile);
    if path.is_file() {
        return Ok(std::fs::read_to_string(path)?);
    }
    Ok(jobfile.to_string())
}

/// Turn job specification text into the JSON object the register endpoint
/// expects. JSON input may be either the bare job or `{"Job": {...}}`.
pub async fn job_definition(api: &dyn NomadApi, text: &str, json: bool) -> Result<Value> {
    if json {
        let mut value: Value = serde_json::from_str(text)?;
        if let Some(inner) = value.get_mut("Job") {
            return Ok(inner.take());
        }
        return Ok(value);
    }
    api.parse_job(text).await
}

/// Register the job, wait for its evaluation to be processed, and return the
/// registered job.
pub async fn submit_job(
    api: &dyn NomadApi,
    default_namespace: &str,
    definition: Value,
    poll: BackoffPolicy,
) -> Result<SubmittedJob> {
    let job_id = definition
        .get("ID")
        .and_then(Value::as_str)
        .ok_or_else(|| WatchError::ConfigError("job definition has no ID".to_string()))?
        .to_string();
    let mut namespace = definition
        .get("Namespace")
        .and_then(Value::as_str)
        .filter(|ns| !ns.is_empty())
        .unwrap_or(default_namespace)
        .to_string();

    let eval_id = api.register_job(&namespace, definition).await?;
    info!(job = %job_id, %namespace, eval = %eval_id, "registered job");

    if !eval_id.is_empty() {
        let eval = wait_for_evaluation(api, &eval_id, poll).await?;
        for (group, metric) in &eval.failed_tg_allocs {
            for line in metric.describe(&format!("{group}: ")) {
                warn!(job = %job_id, "placement failure: {line}");
            }
        }
        if !eval.namespace.is_empty() {
            namespace = eval.namespace;
        }
    }

    let job = api.job(&namespace, &job_id).await?;
    Ok(SubmittedJob { job, eval_id })
}

/// Poll an evaluation until it leaves the `pending` state.
pub async fn wait_for_evaluation(
    api: &dyn NomadApi,
    eval_id: &str,
    poll: BackoffPolicy,
) -> Result<Evaluation> {
    let mut attempt = 0u32;
    loop {
        let eval = api.evaluation(eval_id).await?;
        match eval.status.as_str() {
            "pending" => {}
            "complete" | "blocked" => return Ok(eval),
            other => {
                return Err(WatchError::Other(anyhow::anyhow!(
                    "evaluation {eval_id} did not complete: {other} {}",
                    eval.status_description
                )));
            }
        }
        attempt = attempt.saturating_add(1);
        tokio::time::sleep(poll.delay(attempt).min(Duration::from_secs(2))).await;
    }
}

/// Resolve an allocation ID or unique prefix.
pub async fn find_allocation(api: &dyn NomadApi, id: &str) -> Result<Allocation> {
    let mut matches = api.allocations_by_prefix(id).await?;
    match matches.len() {
        0 => Err(WatchError::NotFound(format!("allocation {id}"))),
        1 => {
            let stub = matches.remove(0);
            api.allocation(&stub.id).await
        }
        n => Err(WatchError::ConfigError(format!(
            "allocation prefix {id} matches {n} allocations"
        ))),
    }
}

/// Resolve a job that must already exist.
pub async fn find_job(api: &dyn NomadApi, namespace: &str, job_id: &str) -> Result<Job> {
    api.job(namespace, job_id).await.map_err(|e| match e {
        WatchError::NotFound(_) => WatchError::NotFound(format!("job {job_id}@{namespace}")),
        other => other,
    })
}
