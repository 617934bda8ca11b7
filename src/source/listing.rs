// src/source/listing.rs

//! Full listing of everything in scope, used for the initial state, after
//! every reconnect, and on every polling tick.

use crate::errors::{Result, WatchError};
use crate::nomad::NomadApi;
use crate::state::{ScopeTarget, WatchedScope};

use super::Notification;

/// List the scope as notifications. Deployments and evaluations come before
/// allocations so allocation admission can consult evaluation indices; the
/// job comes last.
pub async fn fetch_listing(api: &dyn NomadApi, scope: &WatchedScope) -> Result<Vec<Notification>> {
    match &scope.target {
        ScopeTarget::Allocation { alloc_id, .. } => {
            let alloc = api.allocation(alloc_id).await?;
            Ok(vec![Notification::allocation(alloc)])
        }
        ScopeTarget::Job { job_id } => {
            let ns = scope.namespace.as_str();
            let job = match api.job(ns, job_id).await {
                Ok(job) => Some(job),
                Err(WatchError::NotFound(_)) => None,
                Err(e) => return Err(e),
            };

            // Allocations outlive a purged job until garbage collection.
            let mut out = Vec::new();
            out.extend(
                or_empty(api.job_deployments(ns, job_id).await)?
                    .into_iter()
                    .map(Notification::deployment),
            );
            out.extend(
                or_empty(api.job_evaluations(ns, job_id).await)?
                    .into_iter()
                    .map(Notification::evaluation),
            );
            out.extend(
                or_empty(api.job_allocations(ns, job_id).await)?
                    .into_iter()
                    .map(Notification::allocation),
            );
            out.push(match job {
                Some(job) => Notification::job(job),
                None => Notification::job_missing(job_id.clone()),
            });
            Ok(out)
        }
    }
}

fn or_empty<T>(listed: Result<Vec<T>>) -> Result<Vec<T>> {
    match listed {
        Err(WatchError::NotFound(_)) => Ok(Vec::new()),
        other => other,
    }
}
