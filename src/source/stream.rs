// src/source/stream.rs

//! Streaming strategy: subscribe to the event stream, list the scope, then
//! relay events. Every (re)subscription is followed by a fresh listing so a
//! gap while disconnected cannot hide a change.

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::listing::fetch_listing;
use super::{Notification, SourceOptions, note_failure};
use crate::engine::WatchEvent;
use crate::errors::{Result, WatchError};
use crate::nomad::{EventFeed, NomadApi};
use crate::shutdown::ShutdownToken;
use crate::state::WatchedScope;

pub(crate) async fn run_streaming(
    api: &dyn NomadApi,
    scope: &WatchedScope,
    options: &SourceOptions,
    tx: &mpsc::Sender<WatchEvent>,
    shutdown: &ShutdownToken,
) -> Result<()> {
    let topics = scope.topics();
    let mut resume_index = 0u64;
    // Consecutive failures. Only traffic on the feed resets it, so a server
    // that accepts and then drops every subscription still hits the ceiling.
    let mut failures = 0u32;

    loop {
        let connected = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            res = subscribe_and_list(api, scope, &topics, resume_index) => res,
        };

        let (mut feed, listing) = match connected {
            Ok(ok) => ok,
            Err(err) if err.is_retryable() => {
                if !back_off(&mut failures, options, &err, shutdown).await? {
                    return Ok(());
                }
                continue;
            }
            Err(err) => return Err(err),
        };

        if tx.send(WatchEvent::Notifications(listing)).await.is_err() {
            return Ok(());
        }

        let lost = loop {
            let next = tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                next = feed.next_batch() => next,
            };
            match next {
                Ok(Some(batch)) => {
                    if failures > 0 {
                        info!(scope = %scope.describe(), "event stream reconnected");
                        failures = 0;
                    }
                    if batch.is_heartbeat() {
                        continue;
                    }
                    resume_index = resume_index.max(batch.index);
                    let notifications = decode_batch(&batch.events);
                    if !notifications.is_empty()
                        && tx.send(WatchEvent::Notifications(notifications)).await.is_err()
                    {
                        return Ok(());
                    }
                }
                Ok(None) => {
                    debug!("event stream closed by server");
                    break WatchError::Transport("event stream closed by server".to_string());
                }
                Err(WatchError::Malformed(msg)) => {
                    warn!(error = %msg, "skipping malformed event batch");
                }
                Err(err) if err.is_retryable() => break err,
                Err(err) => return Err(err),
            }
        };

        if !back_off(&mut failures, options, &lost, shutdown).await? {
            return Ok(());
        }
    }
}

/// Count one failure and wait out its backoff delay. `Ok(false)` on shutdown.
async fn back_off(
    failures: &mut u32,
    options: &SourceOptions,
    err: &WatchError,
    shutdown: &ShutdownToken,
) -> Result<bool> {
    note_failure(failures, options.max_retries, err)?;
    let delay = options.backoff.delay(*failures);
    warn!(error = %err, attempt = *failures, ?delay, "event stream unavailable, retrying");
    tokio::select! {
        _ = shutdown.cancelled() => Ok(false),
        _ = tokio::time::sleep(delay) => Ok(true),
    }
}

async fn subscribe_and_list(
    api: &dyn NomadApi,
    scope: &WatchedScope,
    topics: &[String],
    index: u64,
) -> Result<(Box<dyn EventFeed>, Vec<Notification>)> {
    let feed = api.event_stream(&scope.namespace, topics, index).await?;
    let listing = fetch_listing(api, scope).await?;
    Ok((feed, listing))
}

fn decode_batch(events: &[crate::nomad::RawEvent]) -> Vec<Notification> {
    events
        .iter()
        .filter_map(|raw| match Notification::from_raw(raw) {
            Ok(n) => n,
            Err(err) => {
                warn!(topic = %raw.topic, key = %raw.key, error = %err, "skipping malformed event");
                None
            }
        })
        .collect()
}
