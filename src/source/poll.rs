// src/source/poll.rs

//! Polling strategy: list the whole scope every `poll_interval`.

use tokio::sync::mpsc;
use tracing::warn;

use super::listing::fetch_listing;
use super::{SourceOptions, note_failure};
use crate::engine::WatchEvent;
use crate::errors::Result;
use crate::nomad::NomadApi;
use crate::shutdown::ShutdownToken;
use crate::state::WatchedScope;

pub(crate) async fn run_polling(
    api: &dyn NomadApi,
    scope: &WatchedScope,
    options: &SourceOptions,
    tx: &mpsc::Sender<WatchEvent>,
    shutdown: &ShutdownToken,
) -> Result<()> {
    let mut failures = 0u32;
    loop {
        let listed = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            res = fetch_listing(api, scope) => res,
        };
        let wait = match listed {
            Ok(notifications) => {
                failures = 0;
                if tx.send(WatchEvent::Notifications(notifications)).await.is_err() {
                    return Ok(());
                }
                options.poll_interval
            }
            Err(err) if err.is_retryable() => {
                note_failure(&mut failures, options.max_retries, &err)?;
                let delay = options.backoff.delay(failures);
                warn!(error = %err, attempt = failures, ?delay, "poll failed, retrying");
                delay
            }
            Err(err) => return Err(err),
        };
        tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            _ = tokio::time::sleep(wait) => {}
        }
    }
}
