// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod logging;
pub mod logs;
pub mod nomad;
pub mod shutdown;
pub mod source;
pub mod state;
pub mod types;

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::cli::{CliArgs, WatchCommand};
use crate::config::{Settings, load_optional};
use crate::engine::{WatchEvent, WatchMode, WatchOutcome, WatchPlan, run_watch};
use crate::errors::WatchError;
use crate::logs::{SINK_CAPACITY, spawn_printer};
use crate::nomad::submit::{find_allocation, find_job, job_definition, read_jobfile, submit_job};
use crate::nomad::{HttpNomad, NomadApi};
use crate::state::WatchedScope;

/// Capacity of the runtime event channel.
const EVENT_CAPACITY: usize = 64;

/// High-level entry point used by `main.rs`. Returns the process exit code.
///
/// This wires together:
/// - config loading and settings resolution
/// - the HTTP client
/// - target resolution (and job registration for `run`/`start`)
/// - the output printer on stdout
/// - Ctrl-C handling
/// - the watch runtime
pub async fn run(args: CliArgs) -> Result<i32> {
    let file = load_optional(args.config.as_deref())?;
    let settings = Settings::resolve(&args, &file)?;
    debug!(address = %settings.nomad.address, namespace = %settings.nomad.namespace, "resolved settings");

    let api: Arc<dyn NomadApi> = Arc::new(HttpNomad::new(&settings.nomad)?);
    let outcome = watch(api, &args.command, args.watch.json, &settings, std::io::stdout()).await?;
    Ok(outcome.exit_code)
}

/// Resolve the target of `command`, then watch it, printing to `out`.
pub async fn watch<W>(
    api: Arc<dyn NomadApi>,
    command: &WatchCommand,
    json: bool,
    settings: &Settings,
    out: W,
) -> Result<WatchOutcome>
where
    W: Write + Send + 'static,
{
    let (tx, rx) = mpsc::channel::<WatchEvent>(EVENT_CAPACITY);

    // Ctrl-C → interrupt. Repeated presses are delivered too. Listening starts
    // before target resolution so a slow submit can be interrupted as well.
    let signals = {
        let tx = tx.clone();
        tokio::spawn(async move {
            loop {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!("failed to listen for Ctrl+C: {e}");
                    return;
                }
                if tx.send(WatchEvent::Interrupted).await.is_err() {
                    return;
                }
            }
        })
    };

    let outcome = watch_with_events(api, command, json, settings, out, tx, rx).await;
    signals.abort();
    outcome
}

/// Like [`watch`], with interrupts and other runtime events delivered
/// through `tx`/`rx` by the caller.
pub async fn watch_with_events<W>(
    api: Arc<dyn NomadApi>,
    command: &WatchCommand,
    json: bool,
    settings: &Settings,
    out: W,
    tx: mpsc::Sender<WatchEvent>,
    mut rx: mpsc::Receiver<WatchEvent>,
) -> Result<WatchOutcome>
where
    W: Write + Send + 'static,
{
    let plan = tokio::select! {
        plan = resolve_plan(api.as_ref(), command, json, settings) => plan?,
        Some(WatchEvent::Interrupted) = rx.recv() => {
            return Err(WatchError::Interrupted("while resolving the watch target".to_string()).into());
        }
    };

    let (sink, sink_rx) = mpsc::channel(SINK_CAPACITY);
    let printer = spawn_printer(sink_rx, settings.format.clone(), out);

    let outcome = run_watch(api, plan, &settings.watch, sink, tx, rx).await;

    match printer.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("writing output failed: {e}"),
        Err(e) => warn!("output printer stopped: {e}"),
    }

    let outcome = outcome?;
    info!(finish = ?outcome.finish, exit_code = outcome.exit_code, "done");
    Ok(outcome)
}

/// Find (or register) what `command` is about.
pub async fn resolve_plan(
    api: &dyn NomadApi,
    command: &WatchCommand,
    json: bool,
    settings: &Settings,
) -> Result<WatchPlan> {
    let mode = WatchMode::from_command(command);
    let namespace = settings.nomad.namespace.as_str();
    let watch = &settings.watch;

    let (scope, job) = match command {
        WatchCommand::Alloc { allocid } => {
            let alloc = find_allocation(api, allocid).await?;
            let scope = WatchedScope::allocation(or_default(&alloc.namespace, namespace), &alloc.id, &alloc.job_id);
            (scope, None)
        }
        WatchCommand::Run { jobfile } | WatchCommand::Start { jobfile } => {
            let text = read_jobfile(jobfile).with_context(|| format!("reading {jobfile}"))?;
            let definition = job_definition(api, &text, json).await?;
            let submitted = submit_job(api, namespace, definition, watch.backoff).await?;
            let scope = WatchedScope::job(or_default(&submitted.job.namespace, namespace), &submitted.job.id);
            (scope, Some(submitted.job))
        }
        WatchCommand::Job { jobid }
        | WatchCommand::Started { jobid }
        | WatchCommand::Stop { jobid }
        | WatchCommand::Stopped { jobid }
        | WatchCommand::Purge { jobid } => {
            let job = find_job(api, namespace, jobid).await?;
            let scope = WatchedScope::job(or_default(&job.namespace, namespace), &job.id);
            (scope, Some(job))
        }
    };

    Ok(WatchPlan {
        mode,
        scope: scope
            .with_task_filter(watch.task_filter.clone())
            .with_all_versions(watch.all),
        job,
    })
}

fn or_default<'a>(value: &'a str, default: &'a str) -> &'a str {
    if value.is_empty() { default } else { value }
}
