// src/engine/runtime.rs

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info, warn};

use crate::config::WatchSettings;
use crate::errors::{Result, WatchError};
use crate::logs::{LineSender, LogManager, LogOptions};
use crate::nomad::NomadApi;
use crate::nomad::model::{Job, TaskGroupSummary, short};
use crate::shutdown::{ShutdownTrigger, shutdown_channel};
use crate::source::{Notification, SourceOptions, spawn_event_source};
use crate::state::{ApplyOutcome, Snapshot, StateStore, WatchedScope};

use super::core::{CoreEvent, CoreWatch};
use super::exit_code::{ExitContext, exit_code};
use super::policy::{Finish, PolicyOptions, PurgePolicy, WatchMode};
use super::{CoreCommand, CoreStep, WatchEvent};

/// What to watch, resolved from the command line.
#[derive(Debug, Clone)]
pub struct WatchPlan {
    pub mode: WatchMode,
    pub scope: WatchedScope,
    /// Job fetched or registered while resolving the target. It is the
    /// version baseline for admitting evaluations and allocations.
    pub job: Option<Job>,
}

#[derive(Debug, Clone)]
pub struct WatchOutcome {
    pub finish: Finish,
    pub exit_code: i32,
    pub snapshot: Snapshot,
}

/// Folds notifications into the state store, keeps the log readers in line
/// with every new snapshot, and executes the commands of the pure core.
pub struct WatchRuntime {
    api: Arc<dyn NomadApi>,
    core: CoreWatch,
    store: StateStore,
    logs: LogManager,
    event_rx: mpsc::Receiver<WatchEvent>,
    settings: WatchSettings,
    shutdown: ShutdownTrigger,
    source: JoinHandle<()>,
    timer: Option<JoinHandle<()>>,
    primed: bool,
}

impl fmt::Debug for WatchRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchRuntime")
            .field("core", &self.core)
            .field("primed", &self.primed)
            .finish_non_exhaustive()
    }
}

/// Run one watch to completion.
///
/// `tx` is the sending half of `event_rx`; the caller keeps a clone to
/// deliver interrupts.
pub async fn run_watch(
    api: Arc<dyn NomadApi>,
    plan: WatchPlan,
    settings: &WatchSettings,
    sink: LineSender,
    tx: mpsc::Sender<WatchEvent>,
    event_rx: mpsc::Receiver<WatchEvent>,
) -> Result<WatchOutcome> {
    let started_at = Instant::now();
    let (shutdown, token) = shutdown_channel();

    let store = match plan.job {
        Some(job) => StateStore::with_job(plan.scope.clone(), job),
        None => StateStore::new(plan.scope.clone()),
    };

    let source_options = SourceOptions {
        polling: settings.polling,
        poll_interval: settings.poll_interval,
        backoff: settings.backoff,
        max_retries: settings.max_retries,
    };
    let source = spawn_event_source(
        Arc::clone(&api),
        plan.scope.clone(),
        source_options,
        tx.clone(),
        token.clone(),
    );

    let timer = settings.no_follow.then(|| {
        let tx = tx.clone();
        let delay = settings.shutdown_timeout;
        tokio::spawn(async move {
            tokio::time::sleep_until(started_at + delay).await;
            let _ = tx.send(WatchEvent::NoFollowElapsed).await;
        })
    });
    drop(tx);

    let logs = LogManager::new(
        Arc::clone(&api),
        LogOptions::from_settings(settings),
        sink,
        token,
        started_at,
    );
    let core = CoreWatch::new(PolicyOptions::from_settings(plan.mode, settings));

    let runtime = WatchRuntime {
        api,
        core,
        store,
        logs,
        event_rx,
        settings: settings.clone(),
        shutdown,
        source,
        timer,
        primed: false,
    };
    runtime.run().await
}

impl WatchRuntime {
    /// Main event loop, then teardown.
    pub async fn run(mut self) -> Result<WatchOutcome> {
        let mode = self.core.options().mode;
        let until = if self.core.options().all {
            "forever"
        } else if self.settings.no_follow {
            "until the no-follow timeout"
        } else {
            mode.until()
        };
        info!(mode = mode.as_str(), "watching {} {until}", self.store.scope().describe());

        let result = self.event_loop().await;

        // Teardown: stop the source and the timer, then let readers drain.
        self.shutdown.trigger();
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        let deadline = Instant::now() + self.settings.shutdown_timeout;
        if timeout_at(deadline, &mut self.source).await.is_err() {
            self.source.abort();
        }

        let WatchRuntime {
            core,
            store,
            logs,
            settings,
            ..
        } = self;
        logs.shutdown(settings.shutdown_timeout).await;

        let finish = result?;
        let snapshot = store.snapshot();
        let ctx = ExitContext {
            mode,
            finish,
            interrupted: core.interrupted(),
            saw_allocation: core.saw_allocation(),
            preserve_status: settings.preserve_status,
        };
        let code = exit_code(&ctx, &snapshot);
        debug!(?finish, exit_code = code, "watch finished");
        Ok(WatchOutcome {
            finish,
            exit_code: code,
            snapshot,
        })
    }

    async fn event_loop(&mut self) -> Result<Finish> {
        let step = self.core.step(CoreEvent::Started);
        if let Some(finish) = self.execute(step).await? {
            return Ok(finish);
        }

        loop {
            let Some(event) = self.event_rx.recv().await else {
                return Err(WatchError::Other(anyhow::anyhow!(
                    "watch event channel closed"
                )));
            };

            let step = match event {
                WatchEvent::Notifications(batch) => {
                    let total = batch.len();
                    let mut applied = 0usize;
                    for notification in batch {
                        if self.store.apply(notification) == ApplyOutcome::Applied {
                            applied += 1;
                        }
                    }
                    let first = !self.primed;
                    self.primed = true;
                    debug!(total, applied, revision = self.store.revision(), "applied notifications");
                    if applied == 0 && !first {
                        continue;
                    }
                    let snap = self.store.snapshot();
                    self.logs.reconcile(&snap).await;
                    self.core.step(CoreEvent::Snapshot(&snap))
                }
                WatchEvent::SourceFailed(err) => return Err(err),
                WatchEvent::Interrupted => {
                    info!("interrupted");
                    self.core.step(CoreEvent::Interrupted)
                }
                WatchEvent::NoFollowElapsed => self.core.step(CoreEvent::NoFollowElapsed),
            };

            if let Some(finish) = self.execute(step).await? {
                return Ok(finish);
            }
        }
    }

    /// Execute the commands of a core step. `Some` once the core is done.
    async fn execute(&mut self, step: CoreStep) -> Result<Option<Finish>> {
        let mut pending = vec![step];
        while let Some(step) = pending.pop() {
            for command in step.commands {
                match command {
                    CoreCommand::StopJob { purge } => {
                        let purged = self.stop_job(purge).await?;
                        let mut next = self.core.step(CoreEvent::StopIssued { purged });
                        if next.keep_running && self.primed {
                            let snap = self.store.snapshot();
                            let again = self.core.step(CoreEvent::Snapshot(&snap));
                            next.commands.extend(again.commands);
                            next.keep_running = again.keep_running;
                        }
                        pending.push(next);
                    }
                    CoreCommand::RequestExit(finish) => {
                        debug!(?finish, "core requested exit");
                        return Ok(Some(finish));
                    }
                }
            }
            if !step.keep_running {
                return Ok(Some(self.core.finish().unwrap_or(Finish::Interrupted)));
            }
        }
        Ok(None)
    }

    /// Send the stop request. Returns whether it asked for a purge.
    async fn stop_job(&mut self, purge: PurgePolicy) -> Result<bool> {
        let snap = self.store.snapshot();
        let namespace = snap.scope().namespace.clone();
        let job_id = snap.scope().job_id().to_string();
        let job_dead = snap.job_purged() || snap.job().is_some_and(Job::is_dead);

        let purge_now = if purge.needs_summary() {
            match self.api.job_summary(&namespace, &job_id).await {
                Ok(summary) => purge.allows(job_dead, &summary.totals()),
                Err(WatchError::NotFound(_)) => false,
                Err(err) => return Err(err),
            }
        } else {
            purge.allows(job_dead, &TaskGroupSummary::default())
        };

        info!(job = %job_id, purge = purge_now, "stopping job");
        match self.api.stop_job(&namespace, &job_id, purge_now).await {
            Ok(eval_id) => debug!(eval = %short(&eval_id), "stop requested"),
            Err(WatchError::NotFound(_)) => {
                warn!(job = %job_id, "job is already gone");
                self.store.apply(Notification::job_missing(job_id));
            }
            Err(err) => return Err(err),
        }
        Ok(purge_now)
    }
}
