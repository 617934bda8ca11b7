// src/logs/reader.rs

//! One follow-mode reader for one (allocation, task, stream).
//!
//! The reader relays complete lines to the sink until it is closed, its
//! drain deadline passes, or a drain finds the feed caught up. Transport
//! errors reconnect with backoff from the last relayed byte offset.
//!
//! Control messages are polled before feed data, so nothing is relayed after
//! a `Close` has been observed.

use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tokio::sync::watch;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, trace, warn};

use super::sink::{LineKind, LineSender, LineSource, OutputLine};
use super::tail::{LineSplitter, StartPosition, TailWindow};
use crate::errors::{Result, WatchError};
use crate::nomad::{LogFeed, LogFrame, LogOrigin, LogRequest, NomadApi};
use crate::shutdown::ShutdownToken;
use crate::source::BackoffPolicy;
use crate::types::LogKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderControl {
    Run,
    /// Keep relaying until caught up or until the deadline.
    Drain(Instant),
    /// Stop now without flushing.
    Close,
}

#[derive(Debug, Clone)]
pub struct ReaderSpec {
    pub source: LineSource,
    pub kind: LogKind,
    pub start: StartPosition,
    pub window: Option<TailWindow>,
    pub backoff: BackoffPolicy,
    /// Drain time granted when the shutdown token fires.
    pub shutdown_grace: Duration,
}

enum Wake {
    Control(bool),
    Shutdown,
    DrainExpired,
    WindowExpired,
    Connected(Result<Box<dyn LogFeed>>),
    Frame(Result<Option<LogFrame>>),
    Resume,
}

pub struct LogReader {
    api: Arc<dyn NomadApi>,
    source: LineSource,
    kind: LogKind,
    request: LogRequest,
    window: Option<TailWindow>,
    splitter: LineSplitter,
    backoff: BackoffPolicy,
    shutdown_grace: Duration,
    sink: LineSender,
    control: watch::Receiver<ReaderControl>,
    shutdown: ShutdownToken,
    drain_deadline: Option<Instant>,
    closed: bool,
    relayed: u64,
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

impl LogReader {
    pub fn new(
        api: Arc<dyn NomadApi>,
        spec: ReaderSpec,
        sink: LineSender,
        control: watch::Receiver<ReaderControl>,
        shutdown: ShutdownToken,
    ) -> Self {
        let request = LogRequest {
            alloc_id: spec.source.alloc_id.clone(),
            task: spec.source.task.clone(),
            kind: spec.kind,
            origin: spec.start.origin,
            offset: spec.start.offset,
        };
        Self {
            api,
            source: spec.source,
            kind: spec.kind,
            request,
            window: spec.window,
            splitter: LineSplitter::default(),
            backoff: spec.backoff,
            shutdown_grace: spec.shutdown_grace,
            sink,
            control,
            shutdown,
            drain_deadline: None,
            closed: false,
            relayed: 0,
        }
    }

    fn draining(&self) -> bool {
        self.drain_deadline.is_some()
    }

    fn begin_drain(&mut self, deadline: Instant) {
        self.drain_deadline = Some(match self.drain_deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
    }

    fn observe_control(&mut self, alive: bool) {
        if !alive {
            self.closed = true;
            return;
        }
        let control = *self.control.borrow_and_update();
        match control {
            ReaderControl::Run => {}
            ReaderControl::Drain(deadline) => self.begin_drain(deadline),
            ReaderControl::Close => self.closed = true,
        }
    }

    fn window_deadline(&self) -> Option<Instant> {
        self.window.as_ref().and_then(TailWindow::deadline)
    }

    /// Send lines to the sink. `false` once the sink is gone.
    async fn emit(&mut self, lines: Vec<String>) -> bool {
        let kind = LineKind::from(self.kind);
        for message in lines {
            let line = OutputLine {
                kind,
                source: self.source.clone(),
                message,
                time: Local::now(),
            };
            if self.sink.send(line).await.is_err() {
                return false;
            }
            self.relayed += 1;
        }
        true
    }

    pub async fn run(mut self) {
        // Pick up a Drain or Close sent before the task got to run.
        self.observe_control(true);
        let mut failures = 0u32;
        let mut feed: Option<Box<dyn LogFeed>> = None;
        let mut resume_at: Option<Instant> = None;

        while !self.closed {
            let api = Arc::clone(&self.api);
            let request = self.request.clone();
            let drain_deadline = self.drain_deadline;
            let window_deadline = self.window_deadline();
            let draining = self.draining();

            let wake = tokio::select! {
                biased;
                changed = self.control.changed() => Wake::Control(changed.is_ok()),
                _ = self.shutdown.cancelled(), if !draining => Wake::Shutdown,
                _ = sleep_until_opt(drain_deadline) => Wake::DrainExpired,
                _ = sleep_until_opt(window_deadline) => Wake::WindowExpired,
                _ = sleep_until_opt(resume_at), if resume_at.is_some() => Wake::Resume,
                res = api.log_stream(&request), if feed.is_none() && resume_at.is_none() => {
                    Wake::Connected(res)
                }
                frame = async {
                    match feed.as_mut() {
                        Some(f) => f.next_frame().await,
                        None => std::future::pending().await,
                    }
                } => Wake::Frame(frame),
            };

            match wake {
                Wake::Control(alive) => self.observe_control(alive),
                Wake::Shutdown => self.begin_drain(Instant::now() + self.shutdown_grace),
                Wake::DrainExpired => break,
                Wake::WindowExpired => {
                    let lines = self
                        .window
                        .as_mut()
                        .map(|w| w.expire(Instant::now()))
                        .unwrap_or_default();
                    if !self.emit(lines).await {
                        return;
                    }
                }
                Wake::Resume => resume_at = None,
                Wake::Connected(Ok(f)) => {
                    trace!(alloc = %self.source.alloc_id, task = %self.source.task, "log stream connected");
                    feed = Some(f);
                }
                Wake::Connected(Err(err)) | Wake::Frame(Err(err)) if err.is_retryable() => {
                    feed = None;
                    failures = failures.saturating_add(1);
                    let delay = self.backoff.delay(failures);
                    debug!(
                        alloc = %self.source.alloc_id,
                        task = %self.source.task,
                        stream = self.kind.as_str(),
                        error = %err,
                        ?delay,
                        "log stream interrupted, reconnecting"
                    );
                    resume_at = Some(Instant::now() + delay);
                }
                Wake::Frame(Err(WatchError::Malformed(msg))) => {
                    warn!(alloc = %self.source.alloc_id, task = %self.source.task, error = %msg, "skipping malformed log frame");
                }
                Wake::Connected(Err(err)) | Wake::Frame(Err(err)) => {
                    warn!(
                        alloc = %self.source.alloc_id,
                        task = %self.source.task,
                        stream = self.kind.as_str(),
                        error = %err,
                        "cannot read task logs"
                    );
                    break;
                }
                Wake::Frame(Ok(None)) => {
                    feed = None;
                    if self.draining() {
                        break;
                    }
                    failures = failures.saturating_add(1);
                    resume_at = Some(Instant::now() + self.backoff.delay(failures));
                }
                Wake::Frame(Ok(Some(frame))) => {
                    if frame.is_heartbeat() {
                        let lines = self
                            .window
                            .as_mut()
                            .map(TailWindow::on_heartbeat)
                            .unwrap_or_default();
                        if !self.emit(lines).await {
                            return;
                        }
                        if self.draining() {
                            break;
                        }
                        continue;
                    }
                    failures = 0;
                    self.request.origin = LogOrigin::Start;
                    self.request.offset = frame.offset;
                    let lines = self.splitter.push(&frame.data);
                    let lines = match self.window.as_mut() {
                        Some(w) => w.push(lines, Instant::now()),
                        None => lines,
                    };
                    if !self.emit(lines).await {
                        return;
                    }
                }
            }
        }

        if !self.closed {
            let mut rest = self.window.as_mut().map(TailWindow::close).unwrap_or_default();
            rest.extend(self.splitter.finish());
            self.emit(rest).await;
        }
        debug!(
            alloc = %self.source.alloc_id,
            task = %self.source.task,
            stream = self.kind.as_str(),
            lines = self.relayed,
            closed = self.closed,
            "log reader finished"
        );
    }
}
