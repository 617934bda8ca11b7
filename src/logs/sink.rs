// src/logs/sink.rs

//! The single ordered output sink.
//!
//! Readers and the event line emitter push [`OutputLine`]s into one mpsc
//! channel; a printer task renders and writes them in arrival order. Lines
//! from one sender keep their order; lines from different senders interleave.

use std::io::Write;

use chrono::{DateTime, Local};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use super::format::LineFormats;
use crate::types::LogKind;

/// Capacity of the output channel.
pub const SINK_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LineKind {
    Alloc,
    Stdout,
    Stderr,
    Eval,
}

impl LineKind {
    pub fn as_str(self) -> &'static str {
        match self {
            LineKind::Alloc => "alloc",
            LineKind::Stdout => "stdout",
            LineKind::Stderr => "stderr",
            LineKind::Eval => "eval",
        }
    }
}

impl From<LogKind> for LineKind {
    fn from(kind: LogKind) -> Self {
        match kind {
            LogKind::Stdout => LineKind::Stdout,
            LogKind::Stderr => LineKind::Stderr,
        }
    }
}

/// Where a line came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineSource {
    pub alloc_id: String,
    pub group: String,
    pub task: String,
    pub node: String,
    pub eval_id: String,
    pub job_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub kind: LineKind,
    pub source: LineSource,
    pub message: String,
    pub time: DateTime<Local>,
}

pub type LineSender = mpsc::Sender<OutputLine>;

/// Spawn the printer. It runs until every sender is dropped.
pub fn spawn_printer<W>(
    mut rx: mpsc::Receiver<OutputLine>,
    formats: LineFormats,
    mut out: W,
) -> JoinHandle<std::io::Result<()>>
where
    W: Write + Send + 'static,
{
    tokio::spawn(async move {
        let mut written = 0u64;
        while let Some(line) = rx.recv().await {
            let rendered = formats.render(&line);
            writeln!(out, "{rendered}")?;
            out.flush()?;
            written += 1;
        }
        debug!(lines = written, "output sink closed");
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn printer_preserves_sender_order() {
        let (tx, rx) = mpsc::channel(8);
        let buf = SharedBuf::default();
        let handle = spawn_printer(rx, LineFormats::default(), buf.clone());

        for i in 0..3 {
            tx.send(OutputLine {
                kind: LineKind::Stdout,
                source: LineSource {
                    alloc_id: "abcdef123".into(),
                    group: "g".into(),
                    task: "t".into(),
                    ..Default::default()
                },
                message: format!("line {i}"),
                time: Local::now(),
            })
            .await
            .unwrap();
        }
        drop(tx);
        handle.await.unwrap().unwrap();

        let text = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        assert_eq!(text, "abcdef:g:t:O line 0\nabcdef:g:t:O line 1\nabcdef:g:t:O line 2\n");
    }
}
