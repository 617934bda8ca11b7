// src/logs/tail.rs

//! Starting offsets and the historical lines window.
//!
//! `lines < 0` reads every log from the start. `lines == 0` starts at the
//! end. `lines > 0` opens the log a fixed number of bytes before the end and
//! keeps only the last `lines` lines of what arrives before the window
//! closes. The window closes at the first heartbeat (caught up) or when
//! `lines_timeout` has passed, whichever comes first; later lines are
//! relayed as they come.
//!
//! Readers planned after the initial window belong to tasks that started
//! while watching, so they read from the start.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

use crate::nomad::LogOrigin;

/// How far before the end a tail search starts.
pub const TAIL_SCAN_BYTES: i64 = 50_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartPosition {
    pub origin: LogOrigin,
    pub offset: i64,
}

impl StartPosition {
    pub const BEGINNING: StartPosition = StartPosition {
        origin: LogOrigin::Start,
        offset: 0,
    };
    pub const END: StartPosition = StartPosition {
        origin: LogOrigin::End,
        offset: 0,
    };
    pub const TAIL: StartPosition = StartPosition {
        origin: LogOrigin::End,
        offset: TAIL_SCAN_BYTES,
    };
}

/// Decides where each new reader starts.
#[derive(Debug, Clone, Copy)]
pub struct LinesPlanner {
    lines: i64,
    lines_timeout: Duration,
    started_at: Instant,
}

impl LinesPlanner {
    pub fn new(lines: i64, lines_timeout: Duration, started_at: Instant) -> Self {
        Self {
            lines,
            lines_timeout,
            started_at,
        }
    }

    /// Deadline of the initial window.
    pub fn window_deadline(&self) -> Instant {
        self.started_at + self.lines_timeout
    }

    /// `initial` marks tasks that already existed when the watch started.
    pub fn plan(&self, initial: bool, now: Instant) -> (StartPosition, Option<TailWindow>) {
        if self.lines < 0 || !(initial || now < self.window_deadline()) {
            return (StartPosition::BEGINNING, None);
        }
        if self.lines == 0 {
            return (StartPosition::END, None);
        }
        let keep = usize::try_from(self.lines).unwrap_or(usize::MAX);
        (
            StartPosition::TAIL,
            Some(TailWindow::new(keep, self.window_deadline())),
        )
    }
}

/// Holds back historical lines and releases only the last `keep` of them.
#[derive(Debug, Clone)]
pub struct TailWindow {
    keep: usize,
    deadline: Instant,
    held: VecDeque<String>,
    seen_data: bool,
    open: bool,
}

impl TailWindow {
    pub fn new(keep: usize, deadline: Instant) -> Self {
        Self {
            keep,
            deadline,
            held: VecDeque::new(),
            seen_data: false,
            open: true,
        }
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// When the window closes on its own, if it is still open.
    pub fn deadline(&self) -> Option<Instant> {
        self.open.then_some(self.deadline)
    }

    /// Feed decoded lines; returns what may be emitted now.
    ///
    /// The first chunk of data always counts as history even if it arrives
    /// after the deadline.
    pub fn push(&mut self, lines: Vec<String>, now: Instant) -> Vec<String> {
        if self.open && (!self.seen_data || now < self.deadline) {
            self.seen_data = true;
            for line in lines {
                if self.held.len() == self.keep {
                    self.held.pop_front();
                }
                if self.keep > 0 {
                    self.held.push_back(line);
                }
            }
            return Vec::new();
        }
        let mut out = self.close();
        out.extend(lines);
        out
    }

    /// The feed is caught up with the file.
    pub fn on_heartbeat(&mut self) -> Vec<String> {
        if self.open { self.close() } else { Vec::new() }
    }

    /// Close the window if its deadline passed.
    pub fn expire(&mut self, now: Instant) -> Vec<String> {
        if self.open && now >= self.deadline {
            self.close()
        } else {
            Vec::new()
        }
    }

    pub fn close(&mut self) -> Vec<String> {
        self.open = false;
        self.held.drain(..).collect()
    }
}

/// Splits a byte stream into lines, holding back an unterminated tail.
#[derive(Debug, Default)]
pub struct LineSplitter {
    partial: Vec<u8>,
}

impl LineSplitter {
    pub fn push(&mut self, data: &[u8]) -> Vec<String> {
        self.partial.extend_from_slice(data);
        let Some(last_newline) = self.partial.iter().rposition(|b| *b == b'\n') else {
            return Vec::new();
        };
        let rest = self.partial.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.partial, rest);
        complete[..complete.len() - 1]
            .split(|b| *b == b'\n')
            .map(|line| {
                let line = line.strip_suffix(b"\r").unwrap_or(line);
                String::from_utf8_lossy(line).into_owned()
            })
            .collect()
    }

    /// Remaining unterminated text, if any.
    pub fn finish(&mut self) -> Option<String> {
        if self.partial.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.partial);
        Some(String::from_utf8_lossy(&rest).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn planner_positions() {
        let t0 = Instant::now();
        let timeout = Duration::from_millis(500);

        let all = LinesPlanner::new(-1, timeout, t0);
        assert_eq!(all.plan(true, t0).0, StartPosition::BEGINNING);

        let none = LinesPlanner::new(0, timeout, t0);
        let (pos, window) = none.plan(true, t0);
        assert_eq!(pos, StartPosition::END);
        assert!(window.is_none());

        let ten = LinesPlanner::new(10, timeout, t0);
        let (pos, window) = ten.plan(true, t0);
        assert_eq!(pos, StartPosition::TAIL);
        assert!(window.is_some());

        // A task that showed up after the window is new; read all of it.
        let later = t0 + Duration::from_secs(5);
        assert_eq!(ten.plan(false, later).0, StartPosition::BEGINNING);
        assert_eq!(none.plan(false, later).0, StartPosition::BEGINNING);
    }

    #[test]
    fn window_keeps_last_n_until_heartbeat() {
        let t0 = Instant::now();
        let mut w = TailWindow::new(2, t0 + Duration::from_secs(1));
        assert!(w.push(lines(&["a", "b", "c"]), t0).is_empty());
        assert!(w.push(lines(&["d"]), t0).is_empty());
        assert_eq!(w.on_heartbeat(), lines(&["c", "d"]));
        assert!(!w.is_open());
        assert_eq!(w.push(lines(&["e"]), t0), lines(&["e"]));
    }

    #[test]
    fn window_expires() {
        let t0 = Instant::now();
        let deadline = t0 + Duration::from_millis(500);
        let mut w = TailWindow::new(1, deadline);
        assert!(w.push(lines(&["a", "b"]), t0).is_empty());
        assert!(w.expire(t0).is_empty());
        assert_eq!(w.expire(deadline), lines(&["b"]));
        assert_eq!(w.deadline(), None);
    }

    #[test]
    fn first_chunk_is_history_even_when_late() {
        let t0 = Instant::now();
        let mut w = TailWindow::new(1, t0);
        assert!(w.push(lines(&["old1", "old2"]), t0 + Duration::from_secs(1)).is_empty());
        assert_eq!(
            w.push(lines(&["new"]), t0 + Duration::from_secs(2)),
            lines(&["old2", "new"])
        );
    }

    #[test]
    fn splitter_handles_partial_lines() {
        let mut s = LineSplitter::default();
        assert_eq!(s.push(b"hel"), Vec::<String>::new());
        assert_eq!(s.push(b"lo\r\nwor"), lines(&["hello"]));
        assert_eq!(s.push(b"ld\n\n"), lines(&["world", ""]));
        assert_eq!(s.push(b"tail"), Vec::<String>::new());
        assert_eq!(s.finish(), Some("tail".to_string()));
        assert_eq!(s.finish(), None);
    }
}
