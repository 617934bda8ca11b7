// src/logs/mod.rs

//! Log Stream Manager and the multiplexed output.
//!
//! - `manager.rs`: reader set reconciliation against each snapshot.
//! - `reader.rs`: one follow-mode reader per (allocation, task, stream).
//! - `tail.rs`: start offsets and the historical lines window.
//! - `events.rs`: `alloc` and `eval` stream lines derived from state.
//! - `format.rs`: line templates.
//! - `sink.rs`: the single ordered output sink.

pub mod events;
pub mod format;
pub mod manager;
pub mod reader;
pub mod sink;
pub mod tail;

pub use format::{LineFormats, LineTemplate, PrefixOptions};
pub use manager::{LogManager, LogOptions, TaskKey};
pub use reader::{LogReader, ReaderControl, ReaderSpec};
pub use sink::{LineKind, LineSender, LineSource, OutputLine, SINK_CAPACITY, spawn_printer};
pub use tail::{LinesPlanner, StartPosition, TailWindow};
