// src/logs/events.rs

//! Lines for the `alloc` and `eval` output streams, derived from snapshots.
//!
//! Task events are printed once each, keyed by their timestamp. Events that
//! predate the watch count as history and obey `lines`.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Local, Utc};

use super::manager::TaskKey;
use super::sink::{LineKind, LineSource, OutputLine};
use crate::nomad::model::Allocation;
use crate::state::Snapshot;
use crate::types::OutputSet;

#[derive(Debug, Default)]
struct TaskEventsSeen {
    times: HashSet<i64>,
    history_shown: usize,
}

#[derive(Debug)]
pub struct EventLines {
    outputs: OutputSet,
    lines: i64,
    watch_start: DateTime<Utc>,
    tasks: HashMap<TaskKey, TaskEventsSeen>,
    eval_lines: HashSet<String>,
}

fn local_time(nanos: i64) -> DateTime<Local> {
    if nanos <= 0 {
        return Local::now();
    }
    DateTime::from_timestamp_nanos(nanos).with_timezone(&Local)
}

fn source_for(alloc: &Allocation, task: &str) -> LineSource {
    LineSource {
        alloc_id: alloc.id.clone(),
        group: alloc.task_group.clone(),
        task: task.to_string(),
        node: alloc.node_name.clone(),
        eval_id: alloc.eval_id.clone(),
        job_id: alloc.job_id.clone(),
    }
}

impl EventLines {
    pub fn new(outputs: OutputSet, lines: i64, watch_start: DateTime<Utc>) -> Self {
        Self {
            outputs,
            lines,
            watch_start,
            tasks: HashMap::new(),
            eval_lines: HashSet::new(),
        }
    }

    pub fn collect(&mut self, snap: &Snapshot) -> Vec<OutputLine> {
        let mut out = Vec::new();
        if self.outputs.eval {
            self.collect_eval_lines(snap, &mut out);
        }
        if self.outputs.alloc {
            self.collect_task_events(snap, &mut out);
        }
        out
    }

    fn collect_task_events(&mut self, snap: &Snapshot, out: &mut Vec<OutputLine>) {
        let start_nanos = self.watch_start.timestamp_nanos_opt().unwrap_or(i64::MAX);
        for task in snap.tasks_in_scope() {
            let key = TaskKey::new(&task.alloc.id, task.name);
            let seen = self.tasks.entry(key).or_default();
            let mut events: Vec<_> = task.state.events.iter().filter(|e| e.time > 0).collect();
            events.sort_by_key(|e| e.time);

            // History is shown newest-last, so pick the tail that fits.
            let history: Vec<_> = events.iter().filter(|e| e.time < start_nanos).collect();
            let history_budget = if self.lines < 0 {
                usize::MAX
            } else {
                usize::try_from(self.lines)
                    .unwrap_or(usize::MAX)
                    .saturating_sub(seen.history_shown)
            };
            let skip_history = history.len().saturating_sub(history_budget);

            for (idx, event) in events.iter().enumerate() {
                let is_history = event.time < start_nanos;
                if is_history && idx < skip_history {
                    continue;
                }
                if !seen.times.insert(event.time) {
                    continue;
                }
                if is_history {
                    seen.history_shown += 1;
                }
                let message = if event.display_message.is_empty() {
                    event.event_type.clone()
                } else {
                    format!("{} {}", event.event_type, event.display_message)
                };
                out.push(OutputLine {
                    kind: LineKind::Alloc,
                    source: source_for(task.alloc, task.name),
                    message,
                    time: local_time(event.time),
                });
            }
        }
    }

    fn push_eval_line(
        &mut self,
        key: String,
        out: &mut Vec<OutputLine>,
        source: LineSource,
        message: String,
        time: DateTime<Local>,
    ) {
        if self.eval_lines.insert(key) {
            out.push(OutputLine {
                kind: LineKind::Eval,
                source,
                message,
                time,
            });
        }
    }

    fn collect_eval_lines(&mut self, snap: &Snapshot, out: &mut Vec<OutputLine>) {
        for alloc in snap.allocations_in_scope() {
            let source = source_for(alloc, "");
            self.push_eval_line(
                format!("started:{}", alloc.id),
                out,
                source.clone(),
                format!("Allocation {} started on {}", alloc.short_id(), alloc.node_name),
                local_time(alloc.create_time),
            );
            if alloc.is_finished() {
                self.push_eval_line(
                    format!("finished:{}", alloc.id),
                    out,
                    source.clone(),
                    format!(
                        "Allocation {} finished {}",
                        alloc.short_id(),
                        alloc.client_status.as_str()
                    ),
                    local_time(alloc.modify_time),
                );
            }
            if alloc.followup_eval_id.is_empty() {
                continue;
            }
            let Some(wait_until) = snap
                .evaluation(&alloc.followup_eval_id)
                .and_then(|e| e.wait_until())
            else {
                continue;
            };
            let delay = (wait_until - Utc::now()).num_seconds();
            if delay > 0 {
                let mut source = source;
                source.eval_id = alloc.followup_eval_id.clone();
                self.push_eval_line(
                    format!("reschedule:{}", alloc.followup_eval_id),
                    out,
                    source,
                    format!("Nomad will attempt to reschedule in {delay} seconds"),
                    Local::now(),
                );
            }
        }

        for eval in snap.evaluations() {
            if !eval.is_blocked() || eval.failed_tg_allocs.is_empty() {
                continue;
            }
            let source = LineSource {
                eval_id: eval.id.clone(),
                job_id: eval.job_id.clone(),
                ..Default::default()
            };
            let key = format!("placement:{}", eval.id);
            if self.eval_lines.contains(&key) {
                continue;
            }
            let mut groups: Vec<_> = eval.failed_tg_allocs.iter().collect();
            groups.sort_by(|a, b| a.0.cmp(b.0));
            let mut lines = vec![format!("{}: Placement Failures", eval.job_id)];
            for (group, metric) in groups {
                lines.extend(metric.describe(&format!("  {group}: ")));
            }
            self.eval_lines.insert(key);
            let time = local_time(eval.modify_time);
            out.extend(lines.into_iter().map(|message| OutputLine {
                kind: LineKind::Eval,
                source: source.clone(),
                message,
                time,
            }));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nomad::model::{ClientStatus, TaskEvent, TaskState};
    use crate::source::Notification;
    use crate::state::{StateStore, WatchedScope};

    fn ev(kind: &str, time: i64) -> TaskEvent {
        TaskEvent {
            event_type: kind.into(),
            time,
            display_message: format!("{kind} message"),
            ..Default::default()
        }
    }

    fn snapshot_with_events(events: Vec<TaskEvent>, index: u64) -> Snapshot {
        let mut store = StateStore::new(WatchedScope::job("default", "web"));
        let mut alloc = Allocation {
            id: "a1".into(),
            namespace: "default".into(),
            job_id: "web".into(),
            task_group: "g".into(),
            client_status: ClientStatus::Running,
            modify_index: index,
            ..Default::default()
        };
        alloc.task_states.insert(
            "server".into(),
            TaskState {
                state: "running".into(),
                events,
                ..Default::default()
            },
        );
        store.apply(Notification::allocation(alloc));
        store.snapshot()
    }

    #[test]
    fn task_events_are_printed_once() {
        let start = DateTime::from_timestamp(1_000, 0).unwrap();
        let mut lines = EventLines::new(OutputSet::ALL, -1, start);
        let t = 2_000 * 1_000_000_000;
        let first = lines.collect(&snapshot_with_events(vec![ev("Received", t)], 1));
        assert_eq!(first.iter().filter(|l| l.kind == LineKind::Alloc).count(), 1);

        let again = lines.collect(&snapshot_with_events(
            vec![ev("Received", t), ev("Started", t + 1)],
            2,
        ));
        let alloc_lines: Vec<_> = again
            .iter()
            .filter(|l| l.kind == LineKind::Alloc)
            .map(|l| l.message.clone())
            .collect();
        assert_eq!(alloc_lines, vec!["Started Started message"]);
    }

    #[test]
    fn history_respects_lines() {
        let start = DateTime::from_timestamp(1_000, 0).unwrap();
        let mut lines = EventLines::new(
            OutputSet {
                alloc: true,
                ..OutputSet::NONE
            },
            1,
            start,
        );
        let old = 500 * 1_000_000_000;
        let out = lines.collect(&snapshot_with_events(
            vec![ev("Received", old), ev("Started", old + 1)],
            1,
        ));
        let msgs: Vec<_> = out.iter().map(|l| l.message.as_str()).collect();
        assert_eq!(msgs, vec!["Started Started message"]);
    }

    #[test]
    fn eval_stream_reports_allocation_start_once() {
        let start = DateTime::from_timestamp(1_000, 0).unwrap();
        let mut lines = EventLines::new(
            OutputSet {
                eval: true,
                ..OutputSet::NONE
            },
            -1,
            start,
        );
        let snap = snapshot_with_events(vec![], 1);
        assert_eq!(lines.collect(&snap).len(), 1);
        assert!(lines.collect(&snap).is_empty());
    }
}
