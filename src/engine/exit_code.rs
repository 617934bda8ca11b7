// src/engine/exit_code.rs

//! Exit Status Aggregator.
//!
//! Folds the statuses of the main tasks in scope into one process exit code.
//! First match wins:
//! 1. exactly one main task: its own exit code;
//! 2. every main task exited 0: 0;
//! 3. every main task failed: 125;
//! 4. any main task failed: 124;
//! 5. any main task still running: 126;
//! 6. otherwise, nothing ever started: 127.

use crate::engine::policy::{Finish, WatchMode};
use crate::state::{Snapshot, TaskStatus};

pub const SUCCESS: i32 = 0;
pub const EXCEPTION: i32 = 1;
pub const INTERRUPTED: i32 = 2;
pub const ANY_FAILED_TASKS: i32 = 124;
pub const ALL_FAILED_TASKS: i32 = 125;
pub const ANY_UNFINISHED_TASKS: i32 = 126;
pub const NO_ALLOCATIONS: i32 = 127;

/// Exit code of a single task. A task with no exit code of its own maps to
/// the same code as a task that never ran.
fn single(status: TaskStatus) -> i32 {
    match status {
        TaskStatus::Exited(code) => code,
        TaskStatus::Running => ANY_UNFINISHED_TASKS,
        TaskStatus::Failed | TaskStatus::NotStarted => NO_ALLOCATIONS,
    }
}

pub fn aggregate(statuses: &[TaskStatus]) -> i32 {
    if let [only] = statuses {
        return single(*only);
    }
    if !statuses.is_empty() && statuses.iter().all(|s| *s == TaskStatus::Exited(0)) {
        return SUCCESS;
    }
    if !statuses.is_empty() && statuses.iter().all(|s| s.is_failure()) {
        return ALL_FAILED_TASKS;
    }
    if statuses.iter().any(|s| s.is_failure()) {
        return ANY_FAILED_TASKS;
    }
    if statuses.iter().any(|s| *s == TaskStatus::Running) {
        return ANY_UNFINISHED_TASKS;
    }
    NO_ALLOCATIONS
}

/// Facts about how the watch ended, next to the final snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitContext {
    pub mode: WatchMode,
    pub finish: Finish,
    /// At least one interrupt was received.
    pub interrupted: bool,
    pub saw_allocation: bool,
    pub preserve_status: bool,
}

pub fn exit_code(ctx: &ExitContext, snap: &Snapshot) -> i32 {
    if ctx.interrupted && !ctx.saw_allocation {
        return EXCEPTION;
    }
    if ctx.mode.waits_for_start() {
        return if ctx.finish == Finish::Started {
            SUCCESS
        } else {
            INTERRUPTED
        };
    }
    if !ctx.preserve_status {
        return if ctx.finish == Finish::Interrupted {
            INTERRUPTED
        } else {
            SUCCESS
        };
    }
    aggregate(&snap.main_task_statuses())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{StateStore, WatchedScope};

    #[test]
    fn single_task_keeps_its_own_code() {
        assert_eq!(aggregate(&[TaskStatus::Exited(0)]), 0);
        assert_eq!(aggregate(&[TaskStatus::Exited(3)]), 3);
        assert_eq!(aggregate(&[TaskStatus::NotStarted]), NO_ALLOCATIONS);
        assert_eq!(aggregate(&[TaskStatus::Failed]), NO_ALLOCATIONS);
        assert_eq!(aggregate(&[TaskStatus::Exited(0), TaskStatus::Failed]), ANY_FAILED_TASKS);
    }

    #[test]
    fn table_rules() {
        use TaskStatus::*;
        assert_eq!(aggregate(&[Exited(0), Exited(0)]), SUCCESS);
        assert_eq!(aggregate(&[Exited(1), Failed]), ALL_FAILED_TASKS);
        assert_eq!(aggregate(&[Exited(0), Exited(1)]), ANY_FAILED_TASKS);
        assert_eq!(aggregate(&[Exited(0), Running]), ANY_UNFINISHED_TASKS);
        assert_eq!(aggregate(&[NotStarted, NotStarted]), NO_ALLOCATIONS);
        assert_eq!(aggregate(&[]), NO_ALLOCATIONS);
    }

    fn ctx(mode: WatchMode, finish: Finish) -> ExitContext {
        ExitContext {
            mode,
            finish,
            interrupted: false,
            saw_allocation: true,
            preserve_status: true,
        }
    }

    #[test]
    fn overrides() {
        let snap = StateStore::new(WatchedScope::job("default", "web")).snapshot();

        let mut c = ctx(WatchMode::Job, Finish::Interrupted);
        c.interrupted = true;
        c.saw_allocation = false;
        assert_eq!(exit_code(&c, &snap), EXCEPTION);

        assert_eq!(exit_code(&ctx(WatchMode::Started, Finish::Started), &snap), SUCCESS);
        assert_eq!(
            exit_code(&ctx(WatchMode::Start, Finish::DiedBeforeStart), &snap),
            INTERRUPTED
        );

        let mut c = ctx(WatchMode::Job, Finish::Completed);
        c.preserve_status = false;
        assert_eq!(exit_code(&c, &snap), SUCCESS);
        c.finish = Finish::Interrupted;
        assert_eq!(exit_code(&c, &snap), INTERRUPTED);

        assert_eq!(exit_code(&ctx(WatchMode::Job, Finish::Completed), &snap), NO_ALLOCATIONS);
    }
}
