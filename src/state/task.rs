// src/state/task.rs

//! Task classification derived from the job definition and task state.

use crate::nomad::model::{Lifecycle, TaskState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskLifecycle {
    Main,
    Prestart,
    Poststart,
    Sidecar,
}

impl TaskLifecycle {
    pub fn from_spec(lifecycle: Option<&Lifecycle>) -> Self {
        match lifecycle {
            None => TaskLifecycle::Main,
            Some(l) if l.hook.is_empty() => TaskLifecycle::Main,
            Some(l) if l.sidecar => TaskLifecycle::Sidecar,
            Some(l) if l.hook == "poststart" => TaskLifecycle::Poststart,
            Some(_) => TaskLifecycle::Prestart,
        }
    }

    pub fn is_main(self) -> bool {
        self == TaskLifecycle::Main
    }
}

/// Where a task stands, as far as the exit status is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    NotStarted,
    Running,
    Exited(i32),
    /// Dead without an exit code, after a driver or setup failure.
    Failed,
}

impl TaskStatus {
    pub fn of(state: &TaskState) -> Self {
        if state.is_dead() {
            match state.exit_code() {
                Some(code) => TaskStatus::Exited(code),
                None if state.failed => TaskStatus::Failed,
                None if state.was_started() => TaskStatus::Exited(0),
                None => TaskStatus::NotStarted,
            }
        } else if state.was_started() {
            TaskStatus::Running
        } else {
            TaskStatus::NotStarted
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Exited(_) | TaskStatus::Failed)
    }

    pub fn is_failure(self) -> bool {
        matches!(self, TaskStatus::Failed) || matches!(self, TaskStatus::Exited(c) if c != 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nomad::model::TaskEvent;
    use chrono::Utc;
    use std::collections::HashMap;

    fn lc(hook: &str, sidecar: bool) -> Lifecycle {
        Lifecycle {
            hook: hook.into(),
            sidecar,
        }
    }

    #[test]
    fn lifecycle_classes() {
        assert_eq!(TaskLifecycle::from_spec(None), TaskLifecycle::Main);
        assert_eq!(
            TaskLifecycle::from_spec(Some(&lc("prestart", false))),
            TaskLifecycle::Prestart
        );
        assert_eq!(
            TaskLifecycle::from_spec(Some(&lc("prestart", true))),
            TaskLifecycle::Sidecar
        );
        assert_eq!(
            TaskLifecycle::from_spec(Some(&lc("poststart", false))),
            TaskLifecycle::Poststart
        );
    }

    #[test]
    fn statuses() {
        let pending = TaskState {
            state: "pending".into(),
            ..Default::default()
        };
        assert_eq!(TaskStatus::of(&pending), TaskStatus::NotStarted);

        let running = TaskState {
            state: "running".into(),
            started_at: Some(Utc::now()),
            ..Default::default()
        };
        assert_eq!(TaskStatus::of(&running), TaskStatus::Running);

        let exited = TaskState {
            state: "dead".into(),
            started_at: Some(Utc::now()),
            events: vec![TaskEvent {
                event_type: "Terminated".into(),
                details: HashMap::from([("exit_code".to_string(), "7".to_string())]),
                ..Default::default()
            }],
            ..Default::default()
        };
        assert_eq!(TaskStatus::of(&exited), TaskStatus::Exited(7));
        assert!(TaskStatus::of(&exited).is_failure());

        let driver_failure = TaskState {
            state: "dead".into(),
            failed: true,
            ..Default::default()
        };
        assert_eq!(TaskStatus::of(&driver_failure), TaskStatus::Failed);
    }
}
