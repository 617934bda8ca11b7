// src/state/scope.rs

//! The part of the cluster one watch observes.

use regex::Regex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeTarget {
    Job { job_id: String },
    Allocation { alloc_id: String, job_id: String },
}

#[derive(Debug, Clone)]
pub struct WatchedScope {
    pub namespace: String,
    pub target: ScopeTarget,
    /// Only tasks whose name matches are followed.
    pub task_filter: Option<Regex>,
    /// Admit entities of every job version, not only the current one.
    pub all_versions: bool,
}

impl WatchedScope {
    pub fn job(namespace: impl Into<String>, job_id: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            target: ScopeTarget::Job {
                job_id: job_id.into(),
            },
            task_filter: None,
            all_versions: false,
        }
    }

    pub fn allocation(
        namespace: impl Into<String>,
        alloc_id: impl Into<String>,
        job_id: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            target: ScopeTarget::Allocation {
                alloc_id: alloc_id.into(),
                job_id: job_id.into(),
            },
            task_filter: None,
            all_versions: false,
        }
    }

    pub fn with_task_filter(mut self, filter: Option<Regex>) -> Self {
        self.task_filter = filter;
        self
    }

    pub fn with_all_versions(mut self, all: bool) -> Self {
        self.all_versions = all;
        self
    }

    pub fn job_id(&self) -> &str {
        match &self.target {
            ScopeTarget::Job { job_id } | ScopeTarget::Allocation { job_id, .. } => job_id,
        }
    }

    pub fn alloc_id(&self) -> Option<&str> {
        match &self.target {
            ScopeTarget::Allocation { alloc_id, .. } => Some(alloc_id),
            ScopeTarget::Job { .. } => None,
        }
    }

    pub fn is_job(&self) -> bool {
        matches!(self.target, ScopeTarget::Job { .. })
    }

    pub fn task_matches(&self, task: &str) -> bool {
        self.task_filter.as_ref().is_none_or(|re| re.is_match(task))
    }

    /// Event stream topics covering this scope.
    pub fn topics(&self) -> Vec<String> {
        let job = self.job_id();
        match &self.target {
            ScopeTarget::Job { .. } => ["Job", "Evaluation", "Allocation", "Deployment"]
                .iter()
                .map(|topic| format!("{topic}:{job}"))
                .collect(),
            ScopeTarget::Allocation { .. } => vec![format!("Allocation:{job}")],
        }
    }

    /// `job@namespace` or `alloc@namespace` for diagnostics.
    pub fn describe(&self) -> String {
        match &self.target {
            ScopeTarget::Job { job_id } => format!("job {job_id}@{}", self.namespace),
            ScopeTarget::Allocation { alloc_id, .. } => {
                format!("allocation {alloc_id}@{}", self.namespace)
            }
        }
    }
}
