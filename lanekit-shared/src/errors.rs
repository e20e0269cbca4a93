//! Error taxonomy for lane orchestration.
//!
//! Failures raised while running a lane are wrapped once per enclosing lane
//! (`LaneError::InLane`), so the error that reaches the caller carries the
//! full breadcrumb from the root lane down to the failing task.

use thiserror::Error;

/// Opaque failure raised inside a task body.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type LaneResult<T> = Result<T, LaneError>;

#[derive(Error, Debug)]
pub enum LaneError {
    /// A task identifier was registered twice.
    #[error("task '{0}' is already registered")]
    DuplicateIdentifier(String),

    /// A task identifier could not be resolved against the registry.
    #[error("unknown task '{0}'")]
    UnknownTask(String),

    /// Read or removal of a cache key that was never written (or already removed).
    #[error("missing artifact '{0}'")]
    MissingArtifact(String),

    /// Typed read of an artifact stored under a different type.
    #[error("artifact '{key}' is not a {expected}")]
    ArtifactType { key: String, expected: &'static str },

    /// Malformed or ambiguous declarative input.
    #[error("manifest error at {path}: {reason}")]
    Manifest { path: String, reason: String },

    /// Construction arguments rejected by a task constructor.
    #[error("invalid arguments for task '{task}': {reason}")]
    InvalidArguments { task: String, reason: String },

    /// Failure raised while constructing a task or inside its entry point.
    #[error("task {task}.{entry_point} failed: {cause}")]
    TaskExecution {
        task: String,
        entry_point: String,
        #[source]
        cause: BoxError,
    },

    /// Breadcrumb added by every lane a failure passes through.
    #[error("lane '{lane}' > {source}")]
    InLane {
        lane: String,
        #[source]
        source: Box<LaneError>,
    },

    /// Every failed child of a parallel lane.
    #[error("{} parallel task(s) failed: {}", .failures.len(), join_failures(.failures))]
    Parallel { failures: Vec<LaneError> },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

fn join_failures(failures: &[LaneError]) -> String {
    failures
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl LaneError {
    /// Wrap this error with the name of the lane it is propagating through.
    pub fn in_lane(self, lane: impl Into<String>) -> Self {
        LaneError::InLane {
            lane: lane.into(),
            source: Box::new(self),
        }
    }

    /// Wrap an arbitrary task failure.
    pub fn task_execution(
        task: impl Into<String>,
        entry_point: impl Into<String>,
        cause: impl Into<BoxError>,
    ) -> Self {
        LaneError::TaskExecution {
            task: task.into(),
            entry_point: entry_point.into(),
            cause: cause.into(),
        }
    }

    /// Lane names outermost-first, followed by the failing `Task.entry_point`.
    ///
    /// For a parallel aggregate the trail follows the first failure.
    pub fn breadcrumb(&self) -> Vec<String> {
        let mut trail = Vec::new();
        let mut current = self;
        loop {
            match current {
                LaneError::InLane { lane, source } => {
                    trail.push(lane.clone());
                    current = source;
                }
                LaneError::Parallel { failures } => match failures.first() {
                    Some(first) => current = first,
                    None => break,
                },
                LaneError::TaskExecution {
                    task, entry_point, ..
                } => {
                    trail.push(format!("{}.{}", task, entry_point));
                    break;
                }
                LaneError::InvalidArguments { task, .. } => {
                    trail.push(task.clone());
                    break;
                }
                _ => break,
            }
        }
        trail
    }

    /// Innermost error, with lane and parallel wrappers removed.
    pub fn root_cause(&self) -> &LaneError {
        match self {
            LaneError::InLane { source, .. } => source.root_cause(),
            LaneError::Parallel { failures } => match failures.first() {
                Some(first) => first.root_cause(),
                None => self,
            },
            other => other,
        }
    }

    /// Failing task identifiers in this error tree.
    pub fn failed_tasks(&self) -> Vec<&str> {
        match self {
            LaneError::InLane { source, .. } => source.failed_tasks(),
            LaneError::Parallel { failures } => {
                failures.iter().flat_map(|f| f.failed_tasks()).collect()
            }
            LaneError::TaskExecution { task, .. } | LaneError::InvalidArguments { task, .. } => {
                vec![task.as_str()]
            }
            _ => Vec::new(),
        }
    }
}
