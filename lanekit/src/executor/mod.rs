//! Lane executor: walks a lane graph depth-first and runs its tasks.
//!
//! ## Execution model
//!
//! ```text
//! Lane (sequential)            Lane (parallel)
//!   child 1 ─▶ child 2 ─▶ ...    ┌─ child 1 ─┐
//!   fail-fast: later children    ├─ child 2 ─┼─▶ join all
//!   are never started            └─ child 3 ─┘
//! ```
//!
//! Every node moves `Pending → Running → {Succeeded, Failed}`. A failed
//! sequential child aborts its remaining siblings. A parallel lane waits for
//! every dispatched child before reporting the aggregate failure. Failures
//! are wrapped with each enclosing lane name on the way up.

mod events;
mod record;

pub use events::{FanoutObserver, LaneEvent, LaneObserver, RecordingObserver, TracingObserver};
pub use record::{ExecutionRecord, NodeKind, Outcome};

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::FutureExt;
use futures::future::BoxFuture;
use lanekit_shared::errors::{LaneError, LaneResult};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tracing::Instrument;
use uuid::Uuid;

use crate::cache::ContextCache;
use crate::lane::{ExecutionMode, Lane, LaneNode};
use crate::options::ExecutorOptions;
use crate::task::{TaskInstance, TaskSpec};

/// Result of one top-level lane run.
///
/// A failed run still carries the full record tree and the cache in whatever
/// state the failing task left it.
#[derive(Debug)]
pub struct LaneRun {
    run_id: Uuid,
    record: ExecutionRecord,
    cache: ContextCache,
    error: Option<LaneError>,
}

impl LaneRun {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn record(&self) -> &ExecutionRecord {
        &self.record
    }

    pub fn cache(&self) -> &ContextCache {
        &self.cache
    }

    pub fn status(&self) -> &Outcome {
        &self.record.outcome
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }

    pub fn error(&self) -> Option<&LaneError> {
        self.error.as_ref()
    }

    /// `Err` with the breadcrumbed failure, `Ok(self)` otherwise.
    pub fn into_result(mut self) -> LaneResult<Self> {
        match self.error.take() {
            Some(err) => Err(err),
            None => Ok(self),
        }
    }

    pub fn into_parts(self) -> (ExecutionRecord, ContextCache, Option<LaneError>) {
        (self.record, self.cache, self.error)
    }
}

/// Shared state for every node of one run.
#[derive(Clone)]
struct RunScope {
    cache: ContextCache,
    observer: Arc<dyn LaneObserver>,
    permits: Option<Arc<Semaphore>>,
}

impl RunScope {
    async fn acquire(&self) -> LaneResult<Option<OwnedSemaphorePermit>> {
        match &self.permits {
            Some(permits) => Arc::clone(permits)
                .acquire_owned()
                .await
                .map(Some)
                .map_err(|e| LaneError::Internal(format!("worker pool closed: {}", e))),
            None => Ok(None),
        }
    }
}

type NodeResult = (ExecutionRecord, Option<LaneError>);

/// Runs lane graphs.
///
/// The executor is stateless between runs: each call to
/// [`LaneExecutor::execute`] gets its own cache, worker pool and record tree.
pub struct LaneExecutor {
    options: ExecutorOptions,
    observer: Arc<dyn LaneObserver>,
}

impl std::fmt::Debug for LaneExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LaneExecutor")
            .field("options", &self.options)
            .finish()
    }
}

impl LaneExecutor {
    pub fn new(options: ExecutorOptions) -> LaneResult<Self> {
        options.validate()?;
        Ok(Self {
            options,
            observer: Arc::new(TracingObserver),
        })
    }

    /// Replace the event observer (tracing by default).
    pub fn with_observer(mut self, observer: Arc<dyn LaneObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn options(&self) -> &ExecutorOptions {
        &self.options
    }

    /// Execute `lane` with a fresh cache.
    pub async fn execute(&self, lane: &Lane) -> LaneRun {
        self.execute_with_cache(lane, ContextCache::new()).await
    }

    /// Execute `lane` against a caller-provided cache (e.g. seeded with
    /// engine configuration).
    pub async fn execute_with_cache(&self, lane: &Lane, cache: ContextCache) -> LaneRun {
        let run_id = Uuid::new_v4();
        let scope = RunScope {
            cache: cache.clone(),
            observer: Arc::clone(&self.observer),
            permits: self
                .options
                .max_parallel_tasks
                .map(|n| Arc::new(Semaphore::new(n))),
        };

        let span = tracing::info_span!("lane_run", run_id = %run_id, lane = %lane.name());
        let (record, error) = run_lane(scope, lane.clone()).instrument(span).await;

        if self.options.clear_cache_on_finish {
            cache.clear();
        }

        tracing::debug!(
            run_id = %run_id,
            outcome = %record.outcome,
            duration_ms = record.duration_ms,
            tasks = record.tasks().len(),
            "Lane run complete"
        );

        LaneRun {
            run_id,
            record,
            cache,
            error,
        }
    }
}

fn run_lane(scope: RunScope, lane: Lane) -> BoxFuture<'static, NodeResult> {
    async move {
        let started_at = Utc::now();
        let start = Instant::now();
        scope.observer.on_event(&LaneEvent::LaneEnter {
            lane: lane.name().to_string(),
            tree: lane.render_tree(),
        });

        let (children, skipped, failure) = match lane.execution() {
            ExecutionMode::Sequential => run_sequential(&scope, &lane).await,
            ExecutionMode::Parallel => run_parallel(&scope, &lane).await,
        };

        let failure = failure.map(|e| e.in_lane(lane.name()));
        let duration_ms = start.elapsed().as_millis() as u64;
        let outcome = outcome_of(failure.as_ref());

        scope.observer.on_event(&LaneEvent::LaneExit {
            lane: lane.name().to_string(),
            duration_ms,
            outcome: outcome.clone(),
        });

        let record = ExecutionRecord {
            name: lane.name().to_string(),
            kind: NodeKind::Lane {
                execution: lane.execution(),
            },
            started_at,
            finished_at: Utc::now(),
            duration_ms,
            outcome,
            children,
            skipped,
        };
        (record, failure)
    }
    .boxed()
}

async fn run_sequential(
    scope: &RunScope,
    lane: &Lane,
) -> (Vec<ExecutionRecord>, Vec<String>, Option<LaneError>) {
    let mut children = Vec::with_capacity(lane.nodes().len());
    let mut nodes = lane.nodes().iter();

    while let Some(node) = nodes.next() {
        let (record, error) = run_node(scope.clone(), node.clone()).await;
        children.push(record);
        if let Some(error) = error {
            let skipped: Vec<String> = nodes.map(LaneNode::name).collect();
            if !skipped.is_empty() {
                tracing::debug!(
                    lane = %lane.name(),
                    skipped = ?skipped,
                    "Aborting remaining sequential children"
                );
            }
            return (children, skipped, Some(error));
        }
    }

    (children, Vec::new(), None)
}

async fn run_parallel(
    scope: &RunScope,
    lane: &Lane,
) -> (Vec<ExecutionRecord>, Vec<String>, Option<LaneError>) {
    let nodes = lane.nodes();

    // Dropping the set aborts every child, so a cancelled run leaves no
    // detached work behind.
    let mut join_set: JoinSet<(usize, NodeResult)> = JoinSet::new();
    for (index, node) in nodes.iter().enumerate() {
        let child = run_node(scope.clone(), node.clone());
        join_set.spawn(async move { (index, child.await) }.in_current_span());
    }

    // Structured join: every child reaches a terminal state before we return.
    let mut joined: Vec<Option<NodeResult>> = nodes.iter().map(|_| None).collect();
    let mut join_errors = Vec::new();
    while let Some(result) = join_set.join_next().await {
        match result {
            Ok((index, node_result)) => joined[index] = Some(node_result),
            Err(join_err) => join_errors.push(join_err.to_string()),
        }
    }

    let mut children = Vec::with_capacity(nodes.len());
    let mut failures = Vec::new();
    for (node, result) in nodes.iter().zip(joined) {
        match result {
            Some((record, error)) => {
                children.push(record);
                failures.extend(error);
            }
            None => {
                let error = LaneError::Internal(format!(
                    "worker for '{}' did not complete: {}",
                    node.name(),
                    join_errors.join("; ")
                ));
                children.push(aborted_record(node, &error));
                failures.push(error);
            }
        }
    }

    let failure = (!failures.is_empty()).then_some(LaneError::Parallel { failures });
    (children, Vec::new(), failure)
}

async fn run_node(scope: RunScope, node: LaneNode) -> NodeResult {
    match node {
        LaneNode::Task(spec) => run_task(scope, spec).await,
        LaneNode::Lane(lane) => run_lane(scope, lane).await,
    }
}

async fn run_task(scope: RunScope, spec: TaskSpec) -> NodeResult {
    let task = spec.qualified_name();
    let _permit = match scope.acquire().await {
        Ok(permit) => permit,
        Err(error) => {
            let record = aborted_record(&LaneNode::Task(spec), &error);
            return (record, Some(error));
        }
    };

    scope.observer.on_event(&LaneEvent::TaskEnter { task: task.clone() });
    let started_at = Utc::now();
    let start = Instant::now();

    // Fresh instance per invocation, bound to the run's cache. Construction
    // failures carry the task identity like failures of the body do.
    let result = match TaskInstance::construct(&spec, scope.cache.clone()) {
        Ok(instance) => instance.invoke().await,
        Err(error) => Err(LaneError::task_execution(
            spec.identifier(),
            spec.entry_point(),
            error,
        )),
    };

    let duration_ms = start.elapsed().as_millis() as u64;
    let error = result.err();
    let outcome = outcome_of(error.as_ref());

    scope.observer.on_event(&LaneEvent::TaskExit {
        task,
        duration_ms,
        outcome: outcome.clone(),
    });

    let record = ExecutionRecord {
        name: spec.identifier().to_string(),
        kind: NodeKind::Task {
            entry_point: spec.entry_point().to_string(),
        },
        started_at,
        finished_at: Utc::now(),
        duration_ms,
        outcome,
        children: Vec::new(),
        skipped: Vec::new(),
    };
    (record, error)
}

fn outcome_of(error: Option<&LaneError>) -> Outcome {
    match error {
        None => Outcome::Succeeded,
        Some(error) => Outcome::Failed {
            error: error.to_string(),
        },
    }
}

/// Record for a node that failed before it could run.
fn aborted_record(node: &LaneNode, error: &LaneError) -> ExecutionRecord {
    let now = Utc::now();
    let (name, kind) = match node {
        LaneNode::Task(spec) => (
            spec.identifier().to_string(),
            NodeKind::Task {
                entry_point: spec.entry_point().to_string(),
            },
        ),
        LaneNode::Lane(lane) => (
            lane.name().to_string(),
            NodeKind::Lane {
                execution: lane.execution(),
            },
        ),
    };
    ExecutionRecord {
        name,
        kind,
        started_at: now,
        finished_at: now,
        duration_ms: 0,
        outcome: outcome_of(Some(error)),
        children: Vec::new(),
        skipped: Vec::new(),
    }
}
