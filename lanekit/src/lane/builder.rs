//! Fluent construction of lane graphs.

use lanekit_shared::errors::LaneResult;

use super::{ExecutionMode, Lane, LaneNode};
use crate::registry::TaskRegistry;
use crate::task::{TaskArgs, TaskDefinition, TaskSpec};

/// Appends nodes in insertion order; [`LaneBuilder::build`] freezes them.
///
/// ```ignore
/// let lane = Lane::builder("iris")
///     .add::<Extract>(TaskArgs::new().kwarg("path", "d.csv"))
///     .add::<AddIndex>(TaskArgs::new())
///     .add_lane(features)
///     .build()?;
/// ```
#[derive(Debug)]
pub struct LaneBuilder {
    name: String,
    execution: ExecutionMode,
    nodes: Vec<LaneNode>,
}

impl LaneBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            execution: ExecutionMode::Sequential,
            nodes: Vec::new(),
        }
    }

    /// Run direct children concurrently.
    pub fn parallel(mut self, run_parallel: bool) -> Self {
        self.execution = if run_parallel {
            ExecutionMode::Parallel
        } else {
            ExecutionMode::Sequential
        };
        self
    }

    /// Append a task type with its construction arguments.
    pub fn add<T: TaskDefinition>(self, args: TaskArgs) -> Self {
        self.add_spec(TaskSpec::of::<T>(args))
    }

    /// Append a task resolved from the registry by identifier.
    pub fn add_registered(
        self,
        registry: &TaskRegistry,
        reference: &str,
        args: TaskArgs,
    ) -> LaneResult<Self> {
        let spec = registry.resolve(reference)?.spec(args);
        Ok(self.add_spec(spec))
    }

    pub fn add_spec(mut self, spec: TaskSpec) -> Self {
        self.nodes.push(LaneNode::Task(spec));
        self
    }

    /// Nest a sub-lane.
    pub fn add_lane(mut self, lane: Lane) -> Self {
        self.nodes.push(LaneNode::Lane(lane));
        self
    }

    pub fn build(self) -> LaneResult<Lane> {
        Lane::new(self.name, self.execution, self.nodes)
    }
}
