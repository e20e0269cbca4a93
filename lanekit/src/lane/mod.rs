//! Lane graph: an ordered tree of task specs and nested lanes.
//!
//! ```text
//! Lane (sequential | parallel)
//!   ├─ TaskSpec
//!   ├─ Lane
//!   │    ├─ TaskSpec
//!   │    └─ TaskSpec
//!   └─ TaskSpec
//! ```
//!
//! A lane's node sequence is fixed at build time and shared behind an `Arc`,
//! so handing a lane to the executor (or cloning it into parallel workers)
//! never copies or mutates the tree.

mod builder;

pub use builder::LaneBuilder;

use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::Arc;

use lanekit_shared::errors::{LaneError, LaneResult};
use serde::{Deserialize, Serialize};

use crate::registry::validate_task_names;
use crate::task::TaskSpec;

/// Execution mode for the direct children of a lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Execute children one after another, in insertion order
    #[default]
    Sequential,
    /// Dispatch all children concurrently and join them
    Parallel,
}

/// A child of a lane.
#[derive(Debug, Clone)]
pub enum LaneNode {
    Task(TaskSpec),
    Lane(Lane),
}

impl LaneNode {
    /// Display name: `Task.entry_point` for tasks, the lane name for lanes.
    pub fn name(&self) -> String {
        match self {
            LaneNode::Task(spec) => spec.qualified_name(),
            LaneNode::Lane(lane) => lane.name.clone(),
        }
    }
}

/// Name tree of a lane graph or execution record, for structural comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeShape {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeShape>,
}

/// A named container of nodes with an execution mode.
#[derive(Debug, Clone)]
pub struct Lane {
    name: String,
    execution: ExecutionMode,
    nodes: Arc<[LaneNode]>,
}

impl Lane {
    /// Build a lane, rejecting empty names, invalid task names and duplicate
    /// sibling lane names.
    pub fn new(
        name: impl Into<String>,
        execution: ExecutionMode,
        nodes: Vec<LaneNode>,
    ) -> LaneResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(LaneError::Config("lane name must not be empty".into()));
        }

        let mut seen = HashSet::new();
        for node in &nodes {
            match node {
                LaneNode::Task(spec) => {
                    validate_task_names(spec.identifier(), spec.entry_point())?
                }
                LaneNode::Lane(child) => {
                    if !seen.insert(child.name.as_str()) {
                        return Err(LaneError::Config(format!(
                            "duplicate lane '{}' inside lane '{}'",
                            child.name, name
                        )));
                    }
                }
            }
        }

        Ok(Self {
            name,
            execution,
            nodes: nodes.into(),
        })
    }

    /// Create a lane with sequential child execution.
    pub fn sequential(name: impl Into<String>, nodes: Vec<LaneNode>) -> LaneResult<Self> {
        Self::new(name, ExecutionMode::Sequential, nodes)
    }

    /// Create a lane with parallel child execution.
    pub fn parallel(name: impl Into<String>, nodes: Vec<LaneNode>) -> LaneResult<Self> {
        Self::new(name, ExecutionMode::Parallel, nodes)
    }

    pub fn builder(name: impl Into<String>) -> LaneBuilder {
        LaneBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn execution(&self) -> ExecutionMode {
        self.execution
    }

    pub fn run_parallel(&self) -> bool {
        self.execution == ExecutionMode::Parallel
    }

    pub fn nodes(&self) -> &[LaneNode] {
        &self.nodes
    }

    /// Number of tasks in the whole subtree.
    pub fn task_count(&self) -> usize {
        self.nodes
            .iter()
            .map(|node| match node {
                LaneNode::Task(_) => 1,
                LaneNode::Lane(lane) => lane.task_count(),
            })
            .sum()
    }

    pub fn shape(&self) -> NodeShape {
        NodeShape {
            name: self.name.clone(),
            children: self
                .nodes
                .iter()
                .map(|node| match node {
                    LaneNode::Task(spec) => NodeShape {
                        name: spec.qualified_name(),
                        children: Vec::new(),
                    },
                    LaneNode::Lane(lane) => lane.shape(),
                })
                .collect(),
        }
    }

    /// Render the subtree names, indented two spaces per nesting level.
    pub fn render_tree(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out, 0);
        out
    }

    fn render_into(&self, out: &mut String, depth: usize) {
        let indent = "  ".repeat(depth);
        let suffix = if self.run_parallel() { " [parallel]" } else { "" };
        let _ = writeln!(out, "{}{}{}", indent, self.name, suffix);
        for node in self.nodes.iter() {
            match node {
                LaneNode::Task(spec) => {
                    let _ = writeln!(out, "{}  {}", indent, spec.qualified_name());
                }
                LaneNode::Lane(lane) => lane.render_into(out, depth + 1),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ContextCache;
    use crate::task::{Task, TaskArgs, TaskDefinition};
    use async_trait::async_trait;

    struct Extract;

    #[async_trait]
    impl Task for Extract {
        async fn run(self: Box<Self>, _cache: ContextCache) -> anyhow::Result<()> {
            Ok(())
        }
    }

    impl TaskDefinition for Extract {
        const NAME: &'static str = "Extract";

        fn construct(_args: &TaskArgs) -> LaneResult<Self> {
            Ok(Self)
        }
    }

    fn task() -> LaneNode {
        LaneNode::Task(TaskSpec::of::<Extract>(TaskArgs::new()))
    }

    #[test]
    fn test_render_tree_indents_by_depth() {
        let inner = Lane::parallel("features", vec![task(), task()]).unwrap();
        let lane = Lane::sequential("iris", vec![task(), LaneNode::Lane(inner)]).unwrap();

        assert_eq!(
            lane.render_tree(),
            "iris\n  Extract.run\n  features [parallel]\n    Extract.run\n    Extract.run\n"
        );
        assert_eq!(lane.task_count(), 3);
    }

    #[test]
    fn test_duplicate_sibling_lanes_rejected() {
        let a = Lane::sequential("dup", vec![task()]).unwrap();
        let b = Lane::sequential("dup", vec![task()]).unwrap();
        let err = Lane::sequential("root", vec![LaneNode::Lane(a), LaneNode::Lane(b)]).unwrap_err();
        assert!(matches!(err, LaneError::Config(msg) if msg.contains("dup")));
    }

    #[test]
    fn test_same_name_at_different_levels_allowed() {
        let leaf = Lane::sequential("stage", vec![task()]).unwrap();
        let mid = Lane::sequential("stage", vec![LaneNode::Lane(leaf)]).unwrap();
        assert!(Lane::sequential("root", vec![LaneNode::Lane(mid)]).is_ok());
    }

    #[test]
    fn test_shape_mirrors_tree() {
        let lane = Lane::sequential("root", vec![task()]).unwrap();
        assert_eq!(
            lane.shape(),
            NodeShape {
                name: "root".into(),
                children: vec![NodeShape {
                    name: "Extract.run".into(),
                    children: vec![],
                }],
            }
        );
    }

    #[test]
    fn test_clone_shares_nodes() {
        let lane = Lane::sequential("root", vec![task()]).unwrap();
        let copy = lane.clone();
        assert!(std::ptr::eq(lane.nodes().as_ptr(), copy.nodes().as_ptr()));
    }
}
