use std::sync::Arc;

use lanekit_shared::errors::LaneResult;

use super::{BoxedTask, TaskArgs, TaskDefinition, construct_boxed};

/// Constructs a fresh task from its captured arguments.
pub type TaskConstructor = Arc<dyn Fn(&TaskArgs) -> LaneResult<BoxedTask> + Send + Sync>;

/// Declared task: identity, entry point and construction arguments.
///
/// Immutable once built; cloning shares the constructor.
#[derive(Clone)]
pub struct TaskSpec {
    identifier: String,
    entry_point: String,
    args: TaskArgs,
    constructor: TaskConstructor,
}

impl std::fmt::Debug for TaskSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskSpec")
            .field("identifier", &self.identifier)
            .field("entry_point", &self.entry_point)
            .field("args", &self.args)
            .finish()
    }
}

impl TaskSpec {
    pub fn new(
        identifier: impl Into<String>,
        entry_point: impl Into<String>,
        args: TaskArgs,
        constructor: TaskConstructor,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            entry_point: entry_point.into(),
            args,
            constructor,
        }
    }

    /// Spec for a task type, bypassing the registry.
    pub fn of<T: TaskDefinition>(args: TaskArgs) -> Self {
        Self::new(T::NAME, T::ENTRY_POINT, args, Arc::new(construct_boxed::<T>))
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    pub fn args(&self) -> &TaskArgs {
        &self.args
    }

    /// `Identifier.entry_point`, as shown in logs and records.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.identifier, self.entry_point)
    }

    pub(crate) fn construct(&self) -> LaneResult<BoxedTask> {
        (self.constructor)(&self.args)
    }
}
