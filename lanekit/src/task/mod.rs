//! Units of work executed by a lane.
//!
//! A task type implements [`Task`] (its entry point) and, to be declarable by
//! type or by identifier, [`TaskDefinition`]. Lanes hold [`TaskSpec`]s, which
//! capture the constructor and arguments at build time. The executor turns each
//! spec into a fresh [`TaskInstance`] right before invoking it.

mod args;
mod instance;
mod spec;

pub use args::TaskArgs;
pub use instance::TaskInstance;
pub use spec::{TaskConstructor, TaskSpec};

use async_trait::async_trait;
use lanekit_shared::errors::LaneResult;

use crate::cache::ContextCache;

/// Entry point name used when a task type does not designate one.
pub const DEFAULT_ENTRY_POINT: &str = "run";

/// Trait for tasks that can be executed in a lane.
///
/// The cache is the only channel between tasks: the executor consumes no
/// return value beyond success or failure.
#[async_trait]
pub trait Task: Send + Sync {
    /// Execute the task's entry point against the shared cache.
    async fn run(self: Box<Self>, cache: ContextCache) -> anyhow::Result<()>;
}

pub type BoxedTask = Box<dyn Task>;

/// A task type that can be constructed from declarative arguments.
///
/// ```ignore
/// struct Save { dir: String }
///
/// impl TaskDefinition for Save {
///     const NAME: &'static str = "Save";
///     fn construct(args: &TaskArgs) -> LaneResult<Self> {
///         Ok(Self { dir: args.positional(Self::NAME, 0)? })
///     }
/// }
/// ```
pub trait TaskDefinition: Task + Sized + 'static {
    /// Identifier the task is registered and referenced under.
    const NAME: &'static str;

    /// Name of the designated entry point, used in telemetry.
    const ENTRY_POINT: &'static str = DEFAULT_ENTRY_POINT;

    fn construct(args: &TaskArgs) -> LaneResult<Self>;
}

/// Type-erased constructor for a [`TaskDefinition`].
pub(crate) fn construct_boxed<T: TaskDefinition>(args: &TaskArgs) -> LaneResult<BoxedTask> {
    Ok(Box::new(T::construct(args)?))
}
