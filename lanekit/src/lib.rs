//! lanekit: declarative lane/task orchestration.
//!
//! ```text
//! Manifest / LaneBuilder ──▶ Lane graph ──▶ LaneExecutor ──▶ LaneRun
//!                                │                │            (records + cache)
//!                           TaskRegistry     ContextCache
//! ```
//!
//! Tasks are small types implementing [`Task`]; they communicate only
//! through the run's [`ContextCache`]. Lanes order them sequentially or run
//! them in parallel, nest into trees, and can be declared in YAML.

pub mod builtin;
pub mod cache;
pub mod executor;
pub mod lane;
pub mod logging;
pub mod manifest;
pub mod options;
pub mod registry;
pub mod task;

#[doc(hidden)]
pub use inventory;

pub use cache::{Artifact, CacheLifecycle, ContextCache, ENGINE_CONF_KEY};
pub use executor::{
    ExecutionRecord, LaneEvent, LaneExecutor, LaneObserver, LaneRun, NodeKind, Outcome,
    RecordingObserver, TracingObserver,
};
pub use lane::{ExecutionMode, Lane, LaneBuilder, LaneNode, NodeShape};
pub use lanekit_shared::errors::{BoxError, LaneError, LaneResult};
pub use logging::init_logging;
pub use manifest::ManifestLoader;
pub use options::{EngineConf, ExecutorOptions, LaunchConfig, LoggingOptions};
pub use registry::{TaskBinding, TaskRegistry};
pub use task::{BoxedTask, Task, TaskArgs, TaskDefinition, TaskInstance, TaskSpec};
