use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use lanekit_shared::errors::{LaneError, LaneResult};

use super::{BoxedTask, TaskSpec};
use crate::cache::ContextCache;

/// A constructed task bound to the run's cache, ready for one invocation.
pub struct TaskInstance {
    identifier: String,
    entry_point: String,
    task: BoxedTask,
    cache: ContextCache,
}

impl TaskInstance {
    /// Construct a fresh task from `spec` and bind it to `cache`.
    pub fn construct(spec: &TaskSpec, cache: ContextCache) -> LaneResult<Self> {
        let task = spec.construct()?;
        Ok(Self {
            identifier: spec.identifier().to_string(),
            entry_point: spec.entry_point().to_string(),
            task,
            cache,
        })
    }

    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.identifier, self.entry_point)
    }

    /// Call the entry point, wrapping any failure (panics included) with the
    /// task identity.
    pub async fn invoke(self) -> LaneResult<()> {
        let TaskInstance {
            identifier,
            entry_point,
            task,
            cache,
        } = self;

        match AssertUnwindSafe(task.run(cache)).catch_unwind().await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(LaneError::task_execution(identifier, entry_point, e)),
            Err(panic) => Err(LaneError::task_execution(
                identifier,
                entry_point,
                format!("task panicked: {}", panic_message(panic.as_ref())),
            )),
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{Task, TaskArgs, TaskDefinition};
    use async_trait::async_trait;

    struct Extract {
        path: String,
    }

    #[async_trait]
    impl Task for Extract {
        async fn run(self: Box<Self>, cache: ContextCache) -> anyhow::Result<()> {
            if self.path.is_empty() {
                anyhow::bail!("empty path");
            }
            cache.put("raw", self.path.clone());
            Ok(())
        }
    }

    impl TaskDefinition for Extract {
        const NAME: &'static str = "Extract";
        const ENTRY_POINT: &'static str = "read_csv";

        fn construct(args: &TaskArgs) -> LaneResult<Self> {
            Ok(Self {
                path: args.require_keyword(Self::NAME, "path")?,
            })
        }
    }

    struct Explode;

    #[async_trait]
    impl Task for Explode {
        async fn run(self: Box<Self>, _cache: ContextCache) -> anyhow::Result<()> {
            panic!("boom");
        }
    }

    impl TaskDefinition for Explode {
        const NAME: &'static str = "Explode";

        fn construct(_args: &TaskArgs) -> LaneResult<Self> {
            Ok(Self)
        }
    }

    #[tokio::test]
    async fn test_invoke_writes_cache() {
        let cache = ContextCache::new();
        let spec = TaskSpec::of::<Extract>(TaskArgs::new().kwarg("path", "d.csv"));
        let instance = TaskInstance::construct(&spec, cache.clone()).unwrap();
        assert_eq!(instance.qualified_name(), "Extract.read_csv");

        instance.invoke().await.unwrap();
        assert_eq!(cache.get::<String>("raw").unwrap().as_str(), "d.csv");
    }

    #[tokio::test]
    async fn test_failure_carries_identity() {
        let spec = TaskSpec::of::<Extract>(TaskArgs::new().kwarg("path", ""));
        let err = TaskInstance::construct(&spec, ContextCache::new())
            .unwrap()
            .invoke()
            .await
            .unwrap_err();
        match err {
            LaneError::TaskExecution {
                task,
                entry_point,
                cause,
            } => {
                assert_eq!(task, "Extract");
                assert_eq!(entry_point, "read_csv");
                assert_eq!(cause.to_string(), "empty path");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_construction_rejects_bad_args() {
        let spec = TaskSpec::of::<Extract>(TaskArgs::new());
        assert!(matches!(
            TaskInstance::construct(&spec, ContextCache::new()),
            Err(LaneError::InvalidArguments { .. })
        ));
    }

    #[tokio::test]
    async fn test_panic_is_captured() {
        let spec = TaskSpec::of::<Explode>(TaskArgs::new());
        let err = TaskInstance::construct(&spec, ContextCache::new())
            .unwrap()
            .invoke()
            .await
            .unwrap_err();
        assert!(err.to_string().contains("boom"));
    }
}
