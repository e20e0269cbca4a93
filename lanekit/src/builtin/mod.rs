//! Utility tasks available to every manifest.
//!
//! These move artifacts around and help wire lanes together; data
//! processing lives in user-registered tasks.

use std::time::Duration;

use async_trait::async_trait;
use lanekit_shared::errors::LaneResult;
use serde_json::Value;

use crate::cache::ContextCache;
use crate::registry::TaskRegistry;
use crate::task::{Task, TaskArgs, TaskDefinition};

/// Store a JSON value: `kwargs: {key, value}`.
pub struct Put {
    key: String,
    value: Value,
}

#[async_trait]
impl Task for Put {
    async fn run(self: Box<Self>, cache: ContextCache) -> anyhow::Result<()> {
        cache.put(self.key, self.value);
        Ok(())
    }
}

impl TaskDefinition for Put {
    const NAME: &'static str = "lanekit.Put";

    fn construct(args: &TaskArgs) -> LaneResult<Self> {
        Ok(Self {
            key: args.require_keyword(Self::NAME, "key")?,
            value: args.keyword_or(Self::NAME, "value", Value::Null)?,
        })
    }
}

/// Expose an artifact under a second key: `args: [from, to]`.
pub struct CopyArtifact {
    from: String,
    to: String,
}

#[async_trait]
impl Task for CopyArtifact {
    async fn run(self: Box<Self>, cache: ContextCache) -> anyhow::Result<()> {
        let artifact = cache.get_raw(&self.from)?;
        cache.put_raw(self.to, artifact);
        Ok(())
    }
}

impl TaskDefinition for CopyArtifact {
    const NAME: &'static str = "lanekit.Copy";

    fn construct(args: &TaskArgs) -> LaneResult<Self> {
        Ok(Self {
            from: args.positional(Self::NAME, 0)?,
            to: args.positional(Self::NAME, 1)?,
        })
    }
}

/// Uncache an artifact, firing its lifecycle hook: `args: [key]`.
pub struct Uncache {
    key: String,
}

#[async_trait]
impl Task for Uncache {
    async fn run(self: Box<Self>, cache: ContextCache) -> anyhow::Result<()> {
        cache.uncache(&self.key)?;
        Ok(())
    }
}

impl TaskDefinition for Uncache {
    const NAME: &'static str = "lanekit.Uncache";

    fn construct(args: &TaskArgs) -> LaneResult<Self> {
        Ok(Self {
            key: args.positional(Self::NAME, 0)?,
        })
    }
}

/// `kwargs: {ms}`.
pub struct Sleep {
    duration: Duration,
}

#[async_trait]
impl Task for Sleep {
    async fn run(self: Box<Self>, _cache: ContextCache) -> anyhow::Result<()> {
        tokio::time::sleep(self.duration).await;
        Ok(())
    }
}

impl TaskDefinition for Sleep {
    const NAME: &'static str = "lanekit.Sleep";

    fn construct(args: &TaskArgs) -> LaneResult<Self> {
        Ok(Self {
            duration: Duration::from_millis(args.keyword_or(Self::NAME, "ms", 0)?),
        })
    }
}

/// `args: [message]`.
pub struct Log {
    message: String,
}

#[async_trait]
impl Task for Log {
    async fn run(self: Box<Self>, _cache: ContextCache) -> anyhow::Result<()> {
        tracing::info!(target: "lanekit::task", "{}", self.message);
        Ok(())
    }
}

impl TaskDefinition for Log {
    const NAME: &'static str = "lanekit.Log";

    fn construct(args: &TaskArgs) -> LaneResult<Self> {
        Ok(Self {
            message: args.positional(Self::NAME, 0)?,
        })
    }
}

/// Always fails, for checking failure wiring: `kwargs: {message}`.
pub struct Fail {
    message: String,
}

#[async_trait]
impl Task for Fail {
    async fn run(self: Box<Self>, _cache: ContextCache) -> anyhow::Result<()> {
        anyhow::bail!("{}", self.message)
    }
}

impl TaskDefinition for Fail {
    const NAME: &'static str = "lanekit.Fail";

    fn construct(args: &TaskArgs) -> LaneResult<Self> {
        Ok(Self {
            message: args.keyword_or(Self::NAME, "message", "intentional failure".to_string())?,
        })
    }
}

/// Register every builtin task.
pub fn register_all(registry: &mut TaskRegistry) -> LaneResult<()> {
    registry.register::<Put>()?;
    registry.register::<CopyArtifact>()?;
    registry.register::<Uncache>()?;
    registry.register::<Sleep>()?;
    registry.register::<Log>()?;
    registry.register::<Fail>()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lane::Lane;
    use crate::executor::LaneExecutor;
    use crate::options::ExecutorOptions;
    use lanekit_shared::errors::LaneError;
    use serde_json::json;

    #[tokio::test]
    async fn test_builtins_from_registry() {
        let registry = TaskRegistry::with_builtins().unwrap();
        let lane = Lane::builder("wiring")
            .add_registered(
                &registry,
                "lanekit.Put",
                TaskArgs::new().kwarg("key", "conf").kwarg("value", json!({"k": 1})),
            )
            .unwrap()
            .add_registered(&registry, "lanekit.Copy", TaskArgs::new().arg("conf").arg("alias"))
            .unwrap()
            .add_registered(&registry, "lanekit.Sleep", TaskArgs::new().kwarg("ms", 1))
            .unwrap()
            .add_registered(&registry, "lanekit.Log", TaskArgs::new().arg("done"))
            .unwrap()
            .add_registered(&registry, "lanekit.Uncache", TaskArgs::new().arg("conf"))
            .unwrap()
            .build()
            .unwrap();

        let run = LaneExecutor::new(ExecutorOptions::default())
            .unwrap()
            .execute(&lane)
            .await;

        assert!(run.succeeded());
        assert!(!run.cache().has("conf"));
        assert_eq!(*run.cache().get::<Value>("alias").unwrap(), json!({"k": 1}));
    }

    #[tokio::test]
    async fn test_fail_and_missing_copy_source() {
        let lane = Lane::builder("broken")
            .add::<CopyArtifact>(TaskArgs::new().arg("nothing").arg("x"))
            .build()
            .unwrap();
        let run = LaneExecutor::new(ExecutorOptions::default())
            .unwrap()
            .execute(&lane)
            .await;
        let err = run.into_result().unwrap_err();
        assert!(err.to_string().contains("missing artifact 'nothing'"));

        let lane = Lane::builder("broken")
            .add::<Fail>(TaskArgs::new().kwarg("message", "nope"))
            .build()
            .unwrap();
        let run = LaneExecutor::new(ExecutorOptions::default())
            .unwrap()
            .execute(&lane)
            .await;
        assert!(matches!(
            run.error().unwrap().root_cause(),
            LaneError::TaskExecution { task, .. } if task == "lanekit.Fail"
        ));
    }
}
