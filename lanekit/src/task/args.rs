//! Construction arguments captured when a lane graph is built.

use std::collections::BTreeMap;

use lanekit_shared::errors::{LaneError, LaneResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Positional and named construction arguments for one task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskArgs {
    #[serde(default)]
    pub args: Vec<Value>,
    #[serde(default)]
    pub kwargs: BTreeMap<String, Value>,
}

impl TaskArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a positional argument.
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    /// Set a named argument.
    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.kwargs.insert(name.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty() && self.kwargs.is_empty()
    }

    /// Typed positional argument at `index`.
    pub fn positional<T: DeserializeOwned>(&self, task: &str, index: usize) -> LaneResult<T> {
        let value = self.args.get(index).ok_or_else(|| LaneError::InvalidArguments {
            task: task.to_string(),
            reason: format!(
                "missing positional argument {} (got {})",
                index,
                self.args.len()
            ),
        })?;
        decode(task, &format!("argument {}", index), value)
    }

    /// Typed named argument, `None` when absent.
    pub fn keyword<T: DeserializeOwned>(&self, task: &str, name: &str) -> LaneResult<Option<T>> {
        self.kwargs
            .get(name)
            .map(|value| decode(task, name, value))
            .transpose()
    }

    /// Typed named argument that must be present.
    pub fn require_keyword<T: DeserializeOwned>(&self, task: &str, name: &str) -> LaneResult<T> {
        self.keyword(task, name)?
            .ok_or_else(|| LaneError::InvalidArguments {
                task: task.to_string(),
                reason: format!("missing keyword argument '{}'", name),
            })
    }

    /// Typed named argument with a fallback.
    pub fn keyword_or<T: DeserializeOwned>(
        &self,
        task: &str,
        name: &str,
        default: T,
    ) -> LaneResult<T> {
        Ok(self.keyword(task, name)?.unwrap_or(default))
    }
}

fn decode<T: DeserializeOwned>(task: &str, what: &str, value: &Value) -> LaneResult<T> {
    T::deserialize(value).map_err(|e| LaneError::InvalidArguments {
        task: task.to_string(),
        reason: format!("{}: {}", what, e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_accessors() {
        let args = TaskArgs::new()
            .arg("out")
            .arg(3)
            .kwarg("path", "d.csv")
            .kwarg("header", true);

        assert_eq!(args.positional::<String>("Save", 0).unwrap(), "out");
        assert_eq!(args.positional::<u32>("Save", 1).unwrap(), 3);
        assert_eq!(
            args.require_keyword::<String>("Extract", "path").unwrap(),
            "d.csv"
        );
        assert!(args.keyword_or("Extract", "header", false).unwrap());
        assert_eq!(args.keyword::<String>("Extract", "sep").unwrap(), None);
    }

    #[test]
    fn test_missing_and_mistyped() {
        let args = TaskArgs::new().kwarg("ms", "soon");
        assert!(matches!(
            args.positional::<String>("Save", 0),
            Err(LaneError::InvalidArguments { task, .. }) if task == "Save"
        ));
        assert!(matches!(
            args.require_keyword::<u64>("Sleep", "ms"),
            Err(LaneError::InvalidArguments { reason, .. }) if reason.starts_with("ms:")
        ));
    }
}
