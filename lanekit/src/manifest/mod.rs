//! Declarative lane manifests.
//!
//! ```yaml
//! lane:
//!   name: iris
//!   run_parallel: false
//!   tasks:
//!     - class: Extract
//!       kwargs: { path: "${DATA_DIR}/iris.csv" }
//!     - class: AddIndex
//!     - lane:
//!         name: features
//!         run_parallel: true
//!         tasks:
//!           - class: Normalize
//!           - class: Describe
//!     - class: Save
//!       args: ["out"]
//! ```
//!
//! Loading only builds task specs; nothing is constructed or run.

mod env;

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use lanekit_shared::errors::{LaneError, LaneResult};
use serde_yaml::{Mapping, Value};

use crate::lane::{ExecutionMode, Lane, LaneNode};
use crate::registry::TaskRegistry;
use crate::task::TaskArgs;

const DOCUMENT_KEYS: &[&str] = &["lane"];
const LANE_KEYS: &[&str] = &["name", "run_parallel", "tasks"];
const TASK_KEYS: &[&str] = &["class", "args", "kwargs"];

fn manifest_error(path: &str, reason: impl Into<String>) -> LaneError {
    LaneError::Manifest {
        path: path.to_string(),
        reason: reason.into(),
    }
}

/// Builds lane graphs from manifest documents against a task registry.
#[derive(Debug, Clone, Copy)]
pub struct ManifestLoader<'a> {
    registry: &'a TaskRegistry,
}

impl<'a> ManifestLoader<'a> {
    pub fn new(registry: &'a TaskRegistry) -> Self {
        Self { registry }
    }

    /// Parse a manifest file.
    ///
    /// Errors name the file in their reason.
    pub fn load_path(&self, path: &Path) -> LaneResult<Lane> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            manifest_error("$", format!("{}: failed to read manifest: {}", path.display(), e))
        })?;
        let lane = self.load_str(&content).map_err(|e| match e {
            LaneError::Manifest {
                path: at,
                reason,
            } => LaneError::Manifest {
                path: at,
                reason: format!("{}: {}", path.display(), reason),
            },
            other => other,
        })?;
        tracing::debug!(
            manifest = %path.display(),
            lane = %lane.name(),
            tasks = lane.task_count(),
            "Loaded manifest"
        );
        Ok(lane)
    }

    /// Parse a manifest document, substituting `${VAR}` references first.
    pub fn load_str(&self, text: &str) -> LaneResult<Lane> {
        let text = env::substitute_env_vars(text)?;
        let document: Value = serde_yaml::from_str(&text)
            .map_err(|e| manifest_error("$", format!("invalid YAML: {}", e)))?;

        let root = as_mapping(&document, "$")?;
        check_keys(root, "$", DOCUMENT_KEYS)?;
        let lane = root
            .get("lane")
            .ok_or_else(|| manifest_error("$", "missing required key 'lane'"))?;
        self.parse_lane(lane, "lane")
    }

    fn parse_lane(&self, value: &Value, path: &str) -> LaneResult<Lane> {
        let block = as_mapping(value, path)?;
        check_keys(block, path, LANE_KEYS)?;

        let name_path = format!("{}.name", path);
        let name = block
            .get("name")
            .ok_or_else(|| manifest_error(path, "missing required key 'name'"))?
            .as_str()
            .ok_or_else(|| manifest_error(&name_path, "must be a string"))?;
        if name.trim().is_empty() {
            return Err(manifest_error(&name_path, "must not be empty"));
        }

        let execution = match block.get("run_parallel") {
            None | Some(Value::Null) => ExecutionMode::Sequential,
            Some(Value::Bool(true)) => ExecutionMode::Parallel,
            Some(Value::Bool(false)) => ExecutionMode::Sequential,
            Some(_) => {
                return Err(manifest_error(
                    &format!("{}.run_parallel", path),
                    "must be a boolean",
                ));
            }
        };

        let tasks_path = format!("{}.tasks", path);
        let entries = block
            .get("tasks")
            .ok_or_else(|| manifest_error(path, "missing required key 'tasks'"))?
            .as_sequence()
            .ok_or_else(|| manifest_error(&tasks_path, "must be a sequence"))?;

        let mut nodes = Vec::with_capacity(entries.len());
        let mut lane_names = HashSet::new();
        for (index, entry) in entries.iter().enumerate() {
            let entry_path = format!("{}[{}]", tasks_path, index);
            let node = self.parse_entry(entry, &entry_path)?;
            if let LaneNode::Lane(child) = &node
                && !lane_names.insert(child.name().to_string())
            {
                return Err(manifest_error(
                    &format!("{}.lane.name", entry_path),
                    format!("duplicate lane name '{}' within lane '{}'", child.name(), name),
                ));
            }
            nodes.push(node);
        }

        Lane::new(name, execution, nodes).map_err(|e| manifest_error(path, e.to_string()))
    }

    fn parse_entry(&self, value: &Value, path: &str) -> LaneResult<LaneNode> {
        let entry = as_mapping(value, path)?;

        if let Some(nested) = entry.get("lane") {
            check_keys(entry, path, DOCUMENT_KEYS)?;
            let lane = self.parse_lane(nested, &format!("{}.lane", path))?;
            return Ok(LaneNode::Lane(lane));
        }

        check_keys(entry, path, TASK_KEYS)?;
        let class_path = format!("{}.class", path);
        let class = entry
            .get("class")
            .ok_or_else(|| manifest_error(path, "missing required key 'class' (or 'lane')"))?
            .as_str()
            .ok_or_else(|| manifest_error(&class_path, "must be a string"))?;

        let binding = self.registry.resolve(class).map_err(|e| match e {
            LaneError::UnknownTask(id) => {
                manifest_error(&class_path, format!("unknown task class '{}'", id))
            }
            other => manifest_error(&class_path, other.to_string()),
        })?;

        let args = TaskArgs {
            args: parse_args(entry.get("args"), &format!("{}.args", path))?,
            kwargs: parse_kwargs(entry.get("kwargs"), &format!("{}.kwargs", path))?,
        };
        Ok(LaneNode::Task(binding.spec(args)))
    }
}

fn as_mapping<'v>(value: &'v Value, path: &str) -> LaneResult<&'v Mapping> {
    value
        .as_mapping()
        .ok_or_else(|| manifest_error(path, format!("expected a mapping, found {}", kind_of(value))))
}

fn check_keys(mapping: &Mapping, path: &str, allowed: &[&str]) -> LaneResult<()> {
    for key in mapping.keys() {
        match key.as_str() {
            Some(k) if allowed.contains(&k) => {}
            Some(k) => {
                return Err(manifest_error(
                    path,
                    format!("unknown key '{}' (expected one of: {})", k, allowed.join(", ")),
                ));
            }
            None => return Err(manifest_error(path, "mapping keys must be strings")),
        }
    }
    Ok(())
}

fn parse_args(value: Option<&Value>, path: &str) -> LaneResult<Vec<serde_json::Value>> {
    match value {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Sequence(items)) => items
            .iter()
            .enumerate()
            .map(|(i, item)| to_json(item, &format!("{}[{}]", path, i)))
            .collect(),
        Some(other) => Err(manifest_error(
            path,
            format!("expected a sequence, found {}", kind_of(other)),
        )),
    }
}

fn parse_kwargs(
    value: Option<&Value>,
    path: &str,
) -> LaneResult<BTreeMap<String, serde_json::Value>> {
    match value {
        None | Some(Value::Null) => Ok(BTreeMap::new()),
        Some(Value::Mapping(mapping)) => mapping
            .iter()
            .map(|(key, item)| -> LaneResult<(String, serde_json::Value)> {
                let key = key
                    .as_str()
                    .ok_or_else(|| manifest_error(path, "keyword names must be strings"))?;
                Ok((key.to_string(), to_json(item, &format!("{}.{}", path, key))?))
            })
            .collect(),
        Some(other) => Err(manifest_error(
            path,
            format!("expected a mapping, found {}", kind_of(other)),
        )),
    }
}

fn to_json(value: &Value, path: &str) -> LaneResult<serde_json::Value> {
    reject_non_finite(value, path)?;
    serde_json::to_value(value).map_err(|e| manifest_error(path, e.to_string()))
}

/// JSON has no NaN or infinity; serde_json would silently turn them into null.
fn reject_non_finite(value: &Value, path: &str) -> LaneResult<()> {
    match value {
        Value::Number(n) if n.is_nan() || n.is_infinite() => Err(manifest_error(
            path,
            format!("non-finite number {} is not a valid argument", n),
        )),
        Value::Sequence(items) => items
            .iter()
            .enumerate()
            .try_for_each(|(i, item)| reject_non_finite(item, &format!("{}[{}]", path, i))),
        Value::Mapping(mapping) => mapping.iter().try_for_each(|(key, item)| {
            let key = key.as_str().unwrap_or("?");
            reject_non_finite(item, &format!("{}.{}", path, key))
        }),
        Value::Tagged(tagged) => reject_non_finite(&tagged.value, path),
        _ => Ok(()),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a sequence",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ContextCache;
    use crate::task::{Task, TaskDefinition};
    use async_trait::async_trait;
    use serde_json::json;

    macro_rules! noop_task {
        ($ty:ident, $name:literal) => {
            struct $ty;

            #[async_trait]
            impl Task for $ty {
                async fn run(self: Box<Self>, _cache: ContextCache) -> anyhow::Result<()> {
                    Ok(())
                }
            }

            impl TaskDefinition for $ty {
                const NAME: &'static str = $name;

                fn construct(_args: &TaskArgs) -> LaneResult<Self> {
                    Ok(Self)
                }
            }
        };
    }

    noop_task!(Extract, "Extract");
    noop_task!(AddIndex, "AddIndex");
    noop_task!(Save, "iris.tasks.Save");

    fn registry() -> TaskRegistry {
        let mut registry = TaskRegistry::new();
        registry.register::<Extract>().unwrap();
        registry.register::<AddIndex>().unwrap();
        registry.register::<Save>().unwrap();
        registry
    }

    fn load(text: &str) -> LaneResult<Lane> {
        ManifestLoader::new(&registry()).load_str(text)
    }

    fn error_path(result: LaneResult<Lane>) -> (String, String) {
        match result {
            Err(LaneError::Manifest { path, reason }) => (path, reason),
            other => panic!("expected manifest error, got {:?}", other.map(|l| l.name().to_string())),
        }
    }

    #[test]
    fn test_load_nested_manifest() {
        let lane = load(
            r#"
lane:
  name: iris
  tasks:
    - class: Extract
      kwargs: {path: "d.csv", header: true}
    - lane:
        name: features
        run_parallel: true
        tasks:
          - class: AddIndex
          - class: AddIndex
    - class: Save
      args: ["out", 2]
"#,
        )
        .unwrap();

        assert_eq!(lane.name(), "iris");
        assert!(!lane.run_parallel());
        assert_eq!(lane.task_count(), 4);

        let LaneNode::Task(extract) = &lane.nodes()[0] else {
            panic!("expected task");
        };
        assert_eq!(extract.args().kwargs["path"], json!("d.csv"));
        assert_eq!(extract.args().kwargs["header"], json!(true));

        let LaneNode::Lane(features) = &lane.nodes()[1] else {
            panic!("expected lane");
        };
        assert!(features.run_parallel());

        let LaneNode::Task(save) = &lane.nodes()[2] else {
            panic!("expected task");
        };
        assert_eq!(save.identifier(), "iris.tasks.Save");
        assert_eq!(save.args().args, vec![json!("out"), json!(2)]);
    }

    #[test]
    fn test_dotted_class_reference() {
        let lane = load("lane: {name: x, tasks: [{class: my.module.Extract}]}").unwrap();
        assert_eq!(lane.shape().children[0].name, "Extract.run");
    }

    #[test]
    fn test_unknown_class_reports_path() {
        let (path, reason) =
            error_path(load("lane: {name: x, tasks: [{class: Extract}, {class: Missing}]}"));
        assert_eq!(path, "lane.tasks[1].class");
        assert!(reason.contains("Missing"));
    }

    #[test]
    fn test_duplicate_lane_names() {
        let (path, reason) = error_path(load(
            r#"
lane:
  name: root
  tasks:
    - lane: {name: stage, tasks: []}
    - lane: {name: stage, tasks: []}
"#,
        ));
        assert_eq!(path, "lane.tasks[1].lane.name");
        assert!(reason.contains("stage"));
    }

    #[test]
    fn test_malformed_structure() {
        assert_eq!(error_path(load("- a\n- b")).0, "$");
        assert_eq!(error_path(load("lane: {tasks: []}")).0, "lane");
        assert_eq!(error_path(load("lane: {name: x}")).0, "lane");
        assert_eq!(error_path(load("lane: {name: x, tasks: 3}")).0, "lane.tasks");
        assert_eq!(
            error_path(load("lane: {name: x, run_parallel: yes please, tasks: []}")).0,
            "lane.run_parallel"
        );
        assert_eq!(
            error_path(load("lane: {name: x, tasks: [{class: Extract, args: {a: 1}}]}")).0,
            "lane.tasks[0].args"
        );
        assert_eq!(
            error_path(load("lane: {name: x, tasks: [{class: Extract, kwargs: [1]}]}")).0,
            "lane.tasks[0].kwargs"
        );
        assert_eq!(
            error_path(load("lane: {name: x, tasks: [{class: Extract, retries: 3}]}")).0,
            "lane.tasks[0]"
        );
        assert_eq!(
            error_path(load("lane: {name: x, tasks: [{args: [1]}]}")).0,
            "lane.tasks[0]"
        );
        assert_eq!(error_path(load("lane: {name: x, tasks: [}")).0, "$");
    }

    #[test]
    fn test_non_finite_arguments_rejected() {
        let (at, reason) =
            error_path(load("lane: {name: x, tasks: [{class: Extract, args: [1.5, .nan]}]}"));
        assert_eq!(at, "lane.tasks[0].args[1]");
        assert!(reason.contains("non-finite"));

        assert_eq!(
            error_path(load(
                "lane: {name: x, tasks: [{class: Extract, kwargs: {limits: {hi: .inf}}}]}"
            ))
            .0,
            "lane.tasks[0].kwargs.limits.hi"
        );
        assert!(load("lane: {name: x, tasks: [{class: Extract, args: [-2.5e3]}]}").is_ok());
    }

    #[test]
    fn test_load_path_prefixes_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("bad.yaml");
        std::fs::write(&path, "lane: {name: x, tasks: [{class: Nope}]}").unwrap();

        let registry = registry();
        let (at, reason) = error_path(ManifestLoader::new(&registry).load_path(&path));
        assert_eq!(at, "lane.tasks[0].class");
        assert!(reason.contains("bad.yaml"));
    }
}
