//! Task registry: maps stable identifiers to task constructors.
//!
//! Manifests reference tasks by identifier (`class: Extract` or a dotted
//! `pkg.tasks.Extract`). Identifiers are registered explicitly, either by
//! calling [`TaskRegistry::register`] or statically with
//! [`register_task!`](crate::register_task), which submits a
//! [`TaskDescriptor`] collected at startup by [`TaskRegistry::from_inventory`].

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use lanekit_shared::errors::{LaneError, LaneResult};
use regex::Regex;

use crate::task::{BoxedTask, TaskArgs, TaskConstructor, TaskDefinition, TaskSpec, construct_boxed};

static IDENTIFIER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*$")
        .expect("valid identifier regex")
});

static ENTRY_POINT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$")
        .expect("valid entry point regex")
});

/// Statically registered task, collected through `inventory`.
pub struct TaskDescriptor {
    pub identifier: &'static str,
    pub entry_point: &'static str,
    pub construct: fn(&TaskArgs) -> LaneResult<BoxedTask>,
}

impl TaskDescriptor {
    pub const fn of<T: TaskDefinition>() -> Self {
        Self {
            identifier: T::NAME,
            entry_point: T::ENTRY_POINT,
            construct: construct_boxed::<T>,
        }
    }
}

inventory::collect!(TaskDescriptor);

/// Register a [`TaskDefinition`] type for [`TaskRegistry::from_inventory`].
///
/// ```ignore
/// lanekit::register_task!(Normalize);
/// ```
#[macro_export]
macro_rules! register_task {
    ($ty:ty) => {
        $crate::inventory::submit! {
            $crate::registry::TaskDescriptor::of::<$ty>()
        }
    };
}

/// Check that `identifier` is a dotted name and `entry_point` a single segment.
pub(crate) fn validate_task_names(identifier: &str, entry_point: &str) -> LaneResult<()> {
    if !IDENTIFIER_RE.is_match(identifier) {
        return Err(LaneError::Config(format!(
            "invalid task identifier '{}'",
            identifier
        )));
    }
    if !ENTRY_POINT_RE.is_match(entry_point) {
        return Err(LaneError::Config(format!(
            "invalid entry point '{}' for task '{}'",
            entry_point, identifier
        )));
    }
    Ok(())
}

/// Constructor and entry point resolved for an identifier.
#[derive(Clone)]
pub struct TaskBinding {
    identifier: String,
    entry_point: String,
    constructor: TaskConstructor,
}

impl TaskBinding {
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    /// Capture `args` into a spec. Nothing is constructed yet.
    pub fn spec(&self, args: TaskArgs) -> TaskSpec {
        TaskSpec::new(
            self.identifier.clone(),
            self.entry_point.clone(),
            args,
            Arc::clone(&self.constructor),
        )
    }
}

impl std::fmt::Debug for TaskBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskBinding")
            .field("identifier", &self.identifier)
            .field("entry_point", &self.entry_point)
            .finish()
    }
}

/// Identifier → constructor table.
#[derive(Clone, Default)]
pub struct TaskRegistry {
    tasks: HashMap<String, TaskBinding>,
}

impl std::fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("tasks", &self.identifiers())
            .finish()
    }
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the builtin utility tasks.
    pub fn with_builtins() -> LaneResult<Self> {
        let mut registry = Self::new();
        crate::builtin::register_all(&mut registry)?;
        Ok(registry)
    }

    /// Builtins plus every task submitted with `register_task!`.
    pub fn from_inventory() -> LaneResult<Self> {
        let mut registry = Self::with_builtins()?;
        for descriptor in inventory::iter::<TaskDescriptor> {
            registry.register_with(
                descriptor.identifier,
                descriptor.entry_point,
                descriptor.construct,
            )?;
        }
        tracing::debug!(tasks = registry.len(), "Collected statically registered tasks");
        Ok(registry)
    }

    /// Register a task type under its declared name and entry point.
    pub fn register<T: TaskDefinition>(&mut self) -> LaneResult<()> {
        self.register_with(T::NAME, T::ENTRY_POINT, construct_boxed::<T>)
    }

    /// Register an arbitrary constructor under `identifier`.
    ///
    /// # Errors
    ///
    /// `DuplicateIdentifier` if `identifier` is taken, `Config` if the
    /// identifier or entry point is not a valid name.
    pub fn register_with<F>(
        &mut self,
        identifier: impl Into<String>,
        entry_point: impl Into<String>,
        constructor: F,
    ) -> LaneResult<()>
    where
        F: Fn(&TaskArgs) -> LaneResult<BoxedTask> + Send + Sync + 'static,
    {
        let identifier = identifier.into();
        let entry_point = entry_point.into();

        validate_task_names(&identifier, &entry_point)?;
        if self.tasks.contains_key(&identifier) {
            return Err(LaneError::DuplicateIdentifier(identifier));
        }

        tracing::trace!(task = %identifier, entry_point = %entry_point, "Registering task");
        self.tasks.insert(
            identifier.clone(),
            TaskBinding {
                identifier,
                entry_point,
                constructor: Arc::new(constructor),
            },
        );
        Ok(())
    }

    /// Resolve `reference` to its binding.
    ///
    /// An exact identifier match wins. Otherwise a dotted reference resolves
    /// by its last segment when exactly one identifier ends with it.
    pub fn resolve(&self, reference: &str) -> LaneResult<&TaskBinding> {
        if let Some(binding) = self.tasks.get(reference) {
            return Ok(binding);
        }

        let Some((_, short)) = reference.rsplit_once('.') else {
            return Err(LaneError::UnknownTask(reference.to_string()));
        };

        let mut candidates = self
            .tasks
            .values()
            .filter(|b| b.identifier.rsplit('.').next() == Some(short));
        match (candidates.next(), candidates.next()) {
            (Some(binding), None) => Ok(binding),
            _ => Err(LaneError::UnknownTask(reference.to_string())),
        }
    }

    pub fn contains(&self, reference: &str) -> bool {
        self.resolve(reference).is_ok()
    }

    /// Registered identifiers, sorted.
    pub fn identifiers(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.tasks.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Registered bindings, sorted by identifier.
    pub fn bindings(&self) -> Vec<&TaskBinding> {
        let mut bindings: Vec<&TaskBinding> = self.tasks.values().collect();
        bindings.sort_unstable_by(|a, b| a.identifier.cmp(&b.identifier));
        bindings
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
