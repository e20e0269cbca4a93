//! Configuration options for the executor, logging and the launcher.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use lanekit_shared::errors::{LaneError, LaneResult};
use serde::{Deserialize, Serialize};

/// Options controlling a lane run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExecutorOptions {
    /// Upper bound on task bodies executing at once across the whole run.
    /// `None` leaves parallel lanes unbounded.
    pub max_parallel_tasks: Option<usize>,
    /// Drop every artifact (firing uncache hooks) once the run finishes.
    pub clear_cache_on_finish: bool,
}

impl ExecutorOptions {
    pub fn validate(&self) -> LaneResult<()> {
        if self.max_parallel_tasks == Some(0) {
            return Err(LaneError::Config(
                "max_parallel_tasks must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingOptions {
    /// Fallback filter when `RUST_LOG` is unset.
    pub level: String,
    /// Write a daily-rolling log file here instead of stderr.
    pub log_dir: Option<PathBuf>,
    pub ansi: bool,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_dir: None,
            ansi: true,
        }
    }
}

/// Pass-through configuration for the external engine, published to tasks
/// under [`ENGINE_CONF_KEY`](crate::cache::ENGINE_CONF_KEY).
pub type EngineConf = BTreeMap<String, String>;

/// Parse a `key=value` pair.
pub fn parse_conf_pair(pair: &str) -> LaneResult<(String, String)> {
    match pair.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(LaneError::Config(format!(
            "expected key=value, got '{}'",
            pair
        ))),
    }
}

/// Launcher configuration file (TOML).
///
/// ```toml
/// [executor]
/// max_parallel_tasks = 4
///
/// [logging]
/// level = "debug"
///
/// [engine]
/// master = "local[2]"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LaunchConfig {
    pub executor: ExecutorOptions,
    pub logging: LoggingOptions,
    pub engine: EngineConf,
}

impl LaunchConfig {
    pub fn load(path: &Path) -> LaneResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content).map_err(|e| {
            LaneError::Config(format!("failed to parse {}: {}", path.display(), e))
        })?;
        config.executor.validate()?;
        tracing::debug!(path = %path.display(), "Loaded launch config");
        Ok(config)
    }

    /// Merge `key=value` overrides into the engine table.
    pub fn apply_conf<'a>(&mut self, pairs: impl IntoIterator<Item = &'a str>) -> LaneResult<()> {
        for pair in pairs {
            let (key, value) = parse_conf_pair(pair)?;
            self.engine.insert(key, value);
        }
        Ok(())
    }
}
