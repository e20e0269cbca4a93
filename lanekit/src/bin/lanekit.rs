//! lanekit launcher: load a lane manifest and run it.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lanekit::{
    ContextCache, ENGINE_CONF_KEY, LaneExecutor, LaunchConfig, ManifestLoader, TaskRegistry,
    init_logging,
};

#[derive(Parser)]
#[command(name = "lanekit", version, about = "Run declarative task lanes")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log filter (error, warn, info, debug, trace); RUST_LOG takes precedence
    #[arg(long, global = true, env = "LANEKIT_LOG")]
    log_level: Option<String>,

    /// Write logs to a daily-rolling file in this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// TOML launch config with [executor], [logging] and [engine] tables
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Engine configuration passed through to tasks (repeatable)
    #[arg(long = "conf", global = true, value_name = "KEY=VALUE")]
    conf: Vec<String>,

    /// Maximum number of task bodies running at once
    #[arg(long, global = true, env = "LANEKIT_MAX_PARALLEL")]
    max_parallel: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a lane manifest
    Run {
        /// Path to the lane YAML manifest
        manifest: PathBuf,
        /// Write the execution record as JSON
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Load a manifest and print its lane tree without running it
    Validate {
        /// Path to the lane YAML manifest
        manifest: PathBuf,
    },
    /// List registered tasks
    Tasks,
}

impl Cli {
    fn launch_config(&self) -> Result<LaunchConfig> {
        let mut config = match &self.config {
            Some(path) => LaunchConfig::load(path)?,
            None => LaunchConfig::default(),
        };
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if let Some(dir) = &self.log_dir {
            config.logging.log_dir = Some(dir.clone());
        }
        if let Some(max) = self.max_parallel {
            config.executor.max_parallel_tasks = Some(max);
        }
        config.apply_conf(self.conf.iter().map(String::as_str))?;
        config.executor.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.launch_config()?;
    let _log_guard = init_logging(&config.logging)?;

    let registry = TaskRegistry::from_inventory()?;

    match &cli.command {
        Commands::Run { manifest, report } => {
            run(&registry, &config, manifest, report.as_deref()).await
        }
        Commands::Validate { manifest } => validate(&registry, manifest),
        Commands::Tasks => {
            for binding in registry.bindings() {
                println!("{}  ({})", binding.identifier(), binding.entry_point());
            }
            Ok(())
        }
    }
}

async fn run(
    registry: &TaskRegistry,
    config: &LaunchConfig,
    manifest: &Path,
    report: Option<&Path>,
) -> Result<()> {
    let lane = ManifestLoader::new(registry).load_path(manifest)?;

    let cache = ContextCache::new();
    cache.put(ENGINE_CONF_KEY, config.engine.clone());

    let executor = LaneExecutor::new(config.executor.clone())?;
    let run = executor.execute_with_cache(&lane, cache).await;

    tracing::info!(
        run_id = %run.run_id(),
        lane = %lane.name(),
        outcome = %run.status(),
        "Run finished"
    );
    print!("{}", run.record().summary());

    if let Some(path) = report {
        let json = serde_json::to_string_pretty(run.record())?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write report: {}", path.display()))?;
    }

    if let Some(err) = run.error() {
        eprintln!("Failed at: {}", err.breadcrumb().join(" > "));
        anyhow::bail!("lane '{}' failed: {}", lane.name(), err);
    }

    println!("Lane '{}' completed successfully.", lane.name());
    Ok(())
}

fn validate(registry: &TaskRegistry, manifest: &Path) -> Result<()> {
    let lane = ManifestLoader::new(registry).load_path(manifest)?;
    print!("{}", lane.render_tree());
    println!("{} task(s), manifest is valid.", lane.task_count());
    Ok(())
}
