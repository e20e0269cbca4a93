//! Structured logging setup with tracing-subscriber.

use lanekit_shared::errors::{LaneError, LaneResult};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::options::LoggingOptions;

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `options.level`. With `log_dir` set, events go to a
/// daily-rolling `lanekit.log` there; keep the returned guard alive until
/// exit so buffered lines are flushed. A second call leaves the installed
/// subscriber in place and returns `Ok(None)`.
pub fn init_logging(options: &LoggingOptions) -> LaneResult<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&options.level))
        .map_err(|e| LaneError::Config(format!("invalid log filter '{}': {}", options.level, e)))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false);

    match &options.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, "lanekit.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let installed = builder
                .with_ansi(false)
                .with_writer(writer)
                .try_init()
                .is_ok();
            Ok(installed.then_some(guard))
        }
        None => {
            let _ = builder
                .with_ansi(options.ansi)
                .with_writer(std::io::stderr)
                .try_init();
            Ok(None)
        }
    }
}
