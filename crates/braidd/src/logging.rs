//! Logging initialization
//!
//! Builds a tracing subscriber from the node's logging configuration: one
//! console sink (colors optional) and one optional file sink, each with its
//! own level filter. `RUST_LOG` overrides the console level when set.

use crate::config::{LogType, LoggingConfiguration};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

fn level_filter(log_type: LogType) -> LevelFilter {
    match log_type {
        LogType::None => LevelFilter::OFF,
        LogType::Debug => LevelFilter::DEBUG,
        LogType::Info => LevelFilter::INFO,
        LogType::Warning => LevelFilter::WARN,
        LogType::Error => LevelFilter::ERROR,
    }
}

/// Install the global subscriber.
///
/// The returned guard must stay alive for the lifetime of the process so the
/// file sink keeps flushing.
pub fn init(config: &LoggingConfiguration) -> anyhow::Result<Option<WorkerGuard>> {
    let console_filter = EnvFilter::builder()
        .with_default_directive(level_filter(config.console_log_type).into())
        .from_env_lossy();
    let console_layer = tracing_subscriber::fmt::layer()
        .with_ansi(!config.colorless_console_log)
        .with_filter(console_filter);

    let (file_layer, guard) = if config.file_log_type != LogType::None {
        let file = std::fs::File::options()
            .create(true)
            .append(true)
            .open(&config.filename)?;
        let (writer, guard) = tracing_appender::non_blocking(file);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_filter(level_filter(config.file_log_type));
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(guard)
}
