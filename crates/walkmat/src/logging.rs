//! stderr logging for the CLI.
//!
//! `--log-level` applies to the walkmat crates only; other crates stay at
//! warn. `WALKMAT_LOG` replaces the whole filter with `EnvFilter`
//! directives, e.g. `walkmat_session::port_reader=trace,walkmat_frame=debug`.

use clap::ValueEnum;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub const LOG_ENV: &str = "WALKMAT_LOG";

const WALKMAT_TARGETS: [&str; 5] = [
    "walkmat",
    "walkmat_transport",
    "walkmat_frame",
    "walkmat_matrix",
    "walkmat_session",
];

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn directive(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

fn level_directives(level: LogLevel) -> String {
    let mut directives = vec!["warn".to_string()];
    directives.extend(
        WALKMAT_TARGETS
            .iter()
            .map(|target| format!("{target}={}", level.directive())),
    );
    directives.join(",")
}

fn build_filter(level: LogLevel, env_override: Option<&str>) -> EnvFilter {
    if let Some(directives) = env_override.filter(|d| !d.trim().is_empty()) {
        match EnvFilter::try_new(directives) {
            Ok(filter) => return filter,
            Err(err) => eprintln!("ignoring {LOG_ENV}={directives}: {err}"),
        }
    }
    EnvFilter::new(level_directives(level))
}

/// Install the stderr subscriber. Reader and merger threads are named, so
/// records carry the thread name.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let env_override = std::env::var(LOG_ENV).ok();
    let filter = build_filter(level, env_override.as_deref());

    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false)
        .with_thread_names(true);
    let layer = match format {
        LogFormat::Text => layer.boxed(),
        LogFormat::Json => layer.json().boxed(),
    };

    let _ = tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .try_init();
}
