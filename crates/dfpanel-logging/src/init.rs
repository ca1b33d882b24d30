use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_error::ErrorLayer;
use tracing_log::LogTracer;
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Layer};

use crate::config::LoggingConfig;
use crate::targets::{T_DISPLAY, T_SERIAL, T_TOUCH};

/// Hardware targets that get a file of their own.
const SUBSYSTEM_LOGS: [(&str, &str); 3] = [
    (T_TOUCH, "touch.log"),
    (T_SERIAL, "serial.log"),
    (T_DISPLAY, "display.log"),
];

/// Keeps the non-blocking file writers flushing. Hold for the life of `main`.
pub struct LoggingGuards {
    _file_guards: Vec<WorkerGuard>,
    log_dir: Option<PathBuf>,
}

impl LoggingGuards {
    /// Directory receiving log files, `None` when only stdout is active.
    pub fn log_dir(&self) -> Option<&Path> {
        self.log_dir.as_deref()
    }
}

/// Installs the global subscriber for `component`.
///
/// Logs go to stdout and, when `<root>/logs` can be created, to a daily
/// `<component>.log` plus one file per entry in [`SUBSYSTEM_LOGS`]. Subsystem
/// events are kept out of the component log.
pub fn init(component: &str, root: &Path, cfg: &LoggingConfig) -> Result<LoggingGuards> {
    let base = tracing_subscriber::registry()
        .with(build_filter(cfg))
        .with(ErrorLayer::default())
        .with(
            fmt::layer()
                .with_target(true)
                .with_line_number(true)
                .compact(),
        );

    let log_dir = root.join("logs");
    if let Err(err) = std::fs::create_dir_all(&log_dir) {
        base.try_init().ok();
        let _ = LogTracer::init();
        tracing::warn!("File logging disabled ({}): {}", log_dir.display(), err);
        return Ok(LoggingGuards {
            _file_guards: Vec::new(),
            log_dir: None,
        });
    }

    let mut guards = Vec::with_capacity(SUBSYSTEM_LOGS.len() + 1);
    let mut files = Vec::with_capacity(SUBSYSTEM_LOGS.len() + 1);

    let (component_layer, guard) = file_layer(&log_dir, &component_log_name(component));
    files.push(component_layer.with_filter(component_targets()).boxed());
    guards.push(guard);

    for (target, filename) in SUBSYSTEM_LOGS {
        let (layer, guard) = file_layer(&log_dir, filename);
        let only_target = Targets::new().with_target(target, LevelFilter::TRACE);
        files.push(layer.with_filter(only_target).boxed());
        guards.push(guard);
    }

    base.with(files).try_init().ok();
    let _ = LogTracer::init();

    Ok(LoggingGuards {
        _file_guards: guards,
        log_dir: Some(log_dir),
    })
}

fn build_filter(cfg: &LoggingConfig) -> EnvFilter {
    if !cfg.enabled {
        return EnvFilter::new("off");
    }
    EnvFilter::try_new(&cfg.level).unwrap_or_else(|_| EnvFilter::new("info"))
}

fn component_log_name(component: &str) -> String {
    format!("{component}.log")
}

fn component_targets() -> Targets {
    SUBSYSTEM_LOGS.iter().fold(
        Targets::new().with_default(LevelFilter::TRACE),
        |targets, (target, _)| targets.with_target(*target, LevelFilter::OFF),
    )
}

fn file_layer<S>(log_dir: &Path, filename: &str) -> (impl Layer<S> + Send + Sync, WorkerGuard)
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    let appender = tracing_appender::rolling::daily(log_dir, filename);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let layer = fmt::layer()
        .with_target(true)
        .with_line_number(true)
        .with_ansi(false)
        .compact()
        .with_writer(writer);
    (layer, guard)
}
