use std::path::Path;

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub const DEFAULT_FILTER: &str = "info,embed_worker=debug,embed_lifecycle=debug,hyper_util=error";

fn env_filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Install the global subscriber: `RUST_LOG`-driven filter, human output on stderr.
///
/// When `log_dir` is given, a daily rolling `embed-worker.log` is written there as well and the
/// returned guard must be kept alive for the file writer to flush. Calling this twice is harmless;
/// the second subscriber is simply not installed.
pub fn init_tracing(log_dir: Option<&Path>) -> std::io::Result<Option<WorkerGuard>> {
    let console = fmt::layer()
        .with_target(true)
        .with_level(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr);

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, "embed-worker.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_span_events(FmtSpan::CLOSE)
                .with_ansi(false)
                .with_writer(non_blocking);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let _ = tracing_subscriber::registry()
        .with(env_filter(DEFAULT_FILTER))
        .with(console)
        .with(file_layer)
        .try_init();

    Ok(guard)
}

/// Thread-scoped subscriber for tests; events go through the test writer so `cargo test`
/// captures them. Drop the guard to uninstall.
pub fn init_test_tracing(level: Level) -> tracing::subscriber::DefaultGuard {
    let filter = env_filter(&format!("{level},hyper_util=error"));
    let subscriber = tracing_subscriber::registry().with(filter).with(
        fmt::layer()
            .with_target(true)
            .without_time()
            .with_line_number(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_test_writer(),
    );
    tracing::subscriber::set_default(subscriber)
}
