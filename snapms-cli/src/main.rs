use std::fs;
use std::io;
use std::path::Path;

use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_log::LogTracer;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use snapms_cli::{SnapMS, SnapMSError};

#[cfg(feature = "mimalloc")]
use mimalloc::MiMalloc;

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn log_filter() -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(tracing::Level::INFO.into())
        .from_env_lossy()
}

/// Install the global subscriber, returning the guard that flushes the log file
fn configure_log(log_file: Option<&Path>) -> io::Result<Option<WorkerGuard>> {
    let (file_layer, guard) = match log_file {
        Some(path) => {
            let (writer, guard) = tracing_appender::non_blocking(fs::File::create(path)?);
            let layer = fmt::layer()
                .with_ansi(false)
                .with_timer(fmt::time::ChronoLocal::rfc_3339())
                .with_writer(writer)
                .with_filter(log_filter());
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let subscriber = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .compact()
                .with_timer(fmt::time::ChronoLocal::rfc_3339())
                .with_writer(io::stderr)
                .with_filter(log_filter()),
        )
        .with(file_layer);
    tracing::subscriber::set_global_default(subscriber).map_err(io::Error::other)?;
    LogTracer::init().map_err(io::Error::other)?;
    Ok(guard)
}

fn main() -> Result<(), SnapMSError> {
    let args = SnapMS::parse();
    let driver = args.configure()?;
    let _guard = configure_log(driver.log_file.as_deref())?;
    driver.main()
}
