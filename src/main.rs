//! meterlog - Main Entry Point
//!
//! Logs readings of a bench multimeter with a live trend view. Every run is
//! appended to a crash-safe buffer on disk and turned into a report when it
//! stops.
//!
//! Settings can be overridden on the command line as `key=value` pairs, for
//! example `meterlog interval_ms=100 max_points=500`.

use anyhow::Context;
use meterlog::{
    config::{log_dir, AppConfig},
    device::open_device,
    frontend::MeterApp,
    session::Session,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_logging() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,meterlog=debug"));
    let stderr = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    // File logging is best effort
    let dir = log_dir().filter(|dir| std::fs::create_dir_all(dir).is_ok());
    match dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "meterlog.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(writer),
                )
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry().with(filter).with(stderr).init();
            None
        }
    }
}

fn main() -> anyhow::Result<()> {
    let _log_guard = init_logging();
    tracing::info!("Starting meterlog {}", env!("CARGO_PKG_VERSION"));

    let mut config = AppConfig::load_or_default();
    let args: Vec<String> = std::env::args().skip(1).collect();
    let pairs = args.iter().filter_map(|arg| arg.split_once('='));
    config
        .apply_pairs(pairs)
        .context("invalid command line setting")?;
    config.validate().context("invalid configuration")?;

    let device = open_device(&config.device.resource);
    let session = Session::new(config, device).context("failed to create session")?;

    let orphaned = session.orphaned_buffers();
    if !orphaned.is_empty() {
        tracing::warn!(
            "{} buffers from an interrupted session in {:?}",
            orphaned.len(),
            session.config().output.directory
        );
    }

    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1100.0, 700.0])
            .with_min_inner_size([800.0, 500.0])
            .with_title("meterlog"),
        ..Default::default()
    };

    eframe::run_native(
        "meterlog",
        native_options,
        Box::new(|cc| Ok(Box::new(MeterApp::new(cc, session)))),
    )
    .map_err(|e| anyhow::anyhow!("UI failed: {}", e))?;

    tracing::info!("Shutting down");
    Ok(())
}
