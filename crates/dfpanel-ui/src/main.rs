#![deny(unsafe_op_in_unsafe_fn)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use dfpanel_ui::{
    app::App,
    catalog::Catalog,
    compositor::FramebufferSink,
    config::{resolve_root, PanelConfig},
    protocol::open_serial,
    touch::device::open_touch,
};

#[derive(Parser, Debug)]
#[command(name = "dfpanel", about = "Touchscreen control panel for a serial audio module")]
struct Cli {
    /// State directory holding gui_conf.json, calibration and logs.
    #[arg(long)]
    root: Option<PathBuf>,

    /// Start with touch calibration right after the first paint.
    #[arg(long)]
    calibrate: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let root = resolve_root(cli.root)?;
    let log_cfg = dfpanel_logging::fs::read_config(&root);
    let logging_guards = dfpanel_logging::init("dfpanel", &root, &log_cfg)?;
    match logging_guards.log_dir() {
        Some(dir) => tracing::info!(dir = %dir.display(), "file logging enabled"),
        None => tracing::info!("logging to stdout only"),
    }
    match dfpanel_logging::run_retention(&root, &log_cfg) {
        Ok(report) => tracing::debug!(
            expired = report.expired,
            trimmed = report.trimmed,
            remaining_bytes = report.remaining_bytes,
            "log retention done"
        ),
        Err(err) => tracing::warn!("Log retention skipped: {err:#}"),
    }

    let span = tracing::info_span!("dfpanel", component = "dfpanel");
    let _span_guard = span.enter();

    let config = PanelConfig::load(&root)?;
    let touch = open_touch(config.devices.touch.as_deref()).context("opening touch input")?;
    let display = FramebufferSink::open(&config.devices.framebuffer)?;
    let link = open_serial(&config.devices.serial, config.devices.baud)?;
    let catalog = Catalog::load_optional(config.catalog_path(&root).as_deref());

    let mut app = App::new(&root, config, touch, link, display, catalog);
    app.start(cli.calibrate)?;
    app.run()
}
