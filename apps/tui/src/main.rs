//! Interior TUI: furniture selection and product-data scraping screens,
//! built with `ratatui` + `crossterm`.
//!
//! Logs go to `<data_dir>/interior-tui.log` so they do not draw over the UI.

mod app;
mod screens;
mod services;
mod widgets;

use std::fs::{self, OpenOptions};
use std::sync::Mutex;

use color_eyre::eyre::Result;
use tracing_subscriber::EnvFilter;

use interior_shared::{AppConfig, data_dir, load_config};

const LOG_FILE_NAME: &str = "interior-tui.log";
const DEFAULT_FILTER: &str = "interior_tui=info,interior_core=info,interior_crawler=info,\
interior_discovery=info,interior_storage=info,interior_shared=info";

fn main() -> Result<()> {
    color_eyre::install()?;
    let config = load_config()?;
    init_tracing(&config)?;
    app::run(config)
}

fn init_tracing(config: &AppConfig) -> Result<()> {
    let dir = data_dir(config)?;
    fs::create_dir_all(&dir)?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join(LOG_FILE_NAME))?;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}
