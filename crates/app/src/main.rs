use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context as _;
use directories::ProjectDirs;
use mangashelf_api::HttpApi;
use mangashelf_application::{Dispatcher, ViewController};
use mangashelf_core::{ClientConfig, DEFAULT_BACKEND_URL};
use mangashelf_ui::Ui;
use tracing::{info, warn};

fn main() {
    if let Err(err) = run() {
        eprintln!("{err:?}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    // A missing .env is the normal case.
    let _ = dotenvy::dotenv();

    let project_dirs =
        ProjectDirs::from("dev", "mangashelf", "mangashelf").context("resolve project dirs")?;
    let log_path = configure_logging(project_dirs.data_local_dir())?;
    // After logging so rejected values are reported.
    let config = load_config(|key| std::env::var(key).ok());
    info!(
        backend = %config.backend_url,
        user = %config.user_id,
        log = %log_path.display(),
        "starting mangashelf"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("create tokio runtime")?;
    let api = HttpApi::new(&config)
        .with_context(|| format!("create backend client for {}", config.backend_url))?;
    let dispatcher = Dispatcher::new(Arc::new(api), runtime.handle().clone());

    let mut ui = Ui::new(ViewController::new(config), dispatcher);
    let result = ui.run();

    runtime.shutdown_timeout(Duration::from_secs(1));
    info!("bye");
    result
}

/// Reads the client settings through `lookup` (the process environment in
/// production). Unparseable numbers keep their defaults.
fn load_config(lookup: impl Fn(&str) -> Option<String>) -> ClientConfig {
    let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
    let mut config = ClientConfig::default();

    config.backend_url = non_empty("MANGASHELF_BACKEND_URL")
        .or_else(|| non_empty("REACT_APP_BACKEND_URL"))
        .unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string());
    if let Some(user_id) = non_empty("MANGASHELF_USER_ID") {
        config.user_id = user_id;
    }
    if let Some(raw) = non_empty("MANGASHELF_SEARCH_LIMIT") {
        match raw.trim().parse() {
            Ok(limit) => config.search_limit = limit,
            Err(_) => warn!(value = %raw, "ignoring MANGASHELF_SEARCH_LIMIT"),
        }
    }
    if let Some(raw) = non_empty("MANGASHELF_TIMEOUT_SECS") {
        match raw.trim().parse() {
            Ok(secs) => config.request_timeout_secs = secs,
            Err(_) => warn!(value = %raw, "ignoring MANGASHELF_TIMEOUT_SECS"),
        }
    }

    config.normalize();
    config
}

/// The TUI owns stdout, so everything goes to a log file.
fn configure_logging(log_dir: &Path) -> anyhow::Result<PathBuf> {
    use tracing_subscriber::prelude::*;

    fs::create_dir_all(log_dir)
        .with_context(|| format!("create log dir {}", log_dir.display()))?;
    let log_path = log_dir.join("mangashelf.log");
    let file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("open log file {}", log_path.display()))?;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_target(false)
        .with_writer(Mutex::new(file));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .context("install tracing subscriber")?;
    Ok(log_path)
}
