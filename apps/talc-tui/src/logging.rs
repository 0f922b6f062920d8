//! Tracing/logging bootstrap for the terminal app.
//!
//! The terminal owns stdout, so events go to a log file in the data dir.

use std::{
    env,
    fs::{self, OpenOptions},
    path::{Path, PathBuf},
    sync::Mutex,
};

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,talc_tui=debug,sync_core=debug,media_cache=debug";
const LOG_FILE_NAME: &str = "talc-tui.log";

/// Initialize the global tracing subscriber writing to `<data_dir>/talc-tui.log`.
///
/// Precedence:
/// 1) `RUST_LOG`
/// 2) `TALC_TUI_LOG`
/// 3) `TALC_LOG`
/// 4) internal default filter
///
/// Returns the log file path, or `None` when the file could not be opened;
/// the app then runs without logging.
pub fn init(data_dir: &Path) -> Option<PathBuf> {
    fs::create_dir_all(data_dir).ok()?;
    let path = data_dir.join(LOG_FILE_NAME);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .ok()?;

    let env_filter = filter_from_lookup(|key| env::var(key).ok());
    tracing_subscriber::fmt()
        .with_target(true)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .with_env_filter(env_filter)
        .try_init()
        .ok()?;
    Some(path)
}

fn filter_from_lookup<F>(mut lookup: F) -> EnvFilter
where
    F: FnMut(&str) -> Option<String>,
{
    for key in ["RUST_LOG", "TALC_TUI_LOG", "TALC_LOG"] {
        if let Some(value) = lookup(key).filter(|v| !v.trim().is_empty())
            && let Ok(filter) = EnvFilter::try_new(value)
        {
            return filter;
        }
    }

    EnvFilter::new(DEFAULT_FILTER)
}
