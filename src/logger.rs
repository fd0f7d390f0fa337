//! File-based logging using simplelog
//!
//! The TUI owns the terminal, so logs go to `<cache dir>/shinsa/shinsa.log`.
//! Level comes from `SHINSA_LOG`, then `RUST_LOG`, defaulting to `info`.

use simplelog::{ConfigBuilder, LevelFilter, WriteLogger};
use std::fs::{self, OpenOptions};
use std::path::PathBuf;

fn log_file_path() -> Option<PathBuf> {
    dirs::cache_dir().map(|dir| dir.join("shinsa").join("shinsa.log"))
}

fn parse_level(value: &str) -> Option<LevelFilter> {
    match value.trim().to_lowercase().as_str() {
        "off" => Some(LevelFilter::Off),
        "error" => Some(LevelFilter::Error),
        "warn" => Some(LevelFilter::Warn),
        "info" => Some(LevelFilter::Info),
        "debug" => Some(LevelFilter::Debug),
        "trace" => Some(LevelFilter::Trace),
        _ => None,
    }
}

fn level_from_env() -> LevelFilter {
    ["SHINSA_LOG", "RUST_LOG"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find_map(|v| parse_level(&v))
        .unwrap_or(LevelFilter::Info)
}

/// Initialize file-based logging.
///
/// Returns the log file path, or `None` when logging could not be set up, in
/// which case log macros are no-ops.
pub fn init() -> Option<PathBuf> {
    let path = log_file_path()?;
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).ok()?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .ok()?;

    let config = ConfigBuilder::new()
        .set_time_format_rfc3339()
        .set_time_offset_to_local()
        .unwrap_or_else(|c| c) // Fallback if local time offset fails
        .build();

    WriteLogger::init(level_from_env(), config, file).ok()?;
    Some(path)
}
