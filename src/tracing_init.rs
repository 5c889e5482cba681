//! Tracing initialization.
//!
//! The daemon appends to `{data_dir}/sourcewatch.log`. One-shot commands log
//! to stderr so their output stays next to the command that produced it.

use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

use crate::storage::path_utils;

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Append-mode file logging. Falls back to stderr if the log file cannot
/// be opened.
pub fn init_file_tracing() {
    let log_path = path_utils::log_path();
    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent).ok();
    }

    let log_file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
    {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Cannot open {}: {}, logging to stderr", log_path.display(), e);
            init_stderr_tracing();
            return;
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(Mutex::new(log_file))
        .with_target(true)
        .with_ansi(false)
        .init();
}

pub fn init_stderr_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
