use std::path::PathBuf;

use crate::constants::{CONFIG_FILE, DATA_DIR_ENV, LOG_FILE, PID_FILE, STORE_FILE};

/// Data directory, cross-platform.
/// Linux: ~/.config/sourcewatch/
/// macOS: ~/Library/Application Support/sourcewatch/
/// Windows: %APPDATA%/sourcewatch/
///
/// `SOURCEWATCH_HOME` overrides the platform location.
pub fn data_dir() -> PathBuf {
    if let Ok(home) = std::env::var(DATA_DIR_ENV) {
        if !home.is_empty() {
            return PathBuf::from(expand_tilde(&home));
        }
    }
    let base = dirs::config_dir().unwrap_or_else(|| {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
    });
    base.join("sourcewatch")
}

/// {data_dir}/subscriptions.json
pub fn default_store_path() -> PathBuf {
    data_dir().join(STORE_FILE)
}

/// {data_dir}/config.json
pub fn config_path() -> PathBuf {
    data_dir().join(CONFIG_FILE)
}

/// {data_dir}/sourcewatch.log
pub fn log_path() -> PathBuf {
    data_dir().join(LOG_FILE)
}

/// {data_dir}/sourcewatch.pid
pub fn pid_path() -> PathBuf {
    data_dir().join(PID_FILE)
}

/// Expand ~ to home directory in paths.
pub fn expand_tilde(path: &str) -> String {
    if path.starts_with("~/") || path == "~" {
        if let Some(home) = dirs::home_dir() {
            return path.replacen('~', &home.to_string_lossy(), 1);
        }
    }
    path.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_tilde_leaves_absolute_paths() {
        assert_eq!(expand_tilde("/var/lib/sw"), "/var/lib/sw");
        assert_eq!(expand_tilde("relative/~x"), "relative/~x");
    }

    #[test]
    fn test_file_names_under_data_dir() {
        let dir = data_dir();
        assert_eq!(default_store_path(), dir.join("subscriptions.json"));
        assert_eq!(config_path(), dir.join("config.json"));
    }
}
