/// Canonical file paths for LootHerald data files.
///
/// Both files live in the platform config directory under `LootHerald/`
/// (`~/.config/LootHerald` on Linux, `%APPDATA%\LootHerald` on Windows):
///   - settings.toml  Edited by the user or a front end, read by the daemon.
///   - status.toml    Written by the daemon, read by front ends.
use std::path::PathBuf;

const APP_DIR_NAME: &str = "LootHerald";
pub const SETTINGS_FILE_NAME: &str = "settings.toml";
pub const STATUS_FILE_NAME: &str = "status.toml";

/// Returns the LootHerald data directory. Falls back to the working directory
/// when the platform has no config directory.
pub fn app_data_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

pub fn settings_file_path() -> PathBuf {
    app_data_dir().join(SETTINGS_FILE_NAME)
}

pub fn status_file_path() -> PathBuf {
    app_data_dir().join(STATUS_FILE_NAME)
}
