//! Configuration and report paths
//!
//! Uses the directories crate for platform-appropriate locations:
//! - Linux: `~/.config/scenario-cli/`
//! - macOS: `~/Library/Application Support/scenario-cli/`
//! - Windows: `%APPDATA%\scenario-cli\`

use std::path::PathBuf;

/// Application name used for platform directories
const APP_NAME: &str = "scenario-cli";

/// Get the configuration directory path
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the configuration file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}

/// Directory where JSON reports land when no explicit path is given
pub fn report_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.data_dir().join("reports"))
}
