//! Configuration file discovery
//!
//! Handles finding configuration files and picking their serialization
//! format.

use std::path::{Path, PathBuf};

/// Configuration file locations (in order of precedence)
pub const CONFIG_LOCATIONS: &[&str] = &[
    "./systest.yaml",
    "./systest.yml",
    "./.systest.yaml",
    "~/.config/systest/config.yaml",
];

/// Find a configuration file in the standard locations
pub fn find_config() -> Option<PathBuf> {
    CONFIG_LOCATIONS
        .iter()
        .map(|location| expand_path(location))
        .find(|path| path.exists())
}

/// Expand ~ to home directory
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

/// Check if file is YAML based on extension
pub fn is_yaml_file(path: &Path) -> bool {
    path.extension()
        .map(|e| e == "yaml" || e == "yml")
        .unwrap_or(false)
}
