//! Configuration module
//!
//! Handles loading run configuration from files and the environment.

mod env;
mod file;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::executor::RunOptions;
use crate::output::OutputFormat;
use crate::utils::LogLevel;

pub use env::{print_env_help, EnvBuilder, EnvConfig, EnvGuard};
pub(crate) use env::EXAMPLE_COMMAND;
pub use file::{expand_path, find_config, is_yaml_file, CONFIG_LOCATIONS};

/// Application configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Name of the run, shown in report headers
    pub name: String,

    /// Only these test cases run when non-empty
    pub filter: Vec<String>,

    /// Test cases that never run
    pub skip: Vec<String>,

    /// Record estimates instead of running
    pub dry_run: bool,

    /// Run parallel groups one child at a time
    pub force_serial: bool,

    /// Console log level
    pub log_level: String,

    /// Log file prefix; the date is appended
    pub log_file: Option<String>,

    /// Console output format
    pub format: String,

    /// JSON report path
    pub json_report: Option<PathBuf>,

    /// Graphviz DOT graph path
    pub dot_graph: Option<PathBuf>,

    /// CSV export path
    pub csv_report: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "systest".to_string(),
            filter: Vec::new(),
            skip: Vec::new(),
            dry_run: false,
            force_serial: false,
            log_level: "info".to_string(),
            log_file: None,
            format: "text".to_string(),
            json_report: None,
            dot_graph: None,
            csv_report: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = if is_yaml_file(path) {
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display()))?
        } else {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display()))?
        };

        config.validate()?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load configuration from the first standard location, or defaults
    pub fn load_default() -> Result<Self> {
        match find_config() {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = if is_yaml_file(path) {
            serde_yaml::to_string(self).context("Failed to serialize config")?
        } else {
            serde_json::to_string_pretty(self).context("Failed to serialize config")?
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            bail!("Run name must not be empty");
        }
        if LogLevel::from_str(&self.log_level).is_none() {
            bail!("Unknown log level: {}", self.log_level);
        }
        if OutputFormat::from_str(&self.format).is_none() {
            bail!("Unknown output format: {}", self.format);
        }

        for name in &self.skip {
            if self.filter.contains(name) {
                warn!("Test case {} is both selected and skipped", name);
            }
        }

        Ok(())
    }

    /// Apply environment overrides (environment takes precedence)
    pub fn apply_env(&mut self, env: &EnvConfig) {
        if let Some(name) = &env.name {
            self.name = name.clone();
        }
        if let Some(filter) = &env.filter {
            self.filter = filter.clone();
        }
        if let Some(skip) = &env.skip {
            self.skip = skip.clone();
        }
        if let Some(dry_run) = env.dry_run {
            self.dry_run = dry_run;
        }
        if let Some(force_serial) = env.force_serial {
            self.force_serial = force_serial;
        }
        if let Some(level) = &env.log_level {
            self.log_level = level.clone();
        }
        if let Some(format) = &env.format {
            self.format = format.clone();
        }
    }

    pub fn log_level(&self) -> LogLevel {
        LogLevel::from_str(&self.log_level).unwrap_or(LogLevel::Info)
    }

    pub fn output_format(&self) -> OutputFormat {
        OutputFormat::from_str(&self.format).unwrap_or_default()
    }

    /// Options for the execution engine
    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            filter: self.filter.clone(),
            skip: self.skip.clone(),
            dry_run: self.dry_run,
            force_serial: self.force_serial,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.name, "systest");
        assert_eq!(config.log_level(), LogLevel::Info);
        assert_eq!(config.output_format(), OutputFormat::Text);
        assert_eq!(config.run_options(), RunOptions::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_load_yaml_and_json() {
        let dir = tempdir().unwrap();
        let config = AppConfig {
            name: "nightly".to_string(),
            skip: vec!["slow".to_string()],
            force_serial: true,
            json_report: Some(PathBuf::from("out/report.json")),
            ..Default::default()
        };

        for file in ["nested/config.yaml", "config.json"] {
            let path = dir.path().join(file);
            config.save(&path).unwrap();
            assert_eq!(AppConfig::load(&path).unwrap(), config);
        }
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yml");
        std::fs::write(&path, "name: smoke\ndry_run: true\n").unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.name, "smoke");
        assert!(config.dry_run);
        assert_eq!(config.log_level, "info");
        assert!(config.run_options().dry_run);
    }

    #[test]
    fn test_validate_config() {
        let bad_level = AppConfig {
            log_level: "loud".to_string(),
            ..Default::default()
        };
        assert!(bad_level.validate().is_err());

        let bad_format = AppConfig {
            format: "table".to_string(),
            ..Default::default()
        };
        assert!(bad_format.validate().is_err());

        let no_name = AppConfig {
            name: " ".to_string(),
            ..Default::default()
        };
        assert!(no_name.validate().is_err());
    }

    #[test]
    fn test_apply_env() {
        let mut config = AppConfig::default();
        config.apply_env(&EnvConfig {
            filter: Some(vec!["a".to_string(), "b".to_string()]),
            force_serial: Some(true),
            format: Some("json".to_string()),
            ..Default::default()
        });

        let options = config.run_options();
        assert_eq!(options.filter, vec!["a", "b"]);
        assert!(options.force_serial);
        assert!(!options.dry_run);
        assert_eq!(config.output_format(), OutputFormat::Json);
        assert_eq!(config.name, "systest");
    }
}
