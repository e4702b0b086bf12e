//! Environment variable configuration
//!
//! Provides environment variable overrides for configuration.

use std::env;

/// Environment variable prefix
const ENV_PREFIX: &str = "SYSTEST";

/// Environment configuration from environment variables
#[derive(Clone, Debug, Default)]
pub struct EnvConfig {
    /// Run name from SYSTEST_NAME
    pub name: Option<String>,
    /// Comma separated test names from SYSTEST_FILTER
    pub filter: Option<Vec<String>>,
    /// Comma separated test names from SYSTEST_SKIP
    pub skip: Option<Vec<String>>,
    /// Dry run from SYSTEST_DRY_RUN
    pub dry_run: Option<bool>,
    /// Serial execution from SYSTEST_FORCE_SERIAL
    pub force_serial: Option<bool>,
    /// Log level from SYSTEST_LOG_LEVEL
    pub log_level: Option<String>,
    /// Output format from SYSTEST_FORMAT
    pub format: Option<String>,
    /// Config file from SYSTEST_CONFIG
    pub config_file: Option<String>,
}

impl EnvConfig {
    /// Load configuration from environment variables
    pub fn load() -> Self {
        Self {
            name: get_env("NAME"),
            filter: get_env_list("FILTER"),
            skip: get_env_list("SKIP"),
            dry_run: get_env_bool("DRY_RUN"),
            force_serial: get_env_bool("FORCE_SERIAL"),
            log_level: get_env("LOG_LEVEL"),
            format: get_env("FORMAT"),
            config_file: get_env("CONFIG"),
        }
    }

    /// Check if any environment variables are set
    pub fn has_any(&self) -> bool {
        self.name.is_some()
            || self.filter.is_some()
            || self.skip.is_some()
            || self.dry_run.is_some()
            || self.force_serial.is_some()
            || self.log_level.is_some()
            || self.format.is_some()
            || self.config_file.is_some()
    }
}

/// Get environment variable with prefix
fn get_env(name: &str) -> Option<String> {
    env::var(format!("{ENV_PREFIX}_{name}")).ok()
}

/// Get environment variable as a comma separated list
fn get_env_list(name: &str) -> Option<Vec<String>> {
    get_env(name).map(|v| {
        v.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    })
}

/// Get environment variable as boolean
fn get_env_bool(name: &str) -> Option<bool> {
    get_env(name).map(|v| {
        matches!(
            v.to_lowercase().as_str(),
            "1" | "true" | "yes" | "on" | "enabled"
        )
    })
}

/// Builder for setting environment variables (useful for testing)
pub struct EnvBuilder {
    vars: Vec<(String, String)>,
}

impl EnvBuilder {
    /// Create a new environment builder
    pub fn new() -> Self {
        Self { vars: Vec::new() }
    }

    fn var(mut self, name: &str, value: impl Into<String>) -> Self {
        self.vars.push((format!("{ENV_PREFIX}_{name}"), value.into()));
        self
    }

    pub fn name(self, name: impl Into<String>) -> Self {
        self.var("NAME", name)
    }

    pub fn filter(self, names: &[&str]) -> Self {
        self.var("FILTER", names.join(","))
    }

    pub fn skip(self, names: &[&str]) -> Self {
        self.var("SKIP", names.join(","))
    }

    pub fn dry_run(self, dry_run: bool) -> Self {
        self.var("DRY_RUN", dry_run.to_string())
    }

    pub fn force_serial(self, force_serial: bool) -> Self {
        self.var("FORCE_SERIAL", force_serial.to_string())
    }

    pub fn log_level(self, level: impl Into<String>) -> Self {
        self.var("LOG_LEVEL", level)
    }

    /// Apply environment variables
    pub fn apply(self) {
        for (key, value) in self.vars {
            env::set_var(key, value);
        }
    }

    /// Apply and return guard that restores on drop
    pub fn apply_scoped(self) -> EnvGuard {
        let previous: Vec<_> = self
            .vars
            .iter()
            .map(|(k, _)| (k.clone(), env::var(k).ok()))
            .collect();

        self.apply();

        EnvGuard { previous }
    }
}

impl Default for EnvBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Guard that restores environment variables on drop
pub struct EnvGuard {
    previous: Vec<(String, Option<String>)>,
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, value) in &self.previous {
            match value {
                Some(v) => env::set_var(key, v),
                None => env::remove_var(key),
            }
        }
    }
}

/// Print all SYSTEST environment variables
pub fn print_env_help() {
    println!("Environment Variables:");
    println!();
    println!("  {ENV_PREFIX}_NAME          Run name shown in reports");
    println!("  {ENV_PREFIX}_FILTER        Comma separated test cases to run");
    println!("  {ENV_PREFIX}_SKIP          Comma separated test cases to skip");
    println!("  {ENV_PREFIX}_DRY_RUN       Record estimates instead of running (true/false)");
    println!("  {ENV_PREFIX}_FORCE_SERIAL  Run parallel groups serially (true/false)");
    println!("  {ENV_PREFIX}_LOG_LEVEL     Console log level (trace, debug, info, warn, error)");
    println!("  {ENV_PREFIX}_FORMAT        Output format (text, summary, json, json-pretty)");
    println!("  {ENV_PREFIX}_CONFIG        Path to configuration file");
    println!();
    println!("Example:");
    println!("  export {ENV_PREFIX}_SKIP=slow_upload,flaky_login");
    println!("  {}", EXAMPLE_COMMAND.join(" "));
}

/// Command line shown by `print_env_help`
pub(crate) const EXAMPLE_COMMAND: &[&str] = &["systest", "run", "--format", "summary"];
