//! CLI argument parsing
//!
//! Defines command-line interface using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::AppConfig;

/// Serial and parallel test sequence runner
#[derive(Parser, Debug)]
#[command(name = "systest")]
#[command(version)]
#[command(about = "Run nested serial and parallel test sequences")]
#[command(long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the test sequence
    Run(RunArgs),

    /// List the test cases of the sequence
    List(ListArgs),

    /// Write a configuration file with default values
    Init(InitArgs),

    /// Show supported environment variables
    Env,
}

/// Arguments for run command
#[derive(Parser, Debug, Default)]
pub struct RunArgs {
    /// Configuration file (YAML or JSON)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Only run this test case (repeatable)
    #[arg(short, long = "name")]
    pub names: Vec<String>,

    /// Never run this test case (repeatable)
    #[arg(long)]
    pub skip: Vec<String>,

    /// Record estimated durations instead of running
    #[arg(long)]
    pub dry_run: bool,

    /// Run parallel groups one test case at a time
    #[arg(long)]
    pub force_serial: bool,

    /// Output format (text, summary, json, json-pretty)
    #[arg(short, long)]
    pub format: Option<String>,

    /// Write a JSON report to this file
    #[arg(long)]
    pub json_report: Option<PathBuf>,

    /// Write a Graphviz DOT graph to this file
    #[arg(long)]
    pub dot: Option<PathBuf>,

    /// Write per-test results as CSV to this file
    #[arg(long)]
    pub csv: Option<PathBuf>,

    /// Log file prefix; the date is appended
    #[arg(long)]
    pub log_file: Option<String>,
}

impl RunArgs {
    /// Apply command line overrides (command line takes precedence)
    pub fn apply(&self, config: &mut AppConfig) {
        if !self.names.is_empty() {
            config.filter = self.names.clone();
        }
        config.skip.extend(self.skip.iter().cloned());
        config.dry_run |= self.dry_run;
        config.force_serial |= self.force_serial;

        if let Some(format) = &self.format {
            config.format = format.clone();
        }
        if let Some(path) = &self.json_report {
            config.json_report = Some(path.clone());
        }
        if let Some(path) = &self.dot {
            config.dot_graph = Some(path.clone());
        }
        if let Some(path) = &self.csv {
            config.csv_report = Some(path.clone());
        }
        if let Some(prefix) = &self.log_file {
            config.log_file = Some(prefix.clone());
        }
    }
}

/// Arguments for list command
#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Show test case descriptions
    #[arg(short, long)]
    pub detailed: bool,
}

/// Arguments for init command
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Output path
    #[arg(default_value = "systest.yaml")]
    pub path: PathBuf,

    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}
