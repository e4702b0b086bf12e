//! systest - serial and parallel test sequence runner
//!
//! Runs an example sequence of test cases where serial groups run in order
//! and parallel groups run concurrently.
//!
//! ## Usage
//!
//! ```bash
//! # Run the whole sequence
//! systest run
//!
//! # Run two test cases and write a DOT graph of the run
//! systest run -n my_testcase_1 -n my_testcase_2 --dot run.dot
//!
//! # Show the schedule length without running anything
//! systest run --dry-run --format summary
//!
//! # List the test cases
//! systest list --detailed
//! ```

use anyhow::{bail, Result};
use async_trait::async_trait;
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

use systest::cli::{Args, Command, InitArgs, ListArgs, RunArgs};
use systest::config::{print_env_help, AppConfig, EnvConfig};
use systest::output::ResultFormatter;
use systest::utils::{init_logger, LogLevel};
use systest::{build, RunMetadata, Sequence, Sequencer, TestCase, TestError, TestResult};

/// Example test case that does some work and checks a few conditions
struct MyTestCase {
    name: String,
    work: Duration,
}

impl MyTestCase {
    fn new(name: &str, work_ms: u64) -> Self {
        Self {
            name: format!("my_testcase_{name}"),
            work: Duration::from_millis(work_ms),
        }
    }
}

#[async_trait]
impl TestCase for MyTestCase {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Test case description.\n\n    Sleeps for a while, then checks some arithmetic."
    }

    fn estimate(&self) -> Duration {
        self.work
    }

    async fn run(&self) -> TestResult {
        info!("Hello!");
        tokio::time::sleep(self.work).await;

        let values = [1, 2, 3];
        check(values.iter().sum::<i32>() == 6, "sum of [1, 2, 3] is not 6")?;
        check(values.contains(&2), "2 not in [1, 2, 3]")?;
        check(!values.contains(&4), "4 in [1, 2, 3]")?;
        Ok(())
    }
}

fn check(condition: bool, message: &str) -> TestResult {
    if condition {
        Ok(())
    } else {
        Err(TestError::failed(message))
    }
}

/// `[1, (2, [3, 4]), 5]`
fn my_sequence() -> Sequence {
    let case = |name, work_ms| Sequence::test(MyTestCase::new(name, work_ms));

    Sequence::serial([
        case("1", 100),
        Sequence::parallel([
            case("2", 300),
            Sequence::serial([case("3", 100), case("4", 100)]),
        ]),
        case("5", 50),
    ])
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Command::Run(run_args) => {
            let code = run(run_args, args.verbose).await?;
            std::process::exit(code);
        }
        Command::List(list_args) => list(list_args)?,
        Command::Init(init_args) => init(init_args)?,
        Command::Env => print_env_help(),
    }

    Ok(())
}

/// Merge file, environment, and command line configuration
fn load_config(run_args: &RunArgs) -> Result<AppConfig> {
    let env = EnvConfig::load();

    let path = run_args
        .config
        .clone()
        .or_else(|| env.config_file.as_ref().map(PathBuf::from));
    let mut config = match path {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::load_default()?,
    };

    config.apply_env(&env);
    run_args.apply(&mut config);
    config.validate()?;
    Ok(config)
}

async fn run(run_args: RunArgs, verbose: bool) -> Result<i32> {
    let config = load_config(&run_args)?;

    let level = if verbose {
        LogLevel::Debug
    } else {
        config.log_level()
    };
    if let Some(path) = init_logger(level, config.log_file.as_deref())? {
        info!("Logging to {}", path.display());
    }

    let mut sequencer = Sequencer::new(config.name.clone())
        .with_options(config.run_options())
        .with_metadata(RunMetadata::from_env());
    sequencer.run(&my_sequence()).await?;

    let mut formatter = ResultFormatter::new(config.output_format());
    if !std::io::stdout().is_terminal() {
        formatter = formatter.no_color();
    }
    println!("{}", formatter.format_run(&sequencer)?);

    if let Some(path) = &config.json_report {
        sequencer.write_json(path)?;
    }
    if let Some(path) = &config.dot_graph {
        sequencer.write_dot(path)?;
    }
    if let Some(path) = &config.csv_report {
        sequencer.write_csv(path)?;
    }

    Ok(sequencer.verdict_exit_code())
}

fn list(list_args: ListArgs) -> Result<()> {
    let tree = build(&my_sequence())?;

    println!("Test cases ({}):", tree.len());
    for leaf in tree.leaves() {
        println!("  {}", leaf.name());
        if list_args.detailed {
            for line in leaf.description().lines() {
                println!("      {line}");
            }
        }
    }

    Ok(())
}

fn init(init_args: InitArgs) -> Result<()> {
    if init_args.path.exists() && !init_args.force {
        bail!(
            "{} already exists, use --force to overwrite",
            init_args.path.display()
        );
    }

    AppConfig::default().save(&init_args.path)?;
    println!("Wrote {}", init_args.path.display());
    Ok(())
}
