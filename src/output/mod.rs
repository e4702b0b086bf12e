//! Output formatting module
//!
//! Provides text, summary, and JSON output for a run.

mod formatter;

pub use formatter::{colorize_outcomes, OutputFormat, ResultFormatter};
