//! Output formatters for test results
//!
//! Provides text, summary, and JSON renderings of a run.

use anyhow::{Context, Result};

use crate::models::{Outcome, ResultRecord};
use crate::results::{walk, CountReport, JsonReport};
use crate::sequencer::Sequencer;
use crate::utils::format_timespan;

/// Output format options
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Full text report
    #[default]
    Text,
    /// One line with counts and verdict
    Summary,
    Json,
    JsonPretty,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" => Some(OutputFormat::Text),
            "summary" => Some(OutputFormat::Summary),
            "json" => Some(OutputFormat::Json),
            "json-pretty" | "jsonpretty" => Some(OutputFormat::JsonPretty),
            _ => None,
        }
    }
}

/// ANSI color of an outcome label
fn color(outcome: Outcome) -> &'static str {
    match outcome {
        Outcome::Passed => "\x1b[0;32m",
        Outcome::Failed => "\x1b[0;31m",
        Outcome::Skipped => "\x1b[0;33m",
        Outcome::ExpectedFailure | Outcome::UnexpectedPass => "\x1b[0;36m",
    }
}

/// Color every outcome label that follows a space
pub fn colorize_outcomes(text: &str) -> String {
    let mut colored = text.to_string();
    for outcome in Outcome::all() {
        let label = format!(" {outcome}");
        let painted = format!(" {}{}\x1b[0m", color(outcome), outcome);
        colored = colored.replace(&label, &painted);
    }
    colored
}

/// Result formatter
pub struct ResultFormatter {
    format: OutputFormat,
    colorize: bool,
}

impl ResultFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            colorize: true,
        }
    }

    pub fn no_color(mut self) -> Self {
        self.colorize = false;
        self
    }

    /// Format a single leaf record
    pub fn format_record(&self, record: &ResultRecord) -> String {
        match self.format {
            OutputFormat::Text => self.paint(&record.to_string()),
            OutputFormat::Summary => format!(
                "{} {} ({})",
                record.outcome.symbol(),
                record.name,
                format_timespan(record.duration)
            ),
            OutputFormat::Json => serde_json::to_string(record).unwrap_or_default(),
            OutputFormat::JsonPretty => serde_json::to_string_pretty(record).unwrap_or_default(),
        }
    }

    /// Format the most recent run of a sequencer
    pub fn format_run(&self, sequencer: &Sequencer) -> Result<String> {
        match self.format {
            OutputFormat::Text => Ok(self.paint(&sequencer.report())),
            OutputFormat::Summary => {
                let mut counts = CountReport::new();
                if let Some(result) = sequencer.aggregate() {
                    walk(&result, &mut counts);
                }
                Ok(self.paint(&format!("{}: {}", sequencer.name(), counts)))
            }
            OutputFormat::Json | OutputFormat::JsonPretty => {
                let mut json = JsonReport::new();
                if let Some(result) = sequencer.aggregate() {
                    walk(&result, &mut json);
                }
                let report = json.report(&sequencer.header());

                if self.format == OutputFormat::JsonPretty {
                    serde_json::to_string_pretty(&report).context("Failed to serialize report")
                } else {
                    serde_json::to_string(&report).context("Failed to serialize report")
                }
            }
        }
    }

    fn paint(&self, text: &str) -> String {
        if self.colorize {
            colorize_outcomes(text)
        } else {
            text.to_string()
        }
    }
}

impl Default for ResultFormatter {
    fn default() -> Self {
        Self::new(OutputFormat::Text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Window;
    use chrono::{TimeZone, Utc};
    use std::time::Duration;

    fn record(outcome: Outcome) -> ResultRecord {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        ResultRecord {
            name: "login".to_string(),
            description: String::new(),
            outcome,
            window: Window::new(start, start + chrono::Duration::milliseconds(250)),
            duration: Duration::from_millis(250),
            message: None,
        }
    }

    #[test]
    fn test_output_format_from_str() {
        assert_eq!(OutputFormat::from_str("json"), Some(OutputFormat::Json));
        assert_eq!(OutputFormat::from_str("TEXT"), Some(OutputFormat::Text));
        assert_eq!(OutputFormat::from_str("table"), None);
    }

    #[test]
    fn test_colorize_outcomes() {
        let colored = colorize_outcomes("a: PASSED\nb: FAILED\nc: XFAILED");
        assert!(colored.contains(" \x1b[0;32mPASSED\x1b[0m"));
        assert!(colored.contains(" \x1b[0;31mFAILED\x1b[0m"));
        assert!(colored.contains(" \x1b[0;36mXFAILED\x1b[0m"));
        assert!(!colored.contains("X\x1b"));
    }

    #[test]
    fn test_format_record() {
        let plain = ResultFormatter::new(OutputFormat::Text).no_color();
        assert_eq!(
            plain.format_record(&record(Outcome::Passed)),
            "✓ login: PASSED in 250 milliseconds"
        );

        let summary = ResultFormatter::new(OutputFormat::Summary);
        assert_eq!(
            summary.format_record(&record(Outcome::Failed)),
            "✗ login (250 milliseconds)"
        );

        let json = ResultFormatter::new(OutputFormat::Json);
        assert!(json
            .format_record(&record(Outcome::Skipped))
            .contains("\"outcome\":\"SKIPPED\""));
    }

    #[test]
    fn test_format_run_before_any_run() {
        let sequencer = Sequencer::new("empty");
        let formatter = ResultFormatter::new(OutputFormat::Summary).no_color();
        assert_eq!(
            formatter.format_run(&sequencer).unwrap(),
            "empty: PASSED (passed: 0, failed: 0, skipped: 0, xpassed: 0, xfailed: 0)"
        );

        let json = ResultFormatter::new(OutputFormat::Json)
            .format_run(&sequencer)
            .unwrap();
        assert!(json.contains("\"testcases\":null"));
    }
}
