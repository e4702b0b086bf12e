//! Per-leaf outcome and result record
//!
//! Defines the outcome of a single test case and its timing record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::utils::format_timespan;

/// Outcome assigned to a leaf after it runs
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Passed,
    Failed,
    Skipped,
    /// Ran, failed, and was expected to fail
    #[serde(rename = "XFAILED")]
    ExpectedFailure,
    /// Ran, passed, but was expected to fail
    #[serde(rename = "XPASSED")]
    UnexpectedPass,
}

impl Outcome {
    /// Map a raw pass/fail to the reported outcome
    pub fn classify(passed: bool, expected_failure: bool) -> Self {
        match (passed, expected_failure) {
            (true, false) => Outcome::Passed,
            (false, false) => Outcome::Failed,
            (true, true) => Outcome::UnexpectedPass,
            (false, true) => Outcome::ExpectedFailure,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Outcome::Passed => "✓",
            Outcome::Failed => "✗",
            Outcome::Skipped => "○",
            Outcome::ExpectedFailure => "x",
            Outcome::UnexpectedPass => "!",
        }
    }

    /// Whether this outcome fails the overall verdict
    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failed | Outcome::UnexpectedPass)
    }

    pub fn all() -> [Outcome; 5] {
        [
            Outcome::Passed,
            Outcome::Failed,
            Outcome::Skipped,
            Outcome::UnexpectedPass,
            Outcome::ExpectedFailure,
        ]
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Passed => write!(f, "PASSED"),
            Outcome::Failed => write!(f, "FAILED"),
            Outcome::Skipped => write!(f, "SKIPPED"),
            Outcome::ExpectedFailure => write!(f, "XFAILED"),
            Outcome::UnexpectedPass => write!(f, "XPASSED"),
        }
    }
}

/// A measured time window
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Window {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Length of the window, zero if the clock went backwards
    pub fn elapsed(&self) -> Duration {
        (self.end - self.start).to_std().unwrap_or(Duration::ZERO)
    }
}

/// Finalized result of a single leaf execution
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResultRecord {
    pub name: String,
    pub description: String,
    pub outcome: Outcome,
    pub window: Window,
    pub duration: Duration,
    pub message: Option<String>,
}

impl ResultRecord {
    pub fn started_at(&self) -> DateTime<Utc> {
        self.window.start
    }

    pub fn finished_at(&self) -> DateTime<Utc> {
        self.window.end
    }
}

impl fmt::Display for ResultRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}: {} in {}",
            self.outcome.symbol(),
            self.name,
            self.outcome,
            format_timespan(self.duration)
        )?;
        if let Some(msg) = &self.message {
            write!(f, " ({msg})")?;
        }
        Ok(())
    }
}
