//! Report generation for test results
//!
//! Count, summary tree, and JSON reporters, plus file export.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::info;

use super::aggregate::{AggregateResult, Counts, LeafReport};
use super::visitor::{walk, ResultVisitor};
use crate::models::Outcome;
use crate::tree::trim_description;
use crate::utils::format_timespan;

const INDENT: usize = 4;

/// Header metadata of a run
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RunHeader {
    pub name: String,
    pub date: DateTime<Utc>,
    pub node: String,
    pub user: String,
}

impl fmt::Display for RunHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Name: {}", self.name)?;
        writeln!(f, "Date: {}", self.date)?;
        writeln!(f, "Node: {}", self.node)?;
        write!(f, "User: {}", self.user)
    }
}

/// Tallies the outcome of every visited leaf
#[derive(Clone, Debug, Default)]
pub struct CountReport {
    counts: Counts,
}

impl CountReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counts(&self) -> Counts {
        self.counts
    }
}

impl ResultVisitor for CountReport {
    fn visit_test(&mut self, test: &LeafReport) {
        match test.outcome() {
            Some(outcome) => self.counts.record(outcome),
            None => self.counts.not_run += 1,
        }
    }
}

impl fmt::Display for CountReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (passed: {}, failed: {}, skipped: {}, xpassed: {}, xfailed: {})",
            self.counts.verdict(),
            self.counts.passed,
            self.counts.failed,
            self.counts.skipped,
            self.counts.xpassed,
            self.counts.xfailed
        )
    }
}

/// Renders the tree with `[ ]` around serial groups and `( )` around
/// parallel groups
#[derive(Clone, Debug, Default)]
pub struct SummaryReport {
    indent: usize,
    lines: Vec<String>,
}

impl SummaryReport {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, text: impl AsRef<str>) {
        self.lines
            .push(format!("{}{}", " ".repeat(self.indent), text.as_ref()));
    }

    fn open(&mut self, bracket: &str) {
        self.push(bracket);
        self.indent += INDENT;
    }

    fn close(&mut self, bracket: &str) {
        self.indent = self.indent.saturating_sub(INDENT);
        self.push(bracket);
    }
}

impl ResultVisitor for SummaryReport {
    fn visit_test(&mut self, test: &LeafReport) {
        let line = match test.message() {
            Some(message) => format!("{}: {} ({})", test.name, test.status_label(), message),
            None => format!("{}: {}", test.name, test.status_label()),
        };
        self.push(line);
    }

    fn start_serial(&mut self) {
        self.open("[");
    }

    fn end_serial(&mut self) {
        self.close("]");
    }

    fn start_parallel(&mut self) {
        self.open("(");
    }

    fn end_parallel(&mut self) {
        self.close(")");
    }
}

impl fmt::Display for SummaryReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.lines.join("\n"))
    }
}

/// One leaf in the JSON report
#[derive(Clone, Debug, Serialize)]
pub struct JsonTest {
    pub name: String,
    pub description: Vec<String>,
    pub result: String,
    pub execution_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// A leaf or a nested group in the JSON report
#[derive(Clone, Debug, Serialize)]
#[serde(untagged)]
pub enum JsonEntry {
    Test(JsonTest),
    Group(Vec<JsonEntry>),
}

/// Complete JSON report document
#[derive(Clone, Debug, Serialize)]
pub struct JsonRun {
    pub name: String,
    pub date: String,
    pub node: String,
    pub user: String,
    pub testcases: Option<JsonEntry>,
}

/// Builds the JSON report, with groups as nested arrays
#[derive(Clone, Debug, Default)]
pub struct JsonReport {
    path: Vec<Vec<JsonEntry>>,
    root: Option<JsonEntry>,
}

impl JsonReport {
    pub fn new() -> Self {
        Self::default()
    }

    fn place(&mut self, entry: JsonEntry) {
        match self.path.last_mut() {
            Some(group) => group.push(entry),
            None => self.root = Some(entry),
        }
    }

    fn close_group(&mut self) {
        if let Some(group) = self.path.pop() {
            self.place(JsonEntry::Group(group));
        }
    }

    pub fn report(&self, header: &RunHeader) -> JsonRun {
        JsonRun {
            name: header.name.clone(),
            date: header.date.to_string(),
            node: header.node.clone(),
            user: header.user.clone(),
            testcases: self.root.clone(),
        }
    }

    pub fn write_report<W: Write>(&self, header: &RunHeader, mut writer: W) -> Result<()> {
        serde_json::to_writer_pretty(&mut writer, &self.report(header))
            .context("Failed to write JSON report")?;
        writer.flush().context("Failed to flush JSON report")
    }
}

impl ResultVisitor for JsonReport {
    fn visit_test(&mut self, test: &LeafReport) {
        let (result, execution_time) = match &test.record {
            Some(record) => (
                record.outcome.to_string(),
                Some(format_timespan(record.duration)),
            ),
            None => (Outcome::Skipped.to_string(), None),
        };

        let description = trim_description(&test.description)
            .lines()
            .map(str::to_string)
            .collect();

        self.place(JsonEntry::Test(JsonTest {
            name: test.name.clone(),
            description,
            result,
            execution_time,
            message: test.message().map(str::to_string),
        }));
    }

    fn start_serial(&mut self) {
        self.path.push(Vec::new());
    }

    fn end_serial(&mut self) {
        self.close_group();
    }

    fn start_parallel(&mut self) {
        self.path.push(Vec::new());
    }

    fn end_parallel(&mut self) {
        self.close_group();
    }
}

/// File export format
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
}

/// Export a run's results to a file
pub fn export(
    result: &AggregateResult,
    header: &RunHeader,
    path: &Path,
    format: ExportFormat,
) -> Result<()> {
    match format {
        ExportFormat::Json => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create report: {}", path.display()))?;
            let mut json = JsonReport::new();
            walk(result, &mut json);
            json.write_report(header, BufWriter::new(file))?;
        }
        ExportFormat::Csv => {
            let mut writer = csv::Writer::from_path(path)
                .with_context(|| format!("Failed to create report: {}", path.display()))?;

            writer.write_record([
                "name",
                "result",
                "duration_ms",
                "started_at",
                "finished_at",
                "message",
            ])?;

            for leaf in result.leaves() {
                let (started, finished) = match &leaf.record {
                    Some(record) => (
                        record.started_at().to_rfc3339(),
                        record.finished_at().to_rfc3339(),
                    ),
                    None => (String::new(), String::new()),
                };

                writer.write_record([
                    leaf.name.clone(),
                    leaf.status_label(),
                    leaf.duration().as_millis().to_string(),
                    started,
                    finished,
                    leaf.message().unwrap_or_default().to_string(),
                ])?;
            }
            writer.flush()?;
        }
    }

    info!("Exported results to {}", path.display());
    Ok(())
}
