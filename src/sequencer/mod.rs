//! Sequencer façade
//!
//! Builds the execution tree from a nested [`Sequence`], drives the
//! [`Executor`], and exposes the aggregated results, reports, and the
//! process exit code.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::executor::{Executor, RunOptions};
use crate::models::Window;
use crate::results::{
    aggregate, export, walk, AggregateResult, CountReport, ExportFormat, GraphReport, RunHeader,
    SummaryReport, Verdict,
};
use crate::tree::{build, Sequence, StructureError, TestTree};
use crate::utils::{format_timespan, Clock, SystemClock};

use crate::executor::SEPARATOR;

/// Host metadata shown in report headers
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub node: String,
    pub user: String,
}

impl Default for RunMetadata {
    fn default() -> Self {
        Self {
            node: "unknown".to_string(),
            user: "unknown".to_string(),
        }
    }
}

impl RunMetadata {
    pub fn new(node: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            user: user.into(),
        }
    }

    /// Collect host and user names from the environment
    pub fn from_env() -> Self {
        let default = Self::default();
        let node = std::env::var("HOSTNAME")
            .ok()
            .or_else(|| {
                std::fs::read_to_string("/etc/hostname")
                    .ok()
                    .map(|s| s.trim().to_string())
            })
            .filter(|s| !s.is_empty())
            .unwrap_or(default.node);
        let user = std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or(default.user);

        Self { node, user }
    }
}

/// Tree and run window of the most recent run
#[derive(Clone, Debug)]
pub struct CompletedRun {
    tree: Arc<TestTree>,
    window: Window,
}

impl CompletedRun {
    pub fn tree(&self) -> &Arc<TestTree> {
        &self.tree
    }

    pub fn window(&self) -> Window {
        self.window
    }

    pub fn aggregate(&self) -> AggregateResult {
        aggregate(&self.tree)
    }
}

/// Runs nested test sequences and reports on the most recent run.
///
/// Each run builds a fresh tree, so results never carry over between runs.
pub struct Sequencer {
    name: String,
    options: RunOptions,
    clock: Arc<dyn Clock>,
    metadata: RunMetadata,
    last: Option<CompletedRun>,
}

impl Sequencer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: RunOptions::default(),
            clock: Arc::new(SystemClock::new()),
            metadata: RunMetadata::default(),
            last: None,
        }
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_metadata(mut self, metadata: RunMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Build the tree for a sequence without running it
    pub fn prepare(&self, sequence: &Sequence) -> Result<Arc<TestTree>, StructureError> {
        let tree = build(sequence)?;
        Ok(Arc::new(tree))
    }

    /// Execute a prepared tree and keep it as the most recent run
    pub async fn execute(&mut self, tree: Arc<TestTree>) -> Verdict {
        let start = self.clock.now();
        self.log_header(&RunHeader {
            name: self.name.clone(),
            date: start,
            node: self.metadata.node.clone(),
            user: self.metadata.user.clone(),
        });

        let executor = Executor::new(self.options.clone(), self.clock.clone());
        executor.execute(&tree).await;

        let end = self.clock.now();
        let run = CompletedRun {
            tree,
            window: Window::new(start, end),
        };
        let verdict = run.aggregate().verdict;
        info!(
            "{}: {} in {}",
            self.name,
            verdict,
            format_timespan(run.window.elapsed())
        );

        self.last = Some(run);
        verdict
    }

    /// Build and execute a sequence.
    ///
    /// Structural errors are returned before any test case runs.
    pub async fn run(&mut self, sequence: &Sequence) -> Result<Verdict, StructureError> {
        let tree = self.prepare(sequence)?;
        Ok(self.execute(tree).await)
    }

    pub fn last_run(&self) -> Option<&CompletedRun> {
        self.last.as_ref()
    }

    pub fn aggregate(&self) -> Option<AggregateResult> {
        self.last.as_ref().map(CompletedRun::aggregate)
    }

    /// Verdict of the most recent run, `None` before the first run
    pub fn verdict(&self) -> Option<Verdict> {
        self.aggregate().map(|result| result.verdict)
    }

    /// Zero iff the most recent run passed
    pub fn verdict_exit_code(&self) -> i32 {
        self.verdict().unwrap_or(Verdict::Failed).exit_code()
    }

    /// Run-level elapsed time of the most recent run
    pub fn elapsed(&self) -> Option<Duration> {
        self.last.as_ref().map(|run| run.window.elapsed())
    }

    pub fn header(&self) -> RunHeader {
        let date = match &self.last {
            Some(run) => run.window.start,
            None => self.clock.now(),
        };

        RunHeader {
            name: self.name.clone(),
            date,
            node: self.metadata.node.clone(),
            user: self.metadata.user.clone(),
        }
    }

    fn log_header(&self, header: &RunHeader) {
        info!("Name: {}", header.name);
        info!("Date: {}", header.date);
        info!("Node: {}", header.node);
        info!("User: {}", header.user);
    }

    /// Render the text report of the most recent run
    pub fn report(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}", self.header());
        out.push('\n');

        let Some(run) = &self.last else {
            out.push_str("No test cases executed.\n");
            let _ = writeln!(out, "Result: {}", Verdict::Failed);
            return out;
        };
        let result = run.aggregate();

        for leaf in result.leaves() {
            let _ = writeln!(out, "{}", SEPARATOR);
            let _ = writeln!(out, "Name: {}", leaf.name);
            if !leaf.description.is_empty() {
                let _ = writeln!(out, "Description:");
                for line in leaf.description.lines() {
                    let _ = writeln!(out, "    {}", line);
                }
            }
            let _ = writeln!(out, "Result: {}", leaf.status_label());
            let _ = writeln!(out, "Execution time: {}", format_timespan(leaf.duration()));
            if let Some(message) = leaf.message() {
                let _ = writeln!(out, "Message: {}", message);
            }
        }
        let _ = writeln!(out, "{}", SEPARATOR);
        out.push('\n');

        let mut summary = SummaryReport::new();
        walk(&result, &mut summary);
        let _ = writeln!(out, "{}", summary);
        out.push('\n');

        let mut counts = CountReport::new();
        walk(&result, &mut counts);
        let _ = writeln!(out, "{}", counts.counts());
        let _ = writeln!(
            out,
            "Execution time: {}",
            format_timespan(run.window.elapsed())
        );
        let _ = writeln!(out, "Result: {}", result.verdict);
        out
    }

    fn completed(&self) -> Result<&CompletedRun> {
        match &self.last {
            Some(run) => Ok(run),
            None => bail!("Sequence {} has not been run", self.name),
        }
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let run = self.completed()?;
        export(&run.aggregate(), &self.header(), path, ExportFormat::Json)
    }

    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let run = self.completed()?;
        export(&run.aggregate(), &self.header(), path, ExportFormat::Csv)
    }

    pub fn write_dot(&self, path: &Path) -> Result<()> {
        let run = self.completed()?;
        let mut graph = GraphReport::new();
        walk(&run.aggregate(), &mut graph);
        if graph.critical_duration() > run.window.elapsed() {
            warn!("Slowest path is longer than the measured run");
        }
        graph.write_dot(&self.name, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Outcome, TestCase, TestError, TestResult};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Step {
        name: String,
        work: Duration,
        fail: bool,
        runs: Arc<AtomicUsize>,
    }

    impl Step {
        fn new(name: &str, work_ms: u64) -> Self {
            Self {
                name: name.to_string(),
                work: Duration::from_millis(work_ms),
                fail: false,
                runs: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn failing(mut self) -> Self {
            self.fail = true;
            self
        }
    }

    #[async_trait]
    impl TestCase for Step {
        fn name(&self) -> &str {
            &self.name
        }

        fn description(&self) -> &str {
            "A numbered step."
        }

        async fn run(&self) -> TestResult {
            self.runs.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.work).await;
            if self.fail {
                return Err(TestError::failed("step failed"));
            }
            Ok(())
        }
    }

    /// `[1, (2, [3, 4]), 5]`
    fn five(failing: Option<&str>) -> (Sequence, Vec<Arc<AtomicUsize>>) {
        let steps: Vec<Step> = (1..=5)
            .map(|i| {
                let name = i.to_string();
                let step = Step::new(&name, 20);
                if failing == Some(name.as_str()) {
                    step.failing()
                } else {
                    step
                }
            })
            .collect();
        let counters = steps.iter().map(|s| s.runs.clone()).collect();
        let mut steps = steps.into_iter().map(Sequence::test);
        let mut next = || steps.next().unwrap();

        let sequence = Sequence::serial([
            next(),
            Sequence::parallel([next(), Sequence::serial([next(), next()])]),
            next(),
        ]);
        (sequence, counters)
    }

    fn sequencer() -> Sequencer {
        Sequencer::new("basics").with_metadata(RunMetadata::new("lab-1", "ci"))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_all_pass() {
        let (sequence, _) = five(None);
        let mut seq = sequencer();
        let verdict = seq.run(&sequence).await.unwrap();

        assert_eq!(verdict, Verdict::Passed);
        assert_eq!(seq.verdict_exit_code(), 0);

        let result = seq.aggregate().unwrap();
        assert_eq!(
            result.counts.to_string(),
            "5 passed, 0 failed, 0 skipped, 0 xpassed, 0 xfailed"
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_failure_does_not_stop_serial_siblings() {
        let (sequence, counters) = five(Some("3"));
        let mut seq = sequencer();
        seq.run(&sequence).await.unwrap();

        for runs in &counters {
            assert_eq!(runs.load(Ordering::SeqCst), 1);
        }

        let result = seq.aggregate().unwrap();
        assert_eq!(result.leaf("3").unwrap().outcome(), Some(Outcome::Failed));
        assert_eq!(result.leaf("4").unwrap().outcome(), Some(Outcome::Passed));
        assert_eq!(result.counts.failed, 1);
        assert_eq!(result.counts.passed, 4);
        assert_eq!(seq.verdict(), Some(Verdict::Failed));
        assert_eq!(seq.verdict_exit_code(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_name_fails_before_running() {
        let first = Step::new("dup", 1);
        let runs = first.runs.clone();
        let sequence = Sequence::serial([
            Sequence::test(first),
            Sequence::parallel([Sequence::test(Step::new("dup", 1))]),
        ]);

        let mut seq = sequencer();
        let err = seq.run(&sequence).await.unwrap_err();
        assert_eq!(
            err,
            StructureError::DuplicateName {
                name: "dup".to_string()
            }
        );
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert!(seq.last_run().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_wall_time_is_not_the_sum() {
        let sequence = Sequence::parallel([
            Sequence::test(Step::new("a", 150)),
            Sequence::test(Step::new("b", 150)),
            Sequence::test(Step::new("c", 150)),
        ]);
        let mut seq = sequencer();
        seq.run(&sequence).await.unwrap();

        let result = seq.aggregate().unwrap();
        let wall = result.wall_time.unwrap();
        assert!(wall >= Duration::from_millis(150));
        assert!(wall < Duration::from_millis(400), "wall time {wall:?}");
        assert!(seq.elapsed().unwrap() >= wall);
    }

    #[tokio::test]
    async fn test_each_run_starts_fresh() {
        let (sequence, counters) = five(None);
        let mut seq = sequencer();

        seq.run(&sequence).await.unwrap();
        let first = seq.last_run().unwrap().tree().clone();
        seq.run(&sequence).await.unwrap();
        let second = seq.last_run().unwrap().tree().clone();

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(seq.aggregate().unwrap().counts.total(), 5);
        for runs in &counters {
            assert_eq!(runs.load(Ordering::SeqCst), 2);
        }
    }

    #[test]
    fn test_exit_code_without_run() {
        let seq = sequencer();
        assert_eq!(seq.verdict(), None);
        assert_eq!(seq.verdict_exit_code(), 1);
        assert!(seq.report().contains("No test cases executed."));
        assert!(seq.write_json(Path::new("unused.json")).is_err());
    }

    #[test]
    fn test_report_layout() {
        let (sequence, _) = five(Some("2"));
        let mut seq = sequencer();
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(seq.run(&sequence)).unwrap();

        let report = seq.report();
        assert!(report.starts_with("Name: basics\n"));
        assert!(report.contains("Node: lab-1\nUser: ci\n"));
        assert!(report.contains("Name: 2\nDescription:\n    A numbered step.\nResult: FAILED\n"));
        assert!(report.contains("Message: step failed\n"));
        assert!(report.contains("    (\n        2: FAILED (step failed)\n        [\n"));
        assert!(report.contains("4 passed, 1 failed, 0 skipped, 0 xpassed, 0 xfailed\n"));
        assert!(report.ends_with("Result: FAILED\n"));
    }

    #[test]
    fn test_aggregate_before_and_after_run() {
        let sequence = Sequence::serial([
            Sequence::test(Step::new("slow", 200)),
            Sequence::test(Step::new("after", 1)),
        ]);
        let mut seq = sequencer();
        let tree = seq.prepare(&sequence).unwrap();

        let before = aggregate(&tree);
        assert_eq!(before.counts.not_run, 2);

        tokio_test::block_on(seq.execute(tree.clone()));
        let after = aggregate(&tree);
        assert_eq!(after.counts.passed, 2);
        assert_eq!(after.counts.not_run, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_aggregate_while_running() {
        let sequence = Sequence::serial([
            Sequence::test(Step::new("slow", 400)),
            Sequence::test(Step::new("after", 1)),
        ]);
        let mut seq = sequencer();
        let tree = seq.prepare(&sequence).unwrap();

        let running = tree.clone();
        let handle = tokio::spawn(async move {
            seq.execute(running).await;
            seq
        });
        tokio::time::sleep(Duration::from_millis(100)).await;

        let during = aggregate(&tree);
        assert_eq!(during.leaf("slow").unwrap().status_label(), "RUNNING");
        assert_eq!(during.leaf("after").unwrap().status_label(), "NOT RUN");
        assert_eq!(during.counts.not_run, 2);
        assert_eq!(during.counts.passed, 0);

        let seq = handle.await.unwrap();
        let after = aggregate(&tree);
        assert_eq!(after.counts.passed, 2);
        assert_eq!(after.counts.not_run, 0);
        assert_eq!(seq.verdict(), Some(Verdict::Passed));
    }

    #[tokio::test]
    async fn test_dry_run_uses_estimates() {
        let case = crate::models::FnTest::new("estimated", || async {
            Err::<(), _>(TestError::failed("must not run"))
        })
        .with_estimate(Duration::from_secs(3));
        let sequence = Sequence::serial([Sequence::test(case)]);

        let mut seq = sequencer().with_options(RunOptions::new().dry_run(true));
        let verdict = seq.run(&sequence).await.unwrap();

        assert_eq!(verdict, Verdict::Passed);
        assert_eq!(seq.aggregate().unwrap().elapsed, Duration::from_secs(3));
    }

    /// Test case whose estimate cannot be computed
    struct BadEstimate;

    #[async_trait]
    impl TestCase for BadEstimate {
        fn name(&self) -> &str {
            "bad"
        }

        fn estimate(&self) -> Duration {
            panic!("no estimate for bad")
        }

        async fn run(&self) -> TestResult {
            Ok(())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_dry_run_estimate_panic_is_recorded() {
        let after = crate::models::FnTest::new("after", || async { Ok(()) })
            .with_estimate(Duration::from_secs(1));
        let sequence = Sequence::serial([Sequence::test(BadEstimate), Sequence::test(after)]);

        let mut seq = sequencer().with_options(RunOptions::new().dry_run(true));
        let tree = seq.prepare(&sequence).unwrap();
        let handle = tokio::spawn(async move {
            let verdict = seq.execute(tree).await;
            (seq, verdict)
        });
        let (seq, verdict) = handle.await.unwrap();

        assert_eq!(verdict, Verdict::Failed);
        assert!(seq.last_run().is_some());

        let result = seq.aggregate().unwrap();
        let bad = result.leaf("bad").unwrap();
        assert_eq!(bad.outcome(), Some(Outcome::Failed));
        assert_eq!(bad.message(), Some("panicked: no estimate for bad"));
        assert_eq!(result.leaf("after").unwrap().outcome(), Some(Outcome::Passed));
        assert_eq!(result.counts.not_run, 0);
        assert_eq!(seq.verdict_exit_code(), 1);
    }

    #[tokio::test]
    async fn test_exports() {
        let (sequence, _) = five(None);
        let mut seq = sequencer();
        seq.run(&sequence).await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        let json = dir.path().join("basics.json");
        let dot = dir.path().join("basics.dot");
        let csv = dir.path().join("basics.csv");
        seq.write_json(&json).unwrap();
        seq.write_dot(&dot).unwrap();
        seq.write_csv(&csv).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&json).unwrap()).unwrap();
        assert_eq!(value["user"], "ci");
        assert!(std::fs::read_to_string(&dot)
            .unwrap()
            .starts_with("digraph \"basics\""));
        assert_eq!(std::fs::read_to_string(&csv).unwrap().lines().count(), 6);
    }
}
