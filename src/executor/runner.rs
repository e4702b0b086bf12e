//! Leaf execution
//!
//! Runs a single test case and records its outcome and timing.

use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, info_span, warn, Instrument};

use crate::models::{Outcome, ResultRecord, TestError, TestResult, Window};
use crate::tree::Leaf;
use crate::utils::{format_timespan, Clock};

pub(crate) const SEPARATOR: &str = "---------------------------------------------------------------";

/// Options controlling how leaves are executed
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// When non-empty, only these test cases run
    pub filter: Vec<String>,

    /// Test cases that never run
    pub skip: Vec<String>,

    /// Record estimates instead of running
    pub dry_run: bool,

    /// Run parallel groups one child at a time
    pub force_serial: bool,
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn only(mut self, name: impl Into<String>) -> Self {
        self.filter.push(name.into());
        self
    }

    pub fn skip(mut self, name: impl Into<String>) -> Self {
        self.skip.push(name.into());
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn force_serial(mut self, force_serial: bool) -> Self {
        self.force_serial = force_serial;
        self
    }

    /// Check whether the named test case passes the filters
    pub fn is_enabled(&self, name: &str) -> bool {
        let included = self.filter.is_empty() || self.filter.iter().any(|n| n == name);
        included && !self.skip.iter().any(|n| n == name)
    }
}

/// Runs one leaf and writes its result record
pub struct LeafRunner {
    options: RunOptions,
    clock: Arc<dyn Clock>,
}

impl LeafRunner {
    pub fn new(options: RunOptions, clock: Arc<dyn Clock>) -> Self {
        Self { options, clock }
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Run the leaf. Every exit path stores a record; errors never escape.
    pub async fn run(&self, leaf: &Leaf) {
        let span = info_span!("test", name = %leaf.name());
        self.run_leaf(leaf).instrument(span).await
    }

    async fn run_leaf(&self, leaf: &Leaf) {
        log_header(leaf);

        let guard = TimingGuard::start(leaf, self.clock.as_ref());

        let (outcome, message, duration) = if !self.options.is_enabled(leaf.name()) {
            info!("Test case {} disabled by filter", leaf.name());
            (Outcome::Skipped, Some("disabled by filter".to_string()), None)
        } else if self.options.dry_run {
            match std::panic::catch_unwind(AssertUnwindSafe(|| leaf.case().estimate())) {
                Ok(estimate) => (Outcome::Passed, None, Some(estimate)),
                Err(payload) => {
                    let err = TestError::Panicked(panic_message(payload.as_ref()));
                    error!("{}: estimate failed: {}", leaf.name(), err);
                    (Outcome::Failed, Some(err.to_string()), None)
                }
            }
        } else {
            let (outcome, message) = self.invoke(leaf).await;
            (outcome, message, None)
        };

        let record = guard.finish(outcome, message, duration);
        info!(
            "{}: {} in {}",
            record.name,
            record.outcome,
            format_timespan(record.duration)
        );
    }

    /// Call setup, run, and teardown, and map the raw result to an outcome
    async fn invoke(&self, leaf: &Leaf) -> (Outcome, Option<String>) {
        let case = leaf.case();

        let raw = match guarded(case.setup()).await {
            Err(e) => Err(e),
            Ok(()) => {
                let run = guarded(case.run()).await;
                let teardown = guarded(case.teardown()).await;

                match (run, teardown) {
                    (Ok(()), Err(e)) => Err(e),
                    (Err(e), Err(teardown_err)) => {
                        warn!("{}: teardown failed: {}", leaf.name(), teardown_err);
                        Err(e)
                    }
                    (run, Ok(())) => run,
                }
            }
        };

        let expectation = leaf.expectation();
        let reason = expectation.reason().map(str::to_string);

        match raw {
            Ok(()) => {
                let outcome = Outcome::classify(true, expectation.expects_failure());
                (outcome, reason)
            }
            Err(e) if e.is_skip() => {
                info!("{}: skipped: {}", leaf.name(), e);
                (Outcome::Skipped, Some(e.to_string()))
            }
            Err(e) => {
                if expectation.expects_failure() {
                    info!("{}: failed as expected: {}", leaf.name(), e);
                    (Outcome::ExpectedFailure, reason)
                } else {
                    error!("{}: {}", leaf.name(), e);
                    (Outcome::Failed, Some(e.to_string()))
                }
            }
        }
    }
}

/// Await a test action, turning a panic into a failure signal
async fn guarded<F>(action: F) -> TestResult
where
    F: Future<Output = TestResult>,
{
    match AssertUnwindSafe(action).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(TestError::Panicked(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

fn log_header(leaf: &Leaf) {
    info!("{}", SEPARATOR);
    info!("");
    info!("Name: {}", leaf.name());
    info!("Description:");
    info!("");
    for line in leaf.description().lines() {
        info!("    {}", line);
    }
    info!("");
}

/// Timing window of a running leaf.
///
/// Dropping an unfinished guard still stores a `Failed` record, so a leaf
/// never ends up without timing.
struct TimingGuard<'a> {
    leaf: &'a Leaf,
    clock: &'a dyn Clock,
    start: chrono::DateTime<chrono::Utc>,
    finished: bool,
}

impl<'a> TimingGuard<'a> {
    fn start(leaf: &'a Leaf, clock: &'a dyn Clock) -> Self {
        let start = clock.now();
        if !leaf.mark_started(start) {
            warn!("Test case {} started more than once", leaf.name());
        }

        Self {
            leaf,
            clock,
            start,
            finished: false,
        }
    }

    /// Close the window and store the record. `duration` overrides the
    /// measured length.
    fn finish(
        mut self,
        outcome: Outcome,
        message: Option<String>,
        duration: Option<Duration>,
    ) -> ResultRecord {
        self.finished = true;
        let record = self.record(outcome, message, duration);
        self.leaf.finalize(record.clone());
        record
    }

    fn record(
        &self,
        outcome: Outcome,
        message: Option<String>,
        duration: Option<Duration>,
    ) -> ResultRecord {
        let window = Window::new(self.start, self.clock.now());

        ResultRecord {
            name: self.leaf.name().to_string(),
            description: self.leaf.description().to_string(),
            outcome,
            duration: duration.unwrap_or_else(|| window.elapsed()),
            window,
            message,
        }
    }
}

impl Drop for TimingGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            let record = self.record(
                Outcome::Failed,
                Some("execution interrupted before completion".to_string()),
                None,
            );
            error!("{}: {}", record.name, record.outcome);
            self.leaf.finalize(record);
        }
    }
}
