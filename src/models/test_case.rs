//! Test case contract
//!
//! Defines the capability a leaf unit must expose and the signals its run
//! action may raise.

use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Result returned by test case actions
pub type TestResult = std::result::Result<(), TestError>;

/// Signal raised by a test case action
#[derive(Debug, Error)]
pub enum TestError {
    /// The test ran and its checks did not hold
    #[error("{0}")]
    Failed(String),

    /// The test decided not to run
    #[error("{0}")]
    Skipped(String),

    /// The action panicked
    #[error("panicked: {0}")]
    Panicked(String),

    /// Any other error escaping the action
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TestError {
    pub fn failed(message: impl Into<String>) -> Self {
        TestError::Failed(message.into())
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        TestError::Skipped(reason.into())
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, TestError::Skipped(_))
    }
}

/// Declared expectation of a leaf, decided before it runs
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Expectation {
    #[default]
    Pass,
    Failure(String),
}

impl Expectation {
    pub fn expects_failure(&self) -> bool {
        matches!(self, Expectation::Failure(_))
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Expectation::Pass => None,
            Expectation::Failure(reason) => Some(reason),
        }
    }
}

/// A named unit of work executed by the sequencer.
///
/// Only `name` and `run` are required. The engine never constructs test
/// cases; it only invokes them, possibly from several tasks at once.
#[async_trait]
pub trait TestCase: Send + Sync {
    /// Name used for reporting and filtering, unique within a run
    fn name(&self) -> &str;

    /// Free text shown in the per-test report block
    fn description(&self) -> &str {
        ""
    }

    /// Whether the test is expected to fail
    fn expectation(&self) -> Expectation {
        Expectation::Pass
    }

    /// Estimated execution time, used instead of `run` for dry runs
    fn estimate(&self) -> Duration {
        Duration::ZERO
    }

    /// Called before `run`
    async fn setup(&self) -> TestResult {
        Ok(())
    }

    /// The test logic
    async fn run(&self) -> TestResult;

    /// Called after `run` whenever `setup` succeeded
    async fn teardown(&self) -> TestResult {
        Ok(())
    }
}

#[async_trait]
impl<T: TestCase + ?Sized> TestCase for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn description(&self) -> &str {
        (**self).description()
    }

    fn expectation(&self) -> Expectation {
        (**self).expectation()
    }

    fn estimate(&self) -> Duration {
        (**self).estimate()
    }

    async fn setup(&self) -> TestResult {
        (**self).setup().await
    }

    async fn run(&self) -> TestResult {
        (**self).run().await
    }

    async fn teardown(&self) -> TestResult {
        (**self).teardown().await
    }
}

/// Marks the wrapped test case as expected to fail
pub struct XFail<T> {
    inner: T,
    reason: String,
}

impl<T: TestCase> XFail<T> {
    pub fn new(inner: T, reason: impl Into<String>) -> Self {
        Self {
            inner,
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl<T: TestCase> TestCase for XFail<T> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn description(&self) -> &str {
        self.inner.description()
    }

    fn expectation(&self) -> Expectation {
        Expectation::Failure(self.reason.clone())
    }

    fn estimate(&self) -> Duration {
        self.inner.estimate()
    }

    async fn setup(&self) -> TestResult {
        self.inner.setup().await
    }

    async fn run(&self) -> TestResult {
        self.inner.run().await
    }

    async fn teardown(&self) -> TestResult {
        self.inner.teardown().await
    }
}

/// Test case backed by an async closure
pub struct FnTest<F> {
    name: String,
    description: String,
    estimate: Duration,
    action: F,
}

impl<F, Fut> FnTest<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = TestResult> + Send,
{
    pub fn new(name: impl Into<String>, action: F) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            estimate: Duration::ZERO,
            action,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_estimate(mut self, estimate: Duration) -> Self {
        self.estimate = estimate;
        self
    }
}

#[async_trait]
impl<F, Fut> TestCase for FnTest<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = TestResult> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn estimate(&self) -> Duration {
        self.estimate
    }

    async fn run(&self) -> TestResult {
        (self.action)().await
    }
}

impl<F> fmt::Debug for FnTest<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTest")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}
