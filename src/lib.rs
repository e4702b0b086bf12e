//! systest - serial and parallel test sequencing
//!
//! Runs a caller-built tree of test cases where serial groups run their
//! children in order and parallel groups fork one task per child and join
//! them before moving on. Results are aggregated over the same tree shape
//! and rendered as text, JSON, CSV, or a Graphviz graph.
//!
//! ## Usage
//!
//! ```no_run
//! use systest::{FnTest, Sequence, Sequencer, TestError, TestResult};
//!
//! async fn login() -> TestResult {
//!     Ok(())
//! }
//!
//! async fn upload() -> TestResult {
//!     Err(TestError::failed("quota exceeded"))
//! }
//!
//! # async fn demo() {
//! let sequence = Sequence::serial([
//!     Sequence::test(FnTest::new("login", login)),
//!     Sequence::parallel([
//!         Sequence::test(FnTest::new("upload", upload)),
//!         Sequence::xfail(FnTest::new("legacy_upload", upload), "Not supported."),
//!     ]),
//! ]);
//!
//! let mut sequencer = Sequencer::new("nightly");
//! sequencer.run(&sequence).await.expect("unique test names");
//! println!("{}", sequencer.report());
//! std::process::exit(sequencer.verdict_exit_code());
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod executor;
pub mod models;
pub mod output;
pub mod results;
pub mod sequencer;
pub mod tree;
pub mod utils;

pub use executor::{Executor, RunOptions};
pub use models::{Expectation, FnTest, Outcome, ResultRecord, TestCase, TestError, TestResult, XFail};
pub use results::{aggregate, AggregateResult, Counts, Verdict};
pub use sequencer::{CompletedRun, RunMetadata, Sequencer};
pub use tree::{build, Sequence, StructureError, TestTree};
