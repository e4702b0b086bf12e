//! Data models for the sequencer
//!
//! This module contains the leaf test case contract and the per-leaf result types.

mod outcome;
mod test_case;

pub use outcome::{Outcome, ResultRecord, Window};
pub use test_case::{Expectation, FnTest, TestCase, TestError, TestResult, XFail};
