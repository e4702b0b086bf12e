//! Test execution engine
//!
//! Provides serial and fork/join parallel execution of a test tree.

mod parallel;
mod runner;

pub use parallel::Executor;
pub use runner::{LeafRunner, RunOptions};

pub(crate) use runner::SEPARATOR;
