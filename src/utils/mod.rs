//! Shared utilities
//!
//! Clocks, duration formatting, and logging setup.

mod logger;
mod timer;

pub use logger::{init_logger, log_file_path, make_filename, LogLevel};
pub use timer::{format_timespan, Clock, ManualClock, SystemClock};
