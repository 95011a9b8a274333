//! # Host Log Routing
//!
//! A `log::Log` implementation for code that runs inside someone else's
//! kernel: records are formatted into a fixed-size line on the stack and
//! handed to a host-provided [`LogSink`] in one piece, so there is no
//! allocation and lines from concurrent callers never interleave.
//!
//! ## Output Format
//!
//! ```text
//! [LEVEL] target: message
//! ```
//!
//! Lines longer than [`LINE_CAPACITY`] bytes are cut at a character
//! boundary; the newline is always kept.
//!
//! ## Usage
//!
//! ```rust
//! use log::LevelFilter;
//! use pmem_log::{HostLogger, LogSink};
//!
//! struct Console;
//!
//! impl LogSink for Console {
//!     fn write_line(&self, line: &str) {
//!         print!("{line}");
//!     }
//! }
//!
//! static LOGGER: HostLogger<Console> = HostLogger::new(Console, LevelFilter::Debug);
//!
//! LOGGER.install().expect("no other logger installed");
//! log::debug!("rogue mapping created");
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

mod line;
mod logger;

pub use crate::line::{LINE_CAPACITY, LineBuffer};
pub use crate::logger::HostLogger;

/// Where finished log lines go.
pub trait LogSink: Send + Sync {
    /// Emit one line, including its trailing newline.
    fn write_line(&self, line: &str);
}

impl<S: LogSink + ?Sized> LogSink for &S {
    fn write_line(&self, line: &str) {
        (**self).write_line(line);
    }
}
