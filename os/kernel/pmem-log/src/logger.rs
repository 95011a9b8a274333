use crate::LogSink;
use crate::line::LineBuffer;
use core::fmt::Write;
use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};

pub struct HostLogger<S> {
    sink: S,
    max_level: LevelFilter,
}

impl<S: LogSink> HostLogger<S> {
    #[must_use]
    pub const fn new(sink: S, max_level: LevelFilter) -> Self {
        Self { sink, max_level }
    }

    #[inline]
    pub const fn sink(&self) -> &S {
        &self.sink
    }

    /// Make this the global logger. Call once during early init.
    ///
    /// # Errors
    /// If another logger was installed before.
    pub fn install(&'static self) -> Result<(), SetLoggerError> {
        log::set_logger(self)?;
        log::set_max_level(self.max_level);
        Ok(())
    }
}

impl<S: LogSink> Log for HostLogger<S> {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let mut line = LineBuffer::<{ crate::LINE_CAPACITY }>::new();
        // Writing into a `LineBuffer` cannot fail.
        let _ = write!(
            line,
            "[{}] {}: {}",
            record.level(),
            record.target(),
            record.args()
        );
        self.sink.write_line(line.finish());
    }

    fn flush(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::Level;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Capture(Mutex<Vec<String>>);

    impl LogSink for Capture {
        fn write_line(&self, line: &str) {
            self.0.lock().unwrap().push(line.to_owned());
        }
    }

    #[test]
    fn formats_level_target_and_message() {
        let logger = HostLogger::new(Capture::default(), LevelFilter::Debug);
        logger.log(
            &Record::builder()
                .level(Level::Debug)
                .target("pmem_rogue::mapping")
                .args(format_args!("rogue page {:#x} restored", 0x1000))
                .build(),
        );
        assert_eq!(
            logger.sink().0.lock().unwrap().as_slice(),
            ["[DEBUG] pmem_rogue::mapping: rogue page 0x1000 restored\n"]
        );
    }

    #[test]
    fn records_above_the_level_are_dropped() {
        let logger = HostLogger::new(Capture::default(), LevelFilter::Info);
        logger.log(
            &Record::builder()
                .level(Level::Trace)
                .target("t")
                .args(format_args!("hidden"))
                .build(),
        );
        assert!(logger.sink().0.lock().unwrap().is_empty());
    }
}
