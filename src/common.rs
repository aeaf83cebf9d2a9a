// Licensed under the Apache-2.0 license

//! Crate-wide logging seam.
//!
//! Engines are generic over a [`Logger`] so that observability costs nothing
//! by default ([`NoOpLogger`]) while still allowing every state transition
//! and flag event to be streamed to any [`embedded_io::Write`] sink through
//! [`WriterLogger`].

use embedded_io::Write;

/// Severity attached to each log record.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Trace,
    Info,
    Warn,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
        }
    }
}

/// Sink for engine diagnostics.
pub trait Logger {
    fn log(&mut self, level: LogLevel, args: core::fmt::Arguments<'_>);
}

/// Logger that discards everything. The default for all engine types.
#[derive(Default, Debug, Clone, Copy)]
pub struct NoOpLogger;

impl Logger for NoOpLogger {
    fn log(&mut self, _level: LogLevel, _args: core::fmt::Arguments<'_>) {}
}

/// Logger writing one line per record to an [`embedded_io::Write`] sink,
/// filtering below a minimum level. Write errors are dropped; diagnostics
/// must never alter engine behavior.
pub struct WriterLogger<W: Write> {
    sink: W,
    min_level: LogLevel,
}

impl<W: Write> WriterLogger<W> {
    pub fn new(sink: W, min_level: LogLevel) -> Self {
        Self { sink, min_level }
    }

    /// Consume the logger and hand back the sink.
    pub fn into_inner(self) -> W {
        self.sink
    }
}

impl<W: Write> Logger for WriterLogger<W> {
    fn log(&mut self, level: LogLevel, args: core::fmt::Arguments<'_>) {
        if level >= self.min_level {
            let _ = writeln!(self.sink, "[{}] {}", level.as_str(), args);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_logger_accepts_all_levels() {
        let mut logger = NoOpLogger;
        logger.log(LogLevel::Trace, format_args!("ignored"));
        logger.log(LogLevel::Warn, format_args!("ignored {}", 42));
    }

    struct VecSink(Vec<u8>);

    impl embedded_io::ErrorType for VecSink {
        type Error = core::convert::Infallible;
    }

    impl Write for VecSink {
        fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
            self.0.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> Result<(), Self::Error> {
            Ok(())
        }
    }

    #[test]
    fn writer_logger_filters_by_level() {
        let mut logger = WriterLogger::new(VecSink(Vec::new()), LogLevel::Warn);
        logger.log(LogLevel::Trace, format_args!("dropped"));
        logger.log(LogLevel::Warn, format_args!("kept"));
        let sink = logger.into_inner();
        let text = String::from_utf8(sink.0).unwrap();
        assert!(!text.contains("dropped"));
        assert!(text.contains("[WARN] kept"));
    }

    #[test]
    fn level_ordering() {
        assert!(LogLevel::Trace < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Warn);
    }
}
