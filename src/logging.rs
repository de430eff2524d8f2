//! Per-task log capture
//!
//! Every task context carries a [`TaskLogger`]: lines are teed to the
//! process-wide `tracing` subscriber and appended to the task's throttled
//! buffer in the metadata bus, where the frontend picks them up per feature.
//! Capture failures never abort a run; past the buffer cap lines are counted,
//! not stored.

use std::sync::Arc;

use chrono::Utc;

use crate::metadata::TaskLogBuffer;

/// Captured line severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn as_str(self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }
}

/// Handle writing to one task's capture buffer and the global subscriber.
#[derive(Clone, Debug)]
pub struct TaskLogger {
    task_ref: Arc<str>,
    buffer: Option<Arc<TaskLogBuffer>>,
    /// Lines below this severity are teed but not captured.
    capture_floor: LogLevel,
}

impl TaskLogger {
    pub fn new(task_ref: Arc<str>, buffer: Arc<TaskLogBuffer>) -> Self {
        Self {
            task_ref,
            buffer: Some(buffer),
            capture_floor: LogLevel::Info,
        }
    }

    /// Logger with no capture buffer; tees only. Used outside task bodies.
    pub fn detached() -> Self {
        Self {
            task_ref: Arc::from("-"),
            buffer: None,
            capture_floor: LogLevel::Info,
        }
    }

    pub fn with_capture_floor(mut self, floor: LogLevel) -> Self {
        self.capture_floor = floor;
        self
    }

    pub fn debug(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Debug, message.as_ref());
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Info, message.as_ref());
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Warn, message.as_ref());
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Error, message.as_ref());
    }

    fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Debug => tracing::debug!(task = %self.task_ref, "{message}"),
            LogLevel::Info => tracing::info!(task = %self.task_ref, "{message}"),
            LogLevel::Warn => tracing::warn!(task = %self.task_ref, "{message}"),
            LogLevel::Error => tracing::error!(task = %self.task_ref, "{message}"),
        }
        if level < self.capture_floor {
            return;
        }
        if let Some(buffer) = &self.buffer {
            let stamp = Utc::now().format("%H:%M:%S%.3f");
            buffer.append(format!("{stamp} {} {message}", level.as_str()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::TaskLogSet;

    fn logger_with_buffer() -> (TaskLogger, Arc<TaskLogBuffer>) {
        let set = TaskLogSet::new();
        let buffer = set.register(Arc::from("t"));
        (TaskLogger::new(Arc::from("t"), Arc::clone(&buffer)), buffer)
    }

    #[test]
    fn captured_lines_carry_level() {
        let (logger, buffer) = logger_with_buffer();
        logger.info("starting");
        logger.error("boom");
        let lines = buffer.lines();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("INFO starting"));
        assert!(lines[1].contains("ERROR boom"));
    }

    #[test]
    fn debug_is_below_default_capture_floor() {
        let (logger, buffer) = logger_with_buffer();
        logger.debug("noisy");
        assert!(buffer.lines().is_empty());

        let verbose = logger.with_capture_floor(LogLevel::Debug);
        verbose.debug("kept");
        assert_eq!(buffer.lines().len(), 1);
    }

    #[test]
    fn detached_logger_never_panics() {
        let logger = TaskLogger::detached();
        logger.warn("no buffer attached");
    }
}
