//! The process-wide log sink.
//!
//! All diagnostics and the output of the `print` procedure flow through a
//! single registered [`LogWriter`]. The default writer goes to stderr; hosts
//! and tests install their own with [`set_log_writer`].

use std::sync::{Arc, Mutex, OnceLock, PoisonError};

/// Trait for consuming diagnostic and `print` output.
///
/// Implement this to capture or redirect everything the interpreter reports:
/// parse errors, runtime errors, and `print` calls from program code.
pub trait LogWriter: Send {
    /// Called once per message. Messages carry no trailing newline.
    fn write_log(&mut self, message: &str);
}

/// Default [`LogWriter`] that writes each message to stderr.
#[derive(Debug, Default)]
pub struct StdLog;

impl LogWriter for StdLog {
    fn write_log(&mut self, message: &str) {
        eprintln!("{message}");
    }
}

/// A [`LogWriter`] that collects messages into a shared buffer.
///
/// Cloning yields a handle onto the same buffer, so a host can install one
/// clone as the process writer and read messages back through another.
#[derive(Debug, Default, Clone)]
pub struct CollectLog {
    buffer: Arc<Mutex<Vec<String>>>,
}

impl CollectLog {
    /// Creates a new empty `CollectLog`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every message collected so far, in order.
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns the collected messages joined with newlines.
    #[must_use]
    pub fn output(&self) -> String {
        self.messages().join("\n")
    }
}

impl LogWriter for CollectLog {
    fn write_log(&mut self, message: &str) {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.to_owned());
    }
}

/// A [`LogWriter`] that discards all output.
#[derive(Debug, Default)]
pub struct NoLog;

impl LogWriter for NoLog {
    fn write_log(&mut self, _message: &str) {}
}

static LOG_WRITER: OnceLock<Mutex<Box<dyn LogWriter>>> = OnceLock::new();

fn sink() -> &'static Mutex<Box<dyn LogWriter>> {
    LOG_WRITER.get_or_init(|| Mutex::new(Box::new(StdLog)))
}

/// Installs the process-wide log writer, replacing the previous one.
pub fn set_log_writer(writer: Box<dyn LogWriter>) {
    *sink().lock().unwrap_or_else(PoisonError::into_inner) = writer;
}

/// Sends one message to the registered writer.
pub(crate) fn log(message: &str) {
    sink()
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .write_log(message);
}
