//! User-facing status reporting.
//!
//! Sessions never render anything themselves; they hand short status
//! strings to whatever shell embeds them (a footer element, a TUI line,
//! a log). Contested claims and transient disconnects surface here;
//! they are expected states, not errors.

use std::sync::Arc;

use tracing::{info, warn};

/// How the shell should present a status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Normal progress.
    Info,
    /// Something the user should notice (full room, lost link, contested
    /// claim).
    Error,
}

/// A cloneable handle to the shell's status callback.
#[derive(Clone)]
pub struct StatusSink {
    callback: Arc<dyn Fn(&str, Severity) + Send + Sync>,
}

impl StatusSink {
    /// Wraps a shell callback.
    pub fn new(callback: impl Fn(&str, Severity) + Send + Sync + 'static) -> Self {
        Self {
            callback: Arc::new(callback),
        }
    }

    /// A sink that drops everything; useful in tests and headless runs.
    #[must_use]
    pub fn null() -> Self {
        Self::new(|_, _| {})
    }

    /// Reports normal progress.
    pub fn info(&self, message: &str) {
        info!(message, "status");
        (self.callback)(message, Severity::Info);
    }

    /// Reports something the user should notice.
    pub fn error(&self, message: &str) {
        warn!(message, "status");
        (self.callback)(message, Severity::Error);
    }
}

impl std::fmt::Debug for StatusSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusSink").finish_non_exhaustive()
    }
}

impl Default for StatusSink {
    fn default() -> Self {
        Self::null()
    }
}
