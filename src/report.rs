//! Error display collaborator.
//!
//! The presentation layer owns where messages end up (a status bar, a log
//! pane); the core only ever talks to this trait. Injected into
//! [`crate::loader::BatchLoader`] rather than looked up globally.

/// Receives user-facing error messages from long-running operations.
pub trait ErrorSink: Send + Sync {
    /// Show a message, replacing any previous one.
    fn report(&self, message: &str);

    /// Remove the currently shown message, if any.
    fn clear(&self);
}

/// Default sink: forwards to the `log` facade.
#[derive(Debug, Default)]
pub struct LogErrorSink;

impl ErrorSink for LogErrorSink {
    fn report(&self, message: &str) {
        log::error!("{message}");
    }

    fn clear(&self) {}
}
