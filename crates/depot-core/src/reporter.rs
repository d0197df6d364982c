//! Reporter trait for dependency injection
//!
//! Core logic reports progress through this trait so it is not coupled to a
//! particular terminal UI. Implementations are identified by their id.

pub trait Reporter: Send + Sync {
    /// Indicates a new section or phase has started (e.g. "Fetching").
    fn section(&self, title: &str);

    /// Updates the progress of a download.
    fn downloading(&self, id: &str, current: u64, total: Option<u64>);

    /// Indicates that extraction of a downloaded payload has started.
    fn extracting(&self, id: &str);

    /// Marks an implementation as successfully retrieved.
    fn done(&self, id: &str, detail: &str);

    /// Marks an implementation as failed with a specific reason.
    fn failed(&self, id: &str, reason: &str);

    /// Log an informational message.
    fn info(&self, msg: &str);

    /// Log a warning message.
    fn warning(&self, msg: &str);

    /// Log an error message.
    fn error(&self, msg: &str);
}

impl<T: Reporter + ?Sized> Reporter for std::sync::Arc<T> {
    fn section(&self, title: &str) {
        (**self).section(title);
    }
    fn downloading(&self, id: &str, current: u64, total: Option<u64>) {
        (**self).downloading(id, current, total);
    }
    fn extracting(&self, id: &str) {
        (**self).extracting(id);
    }
    fn done(&self, id: &str, detail: &str) {
        (**self).done(id, detail);
    }
    fn failed(&self, id: &str, reason: &str) {
        (**self).failed(id, reason);
    }
    fn info(&self, msg: &str) {
        (**self).info(msg);
    }
    fn warning(&self, msg: &str) {
        (**self).warning(msg);
    }
    fn error(&self, msg: &str) {
        (**self).error(msg);
    }
}

/// A no-op reporter for silent operations (e.g., verification, testing).
#[derive(Debug, Clone, Copy)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn section(&self, _: &str) {}
    fn downloading(&self, _: &str, _: u64, _: Option<u64>) {}
    fn extracting(&self, _: &str) {}
    fn done(&self, _: &str, _: &str) {}
    fn failed(&self, _: &str, _: &str) {}
    fn info(&self, _: &str) {}
    fn warning(&self, _: &str) {}
    fn error(&self, _: &str) {}
}
