use std::path::Path;

/// Host-side message sink.
///
/// Calls are fire-and-forget: the engine never waits on, or reacts to, the
/// way a host presents a message.
pub trait Notifier: Send + Sync {
    fn debug(&self, message: &str);
    fn info(&self, message: &str);
    fn warn(&self, message: &str);
    fn error(&self, message: &str);

    /// Called once the run's workspace is gone and local files may have
    /// changed.
    fn refresh(&self, _root: &Path) {}
}

/// Forwards every message to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

pub(crate) static LOG_NOTIFIER: LogNotifier = LogNotifier;

impl Notifier for LogNotifier {
    fn debug(&self, message: &str) {
        log::debug!("{message}");
    }

    fn info(&self, message: &str) {
        log::info!("{message}");
    }

    fn warn(&self, message: &str) {
        log::warn!("{message}");
    }

    fn error(&self, message: &str) {
        log::error!("{message}");
    }

    fn refresh(&self, root: &Path) {
        log::debug!("local files under {} changed", root.display());
    }
}
