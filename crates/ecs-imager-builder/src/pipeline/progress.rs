//! Progress reporting
//!
//! The UI sink is write-only: steps report to it, nothing reads from it, and
//! swapping it out never changes what the build does.

use tracing::{error, info, warn};

/// Trait for human-readable build progress
pub trait ProgressReporter: Send + Sync {
    /// A step is starting or reached a milestone
    fn say(&self, message: &str);

    /// Detail under the current step
    fn message(&self, message: &str);

    /// Something failed; during cleanup this is a warning, not a verdict
    fn error(&self, message: &str);
}

/// Progress reporter that writes to the tracing log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl ProgressReporter for LogReporter {
    fn say(&self, message: &str) {
        info!("==> {message}");
    }

    fn message(&self, message: &str) {
        info!("    {message}");
    }

    fn error(&self, message: &str) {
        error!("{message}");
    }
}

/// Reporter that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullReporter;

impl ProgressReporter for NullReporter {
    fn say(&self, _message: &str) {}

    fn message(&self, _message: &str) {}

    fn error(&self, message: &str) {
        warn!(message, "Unreported build error");
    }
}
