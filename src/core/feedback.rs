//! Progress and cancellation channel between a running pipeline and its caller.
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use tracing::{debug, error, info};

/// Receives progress from a pipeline and tells it when to stop.
///
/// Pipelines poll `is_canceled` at every stage boundary and after each tile.
pub trait Feedback {
    /// Percentage in 0..=100; implementations may ignore values lower than the last one
    fn set_progress(&self, percent: u8);
    fn push_info(&self, message: &str);
    fn push_debug(&self, message: &str) {
        debug!("{}", message);
    }
    fn report_error(&self, message: &str);
    fn is_canceled(&self) -> bool;
}

/// Shared flag a caller can flip to stop a running pipeline.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Feedback that forwards everything to `tracing`.
#[derive(Debug, Default)]
pub struct LogFeedback {
    progress: AtomicU8,
    cancel: CancelFlag,
}

impl LogFeedback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancel_flag(cancel: CancelFlag) -> Self {
        Self {
            progress: AtomicU8::new(0),
            cancel,
        }
    }

    pub fn progress(&self) -> u8 {
        self.progress.load(Ordering::Relaxed)
    }
}

impl Feedback for LogFeedback {
    fn set_progress(&self, percent: u8) {
        let percent = percent.min(100);
        let previous = self.progress.fetch_max(percent, Ordering::Relaxed);
        if percent > previous {
            info!("Progress: {}%", percent);
        }
    }

    fn push_info(&self, message: &str) {
        info!("{}", message);
    }

    fn report_error(&self, message: &str) {
        error!("{}", message);
    }

    fn is_canceled(&self) -> bool {
        self.cancel.is_set()
    }
}
