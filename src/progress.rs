//! Progress-callback trait for batch dispatch events.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] via
//! [`crate::config::DatasetConfigBuilder::progress_callback`] to receive
//! events as the dispatcher works through the (document, question) cross
//! product. The `pdf2qa` binary drives its terminal progress bar this way.
//!
//! # Example
//!
//! ```rust
//! use edgequake_pdf2qa::{BatchProgressCallback, DatasetConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl BatchProgressCallback for CountingCallback {
//!     fn on_item_complete(&self, document: &str, question_number: usize, answer_len: usize) {
//!         let done = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("{done}: {document} Q{question_number} ({answer_len} bytes)");
//!     }
//! }
//!
//! let config = DatasetConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { completed: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the dispatcher as it processes work items.
///
/// Items run concurrently, so `on_item_*` may be called from several tasks
/// at once and in any order. All methods have default no-op implementations
/// so callers only override what they care about.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once before any provider call is made.
    ///
    /// # Arguments
    /// * `total_items` — size of the deduplicated cross product
    fn on_batch_start(&self, total_items: usize) {
        let _ = total_items;
    }

    /// Called just before the first provider call for an item.
    fn on_item_start(&self, document: &str, question_number: usize) {
        let _ = (document, question_number);
    }

    /// Called before sleeping ahead of a retry.
    ///
    /// # Arguments
    /// * `attempt` — retry number (1-based)
    fn on_item_retry(&self, document: &str, question_number: usize, attempt: u32, error: &str) {
        let _ = (document, question_number, attempt, error);
    }

    /// Called when an item produced an answer.
    fn on_item_complete(&self, document: &str, question_number: usize, answer_len: usize) {
        let _ = (document, question_number, answer_len);
    }

    /// Called when an item is recorded as an error row.
    fn on_item_error(&self, document: &str, question_number: usize, error: &str) {
        let _ = (document, question_number, error);
    }

    /// Called once after the batch finished or was cancelled.
    ///
    /// # Arguments
    /// * `completed`     — items that produced a result row
    /// * `success_count` — rows with `status = success`
    fn on_batch_complete(&self, completed: usize, success_count: usize) {
        let _ = (completed, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::DatasetConfig`].
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        starts: AtomicUsize,
        retries: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
        total: AtomicUsize,
    }

    impl BatchProgressCallback for TrackingCallback {
        fn on_batch_start(&self, total_items: usize) {
            self.total.store(total_items, Ordering::SeqCst);
        }

        fn on_item_start(&self, _document: &str, _question_number: usize) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_item_retry(&self, _d: &str, _q: usize, _attempt: u32, _e: &str) {
            self.retries.fetch_add(1, Ordering::SeqCst);
        }

        fn on_item_complete(&self, _d: &str, _q: usize, _len: usize) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_item_error(&self, _d: &str, _q: usize, _e: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_batch_start(4);
        cb.on_item_start("a.pdf", 1);
        cb.on_item_retry("a.pdf", 1, 1, "429");
        cb.on_item_complete("a.pdf", 1, 42);
        cb.on_item_error("a.pdf", 2, "auth");
        cb.on_batch_complete(4, 3);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_batch_start(3);
        tracker.on_item_start("a.pdf", 1);
        tracker.on_item_complete("a.pdf", 1, 10);
        tracker.on_item_start("a.pdf", 2);
        tracker.on_item_retry("a.pdf", 2, 1, "timeout");
        tracker.on_item_error("a.pdf", 2, "timeout");

        assert_eq!(tracker.total.load(Ordering::SeqCst), 3);
        assert_eq!(tracker.starts.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.retries.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_batch_start(10);
        cb.on_item_complete("x.pdf", 1, 512);
    }
}
