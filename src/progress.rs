//! Progress-callback trait for per-page pipeline events.
//!
//! Inject an [`Arc<dyn StampProgressCallback>`] via
//! [`crate::config::StampConfigBuilder::progress_callback`] to receive events
//! as the run rasterises and recognises each page.
//!
//! # Example
//!
//! ```rust
//! use pdf_filing_stamp::{StampConfig, StampProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     recognised: AtomicUsize,
//! }
//!
//! impl StampProgressCallback for CountingCallback {
//!     fn on_page_recognized(&self, index: usize, total_pages: usize, word_count: usize) {
//!         self.recognised.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("OCR {}/{} ({} words)", index + 1, total_pages, word_count);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { recognised: AtomicUsize::new(0) });
//!
//! let config = StampConfig::builder()
//!     .progress_callback(counter as Arc<dyn StampProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the pipeline controller as a run progresses.
///
/// Page indices are 0-based. All methods default to no-ops so implementors
/// only override what they care about.
pub trait StampProgressCallback: Send + Sync {
    /// Called once the source document is open and its page count is known.
    fn on_run_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called after a page has been rasterised and encoded.
    fn on_page_rendered(&self, index: usize, total_pages: usize) {
        let _ = (index, total_pages);
    }

    /// Called after the OCR page for `index` has been composed.
    fn on_page_recognized(&self, index: usize, total_pages: usize, word_count: usize) {
        let _ = (index, total_pages, word_count);
    }

    /// Called after the merged document has been stamped.
    fn on_stamped(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called once the output bytes are ready and engines are released.
    fn on_run_complete(&self, total_pages: usize, elapsed_ms: u64) {
        let _ = (total_pages, elapsed_ms);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl StampProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::StampConfig`].
pub type ProgressCallback = Arc<dyn StampProgressCallback>;
