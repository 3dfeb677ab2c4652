//! Pipeline stages for stamping a PDF.
//!
//! Each submodule implements one transformation step. The two external
//! engines are reached only through the traits in [`render`] and [`ocr`].
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ ocr/recognize ──▶ assemble ──▶ stamp
//! (bytes)   (pdfium)   (tesseract+lopdf)  (lopdf)      (lopdf)
//! ```
//!
//! 1. [`input`]:     validate the buffer and open it with the render engine
//! 2. [`render`]:    rasterise every page at the supersampling factor and
//!    [`encode`] each bitmap right away
//! 3. [`recognize`]: run the [`ocr`] engine per page and compose a one-page
//!    PDF with the image and an invisible text layer
//! 4. [`assemble`]:  concatenate the one-page PDFs in source order
//! 5. [`stamp`]:     shrink back to source size and label the first page

pub mod assemble;
pub mod encode;
pub mod input;
pub mod ocr;
pub mod recognize;
pub mod render;
pub mod stamp;

use crate::config::StampConfig;
use crate::error::PipelineError;
use crate::progress::{NoopProgressCallback, StampProgressCallback};
use std::sync::atomic::{AtomicBool, Ordering};

/// Per-run hooks shared by the page loops: cancellation and progress.
pub struct RunContext<'a> {
    progress: &'a dyn StampProgressCallback,
    cancel: Option<&'a AtomicBool>,
}

static NOOP: NoopProgressCallback = NoopProgressCallback;

impl<'a> RunContext<'a> {
    pub fn new(config: &'a StampConfig) -> Self {
        Self {
            progress: config
                .progress_callback
                .as_deref()
                .unwrap_or(&NOOP as &dyn StampProgressCallback),
            cancel: config.cancel.as_deref(),
        }
    }

    /// Fail with [`PipelineError::Cancelled`] if cancellation was requested.
    /// Called before each page of each page loop.
    pub fn checkpoint(&self, next_page: usize) -> Result<(), PipelineError> {
        match self.cancel {
            Some(flag) if flag.load(Ordering::SeqCst) => Err(PipelineError::Cancelled {
                before_page: next_page,
            }),
            _ => Ok(()),
        }
    }

    pub fn progress(&self) -> &dyn StampProgressCallback {
        self.progress
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn checkpoint_passes_without_flag() {
        let config = StampConfig::default();
        assert!(RunContext::new(&config).checkpoint(3).is_ok());
    }

    #[test]
    fn checkpoint_reports_next_page() {
        let flag = Arc::new(AtomicBool::new(false));
        let config = StampConfig::builder()
            .cancel_flag(Arc::clone(&flag))
            .build()
            .unwrap();
        let ctx = RunContext::new(&config);
        assert!(ctx.checkpoint(0).is_ok());
        flag.store(true, Ordering::SeqCst);
        match ctx.checkpoint(2) {
            Err(PipelineError::Cancelled { before_page }) => assert_eq!(before_page, 2),
            other => panic!("expected Cancelled, got {other:?}"),
        }
    }
}
