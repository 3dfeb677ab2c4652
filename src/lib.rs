//! # pdf-filing-stamp
//!
//! Make a PDF text-searchable and imprint a dated filing stamp on its first
//! page.
//!
//! Every page is rasterised at a supersampling factor, run through OCR, and
//! rebuilt as a one-page PDF carrying the page image plus an invisible text
//! layer. The rebuilt pages are merged in source order, shrunk back to the
//! source page size, and the first page is labelled
//! `"FILED <date> <organization>"`.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF bytes
//!  │
//!  ├─ 1. Input     validate the %PDF header, open with pdfium
//!  ├─ 2. Render    rasterise pages at 4× and encode (JPEG by default)
//!  ├─ 3. OCR       tesseract (loaded once) → one-page PDFs with invisible text
//!  ├─ 4. Assemble  merge the one-page PDFs (lopdf)
//!  └─ 5. Stamp     shrink by ¼, label page 0, serialise
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf_filing_stamp::{stamp_file, StampConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = StampConfig::builder()
//!         .organization("Acme Corp")
//!         .build()?;
//!     let report = stamp_file("filing.pdf", "filing.stamped.pdf", &config).await?;
//!     eprintln!("{} pages, label {:?}", report.stats.page_count, report.label);
//!     Ok(())
//! }
//! ```
//!
//! Engines are pluggable: [`Pipeline::new`] takes any [`RenderBackend`] and
//! [`OcrBackend`], which is how the integration tests run without pdfium or
//! a tesseract language model.
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdfstamp` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! pdf-filing-stamp = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod controller;
pub mod error;
pub mod output;
pub mod pdf;
pub mod pipeline;
pub mod progress;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    OcrSettings, RasterFormat, ScaleFactor, StampConfig, StampConfigBuilder, StampLabel,
    StampStyle,
};
pub use controller::{inspect, stamp_async, stamp_bytes, stamp_file, Pipeline};
pub use error::{EngineFailure, PipelineError, Stage};
pub use output::{DocumentInfo, PageInfo, PageSize, RunStats, StampReport};
pub use pipeline::encode::{EncodedImage, ImageEncoding};
pub use pipeline::ocr::{OcrBackend, OcrEngine, OcrWord, TesseractBackend};
pub use pipeline::render::{PdfiumBackend, RenderBackend, RenderDocument, RenderEngine};
pub use progress::{NoopProgressCallback, ProgressCallback, StampProgressCallback};
