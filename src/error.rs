//! Error types for the pdf-filing-stamp library.
//!
//! A stamping run is all-or-nothing: a half-stamped or half-OCR'd document is
//! worse than no document at all, so every failure is fatal and surfaces as a
//! single [`PipelineError`]. The variant tells the caller *which stage*
//! failed and, where it applies, *which page* (0-based, the same indexing as
//! the pages of the input document).
//!
//! External engines (pdfium, tesseract) report their own failures as
//! [`EngineFailure`]. The stage that called the engine wraps it together with
//! the page index before propagating it, so the engine adapters never need
//! to know where in the pipeline they are running.

use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the pdf-filing-stamp library.
#[derive(Debug, Error)]
pub enum PipelineError {
    // ── Load errors ───────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The buffer does not start with the `%PDF` magic bytes.
    #[error("Input is not a PDF document (first bytes: {magic:?})")]
    NotAPdf { magic: Vec<u8> },

    /// The input or an intermediate artifact could not be parsed.
    #[error("Failed to load PDF: {detail}")]
    Load { detail: String },

    /// The document is encrypted and no (or a wrong) password was given.
    #[error("PDF is encrypted and cannot be opened.\nProvide the password with --password <PASSWORD>.")]
    PasswordRequired,

    // ── Stage errors ──────────────────────────────────────────────────────
    /// The rasteriser failed on a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    Render { page: usize, detail: String },

    /// The OCR engine failed on a page, or while starting / stopping
    /// (`page == None`).
    #[error("{}", recognition_message(.page, .detail))]
    Recognition { page: Option<usize>, detail: String },

    /// An OCR page could not be merged into the output document.
    #[error("Assembly failed at page {page}: {detail}")]
    Assembly { page: usize, detail: String },

    /// Embedding the first page or drawing the label failed.
    #[error("Stamping failed: {detail}")]
    Stamp { detail: String },

    // ── Controller errors ─────────────────────────────────────────────────
    /// A required external engine is missing or could not be bound.
    #[error("{engine} engine unavailable: {detail}")]
    EngineUnavailable { engine: &'static str, detail: String },

    /// The run was cancelled between pages.
    #[error("Run cancelled before page {before_page}")]
    Cancelled { before_page: usize },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Could not create or write the output PDF file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

fn recognition_message(page: &Option<usize>, detail: &str) -> String {
    match page {
        Some(page) => format!("OCR failed for page {page}: {detail}"),
        None => format!("OCR engine failure: {detail}"),
    }
}

/// The pipeline stage an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Stage {
    Load,
    Render,
    Recognition,
    Assembly,
    Stamp,
    Controller,
}

impl PipelineError {
    /// Which stage produced this error.
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::FileNotFound { .. }
            | PipelineError::PermissionDenied { .. }
            | PipelineError::NotAPdf { .. }
            | PipelineError::Load { .. }
            | PipelineError::PasswordRequired => Stage::Load,
            PipelineError::Render { .. } => Stage::Render,
            PipelineError::Recognition { .. } => Stage::Recognition,
            PipelineError::Assembly { .. } => Stage::Assembly,
            PipelineError::Stamp { .. } => Stage::Stamp,
            PipelineError::EngineUnavailable { .. }
            | PipelineError::Cancelled { .. }
            | PipelineError::InvalidConfig(_)
            | PipelineError::OutputWriteFailed { .. }
            | PipelineError::Internal(_) => Stage::Controller,
        }
    }

    /// The 0-based page index the error is attributed to, if any.
    pub fn page(&self) -> Option<usize> {
        match self {
            PipelineError::Render { page, .. } | PipelineError::Assembly { page, .. } => {
                Some(*page)
            }
            PipelineError::Recognition { page, .. } => *page,
            PipelineError::Cancelled { before_page } => Some(*before_page),
            _ => None,
        }
    }
}

impl From<lopdf::Error> for PipelineError {
    fn from(err: lopdf::Error) -> Self {
        PipelineError::Load {
            detail: err.to_string(),
        }
    }
}

/// Failure reported by an external engine (renderer or OCR).
///
/// Carries no page information; the calling stage attaches it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct EngineFailure(pub String);

impl EngineFailure {
    pub fn new(detail: impl Into<String>) -> Self {
        Self(detail.into())
    }
}
