//! Input resolution: validate the source buffer and open it with the
//! render engine.
//!
//! The `%PDF` magic bytes are checked before anything reaches the render
//! engine, so a stray text file or image fails with [`PipelineError::NotAPdf`]
//! instead of an opaque engine error.

use crate::error::PipelineError;
use crate::output::PageSize;
use crate::pipeline::render::{RenderDocument, RenderEngine};
use std::io::Read;
use std::path::Path;
use tracing::debug;

const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// Reject buffers that do not start with `%PDF`.
pub fn validate_pdf_bytes(bytes: &[u8]) -> Result<(), PipelineError> {
    if bytes.len() < PDF_MAGIC.len() || &bytes[..PDF_MAGIC.len()] != PDF_MAGIC {
        return Err(PipelineError::NotAPdf {
            magic: bytes.iter().take(PDF_MAGIC.len()).copied().collect(),
        });
    }
    Ok(())
}

/// Read a local PDF file, validating existence, permission and magic bytes.
pub fn read_pdf_file(path: &Path) -> Result<Vec<u8>, PipelineError> {
    if !path.exists() {
        return Err(PipelineError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let mut bytes = Vec::new();
    match std::fs::File::open(path) {
        Ok(mut f) => {
            f.read_to_end(&mut bytes)
                .map_err(|e| PipelineError::Load {
                    detail: format!("reading '{}': {e}", path.display()),
                })?;
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(PipelineError::PermissionDenied {
                path: path.to_path_buf(),
            });
        }
        Err(_) => {
            return Err(PipelineError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
    }

    validate_pdf_bytes(&bytes)?;
    debug!("Read {} bytes from {}", bytes.len(), path.display());
    Ok(bytes)
}

/// The original input document, opened by the render engine.
///
/// Borrowed from the caller's buffer for the duration of the rasterisation
/// stage; dropping it closes the engine-side document.
pub struct SourceDocument<'a> {
    handle: Box<dyn RenderDocument + 'a>,
}

impl<'a> SourceDocument<'a> {
    /// Validate `bytes` and open them with `engine`.
    pub fn open(
        bytes: &'a [u8],
        engine: &'a dyn RenderEngine,
        password: Option<&'a str>,
    ) -> Result<Self, PipelineError> {
        validate_pdf_bytes(bytes)?;
        let handle = engine.open(bytes, password)?;
        debug!("Opened source document: {} pages", handle.page_count());
        Ok(Self { handle })
    }

    pub fn page_count(&self) -> usize {
        self.handle.page_count()
    }

    /// Size of page `index` in PDF units.
    pub fn page_size(&self, index: usize) -> Result<PageSize, PipelineError> {
        self.handle
            .page_size(index)
            .map_err(|e| PipelineError::Render {
                page: index,
                detail: e.to_string(),
            })
    }

    pub(crate) fn handle(&self) -> &dyn RenderDocument {
        self.handle.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn magic_bytes_accepted() {
        assert!(validate_pdf_bytes(b"%PDF-1.7\n...").is_ok());
    }

    #[test]
    fn magic_bytes_rejected() {
        match validate_pdf_bytes(b"\x89PNG\r\n") {
            Err(PipelineError::NotAPdf { magic }) => assert_eq!(magic, b"\x89PNG".to_vec()),
            other => panic!("expected NotAPdf, got {other:?}"),
        }
        assert!(matches!(
            validate_pdf_bytes(b"%P"),
            Err(PipelineError::NotAPdf { .. })
        ));
        assert!(validate_pdf_bytes(b"").is_err());
    }

    #[test]
    fn missing_file_reported() {
        let err = read_pdf_file(Path::new("/definitely/not/a/real/file.pdf")).unwrap_err();
        assert!(matches!(err, PipelineError::FileNotFound { .. }));
    }

    #[test]
    fn reads_valid_file() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"%PDF-1.4\n%%EOF\n").unwrap();
        let bytes = read_pdf_file(tmp.path()).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn rejects_non_pdf_file() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"hello world").unwrap();
        assert!(matches!(
            read_pdf_file(tmp.path()),
            Err(PipelineError::NotAPdf { .. })
        ));
    }
}
