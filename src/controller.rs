//! Pipeline controller and the public entry points.
//!
//! A run is strictly sequential: every page is rasterised before the first
//! page is recognised, and the result is all-or-nothing. The controller owns
//! both engines for the duration of a run. The render engine lives in a
//! scope that ends with rasterisation; the OCR engine lives in an
//! [`OcrSession`] that terminates it on every exit path.
//!
//! pdfium and the OCR engine both block, so the async entry points move the
//! whole run onto tokio's blocking pool.

use crate::config::StampConfig;
use crate::error::PipelineError;
use crate::output::{DocumentInfo, PageInfo, RunStats, StampReport};
use crate::pdf;
use crate::pipeline::assemble;
use crate::pipeline::input::{self, SourceDocument};
use crate::pipeline::ocr::{OcrBackend, OcrSession, TesseractBackend};
use crate::pipeline::recognize::Recognizer;
use crate::pipeline::render::{PdfiumBackend, RenderBackend, Rasterizer};
use crate::pipeline::stamp::Stamper;
use crate::pipeline::RunContext;
use lopdf::Document;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// A configured pipeline: one config plus the two engine backends.
///
/// Each call to [`Pipeline::run`] starts its own engine pair, so a
/// `Pipeline` can be reused for many documents (one at a time).
pub struct Pipeline {
    config: StampConfig,
    render_backend: Arc<dyn RenderBackend>,
    ocr_backend: Arc<dyn OcrBackend>,
}

impl Pipeline {
    pub fn new(
        config: StampConfig,
        render_backend: Arc<dyn RenderBackend>,
        ocr_backend: Arc<dyn OcrBackend>,
    ) -> Self {
        Self {
            config,
            render_backend,
            ocr_backend,
        }
    }

    /// pdfium for rendering, libtesseract for OCR.
    pub fn with_default_engines(config: StampConfig) -> Self {
        let render = PdfiumBackend::new(config.pdfium_library.clone());
        Self::new(config, Arc::new(render), Arc::new(TesseractBackend))
    }

    pub fn config(&self) -> &StampConfig {
        &self.config
    }

    /// Stamp `source` and return the output PDF bytes.
    pub fn run(&self, source: &[u8]) -> Result<Vec<u8>, PipelineError> {
        Ok(self.run_with_report(source)?.pdf)
    }

    /// Stamp `source`, returning the bytes together with run statistics.
    pub fn run_with_report(&self, source: &[u8]) -> Result<StampReport, PipelineError> {
        let total_start = Instant::now();
        let config = &self.config;
        let ctx = RunContext::new(config);
        let date = config.effective_date();
        info!(
            "Starting run: {} bytes, scale {}×, label date {}",
            source.len(),
            config.scale.forward(),
            date
        );

        input::validate_pdf_bytes(source)?;

        // ── Step 1: Rasterise (render engine scoped to this block) ─────────
        let render_start = Instant::now();
        let rasters = {
            let engine = self.render_backend.start()?;
            let document = SourceDocument::open(source, engine.as_ref(), config.password.as_deref())?;
            let total = document.page_count();
            info!("PDF has {} pages", total);
            ctx.progress().on_run_start(total);
            Rasterizer::new(config.scale, config.raster_format).rasterize(&document, &ctx)?
        };
        let render_duration_ms = render_start.elapsed().as_millis() as u64;
        let page_count = rasters.len();

        // ── Step 2: Recognise ─────────────────────────────────────────────
        let ocr_start = Instant::now();
        let mut session = OcrSession::start(self.ocr_backend.as_ref(), &config.ocr)?;
        let ocr_pages = Recognizer::new(session.engine()?, &config.document_title)
            .recognize_all(rasters, &ctx)?;
        session.terminate()?;
        let ocr_duration_ms = ocr_start.elapsed().as_millis() as u64;
        let total_words = ocr_pages.iter().map(|p| p.word_count).sum::<usize>();

        // ── Step 3: Assemble + stamp ──────────────────────────────────────
        let stamp_start = Instant::now();
        let merged = assemble::merge(ocr_pages)?;
        let stamped = Stamper::new(config).stamp(merged, &config.label, date)?;
        ctx.progress().on_stamped(stamped.page_count);
        let stamp_duration_ms = stamp_start.elapsed().as_millis() as u64;

        let total_duration_ms = total_start.elapsed().as_millis() as u64;
        ctx.progress().on_run_complete(page_count, total_duration_ms);
        info!(
            "Run complete: {} pages, {} words, {} bytes in {}ms",
            page_count,
            total_words,
            stamped.bytes.len(),
            total_duration_ms
        );

        Ok(StampReport {
            pdf: stamped.bytes,
            label: stamped.label,
            stats: RunStats {
                page_count,
                total_words,
                render_duration_ms,
                ocr_duration_ms,
                stamp_duration_ms,
                total_duration_ms,
            },
        })
    }
}

/// Stamp a PDF held in memory with the default engines.
pub fn stamp_bytes(bytes: &[u8], config: &StampConfig) -> Result<Vec<u8>, PipelineError> {
    Pipeline::with_default_engines(config.clone()).run(bytes)
}

/// Async wrapper around [`stamp_bytes`]; the run happens on the blocking
/// pool.
pub async fn stamp_async(bytes: Vec<u8>, config: StampConfig) -> Result<Vec<u8>, PipelineError> {
    tokio::task::spawn_blocking(move || stamp_bytes(&bytes, &config))
        .await
        .map_err(|e| PipelineError::Internal(format!("Stamp task panicked: {}", e)))?
}

/// Stamp `input` and write the result to `output`.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
pub async fn stamp_file(
    input_path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    config: &StampConfig,
) -> Result<StampReport, PipelineError> {
    let bytes = input::read_pdf_file(input_path.as_ref())?;
    let pipeline = Pipeline::with_default_engines(config.clone());
    let report = tokio::task::spawn_blocking(move || pipeline.run_with_report(&bytes))
        .await
        .map_err(|e| PipelineError::Internal(format!("Stamp task panicked: {}", e)))??;

    write_atomic(output_path.as_ref(), &report.pdf).await?;
    Ok(report)
}

pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), PipelineError> {
    let write_failed = |source: std::io::Error| PipelineError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_failed)?;
    }

    let tmp_path = path.with_extension("pdf.tmp");
    tokio::fs::write(&tmp_path, bytes)
        .await
        .map_err(write_failed)?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(write_failed)?;

    debug!("Wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}

/// Structural information about a PDF, without rendering or OCR.
pub fn inspect(bytes: &[u8]) -> Result<DocumentInfo, PipelineError> {
    input::validate_pdf_bytes(bytes)?;
    let doc = Document::load_mem(bytes)?;

    let pages = doc
        .get_pages()
        .into_values()
        .enumerate()
        .map(|(index, id)| {
            pdf::page_size(&doc, id)
                .map(|size| PageInfo { index, size })
                .map_err(|e| PipelineError::Load {
                    detail: format!("page {index}: {e}"),
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(DocumentInfo {
        page_count: pages.len(),
        pdf_version: doc.version.clone(),
        is_encrypted: doc.is_encrypted(),
        title: document_title(&doc),
        pages,
    })
}

fn document_title(doc: &Document) -> Option<String> {
    let info_id = doc.trailer.get(b"Info").ok()?.as_reference().ok()?;
    let info = doc.get_object(info_id).ok()?.as_dict().ok()?;
    let raw = info.get(b"Title").ok()?.as_str().ok()?;
    let title = match raw {
        [0xFE, 0xFF, rest @ ..] => {
            let units: Vec<u16> = rest
                .chunks_exact(2)
                .map(|c| u16::from_be_bytes([c[0], c[1]]))
                .collect();
            String::from_utf16_lossy(&units)
        }
        _ => String::from_utf8_lossy(raw).into_owned(),
    };
    (!title.is_empty()).then_some(title)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{dictionary, Object, Stream};

    fn two_page_pdf() -> Vec<u8> {
        let mut doc = pdf::new_document();
        let mut ids = Vec::new();
        for (w, h) in [(612, 792), (842, 595)] {
            let content = doc.add_object(Stream::new(dictionary! {}, b"".to_vec()));
            ids.push(doc.add_object(dictionary! {
                "Type" => "Page",
                "MediaBox" => vec![0.into(), 0.into(), Object::Integer(w), Object::Integer(h)],
                "Contents" => content,
            }));
        }
        pdf::finish_document(&mut doc, &ids, "Quarterly filing").unwrap();
        pdf::save(doc).unwrap()
    }

    #[test]
    fn inspect_reports_pages_and_title() {
        let info = inspect(&two_page_pdf()).unwrap();
        assert_eq!(info.page_count, 2);
        assert_eq!(info.pages[1].size.width, 842.0);
        assert_eq!(info.title.as_deref(), Some("Quarterly filing"));
        assert!(!info.is_encrypted);
    }

    #[test]
    fn inspect_rejects_non_pdf() {
        assert!(matches!(
            inspect(b"GIF89a"),
            Err(PipelineError::NotAPdf { .. })
        ));
    }

    #[tokio::test]
    async fn atomic_write_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out.pdf");
        write_atomic(&path, b"%PDF-1.7").await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"%PDF-1.7");
        assert!(!path.with_extension("pdf.tmp").exists());
    }

    #[tokio::test]
    async fn stamp_file_reports_missing_input() {
        let dir = tempfile::tempdir().unwrap();
        let err = stamp_file(
            dir.path().join("absent.pdf"),
            dir.path().join("out.pdf"),
            &StampConfig::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, PipelineError::FileNotFound { .. }));
    }
}
