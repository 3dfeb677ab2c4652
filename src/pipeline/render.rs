//! PDF rasterisation: render every page of the source at the supersampling
//! factor and encode it immediately.
//!
//! The render engine sits behind three small traits so the controller can
//! run against pdfium in production and against in-memory fakes in tests:
//!
//! ```text
//! RenderBackend::start() ─▶ RenderEngine::open() ─▶ RenderDocument::render_page()
//!   (bind library)           (parse the source)       (one bitmap per call)
//! ```
//!
//! pdfium uses thread-local state and blocks for the duration of a render,
//! so the whole pipeline runs on a blocking thread (see
//! [`crate::controller::stamp_async`]); nothing in here is async.

use crate::config::{RasterFormat, ScaleFactor};
use crate::error::{EngineFailure, PipelineError};
use crate::output::PageSize;
use crate::pipeline::encode::{encode_page, EncodedImage};
use crate::pipeline::input::SourceDocument;
use crate::pipeline::RunContext;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable consulted when no explicit library path is set.
pub const PDFIUM_LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

// ── Engine seam ──────────────────────────────────────────────────────────

/// Creates one render engine per run.
pub trait RenderBackend: Send + Sync {
    fn start(&self) -> Result<Box<dyn RenderEngine>, PipelineError>;
}

/// A started render engine. Dropping it releases the engine.
pub trait RenderEngine {
    /// Parse `pdf`. Fails with [`PipelineError::Load`] or
    /// [`PipelineError::PasswordRequired`].
    fn open<'a>(
        &'a self,
        pdf: &'a [u8],
        password: Option<&'a str>,
    ) -> Result<Box<dyn RenderDocument + 'a>, PipelineError>;
}

/// An opened document.
pub trait RenderDocument {
    fn page_count(&self) -> usize;

    /// Page size in PDF units.
    fn page_size(&self, index: usize) -> Result<PageSize, EngineFailure>;

    /// Render page `index` with both dimensions multiplied by `scale`.
    fn render_page(&self, index: usize, scale: f32) -> Result<DynamicImage, EngineFailure>;
}

// ── Stage output ─────────────────────────────────────────────────────────

/// One rasterised page.
#[derive(Debug, Clone, PartialEq)]
pub struct PageRaster {
    /// 0-based index into the source document.
    pub index: usize,
    /// Source page size multiplied by the forward scale factor.
    pub size: PageSize,
    pub image: EncodedImage,
}

/// Renders every page of a [`SourceDocument`] in order.
pub struct Rasterizer {
    scale: ScaleFactor,
    format: RasterFormat,
}

impl Rasterizer {
    pub fn new(scale: ScaleFactor, format: RasterFormat) -> Self {
        Self { scale, format }
    }

    /// Rasterise all pages. Fails fast on the first page that cannot be
    /// rendered; nothing is returned for earlier pages in that case.
    pub fn rasterize(
        &self,
        source: &SourceDocument<'_>,
        ctx: &RunContext<'_>,
    ) -> Result<Vec<PageRaster>, PipelineError> {
        let total = source.page_count();
        let scale = self.scale.forward();
        let dpi = (72.0 * scale).round() as u32;
        let mut rasters = Vec::with_capacity(total);

        for index in 0..total {
            ctx.checkpoint(index)?;

            let size = source.page_size(index)?.scaled(scale);
            let bitmap = source
                .handle()
                .render_page(index, scale)
                .map_err(|e| PipelineError::Render {
                    page: index,
                    detail: e.to_string(),
                })?;

            debug!(
                "Rendered page {} → {}x{} px ({}x{} pt)",
                index,
                bitmap.width(),
                bitmap.height(),
                size.width,
                size.height
            );

            // The raw bitmap is consumed here; only the encoded form survives.
            let image = encode_page(bitmap, self.format, dpi).map_err(|e| PipelineError::Render {
                page: index,
                detail: format!("encoding failed: {e}"),
            })?;

            rasters.push(PageRaster { index, size, image });
            ctx.progress().on_page_rendered(index, total);
        }

        info!("Rasterised {} pages at {}×", rasters.len(), scale);
        Ok(rasters)
    }
}

// ── pdfium adapter ───────────────────────────────────────────────────────

/// Binds libpdfium for each run.
///
/// Lookup order: the explicit path, `PDFIUM_LIB_PATH`, the working
/// directory, then the system library search path. A path may name the
/// library file itself or the directory containing it.
#[derive(Debug, Clone, Default)]
pub struct PdfiumBackend {
    library: Option<PathBuf>,
}

impl PdfiumBackend {
    pub fn new(library: Option<PathBuf>) -> Self {
        Self { library }
    }

    fn configured_path(&self) -> Option<PathBuf> {
        self.library.clone().or_else(|| {
            std::env::var_os(PDFIUM_LIB_PATH_ENV)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
        })
    }

    fn bind(&self) -> Result<Pdfium, PipelineError> {
        if let Some(path) = self.configured_path() {
            return bind_from_path(&path).map_err(|detail| PipelineError::EngineUnavailable {
                engine: "pdfium",
                detail,
            });
        }

        let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library())
            .map_err(|e| PipelineError::EngineUnavailable {
                engine: "pdfium",
                detail: format!(
                    "{e:?}\nInstall libpdfium or point {PDFIUM_LIB_PATH_ENV} at it."
                ),
            })?;
        Ok(Pdfium::new(bindings))
    }
}

fn bind_from_path(path: &Path) -> Result<Pdfium, String> {
    let library = if path.is_dir() {
        PathBuf::from(Pdfium::pdfium_platform_library_name_at_path(
            &*path.to_string_lossy(),
        ))
    } else {
        path.to_path_buf()
    };
    debug!("Binding pdfium from {}", library.display());
    Pdfium::bind_to_library(&library)
        .map(Pdfium::new)
        .map_err(|e| format!("cannot bind '{}': {e:?}", library.display()))
}

impl RenderBackend for PdfiumBackend {
    fn start(&self) -> Result<Box<dyn RenderEngine>, PipelineError> {
        let pdfium = self.bind()?;
        info!("pdfium bound");
        Ok(Box::new(PdfiumEngine { pdfium }))
    }
}

struct PdfiumEngine {
    pdfium: Pdfium,
}

impl RenderEngine for PdfiumEngine {
    fn open<'a>(
        &'a self,
        pdf: &'a [u8],
        password: Option<&'a str>,
    ) -> Result<Box<dyn RenderDocument + 'a>, PipelineError> {
        let document = self
            .pdfium
            .load_pdf_from_byte_slice(pdf, password)
            .map_err(|e| {
                let err_str = format!("{:?}", e);
                if err_str.contains("Password") || err_str.contains("password") {
                    PipelineError::PasswordRequired
                } else {
                    PipelineError::Load { detail: err_str }
                }
            })?;
        Ok(Box::new(PdfiumDocument { document }))
    }
}

struct PdfiumDocument<'a> {
    document: PdfDocument<'a>,
}

impl PdfiumDocument<'_> {
    fn page(&self, index: usize) -> Result<PdfPage<'_>, EngineFailure> {
        self.document
            .pages()
            .get(index as u16)
            .map_err(|e| EngineFailure::new(format!("{:?}", e)))
    }
}

impl RenderDocument for PdfiumDocument<'_> {
    fn page_count(&self) -> usize {
        self.document.pages().len() as usize
    }

    fn page_size(&self, index: usize) -> Result<PageSize, EngineFailure> {
        let page = self.page(index)?;
        Ok(PageSize::new(page.width().value, page.height().value))
    }

    fn render_page(&self, index: usize, scale: f32) -> Result<DynamicImage, EngineFailure> {
        let page = self.page(index)?;
        let config = PdfRenderConfig::new().scale_page_by_factor(scale);
        let bitmap = page
            .render_with_config(&config)
            .map_err(|e| EngineFailure::new(format!("{:?}", e)))?;
        Ok(bitmap.as_image())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StampConfig;
    use image::{Rgba, RgbaImage};

    struct FlatDocument {
        sizes: Vec<PageSize>,
        fail_at: Option<usize>,
    }

    impl RenderDocument for FlatDocument {
        fn page_count(&self) -> usize {
            self.sizes.len()
        }

        fn page_size(&self, index: usize) -> Result<PageSize, EngineFailure> {
            self.sizes
                .get(index)
                .copied()
                .ok_or_else(|| EngineFailure::new("no such page"))
        }

        fn render_page(&self, index: usize, scale: f32) -> Result<DynamicImage, EngineFailure> {
            if self.fail_at == Some(index) {
                return Err(EngineFailure::new("bitmap allocation failed"));
            }
            let size = self.page_size(index)?.scaled(scale);
            Ok(DynamicImage::ImageRgba8(RgbaImage::from_pixel(
                size.width as u32,
                size.height as u32,
                Rgba([255, 255, 255, 255]),
            )))
        }
    }

    struct FlatEngine {
        fail_at: Option<usize>,
    }

    impl RenderEngine for FlatEngine {
        fn open<'a>(
            &'a self,
            _pdf: &'a [u8],
            _password: Option<&'a str>,
        ) -> Result<Box<dyn RenderDocument + 'a>, PipelineError> {
            Ok(Box::new(FlatDocument {
                sizes: vec![PageSize::new(20.0, 30.0), PageSize::new(30.0, 20.0)],
                fail_at: self.fail_at,
            }))
        }
    }

    #[test]
    fn rasterises_every_page_in_order() {
        let engine = FlatEngine { fail_at: None };
        let source = SourceDocument::open(b"%PDF-1.7", &engine, None).unwrap();
        let config = StampConfig::default();
        let ctx = RunContext::new(&config);

        let rasters = Rasterizer::new(ScaleFactor::default(), RasterFormat::Png)
            .rasterize(&source, &ctx)
            .unwrap();

        assert_eq!(rasters.len(), 2);
        assert_eq!(rasters[0].index, 0);
        assert_eq!(rasters[0].size, PageSize::new(80.0, 120.0));
        assert_eq!((rasters[0].image.width_px, rasters[0].image.height_px), (80, 120));
        assert_eq!(rasters[1].size, PageSize::new(120.0, 80.0));
        assert_eq!(rasters[1].image.dpi, 288);
    }

    #[test]
    fn render_failure_names_the_page() {
        let engine = FlatEngine { fail_at: Some(1) };
        let source = SourceDocument::open(b"%PDF-1.7", &engine, None).unwrap();
        let config = StampConfig::default();
        let ctx = RunContext::new(&config);

        let err = Rasterizer::new(ScaleFactor::default(), RasterFormat::default())
            .rasterize(&source, &ctx)
            .unwrap_err();
        assert!(matches!(err, PipelineError::Render { page: 1, .. }), "got {err:?}");
    }

    #[test]
    fn explicit_library_path_wins() {
        let backend = PdfiumBackend::new(Some(PathBuf::from("/opt/pdfium/lib")));
        assert_eq!(
            backend.configured_path(),
            Some(PathBuf::from("/opt/pdfium/lib"))
        );
    }

    #[test]
    fn missing_library_is_engine_unavailable() {
        let backend = PdfiumBackend::new(Some(PathBuf::from("/nonexistent/libpdfium.so")));
        match backend.start() {
            Err(PipelineError::EngineUnavailable { engine, .. }) => assert_eq!(engine, "pdfium"),
            Err(other) => panic!("expected EngineUnavailable, got {other:?}"),
            Ok(_) => panic!("binding a nonexistent library must fail"),
        }
    }
}
