//! OCR engine seam and the tesseract command-line adapter.
//!
//! An [`OcrEngine`] turns one encoded page image into positioned words. The
//! engine is started once per run by an [`OcrBackend`], used for every page,
//! and terminated exactly once. [`OcrSession`] enforces the last part: it
//! terminates the engine on every exit path, including early returns and
//! unwinding.
//!
//! [`TesseractBackend`] links libtesseract through `leptess`. Word boxes come
//! straight from the engine's page iterator. A missing language model fails
//! initialisation, before any page is processed.

use crate::config::OcrSettings;
use crate::error::{EngineFailure, PipelineError};
use crate::pipeline::encode::EncodedImage;
use leptess::capi::TessPageIteratorLevel_RIL_WORD;
use leptess::{LepTess, Variable};
use tracing::{debug, info, warn};

/// A recognised word in image pixel coordinates (origin top-left).
#[derive(Debug, Clone, PartialEq)]
pub struct OcrWord {
    pub text: String,
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
    /// 0–100, as reported by the engine.
    pub confidence: f32,
}

/// Starts OCR engines.
pub trait OcrBackend: Send + Sync {
    fn initialize(&self, settings: &OcrSettings) -> Result<Box<dyn OcrEngine>, EngineFailure>;
}

/// A running OCR engine.
pub trait OcrEngine {
    /// Recognise the words on one page image.
    fn recognize(&mut self, image: &EncodedImage) -> Result<Vec<OcrWord>, EngineFailure>;

    /// Release the engine and everything it holds.
    fn terminate(self: Box<Self>) -> Result<(), EngineFailure>;
}

// ── Session guard ────────────────────────────────────────────────────────

/// Owns the OCR engine for one run and guarantees it is terminated.
pub struct OcrSession {
    engine: Option<Box<dyn OcrEngine>>,
}

impl OcrSession {
    /// Initialise the engine. Failure here is a recognition error without a
    /// page.
    pub fn start(backend: &dyn OcrBackend, settings: &OcrSettings) -> Result<Self, PipelineError> {
        let engine = backend
            .initialize(settings)
            .map_err(|e| PipelineError::Recognition {
                page: None,
                detail: e.to_string(),
            })?;
        info!("OCR engine ready (language: {})", settings.language);
        Ok(Self {
            engine: Some(engine),
        })
    }

    pub fn engine(&mut self) -> Result<&mut dyn OcrEngine, PipelineError> {
        match self.engine.as_deref_mut() {
            Some(engine) => Ok(engine),
            None => Err(PipelineError::Internal("OCR engine already terminated".into())),
        }
    }

    /// Terminate on the success path, surfacing teardown failures.
    pub fn terminate(mut self) -> Result<(), PipelineError> {
        match self.engine.take() {
            Some(engine) => engine.terminate().map_err(|e| PipelineError::Recognition {
                page: None,
                detail: format!("engine teardown failed: {e}"),
            }),
            None => Ok(()),
        }
    }
}

impl Drop for OcrSession {
    fn drop(&mut self) {
        if let Some(engine) = self.engine.take() {
            debug!("Terminating OCR engine after early exit");
            if let Err(e) = engine.terminate() {
                warn!("OCR engine teardown failed: {}", e);
            }
        }
    }
}

// ── tesseract ────────────────────────────────────────────────────────────

/// Runs tesseract in-process through leptess. The language model is loaded
/// once in [`OcrBackend::initialize`] and the same instance recognises every
/// page of the run.
#[derive(Debug, Clone, Copy, Default)]
pub struct TesseractBackend;

impl OcrBackend for TesseractBackend {
    fn initialize(&self, settings: &OcrSettings) -> Result<Box<dyn OcrEngine>, EngineFailure> {
        let model_dir = settings
            .model_dir
            .as_deref()
            .map(|dir| {
                dir.to_str().ok_or_else(|| {
                    EngineFailure::new(format!("model directory '{}' is not UTF-8", dir.display()))
                })
            })
            .transpose()?;

        let mut api = LepTess::new(model_dir, &settings.language).map_err(|e| {
            EngineFailure::new(format!(
                "cannot load language model '{}': {e}\n\
                 Install it (e.g. apt install tesseract-ocr-{}) or point the model directory at it.",
                settings.language, settings.language
            ))
        })?;

        api.set_variable(
            Variable::TesseditPagesegMode,
            &settings.page_segmentation_mode.to_string(),
        )
        .map_err(|e| EngineFailure::new(format!("cannot set page segmentation mode: {e}")))?;

        debug!(
            "tesseract loaded '{}' (psm {})",
            settings.language, settings.page_segmentation_mode
        );
        Ok(Box::new(TesseractEngine { api: Some(api) }))
    }
}

struct TesseractEngine {
    api: Option<LepTess>,
}

impl OcrEngine for TesseractEngine {
    fn recognize(&mut self, image: &EncodedImage) -> Result<Vec<OcrWord>, EngineFailure> {
        let api = self
            .api
            .as_mut()
            .ok_or_else(|| EngineFailure::new("engine already terminated"))?;

        api.set_image_from_mem(&image.data)
            .map_err(|e| EngineFailure::new(format!("cannot load page image: {e}")))?;
        api.set_source_resolution(image.dpi as i32);

        // None when the page has no text at all.
        let Some(boxes) = api.get_component_boxes(TessPageIteratorLevel_RIL_WORD, true) else {
            return Ok(Vec::new());
        };

        let mut words = Vec::new();
        for word_box in &boxes {
            let geom = word_box.get_geometry();
            api.set_rectangle(geom.x, geom.y, geom.w, geom.h);
            let text = api.get_utf8_text().unwrap_or_default();
            let confidence = api.mean_text_conf();
            if let Some(word) = word_from_box(geom.x, geom.y, geom.w, geom.h, &text, confidence) {
                words.push(word);
            }
        }

        debug!("tesseract found {} words", words.len());
        Ok(words)
    }

    fn terminate(mut self: Box<Self>) -> Result<(), EngineFailure> {
        if self.api.take().is_some() {
            debug!("tesseract released");
        }
        Ok(())
    }
}

/// Turn one word box reported by the engine into an [`OcrWord`].
///
/// Boxes without text, with negative confidence or without area are
/// dropped. Coordinates left of or above the image are clamped to its edge.
fn word_from_box(
    left: i32,
    top: i32,
    width: i32,
    height: i32,
    text: &str,
    confidence: i32,
) -> Option<OcrWord> {
    if confidence < 0 || width <= 0 || height <= 0 {
        return None;
    }
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if text.is_empty() {
        return None;
    }

    Some(OcrWord {
        text,
        left: left.max(0) as u32,
        top: top.max(0) as u32,
        width: width as u32,
        height: height as u32,
        confidence: confidence as f32,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn word_box_becomes_word() {
        let word = word_from_box(100, 50, 80, 30, "Hello\n", 95).unwrap();
        assert_eq!(word.text, "Hello");
        assert_eq!((word.left, word.top, word.width, word.height), (100, 50, 80, 30));
        assert_eq!(word.confidence, 95.0);
    }

    #[test]
    fn word_box_without_text_or_area_is_dropped() {
        assert!(word_from_box(0, 0, 10, 10, "  \n", 90).is_none());
        assert!(word_from_box(0, 0, 0, 10, "x", 90).is_none());
        assert!(word_from_box(0, 0, 10, -1, "x", 90).is_none());
        assert!(word_from_box(0, 0, 10, 10, "ghost", -1).is_none());
    }

    #[test]
    fn word_box_clamps_to_image_edge() {
        let word = word_from_box(-4, -2, 10, 10, "edge  case", 80).unwrap();
        assert_eq!((word.left, word.top), (0, 0));
        assert_eq!(word.text, "edge case");
    }

    #[test]
    fn missing_language_model_fails_initialisation() {
        let settings = OcrSettings {
            language: "zz_not_installed".into(),
            ..Default::default()
        };
        let err = TesseractBackend.initialize(&settings).err().unwrap();
        assert!(err.to_string().contains("zz_not_installed"), "got: {err}");
    }

    #[test]
    fn missing_model_dir_fails_initialisation() {
        let settings = OcrSettings {
            model_dir: Some("/nonexistent/tessdata".into()),
            ..Default::default()
        };
        assert!(TesseractBackend.initialize(&settings).is_err());
    }

    struct CountingEngine {
        terminated: Arc<AtomicUsize>,
    }

    impl OcrEngine for CountingEngine {
        fn recognize(&mut self, _image: &EncodedImage) -> Result<Vec<OcrWord>, EngineFailure> {
            Ok(Vec::new())
        }

        fn terminate(self: Box<Self>) -> Result<(), EngineFailure> {
            self.terminated.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct CountingBackend {
        terminated: Arc<AtomicUsize>,
    }

    impl OcrBackend for CountingBackend {
        fn initialize(&self, _settings: &OcrSettings) -> Result<Box<dyn OcrEngine>, EngineFailure> {
            Ok(Box::new(CountingEngine {
                terminated: Arc::clone(&self.terminated),
            }))
        }
    }

    #[test]
    fn session_terminates_once_on_success() {
        let terminated = Arc::new(AtomicUsize::new(0));
        let backend = CountingBackend {
            terminated: Arc::clone(&terminated),
        };
        let session = OcrSession::start(&backend, &OcrSettings::default()).unwrap();
        session.terminate().unwrap();
        assert_eq!(terminated.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn session_terminates_on_drop() {
        let terminated = Arc::new(AtomicUsize::new(0));
        let backend = CountingBackend {
            terminated: Arc::clone(&terminated),
        };
        {
            let mut session = OcrSession::start(&backend, &OcrSettings::default()).unwrap();
            let _ = session.engine().unwrap();
        }
        assert_eq!(terminated.load(Ordering::SeqCst), 1);
    }
}
