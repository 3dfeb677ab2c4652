//! Recognizer: one rasterised page → one single-page PDF with the page
//! image and an invisible, positioned text layer.
//!
//! The page is sized to the raster's page size (source size × scale), not
//! to its pixel count, so shrinking by the inverse factor later lands on the
//! source dimensions exactly. Word boxes arrive in pixel space with a
//! top-left origin and are mapped into page space with a bottom-left origin.

use crate::error::PipelineError;
use crate::output::PageSize;
use crate::pdf::{self, PdfEditError};
use crate::pipeline::encode::{decode_rgb, EncodedImage, ImageEncoding};
use crate::pipeline::ocr::{OcrEngine, OcrWord};
use crate::pipeline::render::PageRaster;
use crate::pipeline::RunContext;
use lopdf::content::Operation;
use lopdf::{dictionary, Object, Stream};
use tracing::{debug, info};

/// Average glyph advance assumed when stretching a word to its box, in em.
const GLYPH_ADVANCE_EM: f32 = 0.5;

/// Text render mode 3: neither fill nor stroke.
const INVISIBLE_TEXT: i64 = 3;

const TEXT_LAYER_FONT: &str = "Helvetica";

/// One OCR'd page as a standalone single-page PDF.
#[derive(Debug, Clone, PartialEq)]
pub struct OcrPage {
    /// 0-based index in the source document.
    pub index: usize,
    pub size: PageSize,
    pub word_count: usize,
    pub pdf: Vec<u8>,
}

/// Drives the OCR engine over rasterised pages.
pub struct Recognizer<'e> {
    engine: &'e mut dyn OcrEngine,
    title: &'e str,
}

impl<'e> Recognizer<'e> {
    pub fn new(engine: &'e mut dyn OcrEngine, title: &'e str) -> Self {
        Self { engine, title }
    }

    /// Recognise one page.
    pub fn recognize(&mut self, raster: &PageRaster) -> Result<OcrPage, PipelineError> {
        let words = self
            .engine
            .recognize(&raster.image)
            .map_err(|e| PipelineError::Recognition {
                page: Some(raster.index),
                detail: e.to_string(),
            })?;

        let pdf = compose_page(raster.size, &raster.image, &words, self.title).map_err(|e| {
            PipelineError::Recognition {
                page: Some(raster.index),
                detail: format!("cannot compose OCR page: {e}"),
            }
        })?;

        debug!(
            "Page {}: {} words, {} byte OCR page",
            raster.index,
            words.len(),
            pdf.len()
        );

        Ok(OcrPage {
            index: raster.index,
            size: raster.size,
            word_count: words.len(),
            pdf,
        })
    }

    /// Recognise every page in order, releasing each raster once its OCR
    /// page exists.
    pub fn recognize_all(
        &mut self,
        rasters: Vec<PageRaster>,
        ctx: &RunContext<'_>,
    ) -> Result<Vec<OcrPage>, PipelineError> {
        let total = rasters.len();
        let mut pages = Vec::with_capacity(total);
        for raster in rasters {
            ctx.checkpoint(raster.index)?;
            let page = self.recognize(&raster)?;
            ctx.progress()
                .on_page_recognized(page.index, total, page.word_count);
            pages.push(page);
        }
        info!(
            "Recognised {} pages ({} words)",
            pages.len(),
            pages.iter().map(|p| p.word_count).sum::<usize>()
        );
        Ok(pages)
    }
}

/// Build the single-page PDF for one raster and its recognised words.
pub fn compose_page(
    size: PageSize,
    image: &EncodedImage,
    words: &[OcrWord],
    title: &str,
) -> Result<Vec<u8>, PdfEditError> {
    let mut doc = pdf::new_document();

    let image_id = doc.add_object(image_xobject(image)?);
    let font_id = doc.add_object(pdf::standard_font(TEXT_LAYER_FONT));

    let mut ops = vec![
        Operation::new("q", vec![]),
        Operation::new("cm", pdf::matrix(size.width, 0.0, 0.0, size.height, 0.0, 0.0)),
        Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
        Operation::new("Q", vec![]),
    ];
    ops.extend(text_layer(size, image, words));

    let content_id = doc.add_object(Stream::new(dictionary! {}, pdf::encode_ops(ops)?));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "MediaBox" => vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Real(size.width),
            Object::Real(size.height),
        ],
        "Resources" => dictionary! {
            "XObject" => dictionary! { "Im0" => image_id },
            "Font" => dictionary! { "F1" => font_id },
        },
        "Contents" => content_id,
    });

    pdf::finish_document(&mut doc, &[page_id], title)?;
    pdf::save(doc)
}

fn image_xobject(image: &EncodedImage) -> Result<Stream, PdfEditError> {
    let mut dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => image.width_px as i64,
        "Height" => image.height_px as i64,
        "ColorSpace" => "DeviceRGB",
        "BitsPerComponent" => 8,
    };

    Ok(match image.encoding {
        ImageEncoding::Jpeg => {
            dict.set("Filter", "DCTDecode");
            Stream::new(dict, image.data.clone()).with_compression(false)
        }
        ImageEncoding::Png => {
            let rgb = decode_rgb(image)
                .map_err(|e| PdfEditError::Structure(format!("cannot decode page image: {e}")))?;
            Stream::new(dict, rgb.into_raw())
        }
    })
}

/// Text-layer operators for the recognised words.
fn text_layer(size: PageSize, image: &EncodedImage, words: &[OcrWord]) -> Vec<Operation> {
    if words.is_empty() || image.width_px == 0 || image.height_px == 0 {
        return Vec::new();
    }

    let sx = size.width / image.width_px as f32;
    let sy = size.height / image.height_px as f32;

    let mut ops = vec![
        Operation::new("BT", vec![]),
        Operation::new("Tr", vec![Object::Integer(INVISIBLE_TEXT)]),
    ];

    for word in words {
        let glyphs = word.text.chars().count();
        if word.height == 0 || glyphs == 0 {
            continue;
        }

        let font_size = word.height as f32 * sy;
        let x = word.left as f32 * sx;
        let y = size.height - (word.top as f32 + word.height as f32) * sy;
        let box_width = word.width as f32 * sx;
        let natural_width = glyphs as f32 * GLYPH_ADVANCE_EM * font_size;
        let stretch = if natural_width > 0.0 && box_width > 0.0 {
            100.0 * box_width / natural_width
        } else {
            100.0
        };

        ops.push(Operation::new(
            "Tf",
            vec![Object::Name(b"F1".to_vec()), Object::Real(font_size)],
        ));
        ops.push(Operation::new("Tz", vec![Object::Real(stretch)]));
        ops.push(Operation::new("Tm", pdf::matrix(1.0, 0.0, 0.0, 1.0, x, y)));
        ops.push(Operation::new("Tj", vec![pdf::win_ansi_string(&word.text)]));
    }

    ops.push(Operation::new("ET", vec![]));
    ops
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RasterFormat;
    use crate::error::EngineFailure;
    use crate::pipeline::encode::encode_page;
    use image::{DynamicImage, Rgba, RgbaImage};
    use lopdf::content::Content;
    use lopdf::Document;

    fn raster(index: usize, format: RasterFormat) -> PageRaster {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            400,
            200,
            Rgba([255, 255, 255, 255]),
        ));
        PageRaster {
            index,
            size: PageSize::new(400.0, 200.0),
            image: encode_page(img, format, 288).unwrap(),
        }
    }

    fn word(text: &str, left: u32, top: u32, width: u32, height: u32) -> OcrWord {
        OcrWord {
            text: text.into(),
            left,
            top,
            width,
            height,
            confidence: 90.0,
        }
    }

    fn single_page(bytes: &[u8]) -> (Document, lopdf::ObjectId) {
        let doc = Document::load_mem(bytes).unwrap();
        let id = *doc.get_pages().values().next().unwrap();
        (doc, id)
    }

    #[test]
    fn page_matches_raster_size() {
        let r = raster(0, RasterFormat::default());
        let bytes = compose_page(r.size, &r.image, &[], "Stamped PDF").unwrap();
        let (doc, id) = single_page(&bytes);
        assert_eq!(pdf::page_size(&doc, id).unwrap(), PageSize::new(400.0, 200.0));
    }

    #[test]
    fn words_are_flipped_into_page_space() {
        let r = raster(0, RasterFormat::Png);
        let words = [word("Hello", 40, 20, 100, 30)];
        let bytes = compose_page(r.size, &r.image, &words, "t").unwrap();
        let (doc, id) = single_page(&bytes);

        let content = pdf::page_content(&doc, id).unwrap();
        let ops = Content::decode(&content).unwrap().operations;

        let tr = ops.iter().find(|o| o.operator == "Tr").unwrap();
        assert_eq!(tr.operands[0].as_i64().unwrap(), INVISIBLE_TEXT);

        let tm = ops.iter().find(|o| o.operator == "Tm").unwrap();
        let x = pdf::number(&tm.operands[4]).unwrap();
        let y = pdf::number(&tm.operands[5]).unwrap();
        assert_eq!(x, 40.0);
        // top 20 + height 30 from the top of a 200 unit page
        assert_eq!(y, 150.0);

        let tj = ops.iter().find(|o| o.operator == "Tj").unwrap();
        assert_eq!(tj.operands[0].as_str().unwrap(), b"Hello");
    }

    #[test]
    fn oversized_word_box_does_not_overflow() {
        let r = raster(0, RasterFormat::Png);
        let words = [word("Edge", 0, u32::MAX - 1, 10, 5)];
        let bytes = compose_page(r.size, &r.image, &words, "t").unwrap();
        let (doc, id) = single_page(&bytes);
        let content = pdf::page_content(&doc, id).unwrap();
        let ops = Content::decode(&content).unwrap().operations;
        let tm = ops.iter().find(|o| o.operator == "Tm").unwrap();
        assert!(pdf::number(&tm.operands[5]).unwrap() < 0.0);
    }

    #[test]
    fn jpeg_is_embedded_verbatim() {
        let r = raster(0, RasterFormat::Jpeg { quality: 80 });
        let bytes = compose_page(r.size, &r.image, &[], "t").unwrap();
        let doc = Document::load_mem(&bytes).unwrap();
        let image = doc
            .objects
            .values()
            .filter_map(|o| o.as_stream().ok())
            .find(|s| s.dict.get(b"Subtype").and_then(Object::as_name).ok() == Some(b"Image".as_slice()))
            .unwrap();
        assert_eq!(image.dict.get(b"Filter").unwrap().as_name().unwrap(), b"DCTDecode");
        assert_eq!(image.content, r.image.data);
    }

    #[test]
    fn empty_page_has_no_text_object() {
        let r = raster(0, RasterFormat::default());
        let bytes = compose_page(r.size, &r.image, &[], "t").unwrap();
        let (doc, id) = single_page(&bytes);
        let content = pdf::page_content(&doc, id).unwrap();
        let ops = Content::decode(&content).unwrap().operations;
        assert!(ops.iter().all(|o| o.operator != "BT"));
        assert!(ops.iter().any(|o| o.operator == "Do"));
    }

    struct FailingEngine;

    impl OcrEngine for FailingEngine {
        fn recognize(&mut self, _image: &EncodedImage) -> Result<Vec<OcrWord>, EngineFailure> {
            Err(EngineFailure::new("engine crashed"))
        }

        fn terminate(self: Box<Self>) -> Result<(), EngineFailure> {
            Ok(())
        }
    }

    #[test]
    fn engine_failure_carries_page_index() {
        let mut engine = FailingEngine;
        let mut recognizer = Recognizer::new(&mut engine, "t");
        let err = recognizer.recognize(&raster(7, RasterFormat::default())).unwrap_err();
        assert_eq!(err.page(), Some(7));
        assert!(err.to_string().contains("engine crashed"));
    }
}
