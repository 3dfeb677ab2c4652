//! Stamper: shrink every merged page back to source size and imprint the
//! filing label on the first page.
//!
//! The first page is captured as a Form XObject and drawn, scaled by the
//! fit factor and centred, onto a fresh page of the same size; the label is
//! drawn on that fresh page. Every other page keeps its own objects and only
//! gains the shrinking transform.

use crate::config::{ScaleFactor, StampConfig, StampLabel, StampStyle};
use crate::error::PipelineError;
use crate::output::PageSize;
use crate::pdf::{self, PdfEditError};
use crate::pipeline::assemble::MergedDocument;
use chrono::NaiveDate;
use lopdf::content::Operation;
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use tracing::{debug, info};

/// The final stamped document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StampedDocument {
    pub bytes: Vec<u8>,
    /// The label exactly as drawn.
    pub label: String,
    pub page_count: usize,
}

/// How a page is treated during stamping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PagePlacement {
    /// Embedded, fitted and labelled.
    First,
    /// Carried over with only the shrinking transform.
    Subsequent,
}

impl PagePlacement {
    fn for_index(index: usize) -> Self {
        if index == 0 {
            PagePlacement::First
        } else {
            PagePlacement::Subsequent
        }
    }
}

/// Where the fitted first page lands on its new page.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Placement {
    x: f32,
    y: f32,
    width: f32,
    height: f32,
}

/// Centre a `fit`-scaled copy of a `page`-sized box on the same page.
/// Any odd leftover of the vertical margin goes below, keeping the copy
/// toward the top.
fn centred_placement(page: PageSize, fit: f32) -> Placement {
    let width = page.width * fit;
    let height = page.height * fit;
    let x = (page.width - width) / 2.0;
    let slack = page.height - height;
    let y = slack - slack / 2.0;
    Placement { x, y, width, height }
}

pub struct Stamper {
    scale: ScaleFactor,
    fit_scale: f32,
    style: StampStyle,
    title: String,
}

impl Stamper {
    pub fn new(config: &StampConfig) -> Self {
        Self {
            scale: config.scale,
            fit_scale: config.fit_scale,
            style: config.style.clone(),
            title: config.document_title.clone(),
        }
    }

    /// Produce the stamped document for `merged`, labelled for `date`.
    pub fn stamp(
        &self,
        merged: MergedDocument,
        label: &StampLabel,
        date: NaiveDate,
    ) -> Result<StampedDocument, PipelineError> {
        if merged.page_count() == 0 {
            return Err(PipelineError::Stamp {
                detail: "document has no pages to stamp".into(),
            });
        }

        let text = label.render(date)?;
        let (source, page_ids) = merged.into_parts();

        let mut doc = pdf::new_document();
        let page_ids = pdf::import_pages(&mut doc, source, &page_ids);

        let font_id = doc.add_object(pdf::standard_font(&self.style.font));
        let inverse = self.scale.inverse();

        let mut kids = Vec::with_capacity(page_ids.len());
        for (index, &page_id) in page_ids.iter().enumerate() {
            pdf::scale_page(&mut doc, page_id, inverse).map_err(stamp_error)?;
            let kid = match PagePlacement::for_index(index) {
                PagePlacement::First => self
                    .stamp_first_page(&mut doc, page_id, font_id, &text)
                    .map_err(stamp_error)?,
                PagePlacement::Subsequent => page_id,
            };
            kids.push(kid);
        }

        pdf::finish_document(&mut doc, &kids, &self.title).map_err(stamp_error)?;
        let bytes = pdf::save(doc).map_err(stamp_error)?;

        info!("Stamped {} pages with \"{}\"", kids.len(), text);
        Ok(StampedDocument {
            bytes,
            label: text,
            page_count: kids.len(),
        })
    }

    /// Replace the (already shrunk) first page with a fresh page carrying
    /// the fitted copy and the label. Returns the fresh page's id.
    fn stamp_first_page(
        &self,
        doc: &mut Document,
        page_id: ObjectId,
        font_id: ObjectId,
        text: &str,
    ) -> Result<ObjectId, PdfEditError> {
        let [bx, by, _, _] = pdf::media_box(doc, page_id)?;
        let size = pdf::page_size(doc, page_id)?;
        let form_id = pdf::page_to_form_xobject(doc, page_id)?;

        let at = centred_placement(size, self.fit_scale);
        let fit = self.fit_scale;
        debug!(
            "First page {}x{}: embedded at ({}, {}) size {}x{}",
            size.width, size.height, at.x, at.y, at.width, at.height
        );

        let [r, g, b] = self.style.color;
        let ops = vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                pdf::matrix(fit, 0.0, 0.0, fit, at.x - fit * bx, at.y - fit * by),
            ),
            Operation::new("Do", vec![Object::Name(b"Pg0".to_vec())]),
            Operation::new("Q", vec![]),
            Operation::new("BT", vec![]),
            Operation::new(
                "Tf",
                vec![Object::Name(b"F1".to_vec()), Object::Real(self.style.font_size)],
            ),
            Operation::new("rg", vec![Object::Real(r), Object::Real(g), Object::Real(b)]),
            Operation::new(
                "Td",
                vec![
                    Object::Real(self.style.offset_x),
                    Object::Real(size.height - self.style.offset_top),
                ],
            ),
            Operation::new("Tj", vec![pdf::win_ansi_string(text)]),
            Operation::new("ET", vec![]),
        ];

        let content_id = doc.add_object(Stream::new(dictionary! {}, pdf::encode_ops(ops)?));
        Ok(doc.add_object(dictionary! {
            "Type" => "Page",
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Real(size.width),
                Object::Real(size.height),
            ],
            "Resources" => dictionary! {
                "XObject" => dictionary! { "Pg0" => form_id },
                "Font" => dictionary! { "F1" => font_id },
            },
            "Contents" => content_id,
        }))
    }
}

fn stamp_error(e: PdfEditError) -> PipelineError {
    PipelineError::Stamp {
        detail: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placement_for_letter_page() {
        let at = centred_placement(PageSize::new(612.0, 792.0), 0.9);
        assert!((at.width - 550.8).abs() < 1e-3);
        assert!((at.height - 712.8).abs() < 1e-3);
        assert!((at.x - 30.6).abs() < 1e-3);
        assert!((at.y - 39.6).abs() < 1e-3);
    }

    #[test]
    fn full_fit_fills_the_page() {
        let at = centred_placement(PageSize::new(100.0, 50.0), 1.0);
        assert_eq!(at, Placement { x: 0.0, y: 0.0, width: 100.0, height: 50.0 });
    }

    #[test]
    fn only_index_zero_is_first() {
        assert_eq!(PagePlacement::for_index(0), PagePlacement::First);
        assert_eq!(PagePlacement::for_index(1), PagePlacement::Subsequent);
        assert_eq!(PagePlacement::for_index(42), PagePlacement::Subsequent);
    }
}
