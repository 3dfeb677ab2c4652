//! Assembler: concatenate single-page OCR documents into one document.
//!
//! Pages move across as objects; content streams and images are never
//! decoded or re-encoded.

use crate::error::PipelineError;
use crate::pdf;
use crate::pipeline::recognize::OcrPage;
use lopdf::{Document, ObjectId};
use tracing::{debug, info};

/// The merged document. Page `i` is the OCR page of source page `i`.
#[derive(Debug)]
pub struct MergedDocument {
    document: Document,
    page_ids: Vec<ObjectId>,
}

impl MergedDocument {
    pub fn page_count(&self) -> usize {
        self.page_ids.len()
    }

    pub(crate) fn into_parts(self) -> (Document, Vec<ObjectId>) {
        (self.document, self.page_ids)
    }

    #[cfg(test)]
    fn to_bytes(&self, title: &str) -> Result<Vec<u8>, PipelineError> {
        let mut doc = self.document.clone();
        pdf::finish_document(&mut doc, &self.page_ids, title)
            .and_then(|_| pdf::save(doc))
            .map_err(|e| PipelineError::Internal(format!("cannot serialise merged document: {e}")))
    }
}

/// Merge OCR pages in order.
///
/// `pages[i].index` must equal `i`; a page that cannot be parsed is a load
/// error, a page that parses but is not a single well-formed page is an
/// assembly error.
pub fn merge(pages: Vec<OcrPage>) -> Result<MergedDocument, PipelineError> {
    let mut document = pdf::new_document();
    let mut page_ids = Vec::with_capacity(pages.len());

    for (position, page) in pages.into_iter().enumerate() {
        if page.index != position {
            return Err(PipelineError::Assembly {
                page: position,
                detail: format!("OCR page for source page {} arrived out of order", page.index),
            });
        }

        let fragment = Document::load_mem(&page.pdf).map_err(|e| PipelineError::Load {
            detail: format!("OCR page {position}: {e}"),
        })?;

        let imported = pdf::import_document(&mut document, fragment).map_err(|e| {
            PipelineError::Assembly {
                page: position,
                detail: e.to_string(),
            }
        })?;

        let &[page_id] = imported.as_slice() else {
            return Err(PipelineError::Assembly {
                page: position,
                detail: format!("expected a single-page document, found {} pages", imported.len()),
            });
        };

        pdf::media_box(&document, page_id).map_err(|e| PipelineError::Assembly {
            page: position,
            detail: e.to_string(),
        })?;

        debug!("Merged OCR page {}", position);
        page_ids.push(page_id);
    }

    info!("Assembled {} pages", page_ids.len());
    Ok(MergedDocument { document, page_ids })
}
