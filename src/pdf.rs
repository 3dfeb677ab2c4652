//! Low-level PDF authoring helpers on top of `lopdf`.
//!
//! The recognizer, assembler and stamper all build documents from scratch
//! and move pages between documents; the object-graph plumbing they share
//! lives here. Nothing in this module knows about pipeline stages, so every
//! function reports a [`PdfEditError`] and the caller attaches context.

use crate::output::PageSize;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use thiserror::Error;

/// PDF version written by every document this crate produces.
pub const OUTPUT_PDF_VERSION: &str = "1.7";

/// Page attributes that may be inherited from the page tree.
const INHERITABLE: [&[u8]; 4] = [b"MediaBox", b"CropBox", b"Resources", b"Rotate"];

/// Page boundary boxes scaled together with the page.
const PAGE_BOXES: [&[u8]; 5] = [b"MediaBox", b"CropBox", b"BleedBox", b"TrimBox", b"ArtBox"];

#[derive(Debug, Error)]
pub enum PdfEditError {
    #[error(transparent)]
    Lopdf(#[from] lopdf::Error),

    #[error("{0}")]
    Structure(String),
}

impl PdfEditError {
    fn structure(detail: impl Into<String>) -> Self {
        PdfEditError::Structure(detail.into())
    }
}

pub type Result<T> = std::result::Result<T, PdfEditError>;

// ── Documents ────────────────────────────────────────────────────────────

pub fn new_document() -> Document {
    Document::with_version(OUTPUT_PDF_VERSION)
}

/// Build the page tree, catalog and info dictionary for `pages` (in order),
/// then drop every object the new tree does not reach.
pub fn finish_document(doc: &mut Document, pages: &[ObjectId], title: &str) -> Result<()> {
    let pages_id = doc.new_object_id();
    for &page_id in pages {
        page_dict_mut(doc, page_id)?.set("Parent", Object::Reference(pages_id));
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => pages.iter().map(|&id| Object::Reference(id)).collect::<Vec<_>>(),
            "Count" => pages.len() as i64,
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    let info_id = doc.add_object(dictionary! {
        "Title" => text_string(title),
        "Producer" => Object::string_literal(concat!("pdf-filing-stamp ", env!("CARGO_PKG_VERSION"))),
    });

    doc.trailer = Dictionary::new();
    doc.trailer.set("Root", Object::Reference(catalog_id));
    doc.trailer.set("Info", Object::Reference(info_id));

    doc.prune_objects();
    Ok(())
}

/// Compress eligible streams and serialise.
pub fn save(mut doc: Document) -> Result<Vec<u8>> {
    doc.compress();
    let mut buf = Vec::new();
    doc.save_to(&mut buf)
        .map_err(|e| PdfEditError::structure(format!("serialisation failed: {e}")))?;
    Ok(buf)
}

/// Move every object of `src` into `dst`, returning `src`'s page ids (in
/// page order) as they are numbered in `dst`.
///
/// Inherited page attributes are copied onto the pages first, so the pages
/// stay complete once they are re-parented.
pub fn import_document(dst: &mut Document, mut src: Document) -> Result<Vec<ObjectId>> {
    let page_ids: Vec<ObjectId> = src.get_pages().into_values().collect();
    for &page_id in &page_ids {
        flatten_inherited(&mut src, page_id)?;
    }
    Ok(import_pages(dst, src, &page_ids))
}

/// Move every object of `src` into `dst` and translate `pages` (ids in
/// `src`) to their new ids. The pages must already carry their own
/// attributes.
pub fn import_pages(dst: &mut Document, mut src: Document, pages: &[ObjectId]) -> Vec<ObjectId> {
    let offset = dst.max_id;
    let mut highest = dst.max_id;
    for ((num, generation), mut object) in std::mem::take(&mut src.objects) {
        shift_references(&mut object, offset);
        let id = (num + offset, generation);
        highest = highest.max(id.0);
        dst.objects.insert(id, object);
    }
    dst.max_id = highest;

    pages
        .iter()
        .map(|&(num, generation)| (num + offset, generation))
        .collect()
}

fn shift_references(object: &mut Object, offset: u32) {
    match object {
        Object::Reference(id) => id.0 += offset,
        Object::Array(items) => items.iter_mut().for_each(|o| shift_references(o, offset)),
        Object::Dictionary(dict) => dict.iter_mut().for_each(|(_, o)| shift_references(o, offset)),
        Object::Stream(stream) => stream
            .dict
            .iter_mut()
            .for_each(|(_, o)| shift_references(o, offset)),
        _ => {}
    }
}

// ── Pages ────────────────────────────────────────────────────────────────

pub fn page_dict(doc: &Document, page_id: ObjectId) -> Result<&Dictionary> {
    Ok(doc.get_object(page_id)?.as_dict()?)
}

fn page_dict_mut(doc: &mut Document, page_id: ObjectId) -> Result<&mut Dictionary> {
    Ok(doc.get_object_mut(page_id)?.as_dict_mut()?)
}

/// Look up `key` on the page, walking up `/Parent` links if it is absent.
fn resolve_inherited<'a>(
    doc: &'a Document,
    page_id: ObjectId,
    key: &[u8],
) -> Result<Option<&'a Object>> {
    let mut current = page_id;
    // A malformed tree may loop; no real tree is this deep.
    for _ in 0..64 {
        let dict = doc.get_object(current)?.as_dict()?;
        if let Ok(value) = dict.get(key) {
            return Ok(Some(value));
        }
        match dict.get(b"Parent") {
            Ok(parent) => current = parent.as_reference()?,
            Err(_) => return Ok(None),
        }
    }
    Err(PdfEditError::structure("page tree too deep or cyclic"))
}

/// Copy inherited attributes onto the page dictionary itself.
pub fn flatten_inherited(doc: &mut Document, page_id: ObjectId) -> Result<()> {
    let mut inherited = Vec::new();
    {
        let own = page_dict(doc, page_id)?;
        for key in INHERITABLE {
            if own.has(key) {
                continue;
            }
            if let Some(value) = resolve_inherited(doc, page_id, key)? {
                inherited.push((key, value.clone()));
            }
        }
    }
    let dict = page_dict_mut(doc, page_id)?;
    for (key, value) in inherited {
        dict.set(key, value);
    }
    Ok(())
}

fn resolve<'a>(doc: &'a Document, object: &'a Object) -> Result<&'a Object> {
    match object {
        Object::Reference(id) => Ok(doc.get_object(*id)?),
        other => Ok(other),
    }
}

pub fn number(object: &Object) -> Result<f32> {
    match object {
        Object::Integer(i) => Ok(*i as f32),
        Object::Real(f) => Ok(*f),
        other => Err(PdfEditError::structure(format!("expected number, got {other:?}"))),
    }
}

fn rect(doc: &Document, object: &Object) -> Result<[f32; 4]> {
    let items = resolve(doc, object)?.as_array()?;
    if items.len() != 4 {
        return Err(PdfEditError::structure(format!(
            "expected 4-element rectangle, got {}",
            items.len()
        )));
    }
    let mut out = [0.0; 4];
    for (slot, item) in out.iter_mut().zip(items) {
        *slot = number(resolve(doc, item)?)?;
    }
    Ok(out)
}

fn rect_object(r: [f32; 4]) -> Object {
    Object::Array(r.iter().map(|&v| Object::Real(v)).collect())
}

/// The page's MediaBox as `[llx, lly, urx, ury]`.
pub fn media_box(doc: &Document, page_id: ObjectId) -> Result<[f32; 4]> {
    let object = resolve_inherited(doc, page_id, b"MediaBox")?
        .ok_or_else(|| PdfEditError::structure("page has no MediaBox"))?;
    rect(doc, object)
}

pub fn page_size(doc: &Document, page_id: ObjectId) -> Result<PageSize> {
    let [x0, y0, x1, y1] = media_box(doc, page_id)?;
    Ok(PageSize::new((x1 - x0).abs(), (y1 - y0).abs()))
}

/// The page's resource dictionary object (possibly a reference).
pub fn page_resources(doc: &Document, page_id: ObjectId) -> Result<Object> {
    Ok(resolve_inherited(doc, page_id, b"Resources")?
        .cloned()
        .unwrap_or_else(|| Object::Dictionary(Dictionary::new())))
}

fn content_stream_ids(doc: &Document, page_id: ObjectId) -> Result<Vec<ObjectId>> {
    let dict = page_dict(doc, page_id)?;
    match dict.get(b"Contents") {
        Ok(Object::Reference(id)) => match doc.get_object(*id)? {
            Object::Array(items) => items
                .iter()
                .map(|o| o.as_reference().map_err(PdfEditError::from))
                .collect(),
            _ => Ok(vec![*id]),
        },
        Ok(Object::Array(items)) => items
            .iter()
            .map(|o| o.as_reference().map_err(PdfEditError::from))
            .collect(),
        Ok(other) => Err(PdfEditError::structure(format!(
            "unexpected /Contents entry {other:?}"
        ))),
        Err(_) => Ok(Vec::new()),
    }
}

/// The page's content streams, decoded and joined.
pub fn page_content(doc: &Document, page_id: ObjectId) -> Result<Vec<u8>> {
    let mut content = Vec::new();
    for id in content_stream_ids(doc, page_id)? {
        let stream = doc.get_object(id)?.as_stream()?;
        let bytes = if stream.dict.has(b"Filter") {
            stream.decompressed_content()?
        } else {
            stream.content.clone()
        };
        if !content.is_empty() {
            content.push(b'\n');
        }
        content.extend_from_slice(&bytes);
    }
    Ok(content)
}

/// Scale a page uniformly about the origin.
///
/// Boundary boxes and annotation rectangles are multiplied by `factor`; the
/// existing content streams are kept as-is and bracketed by two new streams
/// that set up the transform.
pub fn scale_page(doc: &mut Document, page_id: ObjectId, factor: f32) -> Result<()> {
    let prefix = encode_ops(vec![
        Operation::new("q", vec![]),
        Operation::new("cm", matrix(factor, 0.0, 0.0, factor, 0.0, 0.0)),
    ])?;
    let suffix = encode_ops(vec![Operation::new("Q", vec![])])?;
    let prefix_id = doc.add_object(Stream::new(Dictionary::new(), prefix));
    let suffix_id = doc.add_object(Stream::new(Dictionary::new(), suffix));

    let mut contents = vec![Object::Reference(prefix_id)];
    contents.extend(
        content_stream_ids(doc, page_id)?
            .into_iter()
            .map(Object::Reference),
    );
    contents.push(Object::Reference(suffix_id));

    let mut boxes = Vec::new();
    for key in PAGE_BOXES {
        if let Some(object) = page_dict(doc, page_id)?.get(key).ok() {
            let r = rect(doc, object)?;
            boxes.push((key, r.map(|v| v * factor)));
        }
    }

    let annots: Vec<ObjectId> = match page_dict(doc, page_id)?.get(b"Annots") {
        Ok(object) => resolve(doc, object)?
            .as_array()?
            .iter()
            .filter_map(|o| o.as_reference().ok())
            .collect(),
        Err(_) => Vec::new(),
    };
    for annot_id in annots {
        let Ok(annot) = doc.get_object_mut(annot_id).and_then(Object::as_dict_mut) else {
            continue;
        };
        let Ok(Object::Array(items)) = annot.get(b"Rect") else {
            continue;
        };
        let scaled: Vec<Object> = items
            .iter()
            .map(|o| number(o).map(|v| Object::Real(v * factor)))
            .collect::<Result<_>>()?;
        annot.set("Rect", Object::Array(scaled));
    }

    let dict = page_dict_mut(doc, page_id)?;
    dict.set("Contents", Object::Array(contents));
    for (key, r) in boxes {
        dict.set(key, rect_object(r));
    }
    Ok(())
}

/// Capture a page as a Form XObject: same content, same resources, bounded
/// by its MediaBox. Returns the new object's id.
pub fn page_to_form_xobject(doc: &mut Document, page_id: ObjectId) -> Result<ObjectId> {
    let bbox = media_box(doc, page_id)?;
    let resources = page_resources(doc, page_id)?;
    let content = page_content(doc, page_id)?;

    let form = Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Form",
            "FormType" => 1,
            "BBox" => rect_object(bbox),
            "Matrix" => vec![1.into(), 0.into(), 0.into(), 1.into(), 0.into(), 0.into()],
            "Resources" => resources,
        },
        content,
    );
    Ok(doc.add_object(form))
}

/// Standard 14 font dictionary with WinAnsi encoding.
pub fn standard_font(base_font: &str) -> Dictionary {
    dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => Object::Name(base_font.as_bytes().to_vec()),
        "Encoding" => "WinAnsiEncoding",
    }
}

// ── Content streams ──────────────────────────────────────────────────────

pub fn encode_ops(operations: Vec<Operation>) -> Result<Vec<u8>> {
    Ok(Content { operations }.encode()?)
}

/// Operands of a `cm`/`Tm` matrix.
pub fn matrix(a: f32, b: f32, c: f32, d: f32, e: f32, f: f32) -> Vec<Object> {
    [a, b, c, d, e, f].iter().map(|&v| Object::Real(v)).collect()
}

/// A literal string operand in WinAnsi encoding.
pub fn win_ansi_string(text: &str) -> Object {
    Object::String(win_ansi(text), StringFormat::Literal)
}

/// Encode text as WinAnsi. Characters outside the encoding become `?`.
pub fn win_ansi(text: &str) -> Vec<u8> {
    text.chars().map(win_ansi_byte).collect()
}

fn win_ansi_byte(c: char) -> u8 {
    match c as u32 {
        0x20..=0x7E | 0xA0..=0xFF => c as u32 as u8,
        _ => match c {
            '€' => 0x80,
            '‚' => 0x82,
            'ƒ' => 0x83,
            '„' => 0x84,
            '…' => 0x85,
            '†' => 0x86,
            '‡' => 0x87,
            'ˆ' => 0x88,
            '‰' => 0x89,
            'Š' => 0x8A,
            '‹' => 0x8B,
            'Œ' => 0x8C,
            'Ž' => 0x8E,
            '‘' => 0x91,
            '’' => 0x92,
            '“' => 0x93,
            '”' => 0x94,
            '•' => 0x95,
            '–' => 0x96,
            '—' => 0x97,
            '˜' => 0x98,
            '™' => 0x99,
            'š' => 0x9A,
            '›' => 0x9B,
            'œ' => 0x9C,
            'ž' => 0x9E,
            'Ÿ' => 0x9F,
            '\t' | '\n' | '\r' => b' ',
            _ => b'?',
        },
    }
}

/// A PDF text string: PDFDocEncoding for ASCII, UTF-16BE otherwise.
fn text_string(text: &str) -> Object {
    if text.is_ascii() {
        return Object::string_literal(text);
    }
    let mut bytes = vec![0xFE, 0xFF];
    for unit in text.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    Object::String(bytes, StringFormat::Hexadecimal)
}
