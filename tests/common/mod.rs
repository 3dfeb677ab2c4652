//! Text-layer helpers shared by the integration tests.

use lopdf::content::Content;
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use pdf_filing_stamp::pdf;

fn stream_bytes(stream: &Stream) -> Vec<u8> {
    if stream.dict.has(b"Filter") {
        stream.decompressed_content().unwrap()
    } else {
        stream.content.clone()
    }
}

/// Every string shown with `Tj`, following Form XObjects.
fn shown_text(doc: &Document, content: &[u8], resources: &Object, out: &mut Vec<String>) {
    let (_, resources) = doc.dereference(resources).unwrap();
    let xobjects = resources
        .as_dict()
        .ok()
        .and_then(|r| r.get(b"XObject").ok())
        .map(|x| doc.dereference(x).unwrap().1)
        .and_then(|x| x.as_dict().ok());

    for op in Content::decode(content).unwrap().operations {
        match op.operator.as_str() {
            "Tj" => {
                if let Some(Ok(bytes)) = op.operands.first().map(|o| o.as_str()) {
                    out.push(String::from_utf8_lossy(bytes).into_owned());
                }
            }
            "Do" => {
                let name = op.operands[0].as_name().unwrap();
                let Some(id) = xobjects
                    .and_then(|x| x.get(name).ok())
                    .and_then(|o| o.as_reference().ok())
                else {
                    continue;
                };
                let form = doc.get_object(id).unwrap().as_stream().unwrap();
                if form.dict.get(b"Subtype").and_then(|s| s.as_name()).ok() == Some(&b"Form"[..]) {
                    let inner = form
                        .dict
                        .get(b"Resources")
                        .cloned()
                        .unwrap_or_else(|_| Object::Dictionary(Dictionary::new()));
                    shown_text(doc, &stream_bytes(form), &inner, out);
                }
            }
            _ => {}
        }
    }
}

pub fn page_text(doc: &Document, page_id: ObjectId) -> Vec<String> {
    let content = pdf::page_content(doc, page_id).unwrap();
    let resources = pdf::page_resources(doc, page_id).unwrap();
    let mut out = Vec::new();
    shown_text(doc, &content, &resources, &mut out);
    out
}
